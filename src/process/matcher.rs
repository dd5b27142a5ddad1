//! Readiness pattern matching and re-scan debouncing.

use std::fmt;
use std::time::{Duration, Instant};

use regex::Regex;

use crate::error::Result;
use crate::process::buffer::LogSnapshot;

/// A readiness pattern: plain substring or regular expression.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Matches any line containing the text.
    Substring(String),
    /// Matches any line the expression finds a match in.
    Regex(Regex),
}

impl Pattern {
    /// Compile a regular expression pattern.
    pub fn regex(pattern: &str) -> Result<Self> {
        Ok(Pattern::Regex(Regex::new(pattern)?))
    }

    /// Check a single line against the pattern.
    pub fn is_match(&self, line: &str) -> bool {
        match self {
            Pattern::Substring(needle) => line.contains(needle.as_str()),
            Pattern::Regex(re) => re.is_match(line),
        }
    }

    /// First line of `text` that matches.
    pub fn find_line<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.lines().find(|line| self.is_match(line))
    }

    /// First matching line across stdout then stderr.
    pub fn find_in(&self, snapshot: &LogSnapshot) -> Option<String> {
        self.find_line(&snapshot.combined()).map(str::to_string)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Substring(text) => write!(f, "{text:?}"),
            Pattern::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl From<&str> for Pattern {
    fn from(text: &str) -> Self {
        Pattern::Substring(text.to_string())
    }
}

impl From<String> for Pattern {
    fn from(text: String) -> Self {
        Pattern::Substring(text)
    }
}

impl From<Regex> for Pattern {
    fn from(re: Regex) -> Self {
        Pattern::Regex(re)
    }
}

/// Debounce bookkeeping for a waiter re-scanning the log buffer.
///
/// Wake-ups set `dirty`; a re-scan is due once the buffer is dirty and the
/// window since the last scan has elapsed. `dirty` stays set until a scan
/// actually happens, so the final chunk is never skipped.
#[derive(Debug, Clone)]
pub struct RescanState {
    window: Duration,
    last_scan_at: Option<Instant>,
    dirty: bool,
}

impl RescanState {
    /// Create a state that has never scanned and has nothing pending.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_scan_at: None,
            dirty: false,
        }
    }

    /// Record that new data may be available.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Record a completed scan.
    pub fn mark_scanned(&mut self, now: Instant) {
        self.last_scan_at = Some(now);
        self.dirty = false;
    }

    /// Check if unscanned data is pending.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Check if a re-scan should run at `now`.
    pub fn should_rescan(&self, now: Instant) -> bool {
        self.dirty && self.delay_until_rescan(now).is_zero()
    }

    /// How long until the window since the last scan closes.
    pub fn delay_until_rescan(&self, now: Instant) -> Duration {
        match self.last_scan_at {
            Some(last) => self
                .window
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }
}
