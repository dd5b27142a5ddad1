//! Single-shot wake-ups for callers blocked on log growth.
//!
//! Each registration fires exactly once: either the pump notifies it, or the
//! caller drops its [`Waiter`] (timeout, match found elsewhere) and the entry
//! is removed. Nothing is left behind in either case.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

use crate::error::ProcessError;

/// What the pump observed when it woke waiters.
#[derive(Debug, Clone)]
pub enum PumpEvent {
    /// New text was appended to the buffer.
    Appended,
    /// The log source ended.
    Done,
    /// The log source failed.
    Errored(ProcessError),
}

impl PumpEvent {
    /// Check if no further events will follow this one.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PumpEvent::Appended)
    }
}

/// Opaque identifier of a registered waiter.
pub type WaiterId = u64;

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: WaiterId,
    pending: HashMap<WaiterId, oneshot::Sender<PumpEvent>>,
    closed: Option<PumpEvent>,
}

/// Set of pending waiters, woken on every pump event.
#[derive(Clone, Debug, Default)]
pub struct WaiterRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl WaiterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Register a waiter for the next event.
    ///
    /// Once the registry has been closed the waiter resolves immediately with
    /// the terminal event.
    pub fn register(&self) -> Waiter {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        match &inner.closed {
            Some(event) => {
                let _ = tx.send(event.clone());
            }
            None => {
                inner.pending.insert(id, tx);
            }
        }
        Waiter {
            id,
            rx,
            registry: self.clone(),
        }
    }

    /// Wake every pending waiter with `event` and clear the registry.
    ///
    /// Returns the number of waiters woken.
    pub fn notify_all(&self, event: PumpEvent) -> usize {
        let pending = {
            let mut inner = self.lock();
            if event.is_terminal() && inner.closed.is_none() {
                inner.closed = Some(event.clone());
            }
            std::mem::take(&mut inner.pending)
        };
        let mut woken = 0;
        for (_, tx) in pending {
            // a receiver may have been dropped between take and send
            if tx.send(event.clone()).is_ok() {
                woken += 1;
            }
        }
        woken
    }

    /// Remove a waiter without firing it. Returns true if it was still pending.
    pub fn unregister(&self, id: WaiterId) -> bool {
        self.lock().pending.remove(&id).is_some()
    }

    /// Number of waiters currently pending.
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Check if no waiters are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A pending registration. Dropping it unregisters.
#[derive(Debug)]
pub struct Waiter {
    id: WaiterId,
    rx: oneshot::Receiver<PumpEvent>,
    registry: WaiterRegistry,
}

impl Waiter {
    /// This waiter's identifier.
    pub fn id(&self) -> WaiterId {
        self.id
    }

    /// Wait for the next pump event.
    pub async fn notified(mut self) -> PumpEvent {
        match (&mut self.rx).await {
            Ok(event) => event,
            // the registry itself went away; the pump cannot make progress
            Err(_) => PumpEvent::Done,
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_wakes_all_and_clears() {
        let registry = WaiterRegistry::new();
        let a = registry.register();
        let b = registry.register();
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.notify_all(PumpEvent::Appended), 2);
        assert!(registry.is_empty());

        assert!(matches!(a.notified().await, PumpEvent::Appended));
        assert!(matches!(b.notified().await, PumpEvent::Appended));
    }

    #[tokio::test]
    async fn test_dropped_waiter_is_removed() {
        let registry = WaiterRegistry::new();
        let waiter = registry.register();
        let id = waiter.id();
        drop(waiter);

        assert!(registry.is_empty());
        assert!(!registry.unregister(id));
        assert_eq!(registry.notify_all(PumpEvent::Appended), 0);
    }

    #[tokio::test]
    async fn test_late_registration_sees_terminal_event() {
        let registry = WaiterRegistry::new();
        registry.notify_all(PumpEvent::Errored(ProcessError::UnknownExitCode));

        let late = registry.register();
        assert!(registry.is_empty());
        match late.notified().await {
            PumpEvent::Errored(ProcessError::UnknownExitCode) => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_waiter_fires_once() {
        let registry = WaiterRegistry::new();
        let waiter = registry.register();
        registry.notify_all(PumpEvent::Appended);
        // a second notification finds nobody to wake
        assert_eq!(registry.notify_all(PumpEvent::Done), 0);
        assert!(matches!(waiter.notified().await, PumpEvent::Appended));
    }
}
