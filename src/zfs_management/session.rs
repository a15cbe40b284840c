// zfs_management/session.rs
// Single mutex-guarded backend connection with idempotent close

use crate::backend::Backend;
use crate::errors::{Result, ZfsError};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Exclusive owner of one backend connection.
///
/// Every call goes through [`Session::with_session`], which holds the mutex for
/// the whole call: the backend is never entered by two threads at once. Closing
/// takes the backend out of the slot and drops it, so the connection is
/// released exactly once whether `close` runs zero, one or many times.
pub struct Session<B: Backend> {
    slot: Mutex<Option<B>>,
}

impl<B: Backend> Session<B> {
    pub fn new(backend: B) -> Self {
        tracing::info!(backend = backend.implementation(), "backend session opened");
        Session {
            slot: Mutex::new(Some(backend)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<B>> {
        // A panic inside a backend call leaves the connection itself usable
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with the live backend, or fail with Closed
    pub fn with_session<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut B) -> Result<T>,
    {
        let mut guard = self.lock();
        match guard.as_mut() {
            Some(backend) => f(backend),
            None => Err(ZfsError::closed(op)),
        }
    }

    pub fn is_live(&self) -> bool {
        self.lock().is_some()
    }

    /// Release the connection; later calls are no-ops
    pub fn close(&self) {
        let backend = self.lock().take();
        if let Some(backend) = backend {
            tracing::info!(backend = backend.implementation(), "backend session closed");
            drop(backend);
        }
    }
}

impl<B: Backend> Drop for Session<B> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::errors::{is_closed, op};

    /// Test: closing twice releases the backend once and never fails
    #[test]
    fn test_close_is_idempotent() {
        let backend = MockBackend::new();
        let probe = backend.probe();
        let session = Session::new(backend);

        session.close();
        session.close();
        drop(session);

        assert_eq!(probe.releases(), 1);
    }

    /// Test: dropping an open session releases the backend
    #[test]
    fn test_drop_releases_backend() {
        let backend = MockBackend::new();
        let probe = backend.probe();
        drop(Session::new(backend));
        assert_eq!(probe.releases(), 1);
    }

    /// Test: calls after close fail fast with Closed
    #[test]
    fn test_closed_session_rejects_calls() {
        let session = Session::new(MockBackend::new());
        assert!(session.is_live());
        session.close();
        assert!(!session.is_live());

        let mut called = false;
        let err = session
            .with_session(op::LIST_POOLS, |_| {
                called = true;
                Ok(())
            })
            .unwrap_err();
        assert!(is_closed(&err));
        assert_eq!(err.op, op::LIST_POOLS);
        assert!(!called);
    }
}
