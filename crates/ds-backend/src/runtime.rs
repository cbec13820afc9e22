use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::backend::ModelBackend;
use crate::error::Result;

/// Reference-counted owner of a backend's process-level runtime.
///
/// The first lease calls `ModelBackend::init`; dropping the last lease
/// calls `ModelBackend::shutdown`. Several model contexts can share one
/// runtime.
pub struct BackendRuntime<B: ModelBackend> {
    backend: B,
    users: Mutex<usize>,
}

impl<B: ModelBackend> BackendRuntime<B> {
    pub fn new(backend: B) -> Arc<Self> {
        Arc::new(Self {
            backend,
            users: Mutex::new(0),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Number of outstanding leases.
    pub fn users(&self) -> usize {
        *self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a lease, initializing the backend if this is the first one.
    pub fn lease(self: &Arc<Self>) -> Result<RuntimeLease<B>> {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        if *users == 0 {
            debug!(backend = self.backend.name(), "initializing backend runtime");
            self.backend.init()?;
        }
        *users += 1;
        Ok(RuntimeLease {
            runtime: Arc::clone(self),
        })
    }

    fn release(&self) {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        match *users {
            0 => warn!(backend = self.backend.name(), "runtime released with no leases"),
            1 => {
                *users = 0;
                debug!(backend = self.backend.name(), "shutting down backend runtime");
                self.backend.shutdown();
            }
            _ => *users -= 1,
        }
    }
}

/// A held reference on a `BackendRuntime`. Released on drop.
pub struct RuntimeLease<B: ModelBackend> {
    runtime: Arc<BackendRuntime<B>>,
}

impl<B: ModelBackend> RuntimeLease<B> {
    pub fn backend(&self) -> &B {
        self.runtime.backend()
    }

    pub fn runtime(&self) -> &Arc<BackendRuntime<B>> {
        &self.runtime
    }
}

impl<B: ModelBackend> Drop for RuntimeLease<B> {
    fn drop(&mut self) {
        self.runtime.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, MockConfig, MockEvent};

    #[test]
    fn test_first_lease_inits_last_release_shuts_down() {
        let runtime = BackendRuntime::new(MockBackend::default());
        let a = runtime.lease().unwrap();
        let b = runtime.lease().unwrap();
        assert_eq!(runtime.users(), 2);
        assert_eq!(runtime.backend().events(), vec![MockEvent::Init]);

        drop(a);
        assert_eq!(runtime.users(), 1);
        drop(b);
        assert_eq!(runtime.users(), 0);
        assert_eq!(
            runtime.backend().events(),
            vec![MockEvent::Init, MockEvent::Shutdown]
        );
    }

    #[test]
    fn test_failed_init_takes_no_lease() {
        let runtime = BackendRuntime::new(MockBackend::new(MockConfig {
            fail_init: true,
            ..MockConfig::default()
        }));
        assert!(runtime.lease().is_err());
        assert_eq!(runtime.users(), 0);
        assert!(runtime.backend().events().is_empty());
    }

    #[test]
    fn test_reinit_after_full_release() {
        let runtime = BackendRuntime::new(MockBackend::default());
        drop(runtime.lease().unwrap());
        drop(runtime.lease().unwrap());
        assert_eq!(
            runtime.backend().events(),
            vec![
                MockEvent::Init,
                MockEvent::Shutdown,
                MockEvent::Init,
                MockEvent::Shutdown
            ]
        );
    }
}
