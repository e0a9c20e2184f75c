use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Semaphore, TryAcquireError};

/// Single-holder lease on the DPA client. Acquisition fails with
/// [`LeaseError::Busy`] if another run already holds it. The returned
/// [`LeaseGuard`] releases the permit on drop, including on panics — the
/// Rust expression of "release on every exit path" instead of a
/// destructor-in-exceptional-paths discipline.
#[derive(Clone)]
pub struct ExclusiveLease {
    permit: Arc<Semaphore>,
}

impl Default for ExclusiveLease {
    fn default() -> Self {
        Self::new()
    }
}

impl ExclusiveLease {
    pub fn new() -> Self {
        Self {
            permit: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn try_acquire(&self) -> Result<LeaseGuard, LeaseError> {
        match self.permit.clone().try_acquire_owned() {
            Ok(permit) => Ok(LeaseGuard { _permit: permit }),
            Err(TryAcquireError::NoPermits) => Err(LeaseError::Busy),
            Err(TryAcquireError::Closed) => Err(LeaseError::Closed),
        }
    }
}

pub struct LeaseGuard {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LeaseError {
    #[error("exclusive access to the DPA client is already held")]
    Busy,
    #[error("exclusive access lease was closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_busy_while_first_held() {
        let lease = ExclusiveLease::new();
        let first = lease.try_acquire().unwrap();
        assert_eq!(lease.try_acquire().unwrap_err(), LeaseError::Busy);
        drop(first);
        assert!(lease.try_acquire().is_ok());
    }

    #[test]
    fn guard_release_on_drop_frees_the_lease() {
        let lease = ExclusiveLease::new();
        {
            let _guard = lease.try_acquire().unwrap();
            assert_eq!(lease.try_acquire().unwrap_err(), LeaseError::Busy);
        }
        assert!(lease.try_acquire().is_ok());
    }
}
