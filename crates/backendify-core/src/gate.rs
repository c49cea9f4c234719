//! Admission control in front of the fetch engine

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, info};

use crate::error::FetchError;

/// Bounds the number of requests concurrently inside the fetch engine.
///
/// The capacity is independent of the worker count: with more admission
/// tokens than workers, saturated pools surface as `PoolBusy` from the engine
/// rather than as `Overloaded` here.
pub struct AdmissionGate {
    permits: Arc<Semaphore>,
    capacity: usize,
    wait: Duration,
}

/// Right to enter the fetch engine. Released when dropped.
#[derive(Debug)]
pub struct AdmissionToken {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionGate {
    /// Create a gate with `capacity` tokens; `acquire` waits at most `wait`
    pub fn new(capacity: usize, wait: Duration) -> Self {
        info!(
            "Initializing admission gate (capacity: {}, max wait: {:?})",
            capacity, wait
        );

        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            wait,
        }
    }

    /// Wait for a token.
    ///
    /// Fails with [`FetchError::Overloaded`] once the wait bound elapses.
    /// Dropping the returned future abandons the attempt without holding a
    /// token.
    pub async fn acquire(&self) -> Result<AdmissionToken, FetchError> {
        match tokio::time::timeout(self.wait, self.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(AdmissionToken { _permit: permit }),
            Ok(Err(_)) => Err(FetchError::Overloaded),
            Err(_) => {
                debug!("Admission wait of {:?} elapsed", self.wait);
                Err(FetchError::Overloaded)
            }
        }
    }

    /// Take a token only if one is free right now
    pub fn try_acquire(&self) -> Result<AdmissionToken, FetchError> {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => Ok(AdmissionToken { _permit: permit }),
            Err(TryAcquireError::NoPermits) | Err(TryAcquireError::Closed) => {
                Err(FetchError::Overloaded)
            }
        }
    }

    /// Tokens currently free
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_beyond_capacity() {
        let gate = AdmissionGate::new(2, Duration::from_millis(20));

        let first = gate.acquire().await.unwrap();
        let _second = gate.acquire().await.unwrap();
        assert_eq!(gate.available(), 0);

        assert_eq!(gate.acquire().await.unwrap_err(), FetchError::Overloaded);
        assert_eq!(gate.try_acquire().unwrap_err(), FetchError::Overloaded);

        drop(first);
        assert_eq!(gate.available(), 1);
        assert!(gate.try_acquire().is_ok());
    }

    #[tokio::test]
    async fn test_waiter_is_admitted_when_token_frees() {
        let gate = Arc::new(AdmissionGate::new(1, Duration::from_secs(5)));
        let held = gate.acquire().await.unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire().await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert!(waiter.await.unwrap().is_ok());
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_leak() {
        let gate = Arc::new(AdmissionGate::new(1, Duration::from_secs(30)));
        let held = gate.acquire().await.unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let _token = gate.acquire().await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        waiter.abort();
        let _ = waiter.await;

        drop(held);
        assert_eq!(gate.available(), gate.capacity());
        assert!(gate.try_acquire().is_ok());
    }
}
