//! Bounded concurrency, per-call timeouts and retry for external services.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::{PoolConfig, RetryConfig};
use crate::error::ServiceError;

/// Limits in-flight calls to one external service.
///
/// Cloning shares the underlying permits.
#[derive(Debug, Clone)]
pub struct ServiceGate {
    service: &'static str,
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
    request_timeout: Duration,
}

impl ServiceGate {
    pub fn new(service: &'static str, config: &PoolConfig) -> Self {
        Self {
            service,
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            acquire_timeout: config.acquire_timeout(),
            request_timeout: config.request_timeout(),
        }
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Wait for a free slot, giving up after the acquire timeout.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, ServiceError> {
        let started = Instant::now();
        match tokio::time::timeout(self.acquire_timeout, self.permits.clone().acquire_owned()).await
        {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(ServiceError::unavailable(self.service, "connection pool closed")),
            Err(_) => Err(ServiceError::PoolSaturated {
                service: self.service.to_string(),
                waited_ms: started.elapsed().as_millis() as u64,
            }),
        }
    }

    /// Run one call while holding a slot, bounded by the request timeout.
    pub async fn call<T, F>(&self, call: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        let _permit = self.acquire().await?;
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::timeout(
                self.service,
                format!("no response within {}ms", self.request_timeout.as_millis()),
            )),
        }
    }
}

/// Retry `op` on transient errors with exponential backoff.
///
/// Permanent errors and the last transient error are returned as-is.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryConfig,
    operation: &str,
    mut op: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            let delay = policy.delay_for(attempt);
            log::debug!("Retrying {operation} (attempt {attempt}) after {}ms", delay.as_millis());
            tokio::time::sleep(delay).await;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                log::warn!("{operation} failed (attempt {attempt}): {e}");
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    log::warn!("{operation} failed after {} attempt(s): {e}", attempt + 1);
                }
                return Err(e);
            }
        }
    }
}
