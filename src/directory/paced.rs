use async_trait::async_trait;
use std::future::Future;

use super::{Account, Directory, FetchError, Profile, RateLimiter};

/// Wraps a directory with the mandatory post-call pause and bounded retries.
///
/// Every call to the inner directory is followed by `limiter.pause()`, however
/// fast it returned. `RateLimited` and `Transient` failures are retried up to
/// `max_retries` times with `limiter.backoff()` in between; other failures are
/// returned at once.
pub struct PacedDirectory<D, L> {
    inner: D,
    limiter: L,
    max_retries: usize,
}

impl<D: Directory, L: RateLimiter> PacedDirectory<D, L> {
    pub fn new(inner: D, limiter: L, max_retries: usize) -> Self {
        Self {
            inner,
            limiter,
            max_retries,
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    async fn with_retry<T, F, Fut>(&self, what: &str, did: &str, mut call: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, FetchError>> + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            let result = call().await;
            self.limiter.pause().await;

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    log::warn!(
                        "Retry {}/{} of {} for {} after error: {}",
                        attempt + 1,
                        self.max_retries,
                        what,
                        did,
                        e
                    );
                    self.limiter.backoff(attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<D: Directory, L: RateLimiter> Directory for PacedDirectory<D, L> {
    async fn get_profile(&self, did: &str) -> Result<Profile, FetchError> {
        let inner = &self.inner;
        self.with_retry("get_profile", did, move || inner.get_profile(did))
            .await
    }

    async fn list_following(&self, did: &str) -> Result<Vec<Account>, FetchError> {
        let inner = &self.inner;
        self.with_retry("list_following", did, move || inner.list_following(did))
            .await
    }

    async fn list_followers(&self, did: &str) -> Result<Vec<Account>, FetchError> {
        let inner = &self.inner;
        self.with_retry("list_followers", did, move || inner.list_followers(did))
            .await
    }
}
