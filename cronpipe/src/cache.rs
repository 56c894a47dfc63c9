//! Cache invalidation hook.
//!
//! After data-changing work completes the executors tell the downstream
//! read cache to refresh. Invalidation is fire-and-forget: it never blocks
//! the caller and its failures never affect a run's outcome.

use std::fmt::Debug;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Signals a downstream cache to refresh its data.
pub trait CacheInvalidator: Send + Sync + Debug {
    /// Requests invalidation. Must return immediately.
    fn invalidate(&self);
}

/// Does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCacheInvalidator;

impl CacheInvalidator for NoOpCacheInvalidator {
    fn invalidate(&self) {}
}

/// Records the invalidation in the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingCacheInvalidator;

impl CacheInvalidator for LoggingCacheInvalidator {
    fn invalidate(&self) {
        info!("Cache invalidation requested");
    }
}

/// POSTs to a revalidation endpoint on a background task.
#[derive(Debug, Clone)]
pub struct HttpCacheInvalidator {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpCacheInvalidator {
    /// Creates an invalidator for `url`, sending `token` as a bearer when set.
    pub fn new(url: impl Into<String>, token: Option<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            token,
        })
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl CacheInvalidator for HttpCacheInvalidator {
    fn invalidate(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(url = %self.url, "No runtime available, cache invalidation dropped");
            return;
        };

        let mut request = self.client.post(&self.url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let url = self.url.clone();

        handle.spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(url = %url, "Cache invalidated");
                }
                Ok(response) => {
                    warn!(url = %url, status = %response.status(), "Cache invalidation rejected");
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Cache invalidation failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_and_logging() {
        NoOpCacheInvalidator.invalidate();
        LoggingCacheInvalidator.invalidate();
    }

    #[test]
    fn test_http_without_runtime_does_not_panic() {
        let invalidator = HttpCacheInvalidator::new("http://127.0.0.1:9/revalidate", None).unwrap();
        assert_eq!(invalidator.url(), "http://127.0.0.1:9/revalidate");
        invalidator.invalidate();
    }

    #[tokio::test]
    async fn test_http_failure_is_swallowed() {
        let invalidator =
            HttpCacheInvalidator::new("http://127.0.0.1:9/revalidate", Some("secret".into())).unwrap();
        invalidator.invalidate();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
