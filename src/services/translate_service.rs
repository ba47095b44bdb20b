use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use moka::future::Cache;
use tracing::{debug, info};

use crate::models::SyncError;

#[derive(Clone, Debug, PartialEq)]
pub struct Translation {
    pub translated_text: String,
    pub source_lang: String,
    pub target_lang: String,
}

/// External text-completion provider used by `translate-content`.
pub trait TextProvider: Send + Sync {
    fn translate<'a>(&'a self, text: &'a str, target_lang: &'a str) -> BoxFuture<'a, Result<Translation, SyncError>>;
}

/// Stand-in when no provider is configured.
pub struct UnconfiguredProvider;

impl TextProvider for UnconfiguredProvider {
    fn translate<'a>(&'a self, _text: &'a str, _target_lang: &'a str) -> BoxFuture<'a, Result<Translation, SyncError>> {
        async { Err(SyncError::Provider("Translation provider not configured".to_string())) }.boxed()
    }
}

/// Remembers translations per (text, target language) for a bounded time.
pub struct CachedTextProvider {
    inner: Arc<dyn TextProvider>,
    cache: Cache<(String, String), Translation>,
}

impl CachedTextProvider {
    pub fn new(inner: Arc<dyn TextProvider>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(50_000)
            .time_to_live(ttl)
            .build();
        info!("Translation cache initialized");
        Self { inner, cache }
    }
}

impl TextProvider for CachedTextProvider {
    fn translate<'a>(&'a self, text: &'a str, target_lang: &'a str) -> BoxFuture<'a, Result<Translation, SyncError>> {
        async move {
            let key = (text.to_string(), target_lang.to_string());
            if let Some(hit) = self.cache.get(&key).await {
                debug!("Translation cache hit for target {}", target_lang);
                return Ok(hit);
            }
            // Failures are not cached
            let translation = self.inner.translate(text, target_lang).await?;
            self.cache.insert(key, translation.clone()).await;
            Ok(translation)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    impl TextProvider for CountingProvider {
        fn translate<'a>(&'a self, text: &'a str, target_lang: &'a str) -> BoxFuture<'a, Result<Translation, SyncError>> {
            async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(Translation {
                    translated_text: text.to_uppercase(),
                    source_lang: "en".to_string(),
                    target_lang: target_lang.to_string(),
                })
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_cache_reuses_translations() {
        let counting = Arc::new(CountingProvider { calls: AtomicUsize::new(0) });
        let provider = CachedTextProvider::new(counting.clone(), Duration::from_secs(60));

        let first = provider.translate("hello", "de").await.unwrap();
        let second = provider.translate("hello", "de").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);

        provider.translate("hello", "fr").await.unwrap();
        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unconfigured_provider_fails() {
        let result = UnconfiguredProvider.translate("hello", "de").await;
        assert!(matches!(result, Err(SyncError::Provider(_))));
    }
}
