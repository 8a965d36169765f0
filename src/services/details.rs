use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::{
    cache::{CacheKey, ResponseCache},
    cached,
    config::Config,
    error::AppResult,
    models::{MediaKey, MediaType},
    services::providers::MetadataProvider,
};

/// Aggregated item details and the generic provider pass-through.
pub struct DetailService {
    provider: Arc<dyn MetadataProvider>,
    cache: Arc<ResponseCache>,
    details_ttl: Duration,
    proxy_ttl: Duration,
}

impl DetailService {
    pub fn new(
        provider: Arc<dyn MetadataProvider>,
        cache: Arc<ResponseCache>,
        config: &Config,
    ) -> Self {
        Self {
            provider,
            cache,
            details_ttl: Duration::from_secs(config.details_ttl),
            proxy_ttl: Duration::from_secs(config.proxy_ttl),
        }
    }

    /// Everything an item detail modal needs in one call: details,
    /// credits, keywords, images, videos, similar and recommended
    /// titles.
    pub async fn modal(&self, media_type: MediaType, id: u64) -> AppResult<Value> {
        let key = CacheKey::Details(MediaKey { media_type, id });

        cached!(
            self.cache,
            key,
            self.details_ttl,
            self.provider.aggregate_details(media_type, id)
        )
    }

    /// Generic pass-through for arbitrary provider GET endpoints,
    /// cached by path + query.
    pub async fn proxy(&self, path: &str, query: &[(String, String)]) -> AppResult<Value> {
        let key = CacheKey::Proxy(proxy_token(path, query));

        cached!(
            self.cache,
            key,
            self.proxy_ttl,
            self.provider.raw(path, query)
        )
    }
}

fn proxy_token(path: &str, query: &[(String, String)]) -> String {
    let mut token = path.trim_matches('/').to_string();
    for (name, value) in query {
        token.push_str(&format!("&{}={}", name, value));
    }
    token
}
