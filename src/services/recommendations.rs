use std::sync::Arc;
use std::time::Duration;

use crate::{
    cache::{CacheKey, ResponseCache},
    config::Config,
    error::{AppError, AppResult},
    models::{CandidateItem, MediaKey, MediaType, RankedFeed, UserSignals},
    services::{
        profile::extract_taste_profile,
        providers::{MetadataProvider, TrendingWindow},
        ranking::{rank, RankingContext},
        retrieval::RetrievalOrchestrator,
    },
};

/// Generates personalized watch recommendations.
///
/// The home feed derives a taste profile from the caller-provided watch
/// history and saved list, fans out discovery queries, and ranks the
/// merged candidates; item-detail recommendations do the same around a
/// single reference title. Results are cache-wrapped, and a failed
/// personalized generation degrades to the trending listing instead of
/// failing the request.
pub struct RecommendationService {
    provider: Arc<dyn MetadataProvider>,
    cache: Arc<ResponseCache>,
    orchestrator: RetrievalOrchestrator,
    recommendations_ttl: Duration,
    trending_ttl: Duration,
    default_language: String,
}

impl RecommendationService {
    pub fn new(
        provider: Arc<dyn MetadataProvider>,
        cache: Arc<ResponseCache>,
        config: &Config,
    ) -> Self {
        Self {
            orchestrator: RetrievalOrchestrator::new(
                provider.clone(),
                config.enhancement_deadline(),
            ),
            provider,
            cache,
            recommendations_ttl: Duration::from_secs(config.recommendations_ttl),
            trending_ttl: Duration::from_secs(config.trending_ttl),
            default_language: config.default_language.clone(),
        }
    }

    /// Personalized home feed for one user.
    ///
    /// Empty signals skip personalization entirely and serve the
    /// trending listing; so does any failure inside personalized
    /// generation. The `from_cache` flag reports whichever cache entry
    /// actually answered.
    pub async fn home_feed(&self, user_key: &str, signals: &UserSignals) -> AppResult<RankedFeed> {
        if signals.is_empty() {
            tracing::debug!(user = %user_key, "No signals, serving trending feed");
            return self.trending_feed().await;
        }

        let key = CacheKey::Recommendations(user_key.to_string());
        let provider = self.provider.clone();
        let orchestrator = self.orchestrator.clone();
        let signals_owned = signals.clone();
        let default_language = self.default_language.clone();

        let outcome = self
            .cache
            .get_or_compute(&key, self.recommendations_ttl, move || async move {
                let profile =
                    extract_taste_profile(provider, &signals_owned, &default_language).await;
                let sources = orchestrator.for_profile(&profile).await;
                let ctx = RankingContext::home_feed(profile, &signals_owned);
                let ranked = rank(&sources, &ctx);

                if ranked.is_empty() {
                    // Nothing is cached on failure; the caller falls
                    // back to trending.
                    return Err(AppError::NotFound(
                        "No personalized candidates survived ranking".to_string(),
                    ));
                }

                tracing::info!(items = ranked.len(), "Personalized feed generated");
                Ok(ranked)
            })
            .await;

        match outcome {
            Ok(cached) => Ok(RankedFeed {
                items: cached.value,
                from_cache: cached.from_cache,
            }),
            Err(e) => {
                tracing::warn!(user = %user_key, error = %e, "Personalized feed failed, serving trending");
                self.trending_feed().await
            }
        }
    }

    /// Recommendations shown on an item's detail view.
    ///
    /// A missing or invalid reference item propagates as a typed
    /// failure; degraded sources merely shrink the result.
    pub async fn for_item(
        &self,
        media_type: MediaType,
        id: u64,
        user_key: Option<&str>,
        signals: &UserSignals,
    ) -> AppResult<RankedFeed> {
        let reference_key = MediaKey { media_type, id };
        let key = CacheKey::ItemRecommendations {
            key: reference_key,
            user: user_key.map(str::to_string),
        };

        let provider = self.provider.clone();
        let orchestrator = self.orchestrator.clone();
        let signals_owned = signals.clone();
        let default_language = self.default_language.clone();

        let cached = self
            .cache
            .get_or_compute(&key, self.recommendations_ttl, move || async move {
                let reference = provider.item_details(media_type, id).await?;

                let profile =
                    extract_taste_profile(provider, &signals_owned, &default_language).await;
                let sources = orchestrator.for_item(media_type, &reference).await;
                let ctx = RankingContext::item_detail(profile, reference_key, &signals_owned);

                Ok(rank(&sources, &ctx))
            })
            .await?;

        Ok(RankedFeed {
            items: cached.value,
            from_cache: cached.from_cache,
        })
    }

    /// Unpersonalized fallback feed.
    pub async fn trending_feed(&self) -> AppResult<RankedFeed> {
        let provider = self.provider.clone();
        let key = CacheKey::Trending(TrendingWindow::Day.as_str().to_string());

        let cached = self
            .cache
            .get_or_compute(&key, self.trending_ttl, move || async move {
                let items: Vec<CandidateItem> = provider
                    .trending(TrendingWindow::Day)
                    .await?
                    .into_iter()
                    .filter(CandidateItem::has_artwork)
                    .collect();
                Ok(items)
            })
            .await?;

        Ok(RankedFeed {
            items: cached.value,
            from_cache: cached.from_cache,
        })
    }

    /// Drops a user's cached feed after their underlying state changed
    /// (e.g. a new watch-history entry).
    pub fn invalidate_user(&self, user_key: &str) {
        self.cache
            .invalidate(&CacheKey::Recommendations(user_key.to_string()));
    }
}
