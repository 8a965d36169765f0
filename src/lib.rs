//! Personalized movie/TV recommendation and search core.
//!
//! Aggregates a user's viewing signals and fans out to an external
//! metadata provider to produce ranked recommendations and
//! relevance-scored search results, shielding callers from the
//! provider's latency, rate limits and transient failures.
//!
//! Everything is an explicitly constructed service object: build a
//! [`Config`], a [`TmdbClient`] and a [`ResponseCache`], then compose
//! the services on top.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use screenpick::{Config, RecommendationService, ResponseCache, TmdbClient};
//!
//! # fn main() -> screenpick::AppResult<()> {
//! let config = Config::from_env()?;
//! let provider = Arc::new(TmdbClient::new(&config)?);
//! let cache = Arc::new(ResponseCache::new());
//! let recommendations = RecommendationService::new(provider, cache, &config);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use cache::{CacheKey, Cached, ResponseCache};
pub use config::Config;
pub use error::{AppError, AppResult, UpstreamError};
pub use services::details::DetailService;
pub use services::providers::tmdb::TmdbClient;
pub use services::providers::{MetadataProvider, TrendingWindow};
pub use services::recommendations::RecommendationService;
pub use services::search::SearchService;
