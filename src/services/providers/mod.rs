/// Upstream metadata provider abstraction
///
/// The orchestration, search and recommendation layers talk to the
/// external provider only through this trait, so provider specifics
/// (and the resilience plumbing wrapped around them) stay behind one
/// seam and tests can substitute a mock.
use async_trait::async_trait;
use serde_json::Value;

use crate::{
    error::AppResult,
    models::{tmdb::TmdbDetails, CandidateItem, MediaType},
};

pub mod breaker;
pub mod tmdb;

/// Time window for trending listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendingWindow {
    Day,
    Week,
}

impl TrendingWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendingWindow::Day => "day",
            TrendingWindow::Week => "week",
        }
    }
}

/// Sort key for discovery queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DiscoverSort {
    #[default]
    Popularity,
    Rating,
}

/// Parameters of one discovery query.
///
/// Multi-valued fields are OR-combined; every present field narrows the
/// result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoverParams {
    pub genre_ids: Vec<u64>,
    pub person_ids: Vec<u64>,
    pub keyword_ids: Vec<u64>,
    pub company_ids: Vec<u64>,
    pub original_language: Option<String>,
    pub year_start: Option<i32>,
    pub year_end: Option<i32>,
    pub sort_by: DiscoverSort,
}

/// One page of multi-type search results
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub items: Vec<CandidateItem>,
    pub total_pages: u32,
}

/// Trait for upstream metadata providers
///
/// Implementations own connection reuse, per-request timeouts, retry,
/// circuit breaking and request coalescing; callers see normalized
/// [`CandidateItem`]s and typed detail payloads.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Multi-type title search, one page at a time
    async fn search_multi(&self, query: &str, page: u32) -> AppResult<SearchPage>;

    /// Item details expanded with credits and keywords
    async fn item_details(&self, media_type: MediaType, id: u64) -> AppResult<TmdbDetails>;

    /// Single aggregated detail bundle
    /// (details + credits + keywords + images + videos + similar + recommendations)
    async fn aggregate_details(&self, media_type: MediaType, id: u64) -> AppResult<Value>;

    /// Provider-curated similar titles
    async fn similar(&self, media_type: MediaType, id: u64) -> AppResult<Vec<CandidateItem>>;

    /// Provider-curated recommendations for an item
    async fn recommendations_for(
        &self,
        media_type: MediaType,
        id: u64,
    ) -> AppResult<Vec<CandidateItem>>;

    /// Discovery query parameterized by genre/person/keyword/company/
    /// language/date-range
    async fn discover(
        &self,
        media_type: MediaType,
        params: DiscoverParams,
    ) -> AppResult<Vec<CandidateItem>>;

    /// Trending listing for the given window
    async fn trending(&self, window: TrendingWindow) -> AppResult<Vec<CandidateItem>>;

    /// Collection (franchise) members
    async fn collection(&self, collection_id: u64) -> AppResult<Vec<CandidateItem>>;

    /// Pass-through GET for arbitrary provider endpoints
    async fn raw(&self, path: &str, query: &[(String, String)]) -> AppResult<Value>;
}
