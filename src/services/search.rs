use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Utc};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

use crate::{
    cache::{CacheKey, ResponseCache},
    config::Config,
    error::AppResult,
    models::{CandidateItem, MediaKey, MediaType, Pagination, SearchFilters, SearchResponse, SortKey},
    services::providers::{MetadataProvider, TrendingWindow},
};

/// Raw result pages fetched per query before the pipeline runs
const FETCH_PAGES: u32 = 3;

const EXACT_MATCH_SCORE: f64 = 100.0;
const PREFIX_MATCH_SCORE: f64 = 80.0;
const SUBSTRING_MATCH_SCORE: f64 = 60.0;

/// Fuzzy similarity below this contributes nothing
const FUZZY_THRESHOLD: f64 = 0.7;
const FUZZY_MAX_SCORE: f64 = 50.0;
const TOKEN_OVERLAP_MAX: f64 = 30.0;

const POPULARITY_MAX: f64 = 20.0;
const VOTE_AVERAGE_MAX: f64 = 15.0;
const VOTE_COUNT_MAX: f64 = 10.0;
const MOVIE_BONUS: f64 = 3.0;

/// Popularity and vote-count values at which their bonus saturates
const POPULARITY_CEILING: f64 = 100.0;
const VOTE_COUNT_CEILING: f64 = 10_000.0;

/// Relevance-sorted results at or below this are dropped as noise
const RELEVANCE_NOISE_FLOOR: f64 = 10.0;

/// Inputs shorter than this get trending titles instead of a lookup
const MIN_SUGGESTION_LEN: usize = 2;
const SUGGESTION_LIMIT: usize = 8;

/// Free-text search over the upstream provider: normalize, fetch,
/// dedup, filter, score, sort, paginate. Also serves prefix-style
/// suggestions.
pub struct SearchService {
    provider: Arc<dyn MetadataProvider>,
    cache: Arc<ResponseCache>,
    search_ttl: Duration,
    suggestions_ttl: Duration,
}

impl SearchService {
    pub fn new(
        provider: Arc<dyn MetadataProvider>,
        cache: Arc<ResponseCache>,
        config: &Config,
    ) -> Self {
        Self {
            provider,
            cache,
            search_ttl: Duration::from_secs(config.search_ttl),
            suggestions_ttl: Duration::from_secs(config.suggestions_ttl),
        }
    }

    /// Runs the search pipeline for a free-text query.
    ///
    /// An empty or whitespace query resolves to the empty result shape
    /// without any network call. Results are cached per
    /// (query, filters, page, page size).
    pub async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        page: u32,
        page_size: u32,
    ) -> AppResult<SearchResponse> {
        let query = query.trim().to_lowercase();
        let page = page.max(1);
        let page_size = page_size.max(1);

        if query.is_empty() {
            return Ok(SearchResponse::empty(page_size));
        }

        let key = CacheKey::Search(cache_token(&query, filters, page, page_size));
        let provider = self.provider.clone();
        let filters = filters.clone();
        let producer_query = query.clone();

        let cached = self
            .cache
            .get_or_compute(&key, self.search_ttl, move || async move {
                let raw = fetch_pages(provider, &producer_query).await;
                tracing::info!(
                    query = %producer_query,
                    raw_results = raw.len(),
                    "Search fetch completed"
                );
                Ok(assemble(raw, &producer_query, &filters, page, page_size))
            })
            .await?;

        Ok(cached.value)
    }

    /// Prefix-style suggestions.
    ///
    /// Inputs shorter than two characters return the week's trending
    /// titles; anything else scores one page of search results by title
    /// match quality.
    pub async fn suggestions(&self, input: &str) -> AppResult<Vec<String>> {
        let input = input.trim().to_lowercase();

        if input.len() < MIN_SUGGESTION_LEN {
            let provider = self.provider.clone();
            let key = CacheKey::Suggestions("trending".to_string());
            let cached = self
                .cache
                .get_or_compute(&key, self.suggestions_ttl, move || async move {
                    let items = provider.trending(TrendingWindow::Week).await?;
                    Ok(items
                        .into_iter()
                        .take(SUGGESTION_LIMIT)
                        .map(|item| item.title)
                        .collect::<Vec<String>>())
                })
                .await?;
            return Ok(cached.value);
        }

        let provider = self.provider.clone();
        let key = CacheKey::Suggestions(input.clone());
        let cached = self
            .cache
            .get_or_compute(&key, self.suggestions_ttl, move || async move {
                let page = provider.search_multi(&input, 1).await?;
                Ok(rank_suggestions(page.items, &input))
            })
            .await?;

        Ok(cached.value)
    }
}

/// Fetch up to [`FETCH_PAGES`] pages concurrently; a failed page is
/// dropped, never the whole query.
async fn fetch_pages(provider: Arc<dyn MetadataProvider>, query: &str) -> Vec<CandidateItem> {
    let mut tasks = Vec::new();
    for page in 1..=FETCH_PAGES {
        let provider = provider.clone();
        let query = query.to_string();
        tasks.push(tokio::spawn(async move {
            provider.search_multi(&query, page).await
        }));
    }

    let mut items = Vec::new();
    for task in tasks {
        match task.await {
            Ok(Ok(page)) => items.extend(page.items),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Search page fetch failed, continuing");
            }
            Err(e) => {
                tracing::error!(error = %e, "Search page task join error");
            }
        }
    }
    items
}

/// The pure pipeline stage: dedup, filter, score, sort, paginate.
fn assemble(
    raw: Vec<CandidateItem>,
    query: &str,
    filters: &SearchFilters,
    page: u32,
    page_size: u32,
) -> SearchResponse {
    let matcher = SkimMatcherV2::default();
    let self_score = matcher.fuzzy_match(query, query).unwrap_or(1).max(1) as f64;

    // Multi-page fetches can repeat items; keep the first appearance.
    let mut seen: std::collections::HashSet<MediaKey> = std::collections::HashSet::new();
    let mut scored: Vec<(CandidateItem, f64)> = Vec::new();

    for item in raw {
        if !seen.insert(item.key()) {
            continue;
        }
        if !matches_filters(&item, filters) {
            continue;
        }
        let score = relevance_score(&item, query, &matcher, self_score);
        scored.push((item, score));
    }

    if filters.sort_by == SortKey::Relevance {
        scored.retain(|(_, score)| *score > RELEVANCE_NOISE_FLOOR);
    }

    sort_results(&mut scored, filters.sort_by);

    let total = scored.len() as u32;
    let total_pages = total.div_ceil(page_size);
    let offset = ((page - 1) * page_size) as usize;
    let results: Vec<CandidateItem> = scored
        .into_iter()
        .skip(offset)
        .take(page_size as usize)
        .map(|(item, _)| item)
        .collect();

    SearchResponse {
        results,
        pagination: Pagination {
            page,
            page_size,
            total,
            total_pages,
            has_more: page < total_pages,
        },
    }
}

/// Structural filters are independent predicates; all must pass.
fn matches_filters(item: &CandidateItem, filters: &SearchFilters) -> bool {
    if let Some(media_type) = filters.media_type {
        if item.media_type != media_type {
            return false;
        }
    }

    if filters.year_start.is_some() || filters.year_end.is_some() {
        let Some(year) = item.release_year() else {
            return false;
        };
        if let Some(start) = filters.year_start {
            if year < start {
                return false;
            }
        }
        if let Some(end) = filters.year_end {
            if year > end {
                return false;
            }
        }
    }

    if let Some(min_rating) = filters.min_rating {
        if item.vote_average < min_rating {
            return false;
        }
    }

    if !filters.genre_ids.is_empty()
        && !item
            .genre_ids
            .iter()
            .any(|genre| filters.genre_ids.contains(genre))
    {
        return false;
    }

    true
}

fn relevance_score(
    item: &CandidateItem,
    query: &str,
    matcher: &SkimMatcherV2,
    self_score: f64,
) -> f64 {
    let title = item.title.to_lowercase();

    let mut score = if title == query {
        EXACT_MATCH_SCORE
    } else if title.starts_with(query) {
        PREFIX_MATCH_SCORE
    } else if title.contains(query) {
        SUBSTRING_MATCH_SCORE
    } else {
        let similarity = matcher
            .fuzzy_match(&title, query)
            .map(|s| (s as f64 / self_score).min(1.0))
            .unwrap_or(0.0);
        let fuzzy = if similarity > FUZZY_THRESHOLD {
            similarity * FUZZY_MAX_SCORE
        } else {
            0.0
        };
        fuzzy + token_overlap_bonus(&title, query)
    };

    if item.popularity.is_finite() {
        score += (item.popularity / POPULARITY_CEILING).clamp(0.0, 1.0) * POPULARITY_MAX;
    }
    if item.vote_average.is_finite() {
        score += (item.vote_average / 10.0).clamp(0.0, 1.0) * VOTE_AVERAGE_MAX;
    }
    score += (item.vote_count as f64 / VOTE_COUNT_CEILING).clamp(0.0, 1.0) * VOTE_COUNT_MAX;
    score += recency_bonus(item);

    if item.media_type == MediaType::Movie {
        score += MOVIE_BONUS;
    }

    score
}

/// Fraction of query tokens present in the title, scaled to the bonus
/// ceiling.
fn token_overlap_bonus(title: &str, query: &str) -> f64 {
    let query_tokens: Vec<&str> = query.split_whitespace().collect();
    if query_tokens.is_empty() {
        return 0.0;
    }

    let title_tokens: std::collections::HashSet<&str> = title.split_whitespace().collect();
    let overlap = query_tokens
        .iter()
        .filter(|token| title_tokens.contains(**token))
        .count();

    (overlap as f64 / query_tokens.len() as f64) * TOKEN_OVERLAP_MAX
}

/// Tiered by age: this year or last scores full marks, then it steps
/// down to nothing past twenty years.
fn recency_bonus(item: &CandidateItem) -> f64 {
    let Some(year) = item.release_year() else {
        return 0.0;
    };
    let age = (Utc::now().year() - year).max(0);

    match age {
        0..=1 => 10.0,
        2..=3 => 8.0,
        4..=5 => 6.0,
        6..=10 => 4.0,
        11..=20 => 2.0,
        _ => 0.0,
    }
}

fn sort_results(scored: &mut [(CandidateItem, f64)], sort_by: SortKey) {
    match sort_by {
        SortKey::Relevance => {
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        }
        SortKey::Recency => {
            scored.sort_by(|a, b| b.0.release_date.cmp(&a.0.release_date));
        }
        SortKey::Popularity => {
            scored.sort_by(|a, b| {
                b.0.popularity
                    .partial_cmp(&a.0.popularity)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        SortKey::Rating => {
            scored.sort_by(|a, b| {
                b.0.vote_average
                    .partial_cmp(&a.0.vote_average)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
    }
}

/// Order one page of results by title-match quality for suggestions.
fn rank_suggestions(items: Vec<CandidateItem>, input: &str) -> Vec<String> {
    let matcher = SkimMatcherV2::default();
    let self_score = matcher.fuzzy_match(input, input).unwrap_or(1).max(1) as f64;

    let mut scored: Vec<(String, f64, f64)> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for item in items {
        let title = item.title.to_lowercase();
        if !seen.insert(title.clone()) {
            continue;
        }

        let quality = if title.starts_with(input) {
            3.0
        } else if title.contains(input) {
            2.0
        } else {
            let similarity = matcher
                .fuzzy_match(&title, input)
                .map(|s| (s as f64 / self_score).min(1.0))
                .unwrap_or(0.0);
            if similarity > FUZZY_THRESHOLD {
                1.0
            } else {
                0.0
            }
        };

        if quality > 0.0 {
            scored.push((item.title, quality, item.popularity));
        }
    }

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal))
    });

    scored
        .into_iter()
        .take(SUGGESTION_LIMIT)
        .map(|(title, _, _)| title)
        .collect()
}

/// Canonical cache token for a search request.
fn cache_token(query: &str, filters: &SearchFilters, page: u32, page_size: u32) -> String {
    let genres = filters
        .genre_ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "{}|mt={}|y={}-{}|r={}|g={}|s={:?}|p={}x{}",
        query,
        filters
            .media_type
            .map(|mt| mt.to_string())
            .unwrap_or_default(),
        filters.year_start.unwrap_or_default(),
        filters.year_end.unwrap_or_default(),
        filters.min_rating.unwrap_or_default(),
        genres,
        filters.sort_by,
        page,
        page_size
    )
}
