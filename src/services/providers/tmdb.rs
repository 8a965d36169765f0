/// TMDB metadata provider
///
/// Single point of contact with the external metadata service. Wraps
/// every call with the resilience stack the rest of the crate relies
/// on:
///
/// 1. Connection reuse + per-request timeout (one shared reqwest client)
/// 2. Coalescing of identical concurrent requests into one upstream call
/// 3. Retry with exponential backoff on transient failures (429, 5xx,
///    timeouts, connection resets)
/// 4. A circuit breaker over consecutive failures
///
/// Responses are normalized into crate models here so downstream layers
/// never see provider-specific payload shapes.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    config::Config,
    error::{AppError, AppResult, UpstreamError},
    models::{
        tmdb::{TmdbCollection, TmdbDetails, TmdbPagedResponse},
        CandidateItem, MediaType,
    },
    services::providers::{
        breaker::CircuitBreaker, DiscoverParams, DiscoverSort, MetadataProvider, SearchPage,
        TrendingWindow,
    },
};

/// Minimum vote count for rating-sorted discovery, so obscure titles
/// with three perfect votes don't dominate quality queries.
const QUALITY_VOTE_FLOOR: u32 = 200;

type InFlight = Shared<BoxFuture<'static, Result<Value, UpstreamError>>>;

#[derive(Clone)]
pub struct TmdbClient {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    retry_max_attempts: u32,
    retry_base_delay: Duration,
    breaker: Arc<CircuitBreaker>,
    in_flight: Arc<Mutex<HashMap<String, InFlight>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TmdbClient {
    /// Creates a new TMDB client from configuration
    pub fn new(config: &Config) -> AppResult<Self> {
        let http_client = HttpClient::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_key: config.tmdb_api_key.clone(),
            api_url: config.tmdb_api_url.trim_end_matches('/').to_string(),
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay: config.retry_base_delay(),
            breaker: Arc::new(CircuitBreaker::new(
                config.breaker_failure_threshold,
                config.breaker_reset(),
            )),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Core fetch: coalescing + breaker + retry.
    ///
    /// Identical concurrent requests (same path and params) share one
    /// in-flight upstream call; the slot is freed when the call
    /// completes, success or failure.
    async fn fetch(&self, path: &str, params: Vec<(String, String)>) -> Result<Value, UpstreamError> {
        let coalesce_key = Self::coalesce_key(path, &params);

        let (shared, owner) = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(&coalesce_key) {
                Some(shared) => (shared.clone(), false),
                None => {
                    let http_client = self.http_client.clone();
                    let url = format!("{}/{}", self.api_url, path.trim_start_matches('/'));
                    let mut query = params;
                    query.push(("api_key".to_string(), self.api_key.clone()));
                    let breaker = self.breaker.clone();
                    let max_attempts = self.retry_max_attempts;
                    let base_delay = self.retry_base_delay;

                    let fut = async move {
                        Self::execute_with_retry(
                            http_client,
                            url,
                            query,
                            breaker,
                            max_attempts,
                            base_delay,
                        )
                        .await
                    }
                    .boxed()
                    .shared();

                    in_flight.insert(coalesce_key.clone(), fut.clone());
                    (fut, true)
                }
            }
        };

        if !owner {
            tracing::debug!(path = %path, "Joining in-flight upstream request");
        }

        let result = shared.await;

        if owner {
            lock(&self.in_flight).remove(&coalesce_key);
        }

        result
    }

    /// Retry loop around a single upstream GET.
    ///
    /// The breaker gates every attempt; every attempt outcome is
    /// reported back to it. Only transient failures are retried, with
    /// the delay doubling after each attempt.
    async fn execute_with_retry(
        http_client: HttpClient,
        url: String,
        query: Vec<(String, String)>,
        breaker: Arc<CircuitBreaker>,
        max_attempts: u32,
        base_delay: Duration,
    ) -> Result<Value, UpstreamError> {
        let mut attempt = 0;

        loop {
            breaker.try_acquire()?;

            match Self::issue(&http_client, &url, &query).await {
                Ok(value) => {
                    breaker.record_success();
                    return Ok(value);
                }
                Err(err) => {
                    breaker.record_failure();
                    attempt += 1;

                    if err.is_transient() && attempt < max_attempts {
                        let delay = base_delay * 2u32.saturating_pow(attempt - 1);
                        tracing::warn!(
                            url = %url,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Transient upstream failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        tracing::error!(url = %url, attempt, error = %err, "Upstream call failed");
                        return Err(err);
                    }
                }
            }
        }
    }

    /// One network attempt
    async fn issue(
        http_client: &HttpClient,
        url: &str,
        query: &[(String, String)],
    ) -> Result<Value, UpstreamError> {
        let response = http_client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                message: body,
            });
        }

        response.json::<Value>().await.map_err(map_reqwest_error)
    }

    fn coalesce_key(path: &str, params: &[(String, String)]) -> String {
        let mut key = String::from(path.trim_start_matches('/'));
        key.push('?');
        for (name, value) in params {
            key.push_str(name);
            key.push('=');
            key.push_str(value);
            key.push('&');
        }
        key
    }

    /// Fetch and deserialize into a typed response
    async fn get_parsed<T: DeserializeOwned>(
        &self,
        path: &str,
        params: Vec<(String, String)>,
    ) -> AppResult<T> {
        let value = self.fetch(path, params).await?;
        serde_json::from_value(value)
            .map_err(|e| AppError::Internal(format!("Failed to parse provider response: {}", e)))
    }

    fn discover_params(media_type: MediaType, params: &DiscoverParams) -> Vec<(String, String)> {
        let mut query = Vec::new();

        let join = |ids: &[u64]| {
            ids.iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join("|")
        };

        if !params.genre_ids.is_empty() {
            query.push(("with_genres".to_string(), join(&params.genre_ids)));
        }
        if !params.person_ids.is_empty() {
            query.push(("with_people".to_string(), join(&params.person_ids)));
        }
        if !params.keyword_ids.is_empty() {
            query.push(("with_keywords".to_string(), join(&params.keyword_ids)));
        }
        if !params.company_ids.is_empty() {
            query.push(("with_companies".to_string(), join(&params.company_ids)));
        }
        if let Some(language) = &params.original_language {
            query.push(("with_original_language".to_string(), language.clone()));
        }

        let (date_gte, date_lte) = match media_type {
            MediaType::Movie => ("primary_release_date.gte", "primary_release_date.lte"),
            MediaType::Series => ("first_air_date.gte", "first_air_date.lte"),
        };
        if let Some(year) = params.year_start {
            query.push((date_gte.to_string(), format!("{}-01-01", year)));
        }
        if let Some(year) = params.year_end {
            query.push((date_lte.to_string(), format!("{}-12-31", year)));
        }

        match params.sort_by {
            DiscoverSort::Popularity => {
                query.push(("sort_by".to_string(), "popularity.desc".to_string()));
            }
            DiscoverSort::Rating => {
                query.push(("sort_by".to_string(), "vote_average.desc".to_string()));
                query.push((
                    "vote_count.gte".to_string(),
                    QUALITY_VOTE_FLOOR.to_string(),
                ));
            }
        }

        query
    }
}

#[async_trait]
impl MetadataProvider for TmdbClient {
    async fn search_multi(&self, query: &str, page: u32) -> AppResult<SearchPage> {
        let response: TmdbPagedResponse = self
            .get_parsed(
                "search/multi",
                vec![
                    ("query".to_string(), query.to_string()),
                    ("page".to_string(), page.to_string()),
                    ("include_adult".to_string(), "false".to_string()),
                ],
            )
            .await?;

        Ok(SearchPage {
            items: response.normalize(None),
            total_pages: response.total_pages,
        })
    }

    async fn item_details(&self, media_type: MediaType, id: u64) -> AppResult<TmdbDetails> {
        self.get_parsed(
            &format!("{}/{}", media_type.as_path_segment(), id),
            vec![(
                "append_to_response".to_string(),
                "credits,keywords".to_string(),
            )],
        )
        .await
    }

    async fn aggregate_details(&self, media_type: MediaType, id: u64) -> AppResult<Value> {
        let value = self
            .fetch(
                &format!("{}/{}", media_type.as_path_segment(), id),
                vec![(
                    "append_to_response".to_string(),
                    "credits,keywords,images,videos,similar,recommendations".to_string(),
                )],
            )
            .await?;
        Ok(value)
    }

    async fn similar(&self, media_type: MediaType, id: u64) -> AppResult<Vec<CandidateItem>> {
        let response: TmdbPagedResponse = self
            .get_parsed(
                &format!("{}/{}/similar", media_type.as_path_segment(), id),
                Vec::new(),
            )
            .await?;
        Ok(response.normalize(Some(media_type)))
    }

    async fn recommendations_for(
        &self,
        media_type: MediaType,
        id: u64,
    ) -> AppResult<Vec<CandidateItem>> {
        let response: TmdbPagedResponse = self
            .get_parsed(
                &format!("{}/{}/recommendations", media_type.as_path_segment(), id),
                Vec::new(),
            )
            .await?;
        Ok(response.normalize(Some(media_type)))
    }

    async fn discover(
        &self,
        media_type: MediaType,
        params: DiscoverParams,
    ) -> AppResult<Vec<CandidateItem>> {
        let query = Self::discover_params(media_type, &params);
        let response: TmdbPagedResponse = self
            .get_parsed(&format!("discover/{}", media_type.as_path_segment()), query)
            .await?;
        Ok(response.normalize(Some(media_type)))
    }

    async fn trending(&self, window: TrendingWindow) -> AppResult<Vec<CandidateItem>> {
        let response: TmdbPagedResponse = self
            .get_parsed(&format!("trending/all/{}", window.as_str()), Vec::new())
            .await?;
        Ok(response.normalize(None))
    }

    async fn collection(&self, collection_id: u64) -> AppResult<Vec<CandidateItem>> {
        let collection: TmdbCollection = self
            .get_parsed(&format!("collection/{}", collection_id), Vec::new())
            .await?;
        Ok(collection
            .parts
            .iter()
            .filter_map(|part| part.normalize(Some(MediaType::Movie)))
            .collect())
    }

    async fn raw(&self, path: &str, query: &[(String, String)]) -> AppResult<Value> {
        let value = self.fetch(path, query.to_vec()).await?;
        Ok(value)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout
    } else {
        UpstreamError::Transport(err.to_string())
    }
}
