use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::{
    error::AppResult,
    models::{tmdb::TmdbDetails, CandidateItem, MediaType, SourceResult, SourceTag, TasteProfile},
    services::providers::{DiscoverParams, DiscoverSort, MetadataProvider},
};

/// How many of the reference item's keywords seed the keyword source
const KEYWORD_SEEDS: usize = 3;

/// How many of the reference item's genres seed the era source
const ERA_GENRE_SEEDS: usize = 2;

/// Issues the bounded set of tagged parallel discovery queries behind a
/// recommendation request.
///
/// All sources are spawned up front and run concurrently. Primary
/// sources are awaited without a deadline; secondary "enhancement"
/// sources race one shared deadline and resolve to an empty result set
/// when it passes — the underlying task keeps running and settles the
/// provider's breaker/coalescing state on its own time. One failing
/// source never aborts the others.
#[derive(Clone)]
pub struct RetrievalOrchestrator {
    provider: Arc<dyn MetadataProvider>,
    enhancement_deadline: Duration,
}

type SourceHandle = (SourceTag, JoinHandle<AppResult<Vec<CandidateItem>>>);

impl RetrievalOrchestrator {
    pub fn new(provider: Arc<dyn MetadataProvider>, enhancement_deadline: Duration) -> Self {
        Self {
            provider,
            enhancement_deadline,
        }
    }

    /// Profile-driven fan-out for the home feed.
    pub async fn for_profile(&self, profile: &TasteProfile) -> Vec<SourceResult> {
        let mut handles: Vec<SourceHandle> = Vec::new();

        if !profile.top_genres.is_empty() {
            handles.push(self.spawn_dual_discover(
                SourceTag::GenrePopular,
                DiscoverParams {
                    genre_ids: profile.top_genres.clone(),
                    sort_by: DiscoverSort::Popularity,
                    ..DiscoverParams::default()
                },
            ));
            handles.push(self.spawn_dual_discover(
                SourceTag::GenreTopRated,
                DiscoverParams {
                    genre_ids: profile.top_genres.clone(),
                    sort_by: DiscoverSort::Rating,
                    ..DiscoverParams::default()
                },
            ));
        }

        if !profile.top_people.is_empty() {
            handles.push(self.spawn_discover(
                SourceTag::People,
                MediaType::Movie,
                DiscoverParams {
                    person_ids: profile.top_people.clone(),
                    ..DiscoverParams::default()
                },
            ));
        }

        if !profile.top_keywords.is_empty() {
            handles.push(self.spawn_discover(
                SourceTag::Keyword,
                MediaType::Movie,
                DiscoverParams {
                    keyword_ids: profile.top_keywords.clone(),
                    ..DiscoverParams::default()
                },
            ));
        }

        if let Some(era) = profile.top_era {
            handles.push(self.spawn_discover(
                SourceTag::EraGenre,
                MediaType::Movie,
                DiscoverParams {
                    genre_ids: profile.top_genres.clone(),
                    year_start: Some(era),
                    year_end: Some(era + 9),
                    ..DiscoverParams::default()
                },
            ));
        }

        if let Some(language) = &profile.top_language {
            handles.push(self.spawn_discover(
                SourceTag::Language,
                MediaType::Movie,
                DiscoverParams {
                    original_language: Some(language.clone()),
                    ..DiscoverParams::default()
                },
            ));
        }

        self.settle(handles).await
    }

    /// Reference-driven fan-out for item-detail recommendations.
    pub async fn for_item(
        &self,
        media_type: MediaType,
        reference: &TmdbDetails,
    ) -> Vec<SourceResult> {
        let mut handles: Vec<SourceHandle> = Vec::new();

        if let Some(collection) = &reference.belongs_to_collection {
            let provider = self.provider.clone();
            let collection_id = collection.id;
            handles.push((
                SourceTag::Franchise,
                tokio::spawn(async move { provider.collection(collection_id).await }),
            ));
        }

        let provider = self.provider.clone();
        let id = reference.id;
        handles.push((
            SourceTag::Similar,
            tokio::spawn(async move { provider.similar(media_type, id).await }),
        ));

        let provider = self.provider.clone();
        handles.push((
            SourceTag::Recommendations,
            tokio::spawn(async move { provider.recommendations_for(media_type, id).await }),
        ));

        // Enhancement sources seeded from the reference's own details.
        // with_people is a movie-only discovery facet upstream.
        let directors = reference.director_ids();
        if !directors.is_empty() && media_type == MediaType::Movie {
            handles.push(self.spawn_discover(
                SourceTag::People,
                MediaType::Movie,
                DiscoverParams {
                    person_ids: directors,
                    ..DiscoverParams::default()
                },
            ));
        }

        let keywords: Vec<u64> = reference.keyword_ids().into_iter().take(KEYWORD_SEEDS).collect();
        if !keywords.is_empty() {
            handles.push(self.spawn_discover(
                SourceTag::Keyword,
                media_type,
                DiscoverParams {
                    keyword_ids: keywords,
                    ..DiscoverParams::default()
                },
            ));
        }

        if let Some(company) = reference.production_companies.first() {
            handles.push(self.spawn_discover(
                SourceTag::Studio,
                media_type,
                DiscoverParams {
                    company_ids: vec![company.id],
                    ..DiscoverParams::default()
                },
            ));
        }

        if let Some(date) = reference.release_date_parsed() {
            use chrono::Datelike;
            let year = date.year();
            let era = year - year.rem_euclid(10);
            handles.push(self.spawn_discover(
                SourceTag::EraGenre,
                media_type,
                DiscoverParams {
                    genre_ids: reference.genre_ids().into_iter().take(ERA_GENRE_SEEDS).collect(),
                    year_start: Some(era),
                    year_end: Some(era + 9),
                    ..DiscoverParams::default()
                },
            ));
        }

        self.settle(handles).await
    }

    fn spawn_discover(
        &self,
        tag: SourceTag,
        media_type: MediaType,
        params: DiscoverParams,
    ) -> SourceHandle {
        let provider = self.provider.clone();
        (
            tag,
            tokio::spawn(async move { provider.discover(media_type, params).await }),
        )
    }

    /// Genre sources cover both movies and series in one logical query.
    fn spawn_dual_discover(&self, tag: SourceTag, params: DiscoverParams) -> SourceHandle {
        let provider = self.provider.clone();
        (
            tag,
            tokio::spawn(async move {
                let (movies, series) = tokio::join!(
                    provider.discover(MediaType::Movie, params.clone()),
                    provider.discover(MediaType::Series, params.clone())
                );

                // Either half may fail on its own; keep the other.
                let mut items = Vec::new();
                for half in [movies, series] {
                    match half {
                        Ok(mut fetched) => items.append(&mut fetched),
                        Err(e) => {
                            tracing::warn!(source = tag.as_str(), error = %e, "Partial source failure")
                        }
                    }
                }
                Ok(items)
            }),
        )
    }

    /// Settle every source, applying the shared enhancement deadline to
    /// secondary ones. Failures and deadline misses degrade to empty
    /// result sets.
    async fn settle(&self, handles: Vec<SourceHandle>) -> Vec<SourceResult> {
        let deadline = Instant::now() + self.enhancement_deadline;
        let mut results = Vec::with_capacity(handles.len());

        for (tag, handle) in handles {
            let outcome = if tag.is_primary() {
                handle.await
            } else {
                match tokio::time::timeout_at(deadline, handle).await {
                    Ok(joined) => joined,
                    Err(_elapsed) => {
                        tracing::debug!(
                            source = tag.as_str(),
                            "Enhancement source missed the deadline, continuing without it"
                        );
                        results.push(SourceResult::empty(tag));
                        continue;
                    }
                }
            };

            let items = match outcome {
                Ok(Ok(items)) => items,
                Ok(Err(e)) => {
                    tracing::warn!(source = tag.as_str(), error = %e, "Source failed, skipping");
                    Vec::new()
                }
                Err(e) => {
                    tracing::error!(source = tag.as_str(), error = %e, "Source task join error");
                    Vec::new()
                }
            };

            tracing::debug!(source = tag.as_str(), items = items.len(), "Source settled");
            results.push(SourceResult { source: tag, items });
        }

        results
    }
}
