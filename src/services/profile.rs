use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    models::{TasteProfile, UserSignals, WatchHistoryItem},
    services::providers::MetadataProvider,
};

/// Per-step decay applied across the watch history, newest first
const GENRE_DECAY: f64 = 0.95;

/// Per-step decay applied across the deep-signal detail fetches
const DETAIL_DECAY: f64 = 0.9;

/// How many recent entries per signal source get the deep detail fetch
const DEEP_SIGNAL_COUNT: usize = 3;

/// Directors weigh this much more than other credited people
const DIRECTOR_WEIGHT: f64 = 3.0;

/// Billing depth considered for cast affinity
const CAST_DEPTH: usize = 5;

const TOP_GENRES: usize = 3;
const TOP_PEOPLE: usize = 2;
const TOP_KEYWORDS: usize = 3;

/// Derives a weighted taste profile from a user's watch history and
/// saved list.
///
/// Genre affinity comes from the full history, decayed by recency. The
/// deep signal (people, language, keywords, era) comes from detail
/// fetches for the most recent few entries of both sources; a failed
/// detail fetch is treated as "no detail" and never fails the
/// extraction. Empty inputs produce an empty profile so the caller can
/// fall back to an unpersonalized listing.
pub async fn extract_taste_profile(
    provider: Arc<dyn MetadataProvider>,
    signals: &UserSignals,
    default_language: &str,
) -> TasteProfile {
    if signals.is_empty() {
        return TasteProfile::default();
    }

    // 1. Genre affinity across the whole history, newest first.
    let mut genre_weights: HashMap<u64, f64> = HashMap::new();
    for (index, entry) in signals.watch_history.iter().enumerate() {
        let weight = GENRE_DECAY.powi(index as i32);
        for genre_id in &entry.genre_ids {
            *genre_weights.entry(*genre_id).or_insert(0.0) += weight;
        }
    }

    // 2. Deep signal from the most recent watch and list entries.
    let deep_entries: Vec<&WatchHistoryItem> = signals
        .watch_history
        .iter()
        .take(DEEP_SIGNAL_COUNT)
        .chain(signals.list.iter().take(DEEP_SIGNAL_COUNT))
        .collect();

    let mut tasks = Vec::new();
    for (position, entry) in deep_entries.iter().enumerate() {
        let provider = provider.clone();
        let media_type = entry.media_type;
        let id = entry.id;
        let weight = DETAIL_DECAY.powi(position as i32);
        tasks.push(tokio::spawn(async move {
            (provider.item_details(media_type, id).await, weight, id)
        }));
    }

    let mut person_weights: HashMap<u64, f64> = HashMap::new();
    let mut language_weights: HashMap<String, f64> = HashMap::new();
    let mut keyword_weights: HashMap<u64, f64> = HashMap::new();
    let mut era_weights: HashMap<i32, f64> = HashMap::new();

    for task in tasks {
        let (result, weight, id) = match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Detail fetch task join error");
                continue;
            }
        };

        let details = match result {
            Ok(details) => details,
            Err(e) => {
                // One missing detail never fails the whole extraction.
                tracing::warn!(id, error = %e, "Detail fetch failed, skipping signal");
                continue;
            }
        };

        for director_id in details.director_ids() {
            *person_weights.entry(director_id).or_insert(0.0) += DIRECTOR_WEIGHT * weight;
        }
        for cast_id in details.top_cast_ids(CAST_DEPTH) {
            *person_weights.entry(cast_id).or_insert(0.0) += weight;
        }
        if let Some(language) = &details.original_language {
            *language_weights.entry(language.clone()).or_insert(0.0) += weight;
        }
        for keyword_id in details.keyword_ids() {
            *keyword_weights.entry(keyword_id).or_insert(0.0) += weight;
        }
        if let Some(date) = details.release_date_parsed() {
            use chrono::Datelike;
            let year = date.year();
            *era_weights.entry(year - year.rem_euclid(10)).or_insert(0.0) += weight;
        }
    }

    // 3. Keep the strongest signals only.
    let top_language =
        heaviest(&language_weights).filter(|language| language.as_str() != default_language);

    let profile = TasteProfile {
        top_genres: top_n(&genre_weights, TOP_GENRES),
        top_people: top_n(&person_weights, TOP_PEOPLE),
        top_language,
        top_keywords: top_n(&keyword_weights, TOP_KEYWORDS),
        top_era: heaviest(&era_weights),
    };

    tracing::debug!(
        genres = ?profile.top_genres,
        people = ?profile.top_people,
        language = ?profile.top_language,
        era = ?profile.top_era,
        "Taste profile extracted"
    );

    profile
}

/// Top `n` keys by accumulated weight, heaviest first. Ties resolve by
/// key so the result is deterministic.
fn top_n<K: Copy + Ord>(weights: &HashMap<K, f64>, n: usize) -> Vec<K> {
    let mut entries: Vec<(K, f64)> = weights.iter().map(|(k, w)| (*k, *w)).collect();
    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    entries.into_iter().take(n).map(|(k, _)| k).collect()
}

/// Single heaviest key, ties resolved by key
fn heaviest<K: Clone + Ord>(weights: &HashMap<K, f64>) -> Option<K> {
    weights
        .iter()
        .max_by(|a, b| {
            a.1.partial_cmp(b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.cmp(a.0))
        })
        .map(|(k, _)| k.clone())
}
