use std::collections::{HashMap, HashSet};

use crate::models::{CandidateItem, MediaKey, SourceResult, TasteProfile, UserSignals};

/// Flat increment every (source, item) appearance earns on top of the
/// source weight, so agreement across sources compounds
const BASE_MATCH: f64 = 2.0;

/// Bonus when a candidate's genres intersect the profile's top genres
const GENRE_OVERLAP_BONUS: f64 = 4.0;

/// Bonus when the candidate's original language matches the profile's
const LANGUAGE_MATCH_BONUS: f64 = 3.0;

/// Bonus when the candidate's release decade matches the profile's era
const ERA_MATCH_BONUS: f64 = 3.0;

/// Final list sizes per context
const HOME_FEED_SIZE: usize = 20;
const ITEM_DETAIL_SIZE: usize = 12;

/// Diversity pass: at most this many non-outlier items per primary genre
const GENRE_CAP: usize = 3;

/// Scores above this bypass the genre cap
const OUTLIER_THRESHOLD: f64 = 30.0;

/// What a saved-list membership does to a candidate's score.
///
/// Item-detail recommendations boost saved titles ("continue this
/// journey"); the home feed nudges them down to favor discovery. The
/// policy is carried per call site, never hard-coded in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedListPolicy {
    Boost,
    Penalize,
}

impl SavedListPolicy {
    fn adjustment(&self) -> f64 {
        match self {
            SavedListPolicy::Boost => 3.0,
            SavedListPolicy::Penalize => -2.0,
        }
    }
}

/// Ranking context kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingMode {
    HomeFeed,
    ItemDetail,
}

/// Everything the engine needs to score and select one candidate set.
#[derive(Debug, Clone)]
pub struct RankingContext {
    pub mode: RankingMode,
    pub profile: TasteProfile,
    pub saved_list: HashSet<MediaKey>,
    pub exclude: HashSet<MediaKey>,
    pub saved_list_policy: SavedListPolicy,
}

impl RankingContext {
    /// Home feed: exclude everything already watched, nudge saved
    /// titles down.
    pub fn home_feed(profile: TasteProfile, signals: &UserSignals) -> Self {
        Self {
            mode: RankingMode::HomeFeed,
            profile,
            saved_list: signals.list.iter().map(|item| item.key()).collect(),
            exclude: signals.watch_history.iter().map(|item| item.key()).collect(),
            saved_list_policy: SavedListPolicy::Penalize,
        }
    }

    /// Item detail: exclude only the reference itself, boost saved
    /// titles.
    pub fn item_detail(profile: TasteProfile, reference: MediaKey, signals: &UserSignals) -> Self {
        Self {
            mode: RankingMode::ItemDetail,
            profile,
            saved_list: signals.list.iter().map(|item| item.key()).collect(),
            exclude: HashSet::from([reference]),
            saved_list_policy: SavedListPolicy::Boost,
        }
    }

    fn target_size(&self) -> usize {
        match self.mode {
            RankingMode::HomeFeed => HOME_FEED_SIZE,
            RankingMode::ItemDetail => ITEM_DETAIL_SIZE,
        }
    }
}

struct ScoredCandidate {
    item: CandidateItem,
    score: f64,
}

/// Merges tagged source results into one ordered, bounded candidate
/// list.
///
/// Scoring is purely additive, so accumulation order across sources
/// cannot change the outcome; ties keep first-seen input order. The
/// result is deterministic for identical inputs.
pub fn rank(source_results: &[SourceResult], ctx: &RankingContext) -> Vec<CandidateItem> {
    // 1. Accumulate per-source weights, first appearance fixes tie order.
    let mut candidates: Vec<ScoredCandidate> = Vec::new();
    let mut by_key: HashMap<MediaKey, usize> = HashMap::new();

    for result in source_results {
        for item in &result.items {
            let key = item.key();
            if ctx.exclude.contains(&key) {
                continue;
            }

            let slot = *by_key.entry(key).or_insert_with(|| {
                candidates.push(ScoredCandidate {
                    item: item.clone(),
                    score: 0.0,
                });
                candidates.len() - 1
            });
            candidates[slot].score += BASE_MATCH + result.source.weight();
        }
    }

    // 2. Content-affinity boosts.
    for candidate in &mut candidates {
        candidate.score += affinity_boost(&candidate.item, ctx);
    }

    // 3. Drop anything without artwork to show.
    candidates.retain(|candidate| candidate.item.has_artwork());

    // 4. Order by score; sort_by is stable so ties keep input order.
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let target = ctx.target_size();
    let selected = match ctx.mode {
        RankingMode::HomeFeed => diversify(candidates, target),
        RankingMode::ItemDetail => candidates
            .into_iter()
            .take(target)
            .map(|candidate| candidate.item)
            .collect(),
    };

    tracing::debug!(
        mode = ?ctx.mode,
        selected = selected.len(),
        "Ranking completed"
    );

    selected
}

fn affinity_boost(item: &CandidateItem, ctx: &RankingContext) -> f64 {
    let mut boost = 0.0;

    // A missing or broken numeric signal contributes zero, never NaN.
    if item.vote_average.is_finite() {
        boost += item.vote_average.clamp(0.0, 10.0);
    }

    if item
        .genre_ids
        .iter()
        .any(|genre| ctx.profile.top_genres.contains(genre))
    {
        boost += GENRE_OVERLAP_BONUS;
    }

    if let (Some(language), Some(top_language)) =
        (&item.original_language, &ctx.profile.top_language)
    {
        if language == top_language {
            boost += LANGUAGE_MATCH_BONUS;
        }
    }

    if let (Some(decade), Some(era)) = (item.release_decade(), ctx.profile.top_era) {
        if decade == era {
            boost += ERA_MATCH_BONUS;
        }
    }

    if ctx.saved_list.contains(&item.key()) {
        boost += ctx.saved_list_policy.adjustment();
    }

    boost
}

/// Greedy diversity-aware selection for the home feed.
///
/// Walks the score-sorted list capping each primary genre at
/// [`GENRE_CAP`] items; candidates above [`OUTLIER_THRESHOLD`] bypass
/// the cap. When the diverse walk comes up short of the target, skipped
/// items backfill in score order.
fn diversify(sorted: Vec<ScoredCandidate>, target: usize) -> Vec<CandidateItem> {
    let mut genre_counts: HashMap<u64, usize> = HashMap::new();
    let mut picked: Vec<CandidateItem> = Vec::new();
    let mut skipped: Vec<CandidateItem> = Vec::new();

    for candidate in sorted {
        if picked.len() == target {
            break;
        }

        match candidate.item.primary_genre() {
            // Outliers bypass the cap without consuming it.
            Some(_) if candidate.score > OUTLIER_THRESHOLD => picked.push(candidate.item),
            Some(genre) => {
                let count = genre_counts.entry(genre).or_insert(0);
                if *count < GENRE_CAP {
                    *count += 1;
                    picked.push(candidate.item);
                } else {
                    skipped.push(candidate.item);
                }
            }
            None => picked.push(candidate.item),
        }
    }

    // Backfill: a short diverse list is worse than a repetitive one.
    let mut backfill = skipped.into_iter();
    while picked.len() < target {
        match backfill.next() {
            Some(item) => picked.push(item),
            None => break,
        }
    }

    picked
}
