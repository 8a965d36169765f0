use std::fmt::Display;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub mod tmdb;

/// Kind of title a candidate refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Series,
}

impl MediaType {
    /// Path segment the upstream provider uses for this kind
    pub fn as_path_segment(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Series => "tv",
        }
    }
}

impl Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaType::Movie => write!(f, "movie"),
            MediaType::Series => write!(f, "series"),
        }
    }
}

/// Candidate identity key.
///
/// The provider's numeric id spaces for movies and series are not
/// guaranteed disjoint, so identity is always the `(media type, id)`
/// pair, never the bare id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaKey {
    pub media_type: MediaType,
    pub id: u64,
}

impl Display for MediaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.media_type, self.id)
    }
}

/// One entry of a user's watch history.
///
/// Caller-owned and read-only to this crate. Histories arrive ordered
/// newest-first; the index is the only recency signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchHistoryItem {
    pub id: u64,
    pub media_type: MediaType,
    #[serde(default)]
    pub genre_ids: Vec<u64>,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    #[serde(default)]
    pub last_watched: Option<DateTime<Utc>>,
}

impl WatchHistoryItem {
    pub fn key(&self) -> MediaKey {
        MediaKey {
            media_type: self.media_type,
            id: self.id,
        }
    }
}

/// An explicit "save for later" entry. Same shape as watch history;
/// membership checks use set semantics, recency order is preserved as a
/// signal.
pub type ListItem = WatchHistoryItem;

/// The two caller-owned signal sources a personalized request reads.
#[derive(Debug, Clone, Default)]
pub struct UserSignals {
    pub watch_history: Vec<WatchHistoryItem>,
    pub list: Vec<ListItem>,
}

impl UserSignals {
    pub fn is_empty(&self) -> bool {
        self.watch_history.is_empty() && self.list.is_empty()
    }
}

/// Weighted taste summary derived per request from watch history and the
/// saved list. Never persisted; recomputed on every personalized call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TasteProfile {
    /// Top genre ids by decayed affinity, strongest first (at most 3)
    pub top_genres: Vec<u64>,
    /// Top person ids, strongest first (at most 2)
    pub top_people: Vec<u64>,
    /// Dominant original language, unless it is the platform default
    pub top_language: Option<String>,
    /// Top keyword ids (at most 3)
    pub top_keywords: Vec<u64>,
    /// Dominant release decade, e.g. 1990
    pub top_era: Option<i32>,
}

impl TasteProfile {
    pub fn is_empty(&self) -> bool {
        self.top_genres.is_empty()
            && self.top_people.is_empty()
            && self.top_language.is_none()
            && self.top_keywords.is_empty()
            && self.top_era.is_none()
    }
}

/// Normalized provider item, the only candidate shape the ranking and
/// search layers ever see. Optional fields are explicit; missing numeric
/// signals read as zero.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateItem {
    pub id: u64,
    pub media_type: MediaType,
    pub title: String,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub genre_ids: Vec<u64>,
    pub vote_average: f64,
    pub vote_count: u64,
    pub popularity: f64,
    pub release_date: Option<NaiveDate>,
    pub original_language: Option<String>,
}

impl CandidateItem {
    pub fn key(&self) -> MediaKey {
        MediaKey {
            media_type: self.media_type,
            id: self.id,
        }
    }

    /// Items with neither poster nor backdrop are excluded from output.
    pub fn has_artwork(&self) -> bool {
        self.poster_path.is_some() || self.backdrop_path.is_some()
    }

    pub fn release_year(&self) -> Option<i32> {
        self.release_date.map(|d| d.year())
    }

    /// Release decade, e.g. 1994 -> 1990
    pub fn release_decade(&self) -> Option<i32> {
        self.release_year().map(|y| y - y.rem_euclid(10))
    }

    /// First genre id, used by the diversity pass
    pub fn primary_genre(&self) -> Option<u64> {
        self.genre_ids.first().copied()
    }
}

/// Tag identifying which retrieval query produced a candidate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceTag {
    /// Collection (franchise) members of the reference item
    Franchise,
    /// Provider "similar titles" for the reference item
    Similar,
    /// Provider "recommended titles" for the reference item
    Recommendations,
    /// Discovery by top people (directors weighted into the profile)
    People,
    /// Discovery by top keyword ids
    Keyword,
    /// Discovery by dominant original language
    Language,
    /// Discovery by top era restricted to top genres
    EraGenre,
    /// Discovery by top genres sorted by popularity
    GenrePopular,
    /// Discovery by top genres sorted by rating
    GenreTopRated,
    /// Discovery by production company of the reference item
    Studio,
}

impl SourceTag {
    /// Additive score contribution for appearing in this source.
    ///
    /// Every appearance also earns the flat base increment (see the
    /// ranking engine), so multi-source agreement compounds.
    pub fn weight(&self) -> f64 {
        match self {
            SourceTag::Franchise => 9.0,
            SourceTag::Similar => 6.0,
            SourceTag::Recommendations => 6.0,
            SourceTag::People => 6.0,
            SourceTag::Keyword => 4.0,
            SourceTag::GenreTopRated => 3.5,
            SourceTag::GenrePopular => 3.0,
            SourceTag::EraGenre => 3.0,
            SourceTag::Language => 3.0,
            SourceTag::Studio => 3.0,
        }
    }

    /// Primary sources are awaited without a deadline; secondary sources
    /// are raced against the enhancement deadline and degrade to empty.
    pub fn is_primary(&self) -> bool {
        matches!(
            self,
            SourceTag::Franchise
                | SourceTag::Similar
                | SourceTag::Recommendations
                | SourceTag::GenrePopular
                | SourceTag::GenreTopRated
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Franchise => "franchise",
            SourceTag::Similar => "similar",
            SourceTag::Recommendations => "recommendations",
            SourceTag::People => "people",
            SourceTag::Keyword => "keyword",
            SourceTag::Language => "language",
            SourceTag::EraGenre => "era_genre",
            SourceTag::GenrePopular => "genre_popular",
            SourceTag::GenreTopRated => "genre_top_rated",
            SourceTag::Studio => "studio",
        }
    }
}

/// Output of one tagged retrieval query.
#[derive(Debug, Clone)]
pub struct SourceResult {
    pub source: SourceTag,
    pub items: Vec<CandidateItem>,
}

impl SourceResult {
    pub fn empty(source: SourceTag) -> Self {
        Self {
            source,
            items: Vec::new(),
        }
    }
}

/// A ranked recommendation list plus the cache-hit indicator callers use
/// for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedFeed {
    pub items: Vec<CandidateItem>,
    pub from_cache: bool,
}

// ============================================================================
// Search types
// ============================================================================

/// Sort order for search results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Relevance,
    Recency,
    Popularity,
    Rating,
}

/// Structural search filters; every present predicate must pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub media_type: Option<MediaType>,
    #[serde(default)]
    pub year_start: Option<i32>,
    #[serde(default)]
    pub year_end: Option<i32>,
    #[serde(default)]
    pub min_rating: Option<f64>,
    #[serde(default)]
    pub genre_ids: Vec<u64>,
    #[serde(default)]
    pub sort_by: SortKey,
}

/// Page envelope for search responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: u32,
    pub total_pages: u32,
    pub has_more: bool,
}

impl Pagination {
    /// The shape returned for degenerate queries: page 1, nothing in it.
    pub fn empty(page_size: u32) -> Self {
        Self {
            page: 1,
            page_size,
            total: 0,
            total_pages: 0,
            has_more: false,
        }
    }
}

/// Search results plus pagination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<CandidateItem>,
    pub pagination: Pagination,
}

impl SearchResponse {
    pub fn empty(page_size: u32) -> Self {
        Self {
            results: Vec::new(),
            pagination: Pagination::empty(page_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_key_display() {
        let key = MediaKey {
            media_type: MediaType::Movie,
            id: 27205,
        };
        assert_eq!(format!("{}", key), "movie:27205");
    }

    #[test]
    fn test_media_key_distinguishes_media_types() {
        let movie = MediaKey {
            media_type: MediaType::Movie,
            id: 42,
        };
        let series = MediaKey {
            media_type: MediaType::Series,
            id: 42,
        };
        assert_ne!(movie, series);
    }

    #[test]
    fn test_media_type_path_segment() {
        assert_eq!(MediaType::Movie.as_path_segment(), "movie");
        assert_eq!(MediaType::Series.as_path_segment(), "tv");
    }

    #[test]
    fn test_release_decade() {
        let item = CandidateItem {
            id: 1,
            media_type: MediaType::Movie,
            title: "Pulp Fiction".to_string(),
            poster_path: Some("/pulp.jpg".to_string()),
            backdrop_path: None,
            genre_ids: vec![80],
            vote_average: 8.5,
            vote_count: 20_000,
            popularity: 60.0,
            release_date: NaiveDate::from_ymd_opt(1994, 10, 14),
            original_language: Some("en".to_string()),
        };
        assert_eq!(item.release_decade(), Some(1990));
    }

    #[test]
    fn test_has_artwork_requires_either_image() {
        let mut item = CandidateItem {
            id: 1,
            media_type: MediaType::Series,
            title: "Untitled".to_string(),
            poster_path: None,
            backdrop_path: None,
            genre_ids: vec![],
            vote_average: 0.0,
            vote_count: 0,
            popularity: 0.0,
            release_date: None,
            original_language: None,
        };
        assert!(!item.has_artwork());

        item.backdrop_path = Some("/b.jpg".to_string());
        assert!(item.has_artwork());
    }

    #[test]
    fn test_franchise_weighs_highest() {
        let tags = [
            SourceTag::Similar,
            SourceTag::Recommendations,
            SourceTag::People,
            SourceTag::Keyword,
            SourceTag::Language,
            SourceTag::EraGenre,
            SourceTag::GenrePopular,
            SourceTag::GenreTopRated,
            SourceTag::Studio,
        ];
        for tag in tags {
            assert!(SourceTag::Franchise.weight() > tag.weight());
        }
    }

    #[test]
    fn test_empty_profile_detection() {
        assert!(TasteProfile::default().is_empty());

        let profile = TasteProfile {
            top_genres: vec![18],
            ..TasteProfile::default()
        };
        assert!(!profile.is_empty());
    }

    #[test]
    fn test_empty_pagination_shape() {
        let pagination = Pagination::empty(20);
        assert_eq!(pagination.page, 1);
        assert_eq!(pagination.total, 0);
        assert_eq!(pagination.total_pages, 0);
        assert!(!pagination.has_more);
    }
}
