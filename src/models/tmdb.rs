/// Raw TMDB response types.
///
/// The upstream payload shape varies per endpoint (movies carry `title`
/// and `release_date`, series carry `name` and `first_air_date`, keyword
/// envelopes differ between the two). Everything is normalized into
/// [`CandidateItem`] here, at the client boundary, so the ranking and
/// search layers never inspect provider-specific shapes.
use chrono::NaiveDate;
use serde::Deserialize;

use crate::models::{CandidateItem, MediaType};

/// One entry of a paged TMDB listing (search, discover, trending,
/// similar, recommendations, collection parts).
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbListItem {
    pub id: u64,
    /// Present on multi-type endpoints ("movie" | "tv" | "person")
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub genre_ids: Vec<u64>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub vote_count: u64,
    #[serde(default)]
    pub popularity: f64,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub original_language: Option<String>,
}

impl TmdbListItem {
    /// Media type declared by the payload, if any.
    pub fn declared_media_type(&self) -> Option<MediaType> {
        match self.media_type.as_deref() {
            Some("movie") => Some(MediaType::Movie),
            Some("tv") => Some(MediaType::Series),
            _ => None,
        }
    }

    /// Normalize into a [`CandidateItem`].
    ///
    /// `fallback` supplies the media type for single-type endpoints that
    /// omit it (e.g. `/discover/movie`). Person results and entries
    /// without a usable title normalize to `None` and are dropped.
    pub fn normalize(&self, fallback: Option<MediaType>) -> Option<CandidateItem> {
        let media_type = self.declared_media_type().or(fallback)?;

        let title = self
            .title
            .as_deref()
            .or(self.name.as_deref())
            .filter(|t| !t.is_empty())?
            .to_string();

        Some(CandidateItem {
            id: self.id,
            media_type,
            title,
            poster_path: self.poster_path.clone(),
            backdrop_path: self.backdrop_path.clone(),
            genre_ids: self.genre_ids.clone(),
            vote_average: self.vote_average,
            vote_count: self.vote_count,
            popularity: self.popularity,
            release_date: parse_date(self.release_date.as_deref())
                .or_else(|| parse_date(self.first_air_date.as_deref())),
            original_language: self.original_language.clone(),
        })
    }
}

/// Paged listing envelope
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbPagedResponse {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub results: Vec<TmdbListItem>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_results: u32,
}

impl TmdbPagedResponse {
    /// Normalize every usable entry, dropping persons and broken rows.
    pub fn normalize(&self, fallback: Option<MediaType>) -> Vec<CandidateItem> {
        self.results
            .iter()
            .filter_map(|item| item.normalize(fallback))
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbGenre {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCastMember {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub order: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCrewMember {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub job: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmdbCredits {
    #[serde(default)]
    pub cast: Vec<TmdbCastMember>,
    #[serde(default)]
    pub crew: Vec<TmdbCrewMember>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbKeyword {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

/// Keyword envelope; movies nest under `keywords`, series under `results`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmdbKeywords {
    #[serde(default, alias = "results")]
    pub keywords: Vec<TmdbKeyword>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCollectionRef {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCompany {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

/// Item detail payload, optionally expanded with credits and keywords
/// via `append_to_response`.
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbDetails {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub genres: Vec<TmdbGenre>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub vote_count: u64,
    #[serde(default)]
    pub popularity: f64,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub original_language: Option<String>,
    #[serde(default)]
    pub belongs_to_collection: Option<TmdbCollectionRef>,
    #[serde(default)]
    pub production_companies: Vec<TmdbCompany>,
    #[serde(default)]
    pub credits: Option<TmdbCredits>,
    #[serde(default)]
    pub keywords: Option<TmdbKeywords>,
}

impl TmdbDetails {
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or_default()
    }

    pub fn genre_ids(&self) -> Vec<u64> {
        self.genres.iter().map(|g| g.id).collect()
    }

    pub fn keyword_ids(&self) -> Vec<u64> {
        self.keywords
            .as_ref()
            .map(|k| k.keywords.iter().map(|kw| kw.id).collect())
            .unwrap_or_default()
    }

    /// Crew members credited as directors
    pub fn director_ids(&self) -> Vec<u64> {
        self.credits
            .as_ref()
            .map(|c| {
                c.crew
                    .iter()
                    .filter(|member| member.job == "Director")
                    .map(|member| member.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Cast ids up to the given billing depth
    pub fn top_cast_ids(&self, depth: usize) -> Vec<u64> {
        self.credits
            .as_ref()
            .map(|c| c.cast.iter().take(depth).map(|member| member.id).collect())
            .unwrap_or_default()
    }

    pub fn release_date_parsed(&self) -> Option<NaiveDate> {
        parse_date(self.release_date.as_deref())
            .or_else(|| parse_date(self.first_air_date.as_deref()))
    }

    /// Normalize into a [`CandidateItem`] with the given media type.
    pub fn to_candidate(&self, media_type: MediaType) -> CandidateItem {
        CandidateItem {
            id: self.id,
            media_type,
            title: self.display_title().to_string(),
            poster_path: self.poster_path.clone(),
            backdrop_path: self.backdrop_path.clone(),
            genre_ids: self.genre_ids(),
            vote_average: self.vote_average,
            vote_count: self.vote_count,
            popularity: self.popularity,
            release_date: self.release_date_parsed(),
            original_language: self.original_language.clone(),
        }
    }
}

/// Collection (franchise) lookup payload
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCollection {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parts: Vec<TmdbListItem>,
}

/// TMDB dates arrive as `YYYY-MM-DD` strings, sometimes empty.
fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.filter(|s| !s.is_empty())
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}
