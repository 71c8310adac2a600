//! Core types for the indexer system
//!
//! These types are modeled after the Torznab API: a search enters the
//! pipeline as a [`SearchCriteria`], and every adapter emits [`ReleaseRecord`]s.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::categories::CategoryMap;

/// Whether releases are fetched over Usenet or BitTorrent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadProtocol {
    Usenet,
    Torrent,
}

impl std::fmt::Display for DownloadProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadProtocol::Usenet => write!(f, "usenet"),
            DownloadProtocol::Torrent => write!(f, "torrent"),
        }
    }
}

/// Type of tracker (affects how releases are handled downstream)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    /// Private tracker - requires account, don't share magnets
    #[default]
    Private,
    /// Public tracker - no account needed
    Public,
    /// Semi-private - may require registration but is open
    SemiPrivate,
}

impl std::fmt::Display for Privacy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Privacy::Private => write!(f, "private"),
            Privacy::Public => write!(f, "public"),
            Privacy::SemiPrivate => write!(f, "semi-private"),
        }
    }
}

/// Kind of search query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    /// General text search
    #[default]
    Basic,
    /// TV show search (supports season/episode)
    Tv,
    Movie,
    Music,
    Book,
}

impl std::fmt::Display for SearchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchKind::Basic => write!(f, "search"),
            SearchKind::Tv => write!(f, "tvsearch"),
            SearchKind::Movie => write!(f, "movie"),
            SearchKind::Music => write!(f, "music"),
            SearchKind::Book => write!(f, "book"),
        }
    }
}

impl std::str::FromStr for SearchKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "search" | "q" | "basic" => Ok(SearchKind::Basic),
            "tvsearch" | "tv-search" | "tv" => Ok(SearchKind::Tv),
            "movie" | "movie-search" | "moviesearch" => Ok(SearchKind::Movie),
            "music" | "music-search" | "musicsearch" | "audio" => Ok(SearchKind::Music),
            "book" | "book-search" | "booksearch" => Ok(SearchKind::Book),
            _ => Err(anyhow::anyhow!("Unknown search kind: {}", s)),
        }
    }
}

/// TV search parameters supported by an indexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TvSearchParam {
    Q,
    Season,
    Ep,
    ImdbId,
    TvdbId,
    TmdbId,
    Year,
    Genre,
}

impl TvSearchParam {
    pub fn as_str(&self) -> &'static str {
        match self {
            TvSearchParam::Q => "q",
            TvSearchParam::Season => "season",
            TvSearchParam::Ep => "ep",
            TvSearchParam::ImdbId => "imdbid",
            TvSearchParam::TvdbId => "tvdbid",
            TvSearchParam::TmdbId => "tmdbid",
            TvSearchParam::Year => "year",
            TvSearchParam::Genre => "genre",
        }
    }
}

/// Movie search parameters supported by an indexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovieSearchParam {
    Q,
    ImdbId,
    TmdbId,
    Year,
    Genre,
}

impl MovieSearchParam {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovieSearchParam::Q => "q",
            MovieSearchParam::ImdbId => "imdbid",
            MovieSearchParam::TmdbId => "tmdbid",
            MovieSearchParam::Year => "year",
            MovieSearchParam::Genre => "genre",
        }
    }
}

/// Music search parameters supported by an indexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MusicSearchParam {
    Q,
    Album,
    Artist,
    Label,
    Track,
    Year,
}

impl MusicSearchParam {
    pub fn as_str(&self) -> &'static str {
        match self {
            MusicSearchParam::Q => "q",
            MusicSearchParam::Album => "album",
            MusicSearchParam::Artist => "artist",
            MusicSearchParam::Label => "label",
            MusicSearchParam::Track => "track",
            MusicSearchParam::Year => "year",
        }
    }
}

/// Book search parameters supported by an indexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSearchParam {
    Q,
    Title,
    Author,
    Publisher,
    Year,
}

impl BookSearchParam {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookSearchParam::Q => "q",
            BookSearchParam::Title => "title",
            BookSearchParam::Author => "author",
            BookSearchParam::Publisher => "publisher",
            BookSearchParam::Year => "year",
        }
    }
}

/// What an indexer can do, published to downstream applications
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Capabilities {
    /// Maximum results per page
    pub limits_max: Option<u32>,
    /// Default results per page
    pub limits_default: Option<u32>,

    /// Whether basic search is available
    pub search_available: bool,
    /// Whether raw search is supported
    pub supports_raw_search: bool,

    pub tv_search_params: Vec<TvSearchParam>,
    pub movie_search_params: Vec<MovieSearchParam>,
    pub music_search_params: Vec<MusicSearchParam>,
    pub book_search_params: Vec<BookSearchParam>,

    /// Site category <-> standard category mapping
    pub categories: CategoryMap,
}

impl Capabilities {
    /// Create default capabilities (search only)
    pub fn new() -> Self {
        Self {
            search_available: true,
            limits_default: Some(100),
            limits_max: Some(100),
            ..Default::default()
        }
    }

    pub fn tv_search_available(&self) -> bool {
        !self.tv_search_params.is_empty()
    }

    pub fn movie_search_available(&self) -> bool {
        !self.movie_search_params.is_empty()
    }

    pub fn music_search_available(&self) -> bool {
        !self.music_search_params.is_empty()
    }

    pub fn book_search_available(&self) -> bool {
        !self.book_search_params.is_empty()
    }

    pub fn has_tv_param(&self, param: TvSearchParam) -> bool {
        self.tv_search_params.contains(&param)
    }

    pub fn has_movie_param(&self, param: MovieSearchParam) -> bool {
        self.movie_search_params.contains(&param)
    }

    /// Search kinds this indexer answers
    pub fn supported_kinds(&self) -> Vec<SearchKind> {
        let mut kinds = vec![];
        if self.search_available {
            kinds.push(SearchKind::Basic);
        }
        if self.tv_search_available() {
            kinds.push(SearchKind::Tv);
        }
        if self.movie_search_available() {
            kinds.push(SearchKind::Movie);
        }
        if self.music_search_available() {
            kinds.push(SearchKind::Music);
        }
        if self.book_search_available() {
            kinds.push(SearchKind::Book);
        }
        kinds
    }

    /// Check if this indexer can handle the given query
    pub fn can_handle(&self, criteria: &SearchCriteria) -> bool {
        match criteria.kind() {
            SearchKind::Basic => self.search_available,
            SearchKind::Tv => self.tv_search_available(),
            SearchKind::Movie => self.movie_search_available(),
            SearchKind::Music => self.music_search_available(),
            SearchKind::Book => self.book_search_available(),
        }
    }
}

static UNSAFE_SEARCH_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s\-.'&:()]").expect("valid regex"));

/// Strip characters sites choke on and collapse whitespace
pub fn sanitize_search_term(term: &str) -> String {
    let cleaned = UNSAFE_SEARCH_CHARS.replace_all(term, " ");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fields shared by every kind of search
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Sanitized free-text search term
    pub search_term: Option<String>,

    /// Standard category IDs, sorted and deduplicated
    pub categories: Vec<i32>,

    /// Maximum number of results
    pub limit: Option<u32>,

    /// Offset for pagination
    pub offset: Option<u32>,

    /// Whether cached results may be served
    pub cache: bool,
}

impl SearchQuery {
    pub fn new(term: &str) -> Self {
        let term = sanitize_search_term(term);
        Self {
            search_term: (!term.is_empty()).then_some(term),
            cache: true,
            ..Default::default()
        }
    }

    /// Same query with the search term replaced
    pub fn with_term(mut self, term: Option<String>) -> Self {
        self.search_term = term.filter(|t| !t.trim().is_empty());
        self
    }

    fn set_categories(&mut self, mut cats: Vec<i32>) {
        cats.sort_unstable();
        cats.dedup();
        self.categories = cats;
    }
}

/// General text search
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicSearch {
    #[serde(flatten)]
    pub query: SearchQuery,
}

/// TV search
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TvSearch {
    #[serde(flatten)]
    pub query: SearchQuery,
    pub season: Option<i32>,
    /// Episode number/identifier
    pub episode: Option<String>,
    /// IMDB ID (e.g., "tt1234567")
    pub imdb_id: Option<String>,
    pub tvdb_id: Option<i32>,
    pub tmdb_id: Option<i32>,
}

/// Movie search
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieSearch {
    #[serde(flatten)]
    pub query: SearchQuery,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<i32>,
    pub year: Option<i32>,
    pub genre: Option<String>,
}

/// Music search
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicSearch {
    #[serde(flatten)]
    pub query: SearchQuery,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub label: Option<String>,
    pub track: Option<String>,
    pub year: Option<i32>,
}

/// Book search
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSearch {
    #[serde(flatten)]
    pub query: SearchQuery,
    pub author: Option<String>,
    pub title: Option<String>,
    pub publisher: Option<String>,
    pub year: Option<i32>,
}

/// A search request, one variant per kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SearchCriteria {
    Basic(BasicSearch),
    Tv(TvSearch),
    Movie(MovieSearch),
    Music(MusicSearch),
    Book(BookSearch),
}

impl SearchCriteria {
    /// Create a basic search
    pub fn search(term: &str) -> Self {
        Self::Basic(BasicSearch {
            query: SearchQuery::new(term),
        })
    }

    /// Create a TV search, optionally scoped to a season/episode
    pub fn tv(term: &str, season: Option<i32>, episode: Option<&str>) -> Self {
        Self::Tv(TvSearch {
            query: SearchQuery::new(term),
            season,
            episode: episode.map(|s| s.to_string()),
            ..Default::default()
        })
    }

    /// Create a movie search
    pub fn movie(term: &str) -> Self {
        Self::Movie(MovieSearch {
            query: SearchQuery::new(term),
            ..Default::default()
        })
    }

    /// Create a music search
    pub fn music(term: &str) -> Self {
        Self::Music(MusicSearch {
            query: SearchQuery::new(term),
            ..Default::default()
        })
    }

    /// Create a book search
    pub fn book(term: &str) -> Self {
        Self::Book(BookSearch {
            query: SearchQuery::new(term),
            ..Default::default()
        })
    }

    /// Restrict the search to standard categories
    pub fn with_categories(mut self, cats: Vec<i32>) -> Self {
        self.query_mut().set_categories(cats);
        self
    }

    /// Attach an IMDB ID (TV and movie searches only)
    pub fn with_imdb(mut self, imdb_id: &str) -> Self {
        match &mut self {
            SearchCriteria::Tv(tv) => tv.imdb_id = Some(imdb_id.to_string()),
            SearchCriteria::Movie(movie) => movie.imdb_id = Some(imdb_id.to_string()),
            _ => {}
        }
        self
    }

    pub fn with_limit(mut self, limit: u32, offset: u32) -> Self {
        let query = self.query_mut();
        query.limit = Some(limit);
        query.offset = Some(offset);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.query_mut().cache = false;
        self
    }

    pub fn kind(&self) -> SearchKind {
        match self {
            SearchCriteria::Basic(_) => SearchKind::Basic,
            SearchCriteria::Tv(_) => SearchKind::Tv,
            SearchCriteria::Movie(_) => SearchKind::Movie,
            SearchCriteria::Music(_) => SearchKind::Music,
            SearchCriteria::Book(_) => SearchKind::Book,
        }
    }

    pub fn query(&self) -> &SearchQuery {
        match self {
            SearchCriteria::Basic(c) => &c.query,
            SearchCriteria::Tv(c) => &c.query,
            SearchCriteria::Movie(c) => &c.query,
            SearchCriteria::Music(c) => &c.query,
            SearchCriteria::Book(c) => &c.query,
        }
    }

    fn query_mut(&mut self) -> &mut SearchQuery {
        match self {
            SearchCriteria::Basic(c) => &mut c.query,
            SearchCriteria::Tv(c) => &mut c.query,
            SearchCriteria::Movie(c) => &mut c.query,
            SearchCriteria::Music(c) => &mut c.query,
            SearchCriteria::Book(c) => &mut c.query,
        }
    }

    pub fn search_term(&self) -> &str {
        self.query().search_term.as_deref().unwrap_or("")
    }

    pub fn categories(&self) -> &[i32] {
        &self.query().categories
    }

    /// Get the query string for display/logging
    pub fn query_string(&self) -> String {
        match self {
            SearchCriteria::Tv(tv) => tv.search_string(),
            other => other.search_term().to_string(),
        }
    }

    /// Create a cache key hash for this query
    pub fn cache_key(&self) -> String {
        use sha2::{Digest, Sha256};
        let json = serde_json::to_string(self).unwrap_or_default();
        let hash = Sha256::digest(json.as_bytes());
        format!("{:x}", hash)
    }
}

impl TvSearch {
    /// Get the episode search string (e.g., "S01E05")
    pub fn episode_string(&self) -> Option<String> {
        self.season.map(|s| match self.episode {
            Some(ref ep) => match ep.parse::<i32>() {
                Ok(n) => format!("S{:02}E{:02}", s, n),
                Err(_) => format!("S{:02}E{}", s, ep),
            },
            None => format!("S{:02}", s),
        })
    }

    /// Search term with the episode string appended ("Show S01E05")
    pub fn search_string(&self) -> String {
        let mut parts = vec![];
        if let Some(ref term) = self.query.search_term {
            parts.push(term.clone());
        }
        if let Some(ep) = self.episode_string() {
            parts.push(ep);
        }
        parts.join(" ")
    }
}

impl From<BasicSearch> for SearchCriteria {
    fn from(c: BasicSearch) -> Self {
        SearchCriteria::Basic(c)
    }
}

impl From<TvSearch> for SearchCriteria {
    fn from(c: TvSearch) -> Self {
        SearchCriteria::Tv(c)
    }
}

impl From<MovieSearch> for SearchCriteria {
    fn from(c: MovieSearch) -> Self {
        SearchCriteria::Movie(c)
    }
}

impl From<MusicSearch> for SearchCriteria {
    fn from(c: MusicSearch) -> Self {
        SearchCriteria::Music(c)
    }
}

impl From<BookSearch> for SearchCriteria {
    fn from(c: BookSearch) -> Self {
        SearchCriteria::Book(c)
    }
}

/// A normalized search result
///
/// GUIDs are stable and unique per release within an indexer. Size and
/// publish date are best-effort: zero and the Unix epoch mean "unknown".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub title: String,

    /// Unique identifier within the indexer
    pub guid: String,

    /// Download link (torrent file or NZB)
    pub download_url: Option<String>,

    /// Details page URL
    pub info_url: Option<String>,

    pub magnet_uri: Option<String>,

    pub info_hash: Option<String>,

    pub publish_date: DateTime<Utc>,

    /// Standard category IDs
    pub categories: Vec<i32>,

    /// Size in bytes
    pub size: u64,

    pub files: u32,

    /// Number of times snatched/downloaded
    pub grabs: u32,

    // Peer info, always zero for Usenet
    pub seeders: u32,
    /// Seeders plus leechers
    pub peers: u32,

    /// Download volume factor (0 = freeleech, 1 = normal)
    pub download_volume_factor: f64,
    /// Upload volume factor (usually 1, can be 2 for double upload)
    pub upload_volume_factor: f64,

    pub minimum_ratio: Option<f64>,
    /// Minimum seed time in seconds
    pub minimum_seed_time: Option<u64>,

    pub protocol: DownloadProtocol,

    pub description: Option<String>,
    /// IMDB ID (numeric part)
    pub imdb: Option<u64>,
    pub tvdb_id: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexer_name: Option<String>,
}

impl ReleaseRecord {
    /// Create a release with neutral defaults
    pub fn new(title: String, guid: String, protocol: DownloadProtocol) -> Self {
        Self {
            title,
            guid,
            download_url: None,
            info_url: None,
            magnet_uri: None,
            info_hash: None,
            publish_date: DateTime::<Utc>::UNIX_EPOCH,
            categories: vec![],
            size: 0,
            files: 0,
            grabs: 0,
            seeders: 0,
            peers: 0,
            download_volume_factor: 1.0,
            upload_volume_factor: 1.0,
            minimum_ratio: None,
            minimum_seed_time: None,
            protocol,
            description: None,
            imdb: None,
            tvdb_id: None,
            indexer_id: None,
            indexer_name: None,
        }
    }

    pub fn is_freeleech(&self) -> bool {
        self.download_volume_factor == 0.0
    }

    pub fn leechers(&self) -> u32 {
        self.peers.saturating_sub(self.seeders)
    }

    /// Whether the publish date came from the site
    pub fn has_publish_date(&self) -> bool {
        self.publish_date != DateTime::<Utc>::UNIX_EPOCH
    }

    /// Calculate a "gain" score (seeders * size in GB)
    pub fn gain(&self) -> f64 {
        let gb = self.size as f64 / (1024.0 * 1024.0 * 1024.0);
        self.seeders as f64 * gb
    }
}
