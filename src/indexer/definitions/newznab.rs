//! Newznab indexer implementation
//!
//! Newznab is the standard API for Usenet indexers (NZBGeek, DrunkenSlug, etc.).
//!
//! # Authentication
//!
//! Newznab uses API key authentication: the key travels as the `apikey` query
//! parameter on every request, so there is no login flow or session.
//!
//! # Configuration
//!
//! Required credentials:
//! - `api_key`: API key from the indexer site

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, info};

use crate::config::IndexerSettings;
use crate::error::IndexerError;
use crate::indexer::categories::{CategoryMap, cats, get_category};
use crate::indexer::http::{RawResponse, RequestDescriptor, url_with_query};
use crate::indexer::request::{RequestChain, RequestGenerator};
use crate::indexer::response::{ResponseParser, parse_rfc822_date};
use crate::indexer::types::{
    BasicSearch, BookSearch, BookSearchParam, Capabilities, DownloadProtocol, MovieSearch,
    MovieSearchParam, MusicSearch, MusicSearchParam, Privacy, ReleaseRecord, SearchQuery,
    TvSearch, TvSearchParam,
};
use crate::indexer::Indexer;

/// Results per API page
pub const PAGE_SIZE: u32 = 100;

/// Newznab indexer for Usenet sites
pub struct NewznabIndexer {
    id: String,
    name: String,
    /// API base URL (e.g., "https://api.nzbgeek.info/")
    api_url: String,
    capabilities: Capabilities,
    generator: NewznabRequestGenerator,
    parser: NewznabParser,
}

impl NewznabIndexer {
    pub fn new(id: &str, name: &str, api_url: &str, api_key: &str) -> Result<Self> {
        if api_key.is_empty() {
            return Err(anyhow!("API key is required for Newznab indexer"));
        }
        url::Url::parse(api_url).map_err(|e| anyhow!("Invalid Newznab API URL '{}': {}", api_url, e))?;

        let api_url = format!("{}/", api_url.trim_end_matches('/'));
        let capabilities = Self::default_capabilities();

        info!(
            indexer_id = %id,
            indexer_name = %name,
            api_url = %api_url,
            "Created Newznab indexer"
        );

        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
            generator: NewznabRequestGenerator {
                api_url: format!("{}api", api_url),
                api_key: api_key.to_string(),
                categories: capabilities.categories.clone(),
            },
            parser: NewznabParser {
                indexer_id: id.to_string(),
                categories: capabilities.categories.clone(),
            },
            api_url,
            capabilities,
        })
    }

    pub fn from_settings(settings: &IndexerSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("API key is required for Newznab indexer"))?;
        Self::new(&settings.id, &settings.name, &settings.base_url, api_key)
    }

    /// Build default capabilities for Newznab
    fn default_capabilities() -> Capabilities {
        Capabilities {
            search_available: true,
            limits_default: Some(PAGE_SIZE),
            limits_max: Some(PAGE_SIZE),
            tv_search_params: vec![
                TvSearchParam::Q,
                TvSearchParam::Season,
                TvSearchParam::Ep,
                TvSearchParam::ImdbId,
                TvSearchParam::TvdbId,
            ],
            movie_search_params: vec![
                MovieSearchParam::Q,
                MovieSearchParam::ImdbId,
                MovieSearchParam::TmdbId,
            ],
            music_search_params: vec![
                MusicSearchParam::Q,
                MusicSearchParam::Artist,
                MusicSearchParam::Album,
            ],
            book_search_params: vec![
                BookSearchParam::Q,
                BookSearchParam::Author,
                BookSearchParam::Title,
            ],
            categories: Self::default_categories(),
            ..Default::default()
        }
    }

    /// Newznab sites use the standard numbering natively
    fn default_categories() -> CategoryMap {
        let mut map = CategoryMap::new();
        for cat in [
            cats::MOVIES,
            cats::MOVIES_FOREIGN,
            cats::MOVIES_OTHER,
            cats::MOVIES_SD,
            cats::MOVIES_HD,
            cats::MOVIES_UHD,
            cats::MOVIES_BLURAY,
            cats::MOVIES_3D,
            cats::TV,
            cats::TV_FOREIGN,
            cats::TV_SD,
            cats::TV_HD,
            cats::TV_UHD,
            cats::TV_SPORT,
            cats::TV_ANIME,
            cats::TV_DOCUMENTARY,
            cats::AUDIO,
            cats::AUDIO_MP3,
            cats::AUDIO_VIDEO,
            cats::AUDIO_AUDIOBOOK,
            cats::AUDIO_LOSSLESS,
            cats::BOOKS,
            cats::BOOKS_EBOOK,
            cats::BOOKS_COMICS,
        ] {
            let name = get_category(cat).map_or("", |c| c.name);
            map.add_described(cat.to_string(), cat, name);
        }
        map
    }
}

impl Indexer for NewznabIndexer {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Generic Newznab-compatible Usenet indexer"
    }

    fn site_link(&self) -> &str {
        &self.api_url
    }

    fn privacy(&self) -> Privacy {
        Privacy::Private
    }

    fn protocol(&self) -> DownloadProtocol {
        DownloadProtocol::Usenet
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn request_generator(&self) -> &dyn RequestGenerator {
        &self.generator
    }

    fn parser(&self) -> &dyn ResponseParser {
        &self.parser
    }
}

/// Builds `api?t=...` requests paged with `offset`/`limit`
pub struct NewznabRequestGenerator {
    api_url: String,
    api_key: String,
    categories: CategoryMap,
}

impl NewznabRequestGenerator {
    fn chain(
        &self,
        function: &str,
        query: &SearchQuery,
        extra: Vec<(&'static str, String)>,
    ) -> Result<RequestChain, IndexerError> {
        let page_size = query.limit.unwrap_or(PAGE_SIZE).clamp(1, PAGE_SIZE);
        let start = query.offset.unwrap_or(0);

        let mut params: Vec<(&'static str, String)> = vec![("t", function.to_string())];
        if let Some(ref term) = query.search_term {
            params.push(("q", term.clone()));
        }
        let native = self.categories.map_standard_to_native(&query.categories);
        if !native.is_empty() {
            params.push(("cat", native.into_iter().collect::<Vec<_>>().join(",")));
        }
        params.extend(extra);
        params.push(("extended", "1".to_string()));
        params.push(("apikey", self.api_key.clone()));

        // Validate once so the lazy builder only fails on a broken base URL
        url_with_query(&self.api_url, &[])?;

        let api_url = self.api_url.clone();
        Ok(RequestChain::paged(page_size as usize, move |page| {
            let offset = (start + page * page_size).to_string();
            let limit = page_size.to_string();
            let mut pairs: Vec<(&str, &str)> =
                params.iter().map(|(k, v)| (*k, v.as_str())).collect();
            pairs.push(("offset", &offset));
            pairs.push(("limit", &limit));

            let url = url_with_query(&api_url, &pairs)?;
            Ok(Some(vec![
                RequestDescriptor::get(url)
                    .accept("application/rss+xml, text/xml")
                    .summary(format!("offset {}", offset)),
            ]))
        }))
    }
}

impl RequestGenerator for NewznabRequestGenerator {
    fn basic_requests(&self, search: &BasicSearch) -> Result<RequestChain, IndexerError> {
        self.chain("search", &search.query, vec![])
    }

    fn tv_requests(&self, search: &TvSearch) -> Result<RequestChain, IndexerError> {
        let mut extra = vec![];
        if let Some(season) = search.season {
            extra.push(("season", season.to_string()));
        }
        if let Some(ref ep) = search.episode {
            extra.push(("ep", ep.clone()));
        }
        if let Some(ref imdb) = search.imdb_id {
            extra.push(("imdbid", imdb.trim_start_matches("tt").to_string()));
        }
        if let Some(tvdb) = search.tvdb_id {
            extra.push(("tvdbid", tvdb.to_string()));
        }
        self.chain("tvsearch", &search.query, extra)
    }

    fn movie_requests(&self, search: &MovieSearch) -> Result<RequestChain, IndexerError> {
        let mut extra = vec![];
        if let Some(ref imdb) = search.imdb_id {
            extra.push(("imdbid", imdb.trim_start_matches("tt").to_string()));
        }
        if let Some(tmdb) = search.tmdb_id {
            extra.push(("tmdbid", tmdb.to_string()));
        }
        self.chain("movie", &search.query, extra)
    }

    fn music_requests(&self, search: &MusicSearch) -> Result<RequestChain, IndexerError> {
        let mut extra = vec![];
        if let Some(ref artist) = search.artist {
            extra.push(("artist", artist.clone()));
        }
        if let Some(ref album) = search.album {
            extra.push(("album", album.clone()));
        }
        self.chain("music", &search.query, extra)
    }

    fn book_requests(&self, search: &BookSearch) -> Result<RequestChain, IndexerError> {
        let mut extra = vec![];
        if let Some(ref author) = search.author {
            extra.push(("author", author.clone()));
        }
        if let Some(ref title) = search.title {
            extra.push(("title", title.clone()));
        }
        self.chain("book", &search.query, extra)
    }
}

/// Parses Newznab RSS into releases
pub struct NewznabParser {
    indexer_id: String,
    categories: CategoryMap,
}

impl ResponseParser for NewznabParser {
    fn parse(&self, response: &RawResponse) -> Result<Vec<ReleaseRecord>, IndexerError> {
        let xml = response.text();
        let mut reader = Reader::from_str(&xml);
        reader.config_mut().trim_text(true);

        let mut releases = Vec::new();
        let mut current_item: Option<ItemBuilder> = None;
        let mut current_tag = String::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    if tag_name == "item" {
                        current_item = Some(ItemBuilder::default());
                    } else if tag_name == "error" {
                        return Err(api_error(e));
                    } else if let Some(ref mut item) = current_item {
                        item.element(&tag_name, e);
                    }
                    current_tag = tag_name;
                }
                Ok(Event::Empty(ref e)) => {
                    let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    if tag_name == "error" {
                        return Err(api_error(e));
                    }
                    if let Some(ref mut item) = current_item {
                        item.element(&tag_name, e);
                    }
                }
                Ok(Event::Text(ref e)) => {
                    if let Some(ref mut item) = current_item {
                        let text = e.unescape().unwrap_or_default();
                        item.text(&current_tag, text.trim());
                    }
                }
                Ok(Event::CData(ref e)) => {
                    if let Some(ref mut item) = current_item {
                        let text = String::from_utf8_lossy(e).to_string();
                        item.text(&current_tag, text.trim());
                    }
                }
                Ok(Event::End(ref e)) => {
                    if e.name().as_ref() == b"item" {
                        if let Some(item) = current_item.take() {
                            if let Some(release) = item.build(&self.indexer_id, &self.categories) {
                                releases.push(release);
                            }
                        }
                    }
                    current_tag.clear();
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(IndexerError::parse(format!(
                        "XML error at position {}: {}",
                        reader.error_position(),
                        e
                    )));
                }
                _ => {}
            }
        }

        debug!(indexer_id = %self.indexer_id, releases = releases.len(), "Parsed Newznab feed");
        Ok(releases)
    }
}

fn attribute(e: &BytesStart, name: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Map an API `<error code=".." description=".."/>` to an error kind
fn api_error(e: &BytesStart) -> IndexerError {
    let code: u16 = attribute(e, "code").and_then(|c| c.parse().ok()).unwrap_or(0);
    let description = attribute(e, "description").unwrap_or_default();

    if (100..=102).contains(&code) || description.to_lowercase().contains("credentials") {
        IndexerError::Authentication(description)
    } else {
        IndexerError::parse(format!("API error {}: {}", code, description))
    }
}

#[derive(Default)]
struct ItemBuilder {
    title: Option<String>,
    guid: Option<String>,
    link: Option<String>,
    comments: Option<String>,
    pub_date: Option<DateTime<Utc>>,
    description: Option<String>,
    size: Option<u64>,
    categories: Vec<String>,
    files: u32,
    grabs: u32,
    imdb: Option<u64>,
    tvdb_id: Option<u64>,
}

impl ItemBuilder {
    fn element(&mut self, tag: &str, e: &BytesStart) {
        match tag {
            "newznab:attr" | "torznab:attr" => {
                if let (Some(name), Some(value)) = (attribute(e, "name"), attribute(e, "value")) {
                    self.attr(&name, &value);
                }
            }
            "enclosure" => {
                if let Some(url) = attribute(e, "url") {
                    self.link.get_or_insert(url);
                }
                if let Some(length) = attribute(e, "length").and_then(|l| l.parse().ok()) {
                    self.size.get_or_insert(length);
                }
            }
            _ => {}
        }
    }

    fn attr(&mut self, name: &str, value: &str) {
        match name {
            "size" => self.size = value.parse().ok().or(self.size),
            "category" => self.categories.push(value.to_string()),
            "files" => self.files = value.parse().unwrap_or(0),
            "grabs" => self.grabs = value.parse().unwrap_or(0),
            "imdb" | "imdbid" => self.imdb = value.trim_start_matches("tt").parse().ok(),
            "tvdbid" => self.tvdb_id = value.parse().ok(),
            _ => {}
        }
    }

    fn text(&mut self, tag: &str, text: &str) {
        if text.is_empty() {
            return;
        }
        match tag {
            "title" => self.title = Some(text.to_string()),
            "guid" => {
                self.guid.get_or_insert_with(|| text.to_string());
            }
            "link" => {
                self.link.get_or_insert_with(|| text.to_string());
            }
            "comments" => self.comments = Some(text.to_string()),
            "pubDate" => self.pub_date = parse_rfc822_date(text),
            "description" => self.description = Some(text.to_string()),
            "category" => self.categories.push(text.to_string()),
            _ => {}
        }
    }

    fn build(self, indexer_id: &str, map: &CategoryMap) -> Option<ReleaseRecord> {
        let title = self.title?;
        let guid_text = self
            .guid
            .or_else(|| self.link.clone())
            .unwrap_or_else(|| title.clone());

        let mut categories: Vec<i32> = vec![];
        for native in &self.categories {
            let mapped = map.map_native_to_standard(native);
            if mapped.is_empty() {
                categories.extend(native.parse::<i32>().ok().filter(|c| get_category(*c).is_some()));
            } else {
                categories.extend(mapped);
            }
        }
        categories.sort_unstable();
        categories.dedup();

        let mut release = ReleaseRecord::new(
            title,
            format!("{}-{}", indexer_id, guid_text),
            DownloadProtocol::Usenet,
        );
        release.download_url = self.link;
        release.info_url = self.comments;
        if let Some(date) = self.pub_date {
            release.publish_date = date;
        }
        release.categories = categories;
        release.size = self.size.unwrap_or(0);
        release.files = self.files;
        release.grabs = self.grabs;
        release.description = self.description;
        release.imdb = self.imdb;
        release.tvdb_id = self.tvdb_id;
        Some(release)
    }
}
