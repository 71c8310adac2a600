//! Gazelle tracker implementation
//!
//! Gazelle is the PHP tracker software behind many private music and e-book
//! sites. Searches go to `torrents.php` and results come back as an HTML
//! table, one `tr.torrent` per release.
//!
//! # Authentication
//!
//! Form login against `login.php`. The session cookie set by the login
//! response is kept for 30 days or until a search page shows the login form
//! again.
//!
//! # Configuration
//!
//! Required credentials:
//! - `username`
//! - `password`
//!
//! Optional settings:
//! - `freeleech_only`: Only search for freeleech torrents

use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, info};

use crate::config::IndexerSettings;
use crate::error::{IndexerError, Result};
use crate::indexer::auth::LoginOutcome;
use crate::indexer::categories::{CategoryMap, cats};
use crate::indexer::http::{RawResponse, RequestDescriptor, join_url, url_with_query};
use crate::indexer::request::{RequestChain, RequestGenerator};
use crate::indexer::response::{
    ResponseParser, coerce_int, normalize_title, parse_size, parse_time_ago,
};
use crate::indexer::types::{
    BasicSearch, BookSearchParam, Capabilities, DownloadProtocol, MovieSearchParam,
    MusicSearchParam, Privacy, ReleaseRecord, TvSearchParam,
};
use crate::indexer::Indexer;

/// Rows per results page
pub const PAGE_SIZE: u32 = 50;

const LOGIN_TIMEOUT: Duration = Duration::from_secs(15);

static ROWS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#torrent_table > tbody > tr.torrent").expect("valid selector"));
static CELLS: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("valid selector"));
static VIEW_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[title='View Torrent']").expect("valid selector"));
static DOWNLOAD_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[title='Download']").expect("valid selector"));
static STRONG: Lazy<Selector> = Lazy::new(|| Selector::parse("strong").expect("valid selector"));
static TIME_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span[title]").expect("valid selector"));
static LOGIN_FORM: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#loginform").expect("valid selector"));
static LOGIN_WARNING: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".warning").expect("valid selector"));

static TORRENT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[?&]torrentid=(\d+)").expect("valid regex"));
static GROUP_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"[?&]id=(\d+)").expect("valid regex"));
static SEASON: Lazy<Regex> = Lazy::new(|| Regex::new(r"Season (\d+)").expect("valid regex"));

/// Site category that holds TV seasons
const TV_CATEGORY: &str = "10";

/// Gazelle-based private tracker
pub struct GazelleIndexer {
    id: String,
    name: String,
    site_link: String,
    username: String,
    password: String,
    capabilities: Capabilities,
    generator: GazelleRequestGenerator,
    parser: GazelleParser,
}

impl GazelleIndexer {
    pub fn new(
        id: &str,
        name: &str,
        site_link: &str,
        username: &str,
        password: &str,
        freeleech_only: bool,
    ) -> anyhow::Result<Self> {
        if username.is_empty() || password.is_empty() {
            return Err(anyhow!("Username and password are required for Gazelle indexer"));
        }
        url::Url::parse(site_link)
            .map_err(|e| anyhow!("Invalid site URL '{}': {}", site_link, e))?;

        let site_link = format!("{}/", site_link.trim_end_matches('/'));
        let capabilities = Self::build_capabilities();

        info!(
            indexer_id = %id,
            indexer_name = %name,
            site = %site_link,
            freeleech_only,
            "Created Gazelle indexer"
        );

        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            generator: GazelleRequestGenerator {
                site_link: site_link.clone(),
                categories: capabilities.categories.clone(),
                freeleech_only,
            },
            parser: GazelleParser {
                indexer_id: id.to_string(),
                site_link: site_link.clone(),
                categories: capabilities.categories.clone(),
                clock: Utc::now,
            },
            site_link,
            capabilities,
        })
    }

    pub fn from_settings(settings: &IndexerSettings) -> anyhow::Result<Self> {
        let username = settings
            .username
            .as_deref()
            .ok_or_else(|| anyhow!("Username is required for Gazelle indexer"))?;
        let password = settings
            .password
            .as_deref()
            .ok_or_else(|| anyhow!("Password is required for Gazelle indexer"))?;
        Self::new(
            &settings.id,
            &settings.name,
            &settings.base_url,
            username,
            password,
            settings.setting_bool("freeleech_only"),
        )
    }

    /// Replace the clock relative dates ("3 hours ago") are resolved against
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.parser.clock = clock;
        self
    }

    fn build_capabilities() -> Capabilities {
        Capabilities {
            search_available: true,
            limits_default: Some(PAGE_SIZE),
            limits_max: Some(PAGE_SIZE),
            tv_search_params: vec![TvSearchParam::Q, TvSearchParam::Season, TvSearchParam::Ep],
            movie_search_params: vec![MovieSearchParam::Q],
            music_search_params: vec![MusicSearchParam::Q],
            book_search_params: vec![BookSearchParam::Q],
            categories: Self::category_map(),
            ..Default::default()
        }
    }

    fn category_map() -> CategoryMap {
        let mut map = CategoryMap::new();
        for (native, standard, desc) in [
            ("1", cats::AUDIO, "Music"),
            ("1", cats::AUDIO_MP3, "Music"),
            ("1", cats::AUDIO_LOSSLESS, "Music"),
            ("2", cats::PC, "Applications"),
            ("3", cats::BOOKS_EBOOK, "E-Books"),
            ("4", cats::AUDIO_AUDIOBOOK, "Audiobooks"),
            ("5", cats::OTHER, "E-Learning Videos"),
            ("6", cats::BOOKS_MAGS, "Magazines"),
            ("7", cats::BOOKS_COMICS, "Comics"),
            ("8", cats::TV_ANIME, "Anime"),
            ("9", cats::MOVIES, "Movies"),
            ("10", cats::TV_HD, "TV"),
            ("10", cats::TV_SD, "TV"),
            ("10", cats::TV, "TV"),
            ("11", cats::PC_GAMES, "PC Games"),
            ("12", cats::CONSOLE, "Console Games"),
            ("13", cats::OTHER, "Documentaries"),
            ("14", cats::OTHER, "Misc"),
        ] {
            map.add_described(native, standard, desc);
        }
        map
    }
}

impl Indexer for GazelleIndexer {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Gazelle-based private tracker"
    }

    fn site_link(&self) -> &str {
        &self.site_link
    }

    fn privacy(&self) -> Privacy {
        Privacy::Private
    }

    fn protocol(&self) -> DownloadProtocol {
        DownloadProtocol::Torrent
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

    fn requires_login(&self) -> bool {
        true
    }

    fn login_request(&self) -> Result<RequestDescriptor> {
        let login_url = join_url(&self.site_link, "login.php")?;
        Ok(RequestDescriptor::post(&login_url)
            .form(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
                ("keeplogged", "1"),
                ("login", "Log In!"),
            ])
            .header("Referer", &login_url)
            .timeout(LOGIN_TIMEOUT)
            // The session cookie is set on the redirect itself
            .allow_redirect(false)
            .log_response_content(true)
            .summary("login"))
    }

    fn check_login(&self, response: &RawResponse) -> LoginOutcome {
        if response.is_redirect() {
            return if redirects_to_login(response) {
                LoginOutcome::Failure { reason: None }
            } else {
                LoginOutcome::success()
            };
        }

        let document = Html::parse_document(&response.text());
        match document.select(&LOGIN_FORM).next() {
            Some(form) => LoginOutcome::Failure {
                reason: login_warning(form),
            },
            None => LoginOutcome::success(),
        }
    }

    fn login_needed(&self, response: &RawResponse) -> bool {
        redirects_to_login(response) || shows_login_form(&response.text())
    }
}

fn redirects_to_login(response: &RawResponse) -> bool {
    response.is_redirect()
        && response
            .header("location")
            .is_some_and(|location| location.contains("login.php"))
}

fn shows_login_form(body: &str) -> bool {
    body.contains("loginform")
        && Html::parse_document(body)
            .select(&LOGIN_FORM)
            .next()
            .is_some()
}

/// The site's own explanation for a rejected login, when it gave one
fn login_warning(form: ElementRef) -> Option<String> {
    form.select(&LOGIN_WARNING)
        .map(|el| normalize_title(&el.text().collect::<String>()))
        .find(|text| !text.is_empty())
}

/// Builds `torrents.php` searches, one page per request
pub struct GazelleRequestGenerator {
    site_link: String,
    categories: CategoryMap,
    freeleech_only: bool,
}

impl RequestGenerator for GazelleRequestGenerator {
    fn basic_requests(&self, search: &BasicSearch) -> Result<RequestChain> {
        let query = &search.query;
        let search_url = join_url(&self.site_link, "torrents.php")?;

        let mut params: Vec<(String, String)> = [
            ("order_by", "s3"),
            ("order_way", "desc"),
            ("disablegrouping", "1"),
            ("searchtags", ""),
            ("tags_type", "0"),
            ("action", "basic"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        params.push((
            "searchstr".to_string(),
            query.search_term.clone().unwrap_or_default(),
        ));
        for cat in self.categories.map_standard_to_native(&query.categories) {
            params.push((format!("filter_cat[{}]", cat), "1".to_string()));
        }
        if self.freeleech_only {
            params.push(("freetorrent".to_string(), "1".to_string()));
        }

        let first_page = query.offset.unwrap_or(0) / PAGE_SIZE;
        let referer = self.site_link.clone();

        Ok(RequestChain::paged(PAGE_SIZE as usize, move |page| {
            let page = (first_page + page + 1).to_string();
            let mut pairs: Vec<(&str, &str)> = params
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            pairs.push(("page", &page));

            let url = url_with_query(&search_url, &pairs)?;
            Ok(Some(vec![
                RequestDescriptor::get(url)
                    .header("Referer", &referer)
                    .summary(format!("page {}", page)),
            ]))
        }))
    }
}

/// Parses the `#torrent_table` results page
pub struct GazelleParser {
    indexer_id: String,
    site_link: String,
    categories: CategoryMap,
    clock: fn() -> DateTime<Utc>,
}

impl GazelleParser {
    fn parse_row(&self, row: ElementRef, now: DateTime<Utc>) -> Option<ReleaseRecord> {
        let cells: Vec<ElementRef> = row.select(&CELLS).collect();
        if cells.len() < 9 {
            debug!(indexer_id = %self.indexer_id, cells = cells.len(), "Skipping short row");
            return None;
        }

        let native_cat = cells[0]
            .children()
            .find_map(ElementRef::wrap)
            .and_then(|a| a.value().attr("href"))
            .and_then(category_from_href);

        let details = cells[1].select(&VIEW_LINK).next()?.value().attr("href")?;
        let info_url = join_url(&self.site_link, details).ok()?;
        let download_url = cells[1]
            .select(&DOWNLOAD_LINK)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| join_url(&self.site_link, href).ok());

        let torrent_id = TORRENT_ID
            .captures(details)
            .or_else(|| GROUP_ID.captures(details))
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| info_url.clone());

        let mut title = normalize_title(&title_text(cells[1]));
        if native_cat.as_deref() == Some(TV_CATEGORY) {
            title = SEASON
                .replace_all(&title, |caps: &regex::Captures| {
                    let season: u32 = caps[1].parse().unwrap_or(0);
                    format!("S{:02}", season)
                })
                .into_owned();
        }
        if title.is_empty() {
            return None;
        }

        let mut release = ReleaseRecord::new(
            title,
            format!("{}-{}", self.indexer_id, torrent_id),
            DownloadProtocol::Torrent,
        );
        release.info_url = Some(info_url);
        release.download_url = download_url;
        release.categories = native_cat
            .map(|cat| self.categories.map_native_to_standard(&cat).into_iter().collect())
            .unwrap_or_default();
        if let Some(date) = publish_date(cells[3], now) {
            release.publish_date = date;
        }
        release.size = parse_size(&cell_text(cells[4])).unwrap_or(0);
        release.files = coerce_int(&cell_text(cells[2]));
        release.grabs = coerce_int(&cell_text(cells[5]));
        release.seeders = coerce_int(&cell_text(cells[7]));
        release.peers = coerce_int(&cell_text(cells[8])) + release.seeders;

        let freeleech = row
            .select(&STRONG)
            .any(|s| s.text().collect::<String>().contains("Freeleech!"));
        release.download_volume_factor = if freeleech { 0.0 } else { 1.0 };
        release.upload_volume_factor = 1.0;
        release.minimum_ratio = Some(1.0);
        release.minimum_seed_time = Some(172_800);

        Some(release)
    }
}

impl ResponseParser for GazelleParser {
    fn parse(&self, response: &RawResponse) -> Result<Vec<ReleaseRecord>> {
        let body = response.text();
        let document = Html::parse_document(&body);

        if document.select(&LOGIN_FORM).next().is_some() {
            return Err(IndexerError::SessionExpired);
        }

        let now = (self.clock)();
        let releases: Vec<ReleaseRecord> = document
            .select(&ROWS)
            .filter_map(|row| self.parse_row(row, now))
            .collect();

        debug!(indexer_id = %self.indexer_id, releases = releases.len(), "Parsed results page");
        Ok(releases)
    }
}

fn cell_text(cell: ElementRef) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// `torrents.php?filter_cat[10]=1` -> `10`
fn category_from_href(href: &str) -> Option<String> {
    let decoded = urlencoding::decode(href)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| href.to_string());
    decoded
        .split(['[', ']'])
        .nth(1)
        .filter(|cat| !cat.is_empty())
        .map(str::to_string)
}

/// Text of the name cell without tags, badges and download links
fn title_text(cell: ElementRef) -> String {
    let mut out = String::new();
    collect_title(cell, &mut out);
    out
}

fn collect_title(element: ElementRef, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if !matches!(el.name(), "span" | "strong" | "div" | "br") => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect_title(child, out);
                }
            }
            _ => {}
        }
    }
}

/// Absolute date from the hover title when present, else the relative text
fn publish_date(cell: ElementRef, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let absolute = cell
        .select(&TIME_TITLE)
        .next()
        .and_then(|span| span.value().attr("title"))
        .and_then(|title| NaiveDateTime::parse_from_str(title.trim(), "%b %d %Y, %H:%M").ok())
        .map(|naive| Utc.from_utc_datetime(&naive));

    absolute.or_else(|| parse_time_ago(&cell_text(cell).replace(" and", ""), now))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::indexer::types::SearchCriteria;

    const RESULTS: &str = r#"<html><body>
<table id="torrent_table"><tbody>
<tr class="colhead"><td>Cat</td><td>Name</td></tr>
<tr class="torrent">
  <td><a href="torrents.php?filter_cat[10]=1"><div class="cats_tv"></div></a></td>
  <td>
    <span>[ <a href="torrents.php?action=download&amp;id=1001&amp;authkey=a&amp;torrent_pass=p" title="Download">DL</a> ]</span>
    <a href="torrents.php?id=77&amp;torrentid=1001" title="View Torrent">Some Show  Season 2 [2020 - ]</a>
    <strong>Freeleech!</strong>
    <div class="tags">drama</div>
  </td>
  <td>12</td>
  <td><span class="time" title="Mar 10 2024, 12:00">3 hours ago</span></td>
  <td>4.50 GB</td>
  <td>1,204</td>
  <td>0</td>
  <td>25</td>
  <td>3</td>
</tr>
<tr class="torrent">
  <td><a href="torrents.php?filter_cat%5B3%5D=1"><div class="cats_ebooks"></div></a></td>
  <td>
    <span>[ <a href="torrents.php?action=download&amp;id=2002" title="Download">DL</a> ]</span>
    <a href="torrents.php?id=2002" title="View Torrent">Author - Book Title</a>
  </td>
  <td>1</td>
  <td>1 day and 2 hours ago</td>
  <td>500 MB</td>
  <td></td>
  <td></td>
  <td></td>
  <td></td>
</tr>
</tbody></table>
</body></html>"#;

    const LOGIN_PAGE: &str = r#"<html><body>
<form id="loginform" action="login.php" method="post">
  <span class="warning">Your username or password was incorrect.</span>
  <input name="username"/>
</form>
</body></html>"#;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap()
    }

    fn indexer() -> GazelleIndexer {
        GazelleIndexer::new("bb", "BB", "https://bb.example", "me", "secret", false)
            .unwrap()
            .with_clock(fixed_now)
    }

    fn response(status: u16, body: &str) -> RawResponse {
        RawResponse::new(
            Arc::new(RequestDescriptor::get("https://bb.example/torrents.php")),
            status,
            body,
        )
    }

    #[test]
    fn test_parse_results() {
        let releases = indexer().parser().parse(&response(200, RESULTS)).unwrap();
        assert_eq!(releases.len(), 2);

        let tv = &releases[0];
        assert_eq!(tv.title, "Some Show S02 [2020]");
        assert_eq!(tv.guid, "bb-1001");
        assert_eq!(
            tv.info_url.as_deref(),
            Some("https://bb.example/torrents.php?id=77&torrentid=1001")
        );
        assert_eq!(
            tv.download_url.as_deref(),
            Some("https://bb.example/torrents.php?action=download&id=1001&authkey=a&torrent_pass=p")
        );
        assert_eq!(tv.categories, vec![cats::TV, cats::TV_SD, cats::TV_HD]);
        assert_eq!(tv.publish_date, Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap());
        assert_eq!(tv.size, 4_831_838_208);
        assert_eq!(tv.files, 12);
        assert_eq!(tv.grabs, 1204);
        assert_eq!(tv.seeders, 25);
        assert_eq!(tv.peers, 28);
        assert!(tv.is_freeleech());
        assert_eq!(tv.minimum_seed_time, Some(172_800));

        let book = &releases[1];
        assert_eq!(book.title, "Author - Book Title");
        assert_eq!(book.guid, "bb-2002");
        assert_eq!(book.categories, vec![cats::BOOKS_EBOOK]);
        assert_eq!(book.publish_date, fixed_now() - chrono::Duration::hours(26));
        assert_eq!(book.size, 524_288_000);
        assert_eq!(book.seeders, 0);
        assert_eq!(book.peers, 0);
        assert_eq!(book.grabs, 0);
        assert_eq!(book.download_volume_factor, 1.0);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let indexer = indexer();
        let first = indexer.parser().parse(&response(200, RESULTS)).unwrap();
        let second = indexer.parser().parse(&response(200, RESULTS)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_login_page_means_expired_session() {
        let indexer = indexer();
        let page = response(200, LOGIN_PAGE);
        assert!(indexer.login_needed(&page));
        assert_matches!(
            indexer.parser().parse(&page),
            Err(IndexerError::SessionExpired)
        );
        assert!(!indexer.login_needed(&response(200, RESULTS)));

        let redirect = response(302, "").with_header("Location", "login.php");
        assert!(indexer.login_needed(&redirect));
    }

    #[test]
    fn test_check_login() {
        let indexer = indexer();

        let accepted = response(302, "").with_header("Location", "index.php");
        assert_eq!(indexer.check_login(&accepted), LoginOutcome::success());

        assert_eq!(
            indexer.check_login(&response(200, LOGIN_PAGE)),
            LoginOutcome::failure("Your username or password was incorrect.")
        );

        let silent = r#"<form id="loginform"><input name="username"/></form>"#;
        assert_eq!(
            indexer.check_login(&response(200, silent)),
            LoginOutcome::Failure { reason: None }
        );
    }

    #[test]
    fn test_login_request() {
        let request = indexer().login_request().unwrap();
        assert_eq!(request.url, "https://bb.example/login.php");
        assert_eq!(request.header_value("Referer"), Some("https://bb.example/login.php"));
        assert_eq!(request.timeout, Some(LOGIN_TIMEOUT));
        assert!(!request.allow_redirect);
        assert_eq!(
            request.body.as_deref(),
            Some(&b"username=me&password=secret&keeplogged=1&login=Log+In%21"[..])
        );
    }

    #[test]
    fn test_search_requests() {
        let criteria = SearchCriteria::search("Some Show").with_categories(vec![cats::TV]);
        let pages = indexer()
            .request_generator()
            .generate(&criteria)
            .unwrap()
            .collect_pages(2)
            .unwrap();

        assert_eq!(pages.len(), 2);
        let first = &pages[0][0];
        assert_eq!(
            first.url,
            "https://bb.example/torrents.php?order_by=s3&order_way=desc&disablegrouping=1\
             &searchtags=&tags_type=0&action=basic&searchstr=Some+Show\
             &filter_cat%5B10%5D=1&filter_cat%5B8%5D=1&page=1"
        );
        assert_eq!(first.header_value("Referer"), Some("https://bb.example/"));
        assert!(pages[1][0].url.ends_with("&page=2"));
    }

    #[test]
    fn test_requires_credentials() {
        assert!(GazelleIndexer::new("bb", "BB", "https://bb.example", "", "x", false).is_err());
        let settings = IndexerSettings::new("bb", "gazelle", "https://bb.example");
        assert!(GazelleIndexer::from_settings(&settings).is_err());
    }
}
