//! Shared fixtures for integration tests: a recording fake transport and
//! Gazelle/Newznab pages to serve from it.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use indexer_core::error::Result;
use indexer_core::indexer::definitions::{GazelleIndexer, NewznabIndexer};
use indexer_core::indexer::http::{HttpTransport, RawResponse, RequestDescriptor, RetryConfig};
use indexer_core::indexer::{AuthController, HttpExecutor, Indexer, IndexerPipeline, SessionStore};

type Handler = dyn Fn(Arc<RequestDescriptor>) -> Result<RawResponse> + Send + Sync;
type Latency = dyn Fn(&RequestDescriptor) -> Duration + Send + Sync;

/// A request as the transport saw it
#[derive(Debug, Clone)]
pub struct SentRequest {
    pub at: Instant,
    pub request: RequestDescriptor,
}

/// Transport answering from a routing closure and recording every request
pub struct MockTransport {
    handler: Box<Handler>,
    latency: Box<Latency>,
    sent: Mutex<Vec<SentRequest>>,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(Arc<RequestDescriptor>) -> Result<RawResponse> + Send + Sync + 'static,
    {
        Self::with_latency(Duration::ZERO, handler)
    }

    pub fn with_latency<F>(latency: Duration, handler: F) -> Arc<Self>
    where
        F: Fn(Arc<RequestDescriptor>) -> Result<RawResponse> + Send + Sync + 'static,
    {
        Self::with_latency_fn(move |_| latency, handler)
    }

    /// Per-request latency chosen by `latency`
    pub fn with_latency_fn<L, F>(latency: L, handler: F) -> Arc<Self>
    where
        L: Fn(&RequestDescriptor) -> Duration + Send + Sync + 'static,
        F: Fn(Arc<RequestDescriptor>) -> Result<RawResponse> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            latency: Box::new(latency),
            sent: Mutex::new(vec![]),
        })
    }

    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().clone()
    }

    /// Number of requests whose URL contains `needle`
    pub fn count(&self, needle: &str) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|s| s.request.url.contains(needle))
            .count()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: Arc<RequestDescriptor>, _timeout: Duration) -> Result<RawResponse> {
        self.sent.lock().push(SentRequest {
            at: Instant::now(),
            request: (*request).clone(),
        });
        let latency = (self.latency)(&request);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        (self.handler)(request)
    }
}

/// Executor over `transport` with fast retries
pub fn executor(transport: Arc<MockTransport>, rate_limit: Duration) -> Arc<HttpExecutor> {
    Arc::new(HttpExecutor::new(
        transport,
        rate_limit,
        RetryConfig {
            max_retries: 2,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            multiplier: 2.0,
        },
        Duration::from_secs(5),
    ))
}

pub fn pipeline(indexer: Arc<dyn Indexer>, executor: Arc<HttpExecutor>) -> IndexerPipeline {
    let auth = Arc::new(AuthController::new(
        executor.clone(),
        Arc::new(SessionStore::new()),
    ));
    IndexerPipeline::new(indexer, executor, auth, 5)
}

pub fn gazelle(id: &str) -> Arc<dyn Indexer> {
    Arc::new(
        GazelleIndexer::new(id, id, &format!("https://{}.example", id), "user", "pass", false)
            .expect("valid gazelle settings"),
    )
}

pub fn newznab(id: &str) -> Arc<dyn Indexer> {
    Arc::new(
        NewznabIndexer::new(id, id, &format!("https://{}.example", id), "key")
            .expect("valid newznab settings"),
    )
}

pub fn is_login(request: &RequestDescriptor) -> bool {
    request.url.ends_with("/login.php")
}

/// `page=N` from a search URL
pub fn page_of(request: &RequestDescriptor) -> u32 {
    request
        .url
        .split(['?', '&'])
        .find_map(|pair| pair.strip_prefix("page="))
        .and_then(|p| p.parse().ok())
        .unwrap_or(1)
}

/// Accepted login: redirect away from the form with a session cookie
pub fn login_ok(request: Arc<RequestDescriptor>) -> RawResponse {
    RawResponse::new(request, 302, "")
        .with_header("Location", "index.php")
        .with_header("Set-Cookie", "session=abc123; path=/; HttpOnly")
}

pub const LOGIN_FORM: &str = r#"<html><body>
<form id="loginform" action="login.php" method="post">
  <span class="warning">Your username or password was incorrect.</span>
  <input name="username"/><input name="password" type="password"/>
</form>
</body></html>"#;

pub fn html(request: Arc<RequestDescriptor>, body: String) -> RawResponse {
    RawResponse::new(request, 200, body).with_header("Content-Type", "text/html; charset=utf-8")
}

/// A Gazelle results page with `count` movie rows numbered from `first_id`
pub fn gazelle_page(first_id: u32, count: u32) -> String {
    let mut rows = String::new();
    for id in first_id..first_id + count {
        rows.push_str(&format!(
            r#"<tr class="torrent">
  <td><a href="torrents.php?filter_cat[9]=1"><div class="cats_movies"></div></a></td>
  <td>
    <span>[ <a href="torrents.php?action=download&amp;id={id}" title="Download">DL</a> ]</span>
    <a href="torrents.php?id={id}" title="View Torrent">Release {id}</a>
  </td>
  <td>3</td>
  <td><span class="time" title="Mar 10 2024, 12:00">1 day ago</span></td>
  <td>1.00 GB</td>
  <td>7</td>
  <td>0</td>
  <td>10</td>
  <td>2</td>
</tr>
"#
        ));
    }
    format!(
        r#"<html><body><table id="torrent_table"><tbody>
<tr class="colhead"><td>Cat</td><td>Name</td></tr>
{rows}</tbody></table></body></html>"#
    )
}

/// A Newznab RSS feed with one item per title
pub fn newznab_feed(titles: &[&str]) -> String {
    let items: String = titles
        .iter()
        .enumerate()
        .map(|(i, title)| {
            format!(
                r#"<item>
  <title>{title}</title>
  <guid>nzb-{i}</guid>
  <link>https://nz.example/getnzb/{i}.nzb</link>
  <pubDate>Sun, 10 Mar 2024 12:00:00 +0000</pubDate>
  <newznab:attr name="category" value="2000"/>
  <newznab:attr name="size" value="1048576"/>
</item>
"#
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:newznab="http://www.newznab.com/DTD/2010/feeds/attributes/">
<channel>
{items}</channel>
</rss>"#
    )
}
