//! Per-indexer search orchestration
//!
//! ensure session -> generate chain -> for each page, in order: execute,
//! refresh cookies, check for an expired session, parse, accumulate. An
//! expired session triggers one re-login and a rerun of the whole search.
//! Any other failure stops paging and keeps what was already collected.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Indexer;
use super::auth::AuthController;
use super::http::{HttpExecutor, RequestDescriptor};
use super::session::CookieJar;
use super::types::{ReleaseRecord, SearchCriteria};
use crate::error::{IndexerError, Result};

/// Result from one indexer's search
#[derive(Debug, Clone, Serialize)]
pub struct IndexerSearchResult {
    pub indexer_id: String,
    pub indexer_name: String,
    pub releases: Vec<ReleaseRecord>,
    /// Problems that ended the search early. Releases may still be present.
    pub warnings: Vec<IndexerError>,
    /// Time taken to search (milliseconds)
    pub elapsed_ms: u64,
    /// Whether results came from cache
    pub from_cache: bool,
}

impl IndexerSearchResult {
    pub fn new(indexer_id: &str, indexer_name: &str) -> Self {
        Self {
            indexer_id: indexer_id.to_string(),
            indexer_name: indexer_name.to_string(),
            releases: vec![],
            warnings: vec![],
            elapsed_ms: 0,
            from_cache: false,
        }
    }

    pub fn failed(indexer_id: &str, indexer_name: &str, error: IndexerError) -> Self {
        let mut result = Self::new(indexer_id, indexer_name);
        result.warnings.push(error);
        result
    }

    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Some releases were returned but the search stopped early
    pub fn is_partial(&self) -> bool {
        !self.releases.is_empty() && !self.warnings.is_empty()
    }

    /// Warnings joined for display
    pub fn error_summary(&self) -> Option<String> {
        if self.warnings.is_empty() {
            return None;
        }
        Some(
            self.warnings
                .iter()
                .map(|w| w.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

enum ChainOutcome {
    Complete,
    /// A response showed the session sent with the request, at `generation`, is gone
    SessionExpired { generation: u64 },
    Failed(IndexerError),
}

/// Runs searches for one indexer
pub struct IndexerPipeline {
    indexer: Arc<dyn Indexer>,
    executor: Arc<HttpExecutor>,
    auth: Arc<AuthController>,
    max_pages: u32,
}

impl IndexerPipeline {
    pub fn new(
        indexer: Arc<dyn Indexer>,
        executor: Arc<HttpExecutor>,
        auth: Arc<AuthController>,
        max_pages: u32,
    ) -> Self {
        if let Some(interval) = indexer.rate_limit() {
            executor.set_rate_limit(indexer.id(), interval);
        }
        Self {
            indexer,
            executor,
            auth,
            max_pages: max_pages.max(1),
        }
    }

    pub fn indexer(&self) -> &Arc<dyn Indexer> {
        &self.indexer
    }

    pub fn id(&self) -> &str {
        self.indexer.id()
    }

    pub fn auth(&self) -> &Arc<AuthController> {
        &self.auth
    }

    /// Search this indexer. Never fails: problems are reported as warnings
    /// next to whatever releases were collected.
    pub async fn search(
        &self,
        criteria: &SearchCriteria,
        cancel: &CancellationToken,
    ) -> IndexerSearchResult {
        let start = Instant::now();
        let indexer = self.indexer.as_ref();
        let mut result = IndexerSearchResult::new(indexer.id(), indexer.name());

        if !indexer.can_handle(criteria) {
            result
                .warnings
                .push(IndexerError::UnsupportedSearch(criteria.kind()));
            return result;
        }

        let mut releases = vec![];
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = self.run(criteria, &mut releases) => Some(outcome),
        };

        match outcome {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                warn!(
                    indexer_id = %indexer.id(),
                    error = %e,
                    releases = releases.len(),
                    "Search ended early"
                );
                result.warnings.push(e);
            }
            None => {
                debug!(indexer_id = %indexer.id(), "Search cancelled");
                result.warnings.push(IndexerError::Cancelled);
            }
        }

        result.releases = dedupe(releases);
        result.elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            indexer_id = %indexer.id(),
            query = %criteria.query_string(),
            results = result.releases.len(),
            elapsed_ms = result.elapsed_ms,
            "Indexer search completed"
        );
        result
    }

    async fn run(&self, criteria: &SearchCriteria, releases: &mut Vec<ReleaseRecord>) -> Result<()> {
        let indexer = self.indexer.as_ref();
        self.auth.ensure_authenticated(indexer, false).await?;

        match self.fetch_chain(criteria, releases).await {
            ChainOutcome::Complete => return Ok(()),
            ChainOutcome::Failed(e) => return Err(e),
            ChainOutcome::SessionExpired { generation } => {
                if self.auth.mark_expired(indexer.id(), generation) {
                    info!(indexer_id = %indexer.id(), "Session expired mid-search, logging in again");
                } else {
                    debug!(indexer_id = %indexer.id(), "Session replaced mid-search, rerunning");
                }
            }
        }

        releases.clear();
        self.auth.ensure_authenticated(indexer, false).await?;

        match self.fetch_chain(criteria, releases).await {
            ChainOutcome::Complete => Ok(()),
            ChainOutcome::Failed(e) => Err(e),
            ChainOutcome::SessionExpired { generation } => {
                self.auth.mark_expired(indexer.id(), generation);
                Err(IndexerError::SessionExpired)
            }
        }
    }

    async fn fetch_chain(
        &self,
        criteria: &SearchCriteria,
        releases: &mut Vec<ReleaseRecord>,
    ) -> ChainOutcome {
        let indexer = self.indexer.as_ref();
        let mut chain = match indexer.request_generator().generate(criteria) {
            Ok(chain) => chain,
            Err(e) => return ChainOutcome::Failed(e),
        };

        for page in 0..self.max_pages {
            let group = match chain.next() {
                Some(Ok(group)) => group,
                Some(Err(e)) => return ChainOutcome::Failed(e),
                None => break,
            };

            let mut counts = Vec::with_capacity(group.len());
            for request in &group {
                let (cookies, generation) = self.auth.sessions().cookies_with_generation(indexer.id());
                match self.fetch(request, &cookies).await {
                    Ok(records) => {
                        counts.push(records.len());
                        releases.extend(records);
                    }
                    Err(IndexerError::SessionExpired) => {
                        return ChainOutcome::SessionExpired { generation };
                    }
                    Err(e) => return ChainOutcome::Failed(e),
                }
            }

            debug!(indexer_id = %indexer.id(), page, results = ?counts, "Page parsed");
            if chain.is_last_group(&counts) {
                break;
            }
        }

        ChainOutcome::Complete
    }

    /// Execute one request with `session` cookies and parse the response
    async fn fetch(&self, request: &RequestDescriptor, session: &CookieJar) -> Result<Vec<ReleaseRecord>> {
        let indexer = self.indexer.as_ref();
        let id = indexer.id();
        let sessions = self.auth.sessions();

        let request = request.with_session_cookies(session);
        let response = self.executor.execute(id, &request).await?;

        if request.store_response_cookies {
            sessions.merge_cookies(id, &response.cookies);
        }

        if indexer.requires_login() && indexer.login_needed(&response) {
            return Err(IndexerError::SessionExpired);
        }

        let mut records = indexer.parser().parse(&response)?;
        for record in &mut records {
            record.indexer_id = Some(id.to_string());
            record.indexer_name = Some(indexer.name().to_string());
            record.protocol = indexer.protocol();
        }
        Ok(records)
    }
}

/// Drop repeated GUIDs, keeping the first occurrence
fn dedupe(releases: Vec<ReleaseRecord>) -> Vec<ReleaseRecord> {
    let mut seen = HashSet::new();
    releases
        .into_iter()
        .filter(|r| seen.insert(r.guid.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkErrorKind;
    use crate::indexer::types::{DownloadProtocol, SearchKind};

    #[test]
    fn test_result_with_any_warning_serializes() {
        let warnings = vec![
            IndexerError::network(NetworkErrorKind::Connect, "refused"),
            IndexerError::HttpStatus {
                status: 502,
                url: "https://bb.example/torrents.php".to_string(),
            },
            IndexerError::auth("bad password"),
            IndexerError::SessionExpired,
            IndexerError::parse("truncated"),
            IndexerError::RateLimitViolation {
                indexer: "bb".to_string(),
                elapsed_ms: 10,
                interval_ms: 2000,
            },
            IndexerError::Cancelled,
            IndexerError::UnsupportedSearch(SearchKind::Music),
            IndexerError::InvalidRequest("no term".to_string()),
            IndexerError::Config("missing api_key".to_string()),
        ];

        for warning in &warnings {
            let result = IndexerSearchResult::failed("bb", "BB", warning.clone());
            let json = serde_json::to_value(&result).unwrap();
            assert_eq!(json["indexer_id"], "bb");
            assert!(json["warnings"][0]["type"].is_string(), "{:?}", json);
        }

        let mut result = IndexerSearchResult::new("bb", "BB");
        result.releases.push(ReleaseRecord::new(
            "Release".to_string(),
            "bb-1".to_string(),
            DownloadProtocol::Torrent,
        ));
        result.warnings = warnings;
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains(r#""detail":"bad password""#));
    }

    #[test]
    fn test_dedupe_keeps_first() {
        let record = |title: &str, guid: &str| {
            ReleaseRecord::new(title.to_string(), guid.to_string(), DownloadProtocol::Torrent)
        };
        let kept = dedupe(vec![record("a", "1"), record("b", "2"), record("c", "1")]);
        let titles: Vec<_> = kept.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b"]);
    }
}
