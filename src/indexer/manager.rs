//! Indexer Manager
//!
//! The IndexerManager is responsible for:
//! - Building configured indexer instances and their pipelines
//! - Orchestrating searches across multiple indexers
//! - Caching search results

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use futures::future::join_all;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use super::Indexer;
use super::auth::AuthController;
use super::definitions::build_indexer;
use super::http::HttpExecutor;
use super::pipeline::{IndexerPipeline, IndexerSearchResult};
use super::session::SessionStore;
use super::types::{ReleaseRecord, SearchCriteria};
use crate::config::{CoreConfig, IndexerSettings};
use crate::error::IndexerError;

/// Manages all configured indexer instances
pub struct IndexerManager {
    config: CoreConfig,
    executor: Arc<HttpExecutor>,
    auth: Arc<AuthController>,
    /// Pipelines by indexer ID
    pipelines: RwLock<BTreeMap<String, Arc<IndexerPipeline>>>,
    cache: SearchCache,
}

impl IndexerManager {
    /// Create a manager sending requests over reqwest
    pub fn new(config: CoreConfig) -> Result<Self> {
        let executor = HttpExecutor::from_config(&config)?;
        Ok(Self::with_executor(config, Arc::new(executor)))
    }

    pub fn with_executor(config: CoreConfig, executor: Arc<HttpExecutor>) -> Self {
        let auth = Arc::new(AuthController::new(
            executor.clone(),
            Arc::new(SessionStore::new()),
        ));
        Self {
            cache: SearchCache::new(config.cache_ttl),
            config,
            executor,
            auth,
            pipelines: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn auth(&self) -> &Arc<AuthController> {
        &self.auth
    }

    /// Build and register every enabled indexer. Failures are logged and skipped.
    pub fn load_indexers(&self, settings: &[IndexerSettings]) -> usize {
        let mut loaded = 0;
        for config in settings.iter().filter(|s| s.enabled) {
            match self.load_indexer(config) {
                Ok(()) => loaded += 1,
                Err(e) => {
                    tracing::warn!(
                        indexer_id = %config.id,
                        indexer_name = %config.name,
                        error = %e,
                        "Failed to load indexer"
                    );
                }
            }
        }
        loaded
    }

    /// Build a single indexer from its settings and register it
    pub fn load_indexer(&self, settings: &IndexerSettings) -> Result<()> {
        let indexer = build_indexer(settings)?;
        if let Some(interval) = settings.rate_limit() {
            self.executor.set_rate_limit(&settings.id, interval);
        }
        self.register(indexer);

        tracing::info!(
            indexer_id = %settings.id,
            indexer_name = %settings.name,
            implementation = %settings.implementation,
            "Loaded indexer"
        );
        Ok(())
    }

    /// Register an already constructed indexer
    pub fn register(&self, indexer: Arc<dyn Indexer>) {
        let pipeline = IndexerPipeline::new(
            indexer,
            self.executor.clone(),
            self.auth.clone(),
            self.config.max_pages,
        );
        self.pipelines
            .write()
            .insert(pipeline.id().to_string(), Arc::new(pipeline));
    }

    /// Unload an indexer
    pub fn unload_indexer(&self, indexer_id: &str) {
        self.pipelines.write().remove(indexer_id);
        self.auth.sessions().invalidate(indexer_id);
    }

    /// Get a loaded indexer by ID
    pub fn get_indexer(&self, indexer_id: &str) -> Option<Arc<dyn Indexer>> {
        self.pipelines
            .read()
            .get(indexer_id)
            .map(|p| p.indexer().clone())
    }

    /// Get all loaded indexers, ordered by ID
    pub fn get_all_indexers(&self) -> Vec<Arc<dyn Indexer>> {
        self.pipelines
            .read()
            .values()
            .map(|p| p.indexer().clone())
            .collect()
    }

    /// Search across all loaded indexers
    pub async fn search_all(&self, criteria: &SearchCriteria) -> Vec<IndexerSearchResult> {
        self.search_with_cancel(None, criteria, &CancellationToken::new())
            .await
    }

    /// Search specific indexers
    pub async fn search_indexers(
        &self,
        indexer_ids: &[&str],
        criteria: &SearchCriteria,
    ) -> Vec<IndexerSearchResult> {
        self.search_with_cancel(Some(indexer_ids), criteria, &CancellationToken::new())
            .await
    }

    /// Search indexers concurrently, one task each.
    ///
    /// Cancelling `cancel`, reaching the configured search timeout, or
    /// dropping the returned future stops every in-flight search; each reports
    /// what it had collected. Results are ordered by indexer ID.
    pub async fn search_with_cancel(
        &self,
        indexer_ids: Option<&[&str]>,
        criteria: &SearchCriteria,
        cancel: &CancellationToken,
    ) -> Vec<IndexerSearchResult> {
        let pipelines: Vec<_> = self
            .pipelines
            .read()
            .iter()
            .filter(|(id, _)| indexer_ids.is_none_or(|ids| ids.contains(&id.as_str())))
            .filter(|(_, p)| p.indexer().can_handle(criteria))
            .map(|(_, p)| p.clone())
            .collect();

        // Cancelled when this call returns or its future is dropped
        let cancel = cancel.child_token();
        let _cancel_on_drop = cancel.clone().drop_guard();
        if let Some(timeout) = self.config.search_timeout {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(timeout) => {
                        tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Search timed out");
                        cancel.cancel();
                    }
                }
            });
        }

        let mut meta = Vec::with_capacity(pipelines.len());
        let mut handles = Vec::with_capacity(pipelines.len());
        for pipeline in pipelines {
            let criteria = criteria.clone();
            let cache = self.cache.clone();
            let cancel = cancel.clone();
            meta.push((
                pipeline.id().to_string(),
                pipeline.indexer().name().to_string(),
            ));
            handles.push(tokio::spawn(async move {
                Self::search_single(pipeline, &criteria, cache, &cancel).await
            }));
        }

        let joined = join_all(handles).await;
        let mut results = Vec::with_capacity(joined.len());
        for ((id, name), joined) in meta.into_iter().zip(joined) {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!(indexer_id = %id, error = %e, "Indexer search task panicked");
                    results.push(IndexerSearchResult::failed(
                        &id,
                        &name,
                        IndexerError::InvalidRequest(format!("search task failed: {}", e)),
                    ));
                }
            }
        }

        self.cache.cleanup();
        results
    }

    /// Search a single indexer
    async fn search_single(
        pipeline: Arc<IndexerPipeline>,
        criteria: &SearchCriteria,
        cache: SearchCache,
        cancel: &CancellationToken,
    ) -> IndexerSearchResult {
        let start = Instant::now();
        let indexer = pipeline.indexer();
        let cache_key = format!("{}:{}", indexer.id(), criteria.cache_key());

        // Check cache first
        if criteria.query().cache {
            if let Some(cached) = cache.get(&cache_key) {
                tracing::debug!(indexer_id = %indexer.id(), "Serving search from cache");
                let mut result = IndexerSearchResult::new(indexer.id(), indexer.name());
                result.releases = cached;
                result.elapsed_ms = start.elapsed().as_millis() as u64;
                result.from_cache = true;
                return result;
            }
        }

        let result = pipeline.search(criteria, cancel).await;
        if result.is_complete() {
            cache.insert(cache_key, result.releases.clone());
        }
        result
    }

    /// Log in (if needed) and run an empty search
    pub async fn test_indexer(&self, indexer_id: &str) -> Result<bool> {
        let pipeline = self
            .pipelines
            .read()
            .get(indexer_id)
            .cloned()
            .ok_or_else(|| anyhow!("Indexer not loaded: {}", indexer_id))?;

        self.auth
            .ensure_authenticated(pipeline.indexer().as_ref(), true)
            .await?;

        let criteria = SearchCriteria::search("").without_cache();
        let result = pipeline.search(&criteria, &CancellationToken::new()).await;
        if let Some(summary) = result.error_summary() {
            tracing::warn!(indexer_id = %indexer_id, errors = %summary, "Indexer test failed");
            return Ok(false);
        }
        Ok(true)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

/// Simple in-memory search cache
#[derive(Clone)]
struct SearchCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl: Duration,
}

struct CacheEntry {
    releases: Vec<ReleaseRecord>,
    expires_at: Instant,
}

impl SearchCache {
    fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    fn get(&self, key: &str) -> Option<Vec<ReleaseRecord>> {
        let entries = self.entries.read();
        entries.get(key).and_then(|entry| {
            if entry.expires_at > Instant::now() {
                Some(entry.releases.clone())
            } else {
                None
            }
        })
    }

    fn insert(&self, key: String, releases: Vec<ReleaseRecord>) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.write();
        entries.insert(
            key,
            CacheEntry {
                releases,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Remove expired entries
    fn cleanup(&self) {
        let mut entries = self.entries.write();
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
    }

    fn clear(&self) {
        self.entries.write().clear();
    }
}

impl std::fmt::Debug for IndexerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexerManager")
            .field("indexers_count", &self.pipelines.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_expiry() {
        let cache = SearchCache::new(Duration::from_millis(20));
        cache.insert("k".to_string(), vec![]);
        assert!(cache.get("k").is_some());
        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get("k").is_none());
        cache.cleanup();
        assert!(cache.entries.read().is_empty());
    }

    #[test]
    fn test_zero_ttl_disables_cache() {
        let cache = SearchCache::new(Duration::ZERO);
        cache.insert("k".to_string(), vec![]);
        assert!(cache.get("k").is_none());
    }
}
