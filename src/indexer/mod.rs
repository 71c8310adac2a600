//! Indexer execution core
//!
//! Searches flow through an [`IndexerPipeline`]: the [`AuthController`] makes
//! sure a session exists, the adapter's [`RequestGenerator`] builds a
//! [`RequestChain`], each page goes through the [`HttpExecutor`] and the
//! adapter's [`ResponseParser`] turns responses into [`ReleaseRecord`]s.
//!
//! # Architecture
//!
//! - `Indexer` trait: the bundle every site adapter implements
//! - `IndexerManager`: registry and concurrent fan-out across indexers
//! - `types`: search criteria, capabilities and the release model
//! - `definitions`: built-in adapters
//! - `torznab`: caps and results XML for downstream applications

pub mod auth;
pub mod categories;
pub mod definitions;
pub mod http;
pub mod manager;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod session;
pub mod torznab;
pub mod types;

use std::time::Duration;

pub use auth::{AuthController, AuthState, LoginOutcome};
pub use categories::{CategoryMap, CategoryMapping};
pub use http::{HttpExecutor, HttpMethod, RawResponse, RequestDescriptor};
pub use manager::IndexerManager;
pub use pipeline::{IndexerPipeline, IndexerSearchResult};
pub use request::{RequestChain, RequestGenerator};
pub use response::ResponseParser;
pub use session::{CookieJar, SessionState, SessionStore};
pub use types::{
    Capabilities, DownloadProtocol, Privacy, ReleaseRecord, SearchCriteria, SearchKind,
};

use crate::error::{IndexerError, Result};

/// Default lifetime of a session created by a form login
pub const DEFAULT_SESSION_LIFETIME_DAYS: i64 = 30;

/// Core trait for all indexer adapters
///
/// Adapters do no I/O themselves. They describe requests, interpret
/// responses and decide what a successful login looks like; the pipeline does
/// the rest.
pub trait Indexer: Send + Sync {
    /// Unique identifier for this indexer instance
    fn id(&self) -> &str;

    /// Display name for the indexer
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// The site URL, with a trailing slash
    fn site_link(&self) -> &str;

    fn privacy(&self) -> Privacy;

    fn protocol(&self) -> DownloadProtocol;

    fn language(&self) -> &str {
        "en-US"
    }

    fn capabilities(&self) -> &Capabilities;

    fn request_generator(&self) -> &dyn RequestGenerator;

    fn parser(&self) -> &dyn ResponseParser;

    /// Minimum interval between requests, `None` for the core default
    fn rate_limit(&self) -> Option<Duration> {
        None
    }

    /// Whether searches need a session from a login flow
    fn requires_login(&self) -> bool {
        false
    }

    fn login_request(&self) -> Result<RequestDescriptor> {
        Err(IndexerError::InvalidRequest(format!(
            "{} has no login flow",
            self.id()
        )))
    }

    /// Decide whether a login response succeeded
    fn check_login(&self, response: &RawResponse) -> LoginOutcome {
        let _ = response;
        LoginOutcome::success()
    }

    /// Whether a data response shows the session is no longer accepted
    fn login_needed(&self, response: &RawResponse) -> bool {
        let _ = response;
        false
    }

    /// How long a fresh session is trusted, `None` until invalidated
    fn session_lifetime(&self) -> Option<chrono::Duration> {
        Some(chrono::Duration::days(DEFAULT_SESSION_LIFETIME_DAYS))
    }

    /// Check if this indexer can handle the given search
    fn can_handle(&self, criteria: &SearchCriteria) -> bool {
        self.capabilities().can_handle(criteria)
    }
}
