//! Indexer execution core
//!
//! Runs searches against torrent and Usenet indexer sites: builds requests
//! from search criteria, sends them through a rate-limited, retrying HTTP
//! executor, keeps login sessions alive and normalizes whatever comes back
//! into [`ReleaseRecord`]s.
//!
//! ```no_run
//! use indexer_core::{CoreConfig, IndexerManager, SearchCriteria};
//! use indexer_core::config::load_indexer_settings;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let manager = IndexerManager::new(CoreConfig::from_env()?)?;
//! manager.load_indexers(&load_indexer_settings("indexers.yml")?);
//!
//! for result in manager.search_all(&SearchCriteria::search("ubuntu")).await {
//!     println!("{}: {} releases", result.indexer_name, result.releases.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod indexer;
pub mod logging;

pub use config::{CoreConfig, IndexerSettings};
pub use error::{IndexerError, Result};
pub use indexer::{
    Indexer, IndexerManager, IndexerPipeline, IndexerSearchResult, ReleaseRecord, SearchCriteria,
};
