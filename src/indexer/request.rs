//! Request generation contract
//!
//! A [`RequestGenerator`] turns [`SearchCriteria`] into a [`RequestChain`]: an
//! ordered, lazily produced sequence of pages, each page a group of requests
//! whose results are concatenated.

use std::fmt;

use super::http::RequestDescriptor;
use super::types::{
    BasicSearch, BookSearch, MovieSearch, MusicSearch, SearchCriteria, SearchKind, TvSearch,
};
use crate::error::{IndexerError, Result};

/// One page worth of requests
pub type RequestGroup = Vec<RequestDescriptor>;

type PageFn = Box<dyn Fn(u32) -> Result<Option<RequestGroup>> + Send + Sync>;

enum Pages {
    Fixed(std::vec::IntoIter<RequestGroup>),
    Lazy { build: PageFn, next: u32, done: bool },
}

/// Ordered sequence of request groups, consumed one page at a time
pub struct RequestChain {
    pages: Pages,
    page_size: Option<usize>,
}

impl RequestChain {
    /// A chain with no requests
    pub fn empty() -> Self {
        Self::from_groups(vec![])
    }

    pub fn single(request: RequestDescriptor) -> Self {
        Self::from_groups(vec![vec![request]])
    }

    /// Pre-built pages, requested in the given order
    pub fn from_groups(groups: Vec<RequestGroup>) -> Self {
        Self {
            pages: Pages::Fixed(groups.into_iter()),
            page_size: None,
        }
    }

    /// Pages built on demand from a zero-based page index.
    ///
    /// The builder returns `Ok(None)` when the site has no further pages.
    /// Paging also stops as soon as every request of a page yields fewer than
    /// `page_size` results, so the builder is never asked for pages past the end of the
    /// result set.
    pub fn paged<F>(page_size: usize, build: F) -> Self
    where
        F: Fn(u32) -> Result<Option<RequestGroup>> + Send + Sync + 'static,
    {
        Self {
            pages: Pages::Lazy {
                build: Box::new(build),
                next: 0,
                done: false,
            },
            page_size: Some(page_size),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Results per full page. `None` means every page is considered full.
    pub fn page_size(&self) -> Option<usize> {
        self.page_size
    }

    /// Whether a page that produced `results` records ends the chain
    pub fn is_last_page(&self, results: usize) -> bool {
        self.page_size.is_some_and(|size| results < size)
    }

    /// Whether a group ends the chain, given the record count of each of its
    /// requests. `page_size` applies per request, so one full response keeps
    /// paging going.
    pub fn is_last_group(&self, results_per_request: &[usize]) -> bool {
        results_per_request.iter().all(|&n| self.is_last_page(n))
    }

    /// Materialize at most `max_pages` pages, for inspection and tests
    pub fn collect_pages(self, max_pages: u32) -> Result<Vec<RequestGroup>> {
        self.take(max_pages as usize).collect()
    }
}

impl Iterator for RequestChain {
    type Item = Result<RequestGroup>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.pages {
            Pages::Fixed(groups) => groups.next().map(Ok),
            Pages::Lazy { build, next, done } => {
                if *done {
                    return None;
                }
                let page = *next;
                *next += 1;
                match build(page) {
                    Ok(Some(group)) => Some(Ok(group)),
                    Ok(None) => {
                        *done = true;
                        None
                    }
                    Err(e) => {
                        *done = true;
                        Some(Err(e))
                    }
                }
            }
        }
    }
}

impl fmt::Debug for RequestChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.pages {
            Pages::Fixed(ref groups) => format!("fixed({})", groups.len()),
            Pages::Lazy { next, .. } => format!("lazy(next={})", next),
        };
        f.debug_struct("RequestChain")
            .field("pages", &kind)
            .field("page_size", &self.page_size)
            .finish()
    }
}

/// Builds requests for each kind of search.
///
/// Only [`basic_requests`](Self::basic_requests) is required. The typed
/// searches fall back to it, so an adapter that cannot search by ID still
/// answers with a text search. Identical criteria must always produce the
/// same requests in the same order.
pub trait RequestGenerator: Send + Sync {
    fn basic_requests(&self, search: &BasicSearch) -> Result<RequestChain>;

    fn tv_requests(&self, search: &TvSearch) -> Result<RequestChain> {
        self.basic_requests(&BasicSearch {
            query: search.query.clone().with_term(Some(search.search_string())),
        })
    }

    fn movie_requests(&self, search: &MovieSearch) -> Result<RequestChain> {
        self.basic_requests(&BasicSearch {
            query: search.query.clone(),
        })
    }

    fn music_requests(&self, search: &MusicSearch) -> Result<RequestChain> {
        let _ = search;
        Err(IndexerError::UnsupportedSearch(SearchKind::Music))
    }

    fn book_requests(&self, search: &BookSearch) -> Result<RequestChain> {
        let _ = search;
        Err(IndexerError::UnsupportedSearch(SearchKind::Book))
    }

    fn generate(&self, criteria: &SearchCriteria) -> Result<RequestChain> {
        match criteria {
            SearchCriteria::Basic(s) => self.basic_requests(s),
            SearchCriteria::Tv(s) => self.tv_requests(s),
            SearchCriteria::Movie(s) => self.movie_requests(s),
            SearchCriteria::Music(s) => self.music_requests(s),
            SearchCriteria::Book(s) => self.book_requests(s),
        }
    }
}
