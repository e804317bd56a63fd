//! Bounded breadth-first crawling.
//!
//! One coordinating task owns the crawl state (visited set, FIFO frontier,
//! page counter) and dispatches fetch work to stateless workers through a
//! [`JoinSet`]. A URL is claimed (inserted into `visited` and counted
//! against the page cap) before its worker is spawned, so no two workers
//! ever fetch the same URL. Once the cap is reached, in-flight fetches are
//! allowed to finish but nothing new is dispatched.
//!
//! Breadth-first order makes `max_depth` mean what callers expect: when the
//! page cap truncates a crawl, shallow pages win.

use std::collections::{HashSet, VecDeque};

use tokio::task::JoinSet;
use tracing::{info, warn};
use url::Url;

use crate::crawl::extract::{extract_page, Page};
use crate::crawl::fetcher::Fetcher;
use crate::crawl::urls;
use crate::types::SiteChatError;

/// Bounds for one crawl run.
#[derive(Clone, Copy, Debug)]
pub struct CrawlLimits {
    /// Maximum link depth from the base URL; the base page is depth 0.
    pub max_depth: usize,
    /// Maximum number of successfully indexed pages.
    pub max_pages: usize,
    /// Number of concurrently in-flight fetches.
    pub concurrency: usize,
}

impl Default for CrawlLimits {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_pages: 100,
            concurrency: 4,
        }
    }
}

/// Process-local state of one crawl run; discarded when the run ends.
struct CrawlState {
    visited: HashSet<String>,
    frontier: VecDeque<(Url, usize)>,
    pages_indexed: usize,
}

impl CrawlState {
    fn new() -> Self {
        Self {
            visited: HashSet::new(),
            frontier: VecDeque::new(),
            pages_indexed: 0,
        }
    }

    /// Claims the next fetchable URL: marks it visited and counts it against
    /// the page cap in the same step. Entries that are already visited or
    /// too deep are discarded in FIFO order.
    ///
    /// The cap is checked before anything is popped, so a frontier entry
    /// held back by a temporarily full cap survives until a failed claim
    /// releases its slot.
    fn claim_next(&mut self, limits: &CrawlLimits) -> Option<(Url, usize)> {
        loop {
            if self.pages_indexed >= limits.max_pages {
                return None;
            }
            let (url, depth) = self.frontier.pop_front()?;
            if depth > limits.max_depth {
                continue;
            }
            if !self.visited.insert(url.to_string()) {
                continue;
            }
            self.pages_indexed += 1;
            return Some((url, depth));
        }
    }

    /// A claimed page that failed to fetch or extract does not count toward
    /// the cap; the URL stays visited so it is never retried.
    fn release_claim(&mut self) {
        self.pages_indexed = self.pages_indexed.saturating_sub(1);
    }

    fn enqueue_links(&mut self, page: &Page, base: &Url, limits: &CrawlLimits) {
        let next_depth = page.depth + 1;
        if next_depth > limits.max_depth {
            return;
        }
        for link in &page.links {
            if !urls::same_domain(base, link) {
                continue;
            }
            if self.visited.contains(link.as_str()) {
                continue;
            }
            self.frontier.push_back((link.clone(), next_depth));
        }
    }
}

/// Explores the link graph of one site within [`CrawlLimits`].
#[derive(Clone)]
pub struct CrawlScheduler {
    fetcher: Fetcher,
    limits: CrawlLimits,
}

impl CrawlScheduler {
    pub fn new(fetcher: Fetcher, limits: CrawlLimits) -> Self {
        Self { fetcher, limits }
    }

    /// Crawls breadth-first from `base_url`, returning every page that
    /// fetched and extracted successfully.
    ///
    /// A single page failure is logged and skipped; failure of the base
    /// page itself aborts the run, since nothing was indexed.
    pub async fn crawl(&self, base_url: &Url) -> Result<Vec<Page>, SiteChatError> {
        let base = urls::canonicalize(base_url);
        if base.host_str().is_none() {
            return Err(SiteChatError::InvalidUrl {
                url: base.to_string(),
                reason: "missing host".to_string(),
            });
        }

        info!(base = %base, max_depth = self.limits.max_depth, max_pages = self.limits.max_pages, "starting crawl");

        // Base page failure is fatal for the run.
        let root = self.fetch_and_extract(base.clone(), 0).await?;

        let mut state = CrawlState::new();
        state.visited.insert(base.to_string());
        state.pages_indexed = 1;
        state.enqueue_links(&root, &base, &self.limits);

        let mut pages = vec![root];
        let mut inflight: JoinSet<(Url, Result<Page, SiteChatError>)> = JoinSet::new();

        loop {
            while inflight.len() < self.limits.concurrency {
                let Some((url, depth)) = state.claim_next(&self.limits) else {
                    break;
                };
                let scheduler = self.clone();
                inflight.spawn(async move {
                    let result = scheduler.fetch_and_extract(url.clone(), depth).await;
                    (url, result)
                });
            }

            let Some(joined) = inflight.join_next().await else {
                break;
            };
            match joined {
                Ok((_, Ok(page))) => {
                    state.enqueue_links(&page, &base, &self.limits);
                    info!(url = %page.url, depth = page.depth, pages = state.pages_indexed, "indexed page");
                    pages.push(page);
                }
                Ok((url, Err(err))) if err.is_page_recoverable() => {
                    warn!(url = %url, error = %err, "skipping page");
                    state.release_claim();
                }
                Ok((_, Err(err))) => return Err(err),
                Err(join_err) => {
                    return Err(SiteChatError::Storage(format!(
                        "crawl worker panicked: {join_err}"
                    )))
                }
            }
        }

        info!(pages = pages.len(), "crawl complete");
        Ok(pages)
    }

    async fn fetch_and_extract(&self, url: Url, depth: usize) -> Result<Page, SiteChatError> {
        let fetched = self.fetcher.fetch(&url).await?;
        extract_page(&url, depth, &fetched.body)
    }
}
