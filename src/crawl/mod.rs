//! Website crawling: fetch, extract, and schedule.
//!
//! * [`urls`] — canonical URL handling, the crawl's uniqueness key.
//! * [`fetcher`] — one-URL HTTP retrieval with tagged failures.
//! * [`extract`] — HTML to [`Page`] (text, headings, same-domain links).
//! * [`scheduler`] — bounded breadth-first traversal over the two above.

pub mod extract;
pub mod fetcher;
pub mod scheduler;
pub mod urls;

pub use extract::{extract_page, Page};
pub use fetcher::{FetchedHtml, Fetcher};
pub use scheduler::{CrawlLimits, CrawlScheduler};
