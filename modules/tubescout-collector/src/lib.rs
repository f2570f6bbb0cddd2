pub mod also_watched;
pub mod browser;
pub mod collector;
pub mod enrichment;
pub mod error;
pub mod extractor;
pub mod jobs;
pub mod store;
pub mod templates;
pub mod views_parser;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use also_watched::{AlsoWatchedDetector, NoAlsoWatched, SelectorAlsoWatched};
pub use browser::{BrowserPage, BrowserProvider, BrowserSession, CdpBrowserProvider, WaitPolicy};
pub use collector::{search_url, CollectReport, CollectSettings, Collector, RunSummary};
pub use error::{BrowserError, CollectorError, Result, StoreError};
pub use jobs::{JobRunner, RunReport, Submission};
pub use store::{PgRunStore, RunStore};
pub use templates::{OpenAiTemplater, TitleTemplater};
pub use views_parser::{parse_views, views_num};
