//! The scraping pipeline: collect links from a listing, extract each article
//! with retries, then hand the batch to a sink.

pub mod collector;
pub mod extractor;
pub mod orchestrator;
pub mod retry;


use tracing::error;

use crate::browser::SessionManager;
use crate::error::Result;

pub use collector::LinkCollector;
pub use extractor::ArticleExtractor;
pub use orchestrator::{run, ArticleFailure, ScrapeOrchestrator, ScrapeResult};
pub use retry::{retry, AttemptRecord, RetryOutcome, RetryPolicy};

/// Restart the browser when `result` failed at the driver level.
///
/// The error itself is passed through so the retry loop can classify it.
/// A failed relaunch replaces it with the fatal `SessionInit` error.
pub(crate) async fn restart_on_driver_error<T>(
    sessions: &SessionManager,
    result: Result<T>,
    context: &str,
) -> Result<T> {
    if let Err(e) = &result {
        if e.needs_restart() {
            error!("Driver failure while {}: {}", context, e);
            sessions.restart().await?;
        }
    }
    result
}
