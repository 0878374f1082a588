use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

use crate::browser::{ChromeLauncher, SessionFactory, SessionManager};
use crate::clock::{Clock, TokioClock};
use crate::config::Config;
use crate::error::{Result, ScrapingError};
use crate::parser::{ArticleRecord, ListingEntry};
use crate::pipeline::collector::LinkCollector;
use crate::pipeline::extractor::ArticleExtractor;
use crate::pipeline::retry::RetryOutcome;
use crate::sites::{CollectionMode, SiteProfile};
use crate::storage::{ArticleSink, ArticleWriter};

/// An article that was collected but could not be extracted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleFailure {
    pub url: String,
    pub attempts: usize,
    pub cause: String,
}

/// What a run produced. Returned even when writing the output failed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScrapeResult {
    records: Vec<ArticleRecord>,
    failures: Vec<ArticleFailure>,
    links_collected: usize,
    output_path: Option<PathBuf>,
}

impl ScrapeResult {
    pub fn records(&self) -> &[ArticleRecord] {
        &self.records
    }

    pub fn failures(&self) -> &[ArticleFailure] {
        &self.failures
    }

    pub fn links_collected(&self) -> usize {
        self.links_collected
    }

    /// Where the records were written, if they were.
    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    pub fn success_count(&self) -> usize {
        self.records.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}

#[derive(Default)]
struct Batch {
    records: Vec<ArticleRecord>,
    failures: Vec<ArticleFailure>,
    links_collected: usize,
}

/// Drives one scrape: session, collection, extraction, teardown, output.
pub struct ScrapeOrchestrator {
    profile: SiteProfile,
    listing_url: String,
    max_articles: usize,
    max_scrolls: u32,
    article_delay: Duration,
    sessions: SessionManager,
    collector: LinkCollector,
    extractor: ArticleExtractor,
    sink: Box<dyn ArticleSink>,
    clock: Arc<dyn Clock>,
}

impl ScrapeOrchestrator {
    pub fn new(
        config: &Config,
        factory: Arc<dyn SessionFactory>,
        sink: Box<dyn ArticleSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let profile = config.resolve_profile()?;
        let base_url = Url::parse(&profile.base_url)
            .map_err(|e| ScrapingError::Config(format!("Invalid base_url '{}': {}", profile.base_url, e)))?;
        let listing_url = base_url
            .join(&profile.listing_url)
            .map_err(|e| ScrapingError::Config(format!("Invalid listing_url '{}': {}", profile.listing_url, e)))?
            .to_string();

        let policy = config.retry_policy();
        let collector = LinkCollector::new(
            &profile,
            base_url,
            policy.clone(),
            config.pacing.scroll_delay,
            clock.clone(),
        )?;
        let extractor = ArticleExtractor::new(&profile, policy, clock.clone())?;
        let sessions = SessionManager::new(factory, config.session_settings(), clock.clone());

        Ok(Self {
            profile,
            listing_url,
            max_articles: config.limits.max_articles,
            max_scrolls: config.limits.max_scrolls,
            article_delay: config.pacing.article_delay,
            sessions,
            collector,
            extractor,
            sink,
            clock,
        })
    }

    /// Wire the real browser, wall clock and file writer.
    pub fn from_config(config: &Config) -> Result<Self> {
        let profile = config.resolve_profile()?;
        let writer = ArticleWriter::new(
            config.output.directory.clone(),
            profile.output_prefix.clone(),
            profile.output_format,
            config.output.timestamped,
        );
        Self::new(config, Arc::new(ChromeLauncher), Box::new(writer), Arc::new(TokioClock))
    }

    /// Run the whole scrape. The browser is shut down exactly once whatever
    /// happens; only session start-up and link collection failures abort.
    pub async fn run(&self) -> Result<ScrapeResult> {
        info!(
            "Starting {} scrape of {} (max {} articles)",
            self.profile.name, self.listing_url, self.max_articles
        );

        let outcome = self.scrape().await;
        self.sessions.shutdown().await;

        let batch = match outcome {
            Ok(batch) => batch,
            Err(e) => {
                error!("Error in main scraping process: {}", e);
                return Err(e);
            }
        };

        let output_path = if batch.records.is_empty() {
            warn!("No articles scraped, nothing to save");
            None
        } else {
            match self.sink.persist(&batch.records).await {
                Ok(path) => Some(path),
                Err(e) => {
                    error!("Error saving articles: {}", e);
                    None
                }
            }
        };

        let result = ScrapeResult {
            records: batch.records,
            failures: batch.failures,
            links_collected: batch.links_collected,
            output_path,
        };

        info!(
            collected = result.links_collected(),
            succeeded = result.success_count(),
            failed = result.failure_count(),
            "Scrape finished: {} of {} articles scraped",
            result.success_count(),
            result.links_collected()
        );
        Ok(result)
    }

    async fn scrape(&self) -> Result<Batch> {
        self.sessions.acquire().await?;

        let entries = self.collect_entries().await?;
        if entries.is_empty() {
            error!("No article links found on {}", self.listing_url);
            return Ok(Batch::default());
        }
        info!("Found {} articles to scrape", entries.len());

        let mut batch = Batch {
            links_collected: entries.len(),
            ..Batch::default()
        };

        for (index, entry) in entries.iter().enumerate() {
            info!("Scraping article {}/{}: {}", index + 1, entries.len(), entry.link);

            match self.extractor.fetch(&self.sessions, entry).await {
                RetryOutcome::Success { value, .. } => batch.records.push(value),
                RetryOutcome::Exhausted { error, attempts } => {
                    if error.is_fatal() {
                        return Err(error);
                    }
                    warn!("Skipping article {} after {} attempts: {}", entry.link, attempts.len(), error);
                    batch.failures.push(ArticleFailure {
                        url: entry.link.to_string(),
                        attempts: attempts.len(),
                        cause: error.to_string(),
                    });
                }
            }

            if index + 1 < entries.len() {
                self.clock.sleep(self.article_delay).await;
            }
        }

        Ok(batch)
    }

    async fn collect_entries(&self) -> Result<Vec<ListingEntry>> {
        match self.profile.mode {
            CollectionMode::Scroll => {
                let links = self
                    .collector
                    .collect(&self.sessions, &self.listing_url, self.max_scrolls, self.max_articles)
                    .await?;
                Ok(links.into_iter().map(ListingEntry::from).collect())
            }
            CollectionMode::Listing => {
                self.collector
                    .collect_listing(&self.sessions, &self.listing_url, self.max_articles)
                    .await
            }
        }
    }
}

/// Scrape the configured site with a real browser and write the output file.
pub async fn run(config: &Config) -> Result<ScrapeResult> {
    ScrapeOrchestrator::from_config(config)?.run().await
}
