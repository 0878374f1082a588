use scraper::Selector;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::browser::{wait_for, PageDriver, SessionManager, WaitSettings};
use crate::clock::Clock;
use crate::error::{ExtractionKind, Result, ScrapingError};
use crate::parser::dom;
use crate::parser::{ArticleRecord, Field, FieldValues, ListingEntry};
use crate::pipeline::restart_on_driver_error;
use crate::pipeline::retry::{retry, RetryOutcome, RetryPolicy};
use crate::sites::{Requirement, SiteProfile};

/// Upper bound on waiting for a late-rendered article body.
const CONTENT_WAIT: Duration = Duration::from_secs(5);

struct CompiledRule {
    field: Field,
    selector: Option<Selector>,
    requirement: Requirement,
}

impl CompiledRule {
    /// Value to use when the field could not be found, or an error if the
    /// field is required.
    fn fallback(&self, url: &str, kind: ExtractionKind) -> Result<Option<String>> {
        match &self.requirement {
            Requirement::Required => Err(ScrapingError::extraction(kind, self.field.name(), url)),
            Requirement::Optional { default } => Ok(default.clone()),
        }
    }
}

/// Turns one article page into an [`ArticleRecord`] following a site's field
/// policy.
pub struct ArticleExtractor {
    rules: Vec<CompiledRule>,
    container: Selector,
    paragraph: Selector,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl ArticleExtractor {
    pub fn new(profile: &SiteProfile, policy: RetryPolicy, clock: Arc<dyn Clock>) -> Result<Self> {
        let rules = profile
            .fields
            .iter()
            .map(|rule| {
                Ok(CompiledRule {
                    field: rule.field,
                    selector: rule.selector.as_deref().map(dom::compile).transpose()?,
                    requirement: rule.requirement.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rules,
            container: dom::compile(&profile.content.container)?,
            paragraph: dom::compile(&profile.content.paragraph)?,
            policy,
            clock,
        })
    }

    /// Extract `entry` with retries, restarting the session after driver
    /// failures.
    pub async fn fetch(&self, sessions: &SessionManager, entry: &ListingEntry) -> RetryOutcome<ArticleRecord> {
        let label = format!("article {}", entry.link);
        retry(&self.policy, self.clock.as_ref(), &label, |_| self.fetch_attempt(sessions, entry)).await
    }

    async fn fetch_attempt(&self, sessions: &SessionManager, entry: &ListingEntry) -> Result<ArticleRecord> {
        let wait = sessions.settings().element_wait;
        let result = match sessions.session().await {
            Ok(driver) => self.extract(driver.as_ref(), wait, entry).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            match e {
                ScrapingError::Timeout(_) | ScrapingError::Extraction { kind: ExtractionKind::Timeout, .. } => {
                    error!("Timeout while scraping article {}: {}", entry.link, e)
                }
                ScrapingError::Driver(_) => error!("WebDriver error while scraping article {}: {}", entry.link, e),
                _ => error!("Error scraping article {}: {}", entry.link, e),
            }
        }
        restart_on_driver_error(sessions, result, "scraping an article").await
    }

    /// Load the article page and read every field in the policy table.
    ///
    /// Required fields are waited for and fail the article when they never
    /// appear. Optional fields fall back to their default after the same
    /// wait. The body container gets a shorter wait; if it never appears the
    /// content is `None`, not an error.
    pub async fn extract(
        &self,
        driver: &dyn PageDriver,
        wait: WaitSettings,
        entry: &ListingEntry,
    ) -> Result<ArticleRecord> {
        let url = entry.link.as_str();
        debug!("Extracting {}", url);
        driver.navigate(url).await?;

        let mut values = FieldValues::seeded(entry);

        for rule in &self.rules {
            match rule.selector.as_ref() {
                Some(selector) => {
                    let found = wait_for(self.clock.as_ref(), wait, rule.field.name(), || async move {
                        let html = driver.content().await?;
                        Ok::<_, ScrapingError>(dom::first_text_in(&html, selector))
                    })
                    .await;

                    match found {
                        Ok(text) => values.set(rule.field, text),
                        Err(ScrapingError::Timeout(_)) => {
                            if let Some(default) = rule.fallback(url, ExtractionKind::Timeout)? {
                                debug!("Field '{}' not found on {}, using default", rule.field, url);
                                values.set(rule.field, default);
                            }
                        }
                        Err(e) => return Err(e),
                    }
                }
                None => {
                    let present = values.get(rule.field).map_or(false, |v| !v.is_empty());
                    if !present {
                        if let Some(default) = rule.fallback(url, ExtractionKind::Missing)? {
                            values.set(rule.field, default);
                        }
                    }
                }
            }
        }

        let (container, paragraph) = (&self.container, &self.paragraph);
        let body_wait = WaitSettings {
            timeout: wait.timeout.min(CONTENT_WAIT),
            ..wait
        };
        let content = match wait_for(self.clock.as_ref(), body_wait, "article body", || async move {
            let html = driver.content().await?;
            Ok::<_, ScrapingError>(read_content(&html, container, paragraph))
        })
        .await
        {
            Ok(content) => Some(content),
            Err(ScrapingError::Timeout(_)) => {
                warn!("Content container not found on {}", url);
                None
            }
            Err(e) => return Err(e),
        };

        let record = ArticleRecord::build(&entry.link, values, content)?;
        info!("Successfully scraped article: {}", url);
        Ok(record)
    }
}

fn read_content(html: &str, container: &Selector, paragraph: &Selector) -> Option<String> {
    dom::Snapshot::parse(html).paragraphs_in(container, paragraph)
}
