use scraper::Selector;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{wait_for, PageDriver, SessionManager, SCROLL_TO_BOTTOM};
use crate::clock::Clock;
use crate::error::{Result, ScrapingError};
use crate::parser::dom::{self, Node, Snapshot};
use crate::parser::{ArticleLink, ListingEntry};
use crate::pipeline::restart_on_driver_error;
use crate::pipeline::retry::{retry, RetryPolicy};
use crate::sites::SiteProfile;

struct ListingSelectors {
    item: Selector,
    anchor: Selector,
    teaser: Selector,
}

/// Discovers article links on a site's listing page.
pub struct LinkCollector {
    domain: String,
    base_url: Url,
    link_selector: Option<String>,
    listing: Option<ListingSelectors>,
    policy: RetryPolicy,
    scroll_delay: Duration,
    clock: Arc<dyn Clock>,
}

impl LinkCollector {
    pub fn new(
        profile: &SiteProfile,
        base_url: Url,
        policy: RetryPolicy,
        scroll_delay: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let listing = match profile.listing {
            Some(ref listing) => Some(ListingSelectors {
                item: dom::compile(&listing.item)?,
                anchor: dom::compile(&listing.anchor)?,
                teaser: dom::compile(&listing.teaser)?,
            }),
            None => None,
        };

        Ok(Self {
            domain: profile.domain.clone(),
            base_url,
            link_selector: profile.link_selector.clone(),
            listing,
            policy,
            scroll_delay,
            clock,
        })
    }

    /// Scroll `listing_url` up to `max_scrolls` times and return at most
    /// `max_links` unique on-site links in discovery order.
    pub async fn collect(
        &self,
        sessions: &SessionManager,
        listing_url: &str,
        max_scrolls: u32,
        max_links: usize,
    ) -> Result<Vec<ArticleLink>> {
        if max_scrolls == 0 || max_links == 0 {
            info!("Scroll budget is zero, no links collected");
            return Ok(Vec::new());
        }
        let selector = self
            .link_selector
            .as_deref()
            .ok_or_else(|| ScrapingError::Config("Scroll collection needs a link selector".to_string()))?;

        let links = retry(&self.policy, self.clock.as_ref(), "link collection", |_| {
            self.collect_attempt(sessions, listing_url, selector, max_scrolls, max_links)
        })
        .await
        .into_result()?;

        info!("Collected {} article links", links.len());
        Ok(links)
    }

    /// Read up to `max_items` entries (link, title, teaser) from listing markup.
    pub async fn collect_listing(
        &self,
        sessions: &SessionManager,
        listing_url: &str,
        max_items: usize,
    ) -> Result<Vec<ListingEntry>> {
        if max_items == 0 {
            return Ok(Vec::new());
        }
        let listing = self
            .listing
            .as_ref()
            .ok_or_else(|| ScrapingError::Config("Listing collection needs listing selectors".to_string()))?;

        let entries = retry(&self.policy, self.clock.as_ref(), "listing collection", |_| {
            self.listing_attempt(sessions, listing, listing_url, max_items)
        })
        .await
        .into_result()?;

        info!("Collected {} listing entries", entries.len());
        Ok(entries)
    }

    async fn collect_attempt(
        &self,
        sessions: &SessionManager,
        listing_url: &str,
        selector: &str,
        max_scrolls: u32,
        max_links: usize,
    ) -> Result<Vec<ArticleLink>> {
        let result = self
            .scroll_listing(sessions, listing_url, selector, max_scrolls, max_links)
            .await;
        restart_on_driver_error(sessions, result, "collecting links").await
    }

    async fn scroll_listing(
        &self,
        sessions: &SessionManager,
        listing_url: &str,
        selector: &str,
        max_scrolls: u32,
        max_links: usize,
    ) -> Result<Vec<ArticleLink>> {
        let driver = sessions.session().await?;
        let page: &dyn PageDriver = driver.as_ref();
        let wait = sessions.settings().element_wait;
        let clock = self.clock.as_ref();

        page.navigate(listing_url).await?;

        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for scroll in 1..=max_scrolls {
            page.execute_script(SCROLL_TO_BOTTOM).await?;

            let known = links.len();
            let grown = wait_for(clock, wait, "new article links", || async move {
                let elements = page.find_elements(selector).await?;
                Ok::<_, ScrapingError>((elements.len() > known).then_some(elements))
            })
            .await;

            let elements = match grown {
                Ok(elements) => elements,
                Err(ScrapingError::Timeout(_)) => {
                    warn!("Timeout during scroll {}, continuing...", scroll);
                    continue;
                }
                Err(e) => return Err(e),
            };

            for href in elements.iter().filter_map(|element| element.attr("href")) {
                match ArticleLink::parse(href, &self.base_url) {
                    Ok(link) if link.matches_domain(&self.domain) => {
                        if seen.insert(link.clone()) {
                            links.push(link);
                        }
                    }
                    Ok(link) => debug!("Skipping off-site link {}", link),
                    Err(e) => debug!("Skipping unusable href '{}': {}", href, e),
                }
            }
            debug!("Scroll {}: {} links collected", scroll, links.len());

            if links.len() >= max_links {
                break;
            }
            clock.sleep(self.scroll_delay).await;
        }

        links.truncate(max_links);
        Ok(links)
    }

    async fn listing_attempt(
        &self,
        sessions: &SessionManager,
        listing: &ListingSelectors,
        listing_url: &str,
        max_items: usize,
    ) -> Result<Vec<ListingEntry>> {
        let result = self.read_listing(sessions, listing, listing_url, max_items).await;
        restart_on_driver_error(sessions, result, "reading listing").await
    }

    async fn read_listing(
        &self,
        sessions: &SessionManager,
        listing: &ListingSelectors,
        listing_url: &str,
        max_items: usize,
    ) -> Result<Vec<ListingEntry>> {
        let driver = sessions.session().await?;
        let page: &dyn PageDriver = driver.as_ref();
        let item = &listing.item;

        page.navigate(listing_url).await?;

        let found = wait_for(
            self.clock.as_ref(),
            sessions.settings().element_wait,
            "listing items",
            || async move {
                let html = page.content().await?;
                Ok::<_, ScrapingError>(dom::contains_match(&html, item).then_some(html))
            },
        )
        .await;

        match found {
            Ok(html) => Ok(self.parse_listing(&html, listing, max_items)),
            Err(ScrapingError::Timeout(_)) => {
                warn!("No listing items found on {}", listing_url);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    fn parse_listing(&self, html: &str, listing: &ListingSelectors, max_items: usize) -> Vec<ListingEntry> {
        let snapshot = Snapshot::parse(html);
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for (index, item) in snapshot.select(&listing.item, None).into_iter().enumerate() {
            if entries.len() >= max_items {
                break;
            }
            match self.parse_listing_item(&item, listing) {
                Ok(entry) => {
                    if seen.insert(entry.link.clone()) {
                        entries.push(entry);
                    }
                }
                Err(e) => warn!("Error reading listing item {}: {}", index + 1, e),
            }
        }

        entries
    }

    fn parse_listing_item(&self, item: &Node<'_>, listing: &ListingSelectors) -> Result<ListingEntry> {
        let anchor = item
            .select_first(&listing.anchor)
            .ok_or_else(|| ScrapingError::Parse("Listing item has no anchor".to_string()))?;
        let href = anchor
            .attr("href")
            .ok_or_else(|| ScrapingError::Parse("Listing anchor has no href".to_string()))?;

        let link = ArticleLink::parse(href, &self.base_url)?;
        if !link.matches_domain(&self.domain) {
            return Err(ScrapingError::Parse(format!("Off-site link {}", link)));
        }

        let title = Some(anchor.text()).filter(|t| !t.is_empty());
        let teaser = item
            .select_first(&listing.teaser)
            .map(|node| node.text())
            .filter(|t| !t.is_empty());

        Ok(ListingEntry { link, title, teaser })
    }
}
