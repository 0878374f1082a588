//! In-memory browser used by tests: serves canned HTML, counts calls and can
//! inject driver faults.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use url::Url;

use crate::browser::manager::{SessionFactory, SessionSettings};
use crate::browser::{ElementRef, PageDriver, SCROLL_TO_BOTTOM};
use crate::error::{Result, ScrapingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Driver,
    Navigation,
    Timeout,
}

impl Fault {
    fn into_error(self, url: &str) -> ScrapingError {
        match self {
            Fault::Driver => ScrapingError::Driver(format!("chrome not reachable while loading {}", url)),
            Fault::Navigation => ScrapingError::Navigation(format!("net::ERR_CONNECTION_RESET at {}", url)),
            Fault::Timeout => ScrapingError::Timeout(format!("page load of {} timed out", url)),
        }
    }
}

#[derive(Default)]
struct FakeState {
    // each navigation starts at stage 0; every scroll reveals the next stage
    pages: HashMap<String, Vec<String>>,
    stage: usize,
    current: Option<String>,
    faults: HashMap<String, VecDeque<Fault>>,
    navigations: Vec<String>,
    scrolls: usize,
    closes: usize,
    launches: usize,
    launch_failures: usize,
}

#[derive(Clone, Default)]
pub struct FakeBrowser {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_page(self, url: &str, html: impl Into<String>) -> Self {
        self.state().pages.insert(url.to_string(), vec![html.into()]);
        self
    }

    pub fn with_scroll_stages(self, url: &str, stages: Vec<String>) -> Self {
        self.state().pages.insert(url.to_string(), stages);
        self
    }

    /// Faults are consumed one per navigation to `url`, in order.
    pub fn with_faults(self, url: &str, faults: Vec<Fault>) -> Self {
        self.state().faults.insert(url.to_string(), faults.into());
        self
    }

    pub fn failing_launches(self, count: usize) -> Self {
        self.state().launch_failures = count;
        self
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state().navigations.clone()
    }

    pub fn navigations_to(&self, url: &str) -> usize {
        self.state().navigations.iter().filter(|u| u.as_str() == url).count()
    }

    pub fn scrolls(&self) -> usize {
        self.state().scrolls
    }

    pub fn closes(&self) -> usize {
        self.state().closes
    }

    pub fn launches(&self) -> usize {
        self.state().launches
    }

    pub fn factory(&self) -> Arc<dyn SessionFactory> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl SessionFactory for FakeBrowser {
    async fn launch(&self, _settings: &SessionSettings) -> Result<Box<dyn PageDriver>> {
        let mut state = self.state();
        state.launches += 1;
        if state.launches <= state.launch_failures {
            return Err(ScrapingError::Driver("chrome executable not found".to_string()));
        }
        Ok(Box::new(FakeDriver {
            browser: self.clone(),
        }))
    }
}

struct FakeDriver {
    browser: FakeBrowser,
}

impl FakeDriver {
    fn current_html(state: &FakeState) -> String {
        state
            .current
            .as_ref()
            .and_then(|url| state.pages.get(url))
            .and_then(|stages| stages.get(state.stage.min(stages.len().saturating_sub(1))))
            .cloned()
            .unwrap_or_else(|| "<html><body></body></html>".to_string())
    }
}

fn select_elements(html: &str, selector: &str, base: Option<&str>) -> Result<Vec<ElementRef>> {
    let selector = Selector::parse(selector)
        .map_err(|e| ScrapingError::Parse(format!("Invalid selector '{}': {}", selector, e)))?;
    let base = base.and_then(|b| Url::parse(b).ok());
    let document = Html::parse_document(html);

    Ok(document
        .select(&selector)
        .map(|element| {
            let mut attributes: HashMap<String, String> = element
                .value()
                .attrs()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect();
            // mirror the browser's resolved `href` property
            if let (Some(href), Some(base)) = (attributes.get("href"), base.as_ref()) {
                if let Ok(resolved) = base.join(href) {
                    attributes.insert("href".to_string(), resolved.to_string());
                }
            }
            ElementRef { attributes }
        })
        .collect())
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.browser.state();
        state.navigations.push(url.to_string());

        if let Some(fault) = state.faults.get_mut(url).and_then(|queue| queue.pop_front()) {
            return Err(fault.into_error(url));
        }

        state.current = Some(url.to_string());
        state.stage = 0;
        Ok(())
    }

    async fn content(&self) -> Result<String> {
        Ok(Self::current_html(&self.browser.state()))
    }

    async fn execute_script(&self, script: &str) -> Result<()> {
        let mut state = self.browser.state();
        if script == SCROLL_TO_BOTTOM {
            state.scrolls += 1;
            state.stage += 1;
        }
        Ok(())
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<ElementRef>> {
        let (html, current) = {
            let state = self.browser.state();
            (Self::current_html(&state), state.current.clone())
        };
        select_elements(&html, selector, current.as_deref())
    }

    async fn close(&mut self) -> Result<()> {
        self.browser.state().closes += 1;
        Ok(())
    }
}

/// Listing page whose anchors use `class="title"`.
pub fn listing_html(hrefs: &[&str]) -> String {
    let anchors: String = hrefs
        .iter()
        .map(|href| format!(r#"<div class="item"><a class="title" href="{}">Story</a></div>"#, href))
        .collect();
    format!("<html><body>{}</body></html>", anchors)
}

/// Article page in the setopati layout. `None` leaves the element out.
pub fn article_html(
    title: Option<&str>,
    date: Option<&str>,
    category: Option<&str>,
    author: Option<&str>,
    paragraphs: Option<&[&str]>,
) -> String {
    let mut body = String::new();
    if let Some(category) = category {
        body.push_str(&format!(r#"<div class="breadcrumb">{}</div>"#, category));
    }
    if let Some(title) = title {
        body.push_str(&format!(r#"<h1 class="news-big-title">{}</h1>"#, title));
    }
    if let Some(date) = date {
        body.push_str(&format!(r#"<span class="news-time">{}</span>"#, date));
    }
    if let Some(author) = author {
        body.push_str(&format!(r#"<div class="author-name">{}</div>"#, author));
    }
    if let Some(paragraphs) = paragraphs {
        let ps: String = paragraphs.iter().map(|p| format!("<p>{}</p>", p)).collect();
        body.push_str(&format!(r#"<div class="news-content">{}</div>"#, ps));
    }
    format!("<html><body>{}</body></html>", body)
}
