use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::browser::manager::{SessionFactory, SessionSettings};
use crate::browser::{ElementRef, PageDriver};
use crate::error::{Result, ScrapingError};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Returns `JSON.stringify`'d `[{attributes}]` for every match of a selector.
/// `href` is the resolved property, not the raw attribute.
const FIND_ELEMENTS_SCRIPT: &str = r#"
(() => JSON.stringify(Array.from(document.querySelectorAll(__SELECTOR__)).map((el) => {
    const attributes = {};
    for (const attr of el.attributes) {
        attributes[attr.name] = attr.value;
    }
    if (typeof el.href === "string" && el.href.length > 0) {
        attributes.href = el.href;
    }
    return { attributes };
})))()
"#;

/// Launches local Chrome/Chromium sessions through the DevTools protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeLauncher;

#[async_trait]
impl SessionFactory for ChromeLauncher {
    async fn launch(&self, settings: &SessionSettings) -> Result<Box<dyn PageDriver>> {
        let session = ChromeSession::launch(settings).await?;
        Ok(Box::new(session))
    }
}

pub struct ChromeSession {
    id: Uuid,
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    page_load_timeout: Duration,
    user_data_dir: PathBuf,
}

impl ChromeSession {
    pub async fn launch(settings: &SessionSettings) -> Result<Self> {
        let id = Uuid::new_v4();

        // unique profile dir so a crashed run cannot leave a singleton lock behind
        let user_data_dir = std::env::temp_dir().join(format!("news-scraper-{}-{}", std::process::id(), id));
        std::fs::create_dir_all(&user_data_dir)
            .map_err(|e| ScrapingError::SessionInit(format!("Failed to create profile directory: {}", e)))?;

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(settings.page_load_timeout)
            .args(vec![
                format!("--user-data-dir={}", user_data_dir.display()),
                "--disable-gpu".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--disable-extensions".to_string(),
                "--disable-application-cache".to_string(),
                "--no-first-run".to_string(),
                "--mute-audio".to_string(),
                "--log-level=3".to_string(), // only fatal errors
            ]);

        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(ref executable) = settings.chrome_executable {
            builder = builder.chrome_executable(executable);
        }

        let browser_config = builder
            .build()
            .map_err(|e| ScrapingError::SessionInit(format!("Failed to create browser config: {}", e)))?;

        info!("Launching browser (headless: {})", settings.headless);
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScrapingError::SessionInit(format!("Failed to launch browser: {}", e)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    // deserialization noise from unknown CDP events is expected
                    let error_msg = e.to_string();
                    if error_msg.contains("data did not match any variant") {
                        debug!("Ignoring WebSocket deserialization error: {}", e);
                    } else {
                        warn!("Browser handler error: {}", e);
                    }
                }
            }
            debug!("Browser handler task ended");
        });

        let page = match tokio::time::timeout(settings.page_load_timeout, browser.new_page("about:blank")).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                handler_task.abort();
                return Err(ScrapingError::SessionInit(format!("Failed to create new page: {}", e)));
            }
            Err(_) => {
                handler_task.abort();
                return Err(ScrapingError::SessionInit("Timeout creating new page".to_string()));
            }
        };

        info!("Created browser session {}", id);
        Ok(Self {
            id,
            browser,
            page,
            handler_task,
            page_load_timeout: settings.page_load_timeout,
            user_data_dir,
        })
    }

    fn classify_navigation_error(url: &str, err: CdpError) -> ScrapingError {
        let message = err.to_string();
        match err {
            CdpError::Timeout => ScrapingError::Timeout(format!("Page load of {} timed out", url)),
            _ if message.contains("net::ERR") => {
                ScrapingError::Navigation(format!("Failed to navigate to {}: {}", url, message))
            }
            _ => ScrapingError::Driver(format!("Failed to navigate to {}: {}", url, message)),
        }
    }
}

#[async_trait]
impl PageDriver for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        debug!("Session {} navigating to {}", self.id, url);
        match tokio::time::timeout(self.page_load_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(Self::classify_navigation_error(url, e)),
            Err(_) => Err(ScrapingError::Timeout(format!(
                "Page load of {} exceeded {:?}",
                url, self.page_load_timeout
            ))),
        }
    }

    async fn content(&self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| ScrapingError::Driver(format!("Failed to get page content: {}", e)))
    }

    async fn execute_script(&self, script: &str) -> Result<()> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| ScrapingError::Driver(format!("Failed to execute script: {}", e)))?;
        Ok(())
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<ElementRef>> {
        let selector_literal = serde_json::to_string(selector)
            .map_err(|e| ScrapingError::Parse(format!("Invalid selector '{}': {}", selector, e)))?;
        let expression = FIND_ELEMENTS_SCRIPT.replace("__SELECTOR__", &selector_literal);

        let payload: String = self
            .page
            .evaluate_expression(expression)
            .await
            .map_err(|e| ScrapingError::Driver(format!("Failed to query '{}': {}", selector, e)))?
            .into_value()
            .map_err(|e| ScrapingError::Driver(format!("Unexpected result querying '{}': {}", selector, e)))?;

        serde_json::from_str(&payload)
            .map_err(|e| ScrapingError::Driver(format!("Malformed element list for '{}': {}", selector, e)))
    }

    async fn close(&mut self) -> Result<()> {
        let closed = tokio::time::timeout(CLOSE_TIMEOUT, self.browser.close()).await;
        self.handler_task.abort();
        if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
            debug!("Could not remove profile directory {}: {}", self.user_data_dir.display(), e);
        }

        match closed {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ScrapingError::Driver(format!("Failed to close browser: {}", e))),
            Err(_) => Err(ScrapingError::Driver("Timed out closing browser".to_string())),
        }
    }
}
