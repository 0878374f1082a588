pub mod chrome;
pub mod manager;
pub mod wait;

#[cfg(test)]
pub(crate) mod mock;
#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::Result;

pub use chrome::{ChromeLauncher, ChromeSession};
pub use manager::{SessionFactory, SessionManager, SessionSettings, SessionState};
pub use wait::{wait_for, WaitSettings};

/// Scrolls the window to the bottom of the document to trigger lazy loading.
pub const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight);";

/// Element found in the live page.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ElementRef {
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl ElementRef {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// A rendered page in a browser that can be navigated and inspected.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Load `url`, failing with a timeout if the page load budget runs out.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Serialized DOM of the page as it is rendered right now.
    async fn content(&self) -> Result<String>;

    async fn execute_script(&self, script: &str) -> Result<()>;

    async fn find_elements(&self, selector: &str) -> Result<Vec<ElementRef>>;

    /// Shut the browser down. The driver is unusable afterwards.
    async fn close(&mut self) -> Result<()>;
}
