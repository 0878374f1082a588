pub mod browser;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod sites;
pub mod storage;

pub use config::Config;
pub use error::{Result, ScrapingError};
pub use pipeline::{run, ScrapeOrchestrator, ScrapeResult};
pub use sites::SiteProfile;
