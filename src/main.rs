use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use news_article_scraper::config::{ConfigManager, FileConfigManager};
use news_article_scraper::{logging, Config};

#[derive(Parser, Debug)]
#[command(name = "news-article-scraper", about = "Scrape news articles with a headless browser")]
struct Cli {
    /// Configuration file, created with defaults if missing
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    #[arg(long)]
    max_articles: Option<usize>,

    /// Built-in site profile: setopati or ekantipur
    #[arg(long)]
    profile: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if self.headed {
            config.browser.headless = false;
        }
        if let Some(max_articles) = self.max_articles {
            config.limits.max_articles = max_articles;
        }
        if let Some(ref profile) = self.profile {
            config.site.profile = profile.clone();
            config.site.custom = None;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_manager = FileConfigManager::new(cli.config.clone());
    let mut config = match config_manager.load_config().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    cli.apply(&mut config);
    if let Err(e) = config_manager.validate_config(&config) {
        eprintln!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    match logging::init(&config.logging) {
        Ok(path) => tracing::info!("Logging to {}", path.display()),
        Err(e) => {
            eprintln!("Failed to set up logging: {}", e);
            return ExitCode::FAILURE;
        }
    }

    match news_article_scraper::run(&config).await {
        Ok(result) => {
            println!("Scraped {} articles", result.success_count());
            if let Some(path) = result.output_path() {
                println!("Saved to {}", path.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Scrape failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
