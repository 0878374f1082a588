use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::{ExtractionKind, Result, ScrapingError};

/// Author recorded when the page does not name one.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// Absolute article URL, normalized so that equal links compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ArticleLink(Url);

impl ArticleLink {
    /// Resolve `raw` against `base` and normalize it.
    ///
    /// Absolute hrefs ignore the base. Only http(s) links are accepted and the
    /// fragment is dropped, so `/a#top` and `/a` are the same article.
    pub fn parse(raw: &str, base: &Url) -> Result<Self> {
        let mut url = base.join(raw.trim())?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ScrapingError::Parse(format!(
                "Unsupported link scheme '{}' in {}",
                url.scheme(),
                raw
            )));
        }
        if url.host_str().is_none() {
            return Err(ScrapingError::Parse(format!("Link has no host: {}", raw)));
        }
        url.set_fragment(None);
        Ok(Self(url))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }

    /// True when the host is `domain` itself or one of its subdomains.
    pub fn matches_domain(&self, domain: &str) -> bool {
        let host = self.host().to_ascii_lowercase();
        let domain = domain.trim().trim_start_matches('.').to_ascii_lowercase();
        if domain.is_empty() {
            return false;
        }
        host == domain || host.ends_with(&format!(".{}", domain))
    }
}

impl fmt::Display for ArticleLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovered article plus whatever the listing page said about it.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingEntry {
    pub link: ArticleLink,
    pub title: Option<String>,
    pub teaser: Option<String>,
}

impl From<ArticleLink> for ListingEntry {
    fn from(link: ArticleLink) -> Self {
        Self {
            link,
            title: None,
            teaser: None,
        }
    }
}

/// Article attributes that can appear in a field policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Teaser,
    PublishedAt,
    Category,
    Author,
}

impl Field {
    pub fn name(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Teaser => "teaser",
            Field::PublishedAt => "published_at",
            Field::Category => "category",
            Field::Author => "author",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Field values gathered while an extraction is in progress.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FieldValues {
    title: Option<String>,
    teaser: Option<String>,
    published_at: Option<String>,
    category: Option<String>,
    author: Option<String>,
}

impl FieldValues {
    /// Start from what the listing page already told us.
    pub fn seeded(entry: &ListingEntry) -> Self {
        Self {
            title: entry.title.clone(),
            teaser: entry.teaser.clone(),
            ..Self::default()
        }
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::Title => self.title.as_deref(),
            Field::Teaser => self.teaser.as_deref(),
            Field::PublishedAt => self.published_at.as_deref(),
            Field::Category => self.category.as_deref(),
            Field::Author => self.author.as_deref(),
        }
    }

    pub fn set(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Teaser => &mut self.teaser,
            Field::PublishedAt => &mut self.published_at,
            Field::Category => &mut self.category,
            Field::Author => &mut self.author,
        };
        *slot = Some(value);
    }
}

/// One successfully extracted article. Fields are read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleRecord {
    url: String,
    title: String,
    teaser: Option<String>,
    published_at: Option<String>,
    content: Option<String>,
    category: Option<String>,
    author: String,
}

impl ArticleRecord {
    /// Assemble a record. The title is the one field no article can lack.
    pub fn build(link: &ArticleLink, values: FieldValues, content: Option<String>) -> Result<Self> {
        let title = values.title.ok_or_else(|| {
            ScrapingError::extraction(ExtractionKind::Missing, Field::Title.name(), link.as_str())
        })?;

        Ok(Self {
            url: link.as_str().to_string(),
            title,
            teaser: values.teaser,
            published_at: values.published_at,
            content,
            category: values.category,
            author: values.author.unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn teaser(&self) -> Option<&str> {
        self.teaser.as_deref()
    }

    pub fn published_at(&self) -> Option<&str> {
        self.published_at.as_deref()
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn author(&self) -> &str {
        &self.author
    }
}
