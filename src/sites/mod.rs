//! Site profiles: the selector set, collection strategy and field policy of
//! each supported news site.
//!
//! Both built-in sites share one pipeline. What differs is declared here:
//!
//! * `setopati` scrolls an infinite listing to gather raw links, then visits
//!   every article and reads all metadata from the article page.
//! * `ekantipur` reads title, link and teaser straight from the listing
//!   markup and only visits articles for the body text.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Result, ScrapingError};
use crate::parser::dom;
use crate::parser::Field;
use crate::storage::OutputFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMode {
    /// Scroll the listing, collect raw URLs, then extract every article.
    Scroll,
    /// Read entries from listing markup, then fetch each body.
    Listing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requirement {
    Required,
    Optional {
        #[serde(default)]
        default: Option<String>,
    },
}

/// One row of the field policy table.
///
/// A rule without a selector takes its value from the listing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub field: Field,
    #[serde(default)]
    pub selector: Option<String>,
    pub requirement: Requirement,
}

impl FieldRule {
    pub fn required(field: Field, selector: &str) -> Self {
        Self {
            field,
            selector: Some(selector.to_string()),
            requirement: Requirement::Required,
        }
    }

    pub fn optional(field: Field, selector: &str, default: Option<&str>) -> Self {
        Self {
            field,
            selector: Some(selector.to_string()),
            requirement: Requirement::Optional {
                default: default.map(str::to_string),
            },
        }
    }

    pub fn from_listing(field: Field, requirement: Requirement) -> Self {
        Self {
            field,
            selector: None,
            requirement,
        }
    }

    pub fn is_required(&self) -> bool {
        self.requirement == Requirement::Required
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingSelectors {
    /// One teaser block on the listing page.
    pub item: String,
    /// Anchor inside the block carrying the title text and href.
    pub anchor: String,
    pub teaser: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSelectors {
    pub container: String,
    pub paragraph: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteProfile {
    pub name: String,
    /// Links outside this host (and its subdomains) are discarded.
    pub domain: String,
    pub base_url: String,
    pub listing_url: String,
    pub mode: CollectionMode,
    pub output_format: OutputFormat,
    pub output_prefix: String,
    /// Anchors gathered while scrolling.
    #[serde(default)]
    pub link_selector: Option<String>,
    #[serde(default)]
    pub listing: Option<ListingSelectors>,
    pub content: ContentSelectors,
    pub fields: Vec<FieldRule>,
}

impl SiteProfile {
    pub const BUILTIN_NAMES: [&'static str; 2] = ["setopati", "ekantipur"];

    pub fn builtin(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "setopati" => Some(Self::setopati()),
            "ekantipur" => Some(Self::ekantipur()),
            _ => None,
        }
    }

    pub fn setopati() -> Self {
        Self {
            name: "setopati".to_string(),
            domain: "setopati.com".to_string(),
            base_url: "https://www.setopati.com".to_string(),
            listing_url: "https://www.setopati.com".to_string(),
            mode: CollectionMode::Scroll,
            output_format: OutputFormat::Csv,
            output_prefix: "setopati_articles".to_string(),
            link_selector: Some("a.title".to_string()),
            listing: None,
            content: ContentSelectors {
                container: ".news-content".to_string(),
                paragraph: "p".to_string(),
            },
            fields: vec![
                FieldRule::required(Field::Title, "h1.news-big-title"),
                FieldRule::required(Field::PublishedAt, "span.news-time"),
                FieldRule::required(Field::Category, "div.breadcrumb"),
                FieldRule::optional(Field::Author, "div.author-name", Some(crate::parser::UNKNOWN_AUTHOR)),
            ],
        }
    }

    pub fn ekantipur() -> Self {
        Self {
            name: "ekantipur".to_string(),
            domain: "ekantipur.com".to_string(),
            base_url: "https://ekantipur.com".to_string(),
            listing_url: "https://ekantipur.com/news".to_string(),
            mode: CollectionMode::Listing,
            output_format: OutputFormat::Json,
            output_prefix: "articles".to_string(),
            link_selector: None,
            listing: Some(ListingSelectors {
                item: "div.teaser.offset".to_string(),
                anchor: "a".to_string(),
                teaser: "p".to_string(),
            }),
            content: ContentSelectors {
                container: "div.description.current-news-block.portrait".to_string(),
                paragraph: "p".to_string(),
            },
            fields: vec![
                FieldRule::from_listing(Field::Title, Requirement::Required),
                FieldRule::from_listing(Field::Teaser, Requirement::Optional { default: None }),
            ],
        }
    }

    pub fn rule(&self, field: Field) -> Option<&FieldRule> {
        self.fields.iter().find(|rule| rule.field == field)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ScrapingError::Config("Profile name cannot be empty".to_string()));
        }
        if self.domain.trim().is_empty() || self.domain.contains('/') {
            return Err(ScrapingError::Config(format!(
                "Profile '{}' has invalid domain '{}', expected a bare host like 'example.com'",
                self.name, self.domain
            )));
        }
        if self.output_prefix.trim().is_empty() {
            return Err(ScrapingError::Config(format!(
                "Profile '{}' output_prefix cannot be empty",
                self.name
            )));
        }

        match self.mode {
            CollectionMode::Scroll => {
                let selector = self.link_selector.as_deref().ok_or_else(|| {
                    ScrapingError::Config(format!(
                        "Profile '{}' uses scroll mode but has no link_selector",
                        self.name
                    ))
                })?;
                dom::compile(selector)?;
            }
            CollectionMode::Listing => {
                let listing = self.listing.as_ref().ok_or_else(|| {
                    ScrapingError::Config(format!(
                        "Profile '{}' uses listing mode but has no listing selectors",
                        self.name
                    ))
                })?;
                dom::compile(&listing.item)?;
                dom::compile(&listing.anchor)?;
                dom::compile(&listing.teaser)?;
            }
        }

        dom::compile(&self.content.container)?;
        dom::compile(&self.content.paragraph)?;

        let mut seen = HashSet::new();
        for rule in &self.fields {
            if !seen.insert(rule.field) {
                return Err(ScrapingError::Config(format!(
                    "Profile '{}' lists field '{}' more than once",
                    self.name, rule.field
                )));
            }
            match &rule.selector {
                Some(selector) => {
                    dom::compile(selector)?;
                }
                None => {
                    // scroll mode has no listing entry to read from
                    let listing_sourced = matches!(rule.field, Field::Title | Field::Teaser);
                    if self.mode == CollectionMode::Scroll || !listing_sourced {
                        return Err(ScrapingError::Config(format!(
                            "Profile '{}' field '{}' needs a selector",
                            self.name, rule.field
                        )));
                    }
                }
            }
        }

        match self.rule(Field::Title) {
            Some(rule) if rule.is_required() => Ok(()),
            _ => Err(ScrapingError::Config(format!(
                "Profile '{}' must declare title as a required field",
                self.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles_are_valid() {
        for name in SiteProfile::BUILTIN_NAMES {
            let profile = SiteProfile::builtin(name).unwrap();
            assert!(profile.validate().is_ok(), "profile {} should validate", name);
        }
        assert!(SiteProfile::builtin("unknown").is_none());
    }

    #[test]
    fn test_setopati_policy_table() {
        let profile = SiteProfile::setopati();
        assert_eq!(profile.mode, CollectionMode::Scroll);
        assert!(profile.rule(Field::Title).unwrap().is_required());
        assert!(profile.rule(Field::PublishedAt).unwrap().is_required());
        assert!(profile.rule(Field::Category).unwrap().is_required());
        assert_eq!(
            profile.rule(Field::Author).unwrap().requirement,
            Requirement::Optional {
                default: Some("Unknown".to_string())
            }
        );
    }

    #[test]
    fn test_scroll_profile_requires_link_selector() {
        let mut profile = SiteProfile::setopati();
        profile.link_selector = None;
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_title_must_be_required() {
        let mut profile = SiteProfile::ekantipur();
        profile.fields[0].requirement = Requirement::Optional { default: None };
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_listing_fields_only_in_listing_mode() {
        let mut profile = SiteProfile::setopati();
        profile.fields[0].selector = None;
        assert!(profile.validate().is_err());

        let mut profile = SiteProfile::ekantipur();
        profile.fields.push(FieldRule::from_listing(Field::Category, Requirement::Required));
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_profile_roundtrips_through_toml() {
        let profile = SiteProfile::setopati();
        let text = toml::to_string(&profile).unwrap();
        let parsed: SiteProfile = toml::from_str(&text).unwrap();
        assert_eq!(parsed, profile);
    }
}
