use scraper::{ElementRef, Html, Selector};

use crate::error::{Result, ScrapingError};

/// Compile a CSS selector, reporting the offending text on failure.
pub fn compile(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| ScrapingError::Parse(format!("Invalid selector '{}': {}", selector, e)))
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether anything in `html` matches `selector`.
pub fn contains_match(html: &str, selector: &Selector) -> bool {
    Snapshot::parse(html).contains(selector)
}

/// Normalized text of the first `selector` match in `html`.
pub fn first_text_in(html: &str, selector: &Selector) -> Option<String> {
    Snapshot::parse(html).first_text(selector)
}

/// Parsed point-in-time copy of a rendered page.
///
/// `Html` is not `Send`, so a snapshot is built, queried and dropped without
/// crossing an await point.
pub struct Snapshot {
    document: Html,
}

impl Snapshot {
    pub fn parse(html: &str) -> Self {
        Self {
            document: Html::parse_document(html),
        }
    }

    pub fn select<'a>(&'a self, selector: &Selector, limit: Option<usize>) -> Vec<Node<'a>> {
        self.document
            .select(selector)
            .take(limit.unwrap_or(usize::MAX))
            .map(|element| Node { element })
            .collect()
    }

    pub fn contains(&self, selector: &Selector) -> bool {
        self.document.select(selector).next().is_some()
    }

    /// Text of the first match, if anything matches at all.
    pub fn first_text(&self, selector: &Selector) -> Option<String> {
        self.document
            .select(selector)
            .next()
            .map(|element| Node { element }.text())
    }

    /// Paragraph text inside the first `container` match joined by spaces.
    ///
    /// Each paragraph is trimmed but keeps its inner spacing. `None` means the container itself is absent; a container without
    /// paragraphs gives an empty string.
    pub fn paragraphs_in(&self, container: &Selector, paragraph: &Selector) -> Option<String> {
        let container = self.document.select(container).next()?;
        let parts: Vec<String> = container
            .select(paragraph)
            .map(|p| Node { element: p }.trimmed_text())
            .filter(|text| !text.is_empty())
            .collect();
        Some(parts.join(" "))
    }
}

/// One element selected from a snapshot.
#[derive(Clone, Copy)]
pub struct Node<'a> {
    element: ElementRef<'a>,
}

impl<'a> Node<'a> {
    pub fn text(&self) -> String {
        normalize_whitespace(&self.element.text().collect::<String>())
    }

    /// Raw text with only the ends trimmed.
    pub fn trimmed_text(&self) -> String {
        self.element.text().collect::<String>().trim().to_string()
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.element.value().attr(name)
    }

    pub fn select_first(&self, selector: &Selector) -> Option<Node<'a>> {
        self.element
            .select(selector)
            .next()
            .map(|element| Node { element })
    }
}
