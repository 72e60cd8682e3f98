//! Work items handed between stages.
//!
//! Each stage consumes its input by value and produces a brand new value for
//! the next stage, so ownership moves along with the item.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A payload that can travel through a stage.
///
/// The identifier tags any [`StageError`](crate::errors::StageError) raised
/// for the item, so it must be stable across stages.
pub trait WorkItem: Send + 'static {
    /// Returns the identifier of the source this item descends from.
    fn id(&self) -> &str;
}

/// A source descriptor read from the source list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source {
    /// The identifier or URL of the document.
    pub id: String,
}

impl Source {
    /// Creates a new source.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl WorkItem for Source {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Raw content produced by the fetch stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPage {
    /// Identifier of the originating source.
    pub source_id: String,
    /// Final URL after redirects.
    pub url: String,
    /// HTTP status code.
    pub status_code: u16,
    /// Response body.
    pub body: String,
}

impl RawPage {
    /// Creates a raw page for a source.
    #[must_use]
    pub fn new(source: &Source, url: impl Into<String>, status_code: u16, body: impl Into<String>) -> Self {
        Self {
            source_id: source.id.clone(),
            url: url.into(),
            status_code,
            body: body.into(),
        }
    }
}

impl WorkItem for RawPage {
    fn id(&self) -> &str {
        &self.source_id
    }
}

/// One post of a discussion thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Display name of the author.
    pub author: String,
    /// Text content.
    pub content: String,
    /// Unix timestamp in seconds, if the page carried one.
    pub time: Option<i64>,
}

/// Structured content produced by the parse stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier of the originating source.
    pub source_id: String,
    /// Page URL.
    pub url: String,
    /// Document title.
    pub title: String,
    /// Posts in page order.
    #[serde(default)]
    pub posts: Vec<Post>,
}

impl WorkItem for Document {
    fn id(&self) -> &str {
        &self.source_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_follow_the_source() {
        let source = Source::new("https://example.com/p/42");
        let page = RawPage::new(&source, "https://example.com/p/42?pn=1", 200, "<html/>");

        assert_eq!(source.id(), "https://example.com/p/42");
        assert_eq!(page.id(), source.id());

        let doc = Document {
            source_id: page.source_id.clone(),
            url: page.url.clone(),
            title: "t".into(),
            posts: Vec::new(),
        };
        assert_eq!(doc.id(), source.id());
    }

    #[test]
    fn test_source_display() {
        assert_eq!(Source::new("B").to_string(), "B");
    }
}
