//! Parse stage: raw page in, structured document out.
//!
//! Extraction is CSS-selector driven so the same stage can handle any forum
//! layout. It is pure CPU work; no I/O happens here.

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use super::Stage;
use crate::cancellation::CancellationObserver;
use crate::core::{Document, Post, RawPage};
use crate::errors::{DocflowError, ItemError};
use crate::utils::parse_timestamp;

/// Selectors used to pull a document out of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseConfig {
    /// Title selectors, tried in order; the first non-empty match wins.
    #[serde(default = "default_title_selectors")]
    pub title_selectors: Vec<String>,
    /// Selector for each post container.
    #[serde(default = "default_post_selector")]
    pub post_selector: String,
    /// Selector for the author, relative to a post.
    #[serde(default = "default_author_selector")]
    pub author_selector: String,
    /// Selector for the post body, relative to a post.
    #[serde(default = "default_content_selector")]
    pub content_selector: String,
    /// Selector for the post time, relative to a post.
    #[serde(default = "default_time_selector")]
    pub time_selector: String,
    /// Attribute holding the time; the element text is used when absent.
    #[serde(default = "default_time_attribute")]
    pub time_attribute: Option<String>,
    /// Whether a page without posts is an error.
    #[serde(default = "default_require_posts")]
    pub require_posts: bool,
}

fn default_title_selectors() -> Vec<String> {
    vec!["h1".to_string(), "title".to_string()]
}

fn default_post_selector() -> String {
    ".post".to_string()
}

fn default_author_selector() -> String {
    ".author".to_string()
}

fn default_content_selector() -> String {
    ".content".to_string()
}

fn default_time_selector() -> String {
    "time".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_time_attribute() -> Option<String> {
    Some("datetime".to_string())
}

fn default_require_posts() -> bool {
    true
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            title_selectors: default_title_selectors(),
            post_selector: default_post_selector(),
            author_selector: default_author_selector(),
            content_selector: default_content_selector(),
            time_selector: default_time_selector(),
            time_attribute: default_time_attribute(),
            require_posts: default_require_posts(),
        }
    }
}

impl ParseConfig {
    /// Creates a parse configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the post selectors.
    #[must_use]
    pub fn with_post_selectors(
        mut self,
        post: impl Into<String>,
        author: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        self.post_selector = post.into();
        self.author_selector = author.into();
        self.content_selector = content.into();
        self
    }

    /// Sets where post times are read from.
    #[must_use]
    pub fn with_time(mut self, selector: impl Into<String>, attribute: Option<String>) -> Self {
        self.time_selector = selector.into();
        self.time_attribute = attribute;
        self
    }

    /// Allows pages without posts.
    #[must_use]
    pub fn allow_empty(mut self) -> Self {
        self.require_posts = false;
        self
    }
}

fn compile(selector: &str) -> Result<Selector, DocflowError> {
    Selector::parse(selector).map_err(|e| DocflowError::InvalidSelector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

/// Extracts a [`Document`] from each [`RawPage`].
#[derive(Debug)]
pub struct ParseStage {
    titles: Vec<Selector>,
    post: Selector,
    author: Selector,
    content: Selector,
    time: Selector,
    time_attribute: Option<String>,
    require_posts: bool,
    whitespace: Regex,
}

impl ParseStage {
    /// Compiles the configured selectors.
    ///
    /// # Errors
    ///
    /// Returns `DocflowError::InvalidSelector` for a selector that does not parse.
    pub fn new(config: &ParseConfig) -> Result<Self, DocflowError> {
        let titles = config
            .title_selectors
            .iter()
            .map(|s| compile(s))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            titles,
            post: compile(&config.post_selector)?,
            author: compile(&config.author_selector)?,
            content: compile(&config.content_selector)?,
            time: compile(&config.time_selector)?,
            time_attribute: config.time_attribute.clone(),
            require_posts: config.require_posts,
            whitespace: Regex::new(r"\s+").map_err(|e| DocflowError::Config(e.to_string()))?,
        })
    }

    fn text_of(&self, element: ElementRef<'_>) -> String {
        let joined = element.text().collect::<Vec<_>>().join(" ");
        self.whitespace.replace_all(joined.trim(), " ").into_owned()
    }

    fn first_text(&self, scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
        scope
            .select(selector)
            .map(|el| self.text_of(el))
            .find(|text| !text.is_empty())
    }

    fn post_time(&self, post: ElementRef<'_>) -> Option<i64> {
        let element = post.select(&self.time).next()?;
        let raw = match &self.time_attribute {
            Some(attr) => element.value().attr(attr).map(str::to_string),
            None => None,
        }
        .unwrap_or_else(|| self.text_of(element));

        parse_timestamp(&raw).ok().map(|dt| dt.timestamp())
    }

    /// Extracts a document synchronously.
    ///
    /// # Errors
    ///
    /// Returns `ItemError::Parse` when the page is empty, has no title, or has
    /// no posts while posts are required.
    pub fn extract(&self, page: &RawPage) -> Result<Document, ItemError> {
        if page.body.trim().is_empty() {
            return Err(ItemError::Parse("empty body".to_string()));
        }

        let html = Html::parse_document(&page.body);
        let root = html.root_element();

        let title = self
            .titles
            .iter()
            .find_map(|selector| self.first_text(root, selector))
            .ok_or_else(|| ItemError::Parse("no title found".to_string()))?;

        let posts: Vec<Post> = root
            .select(&self.post)
            .filter_map(|post| {
                let content = self.first_text(post, &self.content)?;
                Some(Post {
                    author: self.first_text(post, &self.author).unwrap_or_default(),
                    content,
                    time: self.post_time(post),
                })
            })
            .collect();

        if posts.is_empty() && self.require_posts {
            return Err(ItemError::Parse(format!("no posts matched in {}", page.url)));
        }

        Ok(Document {
            source_id: page.source_id.clone(),
            url: page.url.clone(),
            title,
            posts,
        })
    }
}

#[async_trait]
impl Stage for ParseStage {
    type Input = RawPage;
    type Output = Document;

    fn name(&self) -> &str {
        "parse"
    }

    async fn process(
        &self,
        page: RawPage,
        _cancel: &CancellationObserver,
    ) -> Result<Document, ItemError> {
        self.extract(&page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Source;
    use pretty_assertions::assert_eq;

    const THREAD: &str = r#"
        <html>
          <head><title>Fallback title</title></head>
          <body>
            <h1>  Rust   pipelines </h1>
            <div class="post">
              <span class="author">alice</span>
              <div class="content">First
                 post</div>
              <time datetime="1696512000">yesterday</time>
            </div>
            <div class="post">
              <span class="author">bob</span>
              <div class="content">Second post</div>
              <time datetime="2023-10-05T14:30:00Z"></time>
            </div>
            <div class="post">
              <span class="author">carol</span>
              <div class="content">   </div>
            </div>
          </body>
        </html>
    "#;

    fn page(body: &str) -> RawPage {
        RawPage::new(&Source::new("A"), "https://example.com/p/1", 200, body)
    }

    #[test]
    fn test_extract_thread() {
        let stage = ParseStage::new(&ParseConfig::default()).unwrap();
        let doc = stage.extract(&page(THREAD)).unwrap();

        assert_eq!(doc.source_id, "A");
        assert_eq!(doc.title, "Rust pipelines");
        assert_eq!(
            doc.posts,
            vec![
                Post {
                    author: "alice".into(),
                    content: "First post".into(),
                    time: Some(1_696_512_000),
                },
                Post {
                    author: "bob".into(),
                    content: "Second post".into(),
                    time: Some(1_696_516_200),
                },
            ]
        );
    }

    #[test]
    fn test_title_falls_back_in_order() {
        let stage = ParseStage::new(&ParseConfig::default().allow_empty()).unwrap();
        let doc = stage
            .extract(&page("<html><head><title>Only title</title></head><body></body></html>"))
            .unwrap();

        assert_eq!(doc.title, "Only title");
        assert!(doc.posts.is_empty());
    }

    #[test]
    fn test_time_from_text_when_no_attribute() {
        let config = ParseConfig::default().with_time(".when", None);
        let stage = ParseStage::new(&config).unwrap();
        let doc = stage
            .extract(&page(
                r#"<h1>t</h1><div class="post"><p class="content">x</p><i class="when">2023-10-05 14:30</i></div>"#,
            ))
            .unwrap();

        assert_eq!(doc.posts[0].time, Some(1_696_516_200));
        assert_eq!(doc.posts[0].author, "");
    }

    #[test]
    fn test_extract_errors() {
        let stage = ParseStage::new(&ParseConfig::default()).unwrap();

        let empty = stage.extract(&page("   ")).unwrap_err();
        assert_eq!(empty.to_string(), "unparseable content: empty body");

        let untitled = stage.extract(&page("<div class=\"post\"></div>")).unwrap_err();
        assert!(matches!(untitled, ItemError::Parse(msg) if msg == "no title found"));

        let no_posts = stage.extract(&page("<h1>t</h1>")).unwrap_err();
        assert!(no_posts.to_string().contains("no posts matched"));
    }

    #[test]
    fn test_invalid_selector_is_setup_error() {
        let config = ParseConfig::default().with_post_selectors("div[", ".a", ".c");
        let err = ParseStage::new(&config).unwrap_err();
        assert!(matches!(err, DocflowError::InvalidSelector { ref selector, .. } if selector == "div["));
    }

    #[test]
    fn test_config_from_json() {
        let config: ParseConfig =
            serde_json::from_str(r#"{"post_selector": "div.l_post", "time_attribute": null}"#).unwrap();
        assert_eq!(config.post_selector, "div.l_post");
        assert_eq!(config.time_attribute, None);
        assert_eq!(config.title_selectors, vec!["h1", "title"]);
    }
}
