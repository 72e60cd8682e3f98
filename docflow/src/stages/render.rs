//! Render stage: structured document in, file on disk out.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use super::Stage;
use crate::cancellation::CancellationObserver;
use crate::core::{Artifact, Document};
use crate::errors::{DocflowError, ItemError};
use crate::template::TemplateSet;

/// Where and how rendered artifacts are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Directory receiving one file per document.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// File extension, without the dot.
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}

fn default_extension() -> String {
    "html".to_string()
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            extension: default_extension(),
        }
    }
}

impl RenderConfig {
    /// Creates a render configuration writing into `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the file extension.
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }
}

#[derive(Serialize)]
struct RenderContext<'a> {
    document: &'a Document,
    rendered_at: i64,
}

/// Renders each [`Document`] through a shared template and writes it out.
#[derive(Debug)]
pub struct RenderStage {
    templates: Arc<TemplateSet>,
    config: RenderConfig,
    unsafe_chars: Regex,
}

impl RenderStage {
    /// Creates a render stage.
    ///
    /// # Errors
    ///
    /// Returns `DocflowError::Config` if the file-name pattern fails to compile.
    pub fn new(templates: Arc<TemplateSet>, config: RenderConfig) -> Result<Self, DocflowError> {
        Ok(Self {
            templates,
            config,
            unsafe_chars: Regex::new(r"[^A-Za-z0-9_-]+")
                .map_err(|e| DocflowError::Config(e.to_string()))?,
        })
    }

    /// Returns the path a document is written to.
    ///
    /// The stem is the last path segment of the source, made file-system safe,
    /// followed by a short digest of the full source id so distinct sources
    /// never collide.
    #[must_use]
    pub fn artifact_path(&self, source_id: &str) -> PathBuf {
        let last = source_id
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        let last = last.split(['?', '#']).next().unwrap_or_default();
        let stem = self.unsafe_chars.replace_all(last, "_");
        let stem = stem.trim_matches('_');
        let stem = if stem.is_empty() { "document" } else { stem };

        let digest = hex::encode(Sha256::digest(source_id.as_bytes()));
        let file = format!("{stem}-{}.{}", &digest[..8], self.config.extension);
        self.config.output_dir.join(file)
    }

    /// Renders a document to a string without touching the filesystem.
    ///
    /// # Errors
    ///
    /// Returns `ItemError::Render` if the template fails.
    pub fn render_to_string(&self, document: &Document) -> Result<String, ItemError> {
        self.templates.render(&RenderContext {
            document,
            rendered_at: chrono::Utc::now().timestamp(),
        })
    }
}

#[async_trait]
impl Stage for RenderStage {
    type Input = Document;
    type Output = Artifact;

    fn name(&self) -> &str {
        "render"
    }

    async fn process(
        &self,
        document: Document,
        _cancel: &CancellationObserver,
    ) -> Result<Artifact, ItemError> {
        let html = self.render_to_string(&document)?;
        let path = self.artifact_path(&document.source_id);

        tokio::fs::write(&path, html.as_bytes()).await?;
        debug!(path = %path.display(), bytes = html.len(), "Artifact written");

        Ok(Artifact::new(document.source_id, path, html.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::core::Post;
    use pretty_assertions::assert_eq;

    fn document(source_id: &str) -> Document {
        Document {
            source_id: source_id.to_string(),
            url: source_id.to_string(),
            title: "Rust & friends".to_string(),
            posts: vec![
                Post {
                    author: "alice".into(),
                    content: "hello".into(),
                    time: Some(1_696_512_000),
                },
                Post {
                    author: "bob".into(),
                    content: "<script>".into(),
                    time: None,
                },
            ],
        }
    }

    fn stage(dir: &std::path::Path) -> RenderStage {
        let templates = TemplateSet::from_source(
            "t.html",
            "{{ document.title }}\n{% for post in document.posts %}{{ post.author }}: {{ post.content }}\n{% endfor %}",
        )
        .unwrap();
        RenderStage::new(Arc::new(templates), RenderConfig::new(dir).with_extension("txt")).unwrap()
    }

    #[tokio::test]
    async fn test_render_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let stage = stage(dir.path());
        let token = CancellationToken::new();

        let artifact = stage
            .process(document("https://example.com/p/42"), &token.observe())
            .await
            .unwrap();

        assert_eq!(artifact.source_id, "https://example.com/p/42");
        assert!(artifact.path.starts_with(dir.path()));
        let written = std::fs::read_to_string(&artifact.path).unwrap();
        assert_eq!(written, "Rust &amp; friends\nalice: hello\nbob: &lt;script&gt;\n");
        assert_eq!(artifact.bytes, written.len());
    }

    #[tokio::test]
    async fn test_missing_output_dir_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let stage = stage(&dir.path().join("absent"));
        let token = CancellationToken::new();

        let err = stage.process(document("A"), &token.observe()).await.unwrap_err();
        assert!(matches!(err, ItemError::Io(_)));
    }

    #[test]
    fn test_artifact_path_is_safe_and_distinct() {
        let stage = stage(std::path::Path::new("out"));

        let a = stage.artifact_path("https://example.com/p/42?pn=2");
        let b = stage.artifact_path("https://example.org/p/42");
        let root = stage.artifact_path("https://example.com/");

        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("42-"));
        assert!(name.ends_with(".txt"));
        assert_ne!(a, b);
        assert!(root.file_name().unwrap().to_string_lossy().starts_with("example_com-"));
        assert_eq!(stage.artifact_path("B"), stage.artifact_path("B"));
    }

    #[tokio::test]
    async fn test_builtin_template_renders_thread() {
        let dir = tempfile::tempdir().unwrap();
        let stage = RenderStage::new(
            Arc::new(TemplateSet::builtin().unwrap()),
            RenderConfig::new(dir.path()),
        )
        .unwrap();

        let html = stage.render_to_string(&document("A")).unwrap();
        assert!(html.contains("Rust &amp; friends"));
        assert!(html.contains("alice"));
        assert!(html.contains(&crate::utils::format_local_time(1_696_512_000).unwrap()));
    }
}
