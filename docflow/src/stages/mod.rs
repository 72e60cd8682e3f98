//! Stage trait and the generic stage runner.
//!
//! A stage is the per-item unit of work (fetch, parse, render). The
//! [`StageRunner`] turns any stage into a bounded pool of workers between an
//! input sequence and an output/error sequence pair.

use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;

use crate::cancellation::CancellationObserver;
use crate::core::WorkItem;
use crate::errors::ItemError;

pub mod fetch;
pub mod parse;
pub mod render;
mod runner;

pub use fetch::{FetchConfig, FetchStage, PageClient, PageResponse};
#[cfg(feature = "http")]
pub use fetch::HttpClient;
pub use parse::{ParseConfig, ParseStage};
pub use render::{RenderConfig, RenderStage};
pub use runner::{StageHandle, StageRunner, StageStats, StageStatsSnapshot};

/// Trait for pipeline stages.
///
/// A stage turns one input item into exactly one outcome: a transformed
/// output item or an [`ItemError`]. Implementations are shared by every worker
/// of the stage, so `process` takes `&self`.
#[async_trait]
pub trait Stage: Send + Sync + 'static {
    /// The item type consumed by this stage.
    type Input: WorkItem;
    /// The item type produced by this stage.
    type Output: Send + 'static;

    /// Returns the name of the stage, used as the error tag.
    fn name(&self) -> &str;

    /// Processes one item.
    ///
    /// Long-running I/O should select on `cancel` so shutdown is not held up.
    async fn process(
        &self,
        item: Self::Input,
        cancel: &CancellationObserver,
    ) -> Result<Self::Output, ItemError>;
}

/// An async function-based stage.
pub struct FnStage<I, O, F, Fut> {
    name: String,
    func: F,
    _phantom: PhantomData<fn(I) -> (O, Fut)>,
}

impl<I, O, F, Fut> FnStage<I, O, F, Fut>
where
    I: WorkItem,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, ItemError>> + Send + 'static,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _phantom: PhantomData,
        }
    }
}

impl<I, O, F, Fut> Debug for FnStage<I, O, F, Fut> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<I, O, F, Fut> Stage for FnStage<I, O, F, Fut>
where
    I: WorkItem,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, ItemError>> + Send + 'static,
{
    type Input = I;
    type Output = O;

    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, item: I, _cancel: &CancellationObserver) -> Result<O, ItemError> {
        (self.func)(item).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::core::Source;

    #[tokio::test]
    async fn test_fn_stage() {
        let stage = FnStage::new("upper", |source: Source| async move {
            Ok::<_, ItemError>(source.id.to_uppercase())
        });

        assert_eq!(stage.name(), "upper");

        let token = CancellationToken::new();
        let output = stage.process(Source::new("abc"), &token.observe()).await;
        assert_eq!(output.unwrap(), "ABC");
    }

    #[tokio::test]
    async fn test_fn_stage_error() {
        let stage = FnStage::new("fails", |source: Source| async move {
            Err::<(), _>(ItemError::other(format!("cannot handle {}", source.id)))
        });

        let token = CancellationToken::new();
        let output = stage.process(Source::new("x"), &token.observe()).await;
        assert_eq!(output.unwrap_err().to_string(), "cannot handle x");
    }
}
