//! Mock stages for testing.
//!
//! Every mock is generic over the item it handles and passes it through
//! unchanged unless told otherwise, so the same mocks can stand in for any of
//! the three stages.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cancellation::CancellationObserver;
use crate::core::{Artifact, WorkItem};
use crate::errors::ItemError;
use crate::stages::Stage;

/// A pass-through stage that measures how many transforms overlap.
#[derive(Debug)]
pub struct ConcurrencyProbe<T> {
    name: String,
    delay: Duration,
    current: AtomicUsize,
    max: AtomicUsize,
    calls: AtomicUsize,
    _item: PhantomData<fn(T) -> T>,
}

impl<T> ConcurrencyProbe<T> {
    /// Creates a probe that holds every item for `delay`.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
            current: AtomicUsize::new(0),
            max: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            _item: PhantomData,
        }
    }

    /// Highest number of items seen in the transform at once.
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    /// Total items processed.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: WorkItem> Stage for ConcurrencyProbe<T> {
    type Input = T;
    type Output = T;

    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, item: T, _cancel: &CancellationObserver) -> Result<T, ItemError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(item)
    }
}

/// A stage that fails the items with the given ids and passes the rest through.
#[derive(Debug)]
pub struct FailingStage<T> {
    name: String,
    failing: HashSet<String>,
    _item: PhantomData<fn(T) -> T>,
}

impl<T> FailingStage<T> {
    /// Creates a stage failing every id in `ids`.
    pub fn new<I, S>(name: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            failing: ids.into_iter().map(Into::into).collect(),
            _item: PhantomData,
        }
    }
}

#[async_trait]
impl<T: WorkItem> Stage for FailingStage<T> {
    type Input = T;
    type Output = T;

    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, item: T, _cancel: &CancellationObserver) -> Result<T, ItemError> {
        if self.failing.contains(item.id()) {
            return Err(ItemError::Transport(format!("{} is unreachable", item.id())));
        }
        Ok(item)
    }
}

/// A stage whose transform panics on the given ids.
#[derive(Debug)]
pub struct PanickingStage<T> {
    name: String,
    panicking: HashSet<String>,
    _item: PhantomData<fn(T) -> T>,
}

impl<T> PanickingStage<T> {
    /// Creates a stage panicking on every id in `ids`.
    pub fn new<I, S>(name: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            panicking: ids.into_iter().map(Into::into).collect(),
            _item: PhantomData,
        }
    }
}

#[async_trait]
impl<T: WorkItem> Stage for PanickingStage<T> {
    type Input = T;
    type Output = T;

    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, item: T, _cancel: &CancellationObserver) -> Result<T, ItemError> {
        tokio::task::yield_now().await;
        if self.panicking.contains(item.id()) {
            panic!("induced panic on {}", item.id());
        }
        Ok(item)
    }
}

/// A stage that never finishes an item on its own; it gives up when the
/// token closes.
#[derive(Debug)]
pub struct BlockingStage<T> {
    name: String,
    entered: Arc<AtomicUsize>,
    _item: PhantomData<fn(T) -> T>,
}

impl<T> BlockingStage<T> {
    /// Creates a blocking stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entered: Arc::new(AtomicUsize::new(0)),
            _item: PhantomData,
        }
    }

    /// Number of items currently or previously held.
    #[must_use]
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: WorkItem> Stage for BlockingStage<T> {
    type Input = T;
    type Output = T;

    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, _item: T, cancel: &CancellationObserver) -> Result<T, ItemError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        cancel.cancelled().await;
        Err(ItemError::other("abandoned on cancellation"))
    }
}

/// A terminal stage that turns any item into an in-memory [`Artifact`] and
/// records the ids it saw.
#[derive(Debug)]
pub struct ArtifactStage<T> {
    name: String,
    seen: Mutex<Vec<String>>,
    _item: PhantomData<fn(T)>,
}

impl<T> ArtifactStage<T> {
    /// Creates an artifact stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seen: Mutex::new(Vec::new()),
            _item: PhantomData,
        }
    }

    /// Ids rendered so far, in completion order.
    #[must_use]
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl<T: WorkItem> Stage for ArtifactStage<T> {
    type Input = T;
    type Output = Artifact;

    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, item: T, _cancel: &CancellationObserver) -> Result<Artifact, ItemError> {
        let id = item.id().to_string();
        self.seen.lock().push(id.clone());
        Ok(Artifact::new(id.clone(), format!("memory/{id}"), id.len()))
    }
}
