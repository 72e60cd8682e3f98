//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is created once per pipeline run and closed once at
//! teardown. Workers only ever see a [`CancellationObserver`], which can wait
//! for the signal but cannot raise it.

mod token;

pub use token::{CancelCallback, CancelOnDrop, CancellationObserver, CancellationToken};
