//! Transaction filter evaluation.
//!
//! A chain's definition can carry filter scripts that every transaction must
//! pass. Scripts are opaque to this crate: a [`FilterEngine`] decides, given
//! the script source and the transaction's canonical form, whether the
//! transaction passes. Engines are untrusted. An error or a missed deadline
//! always counts as rejection.

use std::{fmt, sync::mpsc, sync::Arc, thread, time::Duration};

use log::warn;
use thiserror::Error;

/// Why a filter couldn't produce a verdict.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum FilterError {
    /// The engine failed while running the filter.
    #[error("Filter evaluation failed: {0}")]
    Evaluation(String),

    /// The engine didn't answer in time.
    #[error("Filter evaluation exceeded {0:?}")]
    Timeout(Duration),

    /// The engine has no way of running filters.
    #[error("Filters are not supported by this engine")]
    Unsupported,
}

/// Runs a filter script against a transaction.
pub trait FilterEngine: fmt::Debug + Send + Sync {
    /// Whether the transaction with canonical form `transaction` passes
    /// `filter`.
    fn evaluate(&self, filter: &str, transaction: &[u8]) -> Result<bool, FilterError>;

    /// Like [`FilterEngine::evaluate`] but with every failure read as
    /// rejection.
    fn accepts(&self, filter: &str, transaction: &[u8]) -> bool {
        match self.evaluate(filter, transaction) {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!("rejecting transaction, filter could not be evaluated: {e}");
                false
            }
        }
    }
}

type FilterFn = dyn Fn(&str, &[u8]) -> Result<bool, FilterError> + Send + Sync;

/// A [`FilterEngine`] backed by a closure.
#[derive(Clone)]
pub struct FnFilterEngine {
    f: Arc<FilterFn>,
}

impl FnFilterEngine {
    /// Wraps `f`.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str, &[u8]) -> Result<bool, FilterError> + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    /// An engine accepting every transaction.
    pub fn accept_all() -> Self {
        Self::new(|_, _| Ok(true))
    }
}

impl fmt::Debug for FnFilterEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFilterEngine").finish_non_exhaustive()
    }
}

impl FilterEngine for FnFilterEngine {
    fn evaluate(&self, filter: &str, transaction: &[u8]) -> Result<bool, FilterError> {
        (self.f)(filter, transaction)
    }
}

/// Rejects every transaction as soon as any filter applies.
///
/// This is the engine to use when no script runtime is available: chains
/// without filters still verify, and chains with filters fail closed.
#[derive(Clone, Copy, Debug, Default)]
pub struct RejectingFilterEngine;

impl FilterEngine for RejectingFilterEngine {
    fn evaluate(&self, _filter: &str, _transaction: &[u8]) -> Result<bool, FilterError> {
        Err(FilterError::Unsupported)
    }
}

/// Runs an inner engine on a worker thread and gives up after a deadline.
///
/// A worker that misses its deadline is left to finish on its own; its
/// verdict is discarded.
#[derive(Debug)]
pub struct TimeoutFilterEngine<E> {
    inner: Arc<E>,
    timeout: Duration,
}

impl<E: FilterEngine + 'static> TimeoutFilterEngine<E> {
    /// Bounds every evaluation of `inner` by `timeout`.
    pub fn new(inner: E, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            timeout,
        }
    }
}

impl<E: FilterEngine + 'static> FilterEngine for TimeoutFilterEngine<E> {
    fn evaluate(&self, filter: &str, transaction: &[u8]) -> Result<bool, FilterError> {
        let (tx, rx) = mpsc::channel();
        let inner = self.inner.clone();
        let filter = filter.to_string();
        let transaction = transaction.to_vec();

        thread::Builder::new()
            .name("filter-eval".into())
            .spawn(move || {
                // The receiver is gone once the deadline has passed.
                let _ = tx.send(inner.evaluate(&filter, &transaction));
            })
            .map_err(|e| FilterError::Evaluation(e.to_string()))?;

        match rx.recv_timeout(self.timeout) {
            Ok(verdict) => verdict,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(FilterError::Timeout(self.timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(FilterError::Evaluation(
                "filter worker exited without a verdict".into(),
            )),
        }
    }
}
