//! Request collapsing.
//!
//! Identical concurrent misses share one computation. The first caller (the
//! leader) spawns it as a detached task; later callers (followers) clone the
//! shared handle and wait on the same output.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use log::warn;

use super::key::CacheKey;
use crate::models::AnalysisResult;

/// Output of a shared computation. `None` when the task died before
/// producing a result.
pub type SharedAnalysis = Shared<BoxFuture<'static, Option<Arc<AnalysisResult>>>>;

/// Whether the caller started the computation or joined one.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    Leader,
    Follower,
}

#[derive(Default)]
pub struct InFlight {
    calls: DashMap<CacheKey, SharedAnalysis>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the computation for `key`, or start one with `start`.
    ///
    /// `start` runs while the key's shard is locked, so two callers can never
    /// both become leader. It may decline leadership by returning `Err`
    /// (e.g. the result landed in L1 meanwhile), which is passed through.
    pub fn join_or_start<F, E>(&self, key: &CacheKey, start: F) -> Result<(SharedAnalysis, Role), E>
    where
        F: FnOnce() -> Result<SharedAnalysis, E>,
    {
        match self.calls.entry(key.clone()) {
            Entry::Occupied(entry) => Ok((entry.get().clone(), Role::Follower)),
            Entry::Vacant(entry) => {
                let shared = start()?;
                entry.insert(shared.clone());
                Ok((shared, Role::Leader))
            }
        }
    }

    pub fn finish(&self, key: &CacheKey) {
        self.calls.remove(key);
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// Wrap a spawned task's handle into a shareable future.
pub fn share(
    handle: tokio::task::JoinHandle<Arc<AnalysisResult>>,
    on_failure: impl FnOnce() + Send + 'static,
) -> SharedAnalysis {
    async move {
        match handle.await {
            Ok(result) => Some(result),
            Err(e) => {
                warn!("Shared analysis task failed: {}", e);
                on_failure();
                None
            }
        }
    }
    .boxed()
    .shared()
}
