// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Per-eager-load bookkeeping: visited-resource set and depth counter,
//! guarding against unbounded recursion through cyclic relationship
//! graphs (self-referential entities are expected, not an error).

use std::collections::BTreeSet;

use tokio::sync::Mutex;

use crate::error::OrmError;

const DEFAULT_MAX_DEPTH: usize = 10;

/// Tracks visited resource names and current recursion depth across one
/// [`super::eager_load_with_context`] call tree. Cheap, short-lived
/// mutex: every operation here is O(1) set/counter work, never I/O.
#[derive(Debug)]
pub struct LoadContext {
    state: Mutex<State>,
    max_depth: usize
}

#[derive(Debug, Default)]
struct State {
    visited: BTreeSet<String>,
    depth: usize
}

impl Default for LoadContext {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl LoadContext {
    /// A fresh context with a custom maximum depth.
    pub fn new(max_depth: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            max_depth
        }
    }

    /// Increment the depth counter, failing if it now exceeds the
    /// configured maximum.
    pub async fn enter_depth(&self) -> Result<(), OrmError> {
        let mut state = self.state.lock().await;
        state.depth += 1;
        if state.depth > self.max_depth {
            return Err(OrmError::MaxDepthExceeded { max_depth: self.max_depth });
        }
        Ok(())
    }

    /// Decrement the depth counter on the way back out of a recursive
    /// call, regardless of how that call concluded.
    pub async fn exit_depth(&self) {
        let mut state = self.state.lock().await;
        state.depth = state.depth.saturating_sub(1);
    }

    /// Mark a resource as visited on this path, returning whether it was
    /// already visited (in which case the caller should skip silently —
    /// relationship graphs legitimately revisit a type on different
    /// branches).
    pub async fn mark_visited(&self, resource: &str) -> bool {
        let mut state = self.state.lock().await;
        !state.visited.insert(resource.to_string())
    }

    /// Remove a resource's visited mark on exit, so sibling branches are
    /// not falsely blocked from visiting it.
    pub async fn unmark_visited(&self, resource: &str) {
        self.state.lock().await.visited.remove(resource);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn depth_exceeds_cap() {
        let ctx = LoadContext::new(2);
        ctx.enter_depth().await.unwrap();
        ctx.enter_depth().await.unwrap();
        let err = ctx.enter_depth().await.unwrap_err();
        assert!(err.is_max_depth());
    }

    #[tokio::test]
    async fn exit_depth_allows_reentry() {
        let ctx = LoadContext::new(1);
        ctx.enter_depth().await.unwrap();
        ctx.exit_depth().await;
        ctx.enter_depth().await.unwrap();
    }

    #[tokio::test]
    async fn mark_visited_then_unmark_allows_sibling_reentry() {
        let ctx = LoadContext::new(10);
        assert!(!ctx.mark_visited("Category").await);
        assert!(ctx.mark_visited("Category").await);
        ctx.unmark_visited("Category").await;
        assert!(!ctx.mark_visited("Category").await);
    }
}
