// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Lifecycle hook registry and executor.
//!
//! Synchronous hooks run in registration order and stop the chain on the
//! first error. Asynchronous hooks are deep-copied at enqueue time and
//! handed to [`crate::queue::AsyncQueue`]; their failures are logged, not
//! surfaced — the caller of [`HookExecutor::execute`] never blocks on
//! them and never sees their errors.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use orm_types::{deep_copy_record, HookKind, Record};
use tracing::warn;

use crate::{error::OrmError, queue::AsyncQueue};

/// One hook body: receives the resource name and the record it fired
/// for, returns an error to stop a synchronous chain (ignored for async
/// hooks beyond logging).
#[async_trait]
pub trait HookBody: Send + Sync {
    /// A stable name for logs and ordering assertions.
    fn name(&self) -> &str;
    /// Run the hook.
    async fn call(&self, resource: &str, record: &Record) -> Result<(), OrmError>;
}

/// A registered hook: its body plus whether it runs synchronously in the
/// caller's chain or is deferred to the async worker pool.
pub struct RegisteredHook {
    body: Arc<dyn HookBody>,
    is_async: bool
}

impl RegisteredHook {
    /// Wrap a body for registration.
    pub fn new(body: Arc<dyn HookBody>, is_async: bool) -> Self {
        Self { body, is_async }
    }
}

/// Append-only mapping from [`HookKind`] to its ordered hooks.
/// Registration is expected to happen at startup, before workers and
/// callers are active — this type is not internally synchronized, by
/// contract (the spec's own source carries the same precondition).
#[derive(Default)]
pub struct HookRegistry {
    hooks: BTreeMap<HookKind, Vec<RegisteredHook>>
}

impl HookRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook for a kind, appended after any already registered
    /// for that kind.
    pub fn register(&mut self, kind: HookKind, hook: RegisteredHook) {
        self.hooks.entry(kind).or_default().push(hook);
    }

    /// Hooks registered for a kind, in registration order; empty when
    /// none were registered.
    pub fn hooks_for(&self, kind: HookKind) -> &[RegisteredHook] {
        self.hooks.get(&kind).map_or(&[], Vec::as_slice)
    }
}

/// Runs a resource's hooks for one lifecycle event.
pub struct HookExecutor {
    queue: Arc<AsyncQueue>
}

impl HookExecutor {
    /// Bind an executor to the async queue that deferred hooks are
    /// enqueued on.
    pub fn new(queue: Arc<AsyncQueue>) -> Self {
        Self { queue }
    }

    /// Run every hook registered for `kind` against `record`.
    ///
    /// Synchronous hooks run first-to-last; the first error stops the
    /// chain and is wrapped as [`OrmError::HookSyncFailure`] — later
    /// hooks (sync or async) in this call do not run. If every
    /// synchronous hook succeeds, async hooks are deep-copied and
    /// enqueued; enqueue failures are logged and swallowed, never
    /// surfaced here.
    pub async fn execute(&self, registry: &HookRegistry, resource: &str, kind: HookKind, record: &Record) -> Result<(), OrmError> {
        let hooks = registry.hooks_for(kind);
        if hooks.is_empty() {
            return Ok(());
        }

        for hook in hooks {
            if hook.is_async {
                let snapshot = deep_copy_record(record);
                let body = hook.body.clone();
                let resource = resource.to_string();
                let hook_name = body.name().to_string();
                let hook_name_for_log = hook_name.clone();
                let enqueue_result = self
                    .queue
                    .enqueue(Box::pin(async move {
                        if let Err(err) = body.call(&resource, &snapshot).await {
                            warn!(hook = %hook_name_for_log, %err, "async hook failed");
                        }
                    }))
                    .await;
                if let Err(err) = enqueue_result {
                    warn!(hook = %hook_name, %err, "failed to enqueue async hook");
                }
            } else if let Err(err) = hook.body.call(resource, record).await {
                return Err(OrmError::HookSyncFailure {
                    kind,
                    source: Box::new(err)
                });
            }
        }

        Ok(())
    }
}
