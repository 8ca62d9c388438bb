//! Callback manager — registers handler and hook callbacks by name and
//! dispatches them with a scoped timer, converting arbitrary callback
//! failures into the structured error taxonomy.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Instant;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use tzindex_core::error::{CallbackKind, IndexerError, Result};

use crate::context::Context;
use crate::payload::HandlerPayload;

pub type HandlerFn = std::sync::Arc<
    dyn Fn(std::sync::Arc<Context>, HandlerPayload) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync,
>;

pub type HookFn = std::sync::Arc<
    dyn Fn(std::sync::Arc<Context>, Vec<serde_json::Value>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync,
>;

/// The hook-name that, if declared but not implemented, escalates to a
/// reindex instead of being logged and ignored.
pub const ON_ROLLBACK_HOOK: &str = "on_rollback";

struct HookEntry {
    func: HookFn,
    /// Expected positional argument count, used for `CallbackTypeError`.
    arity: usize,
}

/// Registry of named handler/hook callbacks, plus dispatch.
#[derive(Default)]
pub struct CallbackManager {
    handlers: Mutex<HashMap<String, HandlerFn>>,
    hooks: Mutex<HashMap<String, HookEntry>>,
    warned_missing: Mutex<HashSet<String>>,
}

impl CallbackManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a handler callback. Idempotent by design —
    /// re-registering the same name simply rebinds it.
    pub fn register_handler(&self, name: impl Into<String>, func: HandlerFn) {
        self.handlers.lock().unwrap().insert(name.into(), func);
    }

    /// Register (or replace) a hook callback with its expected arity.
    pub fn register_hook(&self, name: impl Into<String>, arity: usize, func: HookFn) {
        self.hooks.lock().unwrap().insert(name.into(), HookEntry { func, arity });
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.lock().unwrap().contains_key(name)
    }

    pub fn has_hook(&self, name: &str) -> bool {
        self.hooks.lock().unwrap().contains_key(name)
    }

    /// Every currently-registered handler name, for config resolution.
    pub fn registered_handlers(&self) -> Vec<String> {
        self.handlers.lock().unwrap().keys().cloned().collect()
    }

    /// Dispatch a handler callback. The caller constructs `payload` from a
    /// [`tzindex_core::Match`] before calling this.
    pub async fn fire_handler(
        &self,
        ctx: std::sync::Arc<Context>,
        name: &str,
        payload: HandlerPayload,
    ) -> Result<()> {
        let func = self
            .handlers
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| IndexerError::HandlerImport {
                module: ctx.package().to_string(),
                name: name.to_string(),
            })?;

        let started = Instant::now();
        let result = func(ctx, payload).await;
        log_timing(name, CallbackKind::Handler, started.elapsed());

        result.map_err(|source| IndexerError::Callback {
            kind: CallbackKind::Handler,
            name: name.to_string(),
            source,
        })
    }

    /// Dispatch a lifecycle hook. Missing hooks are tolerated except
    /// `on_rollback`, which the caller should treat as a signal to reindex.
    pub async fn fire_hook(
        &self,
        ctx: std::sync::Arc<Context>,
        name: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<()> {
        let entry = {
            let hooks = self.hooks.lock().unwrap();
            hooks.get(name).map(|e| (e.func.clone(), e.arity))
        };

        let Some((func, arity)) = entry else {
            if name == ON_ROLLBACK_HOOK {
                return Err(IndexerError::CallbackNotImplemented { name: name.to_string() });
            }
            if self.warned_missing.lock().unwrap().insert(name.to_string()) {
                warn!(hook = %name, "hook not implemented, skipping");
            }
            return Ok(());
        };

        if args.len() != arity {
            return Err(IndexerError::CallbackType {
                name: name.to_string(),
                expected: arity,
                got: args.len(),
            });
        }

        let started = Instant::now();
        let result = func(ctx, args).await;
        log_timing(name, CallbackKind::Hook, started.elapsed());

        result.map_err(|source| IndexerError::Callback {
            kind: CallbackKind::Hook,
            name: name.to_string(),
            source,
        })
    }
}

fn log_timing(name: &str, kind: CallbackKind, elapsed: std::time::Duration) {
    if elapsed.as_secs_f64() > 1.0 {
        info!(callback = %name, kind = %kind, elapsed_ms = elapsed.as_millis(), "callback completed");
    } else {
        debug!(callback = %name, kind = %kind, elapsed_ms = elapsed.as_millis(), "callback completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_handler_and_hook_lookups_report_absence() {
        let manager = CallbackManager::new();
        assert!(!manager.has_handler("on_mint"));
        assert!(!manager.has_hook("on_restart"));
    }

    #[test]
    fn register_handler_is_visible_immediately() {
        let manager = CallbackManager::new();
        manager.register_handler("on_mint", std::sync::Arc::new(|_ctx, _payload| {
            Box::pin(async { Ok(()) })
        }));
        assert!(manager.has_handler("on_mint"));
    }
}
