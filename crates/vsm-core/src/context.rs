//! Per-request context and collaborator capabilities.
//!
//! A [`RequestContext`] is an immutable bundle threaded through every
//! handler call: caller identity, tracing id, and a cancellation signal.
//! It is not a general-purpose bag; it carries identity but never
//! authorization decisions, which are re-checked at each sensitive boundary.
//!
//! The collaborator traits live here too: [`AuthorizationManager`] (pure
//! allow/deny decisions) and [`UserManager`] (token to identity resolution
//! for the HTTP layer). Both are injected into consumers at construction
//! time rather than reached through process globals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::AuthzDenied;
use crate::model::Operation;

/// A cooperative cancellation flag shared between a request's originator
/// and its handlers.
///
/// Handlers check the flag at each externally observable suspension point
/// (data-store I/O, key-store I/O, CA file I/O) and abort with a
/// `Canceled` error after compensating partial work.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The authenticated caller on whose behalf a request runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Entry id of the user; owner fields reference this value.
    pub entry_id: String,
}

impl Identity {
    #[must_use]
    pub fn new(entry_id: impl Into<String>) -> Self {
        Self {
            entry_id: entry_id.into(),
        }
    }
}

/// Immutable per-request bundle: identity, tracing id, cancellation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    identity: Identity,
    trace_id: String,
    cancel: CancellationToken,
}

impl RequestContext {
    /// Build a context with a fresh trace id and cancellation token.
    #[must_use]
    pub fn new(identity: Identity) -> Self {
        Self::with_token(identity, CancellationToken::new())
    }

    /// Build a context around an externally held cancellation token.
    #[must_use]
    pub fn with_token(identity: Identity, cancel: CancellationToken) -> Self {
        Self {
            identity,
            trace_id: uuid::Uuid::new_v4().to_string(),
            cancel,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Whether this request has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Decides whether an operation on a path is permitted.
///
/// Pure decision, no side effects. Policy evaluation itself is outside the
/// core; implementations are injected into each secret type at init.
#[async_trait::async_trait]
pub trait AuthorizationManager: Send + Sync {
    /// Allow or deny `operation` on `path` for the caller in `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzDenied`] when the operation is not permitted.
    async fn check(
        &self,
        ctx: &RequestContext,
        operation: Operation,
        path: &str,
    ) -> Result<(), AuthzDenied>;
}

/// Resolves presented credentials to an identity.
///
/// Consumed by the HTTP layer when constructing the request context.
#[async_trait::async_trait]
pub trait UserManager: Send + Sync {
    /// Resolve a bearer token to an identity, or `None` if unknown.
    async fn resolve(&self, token: &str) -> Option<Identity>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_sticky_and_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn context_generates_distinct_trace_ids() {
        let a = RequestContext::new(Identity::new("user0"));
        let b = RequestContext::new(Identity::new("user0"));
        assert_ne!(a.trace_id(), b.trace_id());
    }

    #[test]
    fn context_observes_external_token() {
        let token = CancellationToken::new();
        let ctx = RequestContext::with_token(Identity::new("user0"), token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }
}
