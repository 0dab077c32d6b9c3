use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

/// Request-scoped carrier for the caller's bearer tokens, an optional
/// deadline, and a cancellation signal.
///
/// Contexts are immutable; [`RequestContext::with_tokens`] and
/// [`RequestContext::child`] build derived contexts without touching
/// the original. Cloning is cheap and shares the token list.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    tokens: Arc<Vec<String>>,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(tokens: Vec<String>) -> Self {
        RequestContext {
            tokens: Arc::new(tokens),
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// A nested context with a replaced token set. Cancellation and
    /// deadline are inherited from `self`.
    pub fn with_tokens(&self, tokens: Vec<String>) -> Self {
        RequestContext {
            tokens: Arc::new(tokens),
            deadline: self.deadline,
            cancel: self.cancel.clone(),
        }
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        RequestContext {
            tokens: self.tokens.clone(),
            deadline: Some(deadline),
            cancel: self.cancel.clone(),
        }
    }

    /// A cancellable sub-context. Cancelling the child never affects
    /// the parent; cancelling the parent propagates to the child.
    pub fn child(&self) -> Self {
        RequestContext {
            tokens: self.tokens.clone(),
            deadline: self.deadline,
            cancel: self.cancel.child_token(),
        }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
