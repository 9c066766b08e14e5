//! Cancellation tokens with a stable identity
//!
//! [`CancelToken`] wraps [`tokio_util::sync::CancellationToken`] and tags it
//! with a [`TokenId`]. Clones of a token share its id, so they are the same
//! token; every [`CancelToken::new`] or [`CancelToken::child_token`] call
//! produces a new identity. Memoized runs are keyed by this identity, never
//! by whether two tokens happen to be in the same state.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a [`CancelToken`], shared by all of its clones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(u64);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token#{}", self.0)
    }
}

/// A caller-owned cancellation signal with identity semantics
#[derive(Debug, Clone)]
pub struct CancelToken {
    id: TokenId,
    inner: CancellationToken,
}

impl CancelToken {
    /// Create a new, uncancelled token with a fresh identity
    pub fn new() -> Self {
        CancellationToken::new().into()
    }

    /// Identity of this token
    pub fn id(&self) -> TokenId {
        self.id
    }

    /// Whether cancellation has been requested, read at call time
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Completes once cancellation has been requested.
    ///
    /// Returns immediately if the token is already cancelled.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await;
    }

    /// A token with a new identity that is cancelled whenever this one is
    pub fn child_token(&self) -> Self {
        self.inner.child_token().into()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl From<CancellationToken> for CancelToken {
    fn from(inner: CancellationToken) -> Self {
        Self {
            id: TokenId(NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed)),
            inner,
        }
    }
}

/// Completes when `token` is cancelled; never completes without a token.
pub(crate) async fn cancelled_or_pending(token: Option<&CancelToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_clones_share_identity() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert_eq!(token.id(), clone.id());
    }

    #[test]
    fn test_new_tokens_are_distinct() {
        let a = CancelToken::new();
        let b = CancelToken::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_cancel_is_visible_through_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_child_token_follows_parent_with_new_identity() {
        let parent = CancelToken::new();
        let child = parent.child_token();
        assert_ne!(parent.id(), child.id());

        child.cancel();
        assert!(!parent.is_cancelled());

        let child = parent.child_token();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        timeout(Duration::from_secs(1), task)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_or_pending_without_token_never_completes() {
        let result = timeout(Duration::from_millis(20), cancelled_or_pending(None)).await;
        assert!(result.is_err());

        let token = CancelToken::new();
        token.cancel();
        timeout(Duration::from_millis(20), cancelled_or_pending(Some(&token)))
            .await
            .expect("cancelled token should complete immediately");
    }
}
