//! Cooperative cancellation scope shared by the encoder and transport client.
//!
//! A scope is cheap to clone; clones share the same state, so cancelling any
//! clone is observed by all of them. Child scopes observe their parent's
//! cancellation and deadline but can be cancelled on their own.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use crate::NemuError;
use crate::Result;

/// A cancellation token with an optional deadline.
///
/// # Examples
///
/// ```
/// use nemu_core::CancelScope;
/// use std::time::Duration;
///
/// let parent = CancelScope::with_timeout(Duration::from_secs(30));
/// let session = parent.child();
///
/// assert!(!session.is_cancelled());
/// parent.cancel();
/// assert!(session.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelScope {
    state: Arc<ScopeState>,
}

#[derive(Debug, Default)]
struct ScopeState {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    parent: Option<CancelScope>,
}

impl CancelScope {
    /// Creates a scope that is only cancelled explicitly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scope that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Creates a scope that expires at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            state: Arc::new(ScopeState {
                cancelled: AtomicBool::new(false),
                deadline: Some(deadline),
                parent: None,
            }),
        }
    }

    /// Derives a child scope.
    ///
    /// The child inherits the parent's deadline and is cancelled whenever the
    /// parent is; cancelling the child leaves the parent untouched.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            state: Arc::new(ScopeState {
                cancelled: AtomicBool::new(false),
                deadline: self.deadline(),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Signals cancellation to every clone and child of this scope.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once the scope was cancelled or its deadline passed.
    pub fn is_cancelled(&self) -> bool {
        self.check().is_err()
    }

    /// Returns `Err(Cancelled)` or `Err(DeadlineExceeded)` once the scope is
    /// done, `Ok(())` otherwise.
    pub fn check(&self) -> Result<()> {
        if self.state.cancelled.load(Ordering::Acquire) {
            return Err(NemuError::Cancelled);
        }
        if let Some(deadline) = self.state.deadline
            && Instant::now() >= deadline
        {
            return Err(NemuError::DeadlineExceeded);
        }
        match &self.state.parent {
            Some(parent) => parent.check(),
            None => Ok(()),
        }
    }

    /// The effective deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.state.deadline
    }

    /// Time left until the deadline, `None` if the scope has no deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_scope_is_live() {
        let scope = CancelScope::new();
        assert!(!scope.is_cancelled());
        assert!(scope.check().is_ok());
        assert!(scope.remaining().is_none());
    }

    #[test]
    fn test_cancel_is_shared_by_clones() {
        let scope = CancelScope::new();
        let clone = scope.clone();
        clone.cancel();
        assert!(matches!(scope.check(), Err(NemuError::Cancelled)));
    }

    #[test]
    fn test_child_observes_parent() {
        let parent = CancelScope::new();
        let child = parent.child();
        parent.cancel();
        assert!(matches!(child.check(), Err(NemuError::Cancelled)));
    }

    #[test]
    fn test_child_cancel_does_not_propagate_up() {
        let parent = CancelScope::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_deadline_expires() {
        let scope = CancelScope::with_timeout(Duration::ZERO);
        assert!(matches!(scope.check(), Err(NemuError::DeadlineExceeded)));
        assert_eq!(scope.child().remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_child_inherits_deadline() {
        let parent = CancelScope::with_timeout(Duration::from_secs(60));
        let child = parent.child();
        assert_eq!(child.deadline(), parent.deadline());
        assert!(child.remaining().is_some_and(|left| left > Duration::from_secs(50)));
    }
}
