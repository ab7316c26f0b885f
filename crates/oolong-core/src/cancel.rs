use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cooperative cancellation latch shared between the runtime and a
/// [`custom`](crate::Command::custom) effect.
///
/// The runtime hands every custom effect a `CancelToken`. The effect is
/// expected to check [`cancelled`](CancelToken::cancelled) at safe points
/// (between units of work, around blocking calls) and return promptly once it
/// reads `true`. Effects that finish within their grace period after a
/// [`Command::cancel`](crate::Command::cancel) are never force-terminated.
///
/// Tokens are cheap to clone; all clones observe the same latch. Once
/// [`cancel`](CancelToken::cancel) has been called, every subsequent
/// `cancelled()` on any clone returns `true`. Repeated `cancel()` calls are
/// idempotent.
#[derive(Clone)]
pub struct CancelToken {
    // `None` is the inert token: never cancelled, `cancel` is a no-op.
    flag: Option<Arc<AtomicBool>>,
}

impl CancelToken {
    /// Create a fresh, live token.
    pub fn new() -> Self {
        Self {
            flag: Some(Arc::new(AtomicBool::new(false))),
        }
    }

    /// The inert token: [`cancelled`](CancelToken::cancelled) always returns
    /// `false` and [`cancel`](CancelToken::cancel) does nothing.
    ///
    /// Exists so code that invokes effects uniformly can pass a token even
    /// when no cancellation will ever be requested.
    pub fn none() -> Self {
        Self { flag: None }
    }

    /// Request cancellation. Idempotent; safe to call from any task.
    pub fn cancel(&self) {
        if let Some(flag) = &self.flag {
            flag.store(true, Ordering::SeqCst);
        }
    }

    /// Whether cancellation has been requested.
    pub fn cancelled(&self) -> bool {
        self.flag
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.cancelled())
            .field("inert", &self.flag.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.cancelled());
    }

    #[test]
    fn cancel_flips_the_latch() {
        let token = CancelToken::new();
        token.cancel();
        assert!(token.cancelled());
    }

    #[test]
    fn cancel_is_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.cancelled());
    }

    #[test]
    fn clones_share_the_latch() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.cancelled());
        assert!(clone.cancelled());
    }

    #[test]
    fn none_token_ignores_cancel() {
        let token = CancelToken::none();
        token.cancel();
        assert!(!token.cancelled());
    }

    #[test]
    fn cancel_is_visible_across_threads() {
        let token = CancelToken::new();
        let clone = token.clone();
        std::thread::spawn(move || clone.cancel())
            .join()
            .expect("cancel thread panicked");
        assert!(token.cancelled());
    }
}
