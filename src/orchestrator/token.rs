//! Single-flight token for patch flows.

use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Exclusive right to run a patch flow. Clones share the same token.
#[derive(Debug, Clone, Default)]
pub struct RunToken {
    inner: Arc<Mutex<()>>,
}

/// Held for the duration of one flow; dropping it releases the token.
#[derive(Debug)]
pub struct RunGuard {
    _held: OwnedMutexGuard<()>,
}

impl RunToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token shared by every orchestrator in this process.
    pub fn global() -> Self {
        static GLOBAL: OnceLock<RunToken> = OnceLock::new();
        GLOBAL.get_or_init(RunToken::new).clone()
    }

    /// Take the token without waiting. `None` while another flow holds it.
    pub fn try_acquire(&self) -> Option<RunGuard> {
        self.inner
            .clone()
            .try_lock_owned()
            .ok()
            .map(|held| RunGuard { _held: held })
    }

    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let token = RunToken::new();
        let guard = token.try_acquire().unwrap();
        assert!(token.is_held());
        assert!(token.clone().try_acquire().is_none());

        drop(guard);
        assert!(!token.is_held());
        assert!(token.try_acquire().is_some());
    }

    #[test]
    fn global_token_is_shared() {
        let a = RunToken::global();
        let b = RunToken::global();
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
    }
}
