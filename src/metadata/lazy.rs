//! One-shot initialisation for lazy member proxies.
//!
//! [`LazyInit`] is a small state machine (`Uninitialized -> Initializing -> Ready`) with two
//! guarantees:
//!
//! - concurrent callers run the initialiser exactly once; late callers block until it finished
//! - a thread that re-enters its own initialisation gets [`Error::Reentrancy`] immediately
//!   instead of deadlocking or observing a half-populated proxy
//!
//! Unlike [`std::sync::OnceLock`], the state can be reset with [`LazyInit::invalidate`] so that
//! a proxy re-reads its row after the owning type changed in the target.

use std::{
    sync::{
        atomic::{AtomicU8, Ordering},
        Mutex,
    },
    thread::{self, ThreadId},
};

use tracing::error;

use crate::{metadata::token::Token, Error, Result};

const UNINITIALIZED: u8 = 0;
const INITIALIZING: u8 = 1;
const READY: u8 = 2;

/// Re-entrancy guarded one-shot initialisation state.
pub struct LazyInit {
    state: AtomicU8,
    lock: Mutex<()>,
    initializer: Mutex<Option<ThreadId>>,
}

impl Default for LazyInit {
    fn default() -> Self {
        LazyInit {
            state: AtomicU8::new(UNINITIALIZED),
            lock: Mutex::new(()),
            initializer: Mutex::new(None),
        }
    }
}

impl LazyInit {
    /// Create a new, uninitialised state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once an initialiser completed and no invalidation happened since
    pub fn is_ready(&self) -> bool {
        self.state.load(Ordering::Acquire) == READY
    }

    /// Run `init` unless the state is already ready.
    ///
    /// Returns `Ok(true)` if this call performed the initialisation and `Ok(false)` if it was
    /// already done. A failing `init` leaves the state uninitialised so the next call retries.
    ///
    /// # Errors
    /// [`Error::Reentrancy`] if called from inside `init` on the same thread, otherwise
    /// whatever `init` returns.
    pub fn ensure<F>(&self, token: Token, init: F) -> Result<bool>
    where
        F: FnOnce() -> Result<()>,
    {
        if self.is_ready() {
            return Ok(false);
        }

        let current = thread::current().id();
        if self.state.load(Ordering::Acquire) == INITIALIZING
            && *lock!(self.initializer) == Some(current)
        {
            error!(%token, "re-entrant initialization of a member proxy");
            return Err(Error::Reentrancy(token));
        }

        let _guard = lock!(self.lock);
        if self.is_ready() {
            return Ok(false);
        }

        self.state.store(INITIALIZING, Ordering::Release);
        *lock!(self.initializer) = Some(current);

        let result = init();

        *lock!(self.initializer) = None;
        match result {
            Ok(()) => {
                self.state.store(READY, Ordering::Release);
                Ok(true)
            }
            Err(err) => {
                self.state.store(UNINITIALIZED, Ordering::Release);
                Err(err)
            }
        }
    }

    /// Require the next [`LazyInit::ensure`] to run its initialiser again.
    ///
    /// Has no effect on an initialisation that is currently running.
    pub fn invalidate(&self) {
        let _ = self.state.compare_exchange(
            READY,
            UNINITIALIZED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Barrier,
    };

    use super::*;

    const TOKEN: Token = Token(0x0400_0001);

    #[test]
    fn runs_once() {
        let init = LazyInit::new();
        let runs = AtomicUsize::new(0);

        let run = || {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };
        assert!(init.ensure(TOKEN, run).unwrap());
        assert!(!init.ensure(TOKEN, run).unwrap());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(init.is_ready());
    }

    #[test]
    fn concurrent_callers_populate_once() {
        let init = Arc::new(LazyInit::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let init = init.clone();
                let runs = runs.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    init.ensure(TOKEN, || {
                        runs.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(20));
                        Ok(())
                    })
                    .unwrap()
                })
            })
            .collect();

        let performed: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(performed.iter().filter(|p| **p).count(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        assert!(!init.ensure(TOKEN, || Ok(())).unwrap());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reentrancy_is_reported() {
        let init = LazyInit::new();
        let mut inner = None;

        let outer = init.ensure(TOKEN, || {
            inner = Some(init.ensure(TOKEN, || Ok(())));
            Ok(())
        });

        assert!(outer.unwrap());
        assert!(matches!(inner, Some(Err(Error::Reentrancy(t))) if t == TOKEN));
        assert!(init.is_ready());
    }

    #[test]
    fn failure_and_invalidate_reset_state() {
        let init = LazyInit::new();
        assert!(init
            .ensure(TOKEN, || Err(Error::TargetDisconnected))
            .is_err());
        assert!(!init.is_ready());

        assert!(init.ensure(TOKEN, || Ok(())).unwrap());
        init.invalidate();
        assert!(!init.is_ready());
        assert!(init.ensure(TOKEN, || Ok(())).unwrap());
    }
}
