//! Cooperative cancellation primitive shared by every long-running task in the
//! engine (manager loops, process waits, health tickers, backoff sleeps).
//!
//! A [`Context`] is a condvar-backed flag: any number of threads can clone it
//! and block on [`Context::wait_timeout`]/[`Context::block_until_cancelled`],
//! and a single `cancel()` call wakes all of them at once. No task ever holds
//! another lock across one of these waits.

use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

#[derive(Debug, Clone, Default)]
pub struct Context<T>(Arc<(Mutex<T>, Condvar)>);

impl<T> Context<T>
where
    T: Default + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the shared value and wakes every thread blocked on this context.
    pub fn cancel_all(&self, val: T) -> Result<(), PoisonError<MutexGuard<'_, T>>> {
        let (lck, cvar) = &*self.0;
        let mut lck = lck.lock()?;
        *lck = val;
        cvar.notify_all();
        Ok(())
    }

    pub fn get(&self) -> Result<T, PoisonError<MutexGuard<'_, T>>> {
        let (lck, _) = &*self.0;
        Ok(lck.lock()?.clone())
    }

    pub(crate) fn get_lock_cvar(&self) -> &(Mutex<T>, Condvar) {
        &self.0
    }

    /// Resets the shared value back to its default, e.g. so the context can
    /// be reused for the next attempt of a per-process shutdown waiter.
    pub fn reset(&self) -> Result<(), PoisonError<MutexGuard<'_, T>>> {
        let (lck, _) = &*self.0;
        *lck.lock()? = <T as Default>::default();
        Ok(())
    }
}

/// Specialization used everywhere cancellation is a plain on/off signal.
pub type CancelToken = Context<bool>;

impl CancelToken {
    pub fn cancel(&self) {
        // Poisoning here would mean another thread panicked while holding
        // the lock; cancellation must still proceed.
        let _ = self.cancel_all(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.get().unwrap_or(true)
    }

    /// Blocks the calling thread until either `timeout` elapses or the token
    /// is cancelled. Returns `true` if woken by cancellation.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = self.get_lock_cvar();
        let guard = match lock.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *guard {
            return true;
        }
        let (guard, result) = match cvar.wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
        {
            Ok(pair) => pair,
            Err(poisoned) => poisoned.into_inner(),
        };
        !result.timed_out() || *guard
    }

    /// Blocks until cancelled. Used by waiters that have nothing else to do.
    pub fn block_until_cancelled(&self) {
        let (lock, cvar) = self.get_lock_cvar();
        let guard = match lock.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = cvar.wait_while(guard, |cancelled| !*cancelled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn wait_timeout_elapses_without_cancel() {
        let ctx = CancelToken::new();
        assert!(!ctx.wait_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn wait_timeout_wakes_on_cancel() {
        let ctx = CancelToken::new();
        let waiter = ctx.clone();
        let handle = thread::spawn(move || waiter.wait_timeout(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(10));
        ctx.cancel();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn is_cancelled_reflects_state() {
        let ctx = CancelToken::new();
        assert!(!ctx.is_cancelled());
        ctx.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn reset_allows_reuse() {
        let ctx = CancelToken::new();
        ctx.cancel();
        assert!(ctx.is_cancelled());
        ctx.reset().unwrap();
        assert!(!ctx.is_cancelled());
    }
}
