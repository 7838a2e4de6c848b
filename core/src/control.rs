//! Cooperative cancellation and deadlines.
//!
//! A [`CancelToken`] is shared by everything started on behalf of one user
//! request. A [`RunContext`] pairs the token with an optional deadline; nested
//! contexts can only shorten the deadline. Blocking code polls [`RunContext::check`]
//! and sleeps through [`RunContext::sleep`], async code awaits
//! [`CancelToken::cancelled`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Why a unit of work stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interruption {
    Cancelled,
    DeadlineExceeded,
}

impl fmt::Display for Interruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interruption::Cancelled => write!(f, "cancelled"),
            Interruption::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

struct TokenState {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    wakeup: Condvar,
    notify: Notify,
}

/// Shared cancellation flag. Cloning yields a handle to the same flag.
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<TokenState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            state: Arc::new(TokenState {
                cancelled: AtomicBool::new(false),
                lock: Mutex::new(()),
                wakeup: Condvar::new(),
                notify: Notify::new(),
            }),
        }
    }

    /// Raise the signal and wake every waiter. Idempotent.
    pub fn cancel(&self) {
        {
            let _guard = self.state.lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.state.cancelled.store(true, Ordering::SeqCst);
            self.state.wakeup.notify_all();
        }
        self.state.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            // Registered before the flag check so a concurrent cancel is not missed
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Cancellation token plus an optional absolute deadline.
#[derive(Clone, Debug)]
pub struct RunContext {
    token: CancelToken,
    deadline: Option<Instant>,
}

impl RunContext {
    pub fn new(token: CancelToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// A context that is never cancelled and has no deadline.
    pub fn unbounded() -> Self {
        Self::new(CancelToken::new())
    }

    /// Child context whose deadline is `timeout` from now, never later than ours.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now().checked_add(timeout);
        self.with_deadline(candidate)
    }

    /// Child context with the earlier of our deadline and `deadline`.
    pub fn with_deadline(&self, deadline: Option<Instant>) -> Self {
        let deadline = match (self.deadline, deadline) {
            (Some(ours), Some(theirs)) => Some(ours.min(theirs)),
            (ours, theirs) => ours.or(theirs),
        };
        Self {
            token: self.token.clone(),
            deadline,
        }
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Cancellation is reported ahead of an expired deadline.
    pub fn check(&self) -> Result<(), Interruption> {
        if self.token.is_cancelled() {
            return Err(Interruption::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Interruption::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Block for `duration`, returning early when cancelled or past the deadline.
    pub fn sleep(&self, duration: Duration) -> Result<(), Interruption> {
        let wake_at = Instant::now() + duration;
        let state = &self.token.state;
        let mut guard = state.lock.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            self.check()?;

            let now = Instant::now();
            let until = match self.deadline {
                Some(deadline) if deadline < wake_at => deadline,
                _ => wake_at,
            };
            if now >= until {
                return self.check();
            }

            let (next, _) = state
                .wakeup
                .wait_timeout(guard, until - now)
                .unwrap_or_else(PoisonError::into_inner);
            guard = next;
        }
    }
}
