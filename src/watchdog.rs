//! Liveness watchdog
//!
//! Pure state machine behind the link supervisor. Time is passed in by the
//! caller, so the same transitions drive the async receive loop and the unit
//! tests.
//!
//! ```text
//!   Waiting ──feed──▶ Alive ◀──feed (Recovered)── TimedOut
//!      │                │ ▲                          ▲
//!      │                └─┘ feed                     │
//!      └──────────── expire ─────────────────────────┘
//! ```

use std::time::{Duration, Instant};

use crate::types::LinkState;

/// Default silence interval before the link is declared lost.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Diagnostic text carried by every timeout notification.
pub const TIMEOUT_MESSAGE: &str = "No data coming from the network";

/// Notification produced by a watchdog transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Entered `TimedOut`
    TimedOut,
    /// Left `TimedOut` on fresh data
    Recovered,
}

#[derive(Debug, Clone)]
pub struct Watchdog {
    state: LinkState,
    timeout: Duration,
    deadline: Instant,
}

impl Watchdog {
    /// Arm a new watchdog in `Waiting`, expiring `timeout` after `now`.
    pub fn new(timeout: Duration, now: Instant) -> Self {
        Self {
            state: LinkState::Waiting,
            timeout,
            deadline: now + timeout,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Instant at which [`expire`](Self::expire) next takes effect.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Record a successful decode at `now` and rearm.
    ///
    /// Returns `Recovered` only when leaving `TimedOut`; a first packet after
    /// start is not a recovery.
    pub fn feed(&mut self, now: Instant) -> Option<Transition> {
        let transition = (self.state == LinkState::TimedOut).then_some(Transition::Recovered);
        self.state = LinkState::Alive;
        self.deadline = now + self.timeout;
        transition
    }

    /// Check for expiry at `now`.
    ///
    /// Fires at most once per silent interval: after a timeout the deadline is
    /// pushed a full interval ahead, so a second `TimedOut` needs another
    /// interval of silence.
    pub fn expire(&mut self, now: Instant) -> Option<Transition> {
        if now < self.deadline {
            return None;
        }
        self.state = LinkState::TimedOut;
        self.deadline = now + self.timeout;
        Some(Transition::TimedOut)
    }
}
