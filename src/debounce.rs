//! Search-box debouncing and stale-response guarding.
//!
//! Both types are clock-agnostic: callers pass `now` in, so the REPL can drive
//! them with `Instant::now()` and tests with fixed instants.

use std::time::{Duration, Instant};

/// Default delay between the last keystroke and the search request
pub const DEFAULT_SEARCH_DELAY: Duration = Duration::from_millis(300);

/// Holds the latest input until it has been quiet for `delay`.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: None }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Record new input; any earlier pending input is replaced and its timer restarts
    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now));
    }

    /// Take the pending input once it has been quiet for the full delay
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        let (_, at) = self.pending.as_ref()?;
        if now.saturating_duration_since(*at) < self.delay {
            return None;
        }
        self.pending.take().map(|(value, _)| value)
    }

    /// When the pending input becomes ready
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, at)| *at + self.delay)
    }

    /// Take the pending input without waiting
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl<T> Default for Debouncer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_DELAY)
    }
}

/// Identifies one issued request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestTicket(u64);

impl RequestTicket {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Issues tickets so that only the response to the latest request is applied
#[derive(Debug, Clone, Default)]
pub struct RequestSequence {
    latest: u64,
}

impl RequestSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> RequestTicket {
        self.latest += 1;
        RequestTicket(self.latest)
    }

    /// False once a newer request has been issued
    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        ticket.0 == self.latest
    }

    pub fn latest(&self) -> Option<RequestTicket> {
        (self.latest > 0).then_some(RequestTicket(self.latest))
    }
}
