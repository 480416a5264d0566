use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Coalesces values until they have been quiet for `delay`, and never hands
/// out a new value while the previous one is still in flight.
///
/// Values pushed while a save is in flight wait for [`Debouncer::complete`];
/// the in-flight one is never cancelled and the newer one supersedes it.
#[derive(Debug)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<T>,
    deadline: Option<Instant>,
    in_flight: bool,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            deadline: None,
            in_flight: false,
        }
    }

    /// Replaces the pending value and restarts the quiet period.
    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some(value);
        self.deadline = Some(now + self.delay);
    }

    /// Replaces the pending value and makes it due right away.
    pub fn push_immediate(&mut self, value: T, now: Instant) {
        self.pending = Some(value);
        self.deadline = Some(now);
    }

    /// The pending value once its deadline has passed and nothing is in flight.
    /// Handing it out marks it in flight.
    pub fn due(&mut self, now: Instant) -> Option<T> {
        if self.in_flight || self.deadline.is_none_or(|deadline| deadline > now) {
            return None;
        }
        self.take()
    }

    /// The pending value regardless of deadline (flush). Marks it in flight.
    pub fn take(&mut self) -> Option<T> {
        let value = self.pending.take()?;
        self.deadline = None;
        self.in_flight = true;
        Some(value)
    }

    /// The in-flight value was persisted.
    pub fn complete(&mut self) {
        self.in_flight = false;
    }

    /// The in-flight value failed. It is queued again unless something newer
    /// is already waiting.
    pub fn retry(&mut self, value: T, now: Instant) {
        self.in_flight = false;
        if self.pending.is_none() {
            self.push(value, now);
        }
    }

    /// Drops the pending value. An in-flight value is unaffected.
    pub fn cancel(&mut self) {
        self.pending = None;
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(800);

    #[test]
    fn repeated_pushes_collapse_to_latest() {
        let clock = ManualClock::new();
        let mut debouncer = Debouncer::new(DELAY);

        debouncer.push("a", clock.now());
        clock.advance(Duration::from_millis(500));
        debouncer.push("b", clock.now());
        clock.advance(Duration::from_millis(500));
        assert_eq!(debouncer.due(clock.now()), None);

        clock.advance(Duration::from_millis(300));
        assert_eq!(debouncer.due(clock.now()), Some("b"));
        assert_eq!(debouncer.due(clock.now()), None);
    }

    #[test]
    fn nothing_is_due_while_in_flight() {
        let clock = ManualClock::new();
        let mut debouncer = Debouncer::new(DELAY);

        debouncer.push(1, clock.now());
        clock.advance(DELAY);
        assert_eq!(debouncer.due(clock.now()), Some(1));

        debouncer.push(2, clock.now());
        clock.advance(DELAY);
        assert_eq!(debouncer.due(clock.now()), None);
        assert!(debouncer.is_in_flight());

        debouncer.complete();
        assert_eq!(debouncer.due(clock.now()), Some(2));
    }

    #[test]
    fn failed_value_requeues_unless_superseded() {
        let clock = ManualClock::new();
        let mut debouncer = Debouncer::new(DELAY);

        debouncer.push_immediate(1, clock.now());
        let first = debouncer.due(clock.now()).unwrap();
        debouncer.retry(first, clock.now());
        assert!(debouncer.has_pending());
        clock.advance(DELAY);
        let again = debouncer.due(clock.now()).unwrap();
        assert_eq!(again, 1);

        debouncer.push(2, clock.now());
        debouncer.retry(again, clock.now());
        clock.advance(DELAY);
        assert_eq!(debouncer.due(clock.now()), Some(2));
    }

    #[test]
    fn cancel_drops_pending_only() {
        let clock = ManualClock::new();
        let mut debouncer = Debouncer::new(DELAY);

        debouncer.push_immediate("x", clock.now());
        assert_eq!(debouncer.take(), Some("x"));
        debouncer.push("y", clock.now());
        debouncer.cancel();

        assert!(!debouncer.has_pending());
        assert_eq!(debouncer.deadline(), None);
        assert!(debouncer.is_in_flight());
    }
}
