//! Named one-shot timers on an injected millisecond clock.
//!
//! Each kind has at most one pending deadline. Scheduling a kind that is
//! already pending replaces it, which is how every debounce in the tracker
//! is expressed.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    /// Detection pass, from start-up, a retry or a mutation burst.
    Detect,
    /// Detection after a single-page navigation settles.
    NavigationDetect,
    /// Look up stored progress for the page and maybe offer to resume.
    ResumeCheck,
    /// Interval save while playing.
    PeriodicSave,
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    deadlines: BTreeMap<TimerKind, u64>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `kind` to fire at `at`, replacing any pending deadline.
    pub fn schedule(&mut self, kind: TimerKind, at: u64) {
        self.deadlines.insert(kind, at);
    }

    /// Returns whether the timer was pending.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        self.deadlines.remove(&kind).is_some()
    }

    pub fn cancel_all(&mut self) {
        self.deadlines.clear();
    }

    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.deadlines.contains_key(&kind)
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<u64> {
        self.deadlines.get(&kind).copied()
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<u64> {
        self.deadlines.values().min().copied()
    }

    /// Remove and return every timer due at `now`, earliest first.
    pub fn pop_due(&mut self, now: u64) -> Vec<TimerKind> {
        let mut due: Vec<(u64, TimerKind)> = self
            .deadlines
            .iter()
            .filter(|(_, &at)| at <= now)
            .map(|(&kind, &at)| (at, kind))
            .collect();
        due.sort();
        for (_, kind) in &due {
            self.deadlines.remove(kind);
        }
        due.into_iter().map(|(_, kind)| kind).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reschedule_replaces_deadline() {
        let mut timers = TimerQueue::new();
        timers.schedule(TimerKind::ResumeCheck, 1000);
        timers.schedule(TimerKind::ResumeCheck, 1500);
        assert!(timers.pop_due(1200).is_empty());
        assert_eq!(timers.pop_due(1500), vec![TimerKind::ResumeCheck]);
        assert!(timers.is_empty());
    }

    #[test]
    fn test_pop_due_orders_by_deadline() {
        let mut timers = TimerQueue::new();
        timers.schedule(TimerKind::PeriodicSave, 300);
        timers.schedule(TimerKind::Detect, 200);
        timers.schedule(TimerKind::ResumeCheck, 900);
        assert_eq!(timers.next_deadline(), Some(200));
        assert_eq!(
            timers.pop_due(500),
            vec![TimerKind::Detect, TimerKind::PeriodicSave]
        );
        assert!(timers.is_pending(TimerKind::ResumeCheck));
    }

    #[test]
    fn test_cancel() {
        let mut timers = TimerQueue::new();
        timers.schedule(TimerKind::Detect, 10);
        assert!(timers.cancel(TimerKind::Detect));
        assert!(!timers.cancel(TimerKind::Detect));
        timers.schedule(TimerKind::Detect, 10);
        timers.schedule(TimerKind::PeriodicSave, 10);
        timers.cancel_all();
        assert!(timers.pop_due(100).is_empty());
    }
}
