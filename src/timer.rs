use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    ScanFallback,
    SendDebounce,
    SendThrottleRetry,
    Watchdog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    deadline: Instant,
    epoch: u64,
}

/// One cancellable deadline per purpose. Arming replaces the previous
/// deadline of the same kind.
#[derive(Debug, Default)]
pub struct Timers {
    slots: HashMap<TimerKind, Slot>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, kind: TimerKind, after: Duration, epoch: u64) {
        let deadline = Instant::now() + after;
        trace!("arming {kind:?} for {after:?} at epoch {epoch}");
        self.slots.insert(kind, Slot { deadline, epoch });
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.slots.remove(&kind);
    }

    pub fn cancel_all(&mut self) {
        self.slots.clear();
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.slots.contains_key(&kind)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots.values().map(|slot| slot.deadline).min()
    }

    /// Remove and return the earliest timer due at `now` with the epoch it
    /// was armed at.
    pub fn pop_due(&mut self, now: Instant) -> Option<(TimerKind, u64)> {
        let (kind, slot) = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.deadline <= now)
            .min_by_key(|(kind, slot)| (slot.deadline, **kind))
            .map(|(kind, slot)| (*kind, *slot))?;
        self.slots.remove(&kind);
        Some((kind, slot.epoch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rearming_replaces_the_deadline_and_epoch() {
        let mut timers = Timers::new();
        timers.arm(TimerKind::Watchdog, Duration::from_secs(15), 1);
        timers.arm(TimerKind::Watchdog, Duration::from_secs(30), 2);
        let later = Instant::now() + Duration::from_secs(20);
        assert_eq!(timers.pop_due(later), None);
        let much_later = later + Duration::from_secs(20);
        assert_eq!(timers.pop_due(much_later), Some((TimerKind::Watchdog, 2)));
        assert!(!timers.is_armed(TimerKind::Watchdog));
    }

    #[test]
    fn due_timers_pop_earliest_first() {
        let mut timers = Timers::new();
        timers.arm(TimerKind::ScanFallback, Duration::from_secs(5), 0);
        timers.arm(TimerKind::SendDebounce, Duration::from_millis(150), 3);
        let now = Instant::now() + Duration::from_secs(10);
        assert_eq!(timers.pop_due(now), Some((TimerKind::SendDebounce, 3)));
        assert_eq!(timers.pop_due(now), Some((TimerKind::ScanFallback, 0)));
        assert_eq!(timers.pop_due(now), None);
        assert_eq!(timers.next_deadline(), None);
    }
}
