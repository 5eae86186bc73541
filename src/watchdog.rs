//! Stall detection policy for a connection attempt.

/// Forward progress made by the current connection attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub services_discovered: bool,
    pub characteristic_found: bool,
    pub rediscovery_attempted: bool,
    pub extensions: u32,
}

impl Progress {
    pub fn any(&self) -> bool {
        self.services_discovered || self.characteristic_found
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Already ready; the timer outlived its purpose.
    Stale,
    /// Slow but moving; count a stall and wait again.
    Extend,
    /// Connected without any progress; retry service discovery once.
    Rediscover,
    /// Give up on this attempt.
    Escalate,
}

pub fn assess(ready: bool, progress: &Progress, connected: bool, max_extensions: u32) -> Verdict {
    if ready {
        Verdict::Stale
    } else if progress.any() {
        if progress.extensions < max_extensions {
            Verdict::Extend
        } else {
            Verdict::Escalate
        }
    } else if connected && !progress.rediscovery_attempted {
        Verdict::Rediscover
    } else {
        Verdict::Escalate
    }
}
