//! Outbound song pipeline: coalescing, duplicate suppression, throttling and
//! chunking. Timing is driven by the link, which owns the timers.

use std::time::Duration;

use tokio::time::Instant;

use crate::song::Song;

/// The single coalesced send awaiting the debounce window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub song: Song,
    pub force: bool,
}

/// Outcome of offering a song to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Pending payload updated, the debounce timer must be (re)started.
    Debounce,
    NotReady,
    Duplicate,
    Empty,
}

/// Outcome of a flush attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flush {
    Idle,
    /// Too soon after the last write; retry after the given delay.
    Wait(Duration),
    Write(PendingSend),
}

#[derive(Debug)]
pub struct SendPipeline {
    min_interval: Duration,
    pending: Option<PendingSend>,
    last_sent: Song,
    last_flush: Option<Instant>,
}

impl SendPipeline {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            pending: None,
            last_sent: Song::EMPTY,
            last_flush: None,
        }
    }

    pub fn offer(&mut self, song: Song, force: bool, ready: bool) -> Offer {
        if !ready {
            return Offer::NotReady;
        }
        if song.is_empty() {
            return Offer::Empty;
        }
        if !force && song == self.last_sent {
            return Offer::Duplicate;
        }
        let force = force || self.pending.as_ref().is_some_and(|p| p.force);
        self.pending = Some(PendingSend { song, force });
        Offer::Debounce
    }

    pub fn poll_flush(&mut self, now: Instant) -> Flush {
        if self.pending.is_none() {
            return Flush::Idle;
        }
        // Forced sends are throttled too; force only skips the duplicate check.
        if let Some(last) = self.last_flush {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.min_interval {
                return Flush::Wait(self.min_interval - elapsed);
            }
        }
        self.last_flush = Some(now);
        match self.pending.take() {
            Some(pending) => Flush::Write(pending),
            None => Flush::Idle,
        }
    }

    /// Record a song whose chunks were all issued.
    pub fn complete(&mut self, song: Song) {
        self.last_sent = song;
    }

    pub fn pending(&self) -> Option<&PendingSend> {
        self.pending.as_ref()
    }

    pub fn last_sent(&self) -> &Song {
        &self.last_sent
    }

    /// Drop the pending send. The last sent song is kept for `REQ|SONG`.
    pub fn reset(&mut self) {
        self.pending = None;
    }
}

/// Split a payload into writes of at most `max_len` bytes, in order.
pub fn chunks(payload: &[u8], max_len: usize) -> std::slice::Chunks<'_, u8> {
    payload.chunks(max_len.max(1))
}
