use std::time::Duration;

use juicebox::pipeline::{self, Flush, Offer, PendingSend, SendPipeline};
use juicebox::Song;
use proptest::prelude::*;
use tokio::time::Instant;

const INTERVAL: Duration = Duration::from_millis(500);

fn song(title: &str) -> Song {
    Song::new("Artist", "Album", title)
}

#[test]
fn nothing_is_queued_until_ready() {
    let mut pipeline = SendPipeline::new(INTERVAL);
    assert_eq!(pipeline.offer(song("a"), true, false), Offer::NotReady);
    assert!(pipeline.pending().is_none());
}

#[test]
fn empty_song_is_refused_even_when_forced() {
    let mut pipeline = SendPipeline::new(INTERVAL);
    assert_eq!(pipeline.offer(Song::EMPTY, true, true), Offer::Empty);
    assert_eq!(pipeline.poll_flush(Instant::now()), Flush::Idle);
}

#[test]
fn last_offer_wins_and_force_is_sticky() {
    let mut pipeline = SendPipeline::new(INTERVAL);
    assert_eq!(pipeline.offer(song("a"), true, true), Offer::Debounce);
    assert_eq!(pipeline.offer(song("b"), false, true), Offer::Debounce);
    assert_eq!(
        pipeline.poll_flush(Instant::now()),
        Flush::Write(PendingSend {
            song: song("b"),
            force: true
        })
    );
    assert_eq!(pipeline.poll_flush(Instant::now()), Flush::Idle);
}

#[test]
fn duplicate_of_last_sent_is_dropped_unless_forced() {
    let mut pipeline = SendPipeline::new(INTERVAL);
    pipeline.offer(song("a"), false, true);
    let Flush::Write(pending) = pipeline.poll_flush(Instant::now()) else {
        panic!("expected a write");
    };
    pipeline.complete(pending.song);

    assert_eq!(pipeline.offer(song("a"), false, true), Offer::Duplicate);
    assert_eq!(pipeline.offer(song("a"), true, true), Offer::Debounce);
}

#[test]
fn writes_are_spaced_by_the_minimum_interval() {
    let start = Instant::now();
    let mut pipeline = SendPipeline::new(INTERVAL);
    pipeline.offer(song("a"), false, true);
    assert!(matches!(pipeline.poll_flush(start), Flush::Write(_)));

    pipeline.offer(song("b"), true, true);
    let early = start + Duration::from_millis(200);
    assert_eq!(pipeline.poll_flush(early), Flush::Wait(Duration::from_millis(300)));
    // Still pending after the refusal.
    assert_eq!(pipeline.pending().map(|p| p.song.clone()), Some(song("b")));

    let later = start + INTERVAL;
    assert!(matches!(pipeline.poll_flush(later), Flush::Write(_)));
}

#[test]
fn reset_drops_pending_but_remembers_last_sent() {
    let mut pipeline = SendPipeline::new(INTERVAL);
    pipeline.complete(song("a"));
    pipeline.offer(song("b"), false, true);
    pipeline.reset();
    assert!(pipeline.pending().is_none());
    assert_eq!(pipeline.last_sent(), &song("a"));
}

#[test]
fn zero_chunk_length_still_makes_progress() {
    let chunks: Vec<&[u8]> = pipeline::chunks(b"abc", 0).collect();
    assert_eq!(chunks, vec![&b"a"[..], &b"b"[..], &b"c"[..]]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn chunking_covers_payload_in_order(
        payload in proptest::collection::vec(any::<u8>(), 0..600),
        max in 1usize..200,
    ) {
        let chunks: Vec<&[u8]> = pipeline::chunks(&payload, max).collect();
        prop_assert_eq!(chunks.len(), payload.len().div_ceil(max));
        prop_assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= max));
        prop_assert_eq!(chunks.concat(), payload);
    }
}
