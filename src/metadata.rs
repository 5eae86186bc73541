//! Now-playing metadata feeding the session.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::session::SessionHandle;
use crate::song::Song;

#[async_trait::async_trait]
pub trait MetadataSource: Send {
    /// The song currently playing. `Ok(None)` when nothing plays or the
    /// player declined to answer; `Err` when the source is unavailable.
    async fn now_playing(&mut self) -> anyhow::Result<Option<Song>>;
}

/// Plays back a fixed list, advancing one song per poll and then holding
/// the last one.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    queue: VecDeque<Song>,
    current: Option<Song>,
}

impl ScriptedSource {
    pub fn new(songs: impl IntoIterator<Item = Song>) -> Self {
        Self {
            queue: songs.into_iter().collect(),
            current: None,
        }
    }
}

#[async_trait::async_trait]
impl MetadataSource for ScriptedSource {
    async fn now_playing(&mut self) -> anyhow::Result<Option<Song>> {
        if let Some(next) = self.queue.pop_front() {
            self.current = Some(next);
        }
        Ok(self.current.clone())
    }
}

const ARTIST_KEYS: &[&str] = &[
    "artist",
    "kMRMediaRemoteNowPlayingInfoArtist",
    "MPMediaItemPropertyArtist",
    "albumArtist",
];
const ALBUM_KEYS: &[&str] = &[
    "album",
    "kMRMediaRemoteNowPlayingInfoAlbum",
    "MPMediaItemPropertyAlbumTitle",
    "albumTitle",
];
const TITLE_KEYS: &[&str] = &[
    "title",
    "kMRMediaRemoteNowPlayingInfoTitle",
    "MPMediaItemPropertyTitle",
    "name",
];

/// Pull a song out of a loosely keyed now-playing dictionary.
///
/// Known keys are tried in order; failing that, the shortest remaining key
/// mentioning the field wins.
pub fn extract_song(info: &HashMap<String, String>) -> Song {
    Song::new(
        field(info, ARTIST_KEYS, "artist"),
        field(info, ALBUM_KEYS, "album"),
        field(info, TITLE_KEYS, "title"),
    )
}

fn field(info: &HashMap<String, String>, keys: &[&str], hint: &str) -> String {
    keys.iter()
        .filter_map(|key| info.get(*key))
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .or_else(|| best_match(info, hint))
        .unwrap_or_default()
        .to_owned()
}

fn best_match<'a>(info: &'a HashMap<String, String>, hint: &str) -> Option<&'a str> {
    info.iter()
        .filter(|(key, value)| key.to_lowercase().contains(hint) && !value.trim().is_empty())
        .min_by_key(|(key, _)| (key.len(), key.as_str()))
        .map(|(_, value)| value.trim())
}

/// Poll `source` and hand each changed song to the session. Every time the
/// remote becomes ready the current song is pushed again with `force`.
/// After an empty or failed read, polls pause for `backoff`. Returns once
/// the session has stopped.
pub async fn relay<S: MetadataSource>(
    mut source: S,
    session: SessionHandle,
    poll: Duration,
    backoff: Duration,
) {
    let mut ticker = interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut status = session.subscribe();
    let mut connected = false;
    let mut ready_epoch = None;
    let mut current = Song::EMPTY;
    let mut resume_at: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if resume_at.is_some_and(|at| Instant::now() < at) {
                    continue;
                }
                match source.now_playing().await {
                    Ok(Some(song)) if !song.is_empty() => {
                        resume_at = None;
                        if song != current {
                            debug!("now playing {song}");
                            current = song.clone();
                            if connected {
                                session.send(song, false);
                            }
                        }
                    }
                    Ok(_) => {
                        trace!("nothing playing, backing off for {backoff:?}");
                        resume_at = Some(Instant::now() + backoff);
                    }
                    Err(e) => {
                        warn!("metadata source unavailable: {e}");
                        resume_at = Some(Instant::now() + backoff);
                    }
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    debug!("session stopped, ending metadata relay");
                    return;
                }
                let (ready, epoch) = {
                    let snapshot = status.borrow_and_update();
                    (snapshot.is_connected, snapshot.epoch)
                };
                connected = ready;
                if ready && ready_epoch != Some(epoch) {
                    ready_epoch = Some(epoch);
                    if !current.is_empty() {
                        info!("remote ready, sending {current}");
                        session.send(current.clone(), true);
                    }
                }
            }
        }
    }
}
