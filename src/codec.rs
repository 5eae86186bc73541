//! Line-oriented wire format spoken over the UART characteristics.
//!
//! Outbound: `SONG|<artist>|<album>|<title>\n`. Inbound: `ACK` or `REQ|SONG`.
//! The field delimiter is not escaped; a `|` inside a field shifts the
//! fields seen by the remote. This is a known limit of the protocol and is
//! kept for wire compatibility.

use crate::song::Song;

pub const SONG_TAG: &str = "SONG";
pub const ACK: &str = "ACK";
pub const REQUEST_SONG: &str = "REQ|SONG";
pub const DELIMITER: char = '|';
pub const TERMINATOR: u8 = b'\n';

/// Control messages sent by the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    Ack,
    RequestSong,
    /// Anything else, kept for logging only.
    Unknown(String),
}

/// Encode a song as one newline-terminated wire line.
pub fn encode(song: &Song) -> Vec<u8> {
    let song = song.normalized();
    let mut line = format!(
        "{SONG_TAG}{DELIMITER}{}{DELIMITER}{}{DELIMITER}{}",
        song.artist, song.album, song.title
    )
    .into_bytes();
    line.push(TERMINATOR);
    line
}

/// Classify an inbound notification. Never fails.
pub fn decode(bytes: &[u8]) -> ControlMessage {
    let text = String::from_utf8_lossy(bytes);
    match text.trim() {
        ACK => ControlMessage::Ack,
        REQUEST_SONG => ControlMessage::RequestSong,
        other => ControlMessage::Unknown(other.to_owned()),
    }
}

/// Parse a `SONG|…` line the way the remote does: split on the first
/// three delimiters after the tag, the title keeps any remainder.
pub fn parse_song(line: &[u8]) -> Option<Song> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim_end_matches(['\r', '\n']);
    let mut fields = text.splitn(4, DELIMITER);
    if fields.next()? != SONG_TAG {
        return None;
    }
    let artist = fields.next()?;
    let album = fields.next()?;
    let title = fields.next()?;
    Some(Song::new(artist, album, title))
}
