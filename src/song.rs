use std::fmt;

use serde::{Deserialize, Serialize};

/// Track metadata relayed to the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Song {
    pub artist: String,
    pub album: String,
    pub title: String,
}

impl Song {
    /// The all-blank sentinel. Never transmitted.
    pub const EMPTY: Song = Song {
        artist: String::new(),
        album: String::new(),
        title: String::new(),
    };

    pub fn new(artist: impl Into<String>, album: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            album: album.into(),
            title: title.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.artist.is_empty() && self.album.is_empty() && self.title.is_empty()
    }

    /// Copy with line breaks in every field replaced by spaces.
    pub fn normalized(&self) -> Song {
        Song {
            artist: flatten(&self.artist),
            album: flatten(&self.album),
            title: flatten(&self.title),
        }
    }
}

impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} ({})", self.artist, self.title, self.album)
    }
}

fn flatten(field: &str) -> String {
    field.replace("\r\n", " ").replace(['\n', '\r'], " ")
}
