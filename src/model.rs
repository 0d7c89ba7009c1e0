use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RepeatMode {
    #[default]
    Off,
    RepeatOne,
    RepeatAll,
}

impl RepeatMode {
    pub fn next(self) -> Self {
        match self {
            Self::Off => Self::RepeatAll,
            Self::RepeatAll => Self::RepeatOne,
            Self::RepeatOne => Self::Off,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::RepeatOne => "one",
            Self::RepeatAll => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Title,
    Artist,
    Album,
    Path,
}

impl SortKey {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "title" => Some(Self::Title),
            "artist" => Some(Self::Artist),
            "album" => Some(Self::Album),
            "path" => Some(Self::Path),
            _ => None,
        }
    }
}

/// Best-effort tag data. Fields are always populated; readers fall back to
/// the filename and "Unknown Artist"/"Unknown Album" when tags are missing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_seconds: u32,
    pub cover_art: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub path: PathBuf,
    pub metadata: TrackMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub tracks: Vec<PathBuf>,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub repeat_mode: RepeatMode,
    #[serde(default = "default_saved_volume")]
    pub saved_volume: f32,
}

fn default_saved_volume() -> f32 {
    0.7
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            tracks: Vec::new(),
            shuffle: false,
            repeat_mode: RepeatMode::Off,
            saved_volume: default_saved_volume(),
        }
    }
}
