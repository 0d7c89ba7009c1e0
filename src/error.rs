use std::path::PathBuf;
use thiserror::Error;

/// Errors the controller must distinguish. Per-file failures inside batch
/// operations (folder add, tag sort, playlist load) are counted, not raised;
/// these variants cover single-action failures and the missing-file prompt.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("file no longer exists: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("could not read tags from {}: {reason}", .path.display())]
    UnreadableTag { path: PathBuf, reason: String },

    #[error("audio engine rejected {}: {reason}", .path.display())]
    EngineFailure { path: PathBuf, reason: String },

    #[error("could not read directory {}: {source}", .path.display())]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("playlist file {}: {reason}", .path.display())]
    PlaylistFile { path: PathBuf, reason: String },
}
