use crate::config;
use crate::error::PlayerError;
use crate::model::TrackMetadata;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::picture::PictureType;
use lofty::prelude::Accessor;
use lofty::probe::Probe;
use lofty::tag::Tag;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "ogg", "m4a", "aac", "opus"];

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

pub fn is_audio_file(path: &Path) -> bool {
    let ext = path.extension().and_then(OsStr::to_str).unwrap_or_default();
    AUDIO_EXTENSIONS
        .iter()
        .any(|supported| ext.eq_ignore_ascii_case(supported))
}

/// File name component used for search filtering and fallback titles.
pub fn basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn fallback_title(path: &Path) -> String {
    path.file_stem()
        .and_then(OsStr::to_str)
        .map(ToString::to_string)
        .unwrap_or_else(|| basename(path))
}

#[derive(Debug)]
pub struct FolderScan {
    pub paths: Vec<PathBuf>,
    pub unreadable: usize,
}

/// Walks a folder for audio files. Unreadable sub-entries are counted, not
/// fatal; an unreadable root is.
pub fn scan_folder(root: &Path) -> Result<FolderScan, PlayerError> {
    let mut paths = Vec::new();
    let mut unreadable = 0;

    for entry in WalkDir::new(root).follow_links(true) {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                if entry.file_type().is_file() && is_audio_file(path) {
                    paths.push(config::normalize_path(path));
                }
            }
            Err(err) => {
                if err.depth() == 0 {
                    let source = err
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::other("directory walk failed"));
                    return Err(PlayerError::DirectoryRead {
                        path: root.to_path_buf(),
                        source,
                    });
                }
                unreadable += 1;
            }
        }
    }

    paths.sort_by_cached_key(|path| path.to_string_lossy().to_ascii_lowercase());
    Ok(FolderScan { paths, unreadable })
}

/// Tag extraction that reports failure. Display paths should prefer
/// [`read_metadata`], which never fails.
pub fn read_tags(path: &Path) -> Result<TrackMetadata, PlayerError> {
    let stripped = config::strip_windows_verbatim_prefix(path);
    let tagged = Probe::open(&stripped)
        .and_then(|probe| probe.read())
        .map_err(|err| PlayerError::UnreadableTag {
            path: stripped.clone(),
            reason: err.to_string(),
        })?;

    let duration_seconds = tagged.properties().duration().as_secs() as u32;
    let tag = tagged.primary_tag().or_else(|| tagged.first_tag());

    Ok(TrackMetadata {
        title: tag
            .and_then(|tag| tag.title().map(|title| title.to_string()))
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| fallback_title(&stripped)),
        artist: tag
            .and_then(|tag| tag.artist().map(|artist| artist.to_string()))
            .filter(|artist| !artist.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
        album: tag
            .and_then(|tag| tag.album().map(|album| album.to_string()))
            .filter(|album| !album.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_ALBUM.to_string()),
        duration_seconds,
        cover_art: tag.and_then(front_cover),
    })
}

/// Best-effort metadata: unreadable or untagged files degrade to the
/// filename and unknown-artist/album defaults instead of erroring.
pub fn read_metadata(path: &Path) -> TrackMetadata {
    read_tags(path).unwrap_or_else(|_| TrackMetadata {
        title: fallback_title(path),
        artist: UNKNOWN_ARTIST.to_string(),
        album: UNKNOWN_ALBUM.to_string(),
        duration_seconds: 0,
        cover_art: None,
    })
}

fn front_cover(tag: &Tag) -> Option<Vec<u8>> {
    let pictures = tag.pictures();
    pictures
        .iter()
        .find(|picture| picture.pic_type() == PictureType::CoverFront)
        .or_else(|| pictures.first())
        .map(|picture| picture.data().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn audio_extension_check_is_case_insensitive() {
        assert!(is_audio_file(Path::new("song.MP3")));
        assert!(is_audio_file(Path::new("song.flac")));
        assert!(!is_audio_file(Path::new("notes.txt")));
        assert!(!is_audio_file(Path::new("noextension")));
    }

    #[test]
    fn unreadable_file_degrades_to_filename_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("My Song.mp3");
        fs::write(&path, b"not really audio").expect("write fixture");

        let metadata = read_metadata(&path);
        assert_eq!(metadata.title, "My Song");
        assert_eq!(metadata.artist, UNKNOWN_ARTIST);
        assert_eq!(metadata.album, UNKNOWN_ALBUM);
        assert_eq!(metadata.duration_seconds, 0);
        assert!(metadata.cover_art.is_none());
    }

    #[test]
    fn scan_collects_only_audio_files_sorted() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("b.mp3"), b"x").expect("write");
        fs::write(dir.path().join("A.flac"), b"x").expect("write");
        fs::write(dir.path().join("cover.png"), b"x").expect("write");

        let scan = scan_folder(dir.path()).expect("scan");
        let names: Vec<String> = scan.paths.iter().map(|path| basename(path)).collect();
        assert_eq!(names, vec!["A.flac", "b.mp3"]);
        assert_eq!(scan.unreadable, 0);
    }

    #[test]
    fn scan_of_missing_root_reports_directory_error() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("nope");
        let err = scan_folder(&missing).expect_err("should fail");
        assert!(matches!(err, PlayerError::DirectoryRead { .. }));
    }
}
