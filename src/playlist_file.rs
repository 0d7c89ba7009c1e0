use crate::error::PlayerError;
use std::fs;
use std::path::{Path, PathBuf};

const M3U_HEADER: &str = "#EXTM3U";

/// One path per line; `#`-prefixed lines are directives or comments and are
/// skipped. Blank lines are tolerated.
pub fn parse(raw: &str) -> Vec<PathBuf> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(PathBuf::from)
        .collect()
}

pub fn render(tracks: &[PathBuf]) -> String {
    let mut out = String::from(M3U_HEADER);
    out.push('\n');
    for track in tracks {
        out.push_str(&track.to_string_lossy());
        out.push('\n');
    }
    out
}

#[derive(Debug)]
pub struct LoadedPlaylist {
    pub tracks: Vec<PathBuf>,
    pub missing: usize,
}

/// Reads a playlist file, silently dropping entries that no longer exist on
/// disk. A count of the dropped entries is returned for the status line.
pub fn load(path: &Path) -> Result<LoadedPlaylist, PlayerError> {
    let raw = fs::read_to_string(path).map_err(|err| PlayerError::PlaylistFile {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    let entries = parse(&raw);
    let total = entries.len();
    let tracks: Vec<PathBuf> = entries.into_iter().filter(|track| track.exists()).collect();
    let missing = total - tracks.len();
    Ok(LoadedPlaylist { tracks, missing })
}

pub fn save(tracks: &[PathBuf], path: &Path) -> Result<(), PlayerError> {
    fs::write(path, render(tracks)).map_err(|err| PlayerError::PlaylistFile {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn parse_skips_comments_and_blanks() {
        let raw = "#EXTM3U\n#EXTINF:123,Something\n/music/a.mp3\n\n  /music/b.mp3  \n";
        let tracks = parse(raw);
        assert_eq!(
            tracks,
            vec![PathBuf::from("/music/a.mp3"), PathBuf::from("/music/b.mp3")]
        );
    }

    #[test]
    fn render_writes_header_and_one_path_per_line() {
        let rendered = render(&[PathBuf::from("/music/a.mp3"), PathBuf::from("/music/b.mp3")]);
        assert_eq!(rendered, "#EXTM3U\n/music/a.mp3\n/music/b.mp3\n");
    }

    #[test]
    fn round_trip_drops_files_deleted_between_save_and_load() {
        let dir = tempdir().expect("tempdir");
        let kept = dir.path().join("kept.mp3");
        let gone = dir.path().join("gone.mp3");
        fs::write(&kept, b"x").expect("write");
        fs::write(&gone, b"x").expect("write");

        let playlist = dir.path().join("list.m3u");
        save(&[kept.clone(), gone.clone()], &playlist).expect("save");
        fs::remove_file(&gone).expect("delete");

        let loaded = load(&playlist).expect("load");
        assert_eq!(loaded.tracks, vec![kept]);
        assert_eq!(loaded.missing, 1);
    }

    #[test]
    fn load_of_missing_file_reports_playlist_error() {
        let dir = tempdir().expect("tempdir");
        let err = load(&dir.path().join("absent.m3u")).expect_err("should fail");
        assert!(matches!(err, PlayerError::PlaylistFile { .. }));
    }
}
