use crate::audio::AudioEngine;
use crate::config;
use crate::error::PlayerError;
use crate::library;
use crate::model::{NowPlaying, PersistedState, PlaybackState, RepeatMode, SortKey};
use crate::playlist_file;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const HISTORY_CAP: usize = 25;
const RESTART_THRESHOLD: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddOutcome {
    pub added: usize,
    pub missing: usize,
    pub duplicates: usize,
}

/// Playlist view controller.
///
/// `master` is the single source of truth. `view` is recomputed wholesale
/// from `(master, search_term, shuffle)` and doubles as the position -> path
/// map; it is never patched in place. The cursor is a position into `view`
/// and gets re-resolved by path whenever the view is rebuilt.
#[derive(Debug)]
pub struct PlayerCore {
    master: Vec<PathBuf>,
    pub view: Vec<PathBuf>,
    pub search_term: String,
    pub shuffle: bool,
    pub repeat_mode: RepeatMode,
    pub playback_state: PlaybackState,
    pub current_index: Option<usize>,
    pub selected: usize,
    pub now_playing: Option<NowPlaying>,
    pub preview: Option<NowPlaying>,
    history: Vec<usize>,
    derived_search: String,
    derived_shuffle: bool,
    shuffle_rng: SmallRng,
    pub dirty: bool,
    pub status: String,
}

impl PlayerCore {
    pub fn from_persisted(state: PersistedState) -> Self {
        let mut master: Vec<PathBuf> = Vec::new();
        let mut missing = 0_usize;
        for path in state.tracks {
            let path = config::normalize_path(&path);
            if !path.exists() {
                missing += 1;
                continue;
            }
            if master.iter().any(|existing| path_eq(existing, &path)) {
                continue;
            }
            master.push(path);
        }

        let mut core = Self {
            master,
            view: Vec::new(),
            search_term: String::new(),
            shuffle: state.shuffle,
            repeat_mode: state.repeat_mode,
            playback_state: PlaybackState::Stopped,
            current_index: None,
            selected: 0,
            now_playing: None,
            preview: None,
            history: Vec::new(),
            derived_search: String::new(),
            derived_shuffle: state.shuffle,
            shuffle_rng: SmallRng::from_os_rng(),
            dirty: true,
            status: String::from("Ready"),
        };
        core.rebuild_view(true);
        if missing > 0 {
            core.set_status(&format!("Restored library ({missing} missing tracks dropped)"));
        }
        core
    }

    pub fn persisted_state(&self, saved_volume: f32) -> PersistedState {
        PersistedState {
            tracks: self.master.clone(),
            shuffle: self.shuffle,
            repeat_mode: self.repeat_mode,
            saved_volume,
        }
    }

    pub fn master(&self) -> &[PathBuf] {
        &self.master
    }

    /// Re-derives `view` from the master list, search term, and shuffle
    /// flag. Skipped when the inputs are unchanged and no mutation forced a
    /// refresh, so an idle recompute never reshuffles.
    pub fn rebuild_view(&mut self, force: bool) {
        if !force && self.search_term == self.derived_search && self.shuffle == self.derived_shuffle
        {
            return;
        }

        let departed = if self.playback_state == PlaybackState::Stopped {
            None
        } else {
            self.now_playing.as_ref().map(|playing| playing.path.clone())
        };

        let needle = self.search_term.to_lowercase();
        let mut view: Vec<PathBuf> = self
            .master
            .iter()
            .filter(|path| {
                needle.is_empty() || library::basename(path).to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        if self.shuffle {
            view.shuffle(&mut self.shuffle_rng);
        }

        self.view = view;
        self.derived_search = self.search_term.clone();
        self.derived_shuffle = self.shuffle;
        self.resolve_cursor(departed);
        self.dirty = true;
    }

    fn resolve_cursor(&mut self, departed: Option<PathBuf>) {
        if let Some(path) = departed {
            match self.position_of(&path) {
                Some(position) => {
                    self.current_index = Some(position);
                    self.selected = position;
                }
                None => {
                    // Audio keeps playing; only the selection desyncs.
                    self.current_index = None;
                    self.selected = self.selected.min(self.view.len().saturating_sub(1));
                    self.set_status("Playing track is no longer in view");
                }
            }
            return;
        }

        self.current_index = None;
        if self.view.is_empty() {
            self.selected = 0;
            self.preview = None;
            return;
        }

        // Idle with a non-empty view: select the first row and preload its
        // metadata for display. Playback does not start.
        self.selected = 0;
        let path = self.view[0].clone();
        self.preview = Some(NowPlaying {
            metadata: library::read_metadata(&path),
            path,
        });
    }

    fn position_of(&self, path: &Path) -> Option<usize> {
        self.view.iter().position(|entry| path_eq(entry, path))
    }

    fn push_history(&mut self, position: usize) {
        if self.history.len() == HISTORY_CAP {
            self.history.remove(0);
        }
        self.history.push(position);
    }

    pub fn play_track_at(
        &mut self,
        audio: &mut dyn AudioEngine,
        position: usize,
    ) -> Result<(), PlayerError> {
        let Some(path) = self.view.get(position).cloned() else {
            // Stale or out-of-range position; never trust it.
            self.stop(audio);
            return Ok(());
        };

        if !path.exists() {
            return Err(PlayerError::MissingFile(path));
        }

        if let (Some(old_position), Some(playing)) = (self.current_index, self.now_playing.as_ref())
            && !path_eq(&playing.path, &path)
        {
            self.push_history(old_position);
        }

        self.current_index = Some(position);
        self.selected = position;
        let metadata = library::read_metadata(&path);
        self.now_playing = Some(NowPlaying {
            path: path.clone(),
            metadata,
        });

        if let Err(err) = audio.play(&path) {
            self.playback_state = PlaybackState::Stopped;
            self.now_playing = None;
            self.dirty = true;
            return Err(PlayerError::EngineFailure {
                path,
                reason: format!("{err:#}"),
            });
        }

        self.playback_state = PlaybackState::Playing;
        self.set_status(&format!("Playing {}", library::basename(&path)));
        Ok(())
    }

    /// `automatic` marks an end-of-track advance; RepeatOne only replays the
    /// same track then, never on a manual skip.
    pub fn advance_to_next(
        &mut self,
        audio: &mut dyn AudioEngine,
        automatic: bool,
    ) -> Result<(), PlayerError> {
        let Some(current) = self.current_index else {
            if self.view.is_empty() {
                return Ok(());
            }
            return self.play_track_at(audio, 0);
        };

        let target = if self.repeat_mode == RepeatMode::RepeatOne && automatic {
            Some(current)
        } else if current + 1 < self.view.len() {
            Some(current + 1)
        } else if self.repeat_mode == RepeatMode::RepeatAll && !self.view.is_empty() {
            Some(0)
        } else {
            None
        };

        match target {
            Some(position) => self.play_track_at(audio, position),
            None => {
                if automatic {
                    self.stop(audio);
                    self.set_status("End of playlist");
                }
                Ok(())
            }
        }
    }

    pub fn go_to_previous(&mut self, audio: &mut dyn AudioEngine) -> Result<(), PlayerError> {
        if self.view.is_empty() {
            self.stop(audio);
            return Ok(());
        }

        // Restart beats going back once the track is a few seconds in.
        if self.playback_state == PlaybackState::Playing
            && audio
                .position()
                .is_some_and(|elapsed| elapsed > RESTART_THRESHOLD)
            && let Some(current) = self.current_index
        {
            return self.play_track_at(audio, current);
        }

        if self.shuffle
            && let Some(candidate) = self.history.pop()
            && candidate < self.view.len()
        {
            return self.play_track_at(audio, candidate);
        }

        let target = match self.current_index {
            Some(current) if current > 0 => current - 1,
            _ if self.repeat_mode == RepeatMode::RepeatAll => self.view.len() - 1,
            _ => 0,
        };
        self.play_track_at(audio, target)
    }

    pub fn toggle_play_pause(&mut self, audio: &mut dyn AudioEngine) -> Result<(), PlayerError> {
        match self.playback_state {
            PlaybackState::Playing => {
                audio.pause();
                self.playback_state = PlaybackState::Paused;
                self.set_status("Paused");
                Ok(())
            }
            PlaybackState::Paused => {
                audio.resume();
                self.playback_state = PlaybackState::Playing;
                self.set_status("Resumed");
                Ok(())
            }
            PlaybackState::Stopped => {
                if self.view.is_empty() {
                    return Ok(());
                }
                let position = self
                    .current_index
                    .unwrap_or_else(|| self.selected.min(self.view.len() - 1));
                self.play_track_at(audio, position)
            }
        }
    }

    pub fn stop(&mut self, audio: &mut dyn AudioEngine) {
        audio.stop();
        self.playback_state = PlaybackState::Stopped;
        self.now_playing = None;
        self.dirty = true;
    }

    pub fn set_search_term(&mut self, term: &str) {
        self.search_term = term.to_string();
        self.rebuild_view(false);
    }

    pub fn toggle_shuffle(&mut self) {
        self.shuffle = !self.shuffle;
        // A reordering invalidates every remembered position.
        self.history.clear();
        self.rebuild_view(true);
        self.set_status(if self.shuffle {
            "Shuffle on"
        } else {
            "Shuffle off"
        });
    }

    pub fn cycle_repeat_mode(&mut self) {
        self.repeat_mode = self.repeat_mode.next();
        self.set_status(&format!("Repeat: {}", self.repeat_mode.label()));
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
        self.set_status(&format!("Repeat: {}", mode.label()));
    }

    pub fn select_next(&mut self) {
        if self.view.is_empty() {
            return;
        }
        self.selected = (self.selected + 1).min(self.view.len() - 1);
        self.dirty = true;
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
        self.dirty = true;
    }

    pub fn selected_path(&self) -> Option<&Path> {
        self.view.get(self.selected).map(PathBuf::as_path)
    }

    pub fn add_paths(&mut self, paths: &[PathBuf]) -> AddOutcome {
        let mut outcome = AddOutcome::default();
        for raw in paths {
            let path = config::normalize_path(raw);
            if !path.exists() {
                outcome.missing += 1;
                continue;
            }
            if self.master.iter().any(|existing| path_eq(existing, &path)) {
                outcome.duplicates += 1;
                continue;
            }
            self.master.push(path);
            outcome.added += 1;
        }

        self.rebuild_view(true);
        let mut summary = format!("Added {} tracks", outcome.added);
        if outcome.missing > 0 {
            summary.push_str(&format!(", {} missing", outcome.missing));
        }
        if outcome.duplicates > 0 {
            summary.push_str(&format!(", {} already present", outcome.duplicates));
        }
        self.set_status(&summary);
        outcome
    }

    pub fn remove_path(&mut self, path: &Path) -> bool {
        let before = self.master.len();
        self.master.retain(|existing| !path_eq(existing, path));
        if self.master.len() == before {
            return false;
        }

        self.rebuild_view(true);
        self.set_status("Removed track");
        true
    }

    pub fn clear(&mut self, audio: &mut dyn AudioEngine) {
        self.stop(audio);
        self.master.clear();
        self.history.clear();
        self.rebuild_view(true);
        self.set_status("Cleared playlist");
    }

    /// Rewrites the master list in sorted order. Tag keys read metadata per
    /// entry; unreadable files sort by their filename and are counted into
    /// the status summary. An explicit ordering always turns shuffle off.
    pub fn sort_by(&mut self, key: SortKey) {
        let mut unreadable = 0_usize;
        let mut keyed: Vec<(String, PathBuf)> = self
            .master
            .iter()
            .map(|path| {
                let sort_value = match key {
                    SortKey::Path => path.to_string_lossy().to_string(),
                    SortKey::Title | SortKey::Artist | SortKey::Album => {
                        match library::read_tags(path) {
                            Ok(metadata) => match key {
                                SortKey::Title => metadata.title,
                                SortKey::Artist => metadata.artist,
                                SortKey::Album => metadata.album,
                                SortKey::Path => unreachable!(),
                            },
                            Err(_) => {
                                unreadable += 1;
                                library::basename(path)
                            }
                        }
                    }
                };
                (sort_value.to_lowercase(), path.clone())
            })
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        self.master = keyed.into_iter().map(|(_, path)| path).collect();

        if self.shuffle {
            self.shuffle = false;
            self.history.clear();
        }
        self.rebuild_view(true);

        let mut summary = format!("Sorted by {}", format!("{key:?}").to_lowercase());
        if unreadable > 0 {
            summary.push_str(&format!(" ({unreadable} unreadable, used filenames)"));
        }
        self.set_status(&summary);
    }

    pub fn load_playlist_file(&mut self, path: &Path) -> Result<(), PlayerError> {
        let loaded = playlist_file::load(path)?;
        let mut master: Vec<PathBuf> = Vec::new();
        for track in &loaded.tracks {
            let track = config::normalize_path(track);
            if !master.iter().any(|existing| path_eq(existing, &track)) {
                master.push(track);
            }
        }
        self.master = master;
        self.history.clear();
        self.rebuild_view(true);

        let mut summary = format!("Loaded {} tracks", self.master.len());
        if loaded.missing > 0 {
            summary.push_str(&format!(" ({} missing skipped)", loaded.missing));
        }
        self.set_status(&summary);
        Ok(())
    }

    pub fn save_playlist_file(&mut self, path: &Path) -> Result<(), PlayerError> {
        playlist_file::save(&self.master, path)?;
        self.set_status(&format!("Saved playlist to {}", path.display()));
        Ok(())
    }

    pub fn set_status(&mut self, message: &str) {
        self.status = message.to_string();
        self.dirty = true;
    }
}

pub fn path_eq(a: &Path, b: &Path) -> bool {
    let a = config::normalize_path(a);
    let b = config::normalize_path(b);
    let mut left = a.components();
    let mut right = b.components();

    loop {
        match (left.next(), right.next()) {
            (Some(l), Some(r)) if path_component_eq(l.as_os_str(), r.as_os_str()) => {}
            (Some(_), Some(_)) => return false,
            (None, None) => return true,
            _ => return false,
        }
    }
}

fn path_component_eq(left: &OsStr, right: &OsStr) -> bool {
    if cfg!(windows) {
        left.to_string_lossy()
            .eq_ignore_ascii_case(right.to_string_lossy().as_ref())
    } else {
        left == right
    }
}
