use crate::audio::{AudioEngine, NullAudioEngine, RodioAudioEngine};
use crate::config;
use crate::core::PlayerCore;
use crate::error::PlayerError;
use crate::library::{self, FolderScan};
use crate::model::SortKey;
use crate::ui::{self, CoverArt, InputPrompt};
use anyhow::Result;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
    MouseEvent, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io::stdout;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

const TICK_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Default)]
pub struct StartupOptions {
    pub playlist: Option<PathBuf>,
    pub add: Vec<PathBuf>,
}

enum InputMode {
    Normal,
    Search,
    Command,
    Confirm(PendingConfirm),
}

enum PendingConfirm {
    RemoveMissing(PathBuf),
    RemoveSelected(PathBuf),
    Clear,
}

enum ScanEvent {
    Finished { root: PathBuf, scan: FolderScan },
    Failed { error: PlayerError },
}

pub fn run(options: StartupOptions) -> Result<()> {
    let state = config::load_state()?;
    let mut core = PlayerCore::from_persisted(state.clone());

    let mut audio: Box<dyn AudioEngine> = match RodioAudioEngine::new() {
        Ok(engine) => Box::new(engine),
        Err(_) => {
            core.set_status("No audio device; running silent");
            Box::new(NullAudioEngine::new())
        }
    };
    audio.set_volume(state.saved_volume);

    let (scan_tx, scan_rx) = mpsc::channel::<ScanEvent>();

    if let Some(playlist) = &options.playlist
        && let Err(err) = core.load_playlist_file(playlist)
    {
        core.set_status(&format!("playlist error: {err}"));
    }
    for path in &options.add {
        queue_add(&mut core, &scan_tx, path);
    }

    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(out);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let mut input_mode = InputMode::Normal;
    let mut input_buffer = String::new();
    let mut cover = CoverArt::default();
    let mut last_tick = Instant::now();
    let mut playlist_rect = ratatui::prelude::Rect::default();

    let result: Result<()> = loop {
        drain_scan_events(&mut core, &scan_rx);
        maybe_auto_advance_track(&mut core, &mut *audio, &mut input_mode);

        if core.dirty || last_tick.elapsed() > TICK_INTERVAL {
            cover.update(core.now_playing.as_ref().or(core.preview.as_ref()));
            let prompt = match &input_mode {
                InputMode::Normal => InputPrompt::None,
                InputMode::Search => InputPrompt::Search(&input_buffer),
                InputMode::Command => InputPrompt::Command(&input_buffer),
                InputMode::Confirm(pending) => InputPrompt::Confirm(confirm_question(pending)),
            };
            terminal.draw(|frame| {
                playlist_rect = ui::playlist_rect(frame.area());
                ui::draw(frame, &core, &*audio, &cover, &prompt)
            })?;
            core.dirty = false;
            last_tick = Instant::now();
        }

        if !event::poll(Duration::from_millis(33))? {
            continue;
        }

        let event = event::read()?;
        if let Event::Mouse(mouse) = event {
            handle_mouse(&mut core, mouse, playlist_rect);
            continue;
        }

        let Event::Key(key) = event else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match &input_mode {
            InputMode::Confirm(_) => {
                let InputMode::Confirm(pending) =
                    std::mem::replace(&mut input_mode, InputMode::Normal)
                else {
                    continue;
                };
                handle_confirm(&mut core, &mut *audio, pending, key.code);
            }
            InputMode::Search => match key.code {
                KeyCode::Esc => {
                    input_buffer.clear();
                    core.set_search_term("");
                    input_mode = InputMode::Normal;
                }
                KeyCode::Enter => {
                    input_mode = InputMode::Normal;
                    core.dirty = true;
                }
                KeyCode::Backspace => {
                    input_buffer.pop();
                    core.set_search_term(&input_buffer);
                }
                KeyCode::Char(ch) => {
                    input_buffer.push(ch);
                    core.set_search_term(&input_buffer);
                }
                _ => {}
            },
            InputMode::Command => match key.code {
                KeyCode::Esc => {
                    input_buffer.clear();
                    input_mode = InputMode::Normal;
                    core.dirty = true;
                }
                KeyCode::Enter => {
                    let command = std::mem::take(&mut input_buffer);
                    input_mode = InputMode::Normal;
                    run_command(&mut core, &scan_tx, &mut input_mode, &command);
                }
                KeyCode::Backspace => {
                    input_buffer.pop();
                    core.dirty = true;
                }
                KeyCode::Char(ch) => {
                    input_buffer.push(ch);
                    core.dirty = true;
                }
                _ => {}
            },
            InputMode::Normal => match key.code {
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    break Ok(());
                }
                KeyCode::Char('q') => break Ok(()),
                KeyCode::Down => core.select_next(),
                KeyCode::Up => core.select_prev(),
                KeyCode::Enter => {
                    let target = core.selected;
                    let outcome = core.play_track_at(&mut *audio, target);
                    report_play_outcome(&mut core, &mut input_mode, outcome);
                }
                KeyCode::Char(' ') => {
                    let outcome = core.toggle_play_pause(&mut *audio);
                    report_play_outcome(&mut core, &mut input_mode, outcome);
                }
                KeyCode::Char('n') => {
                    let outcome = core.advance_to_next(&mut *audio, false);
                    report_play_outcome(&mut core, &mut input_mode, outcome);
                }
                KeyCode::Char('b') | KeyCode::Char('p') => {
                    let outcome = core.go_to_previous(&mut *audio);
                    report_play_outcome(&mut core, &mut input_mode, outcome);
                }
                KeyCode::Char('x') => core.stop(&mut *audio),
                KeyCode::Char('h') => core.toggle_shuffle(),
                KeyCode::Char('r') => core.cycle_repeat_mode(),
                KeyCode::Char('/') => {
                    input_buffer = core.search_term.clone();
                    input_mode = InputMode::Search;
                    core.dirty = true;
                }
                KeyCode::Char(':') => {
                    input_buffer.clear();
                    input_mode = InputMode::Command;
                    core.dirty = true;
                }
                KeyCode::Char('d') => {
                    if let Some(path) = core.selected_path() {
                        input_mode =
                            InputMode::Confirm(PendingConfirm::RemoveSelected(path.to_path_buf()));
                        core.dirty = true;
                    }
                }
                KeyCode::Char('+') | KeyCode::Char('=') => {
                    adjust_volume(&mut core, &mut *audio, 0.05);
                }
                KeyCode::Char('-') => {
                    adjust_volume(&mut core, &mut *audio, -0.05);
                }
                KeyCode::Char('s') => {
                    if let Err(err) = config::save_state(&core.persisted_state(audio.volume())) {
                        core.set_status(&format!("save error: {err:#}"));
                    } else {
                        core.set_status("State saved");
                    }
                }
                _ => {}
            },
        }
    };

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    let save_result = config::save_state(&core.persisted_state(audio.volume()));
    result?;
    save_result?;
    Ok(())
}

fn maybe_auto_advance_track(
    core: &mut PlayerCore,
    audio: &mut dyn AudioEngine,
    input_mode: &mut InputMode,
) {
    if audio.current_track().is_none() || audio.is_paused() || !audio.is_finished() {
        return;
    }

    let outcome = core.advance_to_next(audio, true);
    report_play_outcome(core, input_mode, outcome);
}

fn report_play_outcome(
    core: &mut PlayerCore,
    input_mode: &mut InputMode,
    outcome: Result<(), PlayerError>,
) {
    match outcome {
        Ok(()) => {}
        Err(PlayerError::MissingFile(path)) => {
            core.set_status(&format!("Missing file: {}", library::basename(&path)));
            *input_mode = InputMode::Confirm(PendingConfirm::RemoveMissing(path));
        }
        Err(err) => core.set_status(&format!("playback error: {err}")),
    }
}

fn confirm_question(pending: &PendingConfirm) -> &'static str {
    match pending {
        PendingConfirm::RemoveMissing(_) => "File is missing on disk. Remove from playlist?",
        PendingConfirm::RemoveSelected(_) => "Remove selected track from playlist?",
        PendingConfirm::Clear => "Remove all tracks from playlist?",
    }
}

fn handle_confirm(
    core: &mut PlayerCore,
    audio: &mut dyn AudioEngine,
    pending: PendingConfirm,
    code: KeyCode,
) {
    let accepted = matches!(code, KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter);

    match pending {
        PendingConfirm::RemoveMissing(path) => {
            if accepted {
                core.remove_path(&path);
            } else {
                // Entry stays; the aborted play leaves nothing to resume.
                core.stop(audio);
                core.set_status("Kept; playback stopped");
            }
        }
        PendingConfirm::RemoveSelected(path) => {
            if accepted {
                core.remove_path(&path);
            } else {
                core.set_status("Kept");
            }
        }
        PendingConfirm::Clear => {
            if accepted {
                core.clear(audio);
            } else {
                core.set_status("Kept");
            }
        }
    }
}

fn adjust_volume(core: &mut PlayerCore, audio: &mut dyn AudioEngine, delta: f32) {
    let next = (audio.volume() + delta).clamp(0.0, 1.0);
    audio.set_volume(next);
    core.set_status(&format!("Volume: {}%", (next * 100.0).round() as u16));
}

fn handle_mouse(core: &mut PlayerCore, mouse: MouseEvent, playlist_rect: ratatui::prelude::Rect) {
    let inside_playlist = point_in_rect(mouse.column, mouse.row, playlist_rect);
    match mouse.kind {
        MouseEventKind::ScrollDown if inside_playlist => core.select_next(),
        MouseEventKind::ScrollUp if inside_playlist => core.select_prev(),
        _ => {}
    }
}

fn point_in_rect(x: u16, y: u16, rect: ratatui::prelude::Rect) -> bool {
    if rect.width == 0 || rect.height == 0 {
        return false;
    }
    x >= rect.x
        && x < rect.x.saturating_add(rect.width)
        && y >= rect.y
        && y < rect.y.saturating_add(rect.height)
}

/// Files are added synchronously; folders are walked off-thread so a large
/// library never blocks the draw loop.
fn queue_add(core: &mut PlayerCore, scan_tx: &mpsc::Sender<ScanEvent>, path: &Path) {
    if path.is_dir() {
        let root = path.to_path_buf();
        let tx = scan_tx.clone();
        thread::spawn(move || {
            let event = match library::scan_folder(&root) {
                Ok(scan) => ScanEvent::Finished { root, scan },
                Err(error) => ScanEvent::Failed { error },
            };
            let _ = tx.send(event);
        });
        core.set_status(&format!("Scanning {}", path.display()));
        return;
    }

    if !library::is_audio_file(path) {
        core.set_status(&format!("Not an audio file: {}", path.display()));
        return;
    }
    core.add_paths(std::slice::from_ref(&path.to_path_buf()));
}

fn drain_scan_events(core: &mut PlayerCore, scan_rx: &mpsc::Receiver<ScanEvent>) {
    while let Ok(event) = scan_rx.try_recv() {
        match event {
            ScanEvent::Finished { root, scan } => {
                if scan.paths.is_empty() {
                    core.set_status(&format!("No audio files under {}", root.display()));
                    continue;
                }
                let outcome = core.add_paths(&scan.paths);
                let mut summary = format!("Scanned {}: {} added", root.display(), outcome.added);
                if scan.unreadable > 0 {
                    summary.push_str(&format!(", {} unreadable entries", scan.unreadable));
                }
                core.set_status(&summary);
            }
            ScanEvent::Failed { error } => {
                core.set_status(&format!("scan error: {error}"));
            }
        }
    }
}

fn run_command(
    core: &mut PlayerCore,
    scan_tx: &mpsc::Sender<ScanEvent>,
    input_mode: &mut InputMode,
    raw: &str,
) {
    let input = raw.trim();
    if input.is_empty() {
        core.set_status("No command");
        return;
    }

    let mut command_split = input.splitn(2, char::is_whitespace);
    let command = command_split.next().unwrap_or_default();
    let rest = command_split.next().unwrap_or("").trim();

    match command {
        "help" => {
            core.set_status(
                "Commands: add <path> | load <file.m3u> | save <file.m3u> | sort <title|artist|album|path> | clear",
            );
        }
        "add" => {
            if rest.is_empty() {
                core.set_status("Usage: add <path>");
            } else {
                queue_add(core, scan_tx, &PathBuf::from(rest));
            }
        }
        "load" => {
            if rest.is_empty() {
                core.set_status("Usage: load <file.m3u>");
            } else if let Err(err) = core.load_playlist_file(&PathBuf::from(rest)) {
                core.set_status(&format!("load error: {err}"));
            }
        }
        "save" => {
            if rest.is_empty() {
                core.set_status("Usage: save <file.m3u>");
            } else if let Err(err) = core.save_playlist_file(&PathBuf::from(rest)) {
                core.set_status(&format!("save error: {err}"));
            }
        }
        "sort" => match SortKey::parse(rest) {
            Some(key) => core.sort_by(key),
            None => core.set_status("Usage: sort <title|artist|album|path>"),
        },
        "clear" => {
            if core.master().is_empty() {
                core.set_status("Playlist is already empty");
            } else {
                *input_mode = InputMode::Confirm(PendingConfirm::Clear);
                core.dirty = true;
            }
        }
        _ => {
            core.set_status("Unknown command. Use :help");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PersistedState, PlaybackState};
    use std::fs;
    use tempfile::{TempDir, tempdir};

    struct TestAudioEngine {
        paused: bool,
        current: Option<PathBuf>,
        finished: bool,
        played: Vec<PathBuf>,
        stopped: bool,
    }

    impl TestAudioEngine {
        fn idle() -> Self {
            Self {
                paused: false,
                current: None,
                finished: false,
                played: Vec::new(),
                stopped: false,
            }
        }
    }

    impl AudioEngine for TestAudioEngine {
        fn play(&mut self, path: &Path) -> Result<()> {
            self.current = Some(path.to_path_buf());
            self.finished = false;
            self.played.push(path.to_path_buf());
            Ok(())
        }

        fn pause(&mut self) {
            self.paused = true;
        }

        fn resume(&mut self) {
            self.paused = false;
        }

        fn stop(&mut self) {
            self.stopped = true;
            self.current = None;
            self.finished = false;
        }

        fn is_paused(&self) -> bool {
            self.paused
        }

        fn current_track(&self) -> Option<&Path> {
            self.current.as_deref()
        }

        fn position(&self) -> Option<Duration> {
            None
        }

        fn duration(&self) -> Option<Duration> {
            None
        }

        fn volume(&self) -> f32 {
            1.0
        }

        fn set_volume(&mut self, _volume: f32) {}

        fn is_finished(&self) -> bool {
            self.finished
        }
    }

    fn core_with(names: &[&str]) -> (TempDir, PlayerCore) {
        let dir = tempdir().expect("tempdir");
        let paths: Vec<PathBuf> = names
            .iter()
            .map(|name| {
                let path = dir.path().join(name);
                fs::write(&path, b"\0").expect("fixture write");
                path
            })
            .collect();
        let mut core = PlayerCore::from_persisted(PersistedState::default());
        core.add_paths(&paths);
        (dir, core)
    }

    #[test]
    fn unknown_command_is_reported() {
        let (_dir, mut core) = core_with(&["a.mp3"]);
        let (tx, _rx) = mpsc::channel();
        let mut mode = InputMode::Normal;

        run_command(&mut core, &tx, &mut mode, "wat");
        assert!(core.status.contains("Unknown command"));
    }

    #[test]
    fn sort_command_rejects_unknown_keys() {
        let (_dir, mut core) = core_with(&["a.mp3"]);
        let (tx, _rx) = mpsc::channel();
        let mut mode = InputMode::Normal;

        run_command(&mut core, &tx, &mut mode, "sort loudness");
        assert!(core.status.contains("Usage: sort"));
    }

    #[test]
    fn auto_advance_plays_next_track_when_finished() {
        let (_dir, mut core) = core_with(&["a.mp3", "b.mp3"]);
        let mut audio = TestAudioEngine::idle();
        let mut mode = InputMode::Normal;

        core.play_track_at(&mut audio, 0).expect("play");
        audio.finished = true;
        maybe_auto_advance_track(&mut core, &mut audio, &mut mode);

        assert_eq!(core.current_index, Some(1));
        assert_eq!(audio.played.len(), 2);
    }

    #[test]
    fn auto_advance_stops_at_playlist_end() {
        let (_dir, mut core) = core_with(&["a.mp3"]);
        let mut audio = TestAudioEngine::idle();
        let mut mode = InputMode::Normal;

        core.play_track_at(&mut audio, 0).expect("play");
        audio.finished = true;
        maybe_auto_advance_track(&mut core, &mut audio, &mut mode);

        assert!(audio.stopped);
        assert_eq!(core.playback_state, PlaybackState::Stopped);
        assert_eq!(core.status, "End of playlist");
    }

    #[test]
    fn auto_advance_ignores_paused_playback() {
        let (_dir, mut core) = core_with(&["a.mp3", "b.mp3"]);
        let mut audio = TestAudioEngine::idle();
        let mut mode = InputMode::Normal;

        core.play_track_at(&mut audio, 0).expect("play");
        audio.finished = true;
        audio.paused = true;
        maybe_auto_advance_track(&mut core, &mut audio, &mut mode);

        assert_eq!(core.current_index, Some(0));
        assert_eq!(audio.played.len(), 1);
    }

    #[test]
    fn missing_file_play_prompts_for_removal() {
        let (dir, mut core) = core_with(&["a.mp3", "b.mp3"]);
        fs::remove_file(dir.path().join("b.mp3")).expect("delete");
        let mut audio = TestAudioEngine::idle();
        let mut mode = InputMode::Normal;

        let outcome = core.play_track_at(&mut audio, 1);
        report_play_outcome(&mut core, &mut mode, outcome);

        assert!(matches!(
            mode,
            InputMode::Confirm(PendingConfirm::RemoveMissing(_))
        ));
        assert!(core.status.contains("Missing file"));
    }

    #[test]
    fn declining_missing_file_removal_keeps_the_entry() {
        let (dir, mut core) = core_with(&["a.mp3", "b.mp3"]);
        fs::remove_file(dir.path().join("b.mp3")).expect("delete");
        let mut audio = TestAudioEngine::idle();

        let missing = dir.path().join("b.mp3");
        handle_confirm(
            &mut core,
            &mut audio,
            PendingConfirm::RemoveMissing(missing),
            KeyCode::Char('n'),
        );

        assert_eq!(core.master().len(), 2);
        assert_eq!(core.playback_state, PlaybackState::Stopped);
        assert!(core.status.contains("Kept"));
    }

    #[test]
    fn accepting_missing_file_removal_drops_the_entry() {
        let (dir, mut core) = core_with(&["a.mp3", "b.mp3"]);
        let missing = dir.path().join("b.mp3");
        fs::remove_file(&missing).expect("delete");
        let mut audio = TestAudioEngine::idle();

        handle_confirm(
            &mut core,
            &mut audio,
            PendingConfirm::RemoveMissing(missing),
            KeyCode::Char('y'),
        );

        assert_eq!(core.master().len(), 1);
    }

    #[test]
    fn scan_events_feed_results_into_the_playlist() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("x.mp3"), b"\0").expect("write");
        let mut core = PlayerCore::from_persisted(PersistedState::default());
        let (tx, rx) = mpsc::channel();

        queue_add(&mut core, &tx, dir.path());
        // The scan thread owns the sender clone; wait for its result.
        let event = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("scan result");
        tx.send(event).expect("requeue");
        drain_scan_events(&mut core, &rx);

        assert_eq!(core.master().len(), 1);
        assert!(core.status.contains("added"));
    }
}
