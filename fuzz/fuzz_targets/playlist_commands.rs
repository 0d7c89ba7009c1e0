#![no_main]

use libfuzzer_sys::fuzz_target;
use minipod::audio::NullAudioEngine;
use minipod::core::PlayerCore;
use minipod::model::{PersistedState, SortKey};
use std::path::PathBuf;
use std::sync::OnceLock;

static FIXTURES: OnceLock<Vec<PathBuf>> = OnceLock::new();

fn fixtures() -> &'static [PathBuf] {
    FIXTURES.get_or_init(|| {
        let root = std::env::temp_dir().join("minipod-fuzz-fixtures");
        let _ = std::fs::create_dir_all(&root);
        (0..8)
            .map(|idx| {
                let path = root.join(format!("track_{idx}.mp3"));
                let _ = std::fs::write(&path, b"\0");
                path
            })
            .collect()
    })
}

fuzz_target!(|data: &[u8]| {
    let mut core = PlayerCore::from_persisted(PersistedState::default());
    let mut audio = NullAudioEngine::new();
    core.add_paths(fixtures());

    for byte in data {
        match byte % 11 {
            0 => {
                let _ = core.play_track_at(&mut audio, usize::from(byte / 11));
            }
            1 => {
                let _ = core.advance_to_next(&mut audio, true);
            }
            2 => {
                let _ = core.advance_to_next(&mut audio, false);
            }
            3 => {
                let _ = core.go_to_previous(&mut audio);
            }
            4 => core.toggle_shuffle(),
            5 => core.cycle_repeat_mode(),
            6 => core.set_search_term("track"),
            7 => core.set_search_term(&format!("{byte}")),
            8 => core.set_search_term(""),
            9 => core.sort_by(SortKey::Path),
            _ => {
                let _ = core.toggle_play_pause(&mut audio);
            }
        }

        if let Some(index) = core.current_index {
            assert!(index < core.view.len());
        }
        assert!(core.view.len() <= core.master().len());
        if !core.view.is_empty() {
            assert!(core.selected < core.view.len());
        }
    }
});
