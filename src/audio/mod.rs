use anyhow::{Context, Result};
use rodio::Source;
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
#[cfg(unix)]
use std::ffi::CString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::time::Instant;

const MAX_VOLUME: f32 = 1.0;

/// Playback backend seam. The controller drives this; the tick loop polls
/// `is_finished` for the end-of-track signal.
pub trait AudioEngine {
    fn play(&mut self, path: &Path) -> Result<()>;
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
    fn is_paused(&self) -> bool;
    fn current_track(&self) -> Option<&Path>;
    fn position(&self) -> Option<Duration>;
    fn duration(&self) -> Option<Duration>;
    fn volume(&self) -> f32;
    fn set_volume(&mut self, volume: f32);
    fn is_finished(&self) -> bool;
}

pub struct RodioAudioEngine {
    stream: OutputStream,
    sink: Sink,
    current: Option<PathBuf>,
    track_duration: Option<Duration>,
    volume: f32,
}

impl RodioAudioEngine {
    pub fn new() -> Result<Self> {
        let (stream, sink) = Self::open_output_stream()?;

        Ok(Self {
            stream,
            sink,
            current: None,
            track_duration: None,
            volume: 0.7,
        })
    }

    fn open_output_stream() -> Result<(OutputStream, Sink)> {
        let mut stream = with_silenced_stderr(|| {
            match OutputStreamBuilder::from_default_device()
                .context("failed to open default system output stream")
                .and_then(|builder| {
                    builder
                        .with_error_callback(|_| {})
                        .open_stream_or_fallback()
                        .context("failed to start default output stream")
                }) {
                Ok(stream) => Ok(stream),
                Err(default_err) => {
                    let host = rodio::cpal::default_host();
                    let mut candidates: Vec<String> = host
                        .output_devices()
                        .ok()
                        .into_iter()
                        .flatten()
                        .filter_map(|device| device.name().ok())
                        .collect();
                    candidates.sort_by_cached_key(|name| {
                        let lower = name.to_ascii_lowercase();
                        let rank = if lower.contains("pulse") {
                            0_u8
                        } else if lower.contains("pipewire") {
                            1_u8
                        } else if lower.contains("default") {
                            2_u8
                        } else {
                            3_u8
                        };
                        (rank, lower)
                    });
                    candidates.dedup();

                    let mut started: Option<OutputStream> = None;
                    for candidate in candidates {
                        let device = match host
                            .output_devices()
                            .ok()
                            .into_iter()
                            .flatten()
                            .find(|entry| entry.name().ok().as_deref() == Some(candidate.as_str()))
                        {
                            Some(device) => device,
                            None => continue,
                        };
                        let opened = OutputStreamBuilder::from_device(device)
                            .context("failed to open fallback output device")
                            .and_then(|builder| {
                                builder
                                    .with_error_callback(|_| {})
                                    .open_stream_or_fallback()
                                    .context("failed to start fallback output stream")
                            });
                        if let Ok(stream) = opened {
                            started = Some(stream);
                            break;
                        }
                    }

                    started.with_context(|| {
                        format!(
                            "unable to start any audio output stream after default failed: {default_err:#}"
                        )
                    })
                }
            }
        })?;
        stream.log_on_drop(false);
        let sink = Sink::connect_new(stream.mixer());
        Ok((stream, sink))
    }
}

impl AudioEngine for RodioAudioEngine {
    fn play(&mut self, path: &Path) -> Result<()> {
        self.sink.stop();
        self.sink = Sink::connect_new(self.stream.mixer());

        let file =
            File::open(path).with_context(|| format!("failed to open track {}", path.display()))?;
        let source = Decoder::try_from(file)
            .with_context(|| format!("failed to decode {}", path.display()))?;
        self.track_duration = source.total_duration();
        self.sink.append(source);
        self.sink.set_volume(self.volume);
        self.current = Some(path.to_path_buf());
        Ok(())
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn resume(&mut self) {
        self.sink.play();
    }

    fn stop(&mut self) {
        self.sink.stop();
        self.current = None;
        self.track_duration = None;
    }

    fn is_paused(&self) -> bool {
        self.sink.is_paused()
    }

    fn current_track(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    fn position(&self) -> Option<Duration> {
        self.current.as_ref()?;
        Some(self.sink.get_pos())
    }

    fn duration(&self) -> Option<Duration> {
        self.track_duration
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, MAX_VOLUME);
        self.sink.set_volume(self.volume);
    }

    fn is_finished(&self) -> bool {
        self.current.is_some() && !self.sink.is_paused() && self.sink.empty()
    }
}

#[cfg(unix)]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    let saved = unsafe { libc::dup(libc::STDERR_FILENO) };
    if saved < 0 {
        return operation();
    }

    let devnull = CString::new("/dev/null")
        .ok()
        .map(|path| unsafe { libc::open(path.as_ptr(), libc::O_WRONLY) })
        .unwrap_or(-1);

    if devnull >= 0 {
        unsafe {
            libc::dup2(devnull, libc::STDERR_FILENO);
            libc::close(devnull);
        }
    }

    let result = operation();

    unsafe {
        libc::dup2(saved, libc::STDERR_FILENO);
        libc::close(saved);
    }

    result
}

#[cfg(not(unix))]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    operation()
}

/// Headless fallback used when no output device exists, and the default test
/// double. Tracks a logical position clock so pause/resume and end-of-track
/// behave like real playback.
pub struct NullAudioEngine {
    paused: bool,
    current: Option<PathBuf>,
    volume: f32,
    started_at: Option<Instant>,
    position_offset: Duration,
    track_duration: Option<Duration>,
}

impl NullAudioEngine {
    pub fn new() -> Self {
        Self {
            paused: false,
            current: None,
            volume: 0.7,
            started_at: None,
            position_offset: Duration::ZERO,
            track_duration: None,
        }
    }

    fn estimate_duration(path: &Path) -> Option<Duration> {
        let file = File::open(path).ok()?;
        let source = Decoder::try_from(file).ok()?;
        source
            .total_duration()
            .filter(|duration| !duration.is_zero())
    }

    fn current_position(&self) -> Duration {
        let mut position = self.position_offset;
        if !self.paused
            && self.current.is_some()
            && let Some(started_at) = self.started_at
        {
            position = position.saturating_add(started_at.elapsed());
        }
        if let Some(duration) = self.track_duration {
            return position.min(duration);
        }
        position
    }
}

impl Default for NullAudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngine for NullAudioEngine {
    fn play(&mut self, path: &Path) -> Result<()> {
        self.paused = false;
        self.current = Some(path.to_path_buf());
        self.started_at = Some(Instant::now());
        self.position_offset = Duration::ZERO;
        self.track_duration = Self::estimate_duration(path);
        Ok(())
    }

    fn pause(&mut self) {
        self.position_offset = self.current_position();
        self.started_at = None;
        self.paused = true;
    }

    fn resume(&mut self) {
        if self.current.is_some() {
            self.started_at = Some(Instant::now());
        }
        self.paused = false;
    }

    fn stop(&mut self) {
        self.current = None;
        self.paused = false;
        self.started_at = None;
        self.position_offset = Duration::ZERO;
        self.track_duration = None;
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn current_track(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    fn position(&self) -> Option<Duration> {
        self.current.as_ref()?;
        Some(self.current_position())
    }

    fn duration(&self) -> Option<Duration> {
        self.track_duration
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, MAX_VOLUME);
    }

    fn is_finished(&self) -> bool {
        let Some(duration) = self.track_duration else {
            return false;
        };
        self.current.is_some() && !self.paused && self.current_position() >= duration
    }
}

#[cfg(test)]
mod tests {
    use super::{AudioEngine, NullAudioEngine};
    use std::fs;
    use std::path::Path;
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;

    fn write_test_wav(path: &Path, duration_ms: u32) {
        let sample_rate: u32 = 44_100;
        let channels: u16 = 1;
        let bits_per_sample: u16 = 16;
        let bytes_per_sample = u32::from(bits_per_sample / 8);
        let total_samples = (u64::from(sample_rate) * u64::from(duration_ms) / 1_000) as u32;
        let data_size = total_samples * u32::from(channels) * bytes_per_sample;
        let byte_rate = sample_rate * u32::from(channels) * bytes_per_sample;
        let block_align = channels * (bits_per_sample / 8);
        let riff_chunk_size = 36_u32.saturating_add(data_size);

        let mut bytes = Vec::with_capacity((44_u32 + data_size) as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&riff_chunk_size.to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16_u32.to_le_bytes());
        bytes.extend_from_slice(&1_u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&byte_rate.to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&bits_per_sample.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_size.to_le_bytes());
        bytes.resize((44_u32 + data_size) as usize, 0_u8);

        fs::write(path, bytes).expect("wav fixture should be written");
    }

    #[test]
    fn null_engine_position_advances_when_playing() {
        let mut engine = NullAudioEngine::new();
        engine
            .play(Path::new("nonexistent-track.flac"))
            .expect("play should still work in null mode");
        let before = engine.position().expect("position should be present");
        thread::sleep(Duration::from_millis(20));
        let after = engine.position().expect("position should be present");
        assert!(after > before, "position should advance while playing");
    }

    #[test]
    fn null_engine_pause_freezes_position() {
        let mut engine = NullAudioEngine::new();
        engine
            .play(Path::new("nonexistent-track.flac"))
            .expect("play should still work in null mode");
        thread::sleep(Duration::from_millis(20));

        engine.pause();
        let paused = engine.position().expect("position should be present");
        thread::sleep(Duration::from_millis(20));
        let paused_later = engine.position().expect("position should be present");
        assert_eq!(paused_later, paused, "position should freeze while paused");

        engine.resume();
        thread::sleep(Duration::from_millis(20));
        let resumed = engine.position().expect("position should be present");
        assert!(resumed > paused, "position should continue after resume");
    }

    #[test]
    fn null_engine_finishes_when_known_duration_elapses() {
        let dir = tempdir().expect("tempdir");
        let track = dir.path().join("fixture.wav");
        write_test_wav(&track, 80);

        let mut engine = NullAudioEngine::new();
        engine
            .play(&track)
            .expect("play should succeed for wav fixture");
        let duration = engine.duration().expect("duration should be detected");
        assert!(duration >= Duration::from_millis(70));

        thread::sleep(Duration::from_millis(120));
        assert!(
            engine.is_finished(),
            "known-duration playback should finish"
        );
    }

    #[test]
    fn null_engine_unknown_duration_does_not_auto_finish() {
        let mut engine = NullAudioEngine::new();
        engine
            .play(Path::new("nonexistent-track.flac"))
            .expect("play should still work in null mode");
        assert_eq!(engine.duration(), None);

        thread::sleep(Duration::from_millis(80));
        assert!(
            !engine.is_finished(),
            "unknown-duration playback should remain active"
        );
    }

    #[test]
    fn volume_is_clamped_to_unit_range() {
        let mut engine = NullAudioEngine::new();
        engine.set_volume(2.0);
        assert_eq!(engine.volume(), 1.0);
        engine.set_volume(-0.5);
        assert_eq!(engine.volume(), 0.0);
    }
}
