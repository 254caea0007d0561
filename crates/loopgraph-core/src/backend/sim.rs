//! In-process simulated audio backend.
//!
//! [`SimulatedBackend`] implements the full backend contract without an
//! audio device. Clip lengths come from WAV headers (or are preset), the
//! buffer counter lives in a shared [`BufferClock`] that a render thread or a
//! test advances. Command batches go to a channel when one was requested and
//! are recorded in memory otherwise.

use super::{AudioBackend, AudioSpec, CommandBatch};
use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Shared buffer counter and transport flag.
///
/// The render side is the only writer of the counter; the scheduler only
/// reads it.
#[derive(Clone, Debug, Default)]
pub struct BufferClock {
    completed: Arc<AtomicU64>,
    playing: Arc<AtomicBool>,
}

impl BufferClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers rendered so far.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Record `count` more rendered buffers.
    pub fn complete(&self, count: u64) {
        self.completed.fetch_add(count, Ordering::AcqRel);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }
}

#[derive(Clone, Copy, Debug)]
struct ClipInfo {
    head: u64,
    tail: u64,
}

/// Backend that renders nothing but honours every contract of a real one.
#[derive(Debug, Default)]
pub struct SimulatedBackend {
    spec: Option<AudioSpec>,
    clock: BufferClock,
    clips: HashMap<String, ClipInfo>,
    presets: HashMap<String, (u64, u64)>,
    max_sample_count: u64,
    sent: Vec<CommandBatch>,
    sink: Option<Sender<CommandBatch>>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend that forwards every batch to the returned receiver.
    /// Forwarded batches are not recorded.
    pub fn with_channel() -> (Self, Receiver<CommandBatch>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let backend = Self {
            sink: Some(tx),
            ..Self::default()
        };
        (backend, rx)
    }

    /// Handle to the shared buffer counter.
    pub fn clock(&self) -> BufferClock {
        self.clock.clone()
    }

    /// Advance the buffer counter directly.
    pub fn complete_buffers(&self, count: u64) {
        self.clock.complete(count);
    }

    /// Declare clip lengths for `name` so registration needs no file.
    pub fn preset_clip(&mut self, name: impl Into<String>, head: u64, tail: u64) {
        self.presets.insert(name.into(), (head, tail));
    }

    /// Every batch sent so far, oldest first. Always empty for a backend
    /// created with [`SimulatedBackend::with_channel`].
    pub fn sent(&self) -> &[CommandBatch] {
        &self.sent
    }

    /// Drain the recorded batches.
    pub fn take_sent(&mut self) -> Vec<CommandBatch> {
        std::mem::take(&mut self.sent)
    }

    pub fn spec(&self) -> Option<&AudioSpec> {
        self.spec.as_ref()
    }

    fn measure(&self, name: &str, path: &Path, spec: &AudioSpec) -> Result<u64> {
        let reader = hound::WavReader::open(path).map_err(|e| Error::ClipRegistration {
            name: name.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })?;
        let wav = reader.spec();
        if wav.sample_rate != spec.sample_rate || wav.channels != spec.channels {
            return Err(Error::ClipRegistration {
                name: name.to_string(),
                reason: format!(
                    "{} is {} Hz / {} ch, expected {} Hz / {} ch",
                    path.display(),
                    wav.sample_rate,
                    wav.channels,
                    spec.sample_rate,
                    spec.channels
                ),
            });
        }
        Ok(reader.duration() as u64 * wav.channels as u64)
    }
}

impl AudioBackend for SimulatedBackend {
    fn init(&mut self, spec: &AudioSpec) -> Result<()> {
        if spec.sample_rate == 0 || spec.channels == 0 || spec.buffer_size == 0 {
            return Err(Error::BackendInit(format!("invalid audio spec {:?}", spec)));
        }
        log::info!(
            "[BACKEND] Simulated device open: {} Hz, {} ch, {} samples per buffer",
            spec.sample_rate,
            spec.channels,
            spec.buffer_size
        );
        self.spec = Some(*spec);
        self.clock.set_playing(false);
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.spec.map(|s| s.sample_rate).unwrap_or(0)
    }

    fn buffer_size(&self) -> u64 {
        self.spec.map(|s| s.buffer_size as u64).unwrap_or(0)
    }

    fn max_sample_count(&self) -> u64 {
        self.max_sample_count
    }

    fn num_buffers_completed(&self) -> u64 {
        self.clock.completed()
    }

    fn register_clip(
        &mut self,
        name: &str,
        head: &Path,
        tail: Option<&Path>,
        fade_samples: u64,
    ) -> Result<()> {
        let spec = self.spec.ok_or_else(|| Error::ClipRegistration {
            name: name.to_string(),
            reason: "backend not initialized".to_string(),
        })?;
        if self.clock.is_playing() {
            return Err(Error::ClipRegistration {
                name: name.to_string(),
                reason: "cannot register clips while playing".to_string(),
            });
        }
        if self.clips.contains_key(name) {
            return Ok(());
        }

        let (head_samples, raw_tail) = match self.presets.get(name) {
            Some(&(h, t)) => (h, t),
            None => {
                let h = self.measure(name, head, &spec)?;
                let t = match tail {
                    Some(path) => self.measure(name, path, &spec).unwrap_or_else(|e| {
                        log::warn!("[BACKEND] Ignoring tail of '{}': {}", name, e);
                        0
                    }),
                    None => 0,
                };
                (h, t)
            }
        };
        if head_samples == 0 {
            return Err(Error::ClipRegistration {
                name: name.to_string(),
                reason: "head has no samples".to_string(),
            });
        }

        // The tail has to be over by the time the fade-out begins.
        let tail_samples = raw_tail.min(head_samples.saturating_sub(fade_samples));
        self.max_sample_count = self.max_sample_count.max(head_samples);
        self.clips.insert(
            name.to_string(),
            ClipInfo {
                head: head_samples,
                tail: tail_samples,
            },
        );
        Ok(())
    }

    fn num_samples_in_clip(&self, name: &str, include_tail: bool) -> u64 {
        match self.clips.get(name) {
            Some(info) if include_tail => info.head + info.tail,
            Some(info) => info.head,
            None => 0,
        }
    }

    fn send_messages(&mut self, batch: CommandBatch) {
        log::debug!("[BACKEND] Received batch of {} commands", batch.len());
        match &self.sink {
            Some(sink) => {
                if sink.send(batch).is_err() {
                    log::warn!("[BACKEND] Render side hung up, batch dropped");
                }
            }
            None => self.sent.push(batch),
        }
    }

    fn set_play_pause(&mut self, playing: bool) {
        log::info!("[BACKEND] {}", if playing { "Playing" } else { "Paused" });
        self.clock.set_playing(playing);
    }

    fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ClipCommand, CommandKind};
    use crate::loops::VoiceId;

    fn ready() -> SimulatedBackend {
        let mut backend = SimulatedBackend::new();
        backend.init(&AudioSpec::default()).unwrap();
        backend
    }

    fn write_wav(path: &Path, frames: u32, channels: u16, sample_rate: u32) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..frames * channels as u32 {
            writer.write_sample(0.0f32).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_init_rejects_invalid_spec() {
        let mut backend = SimulatedBackend::new();
        let spec = AudioSpec {
            buffer_size: 0,
            ..AudioSpec::default()
        };
        assert!(matches!(backend.init(&spec), Err(Error::BackendInit(_))));
    }

    #[test]
    fn test_register_requires_init() {
        let mut backend = SimulatedBackend::new();
        backend.preset_clip("a", 10, 0);
        assert!(backend.register_clip("a", Path::new("a.wav"), None, 0).is_err());
    }

    #[test]
    fn test_preset_tail_is_truncated_to_fade_start() {
        let mut backend = ready();
        backend.preset_clip("a", 1000, 5000);
        backend.register_clip("a", Path::new("a.wav"), None, 200).unwrap();
        assert_eq!(backend.num_samples_in_clip("a", false), 1000);
        assert_eq!(backend.num_samples_in_clip("a", true), 1800);
        assert_eq!(backend.num_samples_in_clip("unknown", true), 0);
    }

    #[test]
    fn test_max_sample_count_tracks_longest_head() {
        let mut backend = ready();
        backend.preset_clip("a", 1000, 0);
        backend.preset_clip("b", 3000, 0);
        backend.preset_clip("c", 2000, 0);
        for name in ["a", "b", "c"] {
            backend.register_clip(name, Path::new("x.wav"), None, 0).unwrap();
        }
        assert_eq!(backend.max_sample_count(), 3000);
    }

    #[test]
    fn test_no_registration_while_playing() {
        let mut backend = ready();
        backend.preset_clip("a", 1000, 0);
        backend.set_play_pause(true);
        assert!(backend.register_clip("a", Path::new("a.wav"), None, 0).is_err());
        backend.set_play_pause(false);
        assert!(backend.register_clip("a", Path::new("a.wav"), None, 0).is_ok());
    }

    #[test]
    fn test_reads_wav_lengths() {
        let dir = tempfile::tempdir().unwrap();
        let head = dir.path().join("head.wav");
        let tail = dir.path().join("tail.wav");
        write_wav(&head, 4410, 1, 44_100);
        write_wav(&tail, 441, 1, 44_100);

        let mut backend = ready();
        backend.register_clip("clip", &head, Some(&tail), 0).unwrap();
        assert_eq!(backend.num_samples_in_clip("clip", false), 4410);
        assert_eq!(backend.num_samples_in_clip("clip", true), 4851);
    }

    #[test]
    fn test_mismatched_head_fails_and_tail_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let head = dir.path().join("head.wav");
        let stereo = dir.path().join("stereo.wav");
        write_wav(&head, 1000, 1, 44_100);
        write_wav(&stereo, 1000, 2, 44_100);

        let mut backend = ready();
        assert!(backend.register_clip("bad", &stereo, None, 0).is_err());
        backend.register_clip("ok", &head, Some(&stereo), 0).unwrap();
        assert_eq!(backend.num_samples_in_clip("ok", true), 1000);
    }

    fn start(clip: &str, voice: u32) -> CommandBatch {
        vec![ClipCommand {
            kind: CommandKind::StartLoop,
            clip: clip.to_string(),
            voice: VoiceId(voice),
            volume: 1.0,
            marker: 0,
        }]
    }

    #[test]
    fn test_unreadable_wav_names_the_clip() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.wav");
        let garbage = dir.path().join("garbage.wav");
        std::fs::write(&garbage, b"not a wav file").unwrap();

        let mut backend = ready();
        for path in [&missing, &garbage] {
            match backend.register_clip("pad", path, None, 0) {
                Err(Error::ClipRegistration { name, reason }) => {
                    assert_eq!(name, "pad");
                    assert!(reason.contains(&path.display().to_string()));
                }
                other => panic!("expected a clip registration error, got {:?}", other),
            }
        }
        assert_eq!(backend.num_samples_in_clip("pad", false), 0);
    }

    #[test]
    fn test_batches_are_recorded_without_channel() {
        let mut backend = ready();
        backend.send_messages(start("a", 0));
        backend.send_messages(start("b", 1));
        assert_eq!(backend.sent(), &[start("a", 0), start("b", 1)]);
        assert_eq!(backend.take_sent().len(), 2);
        assert!(backend.sent().is_empty());
    }

    #[test]
    fn test_forwarded_batches_are_not_retained() {
        let (mut backend, rx) = SimulatedBackend::with_channel();
        backend.init(&AudioSpec::default()).unwrap();
        backend.send_messages(start("a", 0));
        assert_eq!(rx.try_recv().unwrap(), start("a", 0));

        for i in 0..10_000 {
            backend.send_messages(start("loop", i));
            assert!(rx.try_recv().is_ok());
        }
        assert!(backend.sent().is_empty());
    }

    #[test]
    fn test_batches_after_hangup_are_dropped() {
        let (mut backend, rx) = SimulatedBackend::with_channel();
        drop(rx);
        backend.send_messages(start("a", 0));
        assert!(backend.sent().is_empty());
    }

    #[test]
    fn test_clock_is_shared() {
        let backend = ready();
        let clock = backend.clock();
        clock.complete(3);
        backend.complete_buffers(2);
        assert_eq!(backend.num_buffers_completed(), 5);
    }
}
