//! Audio backend contract.
//!
//! The scheduler never mixes audio itself. It talks to a backend that plays
//! clips on its own thread, reports how many buffers it has completed and
//! accepts batches of start/stop commands. [`sim::SimulatedBackend`] is an
//! in-process implementation used by the CLI and the test suite.

pub mod sim;

use crate::error::Result;
use crate::loops::{Loop, VoiceId};
use std::fmt;
use std::path::Path;

/// Requested audio format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioSpec {
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per backend buffer.
    pub buffer_size: u32,
}

impl Default for AudioSpec {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
            buffer_size: 4096,
        }
    }
}

/// What a [`ClipCommand`] asks the backend to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Start (or re-arm) a looping voice.
    StartLoop,
    /// Let a looping voice finish into its tail and stop.
    StopLoop,
    /// Play a clip once.
    OneShot,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CommandKind::StartLoop => "start",
            CommandKind::StopLoop => "stop",
            CommandKind::OneShot => "one-shot",
        })
    }
}

/// A single command for the backend.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipCommand {
    pub kind: CommandKind,
    pub clip: String,
    pub voice: VoiceId,
    pub volume: f32,
    /// Sample marker the backend aligns the change to.
    pub marker: u64,
}

impl ClipCommand {
    pub fn for_loop(kind: CommandKind, lp: &Loop, marker: u64) -> Self {
        Self {
            kind,
            clip: lp.name().to_string(),
            voice: lp.voice(),
            volume: lp.volume(),
            marker,
        }
    }
}

/// Commands delivered to the backend as one unit.
pub type CommandBatch = Vec<ClipCommand>;

/// The native audio engine as seen by the scheduler.
pub trait AudioBackend {
    /// Open the device with the given format.
    fn init(&mut self, spec: &AudioSpec) -> Result<()>;

    fn sample_rate(&self) -> u32;

    /// Samples per buffer.
    fn buffer_size(&self) -> u64;

    /// Length of the playback cycle (the longest registered head).
    fn max_sample_count(&self) -> u64;

    /// Monotonically increasing count of rendered buffers.
    fn num_buffers_completed(&self) -> u64;

    /// Load a clip under `name`. Registering a known name again succeeds.
    fn register_clip(
        &mut self,
        name: &str,
        head: &Path,
        tail: Option<&Path>,
        fade_samples: u64,
    ) -> Result<()>;

    /// Head length of a clip, or head plus tail with `include_tail`.
    /// Unknown clips report zero.
    fn num_samples_in_clip(&self, name: &str, include_tail: bool) -> u64;

    /// Deliver a batch of commands atomically.
    fn send_messages(&mut self, batch: CommandBatch);

    fn set_play_pause(&mut self, playing: bool);

    fn is_playing(&self) -> bool;
}

/// Gameplay layer hooks triggered by musical changes.
pub trait GameplayHooks {
    /// Reset per-frame collision counters.
    fn clear_collision_counters(&mut self);
}

/// Gameplay hooks that do nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoGameplay;

impl GameplayHooks for NoGameplay {
    fn clear_collision_counters(&mut self) {}
}
