//! Loop descriptors and the registration table.
//!
//! A [`LoopDefinition`] is what a session file declares: a name, the clip
//! files and playback parameters. Registering it with the audio backend via
//! [`LoopRegistry`] yields a shared, immutable [`Loop`] carrying the sample
//! counts the backend measured and a voice id unique to that loop.

use crate::backend::AudioBackend;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default fade length for loops, in milliseconds.
pub const DEFAULT_FADE_MS: u32 = 5;

/// Backend playback channel identifier, one per distinct loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VoiceId(pub u32);

impl VoiceId {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

/// Declared (not yet registered) loop.
#[derive(Clone, Debug, PartialEq)]
pub struct LoopDefinition {
    /// Unique name, also used as the backend clip name.
    pub name: String,
    /// Main body of the clip.
    pub head_file: PathBuf,
    /// Optional fade-out tail played after the head when stopping.
    pub tail_file: Option<PathBuf>,
    /// Crossfade duration in milliseconds.
    pub fade_ms: u32,
    /// Playback volume (1.0 = unity).
    pub volume: f32,
}

impl LoopDefinition {
    /// Create a definition with default fade and unity volume.
    pub fn new(name: impl Into<String>, head_file: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            head_file: head_file.into(),
            tail_file: None,
            fade_ms: DEFAULT_FADE_MS,
            volume: 1.0,
        }
    }

    /// Set the tail file.
    pub fn with_tail(mut self, tail_file: impl Into<PathBuf>) -> Self {
        self.tail_file = Some(tail_file.into());
        self
    }

    /// Set the fade duration in milliseconds.
    pub fn with_fade_ms(mut self, fade_ms: u32) -> Self {
        self.fade_ms = fade_ms;
        self
    }

    /// Set the playback volume.
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    /// Reject empty names and clip paths.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("loop name must not be empty".to_string()));
        }
        if self.head_file.as_os_str().is_empty() {
            return Err(Error::Config(format!(
                "loop '{}' has an empty head file",
                self.name
            )));
        }
        if matches!(&self.tail_file, Some(tail) if tail.as_os_str().is_empty()) {
            return Err(Error::Config(format!(
                "loop '{}' has an empty tail file",
                self.name
            )));
        }
        Ok(())
    }
}

/// A registered loop.
///
/// Loops compare and hash by name only, so the same clip referenced from
/// several sequences is one loop.
#[derive(Clone, Debug)]
pub struct Loop {
    name: String,
    head_file: PathBuf,
    tail_file: Option<PathBuf>,
    fade_ms: u32,
    volume: f32,
    head_samples: u64,
    tail_samples: u64,
    voice: VoiceId,
}

impl Loop {
    /// Build a loop from a definition and the counts the backend reported.
    pub fn from_parts(
        definition: LoopDefinition,
        head_samples: u64,
        tail_samples: u64,
        voice: VoiceId,
    ) -> Self {
        Self {
            name: definition.name,
            head_file: definition.head_file,
            tail_file: definition.tail_file,
            fade_ms: definition.fade_ms,
            volume: definition.volume,
            head_samples,
            tail_samples,
            voice,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn head_file(&self) -> &Path {
        &self.head_file
    }

    pub fn tail_file(&self) -> Option<&Path> {
        self.tail_file.as_deref()
    }

    pub fn fade_ms(&self) -> u32 {
        self.fade_ms
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Length of the head segment in samples.
    pub fn head_samples(&self) -> u64 {
        self.head_samples
    }

    /// Length of the tail segment in samples.
    pub fn tail_samples(&self) -> u64 {
        self.tail_samples
    }

    pub fn voice(&self) -> VoiceId {
        self.voice
    }
}

impl PartialEq for Loop {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Loop {}

impl Hash for Loop {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Loop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Registration table mapping loop names to shared descriptors.
///
/// Voice ids are handed out in registration order and never reused.
#[derive(Debug, Default)]
pub struct LoopRegistry {
    clip_dir: PathBuf,
    loops: HashMap<String, Arc<Loop>>,
    order: Vec<String>,
    next_voice: u32,
}

impl LoopRegistry {
    /// Create a registry resolving relative clip paths against `clip_dir`.
    pub fn new(clip_dir: impl Into<PathBuf>) -> Self {
        Self {
            clip_dir: clip_dir.into(),
            ..Self::default()
        }
    }

    /// Register a loop with the backend, or return the loop already known by
    /// that name.
    pub fn register<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        definition: LoopDefinition,
    ) -> Result<Arc<Loop>> {
        definition.validate()?;

        if let Some(existing) = self.loops.get(&definition.name) {
            if existing.head_file() != definition.head_file
                || existing.tail_file() != definition.tail_file.as_deref()
            {
                log::warn!(
                    "[REGISTRY] Loop '{}' redeclared with different files, keeping the first",
                    definition.name
                );
            }
            return Ok(Arc::clone(existing));
        }

        let head = self.resolve(&definition.head_file);
        let tail = definition.tail_file.as_ref().map(|t| self.resolve(t));
        let fade_samples = definition.fade_ms as u64 * (backend.sample_rate() as u64 / 1000);

        backend.register_clip(&definition.name, &head, tail.as_deref(), fade_samples)?;

        let head_samples = backend.num_samples_in_clip(&definition.name, false);
        let total_samples = backend.num_samples_in_clip(&definition.name, true);
        let tail_samples = total_samples.saturating_sub(head_samples);

        let voice = VoiceId(self.next_voice);
        self.next_voice += 1;

        log::debug!(
            "[REGISTRY] Registered '{}' ({} head, {} tail samples) as {}",
            definition.name,
            head_samples,
            tail_samples,
            voice
        );

        let name = definition.name.clone();
        let registered = Arc::new(Loop::from_parts(definition, head_samples, tail_samples, voice));
        self.loops.insert(name.clone(), Arc::clone(&registered));
        self.order.push(name);
        Ok(registered)
    }

    /// Look up a registered loop by name.
    pub fn get(&self, name: &str) -> Option<&Arc<Loop>> {
        self.loops.get(name)
    }

    /// Look up a registered loop, failing with [`Error::UnknownLoop`].
    pub fn require(&self, name: &str) -> Result<Arc<Loop>> {
        self.loops
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownLoop(name.to_string()))
    }

    /// Registered loops in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Loop>> {
        self.order.iter().filter_map(|name| self.loops.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Directory against which relative clip paths are resolved.
    pub fn clip_dir(&self) -> &Path {
        &self.clip_dir
    }

    fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.clip_dir.join(file)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sim::SimulatedBackend;
    use crate::backend::AudioSpec;

    fn backend() -> SimulatedBackend {
        let mut backend = SimulatedBackend::new();
        backend.init(&AudioSpec::default()).unwrap();
        backend.preset_clip("bass", 88_200, 4_410);
        backend.preset_clip("drums", 44_100, 0);
        backend
    }

    #[test]
    fn test_definition_validation() {
        assert!(LoopDefinition::new("", "a.wav").validate().is_err());
        assert!(LoopDefinition::new("a", "").validate().is_err());
        assert!(LoopDefinition::new("a", "a.wav").with_tail("").validate().is_err());
        assert!(LoopDefinition::new("a", "a.wav").with_tail("b.wav").validate().is_ok());
    }

    #[test]
    fn test_loops_compare_by_name() {
        let a = Loop::from_parts(LoopDefinition::new("x", "1.wav"), 10, 0, VoiceId(0));
        let b = Loop::from_parts(LoopDefinition::new("x", "2.wav"), 20, 5, VoiceId(3));
        let c = Loop::from_parts(LoopDefinition::new("y", "1.wav"), 10, 0, VoiceId(0));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_registry_records_sample_counts() {
        let mut backend = backend();
        let mut registry = LoopRegistry::new("audio");
        let bass = registry
            .register(&mut backend, LoopDefinition::new("bass", "bass_head.wav").with_tail("bass_tail.wav"))
            .unwrap();
        assert_eq!(bass.head_samples(), 88_200);
        assert_eq!(bass.tail_samples(), 4_410);
        assert_eq!(bass.voice(), VoiceId(0));
    }

    #[test]
    fn test_registry_voice_ids_are_unique_per_loop() {
        let mut backend = backend();
        let mut registry = LoopRegistry::new("audio");
        let bass = registry
            .register(&mut backend, LoopDefinition::new("bass", "bass.wav"))
            .unwrap();
        let drums = registry
            .register(&mut backend, LoopDefinition::new("drums", "drums.wav"))
            .unwrap();
        let bass_again = registry
            .register(&mut backend, LoopDefinition::new("bass", "bass.wav"))
            .unwrap();

        assert_eq!(bass.voice(), VoiceId(0));
        assert_eq!(drums.voice(), VoiceId(1));
        assert!(Arc::ptr_eq(&bass, &bass_again));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_registry_propagates_backend_failure() {
        let mut backend = backend();
        let mut registry = LoopRegistry::new("audio");
        let err = registry
            .register(&mut backend, LoopDefinition::new("missing", "nope.wav"))
            .unwrap_err();
        assert!(matches!(err, Error::ClipRegistration { .. }));
        assert!(registry.get("missing").is_none());
    }
}
