//! Session file support.
//!
//! A session is described in TOML. The default location is:
//! - Linux: `~/.config/loopgraph/session.toml`
//! - macOS: `~/Library/Application Support/loopgraph/session.toml`
//! - Windows: `%APPDATA%\loopgraph\session.toml`

use crate::backend::AudioSpec;
use crate::error::{Error, Result};
use crate::graph::StateGraph;
use crate::input::{InputAction, Key};
use crate::loops::{LoopDefinition, DEFAULT_FADE_MS};
use crate::selection::{Cyclic, Random, Selector};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Commented session written by [`SessionConfig::create_default_config_file`].
pub const DEFAULT_SESSION: &str = r#"# loopgraph session file
#
# Loops are WAV clips; sequences pick one loop at a time from a list;
# states play one loop from each of their sequences. The keys 1..9 select
# the states in declaration order, space toggles playback, escape quits.

[audio]
sample_rate = 44100
channels = 1
# Samples per backend buffer
buffer_size = 4096
# Clip files are looked up relative to this directory
clip_dir = "clips"

[graph]
initial = "calm"

[[loops]]
name = "pad"
head = "pad.wav"
tail = "pad_tail.wav"
fade_ms = 20

[[loops]]
name = "drums_a"
head = "drums_a.wav"

[[loops]]
name = "drums_b"
head = "drums_b.wav"

[[loops]]
name = "bass"
head = "bass.wav"
volume = 0.8

[[loops]]
name = "lead_a"
head = "lead_a.wav"

[[loops]]
name = "lead_b"
head = "lead_b.wav"

[[sequences]]
name = "pad"
loops = ["pad"]
selection = "cyclic"

[[sequences]]
name = "drums"
loops = ["drums_a", "drums_b"]
selection = "random"

[[sequences]]
name = "bass"
loops = ["bass"]
selection = "cyclic"

[[sequences]]
name = "lead"
loops = ["lead_a", "lead_a", "lead_b"]
selection = "cyclic"

[[states]]
name = "calm"
sequences = ["pad", "drums"]
drawable = 0

[[states]]
name = "drive"
sequences = ["drums", "bass", "lead"]
drawable = 1

[[states]]
name = "break"
sequences = ["pad", "bass"]
drawable = 2

# Loops that are only ever played once on demand
[[one_shots]]
name = "fill"
head = "fill.wav"

# Extra bindings layered over the defaults
[[bindings]]
key = "f"
action = "one_shot"
loop = "fill"
"#;

/// Complete description of a loop session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub audio: AudioSettings,
    pub graph: GraphSettings,
    pub loops: Vec<LoopConfig>,
    pub sequences: Vec<SequenceConfig>,
    pub states: Vec<StateConfig>,
    pub one_shots: Vec<LoopConfig>,
    pub bindings: Vec<BindingConfig>,
}

impl SessionConfig {
    /// Load a session from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::Config(format!("Session file not found at {:?}", path)));
        }
        let content = fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        if config.audio.clip_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.audio.clip_dir = parent.join(&config.audio.clip_dir);
            }
        }
        Ok(config)
    }

    /// Parse a session from TOML text. Relative clip paths stay as written.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load the session at the default location, falling back to the demo.
    pub fn load_or_default() -> Self {
        Self::config_path()
            .and_then(Self::load)
            .unwrap_or_else(|_| Self::demo())
    }

    /// The session described by [`DEFAULT_SESSION`].
    pub fn demo() -> Self {
        toml::from_str(DEFAULT_SESSION).unwrap_or_default()
    }

    /// Write the session to `path`, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default session file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = ProjectDirs::from("", "", "loopgraph") {
            Ok(proj_dirs.config_dir().join("session.toml"))
        } else {
            Err(Error::Config("Could not determine config directory".to_string()))
        }
    }

    /// Write the commented demo session to the default location.
    pub fn create_default_config_file() -> Result<PathBuf> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, DEFAULT_SESSION)?;
        Ok(path)
    }

    pub fn loop_config(&self, name: &str) -> Option<&LoopConfig> {
        self.loops.iter().find(|l| l.name == name)
    }

    pub fn sequence_config(&self, name: &str) -> Option<&SequenceConfig> {
        self.sequences.iter().find(|s| s.name == name)
    }

    /// Name of the initial state; the first declared state by default.
    pub fn initial_state(&self) -> Option<&str> {
        self.graph
            .initial
            .as_deref()
            .or_else(|| self.states.first().map(|s| s.name.as_str()))
    }

    /// Check names and cross references.
    pub fn validate(&self) -> Result<()> {
        if self.states.is_empty() {
            return Err(Error::Config("session declares no states".to_string()));
        }

        let mut clips = HashSet::new();
        for lp in self.loops.iter().chain(&self.one_shots) {
            if !clips.insert(lp.name.as_str()) {
                return Err(Error::Config(format!("duplicate loop name '{}'", lp.name)));
            }
        }

        let mut sequences = HashSet::new();
        for seq in &self.sequences {
            if !sequences.insert(seq.name.as_str()) {
                return Err(Error::Config(format!("duplicate sequence name '{}'", seq.name)));
            }
            if seq.loops.is_empty() {
                return Err(Error::Config(format!("sequence '{}' has no loops", seq.name)));
            }
            if let Some(missing) = seq.loops.iter().find(|l| self.loop_config(l).is_none()) {
                return Err(Error::UnknownLoop(missing.clone()));
            }
        }

        let mut states = HashSet::new();
        for state in &self.states {
            if !states.insert(state.name.as_str()) {
                return Err(Error::Config(format!("duplicate state name '{}'", state.name)));
            }
            if state.sequences.is_empty() {
                return Err(Error::Config(format!("state '{}' has no sequences", state.name)));
            }
            if let Some(missing) = state
                .sequences
                .iter()
                .find(|s| !sequences.contains(s.as_str()))
            {
                return Err(Error::UnknownSequence {
                    state: state.name.clone(),
                    sequence: missing.clone(),
                });
            }
        }

        if let Some(initial) = &self.graph.initial {
            if !states.contains(initial.as_str()) {
                return Err(Error::UnknownState(initial.clone()));
            }
        }

        for binding in &self.bindings {
            binding.key()?;
            match binding.action {
                BindingKind::Stimulus => {
                    let state = binding.required("state", binding.state.as_deref())?;
                    if !states.contains(state) {
                        return Err(Error::UnknownState(state.to_string()));
                    }
                }
                BindingKind::OneShot => {
                    let name = binding.required("loop", binding.loop_name.as_deref())?;
                    if !clips.contains(name) {
                        return Err(Error::UnknownLoop(name.to_string()));
                    }
                }
                BindingKind::PlayPause | BindingKind::Quit => {}
            }
        }

        for lp in &self.loops {
            let used = self.sequences.iter().any(|s| s.loops.contains(&lp.name));
            if !used {
                log::warn!("[SESSION] Loop '{}' is not used by any sequence", lp.name);
            }
        }
        Ok(())
    }
}

/// Audio device settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per backend buffer
    pub buffer_size: u32,
    /// Directory clip files are resolved against
    pub clip_dir: PathBuf,
}

impl Default for AudioSettings {
    fn default() -> Self {
        let spec = AudioSpec::default();
        Self {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            buffer_size: spec.buffer_size,
            clip_dir: PathBuf::from("."),
        }
    }
}

impl AudioSettings {
    pub fn to_spec(&self) -> AudioSpec {
        AudioSpec {
            sample_rate: self.sample_rate,
            channels: self.channels,
            buffer_size: self.buffer_size,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    /// Initial state name; the first state when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial: Option<String>,
}

fn default_fade_ms() -> u32 {
    DEFAULT_FADE_MS
}

fn default_volume() -> f32 {
    1.0
}

/// One `[[loops]]` or `[[one_shots]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    pub name: String,
    pub head: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tail: Option<PathBuf>,
    #[serde(default = "default_fade_ms")]
    pub fade_ms: u32,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

impl LoopConfig {
    pub fn to_definition(&self) -> LoopDefinition {
        let definition = LoopDefinition::new(&self.name, &self.head)
            .with_fade_ms(self.fade_ms)
            .with_volume(self.volume);
        match &self.tail {
            Some(tail) => definition.with_tail(tail),
            None => definition,
        }
    }
}

/// Loop selection policy of a sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionKind {
    #[default]
    Random,
    Cyclic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceConfig {
    pub name: String,
    /// Loop names; repeating a name weights it
    pub loops: Vec<String>,
    #[serde(default)]
    pub selection: SelectionKind,
    /// Fixed seed for the random policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl SequenceConfig {
    pub fn selector(&self) -> Arc<dyn Selector> {
        match (self.selection, self.seed) {
            (SelectionKind::Cyclic, _) => Arc::new(Cyclic),
            (SelectionKind::Random, Some(seed)) => Arc::new(Random::seeded(seed)),
            (SelectionKind::Random, None) => Arc::new(Random::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateConfig {
    pub name: String,
    pub sequences: Vec<String>,
    /// Handle of the visual element tied to this state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drawable: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    Stimulus,
    OneShot,
    PlayPause,
    Quit,
}

/// One `[[bindings]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingConfig {
    pub key: String,
    pub action: BindingKind,
    /// Target state of a `stimulus` binding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Clip of a `one_shot` binding
    #[serde(rename = "loop", default, skip_serializing_if = "Option::is_none")]
    pub loop_name: Option<String>,
}

impl BindingConfig {
    pub fn key(&self) -> Result<Key> {
        self.key.parse()
    }

    fn required<'a>(&self, field: &str, value: Option<&'a str>) -> Result<&'a str> {
        value.ok_or_else(|| {
            Error::Config(format!(
                "binding for '{}' needs a '{}' field",
                self.key, field
            ))
        })
    }

    /// Resolve the binding against a built graph.
    pub fn to_action(&self, graph: &StateGraph) -> Result<(Key, InputAction)> {
        let key = self.key()?;
        let action = match self.action {
            BindingKind::Stimulus => {
                let id = graph.require_state(self.required("state", self.state.as_deref())?)?;
                InputAction::Stimulus(graph.one_hot(id))
            }
            BindingKind::OneShot => InputAction::OneShot(
                self.required("loop", self.loop_name.as_deref())?.to_string(),
            ),
            BindingKind::PlayPause => InputAction::PlayPause,
            BindingKind::Quit => InputAction::Quit,
        };
        Ok((key, action))
    }
}
