//! loopgraph-core - Stimulus-driven loop sequencing for seamless music.
//!
//! Music is organised as a graph of states. Each state plays one loop from
//! every one of its sequences; an external stimulus vector decides which
//! state comes next, and the change is committed just before the active
//! state's longest loop ends so the audio never breaks.
//!
//! - **Timing** - Sample clock driven by the backend's buffer counter
//! - **Loops** - Clip descriptors and the registration table
//! - **Sequences** - Loop collections with random or cyclic selection
//! - **States** - Sets of sequences that are entered and exited together
//! - **Graph** - Weighted transitions selected by the stimulus
//! - **Manager** - Per-frame scheduler emitting start/stop batches
//! - **Session** - Building all of the above from a TOML file
//!
//! # Usage
//!
//! ```no_run
//! use loopgraph_core::backend::sim::SimulatedBackend;
//! use loopgraph_core::{Session, SessionConfig};
//!
//! let config = SessionConfig::load("session.toml")?;
//! let mut session = Session::build(config, SimulatedBackend::new())?;
//! let manager = session.manager_mut();
//! manager.play_pause(true);
//! loop {
//!     manager.update();
//! #   break;
//! }
//! # Ok::<(), loopgraph_core::Error>(())
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod graph;
pub mod input;
pub mod loops;
pub mod manager;
pub mod selection;
pub mod sequence;
pub mod session;
pub mod state;
pub mod timing;

// Re-export main types
pub use backend::{AudioBackend, AudioSpec, ClipCommand, CommandBatch, CommandKind, GameplayHooks};
pub use config::{BindingConfig, BindingKind, LoopConfig, SelectionKind, SessionConfig};
pub use error::{Error, Result};
pub use graph::{Activation, AdvanceStrategy, GraphBuilder, StateGraph, StateId, WeightedMax};
pub use input::{InputAction, InputBindings, InputEvent, Key, KeyEventKind};
pub use loops::{Loop, LoopDefinition, LoopRegistry, VoiceId};
pub use manager::{EventOutcome, LoopManager, TickOutcome};
pub use selection::{Cyclic, LoopCursor, Random, Selector};
pub use sequence::LoopSequence;
pub use session::Session;
pub use state::{DrawableHandle, Feedback, LoopState, Presentation};
pub use timing::{SampleClock, TickWindow, PRE_TRIGGER_BUFFERS};
