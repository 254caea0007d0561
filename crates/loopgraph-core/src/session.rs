//! Building a running session from a [`SessionConfig`].

use crate::backend::AudioBackend;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::graph::StateGraph;
use crate::input::InputBindings;
use crate::loops::{Loop, LoopRegistry};
use crate::manager::LoopManager;
use crate::sequence::LoopSequence;
use crate::state::{DrawableHandle, LoopState, NoPresentation, Presentation};
use std::sync::Arc;

/// A configured scheduler together with the session it was built from.
pub struct Session<B: AudioBackend> {
    config: SessionConfig,
    manager: LoopManager<B>,
}

impl<B: AudioBackend> Session<B> {
    /// Set up the backend, register every clip and start the initial state.
    pub fn build(config: SessionConfig, backend: B) -> Result<Self> {
        Self::build_with_presentation(config, backend, Box::new(NoPresentation))
    }

    pub fn build_with_presentation(
        config: SessionConfig,
        mut backend: B,
        presentation: Box<dyn Presentation>,
    ) -> Result<Self> {
        config.validate()?;
        backend.init(&config.audio.to_spec())?;

        let mut registry = LoopRegistry::new(&config.audio.clip_dir);

        // Voice ids follow the order loops are first met while walking the states.
        for state in &config.states {
            for seq_name in &state.sequences {
                let seq = require_sequence(&config, &state.name, seq_name)?;
                for loop_name in &seq.loops {
                    let lp = config
                        .loop_config(loop_name)
                        .ok_or_else(|| Error::UnknownLoop(loop_name.clone()))?;
                    registry.register(&mut backend, lp.to_definition())?;
                }
            }
        }
        for one_shot in &config.one_shots {
            registry.register(&mut backend, one_shot.to_definition())?;
        }
        log::info!(
            "[SESSION] Registered {} clips, playback cycle {} samples",
            registry.len(),
            backend.max_sample_count()
        );

        let mut builder = StateGraph::builder();
        let initial_name = config.initial_state().unwrap_or_default().to_string();
        let mut initial = None;
        for state_config in &config.states {
            let mut sequences = Vec::with_capacity(state_config.sequences.len());
            for seq_name in &state_config.sequences {
                let seq = require_sequence(&config, &state_config.name, seq_name)?;
                let loops = seq
                    .loops
                    .iter()
                    .map(|name| registry.require(name))
                    .collect::<Result<Vec<Arc<Loop>>>>()?;
                sequences.push(LoopSequence::new(&seq.name, loops, seq.selector())?);
            }
            let mut state = LoopState::new(&state_config.name, sequences)?;
            if let Some(handle) = state_config.drawable {
                state = state.with_drawable(DrawableHandle(handle));
            }
            log::debug!(
                "[SESSION] State {} resolves at {} samples",
                state.name(),
                state.trigger_resolution()
            );
            let id = builder.add_state(state);
            if state_config.name == initial_name {
                initial = Some(id);
            }
        }
        let initial = initial.ok_or_else(|| Error::UnknownState(initial_name.clone()))?;
        builder
            .connect_all()
            .initial(initial)
            .presentation(presentation);
        let graph = builder.build()?;

        let mut bindings = InputBindings::defaults_for(&graph);
        for binding in &config.bindings {
            let (key, action) = binding.to_action(&graph)?;
            bindings.bind(key, action);
        }

        let manager = LoopManager::new(backend, graph, registry)?.with_bindings(bindings);
        log::info!(
            "[SESSION] Session ready with {} states, starting in {}",
            config.states.len(),
            initial_name
        );
        Ok(Self { config, manager })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn manager(&self) -> &LoopManager<B> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut LoopManager<B> {
        &mut self.manager
    }

    pub fn into_manager(self) -> LoopManager<B> {
        self.manager
    }
}

fn require_sequence<'a>(
    config: &'a SessionConfig,
    state: &str,
    name: &str,
) -> Result<&'a crate::config::SequenceConfig> {
    config
        .sequence_config(name)
        .ok_or_else(|| Error::UnknownSequence {
            state: state.to_string(),
            sequence: name.to_string(),
        })
}
