//! The loop scheduler.
//!
//! [`LoopManager`] owns the state graph and a [`SampleClock`] driven by the
//! backend's buffer counter. Once per host frame [`LoopManager::update`]
//! decides whether this tick crosses a pre-trigger point, and if so either
//! commits a pending state transition or advances the sequences whose loop
//! is ending. Changes to the set of sounding loops are sent to the backend
//! as a single batch.

use crate::backend::{AudioBackend, ClipCommand, CommandBatch, CommandKind, GameplayHooks, NoGameplay};
use crate::error::{Error, Result};
use crate::graph::{StateGraph, StateId};
use crate::input::{InputAction, InputBindings, InputEvent};
use crate::loops::{Loop, LoopRegistry};
use crate::state::Feedback;
use crate::timing::SampleClock;
use std::collections::HashSet;
use std::sync::Arc;

/// What a single update tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Only clock bookkeeping happened.
    Idle,
    /// This many sequences of the active state moved to their next loop.
    Advanced(usize),
    /// The graph committed a transition.
    Transitioned { from: StateId, to: StateId },
}

impl TickOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, TickOutcome::Idle)
    }
}

/// Result of handling an input event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventOutcome {
    Handled,
    Ignored,
    /// The host should shut down.
    Quit,
}

/// Compute the commands turning `previous` into `current`.
///
/// Loops are compared by name; loops present in both sets produce no
/// command. Stops come first, each group in enumeration order.
pub fn diff_loops(previous: &[Arc<Loop>], current: &[Arc<Loop>], marker: u64) -> CommandBatch {
    let before: HashSet<&str> = previous.iter().map(|l| l.name()).collect();
    let after: HashSet<&str> = current.iter().map(|l| l.name()).collect();

    let mut batch = CommandBatch::new();
    let mut seen = HashSet::new();
    for lp in previous {
        if !after.contains(lp.name()) && seen.insert(lp.name()) {
            batch.push(ClipCommand::for_loop(CommandKind::StopLoop, lp, marker));
        }
    }
    for lp in current {
        if !before.contains(lp.name()) && seen.insert(lp.name()) {
            batch.push(ClipCommand::for_loop(CommandKind::StartLoop, lp, marker));
        }
    }
    batch
}

fn fatal<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("[SCHEDULER] loop model out of sync: {}", e),
    }
}

/// Stimulus-driven scheduler over a [`StateGraph`].
pub struct LoopManager<B: AudioBackend> {
    backend: B,
    graph: StateGraph,
    registry: LoopRegistry,
    bindings: InputBindings,
    gameplay: Box<dyn GameplayHooks>,
    clock: SampleClock,
    previewed: StateId,
    playing: bool,
}

impl<B: AudioBackend> LoopManager<B> {
    /// Take ownership of a fresh graph, commit into its initial state and
    /// start the initial state's loops.
    pub fn new(mut backend: B, mut graph: StateGraph, registry: LoopRegistry) -> Result<Self> {
        if graph.active_id().is_some() {
            return Err(Error::Config(
                "state graph was already started before the manager took it".to_string(),
            ));
        }
        let clock = SampleClock::new(backend.buffer_size());
        let active = graph.advance_state()?;

        let state = graph
            .state(active)
            .ok_or_else(|| Error::UnknownState(active.to_string()))?;
        let batch: CommandBatch = state
            .active_loops()?
            .map(|l| ClipCommand::for_loop(CommandKind::StartLoop, l, 0))
            .collect();
        log::info!(
            "[SCHEDULER] Starting in {} with {} loops, pre-trigger {} samples",
            state.name(),
            batch.len(),
            clock.pre_trigger()
        );
        if !batch.is_empty() {
            backend.send_messages(batch);
        }

        let playing = backend.is_playing();
        let bindings = InputBindings::defaults_for(&graph);
        Ok(Self {
            backend,
            graph,
            registry,
            bindings,
            gameplay: Box::new(NoGameplay),
            clock,
            previewed: active,
            playing,
        })
    }

    /// Replace the gameplay hooks.
    pub fn with_gameplay(mut self, gameplay: Box<dyn GameplayHooks>) -> Self {
        self.gameplay = gameplay;
        self
    }

    /// Replace the input bindings.
    pub fn with_bindings(mut self, bindings: InputBindings) -> Self {
        self.bindings = bindings;
        self
    }

    fn active(&self) -> StateId {
        match self.graph.active_id() {
            Some(id) => id,
            None => panic!("[SCHEDULER] no active state after initialization"),
        }
    }

    fn snapshot(&self) -> Vec<Arc<Loop>> {
        let state = self.graph.active_state();
        let loops = state
            .ok_or_else(|| Error::invalid_state("no active state"))
            .and_then(|s| s.active_loops().map(|it| it.cloned().collect()));
        fatal(loops)
    }

    /// Run one scheduling tick. Call once per host frame.
    pub fn update(&mut self) -> TickOutcome {
        self.clock.observe_buffers(self.backend.num_buffers_completed());
        let window = self.clock.open_window();

        let active = self.active();
        let next = self.graph.next_state();
        if next != self.previewed {
            if self.previewed != active {
                self.graph.show(self.previewed, Feedback::Off);
            }
            if next != active {
                self.graph.show(next, Feedback::Pending);
            }
            self.previewed = next;
        }

        let previous = self.snapshot();
        let pre_trigger = self.clock.pre_trigger();

        let outcome = if self.previewed != active {
            let resolution = self
                .graph
                .active_state()
                .map(|s| s.trigger_resolution())
                .unwrap_or(0);
            if window.crosses_before(resolution, pre_trigger) {
                let to = fatal(self.graph.advance_state());
                TickOutcome::Transitioned { from: active, to }
            } else {
                TickOutcome::Idle
            }
        } else {
            let state = fatal(
                self.graph
                    .active_state_mut()
                    .ok_or_else(|| Error::invalid_state("no active state")),
            );
            let advanced = fatal(
                state.advance_due(|lp| window.crosses_before(lp.head_samples(), pre_trigger)),
            );
            if advanced > 0 {
                TickOutcome::Advanced(advanced)
            } else {
                TickOutcome::Idle
            }
        };

        if self.clock.commit(window, self.backend.max_sample_count()) {
            log::trace!(
                "[SCHEDULER] Playback cycle wrapped ({} total)",
                self.clock.total_loops()
            );
        }

        if !outcome.changed() {
            return TickOutcome::Idle;
        }

        self.gameplay.clear_collision_counters();

        let current = self.snapshot();
        let marker = self
            .graph
            .active_state()
            .map(|s| s.trigger_resolution())
            .unwrap_or(0);
        let batch = diff_loops(&previous, &current, marker);
        log::debug!(
            "[SCHEDULER] {:?} at sample {}: {} commands",
            outcome,
            window.end,
            batch.len()
        );
        if !batch.is_empty() {
            self.backend.send_messages(batch);
        }
        outcome
    }

    /// Start or pause backend playback.
    pub fn play_pause(&mut self, playing: bool) {
        self.playing = playing;
        self.backend.set_play_pause(playing);
    }

    /// Flip the last requested playback state.
    pub fn toggle_play_pause(&mut self) {
        self.play_pause(!self.playing);
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Play a registered loop once, aligned to a quarter of the cycle.
    pub fn trigger_one_shot(&mut self, name: &str) -> Result<()> {
        let lp = self.registry.require(name)?;
        let marker = self.backend.max_sample_count() / 4;
        log::debug!("[SCHEDULER] One-shot {} on {}", lp.name(), lp.voice());
        self.backend
            .send_messages(vec![ClipCommand::for_loop(CommandKind::OneShot, &lp, marker)]);
        Ok(())
    }

    /// Resolve a raw input event against the bindings and apply it.
    pub fn handle_event(&mut self, event: &InputEvent) -> EventOutcome {
        match self.bindings.resolve(event) {
            None => EventOutcome::Ignored,
            Some(InputAction::Stimulus(stimulus)) => {
                self.graph.set_stimulus(stimulus);
                EventOutcome::Handled
            }
            Some(InputAction::OneShot(name)) => match self.trigger_one_shot(&name) {
                Ok(()) => EventOutcome::Handled,
                Err(e) => {
                    log::warn!("[SCHEDULER] {}", e);
                    EventOutcome::Ignored
                }
            },
            Some(InputAction::PlayPause) => {
                self.toggle_play_pause();
                EventOutcome::Handled
            }
            Some(InputAction::Quit) => EventOutcome::Quit,
        }
    }

    pub fn state_graph(&self) -> &StateGraph {
        &self.graph
    }

    pub fn state_graph_mut(&mut self) -> &mut StateGraph {
        &mut self.graph
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn registry(&self) -> &LoopRegistry {
        &self.registry
    }

    pub fn bindings(&self) -> &InputBindings {
        &self.bindings
    }

    /// State most recently returned by the preview.
    pub fn previewed(&self) -> StateId {
        self.previewed
    }

    pub fn sample_position(&self) -> u64 {
        self.clock.position()
    }

    pub fn total_loops(&self) -> u64 {
        self.clock.total_loops()
    }

    pub fn pre_trigger(&self) -> u64 {
        self.clock.pre_trigger()
    }
}
