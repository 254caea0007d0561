//! The state graph: a directed graph of loop states with one active node.
//!
//! Transitions use a two-phase protocol:
//!
//! - [`StateGraph::next_state`] previews the target the advance strategy
//!   would pick right now. It never mutates anything.
//! - [`StateGraph::advance_state`] commits: it exits the active state,
//!   enters the selected one and makes it active.
//!
//! Edges are stored as an adjacency list indexed by [`StateId`]; every edge
//! carries a fixed path vector that the default [`WeightedMax`] strategy
//! scores against the current stimulus.

use crate::error::{Error, Result};
use crate::state::{Feedback, LoopState, NoPresentation, Presentation};
use std::collections::HashSet;
use std::fmt;

/// Index of a state in node-creation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(pub usize);

impl StateId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A directed edge with its path vector.
#[derive(Clone, Debug, PartialEq)]
pub struct Edge {
    pub target: StateId,
    pub path: Vec<f32>,
}

/// Activation state of the graph itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    /// Before the first commit.
    Idle,
    /// Exactly this state is active.
    Active(StateId),
}

/// Dot product of two vectors, treating missing trailing entries as zero.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// One-hot vector of length `len` with a 1 at `id`.
pub fn one_hot(len: usize, id: StateId) -> Vec<f32> {
    (0..len).map(|i| if i == id.0 { 1.0 } else { 0.0 }).collect()
}

/// Picks the target of a transition out of `from`.
///
/// Implementations must be deterministic for a given graph and stimulus,
/// since the preview and the commit have to agree.
pub trait AdvanceStrategy: fmt::Debug + Send + Sync {
    /// Returns `None` when no outgoing edge qualifies; the graph then stays
    /// in `from`.
    fn select(&self, graph: &StateGraph, from: StateId) -> Option<StateId>;
}

/// Follow the outgoing edge whose path vector best matches the stimulus.
///
/// Ties go to the first edge in enumeration order, which for
/// [`GraphBuilder::connect_all`] is the lowest target index.
#[derive(Clone, Copy, Debug, Default)]
pub struct WeightedMax;

impl AdvanceStrategy for WeightedMax {
    fn select(&self, graph: &StateGraph, from: StateId) -> Option<StateId> {
        let stimulus = graph.stimulus();
        let mut best: Option<(f32, StateId)> = None;
        for edge in graph.edges(from) {
            let score = dot(stimulus, &edge.path);
            match best {
                Some((top, _)) if score <= top || score.is_nan() => {}
                _ => best = Some((score, edge.target)),
            }
        }
        best.map(|(_, target)| target)
    }
}

/// Builder for [`StateGraph`].
pub struct GraphBuilder {
    states: Vec<LoopState>,
    edges: Vec<Vec<Edge>>,
    initial: StateId,
    dangling: Option<StateId>,
    stimulus: Option<Vec<f32>>,
    strategy: Box<dyn AdvanceStrategy>,
    presentation: Box<dyn Presentation>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            states: Vec::new(),
            edges: Vec::new(),
            initial: StateId(0),
            dangling: None,
            stimulus: None,
            strategy: Box::new(WeightedMax),
            presentation: Box::new(NoPresentation),
        }
    }

    /// Add a node; ids are assigned in creation order.
    pub fn add_state(&mut self, state: LoopState) -> StateId {
        self.states.push(state);
        self.edges.push(Vec::new());
        StateId(self.states.len() - 1)
    }

    /// Add a directed edge. Endpoints are checked in [`GraphBuilder::build`].
    pub fn add_edge(&mut self, from: StateId, to: StateId, path: Vec<f32>) -> &mut Self {
        match self.edges.get_mut(from.0) {
            Some(out) => out.push(Edge { target: to, path }),
            None => self.dangling = Some(from),
        }
        self
    }

    /// Connect every ordered pair of states (self-loops included), each edge
    /// weighted with the one-hot vector of its target.
    pub fn connect_all(&mut self) -> &mut Self {
        let n = self.states.len();
        for from in 0..n {
            for to in 0..n {
                self.edges[from].push(Edge {
                    target: StateId(to),
                    path: one_hot(n, StateId(to)),
                });
            }
        }
        self
    }

    pub fn initial(&mut self, id: StateId) -> &mut Self {
        self.initial = id;
        self
    }

    /// Starting stimulus; defaults to the one-hot vector of the initial state.
    pub fn stimulus(&mut self, stimulus: Vec<f32>) -> &mut Self {
        self.stimulus = Some(stimulus);
        self
    }

    pub fn strategy(&mut self, strategy: Box<dyn AdvanceStrategy>) -> &mut Self {
        self.strategy = strategy;
        self
    }

    pub fn presentation(&mut self, presentation: Box<dyn Presentation>) -> &mut Self {
        self.presentation = presentation;
        self
    }

    pub fn build(self) -> Result<StateGraph> {
        let n = self.states.len();
        if n == 0 {
            return Err(Error::Config("state graph has no states".to_string()));
        }
        if let Some(from) = self.dangling {
            return Err(Error::UnknownState(from.to_string()));
        }
        if self.initial.0 >= n {
            return Err(Error::UnknownState(self.initial.to_string()));
        }
        let mut names = HashSet::new();
        for state in &self.states {
            if !names.insert(state.name()) {
                return Err(Error::Config(format!("duplicate state name '{}'", state.name())));
            }
        }
        if let Some(edge) = self.edges.iter().flatten().find(|e| e.target.0 >= n) {
            return Err(Error::UnknownState(edge.target.to_string()));
        }

        let stimulus = self.stimulus.unwrap_or_else(|| one_hot(n, self.initial));
        Ok(StateGraph {
            states: self.states,
            edges: self.edges,
            initial: self.initial,
            activation: Activation::Idle,
            stimulus,
            strategy: self.strategy,
            presentation: self.presentation,
        })
    }
}

/// Directed graph of loop states with a single active node.
pub struct StateGraph {
    states: Vec<LoopState>,
    edges: Vec<Vec<Edge>>,
    initial: StateId,
    activation: Activation,
    stimulus: Vec<f32>,
    strategy: Box<dyn AdvanceStrategy>,
    presentation: Box<dyn Presentation>,
}

impl StateGraph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    /// Fully connected graph over `states` with one-hot path vectors.
    pub fn fully_connected(states: Vec<LoopState>, initial: StateId) -> Result<Self> {
        let mut builder = GraphBuilder::new();
        for state in states {
            builder.add_state(state);
        }
        builder.connect_all().initial(initial);
        builder.build()
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn active_id(&self) -> Option<StateId> {
        match self.activation {
            Activation::Idle => None,
            Activation::Active(id) => Some(id),
        }
    }

    pub fn active_state(&self) -> Option<&LoopState> {
        self.active_id().map(|id| &self.states[id.0])
    }

    pub(crate) fn active_state_mut(&mut self) -> Option<&mut LoopState> {
        match self.activation {
            Activation::Idle => None,
            Activation::Active(id) => Some(&mut self.states[id.0]),
        }
    }

    pub fn initial(&self) -> StateId {
        self.initial
    }

    pub fn state(&self, id: StateId) -> Option<&LoopState> {
        self.states.get(id.0)
    }

    pub fn state_id(&self, name: &str) -> Option<StateId> {
        self.states.iter().position(|s| s.name() == name).map(StateId)
    }

    /// Resolve a state name, failing with [`Error::UnknownState`].
    pub fn require_state(&self, name: &str) -> Result<StateId> {
        self.state_id(name)
            .ok_or_else(|| Error::UnknownState(name.to_string()))
    }

    /// All states in creation order.
    pub fn states(&self) -> impl Iterator<Item = (StateId, &LoopState)> {
        self.states.iter().enumerate().map(|(i, s)| (StateId(i), s))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Outgoing edges of `id` in enumeration order.
    pub fn edges(&self, id: StateId) -> &[Edge] {
        self.edges.get(id.0).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn stimulus(&self) -> &[f32] {
        &self.stimulus
    }

    pub fn set_stimulus(&mut self, stimulus: Vec<f32>) {
        log::debug!("[GRAPH] Stimulus set to {:?}", stimulus);
        self.stimulus = stimulus;
    }

    /// Point the stimulus at `id` with its one-hot vector.
    pub fn point_stimulus_at(&mut self, id: StateId) {
        self.set_stimulus(one_hot(self.states.len(), id));
    }

    /// One-hot stimulus vector selecting `id`.
    pub fn one_hot(&self, id: StateId) -> Vec<f32> {
        one_hot(self.states.len(), id)
    }

    /// Preview the state a commit would move to. Pure.
    ///
    /// Before the first commit the preview is taken from the initial state.
    pub fn next_state(&self) -> StateId {
        let from = self.active_id().unwrap_or(self.initial);
        self.strategy.select(self, from).unwrap_or(from)
    }

    /// Commit a transition and return the newly active state.
    ///
    /// The first commit enters the initial state. Later commits exit the
    /// active state and enter the strategy's pick; when the pick is the
    /// active state itself it simply stays active, without restarting.
    pub fn advance_state(&mut self) -> Result<StateId> {
        let current = match self.activation {
            Activation::Idle => {
                let initial = self.initial;
                self.states[initial.0].enter(None, self.presentation.as_mut())?;
                self.activation = Activation::Active(initial);
                return Ok(initial);
            }
            Activation::Active(id) => id,
        };

        let next = self.next_state();
        if next == current {
            log::debug!("[GRAPH] Staying in {}", self.states[current.0].name());
            return Ok(current);
        }

        let previous = self.states[current.0].name().to_string();
        self.states[current.0].exit(self.presentation.as_mut());
        if let Err(e) = self.states[next.0].enter(Some(&previous), self.presentation.as_mut()) {
            log::error!(
                "[GRAPH] Failed to enter {}: {}, restoring {}",
                self.states[next.0].name(),
                e,
                previous
            );
            self.states[current.0].enter(None, self.presentation.as_mut())?;
            return Err(e);
        }
        self.activation = Activation::Active(next);
        Ok(next)
    }

    /// Report visual feedback for a state, if it has a drawable.
    pub fn show(&mut self, id: StateId, feedback: Feedback) {
        if let Some(state) = self.states.get(id.0) {
            state.show(self.presentation.as_mut(), feedback);
        }
    }
}

impl fmt::Debug for StateGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateGraph")
            .field("states", &self.states.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("activation", &self.activation)
            .field("stimulus", &self.stimulus)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}
