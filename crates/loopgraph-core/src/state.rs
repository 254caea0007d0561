//! Loop states: the nodes of the state graph.
//!
//! A [`LoopState`] groups several [`LoopSequence`]s that play together. All
//! of its sequences are activated as one unit when the graph transitions
//! into the state and deactivated together (in reverse order) when it
//! leaves. States may carry a [`DrawableHandle`], in which case activation
//! boundaries are reported to a [`Presentation`] sink.

use crate::error::{Error, Result};
use crate::loops::Loop;
use crate::sequence::LoopSequence;
use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Handle of the visual element representing a state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DrawableHandle(pub usize);

/// Visual feedback shown for a state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feedback {
    /// Not playing and not about to.
    Off,
    /// Selected as the next state, waiting for the boundary.
    Pending,
    /// Currently active.
    Playing,
}

/// Presentation layer notified about state feedback changes.
pub trait Presentation: Send {
    fn set_visual_feedback(&mut self, handle: DrawableHandle, feedback: Feedback);
}

/// Presentation sink that ignores every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPresentation;

impl Presentation for NoPresentation {
    fn set_visual_feedback(&mut self, _handle: DrawableHandle, _feedback: Feedback) {}
}

/// Iterator over the active loop of each sequence in a state.
pub struct ActiveLoops<'a> {
    inner: std::slice::Iter<'a, LoopSequence>,
}

impl<'a> Iterator for ActiveLoops<'a> {
    type Item = &'a Arc<Loop>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.by_ref().find_map(|seq| seq.active_loop())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.inner.len()))
    }
}

/// A node of the state graph.
#[derive(Debug)]
pub struct LoopState {
    name: String,
    sequences: Vec<LoopSequence>,
    active: bool,
    trigger_resolution: u64,
    drawable: Option<DrawableHandle>,
}

impl LoopState {
    /// Create a state from its sequences. Sequence names must be unique.
    ///
    /// The trigger resolution is fixed here as the longest head among all
    /// loops of all sequences.
    pub fn new(name: impl Into<String>, sequences: Vec<LoopSequence>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::Config("state name must not be empty".to_string()));
        }
        let mut seen = HashSet::new();
        for seq in &sequences {
            if !seen.insert(seq.name()) {
                return Err(Error::Config(format!(
                    "state '{}' contains sequence '{}' twice",
                    name,
                    seq.name()
                )));
            }
        }
        let trigger_resolution = sequences.iter().map(|s| s.longest_head()).max().unwrap_or(0);
        Ok(Self {
            name,
            sequences,
            active: false,
            trigger_resolution,
            drawable: None,
        })
    }

    /// Attach a visual element to this state.
    pub fn with_drawable(mut self, handle: DrawableHandle) -> Self {
        self.drawable = Some(handle);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Sample length of the longest head segment in this state.
    pub fn trigger_resolution(&self) -> u64 {
        self.trigger_resolution
    }

    pub fn drawable(&self) -> Option<DrawableHandle> {
        self.drawable
    }

    pub fn sequences(&self) -> &[LoopSequence] {
        &self.sequences
    }

    pub fn sequence(&self, name: &str) -> Option<&LoopSequence> {
        self.sequences.iter().find(|s| s.name() == name)
    }

    /// Report `feedback` for this state if it has a drawable.
    pub fn show(&self, presentation: &mut dyn Presentation, feedback: Feedback) {
        if let Some(handle) = self.drawable {
            presentation.set_visual_feedback(handle, feedback);
        }
    }

    /// Activate the state and all its sequences.
    ///
    /// Either every sequence is entered or, on failure, the ones already
    /// entered are backed out again and the state stays inactive.
    pub fn enter(
        &mut self,
        previous: Option<&str>,
        presentation: &mut dyn Presentation,
    ) -> Result<()> {
        if self.active {
            return Err(Error::invalid_state(format!(
                "state '{}' entered while already active",
                self.name
            )));
        }
        match previous {
            Some(prev) => log::info!("[STATE] Changing state from {} to {}", prev, self.name),
            None => log::info!("[STATE] Entering state {}", self.name),
        }

        for index in 0..self.sequences.len() {
            if let Err(e) = self.sequences[index].activate() {
                for entered in self.sequences[..index].iter_mut().rev() {
                    entered.deactivate();
                }
                return Err(e);
            }
        }
        self.active = true;
        self.show(presentation, Feedback::Playing);
        Ok(())
    }

    /// Deactivate all sequences in reverse order of entry, then the state.
    pub fn exit(&mut self, presentation: &mut dyn Presentation) {
        for seq in self.sequences.iter_mut().rev() {
            seq.deactivate();
        }
        if self.active {
            self.show(presentation, Feedback::Off);
        }
        self.active = false;
    }

    /// Enter the state for the lifetime of the returned guard.
    pub fn scope<'a>(
        &'a mut self,
        previous: Option<&str>,
        presentation: &'a mut dyn Presentation,
    ) -> Result<StateScope<'a>> {
        self.enter(previous, presentation)?;
        Ok(StateScope {
            state: self,
            presentation,
        })
    }

    /// Lazily yield the active loop of every sequence.
    pub fn active_loops(&self) -> Result<ActiveLoops<'_>> {
        if !self.active {
            return Err(Error::invalid_state(format!(
                "reading active loops of inactive state '{}'",
                self.name
            )));
        }
        Ok(ActiveLoops {
            inner: self.sequences.iter(),
        })
    }

    /// Advance one named sequence, or every sequence when `sequence` is
    /// `None`, and return the refreshed active loops.
    pub fn advance(&mut self, sequence: Option<&str>) -> Result<ActiveLoops<'_>> {
        if !self.active {
            return Err(Error::invalid_state(format!(
                "advancing inactive state '{}'",
                self.name
            )));
        }
        match sequence {
            None => {
                for seq in &mut self.sequences {
                    seq.advance()?;
                }
            }
            Some(wanted) => {
                let seq = self
                    .sequences
                    .iter_mut()
                    .find(|s| s.name() == wanted)
                    .ok_or_else(|| Error::UnknownSequence {
                        state: self.name.clone(),
                        sequence: wanted.to_string(),
                    })?;
                seq.advance()?;
            }
        }
        self.active_loops()
    }

    /// Advance every sequence whose current loop satisfies `due`.
    ///
    /// Returns how many sequences were advanced.
    pub fn advance_due<F>(&mut self, mut due: F) -> Result<usize>
    where
        F: FnMut(&Loop) -> bool,
    {
        if !self.active {
            return Err(Error::invalid_state(format!(
                "advancing inactive state '{}'",
                self.name
            )));
        }
        let mut advanced = 0;
        for seq in &mut self.sequences {
            let is_due = match seq.active_loop() {
                Some(current) => due(current),
                None => {
                    return Err(Error::invalid_state(format!(
                        "sequence '{}' inactive inside active state",
                        seq.name()
                    )))
                }
            };
            if is_due {
                seq.advance()?;
                advanced += 1;
            }
        }
        Ok(advanced)
    }
}

/// Guard that keeps a state active and exits it on drop.
pub struct StateScope<'a> {
    state: &'a mut LoopState,
    presentation: &'a mut dyn Presentation,
}

impl Deref for StateScope<'_> {
    type Target = LoopState;

    fn deref(&self) -> &Self::Target {
        self.state
    }
}

impl DerefMut for StateScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.state
    }
}

impl Drop for StateScope<'_> {
    fn drop(&mut self) {
        self.state.exit(&mut *self.presentation);
    }
}
