//! Independently cycling sub-sequences of loops.
//!
//! A [`LoopSequence`] owns a fixed collection of loops and a selection
//! policy. While its state is active it holds a cursor and an "active loop";
//! outside of activation both are absent and reading or advancing fails.

use crate::error::{Error, Result};
use crate::loops::Loop;
use crate::selection::{LoopCursor, Selector};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// A sub-sequencer over a fixed set of loops.
pub struct LoopSequence {
    name: String,
    loops: Vec<Arc<Loop>>,
    selector: Arc<dyn Selector>,
    cursor: Option<Box<dyn LoopCursor>>,
    active: Option<Arc<Loop>>,
}

impl LoopSequence {
    /// Create a sequence. The loop collection must not be empty.
    pub fn new(
        name: impl Into<String>,
        loops: Vec<Arc<Loop>>,
        selector: Arc<dyn Selector>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::Config("sequence name must not be empty".to_string()));
        }
        if loops.is_empty() {
            return Err(Error::Config(format!("sequence '{}' has no loops", name)));
        }
        Ok(Self {
            name,
            loops,
            selector,
            cursor: None,
            active: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fixed loop collection, in declaration order.
    pub fn loops(&self) -> &[Arc<Loop>] {
        &self.loops
    }

    pub fn selector(&self) -> &dyn Selector {
        self.selector.as_ref()
    }

    /// Longest head among the loops of this sequence.
    pub fn longest_head(&self) -> u64 {
        self.loops.iter().map(|l| l.head_samples()).max().unwrap_or(0)
    }

    pub fn is_active(&self) -> bool {
        self.cursor.is_some()
    }

    /// Currently selected loop, `None` while inactive.
    pub fn active_loop(&self) -> Option<&Arc<Loop>> {
        self.active.as_ref()
    }

    /// Start a fresh run of the selection policy and pull the first loop.
    ///
    /// Fails if the sequence is already active. Pair with
    /// [`LoopSequence::deactivate`], or use [`LoopSequence::scope`].
    pub fn activate(&mut self) -> Result<()> {
        if self.cursor.is_some() {
            return Err(Error::invalid_state(format!(
                "sequence '{}' activated twice",
                self.name
            )));
        }
        let mut cursor = self.selector.start(self.loops.len());
        let first = Arc::clone(&self.loops[cursor.next_index()]);
        self.cursor = Some(cursor);
        self.active = Some(first);
        Ok(())
    }

    /// Drop the cursor and clear the active loop. Idempotent.
    pub fn deactivate(&mut self) {
        self.cursor = None;
        self.active = None;
    }

    /// Pull the next loop from the cursor and make it active.
    pub fn advance(&mut self) -> Result<&Arc<Loop>> {
        let cursor = self.cursor.as_mut().ok_or_else(|| {
            Error::invalid_state(format!("advancing inactive loop sequence '{}'", self.name))
        })?;
        let next = Arc::clone(&self.loops[cursor.next_index()]);
        if self.loops.len() > 1 {
            log::debug!(
                "[SEQUENCE] '{}' switching {} -> {}",
                self.name,
                self.active.as_ref().map(|l| l.name()).unwrap_or("-"),
                next.name()
            );
        }
        Ok(self.active.insert(next))
    }

    /// Activate for the lifetime of the returned guard.
    pub fn scope(&mut self) -> Result<SequenceScope<'_>> {
        self.activate()?;
        Ok(SequenceScope { sequence: self })
    }
}

impl fmt::Debug for LoopSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopSequence")
            .field("name", &self.name)
            .field("loops", &self.loops.iter().map(|l| l.name()).collect::<Vec<_>>())
            .field("selector", &self.selector.name())
            .field("active", &self.active.as_ref().map(|l| l.name()))
            .finish()
    }
}

/// Guard that keeps a sequence active and deactivates it on drop.
pub struct SequenceScope<'a> {
    sequence: &'a mut LoopSequence,
}

impl Deref for SequenceScope<'_> {
    type Target = LoopSequence;

    fn deref(&self) -> &Self::Target {
        self.sequence
    }
}

impl DerefMut for SequenceScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.sequence
    }
}

impl Drop for SequenceScope<'_> {
    fn drop(&mut self) {
        self.sequence.deactivate();
    }
}
