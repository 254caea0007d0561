//! Selection policies for loop sequences.
//!
//! A [`Selector`] knows how to start a fresh [`LoopCursor`] over a
//! collection of a given length. Cursors are created when a sequence is
//! activated and dropped when it is deactivated, so every activation is an
//! independent run of the policy.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;

/// Produces the next index to play from a fixed collection.
pub trait LoopCursor: Send {
    /// Index of the next element. Always `< len` of the collection the
    /// cursor was started over.
    fn next_index(&mut self) -> usize;
}

/// A pluggable selection policy.
pub trait Selector: fmt::Debug + Send + Sync {
    /// Start a new cursor over a collection of `len` elements (`len > 0`).
    fn start(&self, len: usize) -> Box<dyn LoopCursor>;

    /// Short policy name for logging.
    fn name(&self) -> &'static str;
}

/// Deterministic round-robin over the collection.
#[derive(Clone, Copy, Debug, Default)]
pub struct Cyclic;

struct CyclicCursor {
    len: usize,
    next: usize,
}

impl LoopCursor for CyclicCursor {
    fn next_index(&mut self) -> usize {
        let index = self.next;
        self.next = (self.next + 1) % self.len;
        index
    }
}

impl Selector for Cyclic {
    fn start(&self, len: usize) -> Box<dyn LoopCursor> {
        Box::new(CyclicCursor { len, next: 0 })
    }

    fn name(&self) -> &'static str {
        "cyclic"
    }
}

/// Uniform choice with replacement, independent of history.
///
/// With a seed, every activation replays the same choices.
#[derive(Clone, Copy, Debug, Default)]
pub struct Random {
    seed: Option<u64>,
}

impl Random {
    /// Random selection seeded from the OS on each activation.
    pub fn new() -> Self {
        Self { seed: None }
    }

    /// Random selection that restarts from `seed` on each activation.
    pub fn seeded(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}

struct RandomCursor {
    len: usize,
    rng: StdRng,
}

impl LoopCursor for RandomCursor {
    fn next_index(&mut self) -> usize {
        self.rng.random_range(0..self.len)
    }
}

impl Selector for Random {
    fn start(&self, len: usize) -> Box<dyn LoopCursor> {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Box::new(RandomCursor { len, rng })
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn take(cursor: &mut dyn LoopCursor, n: usize) -> Vec<usize> {
        (0..n).map(|_| cursor.next_index()).collect()
    }

    #[test]
    fn test_cyclic_round_robin() {
        let mut cursor = Cyclic.start(3);
        assert_eq!(take(cursor.as_mut(), 7), vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_cyclic_single_element() {
        let mut cursor = Cyclic.start(1);
        assert_eq!(take(cursor.as_mut(), 3), vec![0, 0, 0]);
    }

    #[test]
    fn test_random_stays_in_range() {
        let mut cursor = Random::new().start(4);
        assert!(take(cursor.as_mut(), 200).into_iter().all(|i| i < 4));
    }

    #[test]
    fn test_seeded_random_restarts() {
        let policy = Random::seeded(7);
        let first = take(policy.start(5).as_mut(), 16);
        let second = take(policy.start(5).as_mut(), 16);
        assert_eq!(first, second);
    }
}
