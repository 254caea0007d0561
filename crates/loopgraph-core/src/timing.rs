//! Sample-position clock driven by the backend's buffer counter.
//!
//! This module provides the timing types used by the scheduler:
//!
//! - [`SampleClock`] - Running sample position folded from completed buffers
//! - [`TickWindow`] - The half-open span of samples covered by one update tick
//!
//! The clock never looks at wall-clock time. It only learns about progress
//! when the host reads the backend's completed-buffer count, so a tick may
//! cover any number of buffers and boundaries are detected by bracketing.

/// Number of buffer periods the scheduler looks ahead of a loop boundary.
pub const PRE_TRIGGER_BUFFERS: u64 = 3;

/// Sample span covered by a single update tick.
///
/// `start` is the committed position before the tick, `end` the position
/// the tick will commit (before wrapping).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickWindow {
    pub start: u64,
    pub end: u64,
}

impl TickWindow {
    /// Check whether `trigger` lies in `(start, end]`.
    ///
    /// Negative triggers can never be crossed since positions start at zero.
    #[inline]
    pub fn crosses(&self, trigger: i64) -> bool {
        (self.start as i64) < trigger && trigger <= self.end as i64
    }

    /// Check whether the point `lookahead` samples before `boundary` is crossed.
    #[inline]
    pub fn crosses_before(&self, boundary: u64, lookahead: u64) -> bool {
        self.crosses(boundary as i64 - lookahead as i64)
    }

    /// Number of samples covered by the window.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// True if no samples elapsed during the tick.
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Running sample position of the playback cycle.
///
/// The position wraps modulo the backend's max sample count; every wrap bumps
/// the total loop counter.
#[derive(Clone, Debug)]
pub struct SampleClock {
    buffer_size: u64,
    position: u64,
    pending: u64,
    buffers_completed: u64,
    total_loops: u64,
}

impl SampleClock {
    /// Create a clock at position zero for the given buffer size.
    pub fn new(buffer_size: u64) -> Self {
        Self {
            buffer_size,
            position: 0,
            pending: 0,
            buffers_completed: 0,
            total_loops: 0,
        }
    }

    /// Fold the backend's monotonically increasing buffer counter into the
    /// pending increment.
    ///
    /// Returns the number of buffers that completed since the last call.
    /// A counter that did not move (or went backwards) contributes nothing.
    pub fn observe_buffers(&mut self, completed: u64) -> u64 {
        if completed <= self.buffers_completed {
            return 0;
        }
        let fresh = completed - self.buffers_completed;
        self.pending += fresh * self.buffer_size;
        self.buffers_completed = completed;
        fresh
    }

    /// Consume the pending increment and return the span this tick covers.
    ///
    /// The position itself is not moved until [`SampleClock::commit`].
    pub fn open_window(&mut self) -> TickWindow {
        let window = TickWindow {
            start: self.position,
            end: self.position + self.pending,
        };
        self.pending = 0;
        window
    }

    /// Commit the end of `window` as the new position, wrapping at `max_samples`.
    ///
    /// Returns true when the position wrapped. A zero bound disables wrapping.
    pub fn commit(&mut self, window: TickWindow, max_samples: u64) -> bool {
        self.position = window.end;
        if max_samples > 0 && self.position >= max_samples {
            self.total_loops += 1;
            self.position %= max_samples;
            return true;
        }
        false
    }

    /// Lookahead margin before a boundary at which changes are issued.
    pub fn pre_trigger(&self) -> u64 {
        PRE_TRIGGER_BUFFERS * self.buffer_size
    }

    /// Current committed sample position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Samples accumulated but not yet folded into a window.
    pub fn pending(&self) -> u64 {
        self.pending
    }

    /// Last observed value of the backend buffer counter.
    pub fn buffers_completed(&self) -> u64 {
        self.buffers_completed
    }

    /// Number of full playback-cycle wraps.
    pub fn total_loops(&self) -> u64 {
        self.total_loops
    }

    /// Backend buffer size in samples.
    pub fn buffer_size(&self) -> u64 {
        self.buffer_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_crossing_is_half_open() {
        let window = TickWindow { start: 600, end: 700 };
        assert!(window.crosses(700));
        assert!(window.crosses(601));
        assert!(!window.crosses(600));
        assert!(!window.crosses(701));
        assert!(!window.crosses(-5));
    }

    #[test]
    fn test_crosses_before_negative_trigger() {
        // Boundary shorter than the lookahead: the trigger is never reachable.
        let window = TickWindow { start: 0, end: 10_000 };
        assert!(!window.crosses_before(200, 300));
        assert!(window.crosses_before(1000, 300));
    }

    #[test]
    fn test_buffers_accumulate_between_windows() {
        let mut clock = SampleClock::new(100);
        assert_eq!(clock.observe_buffers(2), 2);
        assert_eq!(clock.observe_buffers(5), 3);
        assert_eq!(clock.observe_buffers(5), 0);
        assert_eq!(clock.pending(), 500);

        let window = clock.open_window();
        assert_eq!(window, TickWindow { start: 0, end: 500 });
        assert_eq!(clock.pending(), 0);
        assert_eq!(clock.position(), 0);
    }

    #[test]
    fn test_commit_wraps_once() {
        let mut clock = SampleClock::new(100);
        clock.observe_buffers(12);
        let window = clock.open_window();
        assert!(clock.commit(window, 1000));
        assert_eq!(clock.position(), 200);
        assert_eq!(clock.total_loops(), 1);

        clock.observe_buffers(13);
        let window = clock.open_window();
        assert!(!clock.commit(window, 1000));
        assert_eq!(clock.position(), 300);
        assert_eq!(clock.total_loops(), 1);
    }

    #[test]
    fn test_zero_bound_never_wraps() {
        let mut clock = SampleClock::new(64);
        clock.observe_buffers(1000);
        let window = clock.open_window();
        assert!(!clock.commit(window, 0));
        assert_eq!(clock.position(), 64_000);
    }

    #[test]
    fn test_pre_trigger_is_three_buffers() {
        assert_eq!(SampleClock::new(4096).pre_trigger(), 3 * 4096);
    }
}
