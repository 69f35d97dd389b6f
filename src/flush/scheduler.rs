use std::time::{Duration, Instant};

/// Where the flush scheduler is in its cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushPhase {
    /// Nothing to write, no timer armed.
    Idle,
    /// Timer armed; puts are accumulating.
    Pending,
    /// A flush is writing to disk.
    Flushing,
    /// A flush found the pipeline busy with nothing to acknowledge and was
    /// pushed back.
    Retrying,
}

/// Debounce timer driving the flush cycle.
///
/// Arming always replaces any earlier deadline, so a burst of puts only ever
/// leaves one deadline outstanding. The generation counter lets a caller that
/// dropped the lock detect that the timer changed underneath it.
#[derive(Debug)]
pub struct DebounceTimer {
    phase: FlushPhase,
    deadline: Option<Instant>,
    generation: u64,
}

impl Default for DebounceTimer {
    fn default() -> Self {
        Self {
            phase: FlushPhase::Idle,
            deadline: None,
            generation: 0,
        }
    }
}

impl DebounceTimer {
    /// Current phase.
    pub fn phase(&self) -> FlushPhase {
        self.phase
    }

    /// Armed deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Bumped on every change of deadline.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Arms the timer `delay` from `now`. A flush in progress keeps its
    /// phase; the deadline applies once it completes.
    pub fn arm(&mut self, now: Instant, delay: Duration) {
        self.deadline = Some(now + delay);
        self.generation = self.generation.wrapping_add(1);
        if self.phase != FlushPhase::Flushing {
            self.phase = FlushPhase::Pending;
        }
    }

    /// Cancels any armed deadline and arms a new one.
    pub fn rearm(&mut self, now: Instant, delay: Duration) {
        self.cancel();
        self.arm(now, delay);
    }

    /// Disarms the timer.
    pub fn cancel(&mut self) {
        self.deadline = None;
        self.generation = self.generation.wrapping_add(1);
        if matches!(self.phase, FlushPhase::Pending | FlushPhase::Retrying) {
            self.phase = FlushPhase::Idle;
        }
    }

    /// True when an armed deadline has passed.
    pub fn is_due(&self, now: Instant) -> bool {
        matches!(self.phase, FlushPhase::Pending | FlushPhase::Retrying)
            && self.deadline.is_some_and(|d| d <= now)
    }

    /// Enters `Flushing`, consuming the deadline.
    pub fn fire(&mut self) {
        self.phase = FlushPhase::Flushing;
        self.deadline = None;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Pushes a due flush back by `delay`.
    pub fn defer(&mut self, now: Instant, delay: Duration) {
        self.phase = FlushPhase::Retrying;
        self.deadline = Some(now + delay);
        self.generation = self.generation.wrapping_add(1);
    }

    /// Leaves `Flushing`. Puts that arrived during the flush left a deadline
    /// behind, which puts the timer back in `Pending`.
    pub fn complete(&mut self) {
        self.phase = if self.deadline.is_some() {
            FlushPhase::Pending
        } else {
            FlushPhase::Idle
        };
    }
}
