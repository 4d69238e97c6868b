//! Secure Fix typing animation (spec §5, §9 Design Notes #3).
//!
//! The legacy keyboard controller plays Secure Fix rewrites back into the
//! edit field character-by-character rather than replacing the text in one
//! shot. Modeled here as a precomputed sequence of `{DeleteBackward,
//! InsertChar}` steps at a ~50ms/char cadence, cancellable the same way C7
//! cancels a debounce: bumping a generation counter the host checks before
//! applying each step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Interval between animation steps. Tunable per spec §9 ("marked tunable").
pub const STEP_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingStep {
    DeleteBackward,
    InsertChar(char),
}

pub struct TypingAnimator {
    steps: Vec<TypingStep>,
    cancelled: AtomicBool,
}

impl TypingAnimator {
    /// Build the step sequence to turn `current` into `rewrite`: delete every
    /// character of `current`, then insert every character of `rewrite`.
    pub fn new(current: &str, rewrite: &str) -> Self {
        let mut steps = Vec::with_capacity(current.chars().count() + rewrite.chars().count());
        for _ in current.chars() {
            steps.push(TypingStep::DeleteBackward);
        }
        for c in rewrite.chars() {
            steps.push(TypingStep::InsertChar(c));
        }
        Self {
            steps,
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn steps(&self) -> &[TypingStep] {
        &self.steps
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Cancel the animation - called when the user keeps typing mid-sequence.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}
