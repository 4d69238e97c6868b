//! C6 - Tone State Machine (spec §4.6).
//!
//! Pure decision function plus the small piece of state (`current`,
//! `last_escalation_at`) it needs to answer. The machine is advisory only:
//! the Coordinator always records the raw proposed tone into analytics even
//! when `should_update` returns false.

use std::time::{Duration, Instant};

use crate::model::ToneStatus;

/// Dwell window protecting against flicker after an escalation (spec §4.6,
/// tunable via [`crate::config::TuningConfig::dwell_ms`]).
pub const DEFAULT_DWELL: Duration = Duration::from_secs(3);

/// Minimum `improvement_score` for rule 4 to apply (spec §4.6, tunable via
/// [`crate::config::TuningConfig::improvement_threshold`]).
pub const DEFAULT_IMPROVEMENT_THRESHOLD: f64 = 0.3;

/// Minimum character shrink for rule 5 ("user erased") to apply.
pub const DEFAULT_SHRINK_CHARS: usize = 3;

pub struct ToneStateMachine {
    current: ToneStatus,
    last_escalation_at: Option<Instant>,
    dwell: Duration,
    improvement_threshold: f64,
    shrink_chars: usize,
}

/// Inputs to a single transition decision (spec §4.6).
pub struct ToneProposal {
    pub proposed: ToneStatus,
    pub improvement: bool,
    pub improvement_score: f64,
    pub previous_text_len: usize,
    pub new_text_len: usize,
}

impl ToneStateMachine {
    pub fn new(dwell: Duration, improvement_threshold: f64, shrink_chars: usize) -> Self {
        Self {
            current: ToneStatus::Neutral,
            last_escalation_at: None,
            dwell,
            improvement_threshold,
            shrink_chars,
        }
    }

    pub fn current(&self) -> ToneStatus {
        self.current
    }

    /// Reset to the initial state (spec §4.8 `reset()`).
    pub fn reset(&mut self) {
        self.current = ToneStatus::Neutral;
        self.last_escalation_at = None;
    }

    /// Apply the six-rule cascade from spec §4.6 and, if accepted, update
    /// internal state. Returns whether the visible tone should change.
    pub fn should_update(&mut self, proposal: &ToneProposal) -> bool {
        self.should_update_at(proposal, Instant::now())
    }

    pub fn should_update_at(&mut self, proposal: &ToneProposal, now: Instant) -> bool {
        let decision = self.decide(proposal, now);
        if decision {
            if proposal.proposed.severity() > self.current.severity() {
                self.last_escalation_at = Some(now);
            }
            self.current = proposal.proposed;
        }
        decision
    }

    fn decide(&self, proposal: &ToneProposal, now: Instant) -> bool {
        // 1. No-op if unchanged.
        if proposal.proposed == self.current {
            return false;
        }

        // 2. Escalation always wins.
        if proposal.proposed.severity() > self.current.severity() {
            return true;
        }

        // 4. Explicit improvement signal overrides the dwell gate below.
        if proposal.improvement && proposal.improvement_score > self.improvement_threshold {
            return true;
        }

        // 5. User erased a meaningful amount of text; also overrides dwell.
        if proposal.previous_text_len >= proposal.new_text_len
            && proposal.previous_text_len - proposal.new_text_len >= self.shrink_chars
        {
            return true;
        }

        // 3. Dwell window protects caution/alert from flicker-downgrade,
        // unless rule 4 or 5 above already returned.
        if matches!(self.current, ToneStatus::Caution | ToneStatus::Alert) {
            if let Some(last) = self.last_escalation_at {
                if now.duration_since(last) < self.dwell {
                    return false;
                }
            }
        }

        // 6. Nothing blocks it once the dwell window has elapsed (or never applied).
        true
    }
}

impl Default for ToneStateMachine {
    fn default() -> Self {
        Self::new(DEFAULT_DWELL, DEFAULT_IMPROVEMENT_THRESHOLD, DEFAULT_SHRINK_CHARS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(proposed: ToneStatus) -> ToneProposal {
        ToneProposal {
            proposed,
            improvement: false,
            improvement_score: 0.0,
            previous_text_len: 10,
            new_text_len: 10,
        }
    }

    #[test]
    fn unchanged_proposal_is_rejected() {
        let mut m = ToneStateMachine::default();
        assert!(!m.should_update(&proposal(ToneStatus::Neutral)));
    }

    #[test]
    fn escalation_is_always_accepted_and_records_timestamp() {
        let mut m = ToneStateMachine::default();
        let now = Instant::now();
        assert!(m.should_update_at(&proposal(ToneStatus::Alert), now));
        assert_eq!(m.current(), ToneStatus::Alert);
    }

    #[test]
    fn downgrade_within_dwell_window_is_rejected() {
        let mut m = ToneStateMachine::default();
        let t0 = Instant::now();
        m.should_update_at(&proposal(ToneStatus::Alert), t0);
        let at_2999ms = t0 + Duration::from_millis(2999);
        assert!(!m.should_update_at(&proposal(ToneStatus::Neutral), at_2999ms));
    }

    #[test]
    fn downgrade_after_dwell_window_is_accepted() {
        let mut m = ToneStateMachine::default();
        let t0 = Instant::now();
        m.should_update_at(&proposal(ToneStatus::Alert), t0);
        let at_3001ms = t0 + Duration::from_millis(3001);
        assert!(m.should_update_at(&proposal(ToneStatus::Neutral), at_3001ms));
    }

    #[test]
    fn improvement_signal_above_threshold_overrides_dwell() {
        let mut m = ToneStateMachine::default();
        let t0 = Instant::now();
        m.should_update_at(&proposal(ToneStatus::Alert), t0);
        // Still well within the 3s dwell window - only the improvement
        // signal can explain an accepted downgrade here.
        let at_1s = t0 + Duration::from_secs(1);
        let mut p = proposal(ToneStatus::Neutral);
        p.improvement = true;
        p.improvement_score = 0.5;
        assert!(m.should_update_at(&p, at_1s));
    }

    #[test]
    fn improvement_signal_at_threshold_is_not_strictly_greater_so_rejected() {
        let mut m = ToneStateMachine::default();
        let t0 = Instant::now();
        m.should_update_at(&proposal(ToneStatus::Alert), t0);
        // Within the dwell window and no erase signal, so a score equal to
        // (not above) the threshold must still be blocked.
        let at_1s = t0 + Duration::from_secs(1);
        let mut p = proposal(ToneStatus::Neutral);
        p.improvement = true;
        p.improvement_score = 0.3;
        assert!(!m.should_update_at(&p, at_1s));
    }

    #[test]
    fn user_erased_meaningful_text_overrides_dwell() {
        let mut m = ToneStateMachine::default();
        let t0 = Instant::now();
        m.should_update_at(&proposal(ToneStatus::Caution), t0);
        // Within the dwell window - only the erase signal explains an
        // accepted downgrade here.
        let at_1s = t0 + Duration::from_secs(1);
        let mut p = proposal(ToneStatus::Neutral);
        p.previous_text_len = 10;
        p.new_text_len = 6;
        assert!(m.should_update_at(&p, at_1s));
    }

    #[test]
    fn small_edit_within_dwell_window_is_rejected() {
        let mut m = ToneStateMachine::default();
        let t0 = Instant::now();
        m.should_update_at(&proposal(ToneStatus::Caution), t0);
        let at_1s = t0 + Duration::from_secs(1);
        let mut p = proposal(ToneStatus::Neutral);
        p.previous_text_len = 10;
        p.new_text_len = 9; // shrink of 1, below shrink_chars (3)
        assert!(!m.should_update_at(&p, at_1s));
    }

    #[test]
    fn reset_returns_to_neutral_with_no_escalation_memory() {
        let mut m = ToneStateMachine::default();
        m.should_update(&proposal(ToneStatus::Alert));
        m.reset();
        assert_eq!(m.current(), ToneStatus::Neutral);
    }
}
