//! C7 - Stream Scheduler (spec §4.7).
//!
//! Debounces a stream of text snapshots from the host into one of three
//! decisions: `skip`, `analyze_now`, or `analyze_after(ms)`. Concurrency
//! model is single-threaded cooperative (spec §5): `decide` never blocks,
//! any actual waiting happens in the caller's timer/run-loop. Cancellation
//! is by `token` comparison - every non-skip decision bumps a generation
//! counter; the caller discards a timer whose token no longer matches
//! [`StreamScheduler::token`].

use std::time::{Duration, Instant};

const WORD_BOUNDARY_CHARS: &[char] = &['.', ',', '!', '?', ';', ':', '-', '(', ')', '[', ']', '{', '}', '"', '\''];

const DEFAULT_MIN_CHARS_FOR_ANALYSIS: usize = 5;
const DEFAULT_MIN_ANALYSIS_INTERVAL: Duration = Duration::from_millis(80);
const DEFAULT_IDLE_DEBOUNCE: Duration = Duration::from_millis(100);
const DEFAULT_IDLE_DEBOUNCE_SHORT: Duration = Duration::from_millis(50);
const SHORT_TEXT_THRESHOLD: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Skip,
    AnalyzeNow,
    AnalyzeAfter(Duration),
}

/// A decision paired with the generation token that cancels any prior
/// not-yet-fired `AnalyzeAfter`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledDecision {
    pub decision: Decision,
    pub token: u64,
}

pub struct StreamScheduler {
    last_decided_text: Option<String>,
    last_analyzed_text: String,
    last_analysis_at: Option<Instant>,
    generation: u64,
    min_chars_for_analysis: usize,
    min_analysis_interval: Duration,
    idle_debounce: Duration,
    idle_debounce_short: Duration,
}

impl StreamScheduler {
    pub fn new() -> Self {
        Self::with_tuning(
            DEFAULT_MIN_CHARS_FOR_ANALYSIS,
            DEFAULT_MIN_ANALYSIS_INTERVAL,
            DEFAULT_IDLE_DEBOUNCE,
            DEFAULT_IDLE_DEBOUNCE_SHORT,
        )
    }

    /// Construct with tunable debounce parameters (spec §9 Open Question 2,
    /// exposed via [`crate::config::TuningConfig`]).
    pub fn with_tuning(
        min_chars_for_analysis: usize,
        min_analysis_interval: Duration,
        idle_debounce: Duration,
        idle_debounce_short: Duration,
    ) -> Self {
        Self {
            last_decided_text: None,
            last_analyzed_text: String::new(),
            last_analysis_at: None,
            generation: 0,
            min_chars_for_analysis,
            min_analysis_interval,
            idle_debounce,
            idle_debounce_short,
        }
    }

    /// Current cancellation token. A scheduled job is still valid only if it
    /// was issued with this value.
    pub fn token(&self) -> u64 {
        self.generation
    }

    pub fn decide(&mut self, snapshot: &str) -> ScheduledDecision {
        self.decide_at(snapshot, Instant::now())
    }

    pub fn decide_at(&mut self, snapshot: &str, now: Instant) -> ScheduledDecision {
        let t = snapshot.trim().to_string();

        let changed = self.last_decided_text.as_deref() != Some(t.as_str());
        self.last_decided_text = Some(t.clone());

        if !changed || normalize(&t) == normalize(&self.last_analyzed_text) {
            return ScheduledDecision {
                decision: Decision::Skip,
                token: self.generation,
            };
        }

        let decision = if t.len() < self.min_chars_for_analysis && !t.is_empty() {
            Decision::Skip
        } else if t.is_empty() && !self.last_analyzed_text.is_empty() {
            Decision::AnalyzeNow
        } else if t.chars().last().is_some_and(is_word_boundary) {
            Decision::AnalyzeNow
        } else if word_count(&t) != word_count(&self.last_analyzed_text) {
            Decision::AnalyzeNow
        } else if self
            .last_analysis_at
            .is_some_and(|last| now.duration_since(last) < self.min_analysis_interval)
        {
            Decision::Skip
        } else if t.chars().count() <= SHORT_TEXT_THRESHOLD {
            Decision::AnalyzeAfter(self.idle_debounce)
        } else {
            Decision::AnalyzeAfter(self.idle_debounce_short)
        };

        if decision != Decision::Skip {
            self.generation += 1;
        }

        ScheduledDecision {
            decision,
            token: self.generation,
        }
    }

    /// Character length of the text the previous analysis ran against, used
    /// by the tone machine's erase-detection rule (spec §4.6 rule 5).
    pub fn last_analyzed_len(&self) -> usize {
        self.last_analyzed_text.chars().count()
    }

    /// Record that an analysis actually ran for `text`, so subsequent
    /// decisions compare against it. Called by the coordinator after
    /// dispatching (not merely deciding) an analysis.
    pub fn mark_analyzed(&mut self, text: &str, now: Instant) {
        self.last_analyzed_text = text.trim().to_string();
        self.last_analysis_at = Some(now);
    }

    pub fn reset(&mut self) {
        self.last_decided_text = None;
        self.last_analyzed_text.clear();
        self.last_analysis_at = None;
        self.generation += 1;
    }
}

impl Default for StreamScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn is_word_boundary(c: char) -> bool {
    c.is_whitespace() || WORD_BOUNDARY_CHARS.contains(&c)
}

fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_nonempty_text_is_skipped() {
        let mut s = StreamScheduler::new();
        assert_eq!(s.decide("hi").decision, Decision::Skip);
    }

    #[test]
    fn clearing_nonempty_text_triggers_immediate_reset_analysis() {
        let mut s = StreamScheduler::new();
        let t0 = Instant::now();
        s.decide_at("hello world", t0);
        s.mark_analyzed("hello world", t0);
        let d = s.decide_at("", t0 + Duration::from_millis(10));
        assert_eq!(d.decision, Decision::AnalyzeNow);
    }

    #[test]
    fn word_boundary_character_triggers_immediate_analysis() {
        let mut s = StreamScheduler::new();
        let d = s.decide("hello ");
        assert_eq!(d.decision, Decision::AnalyzeNow);
    }

    #[test]
    fn debounce_stream_only_final_word_boundary_snapshot_analyzes() {
        let mut s = StreamScheduler::new();
        let t0 = Instant::now();
        for (i, partial) in ["h", "he", "hel", "hell", "hello"].iter().enumerate() {
            let d = s.decide_at(partial, t0 + Duration::from_millis(i as u64 * 10));
            assert_eq!(d.decision, Decision::Skip, "{partial} should not trigger");
        }
        let d = s.decide_at("hello ", t0 + Duration::from_millis(60));
        assert_eq!(d.decision, Decision::AnalyzeNow);
    }

    #[test]
    fn word_count_change_without_boundary_char_triggers_analysis() {
        let mut s = StreamScheduler::new();
        let t0 = Instant::now();
        s.decide_at("hello world", t0);
        s.mark_analyzed("hello world", t0);
        let d = s.decide_at("hello world again", t0 + Duration::from_millis(200));
        assert_eq!(d.decision, Decision::AnalyzeNow);
    }

    #[test]
    fn repeat_analysis_within_80ms_is_skipped() {
        let mut s = StreamScheduler::new();
        let t0 = Instant::now();
        s.decide_at("hello world", t0);
        s.mark_analyzed("hello world", t0);
        let d = s.decide_at("hello worldx", t0 + Duration::from_millis(10));
        assert_eq!(d.decision, Decision::Skip);
    }

    #[test]
    fn idle_debounce_after_interval_uses_short_text_timing() {
        let mut s = StreamScheduler::new();
        let t0 = Instant::now();
        s.decide_at("hello world", t0);
        s.mark_analyzed("hello world", t0);
        let d = s.decide_at("hello worldx", t0 + Duration::from_millis(200));
        assert_eq!(d.decision, Decision::AnalyzeAfter(Duration::from_millis(100)));
    }

    #[test]
    fn idle_debounce_for_long_text_uses_short_delay() {
        let mut s = StreamScheduler::new();
        let long = "a".repeat(25);
        let t0 = Instant::now();
        s.decide_at(&long, t0);
        s.mark_analyzed(&long, t0);
        let longer = format!("{long}x");
        let d = s.decide_at(&longer, t0 + Duration::from_millis(200));
        assert_eq!(d.decision, Decision::AnalyzeAfter(Duration::from_millis(50)));
    }

    #[test]
    fn unchanged_text_since_last_decision_is_skipped() {
        let mut s = StreamScheduler::new();
        s.decide("hello world");
        let d = s.decide("hello world");
        assert_eq!(d.decision, Decision::Skip);
    }

    #[test]
    fn non_skip_decisions_bump_the_cancellation_token() {
        let mut s = StreamScheduler::new();
        let before = s.token();
        s.decide("hello ");
        assert!(s.token() > before);
    }

    #[test]
    fn last_analyzed_len_tracks_marked_text_in_chars() {
        let mut s = StreamScheduler::new();
        assert_eq!(s.last_analyzed_len(), 0);
        s.mark_analyzed("héllo", Instant::now());
        assert_eq!(s.last_analyzed_len(), 5);
    }

    #[test]
    fn with_tuning_overrides_default_debounce_and_threshold() {
        let mut s = StreamScheduler::with_tuning(
            2,
            Duration::from_millis(10),
            Duration::from_millis(500),
            Duration::from_millis(200),
        );
        // Below the default (5) but above the custom floor (2), so it no
        // longer skips.
        let t0 = Instant::now();
        let d = s.decide_at("hi", t0);
        assert_ne!(d.decision, Decision::Skip);
    }
}
