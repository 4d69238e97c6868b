//! Wire-level and in-memory data types shared across the coordinator.
//!
//! These map directly to spec §3 ("DATA MODEL"): `ToneStatus`,
//! `PersonalityProfile`, `AnalysisRequest`/`AnalysisResult`, `ConversationTurn`,
//! `AnalyticsEvent` and `QuotaLedger`. Every type here is plain data - the
//! behavior that enforces the invariants lives in the owning module
//! (`quota.rs` for `QuotaLedger`, `history.rs` for the ring of
//! `ConversationTurn`, etc).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum characters carried in an [`AnalysisRequest::text`] field before
/// right-truncation (spec §3, boundary behavior in spec §8).
pub const MAX_REQUEST_TEXT_CHARS: usize = 1000;

/// Maximum number of turns retained in a conversation history snapshot.
pub const MAX_HISTORY_TURNS: usize = 20;

/// A discrete label of emotional valence visible in the keyboard UI.
///
/// `Neutral` is the initial state. `Analyzing` is transient - it is shown
/// while a request is in flight and must never be the terminal state once an
/// analysis has completed (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToneStatus {
    Neutral,
    Clear,
    Caution,
    Alert,
    Analyzing,
}

impl ToneStatus {
    /// Severity rank used by the tone state machine (spec §4.6).
    ///
    /// `neutral = clear = analyzing = 0`, `caution = 1`, `alert = 2`.
    pub fn severity(self) -> u8 {
        match self {
            ToneStatus::Neutral | ToneStatus::Clear | ToneStatus::Analyzing => 0,
            ToneStatus::Caution => 1,
            ToneStatus::Alert => 2,
        }
    }

    /// Parse a free-form tone label returned by the remote endpoints
    /// (`tone`, `primaryTone`, `analysis.tone`, `extras.tone` - spec §4.5).
    pub fn parse_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "neutral" => Some(ToneStatus::Neutral),
            "clear" => Some(ToneStatus::Clear),
            "caution" => Some(ToneStatus::Caution),
            "alert" => Some(ToneStatus::Alert),
            "analyzing" => Some(ToneStatus::Analyzing),
            _ => None,
        }
    }
}

impl Default for ToneStatus {
    fn default() -> Self {
        ToneStatus::Neutral
    }
}

/// One of the five attachment-style buckets the personality flow assigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentStyle {
    Secure,
    Anxious,
    Avoidant,
    Disorganized,
    Unknown,
}

impl Default for AttachmentStyle {
    fn default() -> Self {
        AttachmentStyle::Unknown
    }
}

/// Coarse emotional-load bucket carried alongside the attachment style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionalBucket {
    High,
    Moderate,
    Regulated,
}

impl Default for EmotionalBucket {
    fn default() -> Self {
        EmotionalBucket::Regulated
    }
}

/// Immutable snapshot of the personality profile (spec §3/§4.1).
///
/// Consumers never see partial or null fields - every field carries a
/// default so downstream code can read it without an `Option` check. The
/// profile is read-only here; it is produced by an external assessment flow
/// we do not implement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalityProfile {
    pub attachment_style: AttachmentStyle,
    pub communication_style: String,
    pub personality_type: String,
    pub emotional_state: String,
    pub emotional_bucket: EmotionalBucket,
    pub scores: HashMap<String, i64>,
    pub is_complete: bool,
    pub data_age_hours: f64,
}

impl PersonalityProfile {
    /// The sentinel profile returned whenever the shared-storage read fails
    /// (spec §4.1): unknown attachment style, incomplete, empty scores.
    pub fn sentinel() -> Self {
        Self {
            attachment_style: AttachmentStyle::Unknown,
            communication_style: String::new(),
            personality_type: String::new(),
            emotional_state: String::new(),
            emotional_bucket: EmotionalBucket::Regulated,
            scores: HashMap::new(),
            is_complete: false,
            data_age_hours: 0.0,
        }
    }

    /// `is_complete ⇒ scores non-empty` (spec §3 invariant).
    pub fn is_valid(&self) -> bool {
        if self.is_complete {
            !self.scores.is_empty()
        } else {
            true
        }
    }
}

impl Default for PersonalityProfile {
    fn default() -> Self {
        Self::sentinel()
    }
}

/// Who sent a turn in the conversation history (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Other,
    System,
}

/// One turn of the conversation, as kept by [`crate::history::ConversationLog`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub sender: Sender,
    pub text: String,
    /// Wall-clock seconds. Invariant: non-decreasing within the ring buffer.
    pub ts: f64,
}

/// Which optional remote features a request opts into (spec §3/§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Rewrite,
    Advice,
    Evidence,
}

/// A single request dispatched to the remote client (spec §3).
///
/// `request_id` must be freshly generated per call - it is what the
/// stale-response guard in [`crate::remote::RemoteClient`] compares against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub text: String,
    pub request_id: Uuid,
    pub user_id: String,
    pub user_email: Option<String>,
    pub profile: PersonalityProfile,
    pub history: Vec<ConversationTurn>,
    pub features: Vec<Feature>,
    pub tone_override: Option<ToneStatus>,
    pub meta: HashMap<String, String>,
}

impl AnalysisRequest {
    /// Right-truncate `text` to [`MAX_REQUEST_TEXT_CHARS`] and cap `history`
    /// to [`MAX_HISTORY_TURNS`], per spec §3/§8 boundary behavior.
    pub fn normalize(mut self) -> Self {
        self.text = truncate_right(&self.text, MAX_REQUEST_TEXT_CHARS);
        if self.history.len() > MAX_HISTORY_TURNS {
            let start = self.history.len() - MAX_HISTORY_TURNS;
            self.history = self.history.split_off(start);
        }
        self
    }
}

/// Right-truncate a string to at most `max_chars` Unicode scalar values.
///
/// Text exactly `max_chars` long is untouched; anything longer keeps only
/// the *last* `max_chars` characters (spec §3: "right-truncated").
pub fn truncate_right(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        return s.to_string();
    }
    let skip = char_count - max_chars;
    s.chars().skip(skip).collect()
}

/// Normalized result of a tone or suggestion analysis (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub tone: Option<ToneStatus>,
    pub confidence: Option<f64>,
    pub suggestion: Option<String>,
    pub quick_fixes: Vec<String>,
    pub features_used: u32,
    pub quality: f64,
    /// Opaque raw payload, kept for debugging/telemetry only.
    #[serde(skip)]
    pub raw: Option<serde_json::Value>,
}

/// Tagged analytics events (spec §3). Every variant carries only lengths and
/// hashes of user text, never the text itself - the one documented exception
/// is accepted-suggestion text shipped to `communicator/observe` (spec §4.8,
/// Design Notes), which is modeled separately as part of the remote client
/// request body, not as an `AnalyticsEvent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AnalyticsEvent {
    Interaction {
        id: Uuid,
        ts: f64,
        action: String,
    },
    ToneSample {
        id: Uuid,
        ts: f64,
        tone: ToneStatus,
        text_len: usize,
        text_hash: String,
    },
    SuggestionOutcome {
        id: Uuid,
        ts: f64,
        accepted: bool,
        suggestion_len: usize,
        suggestion_hash: String,
    },
    Generic {
        id: Uuid,
        ts: f64,
        payload: HashMap<String, String>,
    },
}

/// The persisted `(day_key, used)` pair governing Secure Fix (spec §3/§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaLedger {
    pub day_key: String,
    pub used: u32,
    pub max_per_day: u32,
}

impl QuotaLedger {
    pub fn new(day_key: impl Into<String>, max_per_day: u32) -> Self {
        Self {
            day_key: day_key.into(),
            used: 0,
            max_per_day,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn analysis_request_normalize_round_trips_through_json() {
        let mut meta = HashMap::new();
        meta.insert("source".to_string(), "keyboard".to_string());
        let request = AnalysisRequest {
            text: "hello there".to_string(),
            request_id: Uuid::nil(),
            user_id: "local".to_string(),
            user_email: None,
            profile: PersonalityProfile::sentinel(),
            history: Vec::new(),
            features: vec![Feature::Rewrite, Feature::Advice],
            tone_override: Some(ToneStatus::Caution),
            meta,
        }
        .normalize();

        let encoded = serde_json::to_string(&request).unwrap();
        let decoded: AnalysisRequest = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded.text, request.text);
        assert_eq!(decoded.request_id, request.request_id);
        assert_eq!(decoded.user_id, request.user_id);
        assert_eq!(decoded.features, request.features);
        assert_eq!(decoded.tone_override, request.tone_override);
        assert_eq!(decoded.meta, request.meta);
    }

    #[test]
    fn truncate_right_preserves_exact_length() {
        let s = "a".repeat(MAX_REQUEST_TEXT_CHARS);
        assert_eq!(truncate_right(&s, MAX_REQUEST_TEXT_CHARS).chars().count(), MAX_REQUEST_TEXT_CHARS);
        assert_eq!(truncate_right(&s, MAX_REQUEST_TEXT_CHARS), s);
    }

    #[test]
    fn truncate_right_keeps_suffix_when_over() {
        let mut distinguishable = "X".to_string();
        distinguishable.push_str(&"a".repeat(MAX_REQUEST_TEXT_CHARS));
        let truncated = truncate_right(&distinguishable, MAX_REQUEST_TEXT_CHARS);
        assert!(!truncated.contains('X'));
        assert_eq!(truncated.chars().count(), MAX_REQUEST_TEXT_CHARS);
    }

    #[test]
    fn sentinel_profile_is_incomplete_and_unknown() {
        let p = PersonalityProfile::sentinel();
        assert_eq!(p.attachment_style, AttachmentStyle::Unknown);
        assert!(!p.is_complete);
        assert!(p.is_valid());
    }

    #[test]
    fn profile_invariant_rejects_complete_with_empty_scores() {
        let mut p = PersonalityProfile::sentinel();
        p.is_complete = true;
        assert!(!p.is_valid());
        p.scores.insert("warmth".into(), 5);
        assert!(p.is_valid());
    }

    #[test]
    fn tone_severity_ranks() {
        assert_eq!(ToneStatus::Neutral.severity(), 0);
        assert_eq!(ToneStatus::Clear.severity(), 0);
        assert_eq!(ToneStatus::Analyzing.severity(), 0);
        assert_eq!(ToneStatus::Caution.severity(), 1);
        assert_eq!(ToneStatus::Alert.severity(), 2);
    }

    #[test]
    fn tone_parse_loose_is_case_insensitive() {
        assert_eq!(ToneStatus::parse_loose("ALERT"), Some(ToneStatus::Alert));
        assert_eq!(ToneStatus::parse_loose(" clear \n"), Some(ToneStatus::Clear));
        assert_eq!(ToneStatus::parse_loose("bogus"), None);
    }
}
