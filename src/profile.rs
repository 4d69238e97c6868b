//! C1 - Profile Bridge (spec §4.1).
//!
//! A read-only view of the personality profile living in cross-process
//! shared storage. Never writes. Any read failure degrades to the sentinel
//! profile rather than propagating an error - callers never need a null
//! check.

use std::sync::Arc;

use chrono::Utc;

use crate::model::{AttachmentStyle, EmotionalBucket, PersonalityProfile};
use crate::storage::{keys, SharedStore};

pub struct ProfileBridge {
    store: Arc<dyn SharedStore>,
}

impl ProfileBridge {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    /// Read the current profile snapshot. Any storage failure, missing key,
    /// or decode error yields [`PersonalityProfile::sentinel`] (spec §4.1).
    pub fn get_profile(&self) -> PersonalityProfile {
        self.get_profile_at(Utc::now().timestamp() as f64)
    }

    /// Deterministic variant for tests: `now` is the wall-clock used to
    /// derive `data_age_hours = now - last_write_ts`.
    pub fn get_profile_at(&self, now: f64) -> PersonalityProfile {
        let attachment_style = self
            .read_field::<String>("attachment_style")
            .and_then(|s| parse_attachment_style(&s))
            .unwrap_or(AttachmentStyle::Unknown);

        let communication_style = self
            .read_field::<String>("communication_style")
            .unwrap_or_default();
        let personality_type = self
            .read_field::<String>("personality_type")
            .unwrap_or_default();
        let emotional_state = self.read_field::<String>("emotional_state").unwrap_or_default();
        let emotional_bucket = self
            .read_field::<String>("emotional_bucket")
            .and_then(|s| parse_emotional_bucket(&s))
            .unwrap_or(EmotionalBucket::Regulated);
        let scores = self
            .read_field::<std::collections::HashMap<String, i64>>("scores")
            .unwrap_or_default();
        let is_complete = self.read_field::<bool>("is_complete").unwrap_or(false);
        let last_write_ts = self.read_field::<f64>("last_write_ts");

        let data_age_hours = match last_write_ts {
            Some(ts) => ((now - ts) / 3600.0).max(0.0),
            None => 0.0,
        };

        let profile = PersonalityProfile {
            attachment_style,
            communication_style,
            personality_type,
            emotional_state,
            emotional_bucket,
            scores,
            is_complete,
            data_age_hours,
        };

        if profile.is_valid() {
            profile
        } else {
            PersonalityProfile::sentinel()
        }
    }

    /// Whether the profile assessment flow has produced a complete profile.
    pub fn is_complete(&self) -> bool {
        self.get_profile().is_complete
    }

    fn read_field<T: serde::de::DeserializeOwned>(&self, field: &str) -> Option<T> {
        self.store.get(&keys::personality_field(field)).ok().flatten()
    }
}

fn parse_attachment_style(s: &str) -> Option<AttachmentStyle> {
    match s.to_lowercase().as_str() {
        "secure" => Some(AttachmentStyle::Secure),
        "anxious" => Some(AttachmentStyle::Anxious),
        "avoidant" => Some(AttachmentStyle::Avoidant),
        "disorganized" => Some(AttachmentStyle::Disorganized),
        "unknown" => Some(AttachmentStyle::Unknown),
        _ => None,
    }
}

fn parse_emotional_bucket(s: &str) -> Option<EmotionalBucket> {
    match s.to_lowercase().as_str() {
        "high" => Some(EmotionalBucket::High),
        "moderate" => Some(EmotionalBucket::Moderate),
        "regulated" => Some(EmotionalBucket::Regulated),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemorySharedStore;

    #[test]
    fn missing_store_entries_yield_sentinel() {
        let store = Arc::new(InMemorySharedStore::new());
        let bridge = ProfileBridge::new(store);
        let profile = bridge.get_profile();
        assert_eq!(profile.attachment_style, AttachmentStyle::Unknown);
        assert!(!profile.is_complete);
    }

    #[test]
    fn complete_profile_reads_through() {
        let store = Arc::new(InMemorySharedStore::new());
        store
            .set(&keys::personality_field("attachment_style"), &"anxious")
            .unwrap();
        store
            .set(&keys::personality_field("is_complete"), &true)
            .unwrap();
        let mut scores = std::collections::HashMap::new();
        scores.insert("warmth".to_string(), 7i64);
        store.set(&keys::personality_field("scores"), &scores).unwrap();
        store
            .set(&keys::personality_field("last_write_ts"), &1000.0)
            .unwrap();

        let bridge = ProfileBridge::new(store);
        let profile = bridge.get_profile_at(1000.0 + 3600.0 * 2.0);
        assert_eq!(profile.attachment_style, AttachmentStyle::Anxious);
        assert!(profile.is_complete);
        assert!((profile.data_age_hours - 2.0).abs() < 1e-9);
    }

    #[test]
    fn invariant_violation_falls_back_to_sentinel() {
        // is_complete = true but scores empty should never surface as valid.
        let store = Arc::new(InMemorySharedStore::new());
        store
            .set(&keys::personality_field("is_complete"), &true)
            .unwrap();
        let bridge = ProfileBridge::new(store);
        let profile = bridge.get_profile();
        assert!(!profile.is_complete);
        assert_eq!(profile.attachment_style, AttachmentStyle::Unknown);
    }
}
