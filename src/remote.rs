//! C5 - Remote Client (spec §4.5, §6).
//!
//! One-shot, short-lived requests over an ephemeral `reqwest::Client` (no
//! cookies, no disk cache). Connect timeout 5s, overall request timeout 15s
//! (spec §4.5: "request 5s, resource 15s"). Response bodies are decoded
//! permissively into `serde_json::Value` and walked by an explicit priority
//! list of field paths (spec §9, Design Notes: "modeled as an explicit
//! priority list... not a type hierarchy"), mirroring the teacher's JSON
//! client in `proxy/handlers.rs`.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::config::RemoteConfig;
use crate::error::CoachError;
use crate::logging::RateLimitedLogger;
use crate::model::{AnalysisRequest, AnalysisResult, ConversationTurn, Feature};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const AUTH_BACKOFF: Duration = Duration::from_secs(60);

pub struct RemoteClient {
    client: reqwest::Client,
    config: RemoteConfig,
    auth_block_until: Mutex<Option<DateTime<Utc>>>,
    logger: RateLimitedLogger,
}

/// What came back from `tone` or `suggestions`, decoded permissively.
#[derive(Debug, Clone, Default)]
pub struct RemoteAnalysis {
    pub tone: Option<String>,
    pub confidence: Option<f64>,
    pub suggestion: Option<String>,
}

/// What came back from `communicator/observe`.
#[derive(Debug, Clone, Default)]
pub struct ObserveEstimate {
    pub primary: Option<String>,
    pub window_complete: Option<bool>,
}

impl RemoteClient {
    pub fn new(config: RemoteConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .cookie_store(false)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config,
            auth_block_until: Mutex::new(None),
            logger: RateLimitedLogger::default(),
        }
    }

    /// Whether remote calls may currently be attempted: base URL and key are
    /// set, and we are not inside an auth-backoff window (spec §4.5).
    pub fn is_configured(&self) -> bool {
        self.is_configured_at(Utc::now())
    }

    pub fn is_configured_at(&self, now: DateTime<Utc>) -> bool {
        if !self.config.is_configured() {
            return false;
        }
        match *self.auth_block_until.lock().unwrap() {
            Some(until) => now >= until,
            None => true,
        }
    }

    pub async fn tone(&self, req: &AnalysisRequest) -> Result<RemoteAnalysis, CoachError> {
        if !self.is_configured() {
            return Err(CoachError::ConfigMissing);
        }
        let body = tone_request_body(req);
        let value = self.post("tone", body).await?;
        Ok(extract_analysis(&value))
    }

    pub async fn suggestions(&self, req: &AnalysisRequest) -> Result<RemoteAnalysis, CoachError> {
        if !self.is_configured() {
            return Err(CoachError::ConfigMissing);
        }
        let body = suggestions_request_body(req);
        let value = self.post("suggestions", body).await?;
        Ok(extract_analysis(&value))
    }

    pub async fn observe(
        &self,
        text: &str,
        user_id: &str,
        user_email: Option<&str>,
    ) -> Result<ObserveEstimate, CoachError> {
        if !self.is_configured() {
            return Err(CoachError::ConfigMissing);
        }
        let body = json!({
            "text": text,
            "userId": user_id,
            "userEmail": user_email,
            "meta": { "source": "keyboard" },
        });
        let value = self.post("communicator/observe", body).await?;
        Ok(extract_observe_estimate(&value))
    }

    async fn post(&self, endpoint: &str, body: Value) -> Result<Value, CoachError> {
        let base = self.config.api_base_url.as_deref().unwrap_or_default();
        let url = format!("{}/{}", base.trim_end_matches('/'), endpoint);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.as_deref().unwrap_or_default())
            .header("Content-Type", "application/json")
            .header("Cache-Control", "no-cache")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CoachError::Timeout
                } else {
                    CoachError::Offline
                }
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let until = Utc::now() + ChronoDuration::from_std(AUTH_BACKOFF).unwrap();
            *self.auth_block_until.lock().unwrap() = Some(until);
            return Err(CoachError::AuthBlocked(until));
        }
        if !status.is_success() {
            crate::log_throttled!(
                self.logger,
                "remote_http_error",
                "{endpoint} returned http {}",
                status.as_u16()
            );
            return Err(CoachError::Http(status.as_u16()));
        }

        response.json::<Value>().await.map_err(|_| CoachError::Decode)
    }
}

fn profile_fields(req: &AnalysisRequest) -> Value {
    json!({
        "attachment_style": format!("{:?}", req.profile.attachment_style).to_lowercase(),
        "communication_style": req.profile.communication_style,
        "emotional_state": req.profile.emotional_state,
        "emotional_bucket": format!("{:?}", req.profile.emotional_bucket).to_lowercase(),
        "personality_type": req.profile.personality_type,
    })
}

fn conversation_history(history: &[ConversationTurn]) -> Value {
    Value::Array(
        history
            .iter()
            .map(|t| {
                json!({
                    "sender": format!("{:?}", t.sender).to_lowercase(),
                    "text": t.text,
                    "timestamp": t.ts,
                })
            })
            .collect(),
    )
}

fn tone_request_body(req: &AnalysisRequest) -> Value {
    let mut body = base_request_body(req);
    if let Some(map) = body.as_object_mut() {
        map.insert("context".to_string(), json!("general"));
    }
    body
}

fn suggestions_request_body(req: &AnalysisRequest) -> Value {
    let mut body = base_request_body(req);
    if let Some(map) = body.as_object_mut() {
        let features: Vec<&str> = req.features.iter().map(feature_name).collect();
        map.insert("features".to_string(), json!(features));
        if let Some(tone_override) = req.tone_override {
            map.insert(
                "toneOverride".to_string(),
                json!(format!("{:?}", tone_override).to_lowercase()),
            );
        }
    }
    body
}

fn base_request_body(req: &AnalysisRequest) -> Value {
    let profile = profile_fields(req);
    json!({
        "text": req.text,
        "request_id": req.request_id,
        "userId": req.user_id,
        "userEmail": req.user_email,
        "attachment_style": profile["attachment_style"],
        "communication_style": profile["communication_style"],
        "emotional_state": profile["emotional_state"],
        "emotional_bucket": profile["emotional_bucket"],
        "personality_type": profile["personality_type"],
        "user_profile": profile,
        "conversationHistory": conversation_history(&req.history),
        "meta": {
            "source": "keyboard",
            "analysis_type": "realtime",
            "timestamp": Utc::now().timestamp(),
        },
    })
}

fn feature_name(f: &Feature) -> &'static str {
    match f {
        Feature::Rewrite => "rewrite",
        Feature::Advice => "advice",
        Feature::Evidence => "evidence",
    }
}

/// Walk the tone/suggestion priority paths from spec §4.5/§6. First match
/// wins per field.
fn extract_analysis(v: &Value) -> RemoteAnalysis {
    let tone = first_str(v, &["tone", "primaryTone", "analysis.tone", "extras.tone"])
        .or_else(|| first_str(v, &["toneStatus", "extras.toneStatus"]));
    let confidence = first_f64(v, &["confidence"]);
    let suggestion = first_nonempty_str(
        v,
        &[
            "rewrite",
            "extras.suggestions.0.text",
            "quickFixes.0",
            "suggestions.0.text",
            "general_suggestion",
            "suggestion",
            "data",
        ],
    );

    RemoteAnalysis {
        tone,
        confidence,
        suggestion,
    }
}

fn extract_observe_estimate(v: &Value) -> ObserveEstimate {
    ObserveEstimate {
        primary: first_str(v, &["estimate.primary"]),
        window_complete: path(v, "estimate.windowComplete").and_then(Value::as_bool),
    }
}

/// Resolve a dotted path, with numeric segments indexing arrays.
fn path<'a>(v: &'a Value, dotted: &str) -> Option<&'a Value> {
    let mut current = v;
    for segment in dotted.split('.') {
        current = if let Ok(index) = segment.parse::<usize>() {
            current.get(index)?
        } else {
            current.get(segment)?
        };
    }
    Some(current)
}

fn first_str(v: &Value, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .find_map(|p| path(v, p))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn first_nonempty_str(v: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|p| {
        path(v, p)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn first_f64(v: &Value, paths: &[&str]) -> Option<f64> {
    paths.iter().find_map(|p| path(v, p).and_then(Value::as_f64))
}

impl From<RemoteAnalysis> for AnalysisResult {
    fn from(r: RemoteAnalysis) -> Self {
        AnalysisResult {
            tone: r.tone.as_deref().and_then(crate::model::ToneStatus::parse_loose),
            confidence: r.confidence,
            suggestion: r.suggestion,
            quick_fixes: Vec::new(),
            features_used: 0,
            quality: r.confidence.unwrap_or(0.0),
            raw: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_analysis_prefers_tone_over_primary_tone() {
        let v = json!({ "tone": "clear", "primaryTone": "alert" });
        let a = extract_analysis(&v);
        assert_eq!(a.tone.as_deref(), Some("clear"));
    }

    #[test]
    fn extract_analysis_falls_back_through_nested_paths() {
        let v = json!({ "analysis": { "tone": "caution" } });
        let a = extract_analysis(&v);
        assert_eq!(a.tone.as_deref(), Some("caution"));
    }

    #[test]
    fn extract_analysis_suggestion_priority_order() {
        let v = json!({ "quickFixes": ["use this instead"], "suggestion": "ignored" });
        let a = extract_analysis(&v);
        assert_eq!(a.suggestion.as_deref(), Some("use this instead"));
    }

    #[test]
    fn extract_analysis_skips_empty_rewrite_and_falls_through() {
        let v = json!({ "rewrite": "", "suggestion": "fallback text" });
        let a = extract_analysis(&v);
        assert_eq!(a.suggestion.as_deref(), Some("fallback text"));
    }

    #[test]
    fn extract_observe_estimate_reads_nested_fields() {
        let v = json!({ "estimate": { "primary": "secure", "windowComplete": true } });
        let e = extract_observe_estimate(&v);
        assert_eq!(e.primary.as_deref(), Some("secure"));
        assert_eq!(e.window_complete, Some(true));
    }

    #[test]
    fn not_configured_without_api_key_rejects_before_any_request() {
        let client = RemoteClient::new(RemoteConfig {
            api_base_url: Some("https://example.invalid".to_string()),
            api_key: None,
        });
        assert!(!client.is_configured());
    }

    #[test]
    fn auth_block_window_blocks_is_configured() {
        let client = RemoteClient::new(RemoteConfig {
            api_base_url: Some("https://example.invalid".to_string()),
            api_key: Some("key".to_string()),
        });
        *client.auth_block_until.lock().unwrap() = Some(Utc::now() + ChronoDuration::seconds(60));
        assert!(!client.is_configured());
    }
}
