//! C8 - Coordinator (spec §4.8).
//!
//! Top-level orchestrator wiring C1-C7, C9, C10. Owns all Coordinator state
//! exclusively on the host/UI thread (spec §5): background tasks (HTTP,
//! analytics flush, cache compute) never touch this state directly, they
//! return values that the UI thread applies. The outbound contract is the
//! narrow three-method callback trait spec §9's Design Notes calls for.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

use crate::analytics::AnalyticsQueue;
use crate::cache::SwitchInCache;
use crate::config::Config;
use crate::error::CoachError;
use crate::fallback;
use crate::history::ConversationLog;
use crate::model::{AnalysisRequest, AnalysisResult, Feature, ToneStatus};
use crate::profile::ProfileBridge;
use crate::quota::SecureFixQuota;
use crate::remote::RemoteClient;
use crate::scheduler::{Decision, StreamScheduler};
use crate::storage::SharedStore;
use crate::tone::{ToneProposal, ToneStateMachine};
use crate::typing::TypingAnimator;

/// Which wire endpoint backs a `resolve()` call once cache and fallback have
/// been ruled out. Tone-only callers never need `result.suggestion`, so they
/// hit the lighter `/tone` endpoint instead of `/suggestions` (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemoteEndpoint {
    Tone,
    Suggestions,
}

/// Outbound contract to the keyboard host (spec §6/§9).
pub trait CoordinatorCallbacks: Send + Sync {
    fn on_tone(&self, status: ToneStatus);
    fn on_suggestions(&self, suggestions: Vec<String>);
    fn on_secure_fix_state_changed(&self);
}

struct ConsecutiveFailures(AtomicU64);

impl ConsecutiveFailures {
    fn new() -> Self {
        Self(AtomicU64::new(0))
    }
    fn increment(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }
    fn reset(&self) {
        self.0.store(0, Ordering::Release);
    }
    fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

/// Mutable, UI-thread-only state (spec §5: "no locks protect Coordinator
/// state because it is never touched from background tasks directly").
struct CoordinatorState {
    current_text: String,
    scheduler: StreamScheduler,
    tone_machine: ToneStateMachine,
    latest_request_id: Uuid,
}

pub struct Coordinator {
    profile: ProfileBridge,
    analytics: Arc<AnalyticsQueue>,
    quota: SecureFixQuota,
    cache: Mutex<SwitchInCache>,
    remote: Arc<RemoteClient>,
    history: ConversationLog,
    callbacks: Arc<dyn CoordinatorCallbacks>,
    state: Mutex<CoordinatorState>,
    consecutive_failures: ConsecutiveFailures,
    user_id: String,
    user_email: Option<String>,
    typing: Mutex<Option<TypingAnimator>>,
}

impl Coordinator {
    pub fn new(config: Config, store: Arc<dyn SharedStore>, callbacks: Arc<dyn CoordinatorCallbacks>) -> Self {
        let mut cache = SwitchInCache::new(config.cache.capacity);
        cache.prewarm();

        Self {
            profile: ProfileBridge::new(Arc::clone(&store)),
            analytics: AnalyticsQueue::new(Arc::clone(&store)),
            quota: SecureFixQuota::new(Arc::clone(&store), config.quota.max_per_day),
            cache: Mutex::new(cache),
            remote: Arc::new(RemoteClient::new(config.remote)),
            history: ConversationLog::new(store, config.history.capacity),
            callbacks,
            state: Mutex::new(CoordinatorState {
                current_text: String::new(),
                scheduler: StreamScheduler::with_tuning(
                    config.tuning.min_chars_for_analysis,
                    Duration::from_millis(config.tuning.min_analysis_interval_ms),
                    Duration::from_millis(config.tuning.idle_debounce_ms),
                    Duration::from_millis(config.tuning.idle_debounce_short_ms),
                ),
                tone_machine: ToneStateMachine::new(
                    Duration::from_millis(config.tuning.dwell_ms),
                    config.tuning.improvement_threshold,
                    config.tuning.shrink_chars_for_downgrade,
                ),
                latest_request_id: Uuid::nil(),
            }),
            consecutive_failures: ConsecutiveFailures::new(),
            user_id: "local".to_string(),
            user_email: None,
            typing: Mutex::new(None),
        }
    }

    /// Push a text snapshot. Never blocks. May schedule or trigger analysis.
    pub async fn on_text_change(&self, text: String) {
        let decision = {
            let mut state = self.state.lock().unwrap();
            state.current_text = text.clone();
            state.scheduler.decide(&text)
        };

        match decision.decision {
            Decision::Skip => {}
            Decision::AnalyzeNow => self.run_analysis(text, decision.token).await,
            Decision::AnalyzeAfter(delay) => {
                self.schedule_delayed_analysis(text, decision.token, delay).await;
            }
        }
    }

    async fn schedule_delayed_analysis(&self, text: String, token: u64, delay: Duration) {
        tokio::time::sleep(delay).await;
        let still_current = {
            let state = self.state.lock().unwrap();
            state.scheduler.token() == token
        };
        if still_current {
            self.run_analysis(text, token).await;
        }
    }

    async fn run_analysis(&self, text: String, scheduler_token: u64) {
        let previous_text_len = {
            let mut state = self.state.lock().unwrap();
            let previous = state.scheduler.last_analyzed_len();
            state.scheduler.mark_analyzed(&text, Instant::now());
            previous
        };

        if text.trim().is_empty() {
            self.apply_tone_proposal(ToneStatus::Neutral, false, 0.0, previous_text_len, 0);
            return;
        }

        let request_id = self.bump_request_id();
        let request = self.build_request(&text, request_id, &[]);

        let result = self.resolve(&request, RemoteEndpoint::Tone).await;

        if !self.is_latest(request_id) {
            return; // stale response, spec §4.5
        }
        let _ = scheduler_token; // decision token only gates the debounce wait itself

        if let Some(tone) = result.tone {
            let improvement = tone.severity() < self.current_tone().severity();
            self.apply_tone_proposal(
                tone,
                improvement,
                result.confidence.unwrap_or(0.0),
                previous_text_len,
                text.chars().count(),
            );
        }

        self.record_tone_sample(tone_or_neutral(result.tone), &text);
    }

    fn current_tone(&self) -> ToneStatus {
        self.state.lock().unwrap().tone_machine.current()
    }

    fn apply_tone_proposal(
        &self,
        proposed: ToneStatus,
        improvement: bool,
        improvement_score: f64,
        previous_text_len: usize,
        new_text_len: usize,
    ) {
        let accepted = {
            let mut state = self.state.lock().unwrap();
            state.tone_machine.should_update(&ToneProposal {
                proposed,
                improvement,
                improvement_score,
                previous_text_len,
                new_text_len,
            })
        };
        if accepted {
            self.callbacks.on_tone(proposed);
        }
    }

    /// `request_suggestions()` (spec §4.8).
    pub async fn request_suggestions(&self) {
        let text = { self.state.lock().unwrap().current_text.clone() };
        if text.trim().is_empty() {
            self.callbacks.on_suggestions(Vec::new());
            return;
        }

        let request_id = self.bump_request_id();
        let request = self.build_request(&text, request_id, &[Feature::Rewrite, Feature::Advice]);
        let result = self.resolve(&request, RemoteEndpoint::Suggestions).await;

        if !self.is_latest(request_id) {
            return;
        }

        let suggestions = result.suggestion.into_iter().collect::<Vec<_>>();
        self.callbacks.on_suggestions(suggestions);
    }

    /// `request_best_for_tone(tone)` (spec §4.8).
    pub async fn request_best_for_tone(&self, tone: ToneStatus) {
        let text = { self.state.lock().unwrap().current_text.clone() };
        if text.trim().is_empty() {
            self.callbacks.on_suggestions(Vec::new());
            return;
        }

        let request_id = self.bump_request_id();
        let mut request = self.build_request(&text, request_id, &[Feature::Rewrite]);
        request.tone_override = Some(tone);
        let result = self.resolve(&request, RemoteEndpoint::Suggestions).await;

        if !self.is_latest(request_id) {
            return;
        }
        self.callbacks
            .on_suggestions(result.suggestion.into_iter().collect());
    }

    /// `analyze_final_sentence(text)` (spec §4.8).
    pub async fn analyze_final_sentence(&self, text: String) {
        let request_id = self.bump_request_id();
        let request = self.build_request(&text, request_id, &[]);
        let result = self.resolve(&request, RemoteEndpoint::Tone).await;

        if !self.is_latest(request_id) {
            return;
        }
        if let Some(tone) = result.tone {
            self.apply_tone_proposal(tone, false, 0.0, 0, 0);
        }
    }

    /// `secure_fix()` (spec §4.8). Consumes one quota unit, fetches a full
    /// rewrite, and returns it to the host. Emits no remote call when the
    /// quota is exhausted.
    pub async fn secure_fix(&self) -> Result<String, CoachError> {
        self.quota.try_consume()?;
        self.callbacks.on_secure_fix_state_changed();

        let text = { self.state.lock().unwrap().current_text.clone() };
        let request_id = self.bump_request_id();
        let mut request = self.build_request(&text, request_id, &[Feature::Rewrite]);
        request.text = text.clone();

        let rewrite = if self.remote.is_configured() {
            match self.remote.suggestions(&request).await {
                Ok(analysis) => {
                    self.consecutive_failures.reset();
                    analysis.suggestion.unwrap_or_else(|| fallback::suggest(&text))
                }
                Err(e) => {
                    if e.counts_as_remote_failure() {
                        self.consecutive_failures.increment();
                    }
                    fallback::suggest(&text)
                }
            }
        } else {
            fallback::suggest(&text)
        };

        Ok(rewrite)
    }

    /// Begin the character-by-character Secure Fix typing animation the
    /// host's text field should play (spec §5, §9 Design Notes #3).
    pub fn begin_secure_fix_animation(&self, current_text: &str, rewrite: &str) -> Vec<crate::typing::TypingStep> {
        let mut guard = self.typing.lock().unwrap();
        let animator = TypingAnimator::new(current_text, rewrite);
        let steps = animator.steps().to_vec();
        *guard = Some(animator);
        steps
    }

    /// Cancel any in-flight Secure Fix typing animation (e.g. the user kept typing).
    pub fn cancel_secure_fix_animation(&self) {
        let mut guard = self.typing.lock().unwrap();
        if let Some(animator) = guard.as_mut() {
            animator.cancel();
        }
    }

    pub fn record_suggestion_accepted(&self, suggestion: &str) {
        self.record_suggestion_outcome(suggestion, true);

        if self.remote.is_configured() {
            let remote = Arc::clone(&self.remote);
            let suggestion = suggestion.to_string();
            let user_id = self.user_id.clone();
            let user_email = self.user_email.clone();
            // Fire-and-forget learning sample (spec §4.8/§9): accepted
            // suggestions ship the literal text to `communicator/observe`,
            // the one documented exception to the hashes-only analytics rule.
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = remote
                        .observe(&suggestion, &user_id, user_email.as_deref())
                        .await;
                });
            }
        }
    }

    pub fn record_suggestion_rejected(&self, suggestion: &str) {
        self.record_suggestion_outcome(suggestion, false);
    }

    fn record_suggestion_outcome(&self, suggestion: &str, accepted: bool) {
        self.analytics.record(crate::model::AnalyticsEvent::SuggestionOutcome {
            id: Uuid::new_v4(),
            ts: Utc::now().timestamp() as f64,
            accepted,
            suggestion_len: suggestion.chars().count(),
            suggestion_hash: text_hash(suggestion),
        });
    }

    fn record_tone_sample(&self, tone: ToneStatus, text: &str) {
        self.analytics.record(crate::model::AnalyticsEvent::ToneSample {
            id: Uuid::new_v4(),
            ts: Utc::now().timestamp() as f64,
            tone,
            text_len: text.chars().count(),
            text_hash: text_hash(text),
        });
    }

    /// `reset()` (spec §4.8).
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.current_text.clear();
        state.scheduler.reset();
        state.tone_machine.reset();
        state.latest_request_id = Uuid::nil();
        self.callbacks.on_tone(ToneStatus::Neutral);
    }

    fn bump_request_id(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().unwrap().latest_request_id = id;
        id
    }

    fn is_latest(&self, request_id: Uuid) -> bool {
        self.state.lock().unwrap().latest_request_id == request_id
    }

    fn build_request(&self, text: &str, request_id: Uuid, features: &[Feature]) -> AnalysisRequest {
        let profile = self.profile.get_profile();
        let history = self.history.snapshot_with_current(text);
        AnalysisRequest {
            text: text.to_string(),
            request_id,
            user_id: self.user_id.clone(),
            user_email: self.user_email.clone(),
            profile,
            history,
            features: features.to_vec(),
            tone_override: None,
            meta: Default::default(),
        }
        .normalize()
    }

    /// Resolve a request via cache -> remote -> offline fallback, in that
    /// order (spec §4.8: "cache hits bypass the remote entirely"). `endpoint`
    /// picks which wire call backs the remote step: the lightweight `tone`
    /// endpoint for tone-only callers, or `suggestions` for callers that
    /// read back `result.suggestion` (spec §4.5/§6).
    async fn resolve(&self, request: &AnalysisRequest, endpoint: RemoteEndpoint) -> AnalysisResult {
        if let Some(cached) = self.cache.lock().unwrap().lookup(&request.text) {
            return cached;
        }

        let use_fallback = !self.remote.is_configured()
            || (self.consecutive_failures.get() >= 1 && self.last_call_was_network_failure());

        let result = if use_fallback {
            AnalysisResult {
                tone: None,
                confidence: None,
                suggestion: Some(fallback::suggest(&request.text)),
                quick_fixes: Vec::new(),
                features_used: 0,
                quality: 0.0,
                raw: None,
            }
        } else {
            let outcome = match endpoint {
                RemoteEndpoint::Tone => self.remote.tone(request).await,
                RemoteEndpoint::Suggestions => self.remote.suggestions(request).await,
            };
            match outcome {
                Ok(analysis) => {
                    self.consecutive_failures.reset();
                    analysis.into()
                }
                Err(e) => {
                    if e.counts_as_remote_failure() {
                        self.consecutive_failures.increment();
                    }
                    AnalysisResult {
                        suggestion: Some(fallback::suggest(&request.text)),
                        ..Default::default()
                    }
                }
            }
        };

        self.cache.lock().unwrap().insert(&request.text, result.clone());
        result
    }

    /// Whether the fallback path should be preferred because the last
    /// remote attempt failed in a way spec §4.9 counts (Offline/Timeout).
    /// Since we don't retain the last error value across calls here, a
    /// nonzero failure counter is treated as sufficient - a subsequent
    /// successful call resets the counter to 0 immediately.
    fn last_call_was_network_failure(&self) -> bool {
        self.consecutive_failures.get() >= 1
    }
}

fn tone_or_neutral(tone: Option<ToneStatus>) -> ToneStatus {
    tone.unwrap_or(ToneStatus::Neutral)
}

fn text_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
