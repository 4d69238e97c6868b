//! Configuration for the tone coaching coordinator (spec §6, expanded in
//! SPEC_FULL.md §B.1).
//!
//! Loaded the way the teacher loads its proxy configuration
//! (`config::Config::from_env`): file -> env -> built-in default, with a
//! `FileConfig` deserialization layer. Read once at startup and handed to
//! [`crate::coordinator::Coordinator::new`] - nothing here is re-read mid-run.

use std::path::PathBuf;

use serde::Deserialize;

// ─────────────────────────────────────────────────────────────────────────────
// Remote endpoint configuration
// ─────────────────────────────────────────────────────────────────────────────

/// `UNSAID_API_BASE_URL` / `UNSAID_API_KEY` (spec §6). Absence of either
/// disables the remote client cleanly - it is not an error.
#[derive(Debug, Clone, Default)]
pub struct RemoteConfig {
    pub api_base_url: Option<String>,
    pub api_key: Option<String>,
}

impl RemoteConfig {
    pub fn is_configured(&self) -> bool {
        self.api_base_url.is_some() && self.api_key.is_some()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tunable constants (spec §9, Open Question 2: "preserved ... should be tuned")
// ─────────────────────────────────────────────────────────────────────────────

/// The magic numbers spec §4.6/§4.7 hard-code. Defaults match the spec
/// exactly; every field is overridable via the `[tuning]` config section so a
/// labeled dataset can retune them without a code change.
#[derive(Debug, Clone)]
pub struct TuningConfig {
    /// Dwell window protecting against tone flicker (spec §4.6 rule 3).
    pub dwell_ms: u64,
    /// Improvement-score threshold that permits an early downgrade (rule 4).
    pub improvement_threshold: f64,
    /// Below this length, a streaming snapshot is skipped entirely (spec §4.7).
    pub min_chars_for_analysis: usize,
    /// Debounce delay for short snapshots (`len(t) <= 20`).
    pub idle_debounce_ms: u64,
    /// Debounce delay for longer snapshots.
    pub idle_debounce_short_ms: u64,
    /// Minimum spacing between back-to-back analyses (spec §4.7 last rule).
    pub min_analysis_interval_ms: u64,
    /// Character-count drop that counts as "user erased" (spec §4.6 rule 5).
    pub shrink_chars_for_downgrade: usize,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            dwell_ms: 3000,
            improvement_threshold: 0.3,
            min_chars_for_analysis: 5,
            idle_debounce_ms: 100,
            idle_debounce_short_ms: 50,
            min_analysis_interval_ms: 80,
            shrink_chars_for_downgrade: 3,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileTuningConfig {
    pub dwell_ms: Option<u64>,
    pub improvement_threshold: Option<f64>,
    pub min_chars_for_analysis: Option<usize>,
    pub idle_debounce_ms: Option<u64>,
    pub idle_debounce_short_ms: Option<u64>,
    pub min_analysis_interval_ms: Option<u64>,
    pub shrink_chars_for_downgrade: Option<usize>,
}

impl TuningConfig {
    pub fn from_file(file: Option<FileTuningConfig>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();
        Self {
            dwell_ms: file.dwell_ms.unwrap_or(defaults.dwell_ms),
            improvement_threshold: file
                .improvement_threshold
                .unwrap_or(defaults.improvement_threshold),
            min_chars_for_analysis: file
                .min_chars_for_analysis
                .unwrap_or(defaults.min_chars_for_analysis),
            idle_debounce_ms: file.idle_debounce_ms.unwrap_or(defaults.idle_debounce_ms),
            idle_debounce_short_ms: file
                .idle_debounce_short_ms
                .unwrap_or(defaults.idle_debounce_short_ms),
            min_analysis_interval_ms: file
                .min_analysis_interval_ms
                .unwrap_or(defaults.min_analysis_interval_ms),
            shrink_chars_for_downgrade: file
                .shrink_chars_for_downgrade
                .unwrap_or(defaults.shrink_chars_for_downgrade),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Quota / cache / history sizing
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct QuotaConfig {
    pub max_per_day: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self { max_per_day: 10 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HistoryConfig {
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { capacity: 20 }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage backend selection
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    File,
}

impl Default for StorageBackend {
    fn default() -> Self {
        StorageBackend::Memory
    }
}

#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: Option<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Top-level config
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub tuning: TuningConfig,
    pub quota: QuotaConfig,
    pub cache: CacheConfig,
    pub history: HistoryConfig,
    pub storage: StorageConfig,
    pub log_level: String,
}

/// Config file structure (subset of [`Config`] that makes sense to persist).
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    pub log_level: Option<String>,
    pub tuning: Option<FileTuningConfig>,
    pub quota_max_per_day: Option<u32>,
    pub cache_capacity: Option<usize>,
    pub history_capacity: Option<usize>,
    pub storage_path: Option<String>,
}

impl Config {
    /// `~/.config/tonecoach/config.toml`.
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("tonecoach").join("config.toml"))
    }

    fn load_file_config() -> FileConfig {
        let Some(path) = Self::config_path() else {
            return FileConfig::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
            Err(_) => FileConfig::default(),
        }
    }

    /// Load configuration: file -> env -> defaults. Never panics - a missing
    /// or malformed config file silently falls back to built-in defaults
    /// (unlike the remote key, which is load-bearing, tuning is not).
    pub fn from_env() -> Self {
        let file = Self::load_file_config();

        let api_base_url = std::env::var("UNSAID_API_BASE_URL").ok();
        let api_key = std::env::var("UNSAID_API_KEY").ok();

        let log_level = std::env::var("TONECOACH_LOG")
            .ok()
            .or(file.log_level)
            .unwrap_or_else(|| "info".to_string());

        let tuning = TuningConfig::from_file(file.tuning);

        let quota = QuotaConfig {
            max_per_day: file.quota_max_per_day.unwrap_or(10),
        };
        let cache = CacheConfig {
            capacity: file.cache_capacity.unwrap_or(64),
        };
        let history = HistoryConfig {
            capacity: file.history_capacity.unwrap_or(20),
        };

        let storage = match file.storage_path {
            Some(p) => StorageConfig {
                backend: StorageBackend::File,
                path: Some(PathBuf::from(p)),
            },
            None => StorageConfig::default(),
        };

        Self {
            remote: RemoteConfig {
                api_base_url,
                api_key,
            },
            tuning,
            quota,
            cache,
            history,
            storage,
            log_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tuning_matches_spec_constants() {
        let t = TuningConfig::default();
        assert_eq!(t.dwell_ms, 3000);
        assert!((t.improvement_threshold - 0.3).abs() < f64::EPSILON);
        assert_eq!(t.min_chars_for_analysis, 5);
        assert_eq!(t.shrink_chars_for_downgrade, 3);
    }

    #[test]
    fn remote_config_requires_both_fields() {
        let mut r = RemoteConfig::default();
        assert!(!r.is_configured());
        r.api_base_url = Some("https://example.test".into());
        assert!(!r.is_configured());
        r.api_key = Some("key".into());
        assert!(r.is_configured());
    }
}
