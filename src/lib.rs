//! Real-time tone coaching core for a software keyboard.
//!
//! Wires together the ten components from the design: a read-only
//! [`profile::ProfileBridge`] (C1), a bounded [`analytics::AnalyticsQueue`]
//! (C2), the daily [`quota::SecureFixQuota`] (C3), the [`cache::SwitchInCache`]
//! (C4), the ephemeral [`remote::RemoteClient`] (C5), the [`tone::ToneStateMachine`]
//! (C6), the debouncing [`scheduler::StreamScheduler`] (C7), the
//! [`coordinator::Coordinator`] (C8) that orchestrates all of the above, the
//! deterministic [`fallback`] suggestion source (C9), and the
//! [`history::ConversationLog`] (C10).
//!
//! The crate never renders UI and never touches the host's text document
//! directly - it hands the host plain data (tone labels, suggestion
//! strings, typing-animation steps) through [`coordinator::CoordinatorCallbacks`].

pub mod analytics;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fallback;
pub mod history;
pub mod logging;
pub mod model;
pub mod profile;
pub mod quota;
pub mod remote;
pub mod scheduler;
pub mod storage;
pub mod tone;
pub mod typing;

pub use config::Config;
pub use coordinator::{Coordinator, CoordinatorCallbacks};
pub use error::CoachError;
pub use model::{AnalysisRequest, AnalysisResult, ToneStatus};
