//! Headless demo host for the tone coaching core.
//!
//! Simulates a keyboard host driving the [`tonecoach_core::Coordinator`]
//! from stdin: each plain line is fed in as a text-change snapshot; lines
//! starting with `:` are commands (`:suggest`, `:securefix`, `:reset`,
//! `:quit`). Modeled on the teacher's `main()` - tracing subscriber setup,
//! config load, then a run loop - minus the TUI, since this core has no
//! rendering surface of its own (spec Non-goals).

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use tonecoach_core::coordinator::CoordinatorCallbacks;
use tonecoach_core::model::ToneStatus;
use tonecoach_core::storage::InMemorySharedStore;
use tonecoach_core::{Config, Coordinator};
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

struct StdoutCallbacks;

impl CoordinatorCallbacks for StdoutCallbacks {
    fn on_tone(&self, status: ToneStatus) {
        println!("[tone] {status:?}");
    }

    fn on_suggestions(&self, suggestions: Vec<String>) {
        if suggestions.is_empty() {
            println!("[suggestions] (none)");
        } else {
            for s in suggestions {
                println!("[suggestion] {s}");
            }
        }
    }

    fn on_secure_fix_state_changed(&self) {
        println!("[secure-fix] state changed");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish()
        .init();

    let config = Config::from_env();
    if !config.remote.is_configured() {
        tracing::info!("UNSAID_API_BASE_URL/UNSAID_API_KEY unset - running on offline fallback only");
    }

    let store = Arc::new(InMemorySharedStore::new());
    let callbacks = Arc::new(StdoutCallbacks);
    let coordinator = Arc::new(Coordinator::new(config, store, callbacks));

    println!("tonecoach-demo: type text to analyze, or :suggest / :securefix / :reset / :quit");
    print!("> ");
    io::stdout().flush()?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        match line.as_str() {
            ":quit" => break,
            ":suggest" => coordinator.request_suggestions().await,
            ":reset" => coordinator.reset(),
            ":securefix" => match coordinator.secure_fix().await {
                Ok(rewrite) => println!("[secure-fix] {rewrite}"),
                Err(e) => println!("[secure-fix] unavailable: {e}"),
            },
            text => coordinator.on_text_change(text.to_string()).await,
        }
        print!("> ");
        io::stdout().flush()?;
    }

    Ok(())
}
