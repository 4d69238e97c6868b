//! C3 - Secure-Fix Quota (spec §4.3).
//!
//! A per-calendar-day counter with local-midnight rollover. Reads and writes
//! appear atomic to concurrent callers via a process-local mutex - spec §4.3
//! explicitly accepts cross-process races here because the ledger is
//! write-rare.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};

use crate::error::CoachError;
use crate::model::QuotaLedger;
use crate::storage::{keys, SharedStore};

pub struct SecureFixQuota {
    store: Arc<dyn SharedStore>,
    max_per_day: u32,
    // Process-local guard: the store itself may be touched from other
    // processes, but within this process reads/writes are serialized here.
    guard: Mutex<()>,
}

impl SecureFixQuota {
    pub fn new(store: Arc<dyn SharedStore>, max_per_day: u32) -> Self {
        Self {
            store,
            max_per_day,
            guard: Mutex::new(()),
        }
    }

    fn load(&self) -> QuotaLedger {
        let day_key = self
            .store
            .get::<String>(keys::SECURE_FIX_USAGE_DATE)
            .ok()
            .flatten();
        let used = self
            .store
            .get::<u32>(keys::SECURE_FIX_DAILY_USAGE)
            .ok()
            .flatten()
            .unwrap_or(0);

        match day_key {
            Some(day_key) => QuotaLedger {
                day_key,
                used,
                max_per_day: self.max_per_day,
            },
            None => QuotaLedger::new(today_local_key(), self.max_per_day),
        }
    }

    fn save(&self, ledger: &QuotaLedger) {
        let _ = self.store.set(keys::SECURE_FIX_USAGE_DATE, &ledger.day_key);
        let _ = self.store.set(keys::SECURE_FIX_DAILY_USAGE, &ledger.used);
    }

    /// Remaining Secure Fix calls for today. Reading a stale `day_key`
    /// reports the full quota *without* writing the rollover (spec §4.3).
    pub fn remaining(&self) -> u32 {
        self.remaining_at(today_local_key())
    }

    pub fn remaining_at(&self, today: String) -> u32 {
        let _lock = self.guard.lock().unwrap();
        let ledger = self.load();
        if ledger.day_key != today {
            self.max_per_day
        } else {
            self.max_per_day.saturating_sub(ledger.used)
        }
    }

    /// Consume one Secure Fix unit for today, rolling the ledger over to
    /// today's key first if needed.
    pub fn try_consume(&self) -> Result<(), CoachError> {
        self.try_consume_at(today_local_key(), next_local_midnight())
    }

    pub fn try_consume_at(
        &self,
        today: String,
        reset_at: DateTime<Utc>,
    ) -> Result<(), CoachError> {
        let _lock = self.guard.lock().unwrap();
        let mut ledger = self.load();

        if ledger.day_key != today {
            ledger = QuotaLedger::new(today, self.max_per_day);
        }

        if ledger.used < ledger.max_per_day {
            ledger.used += 1;
            self.save(&ledger);
            Ok(())
        } else {
            Err(CoachError::QuotaExceeded {
                remaining: 0,
                reset_at,
            })
        }
    }
}

fn today_local_key() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

fn next_local_midnight() -> DateTime<Utc> {
    let today_local = Local::now().date_naive();
    let tomorrow = today_local.succ_opt().unwrap_or(today_local);
    local_midnight_utc(tomorrow)
}

fn local_midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    let naive_midnight = date.and_hms_opt(0, 0, 0).expect("midnight is always valid");
    Local
        .from_local_datetime(&naive_midnight)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive_midnight))
}
