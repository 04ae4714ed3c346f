//! Runtime state shared by the poller and the API handlers

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime};

use crate::settings::RuntimeSettings;

const NO_POLL: i64 = i64::MIN;

/// Process-wide flags and poll metadata.
///
/// Every field is an atomic, so a change made by a handler is seen by the
/// next poller tick without any locking.
#[derive(Debug)]
pub struct RuntimeState {
    paused: AtomicBool,
    interval_secs: AtomicU64,
    retention_days: AtomicU32,
    last_poll: AtomicI64,
    last_count: AtomicU64,
    total_logged: AtomicU64,
}

impl RuntimeState {
    pub fn new(settings: RuntimeSettings) -> Self {
        Self {
            paused: AtomicBool::new(settings.paused),
            interval_secs: AtomicU64::new(settings.interval),
            retention_days: AtomicU32::new(settings.retention_days),
            last_poll: AtomicI64::new(NO_POLL),
            last_count: AtomicU64::new(0),
            total_logged: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            interval: self.interval_secs.load(Ordering::SeqCst),
            retention_days: self.retention_days.load(Ordering::SeqCst),
            paused: self.is_paused(),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.load(Ordering::SeqCst))
    }

    pub fn set_interval(&self, secs: u64) {
        self.interval_secs.store(secs, Ordering::SeqCst);
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days.load(Ordering::SeqCst)
    }

    pub fn set_retention_days(&self, days: u32) {
        self.retention_days.store(days, Ordering::SeqCst);
    }

    /// Record the outcome of a poll that actually ran
    pub fn record_poll(&self, at: NaiveDateTime, count: u64) {
        self.total_logged.fetch_add(count, Ordering::SeqCst);
        self.last_count.store(count, Ordering::SeqCst);
        self.last_poll.store(at.and_utc().timestamp(), Ordering::SeqCst);
    }

    pub fn last_poll(&self) -> Option<NaiveDateTime> {
        match self.last_poll.load(Ordering::SeqCst) {
            NO_POLL => None,
            secs => DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc()),
        }
    }

    pub fn last_count(&self) -> u64 {
        self.last_count.load(Ordering::SeqCst)
    }

    pub fn total_logged(&self) -> u64 {
        self.total_logged.load(Ordering::SeqCst)
    }

    pub fn reset_total_logged(&self) {
        self.total_logged.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn state() -> RuntimeState {
        RuntimeState::new(RuntimeSettings {
            interval: 10,
            retention_days: 14,
            paused: false,
        })
    }

    #[test]
    fn test_initial_state() {
        let state = state();
        assert!(!state.is_paused());
        assert_eq!(state.interval(), Duration::from_secs(10));
        assert_eq!(state.retention_days(), 14);
        assert_eq!(state.last_poll(), None);
        assert_eq!(state.total_logged(), 0);
    }

    #[test]
    fn test_record_poll_accumulates() {
        let state = state();
        let at = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();

        state.record_poll(at, 12);
        state.record_poll(at, 3);

        assert_eq!(state.last_poll(), Some(at));
        assert_eq!(state.last_count(), 3);
        assert_eq!(state.total_logged(), 15);

        state.reset_total_logged();
        assert_eq!(state.total_logged(), 0);
        assert_eq!(state.last_count(), 3);
    }

    #[test]
    fn test_settings_snapshot() {
        let state = state();
        state.set_paused(true);
        state.set_interval(30);
        state.set_retention_days(0);

        assert_eq!(
            state.settings(),
            RuntimeSettings {
                interval: 30,
                retention_days: 0,
                paused: true,
            }
        );
    }
}
