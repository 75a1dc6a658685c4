use chrono::{Local, NaiveDate, Utc};
use std::sync::Mutex;

/// Source of "today" and of sync timestamps.
pub trait Clock: Send + Sync {
    /// Calendar day used as the activity record key.
    fn today(&self) -> NaiveDate;

    /// Epoch milliseconds.
    fn now_millis(&self) -> i64;
}

/// Wall clock; days follow the local time zone.
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
pub struct FixedClock {
    inner: Mutex<(NaiveDate, i64)>,
}

impl FixedClock {
    pub fn new(today: NaiveDate, now_millis: i64) -> Self {
        Self {
            inner: Mutex::new((today, now_millis)),
        }
    }

    pub fn set_today(&self, today: NaiveDate) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).0 = today;
    }

    pub fn advance_millis(&self, millis: i64) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).1 += millis;
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).0
    }

    fn now_millis(&self) -> i64 {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).1
    }
}
