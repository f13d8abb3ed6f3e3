//! Timestamp and id helpers shared by the store and the audit log.

use chrono::{DateTime, Utc};
use std::cell::Cell;
use ulid::Ulid;

/// Returns unix-epoch seconds with `Z` suffix (e.g. `1771220592Z`).
pub fn now_epoch_z() -> String {
    format!("{}Z", Utc::now().timestamp())
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

pub fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

/// Like `to_micros` but rounds a sub-microsecond remainder up, so the result
/// is never earlier than `ts`.
pub fn to_micros_ceil(ts: DateTime<Utc>) -> i64 {
    let floor = ts.timestamp_micros();
    if ts.timestamp_subsec_nanos() % 1_000 == 0 {
        floor
    } else {
        floor + 1
    }
}

pub fn from_micros(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
}

/// Wall clock that never goes backwards and never repeats for one owner.
///
/// A reading that is not strictly after the previous one is bumped to
/// `previous + 1µs`, so records written through one connector sort in the
/// order they were issued even when the system clock is coarse or adjusted.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Cell<i64>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_micros(&self) -> i64 {
        // Rounded up: a reading is never earlier than a `Utc::now()` taken
        // by the caller just before it.
        let wall = to_micros_ceil(Utc::now());
        let next = if wall > self.last.get() {
            wall
        } else {
            self.last.get() + 1
        };
        self.last.set(next);
        next
    }

    pub fn now(&self) -> DateTime<Utc> {
        let micros = self.now_micros();
        from_micros(micros).unwrap_or_else(Utc::now)
    }
}
