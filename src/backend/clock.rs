//! Wall-clock instants for chunk timestamps.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Source of chunk timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System clock with a strict-monotonicity guard.
///
/// Within one process, successive instants are strictly increasing even if
/// the wall clock stalls or steps backward, so time order of chunks on a
/// branch always agrees with serial order.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let mut last = self
            .last
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut now = Utc::now();
        if let Some(previous) = *last {
            if now <= previous {
                now = previous + Duration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }
}
