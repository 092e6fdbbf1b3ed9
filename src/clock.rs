//! Time source for `createdAt` / `reviewedAt` / `updatedAt`
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use crate::types::TimeStamp;

pub trait Clock: Send + Sync {
    fn now(&self) -> TimeStamp<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimeStamp<Utc> {
        TimeStamp::now()
    }
}

/// Deterministic clock that moves forward by a fixed step on every read.
#[derive(Debug)]
pub struct ManualClock {
    nanos: AtomicI64,
    step: i64,
}

impl ManualClock {
    pub fn starting_at(nanos: i64, step: i64) -> Self {
        Self {
            nanos: AtomicI64::new(nanos),
            step,
        }
    }

    pub fn advance(&self, nanos: i64) {
        self.nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> TimeStamp<Utc> {
        TimeStamp::from_nanos(self.nanos.fetch_add(self.step, Ordering::SeqCst))
    }
}
