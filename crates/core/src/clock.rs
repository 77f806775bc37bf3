// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable idle ages and commit timestamps

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::datum::Timestamp;

/// A clock that provides monotonic time for ages and wall time for records
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;

    /// Wall-clock time stamped onto appended records
    fn timestamp(&self) -> Timestamp;
}

/// Real system clock
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn timestamp(&self) -> Timestamp {
        Timestamp::now()
    }
}

struct FakeTime {
    instant: Instant,
    wall: DateTime<Utc>,
}

/// Fake clock for testing with controllable time
#[derive(Clone)]
pub struct FakeClock {
    current: Arc<Mutex<FakeTime>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(FakeTime {
                instant: Instant::now(),
                wall: DateTime::<Utc>::default(),
            })),
        }
    }

    /// Advance both monotonic and wall time by the given duration
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        current.instant += duration;
        current.wall += chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
    }

    /// Pin the wall clock to a specific time
    pub fn set_wall(&self, wall: DateTime<Utc>) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        current.wall = wall;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).instant
    }

    fn timestamp(&self) -> Timestamp {
        let wall = self.current.lock().unwrap_or_else(|e| e.into_inner()).wall;
        Timestamp::from_datetime(wall)
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
