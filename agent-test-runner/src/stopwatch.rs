// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stopwatch for tracking how long a run takes.
//!
//! Events carry both a wall-clock timestamp and the time elapsed since the run started. The
//! timestamp comes from the realtime clock while the elapsed time uses the monotonic clock.

use chrono::{DateTime, FixedOffset, Local};
use std::time::{Duration, Instant};

/// The start state of a stopwatch.
#[derive(Clone, Debug)]
pub(crate) struct StopwatchStart {
    instant: Instant,
}

impl StopwatchStart {
    pub(crate) fn now() -> Self {
        Self {
            instant: Instant::now(),
        }
    }

    #[inline]
    pub(crate) fn elapsed(&self) -> Duration {
        self.instant.elapsed()
    }

    /// Returns the current time along with the elapsed duration.
    pub(crate) fn snapshot(&self) -> StopwatchSnapshot {
        StopwatchSnapshot {
            timestamp: Local::now().fixed_offset(),
            elapsed: self.elapsed(),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct StopwatchSnapshot {
    pub(crate) timestamp: DateTime<FixedOffset>,
    pub(crate) elapsed: Duration,
}
