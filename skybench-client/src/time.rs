// Copyright (c) The skybench Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stopwatch for tracking how long a batch has been supervised.
//!
//! Supervision needs to track a start time and a duration. For that we use a
//! combination of a realtime clock (for reporting) and an `Instant`
//! (monotonic clock, for timeout decisions).

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

pub(crate) fn stopwatch() -> StopwatchStart {
    StopwatchStart::new()
}

/// The start state of a stopwatch.
#[derive(Clone, Debug)]
pub(crate) struct StopwatchStart {
    start_time: DateTime<Local>,
    instant: Instant,
}

impl StopwatchStart {
    fn new() -> Self {
        Self {
            // These two syscalls will happen imperceptibly close to each other, which is good
            // enough for our purposes.
            start_time: Local::now(),
            instant: Instant::now(),
        }
    }

    pub(crate) fn snapshot(&self) -> StopwatchSnapshot {
        StopwatchSnapshot {
            start_time: self.start_time,
            duration: self.instant.elapsed(),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct StopwatchSnapshot {
    pub(crate) start_time: DateTime<Local>,
    pub(crate) duration: Duration,
}

impl StopwatchSnapshot {
    pub(crate) fn end_time(&self) -> DateTime<Local> {
        self.start_time + self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopwatch_monotonic() {
        let start = stopwatch();
        std::thread::sleep(Duration::from_millis(50));
        let snapshot = start.snapshot();

        // thread::sleep guarantees at least the requested duration.
        assert!(
            snapshot.duration >= Duration::from_millis(50),
            "snapshot duration ({:?}) is at least 50ms",
            snapshot.duration,
        );
        assert!(
            snapshot.end_time() >= snapshot.start_time,
            "end time is not before start time"
        );
    }
}
