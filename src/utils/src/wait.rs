// Copyright 2024 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Polls a condition until it holds or a deadline passes.
//!
//! The loop evaluates the predicate once right away, then sleeps for at most `interval`
//! between evaluations. A `false` result is only ever returned once the clock reports that at
//! least `timeout` has elapsed since the first evaluation.

use std::convert::Infallible;
use std::fmt::Debug;
use std::time::Duration;

use crate::time::{ClockType, get_time};

/// Timeout used by callers that have no reason to pick their own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Interval between two evaluations of the predicate.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Source of time for the poll loop.
pub trait Clock: Debug {
    /// Time elapsed since an arbitrary, fixed point in the past.
    fn now(&self) -> Duration;
    /// Blocks the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// `CLOCK_MONOTONIC` backed clock that really sleeps.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        get_time(ClockType::Monotonic)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Waits for `predicate` to return `true` on the monotonic clock.
///
/// Returns `true` if the predicate held before `timeout` elapsed, `false` otherwise.
pub fn wait_for<F>(predicate: F, timeout: Duration, interval: Duration) -> bool
where
    F: FnMut() -> bool,
{
    wait_for_with_clock(&MonotonicClock, predicate, timeout, interval)
}

/// Same as [`wait_for`], on a caller provided clock.
pub fn wait_for_with_clock<C, F>(
    clock: &C,
    mut predicate: F,
    timeout: Duration,
    interval: Duration,
) -> bool
where
    C: Clock + ?Sized,
    F: FnMut() -> bool,
{
    match try_wait_for_with_clock(
        clock,
        || Ok::<bool, Infallible>(predicate()),
        timeout,
        interval,
    ) {
        Ok(done) => done,
        Err(never) => match never {},
    }
}

/// Waits for a fallible predicate. The first error stops the loop and is handed back as is.
pub fn try_wait_for<F, E>(predicate: F, timeout: Duration, interval: Duration) -> Result<bool, E>
where
    F: FnMut() -> Result<bool, E>,
{
    try_wait_for_with_clock(&MonotonicClock, predicate, timeout, interval)
}

/// Same as [`try_wait_for`], on a caller provided clock.
pub fn try_wait_for_with_clock<C, F, E>(
    clock: &C,
    mut predicate: F,
    timeout: Duration,
    interval: Duration,
) -> Result<bool, E>
where
    C: Clock + ?Sized,
    F: FnMut() -> Result<bool, E>,
{
    let start = clock.now();
    loop {
        if predicate()? {
            return Ok(true);
        }

        let elapsed = clock.now().saturating_sub(start);
        if elapsed >= timeout {
            return Ok(false);
        }

        // A zero interval would spin; always give the system at least a millisecond.
        let nap = interval
            .min(timeout - elapsed)
            .max(Duration::from_millis(1));
        clock.sleep(nap);
    }
}

/// [`Clock`] that only moves when slept on.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct FakeClock {
    now: std::cell::Cell<Duration>,
    sleeps: std::cell::Cell<u32>,
}

#[cfg(any(test, feature = "test-utils"))]
impl FakeClock {
    /// Total time slept so far.
    pub fn elapsed(&self) -> Duration {
        self.now.get()
    }

    /// Number of naps taken so far.
    pub fn sleeps(&self) -> u32 {
        self.sleeps.get()
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Clock for FakeClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
        self.sleeps.set(self.sleeps.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn test_immediately_true() {
        let clock = FakeClock::default();
        assert!(wait_for_with_clock(
            &clock,
            || true,
            DEFAULT_TIMEOUT,
            DEFAULT_INTERVAL
        ));
        assert_eq!(clock.sleeps(), 0);
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[test]
    fn test_never_true_waits_whole_timeout() {
        let clock = FakeClock::default();
        let mut calls = 0;
        let done = wait_for_with_clock(
            &clock,
            || {
                calls += 1;
                false
            },
            Duration::from_secs(5),
            Duration::from_millis(100),
        );
        assert!(!done);
        assert!(clock.now() >= Duration::from_secs(5));
        assert!(clock.now() < Duration::from_secs(5) + Duration::from_millis(100));
        // One evaluation up front, one after each of the 50 naps.
        assert_eq!(calls, 51);
    }

    #[test]
    fn test_becomes_true() {
        let clock = FakeClock::default();
        let mut calls = 0;
        let done = wait_for_with_clock(
            &clock,
            || {
                calls += 1;
                calls == 4
            },
            Duration::from_secs(5),
            Duration::from_millis(100),
        );
        assert!(done);
        assert_eq!(clock.sleeps(), 3);
        assert_eq!(clock.now(), Duration::from_millis(300));
    }

    #[test]
    fn test_last_nap_is_clamped_to_deadline() {
        let clock = FakeClock::default();
        assert!(!wait_for_with_clock(
            &clock,
            || false,
            Duration::from_millis(250),
            Duration::from_millis(100)
        ));
        assert_eq!(clock.now(), Duration::from_millis(250));
        assert_eq!(clock.sleeps(), 3);
    }

    #[test]
    fn test_zero_timeout_evaluates_once() {
        let clock = FakeClock::default();
        let mut calls = 0;
        assert!(!wait_for_with_clock(
            &clock,
            || {
                calls += 1;
                false
            },
            Duration::ZERO,
            DEFAULT_INTERVAL
        ));
        assert_eq!(calls, 1);
        assert_eq!(clock.sleeps(), 0);
    }

    #[test]
    fn test_try_wait_for_propagates_error() {
        let clock = FakeClock::default();
        let mut calls = 0;
        let res = try_wait_for_with_clock(
            &clock,
            || {
                calls += 1;
                if calls == 2 { Err("gone") } else { Ok(false) }
            },
            DEFAULT_TIMEOUT,
            DEFAULT_INTERVAL,
        );
        assert_eq!(res, Err("gone"));
        assert_eq!(clock.sleeps(), 1);
    }

    #[test]
    fn test_real_clock_bounded() {
        let start = Instant::now();
        assert!(!wait_for(
            || false,
            Duration::from_millis(200),
            DEFAULT_INTERVAL
        ));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(1));

        let start = Instant::now();
        assert!(wait_for(|| true, DEFAULT_TIMEOUT, DEFAULT_INTERVAL));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_try_wait_for_real_clock() {
        let mut calls = 0;
        let res = try_wait_for(
            || {
                calls += 1;
                Ok::<bool, String>(calls == 3)
            },
            DEFAULT_TIMEOUT,
            Duration::from_millis(10),
        );
        assert_eq!(res, Ok(true));
        assert_eq!(calls, 3);

        let res = try_wait_for(
            || Err::<bool, _>("unreadable".to_string()),
            DEFAULT_TIMEOUT,
            DEFAULT_INTERVAL,
        );
        assert_eq!(res, Err("unreadable".to_string()));
    }
}
