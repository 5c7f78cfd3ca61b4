// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::time::Duration;

/// Linux clock a reading is taken from.
#[derive(Debug, Clone, Copy)]
pub enum ClockType {
    /// `CLOCK_MONOTONIC`, never jumps and keeps counting while the caller sleeps.
    Monotonic,
    /// `CLOCK_REALTIME`, wall clock time.
    Real,
}

impl From<ClockType> for libc::clockid_t {
    fn from(clock_type: ClockType) -> Self {
        match clock_type {
            ClockType::Monotonic => libc::CLOCK_MONOTONIC,
            ClockType::Real => libc::CLOCK_REALTIME,
        }
    }
}

fn read_clock(clock_type: ClockType) -> libc::timespec {
    let mut timespec = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `timespec` is a valid, writable timespec and the clock id is a known one.
    unsafe { libc::clock_gettime(clock_type.into(), &mut timespec) };
    timespec
}

/// Wall clock date in local time with nanosecond precision, used to stamp log lines.
#[derive(Debug)]
pub struct LocalTime {
    sec: i32,
    min: i32,
    hour: i32,
    mday: i32,
    /// Months since January.
    mon: i32,
    /// Years since 1900.
    year: i32,
    nsec: i64,
}

impl LocalTime {
    pub fn now() -> LocalTime {
        let timespec = read_clock(ClockType::Real);
        // SAFETY: `libc::tm` is plain old data; all-zeroes is a valid value.
        let mut tm: libc::tm = unsafe { std::mem::zeroed() };
        // SAFETY: Both pointers come from live, properly aligned locals.
        unsafe { libc::localtime_r(&timespec.tv_sec, &mut tm) };

        LocalTime {
            sec: tm.tm_sec,
            min: tm.tm_min,
            hour: tm.tm_hour,
            mday: tm.tm_mday,
            mon: tm.tm_mon,
            year: tm.tm_year,
            nsec: timespec.tv_nsec,
        }
    }
}

impl fmt::Display for LocalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:02}-{:02}T{:02}:{:02}:{:02}.{:09}",
            self.year + 1900,
            self.mon + 1,
            self.mday,
            self.hour,
            self.min,
            self.sec,
            self.nsec
        )
    }
}

/// Current reading of `clock_type`. Negative readings clamp to zero.
pub fn get_time(clock_type: ClockType) -> Duration {
    let timespec = read_clock(clock_type);
    let secs = u64::try_from(timespec.tv_sec).unwrap_or(0);
    let nanos = u32::try_from(timespec.tv_nsec).unwrap_or(0);
    Duration::new(secs, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_time() {
        for _ in 0..1000 {
            assert!(get_time(ClockType::Monotonic) <= get_time(ClockType::Monotonic));
        }
        assert_ne!(get_time(ClockType::Real), Duration::ZERO);
    }

    #[test]
    fn test_local_time_display() {
        let local_time = LocalTime {
            sec: 30,
            min: 15,
            hour: 10,
            mday: 4,
            mon: 6,
            year: 124,
            nsec: 123_456_789,
        };
        assert_eq!(local_time.to_string(), "2024-07-04T10:15:30.123456789");

        let local_time = LocalTime::now();
        assert!((0..=11).contains(&local_time.mon));
        assert!(local_time.year >= 124);
    }
}
