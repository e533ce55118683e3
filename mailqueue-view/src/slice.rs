//! Fixed-width time windows.
//!
//! A slice is the half-open interval `[start, start + width)` with
//! `start = floor(instant / width) * width`, measured from the Unix epoch.
//! Instants before the epoch fall into the first slice.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Serialize};

use crate::clock::Clock;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// A time window `[start, start + width)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slice {
    start: SystemTime,
    width: Duration,
}

fn from_nanos(nanos: u128) -> Duration {
    #[allow(clippy::cast_possible_truncation)]
    let secs = (nanos / NANOS_PER_SEC) as u64;
    #[allow(clippy::cast_possible_truncation)]
    let subsec = (nanos % NANOS_PER_SEC) as u32;
    Duration::new(secs, subsec)
}

impl Slice {
    /// The slice of the given width containing `instant`.
    ///
    /// A zero width is treated as one nanosecond.
    #[must_use]
    pub fn of(instant: SystemTime, width: Duration) -> Self {
        let width = width.max(Duration::from_nanos(1));
        let since_epoch = instant
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let width_nanos = width.as_nanos();

        Self {
            start: SystemTime::UNIX_EPOCH + from_nanos(since_epoch / width_nanos * width_nanos),
            width,
        }
    }

    #[must_use]
    pub const fn start(&self) -> SystemTime {
        self.start
    }

    #[must_use]
    pub const fn width(&self) -> Duration {
        self.width
    }

    /// Exclusive upper bound
    #[must_use]
    pub fn end(&self) -> SystemTime {
        self.start + self.width
    }

    /// The slice immediately following this one
    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            start: self.end(),
            width: self.width,
        }
    }

    #[must_use]
    pub fn contains(&self, instant: SystemTime) -> bool {
        self.start <= instant && instant < self.end()
    }

    /// Whether no instant of this slice lies at or after `now`
    #[must_use]
    pub fn is_elapsed(&self, now: SystemTime) -> bool {
        self.end() <= now
    }

    /// Seconds since the Unix epoch of the slice start
    #[must_use]
    pub fn start_secs(&self) -> u64 {
        self.start
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

impl std::fmt::Display for Slice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}s, +{}s)",
            self.start_secs(),
            self.width.as_secs_f64()
        )
    }
}

/// Ascending iterator over consecutive slices, both ends inclusive
#[derive(Debug, Clone)]
pub struct Slices {
    next: Option<Slice>,
    last: Slice,
}

impl Iterator for Slices {
    type Item = Slice;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.filter(|slice| slice.start <= self.last.start)?;
        self.next = (current.start < self.last.start).then(|| current.next());
        Some(current)
    }
}

/// The slice of width `width` containing `instant`
#[must_use]
pub fn slice_of(instant: SystemTime, width: Duration) -> Slice {
    Slice::of(instant, width)
}

/// Every slice from the one containing `from` up to the one containing `to`.
///
/// Empty if `from` lies in a later slice than `to`.
#[must_use]
pub fn slices_between(from: SystemTime, to: SystemTime, width: Duration) -> Slices {
    Slices {
        next: Some(Slice::of(from, width)),
        last: Slice::of(to, width),
    }
}

/// Slice arithmetic bound to a width and a clock
#[derive(Debug, Clone)]
pub struct SliceCalculator {
    width: Duration,
    clock: Arc<dyn Clock>,
}

impl SliceCalculator {
    #[must_use]
    pub fn new(width: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { width, clock }
    }

    #[must_use]
    pub const fn width(&self) -> Duration {
        self.width
    }

    #[must_use]
    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    #[must_use]
    pub fn slice_of(&self, instant: SystemTime) -> Slice {
        Slice::of(instant, self.width)
    }

    /// The slice containing the current instant
    #[must_use]
    pub fn current(&self) -> Slice {
        self.slice_of(self.now())
    }

    /// Every slice from `start` up to the slice containing `until`
    #[must_use]
    pub fn slices_from(&self, start: Slice, until: SystemTime) -> Slices {
        slices_between(start.start(), until, self.width)
    }
}
