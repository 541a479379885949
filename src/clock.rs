//! Clock and time types for pipeline synchronization.
//!
//! This module provides:
//! - [`ClockTime`]: A nanosecond timestamp type (8 bytes, Copy)
//! - [`Clock`]: A rate source that broadcasts ratio updates to subscribers
//!
//! The core does not synchronize playback itself; clocks exist to drive
//! timer ticks and to let elements rescale their intervals when the
//! clock's rate relative to real time changes.

use std::fmt;
use std::time::Duration;
use tokio::sync::broadcast;

// ============================================================================
// ClockTime
// ============================================================================

/// Time in nanoseconds (8 bytes, Copy).
///
/// Represents time as nanoseconds since an arbitrary epoch (usually
/// pipeline start).
///
/// # Special Values
///
/// - `ClockTime::ZERO`: Zero time
/// - `ClockTime::NONE`: Invalid/unset time (sentinel value)
/// - `ClockTime::MAX`: Maximum representable time (one below the
///   sentinel; saturating arithmetic clamps here)
///
/// # Examples
///
/// ```rust
/// use millrace::clock::ClockTime;
///
/// let t1 = ClockTime::from_secs(1);
/// let t2 = ClockTime::from_millis(500);
/// let t3 = t1 + t2;
///
/// assert_eq!(t3.millis(), 1500);
/// assert_eq!(format!("{}", t3), "1.500s");
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ClockTime(u64);

impl ClockTime {
    /// Zero time.
    pub const ZERO: Self = Self(0);

    /// Maximum representable time (one less than the `NONE` sentinel).
    pub const MAX: Self = Self(u64::MAX - 1);

    /// Invalid/unset time (sentinel value).
    pub const NONE: Self = Self(u64::MAX);

    /// Create from nanoseconds.
    #[inline]
    pub const fn from_nanos(ns: u64) -> Self {
        Self(ns)
    }

    /// Create from microseconds.
    #[inline]
    pub const fn from_micros(us: u64) -> Self {
        Self(us.saturating_mul(1_000))
    }

    /// Create from milliseconds.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms.saturating_mul(1_000_000))
    }

    /// Create from seconds.
    #[inline]
    pub const fn from_secs(s: u64) -> Self {
        Self(s.saturating_mul(1_000_000_000))
    }

    /// Get the value in nanoseconds.
    #[inline]
    pub const fn nanos(self) -> u64 {
        self.0
    }

    /// Get the value in milliseconds (truncating).
    #[inline]
    pub const fn millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Get the value in whole seconds (truncating).
    #[inline]
    pub const fn secs(self) -> u64 {
        self.0 / 1_000_000_000
    }

    /// Check whether this is the `NONE` sentinel.
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u64::MAX
    }

    /// Saturating addition, clamped to [`ClockTime::MAX`].
    ///
    /// The `NONE` sentinel is preserved: adding anything to (or onto)
    /// `NONE` stays `NONE` rather than producing a finite, wrong
    /// timestamp.
    #[inline]
    pub const fn saturating_add(self, other: Self) -> Self {
        if self.is_none() || other.is_none() {
            return Self::NONE;
        }
        let sum = self.0.saturating_add(other.0);
        if sum >= Self::NONE.0 {
            Self::MAX
        } else {
            Self(sum)
        }
    }

    /// Saturating subtraction. The `NONE` sentinel is preserved.
    #[inline]
    pub const fn saturating_sub(self, other: Self) -> Self {
        if self.is_none() || other.is_none() {
            return Self::NONE;
        }
        Self(self.0.saturating_sub(other.0))
    }
}

impl std::ops::Add for ClockTime {
    type Output = ClockTime;

    /// Plain addition for known-finite times; operands must not be the
    /// `NONE` sentinel (use [`ClockTime::saturating_add`] when one side
    /// may be unset).
    fn add(self, rhs: ClockTime) -> ClockTime {
        debug_assert!(!self.is_none() && !rhs.is_none());
        ClockTime(self.0 + rhs.0)
    }
}

impl std::ops::Sub for ClockTime {
    type Output = ClockTime;

    /// Plain subtraction for known-finite times; operands must not be the
    /// `NONE` sentinel (use [`ClockTime::saturating_sub`] when one side
    /// may be unset).
    fn sub(self, rhs: ClockTime) -> ClockTime {
        debug_assert!(!self.is_none() && !rhs.is_none());
        ClockTime(self.0 - rhs.0)
    }
}

impl From<Duration> for ClockTime {
    fn from(d: Duration) -> Self {
        Self(d.as_nanos() as u64)
    }
}

impl From<ClockTime> for Duration {
    fn from(t: ClockTime) -> Self {
        Duration::from_nanos(t.0)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "none");
        }
        write!(f, "{}.{:03}s", self.secs(), self.millis() % 1_000)
    }
}

// ============================================================================
// Clock
// ============================================================================

/// A clock that publishes rate-ratio updates to its subscribers.
///
/// The ratio expresses how fast the clock runs relative to real time
/// (1.0 = real time). Subscribers (the pipeline, which fans out to
/// elements) rescale their timer intervals on each update.
#[derive(Clone)]
pub struct Clock {
    sender: broadcast::Sender<f64>,
}

impl Clock {
    /// Create a new clock running at real time.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self { sender }
    }

    /// Publish a new rate ratio to all subscribers.
    ///
    /// Ratios must be positive; a non-positive ratio is ignored.
    pub fn update_ratio(&self, ratio: f64) {
        if ratio > 0.0 {
            let _ = self.sender.send(ratio);
        }
    }

    /// Subscribe to ratio updates.
    pub fn subscribe(&self) -> broadcast::Receiver<f64> {
        self.sender.subscribe()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}
