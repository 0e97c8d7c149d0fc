//! Frame time
//!
//! Frames carry a capture timestamp supplied by whoever feeds the session.
//! The core never reads a wall clock itself; all dwell and inactivity
//! decisions are taken against these timestamps.

use std::ops::{Add, Sub};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Frame capture time, microseconds since the session's stream epoch
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameTime(pub i64);

impl FrameTime {
    pub const ZERO: FrameTime = FrameTime(0);

    #[inline]
    pub fn from_micros(micros: i64) -> Self {
        FrameTime(micros)
    }

    #[inline]
    pub fn from_millis(millis: i64) -> Self {
        FrameTime(millis * 1000)
    }

    #[inline]
    pub fn as_micros(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn as_millis(self) -> i64 {
        self.0 / 1000
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Elapsed time since `earlier`, zero if `earlier` is in the future
    #[inline]
    pub fn since(self, earlier: FrameTime) -> Duration {
        self - earlier
    }
}

impl Add<Duration> for FrameTime {
    type Output = FrameTime;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        FrameTime(self.0.saturating_add(rhs.as_micros() as i64))
    }
}

impl Sub<FrameTime> for FrameTime {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: FrameTime) -> Self::Output {
        let diff = self.0 - rhs.0;
        if diff >= 0 {
            Duration::from_micros(diff as u64)
        } else {
            Duration::ZERO
        }
    }
}

impl std::fmt::Debug for FrameTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t({:.3}ms)", self.0 as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_frame_time_conversions() {
        let t = FrameTime::from_millis(1500);
        assert_eq!(t.as_micros(), 1_500_000);
        assert_eq!(t.as_millis(), 1500);
        assert!((t.as_secs_f64() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_frame_time_sub_saturates() {
        let a = FrameTime::from_millis(100);
        let b = FrameTime::from_millis(250);

        assert_eq!(b - a, Duration::from_millis(150));
        assert_eq!(a - b, Duration::ZERO);
        assert_eq!(a + Duration::from_millis(150), b);
    }

    proptest! {
        #[test]
        fn prop_since_is_never_negative(a in 0i64..1_000_000_000, b in 0i64..1_000_000_000) {
            let (a, b) = (FrameTime::from_micros(a), FrameTime::from_micros(b));
            prop_assert_eq!(a.since(b) + b.since(a), Duration::from_micros((a.0 - b.0).unsigned_abs()));
        }

        #[test]
        fn prop_add_then_since(start in 0i64..1_000_000_000, micros in 0u64..1_000_000_000) {
            let t = FrameTime::from_micros(start);
            let d = Duration::from_micros(micros);
            prop_assert_eq!((t + d).since(t), d);
        }
    }
}
