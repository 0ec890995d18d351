//! Simulated time units.
//!
//! Simulated time is a `u64` microsecond counter advanced only by event
//! dispatch; it is independent of wall-clock time.

/// Microseconds per simulated millisecond.
pub const MILLISECOND: u64 = 1_000;

/// Microseconds per simulated second.
pub const SECOND: u64 = 1_000 * MILLISECOND;

/// Converts simulated microseconds to whole milliseconds, rounding down.
#[inline]
pub fn to_millis(micros: u64) -> u64 {
    micros / MILLISECOND
}
