// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! TAI clock access and index arithmetic.
//!
//! MXL addresses media by monotonically increasing indices derived from a
//! flow's rate and a TAI timestamp (nanoseconds since the SMPTE ST 2059
//! epoch, 1970-01-01 00:00:00 TAI). This module provides the pure mapping
//! functions between timestamps and indices, plus access to the host clock.
//!
//! All intermediate arithmetic is carried out in 128-bit width so that
//! timestamps well past the year 2500 and rate numerators up to 10^9 cannot
//! overflow.

use crate::Rational;

/// Sentinel index returned for degenerate rates (zero numerator or
/// denominator).
pub const UNDEFINED_INDEX: u64 = u64::MAX;

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// Returns the current TAI time in nanoseconds since the epoch.
///
/// On Linux this reads `CLOCK_TAI`. Hosts that have no TAI offset configured
/// report `CLOCK_TAI` equal to `CLOCK_REALTIME`; the resulting shift is
/// constant and does not affect index arithmetic consistency between
/// processes on the same host.
#[cfg(target_os = "linux")]
pub fn current_time() -> u64 {
    match nix::time::clock_gettime(nix::time::ClockId::CLOCK_TAI) {
        Ok(ts) => ts.tv_sec() as u64 * 1_000_000_000 + ts.tv_nsec() as u64,
        // CLOCK_TAI is always available on the kernels we support, but a
        // realtime fallback keeps the clock usable in odd sandboxes.
        Err(_) => realtime_ns(),
    }
}

/// Returns the current time in nanoseconds since the epoch.
///
/// Non-Linux hosts have no `CLOCK_TAI`; the realtime clock is used instead
/// and the TAI shift is the operator's responsibility.
#[cfg(not(target_os = "linux"))]
pub fn current_time() -> u64 {
    realtime_ns()
}

fn realtime_ns() -> u64 {
    match nix::time::clock_gettime(nix::time::ClockId::CLOCK_REALTIME) {
        Ok(ts) => ts.tv_sec() as u64 * 1_000_000_000 + ts.tv_nsec() as u64,
        Err(_) => 0,
    }
}

/// Converts a TAI timestamp to a media index for the given rate.
///
/// `index = floor(timestamp * numerator / (denominator * 10^9))`
///
/// Returns [`UNDEFINED_INDEX`] if the rate is degenerate.
pub fn timestamp_to_index(rate: &Rational, timestamp_ns: u64) -> u64 {
    if !rate.is_valid() {
        return UNDEFINED_INDEX;
    }
    let numerator = timestamp_ns as u128 * rate.numerator as u128;
    let denominator = rate.denominator as u128 * NANOS_PER_SECOND;
    clamp_u64(numerator / denominator)
}

/// Converts a media index to the earliest TAI timestamp that maps back to it.
///
/// `timestamp = ceil(index * denominator * 10^9 / numerator)`
///
/// For every valid rate and index, the round trip
/// `timestamp_to_index(rate, index_to_timestamp(rate, index)) == index`
/// holds. Returns [`UNDEFINED_INDEX`] if the rate is degenerate.
pub fn index_to_timestamp(rate: &Rational, index: u64) -> u64 {
    if !rate.is_valid() {
        return UNDEFINED_INDEX;
    }
    let numerator = index as u128 * rate.denominator as u128 * NANOS_PER_SECOND;
    let denominator = rate.numerator as u128;
    clamp_u64(numerator.div_ceil(denominator))
}

/// Returns the number of nanoseconds until the given index becomes current,
/// or zero if it already is.
///
/// Returns [`UNDEFINED_INDEX`] if the rate is degenerate.
pub fn ns_until_index(rate: &Rational, index: u64) -> u64 {
    let timestamp = index_to_timestamp(rate, index);
    if timestamp == UNDEFINED_INDEX {
        return UNDEFINED_INDEX;
    }
    timestamp.saturating_sub(current_time())
}

/// Returns the index that is current right now for the given rate.
pub fn current_index(rate: &Rational) -> u64 {
    timestamp_to_index(rate, current_time())
}

fn clamp_u64(value: u128) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_for_degenerate_rates() {
        assert_eq!(
            timestamp_to_index(&Rational::new(0, 1), 1_000_000_000),
            UNDEFINED_INDEX
        );
        assert_eq!(
            timestamp_to_index(&Rational::new(25, 0), 1_000_000_000),
            UNDEFINED_INDEX
        );
        assert_eq!(index_to_timestamp(&Rational::UNSET, 42), UNDEFINED_INDEX);
    }

    #[test]
    fn index_for_simple_rates() {
        let rate = Rational::new(50, 1);
        assert_eq!(timestamp_to_index(&rate, 0), 0);
        // One frame at 50 fps lasts 20 ms.
        assert_eq!(timestamp_to_index(&rate, 19_999_999), 0);
        assert_eq!(timestamp_to_index(&rate, 20_000_000), 1);
        assert_eq!(index_to_timestamp(&rate, 1), 20_000_000);
    }

    #[test]
    fn round_trip_holds_for_fractional_rates() {
        let rates = [
            Rational::new(60000, 1001),
            Rational::new(30000, 1001),
            Rational::new(25, 1),
            Rational::new(48000, 1),
            Rational::new(44100, 1),
            Rational::new(1, 1),
        ];
        // Indices stay below 2^30 so the mapped timestamps fit u64 even for
        // the slowest rate in the list.
        for rate in &rates {
            for index in [0u64, 1, 2, 59, 60, 1000, 123_456_789, (1 << 30) + 7] {
                let ts = index_to_timestamp(rate, index);
                assert_eq!(
                    timestamp_to_index(rate, ts),
                    index,
                    "round trip failed for rate {rate} index {index}"
                );
                // The mapped instant is the earliest one: one nanosecond less
                // must land on the previous index.
                if ts > 0 {
                    assert_eq!(timestamp_to_index(rate, ts - 1), index - 1);
                }
            }
        }
    }

    #[test]
    fn high_timestamps_do_not_overflow() {
        // Year ~2500 in nanoseconds.
        let timestamp = 16_725_225_600_000_000_000u64;
        let rate = Rational::new(1_000_000_000, 1);
        let index = timestamp_to_index(&rate, timestamp);
        assert_ne!(index, UNDEFINED_INDEX);
        assert_eq!(timestamp_to_index(&rate, index_to_timestamp(&rate, index)), index);
    }

    #[test]
    fn ns_until_index_is_zero_for_the_past() {
        let rate = Rational::new(50, 1);
        assert_eq!(ns_until_index(&rate, 0), 0);
        assert_eq!(ns_until_index(&Rational::UNSET, 0), UNDEFINED_INDEX);
    }
}
