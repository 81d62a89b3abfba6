// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Rational number representation for media rates.

use serde::{Deserialize, Serialize};

/// A rate expressed as a fraction of two signed 64-bit integers.
///
/// Used for frame rates (e.g. 30000/1001 for 29.97 fps) and sample rates
/// (e.g. 48000/1 for 48 kHz audio). Rates stored in flow headers are always
/// reduced to lowest terms; a zero numerator with denominator 1 encodes
/// "unset".
///
/// The `repr(C)` layout allows the type to be embedded directly in the
/// shared-memory flow header.
#[repr(C)]
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rational {
    /// Numerator of the rate.
    pub numerator: i64,
    /// Denominator of the rate (defaults to 1 if omitted in JSON).
    #[serde(default = "default_denominator")]
    pub denominator: i64,
}

/// Default denominator for rates (integral Hz).
fn default_denominator() -> i64 {
    1
}

impl Rational {
    /// A rate of zero, encoding "unset".
    pub const UNSET: Rational = Rational {
        numerator: 0,
        denominator: 1,
    };

    /// Creates a new rate from a numerator and denominator.
    pub const fn new(numerator: i64, denominator: i64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Returns `true` if this rate can be used for index arithmetic.
    ///
    /// A rate is usable when both terms are strictly positive.
    pub fn is_valid(&self) -> bool {
        self.numerator > 0 && self.denominator > 0
    }

    /// Returns this rate reduced to lowest terms.
    ///
    /// Rates are normalized on ingest so that every rate published in a flow
    /// header satisfies `gcd(numerator, denominator) == 1`.
    pub fn normalized(self) -> Self {
        let g = gcd(self.numerator.unsigned_abs(), self.denominator.unsigned_abs());
        if g > 1 {
            Self {
                numerator: self.numerator / g as i64,
                denominator: self.denominator / g as i64,
            }
        } else {
            self
        }
    }
}

impl std::fmt::Display for Rational {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Greatest common divisor via the Euclidean algorithm.
fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_reduces_to_lowest_terms() {
        assert_eq!(Rational::new(100000, 2000).normalized(), Rational::new(50, 1));
        assert_eq!(
            Rational::new(30000, 1001).normalized(),
            Rational::new(30000, 1001)
        );
        assert_eq!(Rational::new(48000, 1).normalized(), Rational::new(48000, 1));
        assert_eq!(Rational::UNSET.normalized(), Rational::UNSET);
    }

    #[test]
    fn validity() {
        assert!(Rational::new(60000, 1001).is_valid());
        assert!(!Rational::UNSET.is_valid());
        assert!(!Rational::new(25, 0).is_valid());
        assert!(!Rational::new(-25, 1).is_valid());
    }

    #[test]
    fn denominator_defaults_to_one() {
        let rate: Rational = serde_json::from_str(r#"{"numerator": 48000}"#).unwrap();
        assert_eq!(rate, Rational::new(48000, 1));
    }
}
