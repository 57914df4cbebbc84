//! Rational interval targets and their logarithmic size.

use std::fmt;
use std::fmt::Display;
use std::fmt::Formatter;

use serde::{Deserialize, Serialize};

use crate::math;

/// Size of the pure fifth 3/2, 1200·log2(3/2).
pub const PURE_FIFTH_CENTS: f64 = 701.9550008653874;

/// Size of the pure major third 5/4, 1200·log2(5/4).
pub const PURE_MAJOR_THIRD_CENTS: f64 = 386.3137138648348;

/// A just-intonation interval given as a positive frequency ratio `numer`/`denom`.
///
/// A [`RatioSpec`] is a target description, not a validated quantity: the solver rejects
/// zero numerators or denominators before doing any work. The optional `tolerance_cents`
/// overrides the solver's global tolerance for this single target.
///
/// # Examples
///
/// ```
/// # use assert_approx_eq::assert_approx_eq;
/// # use temper::ratio::RatioSpec;
/// let fifth = RatioSpec::new(3, 2);
/// assert_approx_eq!(fifth.cents(), 701.955, 1e-3);
/// assert_eq!(fifth.to_string(), "3/2");
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RatioSpec {
    pub numer: u32,
    pub denom: u32,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub tolerance_cents: Option<f64>,
}

impl RatioSpec {
    pub fn new(numer: u32, denom: u32) -> Self {
        Self {
            numer,
            denom,
            label: None,
            tolerance_cents: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_tolerance(mut self, tolerance_cents: f64) -> Self {
        self.tolerance_cents = Some(tolerance_cents);
        self
    }

    /// Returns the logarithmic size of this ratio, 1200·log2(numer/denom).
    ///
    /// The value is only meaningful for validated specs (`numer`, `denom` > 0).
    pub fn cents(&self) -> f64 {
        1200.0 * (f64::from(self.numer) / f64::from(self.denom)).log2()
    }

    /// Returns the same interval with numerator and denominator reduced by their gcd.
    ///
    /// Label and tolerance are carried over.
    ///
    /// # Examples
    ///
    /// ```
    /// # use temper::ratio::RatioSpec;
    /// assert_eq!(RatioSpec::new(6, 4).normalized(), RatioSpec::new(3, 2));
    /// assert_eq!(RatioSpec::new(7, 5).normalized(), RatioSpec::new(7, 5));
    /// ```
    pub fn normalized(self) -> Self {
        let divisor = math::gcd_u32(self.numer, self.denom);
        if divisor <= 1 {
            self
        } else {
            Self {
                numer: self.numer / divisor,
                denom: self.denom / divisor,
                ..self
            }
        }
    }

    /// The label to report for this target: the explicit one if set, "numer/denom" otherwise.
    pub fn display_label(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => self.to_string(),
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.numer > 0 && self.denom > 0
    }
}

impl Display for RatioSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numer, self.denom)
    }
}
