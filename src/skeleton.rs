//! Key-specific harmonic skeletons.
//!
//! A skeleton marks the degree pairs that belong to the tonic, subdominant and dominant
//! triads of the active keys. Those pairs are the harmonically structural intervals of a
//! tuning and receive priority weighting in the irregular solver.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ratio::{PURE_FIFTH_CENTS, PURE_MAJOR_THIRD_CENTS};

/// Classification windows in cents. Values outside all windows are unclassified.
const FIFTH_WINDOW: (f64, f64) = (650.0, 750.0);
const MAJOR_THIRD_WINDOW: (f64, f64) = (350.0, 420.0);
const MINOR_THIRD_WINDOW: (f64, f64) = (280.0, 340.0);

/// The harmonic role of an interval target.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub enum IntervalKind {
    PerfectFifth,
    MajorThird,
    MinorThird,
    /// The target's size falls outside every classification window.
    Unclassified,
}

impl IntervalKind {
    /// Classifies an interval by its size in cents.
    ///
    /// # Examples
    ///
    /// ```
    /// # use temper::skeleton::IntervalKind;
    /// assert_eq!(IntervalKind::classify(701.955), IntervalKind::PerfectFifth);
    /// assert_eq!(IntervalKind::classify(386.314), IntervalKind::MajorThird);
    /// assert_eq!(IntervalKind::classify(315.641), IntervalKind::MinorThird);
    /// assert_eq!(IntervalKind::classify(551.318), IntervalKind::Unclassified);
    /// ```
    pub fn classify(cents: f64) -> Self {
        if (FIFTH_WINDOW.0..=FIFTH_WINDOW.1).contains(&cents) {
            Self::PerfectFifth
        } else if (MAJOR_THIRD_WINDOW.0..=MAJOR_THIRD_WINDOW.1).contains(&cents) {
            Self::MajorThird
        } else if (MINOR_THIRD_WINDOW.0..=MINOR_THIRD_WINDOW.1).contains(&cents) {
            Self::MinorThird
        } else {
            Self::Unclassified
        }
    }

    /// The kind to use when matching against skeleton pairs.
    ///
    /// Unclassified targets take part in the matching as major thirds but keep their own
    /// kind in every report.
    pub(crate) fn matching_kind(self) -> Self {
        match self {
            Self::Unclassified => Self::MajorThird,
            kind => kind,
        }
    }
}

/// A structural degree pair: `above` lies `kind`'s step size above `root` (mod scale size).
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub struct SkeletonPair {
    pub root: usize,
    pub above: usize,
    pub kind: IntervalKind,
    /// The active key whose triad contributed this pair.
    pub tonic: usize,
}

/// The harmonic skeleton of a scale for a given key specificity.
#[derive(Clone, Debug)]
pub struct KeySkeleton {
    num_degrees: usize,
    tonic: usize,
    fifth_step: usize,
    third_step: usize,
    active_keys: Vec<usize>,
    pairs: Vec<SkeletonPair>,
}

impl KeySkeleton {
    /// Builds the skeleton for an `num_degrees`-tone scale around `tonic`.
    ///
    /// The active key set is the fifths chain walked `flats` steps below and `sharps` steps
    /// above the tonic. Every active key contributes the major-third and perfect-fifth pairs
    /// of its I, IV and V triads, deduplicated by (root, above, kind, tonic).
    pub fn build(tonic: usize, flats: usize, sharps: usize, num_degrees: usize, cycle: f64) -> Self {
        let tonic = tonic % num_degrees;
        let fifth_step = nearest_step(PURE_FIFTH_CENTS, num_degrees, cycle);
        let third_step = nearest_step(PURE_MAJOR_THIRD_CENTS, num_degrees, cycle);

        let mut active_keys = Vec::new();
        for position in -(flats as i64)..=sharps as i64 {
            let offset = position * fifth_step as i64;
            let key = (tonic as i64 + offset).rem_euclid(num_degrees as i64) as usize;
            if !active_keys.contains(&key) {
                active_keys.push(key);
            }
        }

        let mut seen = HashSet::new();
        let mut pairs = Vec::new();
        // the fifth can span more than one cycle for short stretched cycles
        let fifth_in_cycle = fifth_step % num_degrees;
        for &key in &active_keys {
            let subdominant = (key + num_degrees - fifth_in_cycle) % num_degrees;
            let dominant = (key + fifth_step) % num_degrees;
            for root in [key, subdominant, dominant] {
                let triad = [
                    SkeletonPair {
                        root,
                        above: (root + third_step) % num_degrees,
                        kind: IntervalKind::MajorThird,
                        tonic: key,
                    },
                    SkeletonPair {
                        root,
                        above: (root + fifth_step) % num_degrees,
                        kind: IntervalKind::PerfectFifth,
                        tonic: key,
                    },
                ];
                for pair in triad {
                    if seen.insert(pair) {
                        pairs.push(pair);
                    }
                }
            }
        }

        Self {
            num_degrees,
            tonic,
            fifth_step,
            third_step,
            active_keys,
            pairs,
        }
    }

    pub fn tonic(&self) -> usize {
        self.tonic
    }

    pub fn fifth_step(&self) -> usize {
        self.fifth_step
    }

    pub fn third_step(&self) -> usize {
        self.third_step
    }

    pub fn active_keys(&self) -> &[usize] {
        &self.active_keys
    }

    pub fn pairs(&self) -> &[SkeletonPair] {
        &self.pairs
    }

    /// Returns the owning tonic if (`root`, `above`) is a structural pair of the given kind.
    pub fn structural_tonic(&self, root: usize, above: usize, kind: IntervalKind) -> Option<usize> {
        let kind = kind.matching_kind();
        self.pairs
            .iter()
            .find(|pair| pair.root == root && pair.above == above && pair.kind == kind)
            .map(|pair| pair.tonic)
    }

    /// The minimal number of fifths-chain steps from the tonic to `degree`.
    ///
    /// Degrees the chain cannot reach count as the full scale size.
    pub fn key_distance(&self, degree: usize) -> usize {
        let num_degrees = self.num_degrees as i64;
        let mut best = self.num_degrees;
        for steps in -num_degrees..=num_degrees {
            let reached =
                (self.tonic as i64 + steps * self.fifth_step as i64).rem_euclid(num_degrees);
            if reached == degree as i64 {
                best = best.min(steps.unsigned_abs() as usize);
            }
        }
        best
    }

    /// The arithmetic mean of the two degrees' key distances.
    pub fn average_key_distance(&self, first: usize, second: usize) -> f64 {
        (self.key_distance(first) + self.key_distance(second)) as f64 / 2.0
    }
}

/// The nearest whole number of scale steps approximating `cents` in an equal division.
fn nearest_step(cents: f64, num_degrees: usize, cycle: f64) -> usize {
    (cents / (cycle / num_degrees as f64)).round() as usize
}
