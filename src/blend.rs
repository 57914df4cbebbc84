//! Continuous blending of just-intonation target flavors.
//!
//! Eight anchor flavors sit on the corners of a unit cube. A control point inside the cube
//! assigns each corner a trilinear weight, and the anchors' ratio sets are merged into one
//! weighted target multiset. This replaces discrete flavor selection with a continuous blend.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ratio::RatioSpec;

/// Number of anchor flavors, one per corner of the control cube.
pub const NUM_ANCHORS: usize = 8;

/// Blend weights below this threshold are dropped so that no zero-weight target survives.
const NEGLIGIBLE_WEIGHT: f64 = 1e-9;

/// A control point in the unit cube. Coordinates outside [0, 1] are clamped.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct BlendPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl BlendPoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn clamped(self) -> Self {
        Self {
            x: self.x.clamp(0.0, 1.0),
            y: self.y.clamp(0.0, 1.0),
            z: self.z.clamp(0.0, 1.0),
        }
    }
}

/// One corner flavor: a labeled set of just-intonation ratios.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct OctaAnchor {
    pub label: String,
    pub ratios: Vec<RatioSpec>,
}

impl OctaAnchor {
    pub fn new(label: impl Into<String>, ratios: impl Into<Vec<RatioSpec>>) -> Self {
        Self {
            label: label.into(),
            ratios: ratios.into(),
        }
    }
}

/// Returns the trilinear corner weights for the given control point.
///
/// The weight of corner `v` is the product over the three axes of the coordinate if the
/// corresponding bit of `v` is set (bit 0 → x, bit 1 → y, bit 2 → z) and one minus the
/// coordinate otherwise. The weights form a partition of unity.
///
/// # Examples
///
/// ```
/// # use assert_approx_eq::assert_approx_eq;
/// # use temper::blend::{vertex_weights, BlendPoint};
/// let center = vertex_weights(BlendPoint::new(0.5, 0.5, 0.5));
/// for weight in center {
///     assert_approx_eq!(weight, 0.125, 1e-9);
/// }
///
/// let corner = vertex_weights(BlendPoint::new(1.0, 0.0, 0.0));
/// assert_approx_eq!(corner[0b001], 1.0, 1e-9);
/// assert_approx_eq!(corner.iter().sum::<f64>(), 1.0, 1e-9);
/// ```
pub fn vertex_weights(point: BlendPoint) -> [f64; NUM_ANCHORS] {
    let point = point.clamped();
    let mut weights = [0.0; NUM_ANCHORS];
    for (vertex, weight) in weights.iter_mut().enumerate() {
        let mut product = 1.0;
        for (bit, coord) in [point.x, point.y, point.z].into_iter().enumerate() {
            product *= if vertex >> bit & 1 == 1 {
                coord
            } else {
                1.0 - coord
            };
        }
        *weight = product;
    }
    weights
}

/// The eight built-in anchor flavors.
///
/// The x axis moves from Pythagorean to 5-limit thirds, the y axis blends in harmonic
/// sevenths, the z axis blends in undecimal color.
pub fn default_anchors() -> Vec<OctaAnchor> {
    let ratios = |pairs: &[(u32, u32)]| {
        pairs
            .iter()
            .map(|&(numer, denom)| RatioSpec::new(numer, denom))
            .collect::<Vec<_>>()
    };
    vec![
        OctaAnchor::new("pythagorean", ratios(&[(3, 2), (4, 3), (9, 8), (81, 64)])),
        OctaAnchor::new("ptolemaic", ratios(&[(3, 2), (5, 4), (6, 5), (5, 3)])),
        OctaAnchor::new("septimal", ratios(&[(3, 2), (7, 4), (7, 6), (9, 7)])),
        OctaAnchor::new("harmonic", ratios(&[(3, 2), (5, 4), (7, 4), (7, 5)])),
        OctaAnchor::new("neutral", ratios(&[(3, 2), (11, 9), (11, 8), (4, 3)])),
        OctaAnchor::new("undecimal", ratios(&[(3, 2), (5, 4), (11, 8), (11, 6)])),
        OctaAnchor::new(
            "septimal undecimal",
            ratios(&[(3, 2), (7, 4), (11, 8), (11, 7)]),
        ),
        OctaAnchor::new("overtone", ratios(&[(3, 2), (5, 4), (7, 4), (11, 8)])),
    ]
}

/// Merges the anchors' ratio sets into one weighted target multiset.
///
/// Ratios are merged by their reduced fraction, accumulating the corner weights of every
/// anchor that contains them. Negligible weights are dropped, so every returned weight is
/// strictly positive.
pub fn blend_targets(anchors: &[OctaAnchor], point: BlendPoint) -> Vec<(RatioSpec, f64)> {
    let weights = vertex_weights(point);

    let mut merged: Vec<(RatioSpec, f64)> = Vec::new();
    let mut index_by_fraction: HashMap<(u32, u32), usize> = HashMap::new();

    for (anchor, &weight) in anchors.iter().zip(weights.iter()) {
        for ratio in &anchor.ratios {
            let reduced = ratio.clone().normalized();
            let key = (reduced.numer, reduced.denom);
            match index_by_fraction.get(&key) {
                Some(&index) => merged[index].1 += weight,
                None => {
                    index_by_fraction.insert(key, merged.len());
                    merged.push((reduced, weight));
                }
            }
        }
    }

    merged.retain(|(_, weight)| *weight > NEGLIGIBLE_WEIGHT);
    merged
}
