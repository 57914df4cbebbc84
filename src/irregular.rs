//! Irregular N-note tunings solved by iteratively reweighted least squares.
//!
//! Every target ratio is mapped onto a scale-step distance and expanded into one constraint
//! per degree pair at that distance. The constraint graph is weighted by the harmonic
//! skeleton and by key distance, then solved with a fixed budget of gradient iterations.
//! Outlier constraints are suppressed over several reweighting rounds so that a few
//! unreachable intervals cannot distort the whole tuning.

use crate::math;
use crate::ratio::RatioSpec;
use crate::skeleton::{IntervalKind, KeySkeleton};

/// Fixed gradient budget per reweighting round.
pub const GRADIENT_ITERATIONS: usize = 220;

/// Gradient step size.
pub const LEARNING_RATE: f64 = 3.5e-4;

/// Number of reweighting rounds.
pub const IRLS_ROUNDS: usize = 6;

/// Strength of the pull towards the equal-division baseline, relative to the
/// constraint gradient.
pub const BASELINE_BLEND: f64 = 0.02;

/// Weight advantage of structural (skeleton) constraints.
pub const STRUCTURAL_WEIGHT: f64 = 5.0;

/// Exponential decay of constraint weights with key distance.
const KEY_DISTANCE_DECAY: f64 = 0.15;

/// Softening applied to non-structural weights for the gradual detuning curve.
const GRADUAL_SOFTENING: f64 = 0.7;

/// Penalty for targets that no whole step distance approximates well.
const POOR_FIT_PENALTY: f64 = 0.3;

/// Gain of the residual-driven outlier suppression.
const REWEIGHT_GAIN: f64 = 2.5;

/// Reweighted constraint weights stay inside this band, so they never reach zero.
const WEIGHT_FLOOR: f64 = 0.25;
const WEIGHT_CEILING: f64 = 12.0;

/// How a target ratio maps onto the scale's step grid.
#[derive(Clone, Debug)]
pub struct TargetFit {
    pub spec: RatioSpec,
    pub cents: f64,
    pub weight: f64,
    pub kind: IntervalKind,
    /// Nearest whole number of scale steps.
    pub steps: usize,
    /// Signed error of the equal-division step against the target.
    pub step_error: f64,
    /// Set when the step error exceeds twice the target's tolerance.
    pub poorly_approximated: bool,
}

impl TargetFit {
    /// Places one target on the `num_degrees`-division step grid.
    pub fn new(
        spec: RatioSpec,
        weight: f64,
        num_degrees: usize,
        cycle: f64,
        global_tolerance: f64,
    ) -> Self {
        let cents = spec.cents();
        let kind = IntervalKind::classify(cents);
        let step_size = cycle / num_degrees as f64;
        let steps = (cents / step_size).round().max(0.0) as usize;
        let step_error = steps as f64 * step_size - cents;
        let tolerance = spec.tolerance_cents.unwrap_or(global_tolerance);
        Self {
            spec,
            cents,
            weight,
            kind,
            steps,
            step_error,
            poorly_approximated: step_error.abs() > 2.0 * tolerance,
        }
    }
}

/// One weighted constraint between two scale degrees.
#[derive(Clone, Debug)]
pub struct IntervalConstraint {
    pub lower: usize,
    pub upper: usize,
    pub steps: usize,
    pub label: String,
    pub target_cents: f64,
    pub kind: IntervalKind,
    pub structural: bool,
    pub key_tonic: Option<usize>,
    pub weight: f64,
    pub tolerance_cents: Option<f64>,
    pub priority: Option<f64>,
    pub hard_max_cents: Option<f64>,
}

impl IntervalConstraint {
    /// The signed residual of this constraint for the given degree positions.
    pub fn residual(&self, positions: &[f64], cycle: f64) -> f64 {
        math::signed_wrap_diff(
            positions[self.upper] - positions[self.lower],
            self.target_cents,
            cycle,
        )
    }

    /// Structural and hard-capped constraints keep their weight across all rounds.
    fn reweight_exempt(&self) -> bool {
        self.structural || self.hard_max_cents.is_some()
    }
}

/// Expands the placed targets into one constraint per degree pair at the right step
/// distance, weighted by skeleton membership and key distance.
pub fn enumerate_constraints(
    fits: &[TargetFit],
    skeleton: &KeySkeleton,
    num_degrees: usize,
    soften_non_structural: bool,
) -> Vec<IntervalConstraint> {
    let mut constraints = Vec::new();
    for fit in fits {
        if fit.steps == 0 {
            continue;
        }
        for lower in 0..num_degrees {
            for upper in 0..num_degrees {
                if upper <= lower || upper - lower != fit.steps {
                    continue;
                }
                let key_tonic = skeleton.structural_tonic(lower, upper, fit.kind);
                let structural = key_tonic.is_some();
                let mut weight = fit.weight
                    * if structural { STRUCTURAL_WEIGHT } else { 1.0 }
                    * (-KEY_DISTANCE_DECAY * skeleton.average_key_distance(lower, upper)).exp();
                if soften_non_structural && !structural {
                    weight *= GRADUAL_SOFTENING;
                }
                if fit.poorly_approximated {
                    weight *= POOR_FIT_PENALTY;
                }
                constraints.push(IntervalConstraint {
                    lower,
                    upper,
                    steps: fit.steps,
                    label: fit.spec.display_label(),
                    target_cents: fit.cents,
                    kind: fit.kind,
                    structural,
                    key_tonic,
                    weight,
                    tolerance_cents: fit.spec.tolerance_cents,
                    priority: None,
                    hard_max_cents: None,
                });
            }
        }
    }
    constraints
}

/// Solves the constraint graph, mutating the constraint weights across the reweighting
/// rounds, and returns the raw degree positions (not yet normalized).
pub fn solve(
    constraints: &mut [IntervalConstraint],
    num_degrees: usize,
    cycle: f64,
) -> Vec<f64> {
    let baseline: Vec<f64> = (0..num_degrees)
        .map(|degree| degree as f64 * cycle / num_degrees as f64)
        .collect();
    let mut positions = baseline.clone();
    let mut gradient = vec![0.0; num_degrees];

    for _ in 0..IRLS_ROUNDS {
        for _ in 0..GRADIENT_ITERATIONS {
            descend(&mut positions, &mut gradient, constraints, &baseline, cycle);
        }
        reweight(constraints, &positions, cycle);
    }

    positions
}

fn descend(
    positions: &mut [f64],
    gradient: &mut [f64],
    constraints: &[IntervalConstraint],
    baseline: &[f64],
    cycle: f64,
) {
    gradient.fill(0.0);
    for constraint in constraints.iter() {
        let diff = constraint.residual(positions, cycle);
        gradient[constraint.upper] += 2.0 * constraint.weight * diff;
        gradient[constraint.lower] -= 2.0 * constraint.weight * diff;
    }
    for (degree, pull) in gradient.iter_mut().enumerate() {
        *pull += BASELINE_BLEND * (positions[degree] - baseline[degree]);
    }
    // the eventual root stays put
    gradient[0] = 0.0;
    for (position, pull) in positions.iter_mut().zip(gradient.iter()) {
        *position -= LEARNING_RATE * pull;
    }
}

fn reweight(constraints: &mut [IntervalConstraint], positions: &[f64], cycle: f64) {
    let max_error = constraints
        .iter()
        .map(|constraint| constraint.residual(positions, cycle).abs())
        .fold(0.0, f64::max);
    if max_error <= 0.0 {
        return;
    }
    for constraint in constraints.iter_mut() {
        if constraint.reweight_exempt() {
            continue;
        }
        let relative = constraint.residual(positions, cycle).abs() / max_error;
        let suppression = 1.0 + REWEIGHT_GAIN * relative * relative;
        constraint.weight = (constraint.weight / suppression).clamp(WEIGHT_FLOOR, WEIGHT_CEILING);
    }
}
