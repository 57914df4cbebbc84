//! Closed-form weighted least squares for rank-2 (generator + period) temperaments.

use crate::math;
use crate::ratio::{RatioSpec, PURE_FIFTH_CENTS};

/// Bound of the integer scan that maps a target onto generator/period steps.
///
/// Chains longer than this are not considered; widen the bound before truncating a tuning
/// that genuinely needs more fifths.
pub const GENERATOR_SCAN_LIMIT: i32 = 31;

/// Allowed band for the solved period. Values outside are clamped to the nearest bound.
pub const PERIOD_MIN_CENTS: f64 = 1190.0;
pub const PERIOD_MAX_CENTS: f64 = 1210.0;

/// Condition numbers above this treat the normal equations as singular.
const CONDITION_LIMIT: f64 = 1e10;

/// Weight of the synthetic octave anchor at stiffness 0 and 1.
const OCTAVE_WEIGHT_MIN: f64 = 0.01;
const OCTAVE_WEIGHT_MAX: f64 = 1e9;

/// One row of the rank-2 model `ideal ≈ g·generator_steps + p·period_steps`.
#[derive(Clone, Debug)]
pub struct Rank2Constraint {
    pub label: String,
    pub ideal_cents: f64,
    pub weight: f64,
    pub generator_steps: i32,
    pub period_steps: i32,
}

impl Rank2Constraint {
    /// Builds the constraint row for a ratio target.
    pub fn for_target(spec: &RatioSpec, weight: f64, cycle: f64) -> Self {
        let ideal_cents = spec.cents();
        let (generator_steps, period_steps) = estimate_steps(ideal_cents, cycle);
        Self {
            label: spec.display_label(),
            ideal_cents,
            weight,
            generator_steps,
            period_steps,
        }
    }

    /// The synthetic anchor tying the period to the nominal cycle.
    pub fn octave_anchor(cycle: f64, stiffness: f64) -> Self {
        let stiffness = stiffness.clamp(0.0, 1.0);
        Self {
            label: "octave".to_owned(),
            ideal_cents: cycle,
            weight: OCTAVE_WEIGHT_MIN + (OCTAVE_WEIGHT_MAX - OCTAVE_WEIGHT_MIN) * stiffness,
            generator_steps: 0,
            period_steps: 1,
        }
    }
}

/// Finds the integer generator/period steps whose stack of reference fifths comes closest
/// to `ideal_cents`, scanning [−GENERATOR_SCAN_LIMIT, GENERATOR_SCAN_LIMIT] fifths and
/// folding the remainder into whole periods.
///
/// # Examples
///
/// ```
/// # use temper::regular::estimate_steps;
/// assert_eq!(estimate_steps(701.955, 1200.0), (1, 0));
/// assert_eq!(estimate_steps(1200.0, 1200.0), (0, 1));
/// assert_eq!(estimate_steps(203.91, 1200.0), (2, -1));
/// ```
pub fn estimate_steps(ideal_cents: f64, cycle: f64) -> (i32, i32) {
    let mut best = (0, 0);
    let mut best_error = f64::INFINITY;
    for generator_steps in -GENERATOR_SCAN_LIMIT..=GENERATOR_SCAN_LIMIT {
        let generator_part = f64::from(generator_steps) * PURE_FIFTH_CENTS;
        let period_steps = ((ideal_cents - generator_part) / cycle).round();
        let error = (ideal_cents - (generator_part + period_steps * cycle)).abs();
        if error < best_error {
            best_error = error;
            best = (generator_steps, period_steps as i32);
        }
    }
    best
}

/// Result of a rank-2 solve.
#[derive(Clone, Debug)]
pub struct Rank2Solution {
    pub generator_cents: f64,
    pub period_cents: f64,
    pub period_clamped: bool,
    pub degenerate: bool,
    /// Signed residuals, aligned with the constraint rows handed to [`solve`].
    pub residuals: Vec<f64>,
}

/// Solves the weighted normal equations of the two-parameter model in closed form.
///
/// A singular or ill-conditioned system falls back to the reference fifth and the nominal
/// cycle; a solved period outside the allowed band is clamped and the generator re-solved
/// alone. Residuals are reported in every case.
pub fn solve(constraints: &[Rank2Constraint], cycle: f64) -> Rank2Solution {
    let mut a11 = 0.0;
    let mut a12 = 0.0;
    let mut a22 = 0.0;
    let mut b1 = 0.0;
    let mut b2 = 0.0;
    for constraint in constraints {
        let sg = f64::from(constraint.generator_steps);
        let sp = f64::from(constraint.period_steps);
        let w = constraint.weight;
        a11 += w * sg * sg;
        a12 += w * sg * sp;
        a22 += w * sp * sp;
        b1 += w * sg * constraint.ideal_cents;
        b2 += w * sp * constraint.ideal_cents;
    }

    let det = a11 * a22 - a12 * a12;
    let half_trace = (a11 + a22) / 2.0;
    let discriminant = (half_trace * half_trace - det).max(0.0).sqrt();
    let smallest_eigenvalue = half_trace - discriminant;
    let largest_eigenvalue = half_trace + discriminant;

    let singular = !det.is_finite()
        || smallest_eigenvalue <= 0.0
        || largest_eigenvalue / smallest_eigenvalue > CONDITION_LIMIT;

    let (mut generator_cents, mut period_cents, mut period_clamped) = if singular {
        (PURE_FIFTH_CENTS, cycle, false)
    } else {
        let generator = (b1 * a22 - b2 * a12) / det;
        let period = (a11 * b2 - a12 * b1) / det;
        (generator, period, false)
    };

    if !singular && !(PERIOD_MIN_CENTS..=PERIOD_MAX_CENTS).contains(&period_cents) {
        period_cents = period_cents.clamp(PERIOD_MIN_CENTS, PERIOD_MAX_CENTS);
        period_clamped = true;
        generator_cents = resolve_generator(constraints, period_cents).unwrap_or(generator_cents);
    }

    let residuals = constraints
        .iter()
        .map(|constraint| {
            constraint.ideal_cents
                - (generator_cents * f64::from(constraint.generator_steps)
                    + period_cents * f64::from(constraint.period_steps))
        })
        .collect();

    Rank2Solution {
        generator_cents,
        period_cents,
        period_clamped,
        degenerate: singular,
        residuals,
    }
}

/// 1-D weighted least squares for the generator with the period held fixed.
fn resolve_generator(constraints: &[Rank2Constraint], period_cents: f64) -> Option<f64> {
    let mut numer = 0.0;
    let mut denom = 0.0;
    for constraint in constraints {
        let sg = f64::from(constraint.generator_steps);
        let sp = f64::from(constraint.period_steps);
        numer += constraint.weight * sg * (constraint.ideal_cents - period_cents * sp);
        denom += constraint.weight * sg * sg;
    }
    (denom > 0.0).then(|| numer / denom)
}

/// The scale generated by stacking the generator, reduced into the period.
pub fn scale_positions(generator_cents: f64, period_cents: f64, num_degrees: usize) -> Vec<f64> {
    (0..num_degrees)
        .map(|degree| math::wrap_to_cycle(degree as f64 * generator_cents, period_cents))
        .collect()
}

#[cfg(test)]
mod test {
    use assert_approx_eq::assert_approx_eq;

    use super::*;

    fn targets_with_anchor(targets: &[(u32, u32)], stiffness: f64) -> Vec<Rank2Constraint> {
        let mut constraints = targets
            .iter()
            .map(|&(numer, denom)| {
                Rank2Constraint::for_target(&RatioSpec::new(numer, denom), 1.0, 1200.0)
            })
            .collect::<Vec<_>>();
        constraints.push(Rank2Constraint::octave_anchor(1200.0, stiffness));
        constraints
    }

    #[test]
    fn schismatic_third_beats_the_meantone_stack() {
        // −8 fifths + 5 octaves miss 5/4 by only 2 cents, 4 fifths − 2 octaves by 21
        assert_eq!(estimate_steps(386.3137, 1200.0), (-8, 5));
    }

    #[test]
    fn stiff_octave_pins_the_period() {
        let solution = solve(&targets_with_anchor(&[(3, 2), (5, 4)], 1.0), 1200.0);
        assert!(!solution.degenerate);
        assert!(!solution.period_clamped);
        assert_approx_eq!(solution.period_cents, 1200.0, 1e-6);
    }

    #[test]
    fn pure_fifth_is_reproduced_exactly() {
        let solution = solve(&targets_with_anchor(&[(3, 2)], 1.0), 1200.0);
        assert_approx_eq!(solution.generator_cents, PURE_FIFTH_CENTS, 1e-6);
        assert_approx_eq!(solution.period_cents, 1200.0, 1e-6);
        assert_approx_eq!(solution.residuals[0], 0.0, 1e-6);
    }

    #[test]
    fn octave_only_system_is_degenerate() {
        // 2/1 maps to zero generator steps, leaving the generator column empty
        let solution = solve(&targets_with_anchor(&[(2, 1)], 0.0), 1200.0);
        assert!(solution.degenerate);
        assert_approx_eq!(solution.generator_cents, PURE_FIFTH_CENTS, 1e-9);
        assert_approx_eq!(solution.period_cents, 1200.0, 1e-9);
        assert_eq!(solution.residuals.len(), 2);
    }

    #[test]
    fn runaway_period_is_clamped_and_generator_resolved() {
        let mut constraints = vec![Rank2Constraint::for_target(
            &RatioSpec::new(3, 2),
            1.0,
            1225.0,
        )];
        constraints.push(Rank2Constraint::octave_anchor(1225.0, 1.0));
        let solution = solve(&constraints, 1225.0);
        assert!(solution.period_clamped);
        assert_approx_eq!(solution.period_cents, PERIOD_MAX_CENTS, 1e-6);
        assert_approx_eq!(solution.generator_cents, PURE_FIFTH_CENTS, 1e-3);
    }

    #[test]
    fn generated_scale_stays_inside_the_period() {
        let positions = scale_positions(PURE_FIFTH_CENTS, 1200.0, 19);
        assert_eq!(positions.len(), 19);
        assert!(positions.iter().all(|&cents| (0.0..1200.0).contains(&cents)));
    }
}
