//! The solver facade: validation, dispatch, normalization and error statistics.

use std::cmp::Ordering;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::blend::{self, BlendPoint, OctaAnchor};
use crate::irregular::{self, IntervalConstraint, TargetFit};
use crate::math;
use crate::ratio::RatioSpec;
use crate::regular::{self, Rank2Constraint};
use crate::skeleton::{IntervalKind, KeySkeleton};

pub const DEFAULT_BASE_FREQUENCY_HZ: f64 = 261.625565;
pub const DEFAULT_CYCLE_CENTS: f64 = 1200.0;
pub const DEFAULT_TOLERANCE_CENTS: f64 = 10.0;

/// Complete description of one solve. Consumed once; the solver holds no state.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SolverInput {
    /// Scale size N. Must be at least 2.
    pub num_degrees: usize,
    #[serde(default = "default_base_frequency")]
    pub base_frequency_hz: f64,
    /// Length of the cycle of repetition. Only honored by the stretched octave model.
    #[serde(default = "default_cycle_cents")]
    pub cycle_cents: f64,
    #[serde(default)]
    pub octave_model: OctaveModel,
    #[serde(default)]
    pub targets: Vec<RatioSpec>,
    /// Optional weights parallel to `targets`. Missing means weight 1 for every target.
    #[serde(default)]
    pub target_weights: Option<Vec<f64>>,
    #[serde(default = "default_tolerance")]
    pub tolerance_cents: f64,
    #[serde(default)]
    pub key: KeySpecificity,
    pub mode: SolverMode,
    #[serde(default)]
    pub curve_shape: CurveShape,
    /// Continuous blend of target flavors, replacing `targets` in regular mode.
    #[serde(default)]
    pub octa: Option<OctaWeighting>,
    #[serde(default = "default_octave_stiffness")]
    pub octave_stiffness: f64,
    /// Explicit per-degree constraints, bypassing automatic target construction.
    #[serde(default)]
    pub advanced: Option<AdvancedConstraints>,
}

fn default_base_frequency() -> f64 {
    DEFAULT_BASE_FREQUENCY_HZ
}

fn default_cycle_cents() -> f64 {
    DEFAULT_CYCLE_CENTS
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE_CENTS
}

fn default_octave_stiffness() -> f64 {
    1.0
}

impl SolverInput {
    /// A minimal input for the given scale size and mode; everything else at its default.
    pub fn new(num_degrees: usize, mode: SolverMode) -> Self {
        Self {
            num_degrees,
            base_frequency_hz: default_base_frequency(),
            cycle_cents: default_cycle_cents(),
            octave_model: OctaveModel::default(),
            targets: Vec::new(),
            target_weights: None,
            tolerance_cents: default_tolerance(),
            key: KeySpecificity::default(),
            mode,
            curve_shape: CurveShape::default(),
            octa: None,
            octave_stiffness: default_octave_stiffness(),
            advanced: None,
        }
    }

    fn effective_cycle(&self) -> f64 {
        match self.octave_model {
            OctaveModel::Pure => DEFAULT_CYCLE_CENTS,
            OctaveModel::Stretched => self.cycle_cents,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OctaveModel {
    /// The cycle of repetition is the pure octave, 1200 cents.
    #[default]
    Pure,
    /// The cycle of repetition is `cycle_cents`.
    Stretched,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverMode {
    /// Rank-2 temperament: a single generator and period, solved in closed form.
    Regular,
    /// N free degree positions, solved iteratively.
    Irregular,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveShape {
    #[default]
    Symmetrical,
    /// Softens non-structural constraints for a smoother detuning curve.
    Gradual,
}

/// Which keys the tuning should favor: the tonic plus its fifths-chain neighborhood.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct KeySpecificity {
    pub tonic: usize,
    pub flats: usize,
    pub sharps: usize,
}

/// A blend control point plus optional replacement anchors (8 required).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct OctaWeighting {
    pub point: BlendPoint,
    #[serde(default)]
    pub anchors: Option<Vec<OctaAnchor>>,
}

/// Explicit constraints between degree 0 and the listed degrees.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AdvancedConstraints {
    pub intervals: Vec<DegreeInterval>,
    /// Interval of repetition; its size becomes the effective cycle of the solve.
    #[serde(default)]
    pub octave: Option<RatioSpec>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DegreeInterval {
    pub degree: usize,
    pub ratio: RatioSpec,
    #[serde(default)]
    pub tolerance_cents: Option<f64>,
    #[serde(default)]
    pub priority: Option<f64>,
    #[serde(default)]
    pub hard_max_cents: Option<f64>,
}

/// Error reported when the input is rejected before any solving.
#[derive(Clone, Debug, PartialEq)]
pub enum SolveError {
    /// Fewer than two scale degrees.
    ScaleTooSmall { num_degrees: usize },
    /// A ratio with a zero numerator or denominator.
    InvalidRatio { numer: u32, denom: u32 },
    /// An advanced-constraint degree outside 1..N.
    DegreeOutOfRange { degree: usize, num_degrees: usize },
    /// `target_weights` does not line up with `targets`.
    WeightCountMismatch {
        num_targets: usize,
        num_weights: usize,
    },
    /// The base frequency is zero, negative or not finite.
    NonPositiveFrequency { base_frequency_hz: f64 },
    /// The cycle length is zero, negative or not finite.
    InvalidCycle { cycle_cents: f64 },
    /// Replacement anchors were given but not exactly eight of them.
    AnchorCountMismatch { num_anchors: usize },
}

/// One scale degree of the solved tuning.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct NoteResult {
    pub degree: usize,
    pub cents: f64,
    pub frequency_hz: f64,
}

/// One interval's fit, reported after the final solve.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct IntervalError {
    pub lower: usize,
    pub upper: usize,
    pub steps: usize,
    pub label: String,
    pub target_cents: f64,
    pub actual_cents: f64,
    pub error_cents: f64,
    pub weight: f64,
    pub kind: IntervalKind,
    pub structural: bool,
    pub key_tonic: Option<usize>,
    pub tolerance_cents: Option<f64>,
    pub priority: Option<f64>,
    pub hard_max_cents: Option<f64>,
}

/// Aggregate fit quality over the structural intervals (all intervals if none are
/// structural).
#[derive(Copy, Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ErrorStats {
    pub max_abs_cents: f64,
    pub rms_cents: f64,
}

/// Generator/period fit of a regular solve.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Rank2Summary {
    pub generator_cents: f64,
    pub period_cents: f64,
    pub period_clamped: bool,
    pub degenerate: bool,
}

/// Non-fatal conditions encountered during a solve, in order of occurrence.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum Diagnostic {
    /// No targets were given; the built-in defaults 3/2 and 5/4 were used.
    DefaultTargets,
    /// No whole step distance approximates this target; its constraints were softened.
    PoorTargetFit {
        label: String,
        steps: usize,
        step_error_cents: f64,
    },
    /// The solved period left the allowed band and was clamped.
    PeriodClamped { period_cents: f64 },
    /// The normal equations were singular; the reference generator and period were used.
    DegenerateSystem,
    /// An interval missed its target by more than twice the global tolerance.
    ToleranceExceeded {
        label: String,
        lower: usize,
        upper: usize,
        error_cents: f64,
    },
    /// An advanced constraint ended above its hard error cap.
    HardMaxExceeded {
        degree: usize,
        error_cents: f64,
        hard_max_cents: f64,
    },
}

/// The solved tuning.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SolverOutput {
    /// Exactly N entries, ascending in cents, entry 0 at 0 cents.
    pub notes: Vec<NoteResult>,
    pub intervals: Vec<IntervalError>,
    pub stats: ErrorStats,
    /// Present for regular solves only.
    pub rank2: Option<Rank2Summary>,
    pub diagnostics: Vec<Diagnostic>,
    /// Maps each original degree index to its sorted position.
    pub degree_mapping: Vec<usize>,
}

/// Result of [`normalize_and_relabel`].
#[derive(Clone, Debug, PartialEq)]
pub struct Relabeling {
    /// Sorted cent values with the minimum shifted to zero.
    pub cents: Vec<f64>,
    /// Maps each original index to its sorted position.
    pub mapping: Vec<usize>,
}

/// Wraps all positions into the cycle, sorts them ascending and shifts the minimum to
/// zero, reporting where each original degree ended up.
///
/// # Examples
///
/// ```
/// # use assert_approx_eq::assert_approx_eq;
/// # use temper::solver::normalize_and_relabel;
/// let relabeled = normalize_and_relabel(&[710.0, 10.0, 360.0], 1200.0);
/// assert_approx_eq!(relabeled.cents[0], 0.0);
/// assert_approx_eq!(relabeled.cents[1], 350.0);
/// assert_approx_eq!(relabeled.cents[2], 700.0);
/// assert_eq!(relabeled.mapping, vec![2, 0, 1]);
/// ```
pub fn normalize_and_relabel(positions: &[f64], cycle: f64) -> Relabeling {
    if positions.is_empty() {
        return Relabeling {
            cents: Vec::new(),
            mapping: Vec::new(),
        };
    }

    let wrapped: Vec<f64> = positions
        .iter()
        .map(|&position| math::wrap_to_cycle(position, cycle))
        .collect();

    let mut order: Vec<usize> = (0..wrapped.len()).collect();
    order.sort_by(|&a, &b| {
        wrapped[a]
            .partial_cmp(&wrapped[b])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    let root = wrapped[order[0]];
    let cents = order
        .iter()
        .map(|&index| math::wrap_to_cycle(wrapped[index] - root, cycle))
        .collect();

    let mut mapping = vec![0; wrapped.len()];
    for (sorted_position, &original) in order.iter().enumerate() {
        mapping[original] = sorted_position;
    }

    Relabeling { cents, mapping }
}

/// Solves the given tuning problem.
///
/// Fatal input problems are rejected before any iteration; everything else degrades
/// gracefully and is reported through [`SolverOutput::diagnostics`].
pub fn solve(input: &SolverInput) -> Result<SolverOutput, SolveError> {
    validate(input)?;

    let cycle = input.effective_cycle();
    debug!(
        "solving {:?} tuning with {} degrees over {:.3}c",
        input.mode, input.num_degrees, cycle
    );

    match input.mode {
        SolverMode::Regular => Ok(solve_regular(input, cycle)),
        SolverMode::Irregular => Ok(solve_irregular(input, cycle)),
    }
}

fn validate(input: &SolverInput) -> Result<(), SolveError> {
    if input.num_degrees < 2 {
        return Err(SolveError::ScaleTooSmall {
            num_degrees: input.num_degrees,
        });
    }
    if !(input.base_frequency_hz.is_finite() && input.base_frequency_hz > 0.0) {
        return Err(SolveError::NonPositiveFrequency {
            base_frequency_hz: input.base_frequency_hz,
        });
    }
    if !(input.cycle_cents.is_finite() && input.cycle_cents > 0.0) {
        return Err(SolveError::InvalidCycle {
            cycle_cents: input.cycle_cents,
        });
    }

    for target in &input.targets {
        validate_ratio(target)?;
    }
    if let Some(weights) = &input.target_weights {
        if weights.len() != input.targets.len() {
            return Err(SolveError::WeightCountMismatch {
                num_targets: input.targets.len(),
                num_weights: weights.len(),
            });
        }
    }

    if let Some(octa) = &input.octa {
        if let Some(anchors) = &octa.anchors {
            if anchors.len() != blend::NUM_ANCHORS {
                return Err(SolveError::AnchorCountMismatch {
                    num_anchors: anchors.len(),
                });
            }
            for anchor in anchors {
                for ratio in &anchor.ratios {
                    validate_ratio(ratio)?;
                }
            }
        }
    }

    if let Some(advanced) = &input.advanced {
        for interval in &advanced.intervals {
            if interval.degree == 0 || interval.degree >= input.num_degrees {
                return Err(SolveError::DegreeOutOfRange {
                    degree: interval.degree,
                    num_degrees: input.num_degrees,
                });
            }
            validate_ratio(&interval.ratio)?;
        }
        if let Some(octave) = &advanced.octave {
            validate_ratio(octave)?;
        }
    }

    Ok(())
}

fn validate_ratio(ratio: &RatioSpec) -> Result<(), SolveError> {
    if ratio.is_valid() {
        Ok(())
    } else {
        Err(SolveError::InvalidRatio {
            numer: ratio.numer,
            denom: ratio.denom,
        })
    }
}

/// The weighted target list of a solve: explicit targets, the octa blend, or the built-in
/// defaults.
fn weighted_targets(input: &SolverInput, diagnostics: &mut Vec<Diagnostic>) -> Vec<(RatioSpec, f64)> {
    if input.mode == SolverMode::Regular {
        if let Some(octa) = &input.octa {
            let anchors = octa
                .anchors
                .clone()
                .unwrap_or_else(blend::default_anchors);
            let blended = blend::blend_targets(&anchors, octa.point);
            if !blended.is_empty() {
                return blended;
            }
        }
    }

    if input.targets.is_empty() {
        if input.mode == SolverMode::Regular {
            diagnostics.push(Diagnostic::DefaultTargets);
            return vec![(RatioSpec::new(3, 2), 1.0), (RatioSpec::new(5, 4), 1.0)];
        }
        return Vec::new();
    }

    input
        .targets
        .iter()
        .enumerate()
        .map(|(index, target)| {
            let weight = input
                .target_weights
                .as_ref()
                .map(|weights| weights[index])
                .unwrap_or(1.0);
            (target.clone(), weight)
        })
        .collect()
}

fn solve_regular(input: &SolverInput, cycle: f64) -> SolverOutput {
    let mut diagnostics = Vec::new();
    let targets = weighted_targets(input, &mut diagnostics);

    let mut constraints: Vec<Rank2Constraint> = targets
        .iter()
        .map(|(spec, weight)| Rank2Constraint::for_target(spec, *weight, cycle))
        .collect();
    constraints.push(Rank2Constraint::octave_anchor(cycle, input.octave_stiffness));

    let solution = regular::solve(&constraints, cycle);
    if solution.degenerate {
        warn!("rank-2 system is singular, falling back to the reference fifth");
        diagnostics.push(Diagnostic::DegenerateSystem);
    }
    if solution.period_clamped {
        warn!("period clamped to {:.3}c", solution.period_cents);
        diagnostics.push(Diagnostic::PeriodClamped {
            period_cents: solution.period_cents,
        });
    }

    let positions = regular::scale_positions(
        solution.generator_cents,
        solution.period_cents,
        input.num_degrees,
    );
    let relabeling = normalize_and_relabel(&positions, solution.period_cents);

    // Interval errors report the rank-2 model residual at the degree nearest each target.
    let intervals: Vec<IntervalError> = constraints
        .iter()
        .zip(solution.residuals.iter())
        .take(targets.len())
        .map(|(constraint, &residual)| {
            let target_in_cycle =
                math::wrap_to_cycle(constraint.ideal_cents, solution.period_cents);
            let upper = nearest_degree(&relabeling.cents, target_in_cycle);
            IntervalError {
                lower: 0,
                upper,
                steps: upper,
                label: constraint.label.clone(),
                target_cents: constraint.ideal_cents,
                actual_cents: constraint.ideal_cents - residual,
                error_cents: -residual,
                weight: constraint.weight,
                kind: IntervalKind::classify(constraint.ideal_cents),
                structural: false,
                key_tonic: None,
                tolerance_cents: None,
                priority: None,
                hard_max_cents: None,
            }
        })
        .collect();

    report_tolerance_breaches(&intervals, input.tolerance_cents, &mut diagnostics);
    let stats = error_stats(&intervals);

    SolverOutput {
        notes: notes_from(&relabeling.cents, input.base_frequency_hz),
        intervals,
        stats,
        rank2: Some(Rank2Summary {
            generator_cents: solution.generator_cents,
            period_cents: solution.period_cents,
            period_clamped: solution.period_clamped,
            degenerate: solution.degenerate,
        }),
        diagnostics,
        degree_mapping: relabeling.mapping,
    }
}

fn solve_irregular(input: &SolverInput, cycle: f64) -> SolverOutput {
    let mut diagnostics = Vec::new();

    let (mut constraints, effective_cycle) = match &input.advanced {
        Some(advanced) => (
            advanced_constraints(advanced),
            advanced
                .octave
                .as_ref()
                .map(RatioSpec::cents)
                .unwrap_or(cycle),
        ),
        None => {
            let targets = weighted_targets(input, &mut diagnostics);
            let fits: Vec<TargetFit> = targets
                .into_iter()
                .map(|(spec, weight)| {
                    TargetFit::new(
                        spec,
                        weight,
                        input.num_degrees,
                        cycle,
                        input.tolerance_cents,
                    )
                })
                .collect();
            for fit in &fits {
                if fit.poorly_approximated {
                    warn!(
                        "target {} is poorly approximated by {} steps ({:+.3}c)",
                        fit.spec, fit.steps, fit.step_error
                    );
                    diagnostics.push(Diagnostic::PoorTargetFit {
                        label: fit.spec.display_label(),
                        steps: fit.steps,
                        step_error_cents: fit.step_error,
                    });
                }
            }
            let skeleton = KeySkeleton::build(
                input.key.tonic,
                input.key.flats,
                input.key.sharps,
                input.num_degrees,
                cycle,
            );
            (
                irregular::enumerate_constraints(
                    &fits,
                    &skeleton,
                    input.num_degrees,
                    input.curve_shape == CurveShape::Gradual,
                ),
                cycle,
            )
        }
    };

    let positions = irregular::solve(&mut constraints, input.num_degrees, effective_cycle);
    let relabeling = normalize_and_relabel(&positions, effective_cycle);

    let intervals: Vec<IntervalError> = constraints
        .iter()
        .map(|constraint| {
            let lower = relabeling.mapping[constraint.lower];
            let upper = relabeling.mapping[constraint.upper];
            let actual_cents = math::wrap_to_cycle(
                relabeling.cents[upper] - relabeling.cents[lower],
                effective_cycle,
            );
            let error_cents = math::signed_wrap_diff(
                actual_cents,
                constraint.target_cents,
                effective_cycle,
            );
            IntervalError {
                lower,
                upper,
                steps: constraint.steps,
                label: constraint.label.clone(),
                target_cents: constraint.target_cents,
                actual_cents,
                error_cents,
                weight: constraint.weight,
                kind: constraint.kind,
                structural: constraint.structural,
                key_tonic: constraint.key_tonic,
                tolerance_cents: constraint.tolerance_cents,
                priority: constraint.priority,
                hard_max_cents: constraint.hard_max_cents,
            }
        })
        .collect();

    report_tolerance_breaches(&intervals, input.tolerance_cents, &mut diagnostics);
    for interval in &intervals {
        if let Some(hard_max) = interval.hard_max_cents {
            if interval.error_cents.abs() > hard_max {
                warn!(
                    "degree {} missed its hard cap: {:+.3}c > {:.3}c",
                    interval.upper, interval.error_cents, hard_max
                );
                diagnostics.push(Diagnostic::HardMaxExceeded {
                    degree: interval.upper,
                    error_cents: interval.error_cents,
                    hard_max_cents: hard_max,
                });
            }
        }
    }

    let stats = error_stats(&intervals);

    SolverOutput {
        notes: notes_from(&relabeling.cents, input.base_frequency_hz),
        intervals,
        stats,
        rank2: None,
        diagnostics,
        degree_mapping: relabeling.mapping,
    }
}

fn advanced_constraints(advanced: &AdvancedConstraints) -> Vec<IntervalConstraint> {
    advanced
        .intervals
        .iter()
        .map(|interval| {
            let target_cents = interval.ratio.cents();
            IntervalConstraint {
                lower: 0,
                upper: interval.degree,
                steps: interval.degree,
                label: interval.ratio.display_label(),
                target_cents,
                kind: IntervalKind::classify(target_cents),
                structural: false,
                key_tonic: None,
                weight: interval.priority.unwrap_or(1.0),
                tolerance_cents: interval.tolerance_cents,
                priority: interval.priority,
                hard_max_cents: interval.hard_max_cents,
            }
        })
        .collect()
}

fn report_tolerance_breaches(
    intervals: &[IntervalError],
    tolerance_cents: f64,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for interval in intervals {
        if interval.error_cents.abs() > 2.0 * tolerance_cents {
            warn!(
                "interval {} ({} -> {}) off by {:+.3}c",
                interval.label, interval.lower, interval.upper, interval.error_cents
            );
            diagnostics.push(Diagnostic::ToleranceExceeded {
                label: interval.label.clone(),
                lower: interval.lower,
                upper: interval.upper,
                error_cents: interval.error_cents,
            });
        }
    }
}

/// Max and rms absolute error over the structural intervals, or over everything when no
/// interval is structural.
fn error_stats(intervals: &[IntervalError]) -> ErrorStats {
    let structural: Vec<f64> = intervals
        .iter()
        .filter(|interval| interval.structural)
        .map(|interval| interval.error_cents.abs())
        .collect();
    let pool = if structural.is_empty() {
        intervals
            .iter()
            .map(|interval| interval.error_cents.abs())
            .collect()
    } else {
        structural
    };

    if pool.is_empty() {
        return ErrorStats::default();
    }

    let max_abs_cents = pool.iter().copied().fold(0.0, f64::max);
    let rms_cents = (pool.iter().map(|error| error * error).sum::<f64>() / pool.len() as f64).sqrt();
    ErrorStats {
        max_abs_cents,
        rms_cents,
    }
}

fn nearest_degree(sorted_cents: &[f64], target_cents: f64) -> usize {
    sorted_cents
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            (*a - target_cents)
                .abs()
                .partial_cmp(&(*b - target_cents).abs())
                .unwrap_or(Ordering::Equal)
        })
        .map(|(index, _)| index)
        .unwrap_or(0)
}

fn notes_from(sorted_cents: &[f64], base_frequency_hz: f64) -> Vec<NoteResult> {
    sorted_cents
        .iter()
        .enumerate()
        .map(|(degree, &cents)| NoteResult {
            degree,
            cents,
            frequency_hz: base_frequency_hz * (cents / 1200.0).exp2(),
        })
        .collect()
}

#[cfg(test)]
mod test {
    use assert_approx_eq::assert_approx_eq;
    use pretty_assertions::assert_eq;

    use crate::ratio::PURE_FIFTH_CENTS;

    use super::*;

    fn targets(pairs: &[(u32, u32)]) -> Vec<RatioSpec> {
        pairs
            .iter()
            .map(|&(numer, denom)| RatioSpec::new(numer, denom))
            .collect()
    }

    #[test]
    fn rejects_scales_below_two_degrees() {
        let input = SolverInput::new(1, SolverMode::Irregular);
        assert_eq!(
            solve(&input).unwrap_err(),
            SolveError::ScaleTooSmall { num_degrees: 1 }
        );
    }

    #[test]
    fn rejects_zero_denominators_before_iterating() {
        let mut input = SolverInput::new(12, SolverMode::Irregular);
        input.targets = vec![RatioSpec::new(5, 0)];
        assert_eq!(
            solve(&input).unwrap_err(),
            SolveError::InvalidRatio { numer: 5, denom: 0 }
        );
    }

    #[test]
    fn rejects_out_of_range_advanced_degrees() {
        let mut input = SolverInput::new(5, SolverMode::Irregular);
        input.advanced = Some(AdvancedConstraints {
            intervals: vec![DegreeInterval {
                degree: 5,
                ratio: RatioSpec::new(3, 2),
                tolerance_cents: None,
                priority: None,
                hard_max_cents: None,
            }],
            octave: None,
        });
        assert_eq!(
            solve(&input).unwrap_err(),
            SolveError::DegreeOutOfRange {
                degree: 5,
                num_degrees: 5
            }
        );
    }

    #[test]
    fn rejects_mismatched_weight_lists() {
        let mut input = SolverInput::new(12, SolverMode::Regular);
        input.targets = targets(&[(3, 2), (5, 4)]);
        input.target_weights = Some(vec![1.0]);
        assert_eq!(
            solve(&input).unwrap_err(),
            SolveError::WeightCountMismatch {
                num_targets: 2,
                num_weights: 1
            }
        );
    }

    #[test]
    fn stiff_octave_keeps_the_period_pure() {
        let mut input = SolverInput::new(12, SolverMode::Regular);
        input.targets = targets(&[(3, 2), (5, 4)]);
        let output = solve(&input).unwrap();

        let rank2 = output.rank2.unwrap();
        assert!(!rank2.period_clamped);
        assert_approx_eq!(rank2.period_cents, 1200.0, 1e-6);
    }

    #[test]
    fn single_fifth_target_reproduces_the_pure_fifth() {
        let mut input = SolverInput::new(12, SolverMode::Regular);
        input.targets = targets(&[(3, 2)]);
        let output = solve(&input).unwrap();

        let rank2 = output.rank2.unwrap();
        assert_approx_eq!(rank2.generator_cents, PURE_FIFTH_CENTS, 1e-6);
        assert_approx_eq!(rank2.period_cents, 1200.0, 1e-6);
    }

    #[test]
    fn nineteen_tone_fifth_lands_on_the_edo_step() {
        let mut input = SolverInput::new(19, SolverMode::Regular);
        input.targets = targets(&[(3, 2)]);
        let output = solve(&input).unwrap();

        let rank2 = output.rank2.unwrap();
        assert_approx_eq!(rank2.period_cents, 1200.0, 1e-9);

        // the generator ends up at sorted degree 11, the nearest 19-division fifth step
        assert_eq!(output.degree_mapping[1], 11);
        assert_approx_eq!(output.notes[11].cents, PURE_FIFTH_CENTS, 1e-6);
    }

    #[test]
    fn stretched_cycle_beyond_the_band_is_clamped() {
        let mut input = SolverInput::new(12, SolverMode::Regular);
        input.octave_model = OctaveModel::Stretched;
        input.cycle_cents = 1225.0;
        input.targets = targets(&[(3, 2)]);
        let output = solve(&input).unwrap();

        let rank2 = output.rank2.unwrap();
        assert!(rank2.period_clamped);
        assert_approx_eq!(rank2.period_cents, 1210.0, 1e-6);
        assert!(output
            .diagnostics
            .iter()
            .any(|diagnostic| matches!(diagnostic, Diagnostic::PeriodClamped { .. })));
    }

    #[test]
    fn empty_regular_targets_fall_back_to_defaults() {
        let input = SolverInput::new(12, SolverMode::Regular);
        let output = solve(&input).unwrap();

        assert!(output.diagnostics.contains(&Diagnostic::DefaultTargets));
        assert_eq!(output.intervals.len(), 2);
    }

    #[test]
    fn degenerate_system_reports_the_fallback() {
        let mut input = SolverInput::new(12, SolverMode::Regular);
        input.targets = targets(&[(2, 1)]);
        input.octave_stiffness = 0.0;
        let output = solve(&input).unwrap();

        let rank2 = output.rank2.unwrap();
        assert!(rank2.degenerate);
        assert_approx_eq!(rank2.generator_cents, PURE_FIFTH_CENTS, 1e-9);
        assert!(output.diagnostics.contains(&Diagnostic::DegenerateSystem));
    }

    #[test]
    fn irregular_notes_start_at_zero_and_ascend() {
        let mut input = SolverInput::new(12, SolverMode::Irregular);
        input.targets = targets(&[(3, 2), (5, 4)]);
        input.key = KeySpecificity {
            tonic: 0,
            flats: 3,
            sharps: 4,
        };
        let output = solve(&input).unwrap();

        assert_eq!(output.notes.len(), 12);
        assert_approx_eq!(output.notes[0].cents, 0.0, 1e-12);
        for pair in output.notes.windows(2) {
            assert!(pair[0].cents <= pair[1].cents);
        }
        assert!(output
            .notes
            .iter()
            .all(|note| (0.0..1200.0).contains(&note.cents)));
    }

    #[test]
    fn key_specific_twelve_tone_tuning_fits_its_skeleton() {
        let mut input = SolverInput::new(12, SolverMode::Irregular);
        input.targets = targets(&[(3, 2), (5, 4)]);
        input.key = KeySpecificity {
            tonic: 0,
            flats: 3,
            sharps: 4,
        };
        let output = solve(&input).unwrap();

        assert!(
            output.stats.max_abs_cents <= 7.0,
            "structural error too large: {}",
            output.stats.max_abs_cents
        );
        assert!(output.stats.rms_cents <= output.stats.max_abs_cents);
        assert!(output.intervals.iter().any(|interval| interval.structural));
        assert!(output
            .intervals
            .iter()
            .all(|interval| interval.weight > 0.0));
    }

    #[test]
    fn advanced_constraints_bypass_pair_enumeration() {
        let mut input = SolverInput::new(5, SolverMode::Irregular);
        input.advanced = Some(AdvancedConstraints {
            intervals: vec![
                DegreeInterval {
                    degree: 1,
                    ratio: RatioSpec::new(9, 8),
                    tolerance_cents: None,
                    priority: None,
                    hard_max_cents: None,
                },
                DegreeInterval {
                    degree: 2,
                    ratio: RatioSpec::new(5, 4),
                    tolerance_cents: None,
                    priority: Some(2.0),
                    hard_max_cents: None,
                },
                DegreeInterval {
                    degree: 3,
                    ratio: RatioSpec::new(3, 2),
                    tolerance_cents: None,
                    priority: None,
                    hard_max_cents: Some(25.0),
                },
            ],
            octave: Some(RatioSpec::new(2, 1)),
        });
        let output = solve(&input).unwrap();

        assert_eq!(output.intervals.len(), 3);
        assert!(output.intervals.iter().all(|interval| interval.lower == 0));
        assert_eq!(output.notes.len(), 5);
        assert_approx_eq!(output.notes[0].cents, 0.0, 1e-12);

        // the capped fifth keeps its priority weight and lands within the cap
        let fifth = output
            .intervals
            .iter()
            .find(|interval| interval.hard_max_cents.is_some())
            .unwrap();
        assert!(fifth.error_cents.abs() <= 25.0);
    }

    #[test]
    fn center_blend_spreads_weight_over_all_anchors() {
        let mut input = SolverInput::new(12, SolverMode::Regular);
        input.octa = Some(OctaWeighting {
            point: BlendPoint::new(0.5, 0.5, 0.5),
            anchors: None,
        });
        let output = solve(&input).unwrap();

        // the blend replaces the default target list
        assert!(!output.diagnostics.contains(&Diagnostic::DefaultTargets));
        assert!(output.intervals.len() > 2);
        let fifth_weight = output
            .intervals
            .iter()
            .find(|interval| interval.label == "3/2")
            .unwrap()
            .weight;
        assert_approx_eq!(fifth_weight, 1.0, 1e-9);
    }

    #[test]
    fn frequencies_follow_the_cent_values() {
        let mut input = SolverInput::new(2, SolverMode::Irregular);
        input.base_frequency_hz = 440.0;
        let output = solve(&input).unwrap();

        assert_approx_eq!(output.notes[0].frequency_hz, 440.0, 1e-9);
        assert_approx_eq!(
            output.notes[1].frequency_hz,
            440.0 * (output.notes[1].cents / 1200.0).exp2(),
            1e-9
        );
    }

    #[test]
    fn input_round_trips_through_yaml() {
        let mut input = SolverInput::new(19, SolverMode::Regular);
        input.targets = targets(&[(3, 2), (7, 4)]);
        input.target_weights = Some(vec![1.0, 0.5]);
        input.curve_shape = CurveShape::Gradual;
        input.key = KeySpecificity {
            tonic: 3,
            flats: 1,
            sharps: 2,
        };

        let serialized = serde_yaml::to_string(&input).unwrap();
        let deserialized: SolverInput = serde_yaml::from_str(&serialized).unwrap();

        assert_eq!(deserialized.num_degrees, 19);
        assert_eq!(deserialized.mode, SolverMode::Regular);
        assert_eq!(deserialized.curve_shape, CurveShape::Gradual);
        assert_eq!(deserialized.targets, input.targets);
        assert_eq!(deserialized.key, input.key);
    }
}
