//! Fairness monitoring
//!
//! Compares false-positive and false-negative rates across three
//! time-of-day cohorts. The report is a displayed monitoring signal; callers
//! decide what a failed check means.
//!
//! # Disparity
//!
//! ```text
//! max_disparity = max(max(FPR) - min(FPR), max(FNR) - min(FNR))
//! passed        = max_disparity ≤ 5.0 percentage points
//! ```
//!
//! Without labeled incident data the rates are simulated from a seed derived
//! from the grid size (`SimulatedRates`). Those values are placeholders and
//! the report says so via `simulated`. `LabeledIncidents` computes real rates
//! from held-out outcomes with the same output contract.

use crate::grid::{Mulberry32, RiskGrid};
use crate::round2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Maximum allowed disparity (percentage points)
pub const DISPARITY_THRESHOLD: f64 = 5.0;

/// Simulated rate range (percent)
const SIM_RATE_MIN: f64 = 2.0;
const SIM_RATE_SPAN: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cohort {
    /// 06–17
    Day,
    /// 18–21
    Evening,
    /// 22–05
    Night,
}

impl Cohort {
    pub const ALL: [Cohort; 3] = [Cohort::Day, Cohort::Evening, Cohort::Night];

    pub fn from_hour(hour: u8) -> Self {
        match hour % 24 {
            6..=17 => Cohort::Day,
            18..=21 => Cohort::Evening,
            _ => Cohort::Night,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Cohort::Day => "Day (06–17)",
            Cohort::Evening => "Evening (18–21)",
            Cohort::Night => "Night (22–05)",
        }
    }
}

/// Error rates for one cohort (percent)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairnessGroup {
    pub name: String,
    pub fpr: f64,
    pub fnr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairnessReport {
    pub groups: Vec<FairnessGroup>,
    pub fpr_disparity: f64,
    pub fnr_disparity: f64,
    pub max_disparity: f64,
    pub threshold: f64,
    pub passed: bool,
    /// Rates were simulated rather than measured
    pub simulated: bool,
}

impl FairnessReport {
    /// Build a report from per-cohort rates
    pub fn from_groups(groups: Vec<FairnessGroup>, threshold: f64) -> Self {
        let fpr_disparity = round2(spread(groups.iter().map(|g| g.fpr)));
        let fnr_disparity = round2(spread(groups.iter().map(|g| g.fnr)));
        let max_disparity = fpr_disparity.max(fnr_disparity);

        Self {
            groups,
            fpr_disparity,
            fnr_disparity,
            max_disparity,
            threshold,
            passed: passes(max_disparity, threshold),
            simulated: false,
        }
    }
}

/// Threshold check: equality passes
pub fn passes(max_disparity: f64, threshold: f64) -> bool {
    max_disparity <= threshold
}

fn spread(values: impl Iterator<Item = f64>) -> f64 {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if min.is_finite() && max.is_finite() {
        max - min
    } else {
        0.0
    }
}

/// Source of per-cohort FPR/FNR
pub trait ErrorRateSource {
    fn rates(&self) -> Vec<FairnessGroup>;

    fn is_simulated(&self) -> bool;
}

/// Seeded placeholder rates in [2, 6]%
#[derive(Debug, Clone, Copy)]
pub struct SimulatedRates {
    seed: u32,
}

impl SimulatedRates {
    /// Seed from the grid's cell count
    pub fn for_grid(grid: &RiskGrid) -> Self {
        Self {
            seed: grid.len() as u32,
        }
    }

    pub fn with_seed(seed: u32) -> Self {
        Self { seed }
    }
}

impl ErrorRateSource for SimulatedRates {
    fn rates(&self) -> Vec<FairnessGroup> {
        let mut rng = Mulberry32::new(self.seed);
        Cohort::ALL
            .iter()
            .map(|cohort| {
                // Draw order per cohort: FPR then FNR
                let fpr = round2(SIM_RATE_MIN + rng.next_f64() * SIM_RATE_SPAN);
                let fnr = round2(SIM_RATE_MIN + rng.next_f64() * SIM_RATE_SPAN);
                FairnessGroup {
                    name: cohort.display_name().to_string(),
                    fpr,
                    fnr,
                }
            })
            .collect()
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

/// One held-out labeled outcome
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LabeledOutcome {
    pub hour: u8,
    /// The model flagged the location as high risk
    pub predicted_high: bool,
    /// An incident actually occurred
    pub incident: bool,
}

/// Rates measured against labeled incidents
#[derive(Debug, Clone, Default)]
pub struct LabeledIncidents {
    outcomes: Vec<LabeledOutcome>,
}

impl LabeledIncidents {
    pub fn new(outcomes: Vec<LabeledOutcome>) -> Self {
        Self { outcomes }
    }
}

#[derive(Default)]
struct Confusion {
    tp: u32,
    fp: u32,
    tn: u32,
    fn_: u32,
}

fn percent(num: u32, den: u32) -> f64 {
    if den == 0 {
        0.0
    } else {
        round2(f64::from(num) / f64::from(den) * 100.0)
    }
}

impl ErrorRateSource for LabeledIncidents {
    fn rates(&self) -> Vec<FairnessGroup> {
        Cohort::ALL
            .iter()
            .map(|cohort| {
                let mut m = Confusion::default();
                for o in self.outcomes.iter().filter(|o| Cohort::from_hour(o.hour) == *cohort) {
                    match (o.predicted_high, o.incident) {
                        (true, true) => m.tp += 1,
                        (true, false) => m.fp += 1,
                        (false, false) => m.tn += 1,
                        (false, true) => m.fn_ += 1,
                    }
                }
                FairnessGroup {
                    name: cohort.display_name().to_string(),
                    fpr: percent(m.fp, m.fp + m.tn),
                    fnr: percent(m.fn_, m.fn_ + m.tp),
                }
            })
            .collect()
    }

    fn is_simulated(&self) -> bool {
        false
    }
}

/// Audit with any rate source
pub fn audit_with(source: &impl ErrorRateSource, threshold: f64) -> FairnessReport {
    let mut report = FairnessReport::from_groups(source.rates(), threshold);
    report.simulated = source.is_simulated();

    debug!(
        "Fairness audit: fpr_d={:.2} fnr_d={:.2} max={:.2} passed={}",
        report.fpr_disparity, report.fnr_disparity, report.max_disparity, report.passed
    );
    if !report.passed {
        warn!(
            "Fairness disparity {:.2} exceeds threshold {:.2}",
            report.max_disparity, report.threshold
        );
    }

    report
}

/// Audit a grid with simulated rates and the default threshold
pub fn audit(grid: &RiskGrid) -> FairnessReport {
    audit_with(&SimulatedRates::for_grid(grid), DISPARITY_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{generate, GridSpec};

    fn group(name: &str, fpr: f64, fnr: f64) -> FairnessGroup {
        FairnessGroup {
            name: name.to_string(),
            fpr,
            fnr,
        }
    }

    #[test]
    fn test_simulated_audit_vector() {
        let grid = generate(GridSpec::new(13.0827, 80.2707, 2).with_grid_size(4)).unwrap();
        let report = audit(&grid);

        assert_eq!(
            report.groups,
            vec![
                group("Day (06–17)", 4.53, 2.58),
                group("Evening (18–21)", 5.01, 3.55),
                group("Night (22–05)", 3.36, 2.08),
            ]
        );
        assert_eq!(report.fpr_disparity, 1.65);
        assert_eq!(report.fnr_disparity, 1.47);
        assert_eq!(report.max_disparity, 1.65);
        assert_eq!(report.threshold, 5.0);
        assert!(report.passed);
        assert!(report.simulated);
    }

    #[test]
    fn test_default_grid_audit() {
        let grid = generate(GridSpec::new(13.0827, 80.2707, 12)).unwrap();
        let report = audit(&grid);
        assert_eq!(report.fpr_disparity, 3.1);
        assert_eq!(report.fnr_disparity, 1.14);
        assert_eq!(report.max_disparity, 3.1);
    }

    #[test]
    fn test_simulated_rates_in_range() {
        for seed in [0, 1, 16, 400, 9999] {
            for g in SimulatedRates::with_seed(seed).rates() {
                assert!((2.0..=6.0).contains(&g.fpr));
                assert!((2.0..=6.0).contains(&g.fnr));
            }
        }
    }

    #[test]
    fn test_threshold_boundary() {
        let at = FairnessReport::from_groups(
            vec![group("a", 2.0, 2.0), group("b", 7.0, 3.0)],
            DISPARITY_THRESHOLD,
        );
        assert_eq!(at.max_disparity, 5.0);
        assert!(at.passed);

        let over = FairnessReport::from_groups(
            vec![group("a", 2.0, 2.0), group("b", 3.0, 7.01)],
            DISPARITY_THRESHOLD,
        );
        assert_eq!(over.max_disparity, 5.01);
        assert!(!over.passed);
    }

    #[test]
    fn test_cohort_from_hour() {
        assert_eq!(Cohort::from_hour(6), Cohort::Day);
        assert_eq!(Cohort::from_hour(17), Cohort::Day);
        assert_eq!(Cohort::from_hour(18), Cohort::Evening);
        assert_eq!(Cohort::from_hour(21), Cohort::Evening);
        assert_eq!(Cohort::from_hour(22), Cohort::Night);
        assert_eq!(Cohort::from_hour(5), Cohort::Night);
    }

    #[test]
    fn test_labeled_incident_rates() {
        let outcome = |hour, predicted_high, incident| LabeledOutcome {
            hour,
            predicted_high,
            incident,
        };
        let source = LabeledIncidents::new(vec![
            // Day: 1 FP of 4 negatives, 0 FN of 2 positives
            outcome(9, true, false),
            outcome(10, false, false),
            outcome(11, false, false),
            outcome(12, false, false),
            outcome(13, true, true),
            outcome(14, true, true),
            // Night: 0 FP of 1 negative, 1 FN of 2 positives
            outcome(23, false, false),
            outcome(1, false, true),
            outcome(2, true, true),
        ]);

        let report = audit_with(&source, DISPARITY_THRESHOLD);
        assert!(!report.simulated);
        assert_eq!(report.groups[0].fpr, 25.0);
        assert_eq!(report.groups[0].fnr, 0.0);
        // No evening outcomes
        assert_eq!(report.groups[1].fpr, 0.0);
        assert_eq!(report.groups[2].fnr, 50.0);
        assert_eq!(report.max_disparity, 50.0);
        assert!(!report.passed);
    }
}
