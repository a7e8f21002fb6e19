//! Deterministic candidate validation.
//!
//! K_i: Pure function of the candidate alone: no I/O, no clock. Critical
//! rules guard physical validity; soft rules flag combinations that are
//! unusual for the scenario but still usable.

use crate::models::{
    Candidate, Distribution, MobilityClass, ScenarioType, ValidationOutcome, Violation,
};

/// Fraction above which pedestrians or cyclists on a highway are flagged.
const HIGHWAY_VULNERABLE_THRESHOLD: f64 = 0.05;

/// Stationary share above which a rural scenario is flagged.
const RURAL_STATIONARY_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct Validator {
    tolerance: f64,
}

impl Validator {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn validate(&self, candidate: &Candidate) -> ValidationOutcome {
        let mut violations = Vec::new();

        self.check_distribution(&candidate.distribution, &mut violations);
        check_velocities(candidate, &mut violations);
        check_bounds(candidate, &mut violations);
        check_counts(candidate, &mut violations);
        check_model(candidate, &mut violations);
        check_scenario(candidate.scenario, &candidate.distribution, &mut violations);

        ValidationOutcome::from_violations(violations)
    }

    fn check_distribution(&self, dist: &Distribution, out: &mut Vec<Violation>) {
        if dist.fractions.is_empty() {
            out.push(Violation::critical(
                "distribution.empty",
                "Distribution has no mobility classes",
            ));
            return;
        }

        for (class, fraction) in &dist.fractions {
            if !(0.0..=1.0).contains(fraction) {
                out.push(Violation::critical(
                    "distribution.range",
                    format!("Fraction for {class} must be between 0 and 1 (got {fraction})"),
                ));
            }
        }

        let total = dist.sum();
        if !total.is_finite() || (total - 1.0).abs() > self.tolerance {
            out.push(Violation::critical(
                "distribution.sum",
                format!("Distribution fractions must sum to 1.0 (got {total})"),
            ));
        }
    }
}

fn check_velocities(candidate: &Candidate, out: &mut Vec<Violation>) {
    for (class, profile) in &candidate.velocities {
        let (min, max) = class.velocity_range();
        if !(min..=max).contains(&profile.velocity) {
            out.push(Violation::critical(
                "velocity.range",
                format!(
                    "Velocity {} m/s for {class} is outside valid range [{min}, {max}]",
                    profile.velocity
                ),
            ));
        }
        if !(profile.velocity_variance >= 0.0) {
            out.push(Violation::critical(
                "velocity.variance",
                format!(
                    "Velocity variance for {class} must be non-negative (got {})",
                    profile.velocity_variance
                ),
            ));
        }
    }

    for class in MobilityClass::ALL {
        if candidate.distribution.fraction(class) > 0.0 && !candidate.velocities.contains_key(&class)
        {
            out.push(Violation::critical(
                "velocity.missing",
                format!("No velocity profile for {class}, which has a non-zero fraction"),
            ));
        }
    }
}

fn check_bounds(candidate: &Candidate, out: &mut Vec<Violation>) {
    let b = &candidate.bounds;
    let coords = [b.min_lat, b.max_lat, b.min_lon, b.max_lon];

    let in_range = coords.iter().all(|c| c.is_finite())
        && (-90.0..=90.0).contains(&b.min_lat)
        && (-90.0..=90.0).contains(&b.max_lat)
        && (-180.0..=180.0).contains(&b.min_lon)
        && (-180.0..=180.0).contains(&b.max_lon);

    if !in_range {
        out.push(Violation::critical(
            "bounds.invalid",
            format!(
                "Bounding box [{}, {}] x [{}, {}] is outside valid coordinates",
                b.min_lat, b.max_lat, b.min_lon, b.max_lon
            ),
        ));
        return;
    }

    if b.min_lat >= b.max_lat || b.min_lon >= b.max_lon {
        out.push(Violation::critical(
            "bounds.degenerate",
            format!(
                "Bounding box must have positive extent (lat {}..{}, lon {}..{})",
                b.min_lat, b.max_lat, b.min_lon, b.max_lon
            ),
        ));
    }
}

fn check_counts(candidate: &Candidate, out: &mut Vec<Violation>) {
    if candidate.entity_count == 0 {
        out.push(Violation::critical(
            "entity_count.positive",
            "Entity count must be positive",
        ));
    }
    if candidate.ticks.num_ticks == 0 {
        out.push(Violation::critical(
            "ticks.positive",
            "Tick count must be positive",
        ));
    }
}

fn check_model(candidate: &Candidate, out: &mut Vec<Violation>) {
    let m = &candidate.model;
    if !(0.0..=1.0).contains(&m.alpha) {
        out.push(Violation::critical(
            "model.alpha",
            format!("Alpha value {} is outside valid range [0, 1]", m.alpha),
        ));
    }
    if !(m.variance >= 0.0) {
        out.push(Violation::critical(
            "model.variance",
            format!("Variance value {} must be non-negative", m.variance),
        ));
    }
}

fn check_scenario(scenario: ScenarioType, dist: &Distribution, out: &mut Vec<Violation>) {
    match scenario {
        ScenarioType::Highway => {
            let pedestrian = dist.fraction(MobilityClass::Pedestrian);
            if pedestrian > HIGHWAY_VULNERABLE_THRESHOLD {
                out.push(Violation::warning(
                    "scenario.highway_pedestrian",
                    format!(
                        "Highway scenarios typically should not include pedestrians (pedestrian fraction {pedestrian})"
                    ),
                ));
            }
            let cyclist = dist.fraction(MobilityClass::Cyclist);
            if cyclist > HIGHWAY_VULNERABLE_THRESHOLD {
                out.push(Violation::warning(
                    "scenario.highway_cyclist",
                    format!(
                        "Highway scenarios typically should not include cyclists (cyclist fraction {cyclist})"
                    ),
                ));
            }
        }
        ScenarioType::Rural => {
            let stationary = dist.fraction(MobilityClass::Stationary);
            if stationary > RURAL_STATIONARY_THRESHOLD {
                out.push(Violation::warning(
                    "scenario.rural_stationary",
                    format!(
                        "Rural scenarios typically have lower stationary fractions (got {stationary})"
                    ),
                ));
            }
        }
        ScenarioType::Urban => {
            if dist.fraction(MobilityClass::Pedestrian) == 0.0 {
                out.push(Violation::warning(
                    "scenario.urban_no_pedestrian",
                    "Urban scenarios typically include pedestrians",
                ));
            }
        }
        ScenarioType::Suburban | ScenarioType::Mixed => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Classification, Severity, TickConfig};
    use crate::services::testing::{intent, proposal, tokyo_bounds};
    use crate::models::{Candidate, MergeDefaults};

    const EPS: f64 = 1e-6;

    fn candidate(fractions: &[(MobilityClass, f64)]) -> Candidate {
        Candidate::merge(
            &intent(ScenarioType::Urban, None),
            tokyo_bounds(),
            proposal(fractions),
            MergeDefaults {
                entity_count: 100,
                num_ticks: 50,
            },
        )
    }

    fn in_scenario(c: &Candidate, scenario: ScenarioType) -> Candidate {
        Candidate {
            scenario,
            ..c.clone()
        }
    }

    fn rules(outcome: &ValidationOutcome) -> Vec<&str> {
        outcome.violations.iter().map(|v| v.rule.as_str()).collect()
    }

    #[test]
    fn test_urban_mix_is_ok() {
        let c = candidate(&[
            (MobilityClass::Pedestrian, 0.6),
            (MobilityClass::Car, 0.3),
            (MobilityClass::Cyclist, 0.1),
        ]);
        let outcome = Validator::new(EPS).validate(&in_scenario(&c, ScenarioType::Urban));
        assert_eq!(outcome.classification, Classification::Ok);
        assert!(outcome.violations.is_empty());
    }

    #[test]
    fn test_sum_above_one_is_critical() {
        let c = candidate(&[(MobilityClass::Pedestrian, 0.8), (MobilityClass::Car, 0.5)]);
        let outcome = Validator::new(EPS).validate(&in_scenario(&c, ScenarioType::Urban));
        assert_eq!(outcome.classification, Classification::CriticalFailure);
        assert_eq!(rules(&outcome), vec!["distribution.sum"]);
    }

    #[test]
    fn test_sum_within_tolerance_passes() {
        let c = candidate(&[
            (MobilityClass::Pedestrian, 0.3333333),
            (MobilityClass::Car, 0.3333333),
            (MobilityClass::Cyclist, 0.3333334),
        ]);
        let outcome = Validator::new(EPS).validate(&in_scenario(&c, ScenarioType::Mixed));
        assert!(outcome.is_ok());

        let loose = candidate(&[(MobilityClass::Pedestrian, 0.5), (MobilityClass::Car, 0.505)]);
        assert!(Validator::new(0.01).validate(&in_scenario(&loose, ScenarioType::Mixed)).is_ok());
        assert!(!Validator::new(EPS).validate(&in_scenario(&loose, ScenarioType::Mixed)).is_ok());
    }

    #[test]
    fn test_fraction_out_of_range_is_critical() {
        let c = candidate(&[(MobilityClass::Pedestrian, 1.2), (MobilityClass::Car, -0.2)]);
        let outcome = Validator::new(EPS).validate(&in_scenario(&c, ScenarioType::Urban));
        assert_eq!(
            rules(&outcome),
            vec!["distribution.range", "distribution.range"]
        );
    }

    #[test]
    fn test_empty_distribution_is_critical() {
        let c = candidate(&[]);
        let outcome = Validator::new(EPS).validate(&in_scenario(&c, ScenarioType::Suburban));
        assert_eq!(rules(&outcome), vec!["distribution.empty"]);
    }

    #[test]
    fn test_velocity_rules() {
        let mut c = candidate(&[(MobilityClass::Car, 1.0)]);
        c.velocities.get_mut(&MobilityClass::Car).unwrap().velocity = 45.0;
        c.velocities
            .get_mut(&MobilityClass::Pedestrian)
            .unwrap()
            .velocity_variance = -0.1;
        let outcome = Validator::new(EPS).validate(&in_scenario(&c, ScenarioType::Suburban));
        assert_eq!(rules(&outcome), vec!["velocity.variance", "velocity.range"]);
        assert!(outcome.violations[1].message.contains("car"));
    }

    #[test]
    fn test_missing_velocity_for_used_class() {
        let mut c = candidate(&[(MobilityClass::Car, 0.5), (MobilityClass::Cyclist, 0.5)]);
        c.velocities.remove(&MobilityClass::Cyclist);
        let outcome = Validator::new(EPS).validate(&in_scenario(&c, ScenarioType::Suburban));
        assert_eq!(rules(&outcome), vec!["velocity.missing"]);
    }

    #[test]
    fn test_degenerate_and_invalid_bounds() {
        let mut c = candidate(&[(MobilityClass::Car, 1.0)]);
        c.bounds.max_lat = c.bounds.min_lat;
        let outcome = Validator::new(EPS).validate(&in_scenario(&c, ScenarioType::Suburban));
        assert_eq!(rules(&outcome), vec!["bounds.degenerate"]);

        c.bounds.max_lat = 95.0;
        let outcome = Validator::new(EPS).validate(&in_scenario(&c, ScenarioType::Suburban));
        assert_eq!(rules(&outcome), vec!["bounds.invalid"]);

        c.bounds.max_lat = f64::NAN;
        let outcome = Validator::new(EPS).validate(&in_scenario(&c, ScenarioType::Suburban));
        assert_eq!(rules(&outcome), vec!["bounds.invalid"]);
    }

    #[test]
    fn test_counts_and_model_rules() {
        let mut c = candidate(&[(MobilityClass::Car, 1.0)]);
        c.entity_count = 0;
        c.ticks = TickConfig { num_ticks: 0 };
        c.model.alpha = 1.5;
        c.model.variance = -0.5;
        let outcome = Validator::new(EPS).validate(&in_scenario(&c, ScenarioType::Suburban));
        assert_eq!(
            rules(&outcome),
            vec![
                "entity_count.positive",
                "ticks.positive",
                "model.alpha",
                "model.variance"
            ]
        );
    }

    #[test]
    fn test_highway_pedestrians_are_a_warning() {
        let c = candidate(&[(MobilityClass::Pedestrian, 0.2), (MobilityClass::Car, 0.8)]);
        let outcome = Validator::new(EPS).validate(&in_scenario(&c, ScenarioType::Highway));
        assert_eq!(outcome.classification, Classification::Warning);
        assert_eq!(rules(&outcome), vec!["scenario.highway_pedestrian"]);
        assert_eq!(outcome.violations[0].severity, Severity::Warning);
        assert!(outcome.violations[0].message.contains("Highway"));
    }

    #[test]
    fn test_small_highway_share_below_threshold() {
        let c = candidate(&[(MobilityClass::Cyclist, 0.03), (MobilityClass::Car, 0.97)]);
        assert!(Validator::new(EPS).validate(&in_scenario(&c, ScenarioType::Highway)).is_ok());
    }

    #[test]
    fn test_rural_and_urban_shape_warnings() {
        let c = candidate(&[(MobilityClass::Stationary, 0.7), (MobilityClass::Car, 0.3)]);
        let rural = Validator::new(EPS).validate(&in_scenario(&c, ScenarioType::Rural));
        assert_eq!(rules(&rural), vec!["scenario.rural_stationary"]);

        let urban = Validator::new(EPS).validate(&in_scenario(&c, ScenarioType::Urban));
        assert_eq!(rules(&urban), vec!["scenario.urban_no_pedestrian"]);
    }

    #[test]
    fn test_critical_and_soft_together_is_critical() {
        let c = candidate(&[(MobilityClass::Pedestrian, 0.5), (MobilityClass::Car, 0.8)]);
        let outcome = Validator::new(EPS).validate(&in_scenario(&c, ScenarioType::Highway));
        assert_eq!(outcome.classification, Classification::CriticalFailure);
        assert_eq!(
            rules(&outcome),
            vec!["distribution.sum", "scenario.highway_pedestrian"]
        );
    }

    #[test]
    fn test_scenario_comes_from_merged_intent() {
        let c = Candidate::merge(
            &intent(ScenarioType::Highway, None),
            tokyo_bounds(),
            proposal(&[(MobilityClass::Pedestrian, 0.2), (MobilityClass::Car, 0.8)]),
            MergeDefaults {
                entity_count: 100,
                num_ticks: 50,
            },
        );
        assert_eq!(c.scenario, ScenarioType::Highway);

        let outcome = Validator::new(EPS).validate(&c);
        assert_eq!(rules(&outcome), vec!["scenario.highway_pedestrian"]);
    }
}
