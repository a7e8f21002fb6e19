//! Mapping from the settled candidate to the output schema.

use crate::models::{
    Candidate, ClassParams, GaussMarkovParams, GenerationResult, Intent, LatLonBoundaries,
    MobilityClass, OutputConfig, RunMetadata, TerminalState, TraceGenerationParams,
    UeTracksGeneration, UeTracksParams, ValidationOutcome,
};
use crate::pipeline::RetryState;
use chrono::Utc;
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// Builds results. Holds only the fixed trace-engine settings.
#[derive(Debug, Clone)]
pub struct Formatter {
    output: OutputConfig,
}

impl Formatter {
    pub fn new(output: OutputConfig) -> Self {
        Self { output }
    }

    /// Assemble the result. Inputs are borrowed and left untouched.
    pub fn format(
        &self,
        candidate: &Candidate,
        retry: &RetryState,
        intent: &Intent,
        terminal: TerminalState,
        outcome: &ValidationOutcome,
        elapsed: Duration,
    ) -> GenerationResult {
        let mut warnings = outcome.violations.clone();
        warnings.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.rule.cmp(&b.rule)));

        GenerationResult {
            status: terminal.status(),
            retry_count: retry.attempt,
            warnings,
            intent: intent.clone(),
            params: self.params(candidate),
            metadata: RunMetadata {
                run_id: Uuid::new_v4().to_string(),
                generated_at: Utc::now(),
                terminal_state: terminal,
                retry_count: retry.attempt,
                retry_bound: retry.bound,
                outcome_history: retry.classifications(),
                distribution_provenance: candidate.distribution.provenance,
                class_fractions: candidate.distribution.fractions.clone(),
                location: candidate.bounds.clone(),
                elapsed_ms: elapsed.as_millis() as u64,
            },
        }
    }

    fn params(&self, candidate: &Candidate) -> TraceGenerationParams {
        let counts = allocate_counts(candidate);

        let ue_class_distribution = MobilityClass::ALL
            .into_iter()
            .map(|class| {
                let profile = candidate.velocities.get(&class).copied().unwrap_or_default();
                (
                    class.as_str().to_string(),
                    ClassParams {
                        count: counts.get(&class).copied().unwrap_or(0),
                        velocity: profile.velocity,
                        velocity_variance: profile.velocity_variance,
                    },
                )
            })
            .collect();

        let b = &candidate.bounds;
        TraceGenerationParams {
            ue_tracks_generation: UeTracksGeneration {
                params: UeTracksParams {
                    simulation_duration: self.output.simulation_duration_secs,
                    simulation_time_interval_seconds: self.output.tick_interval_secs,
                    num_ticks: candidate.ticks.num_ticks,
                    num_batches: self.output.num_batches,
                    ue_class_distribution,
                    lat_lon_boundaries: LatLonBoundaries {
                        min_lat: b.min_lat,
                        max_lat: b.max_lat,
                        min_lon: b.min_lon,
                        max_lon: b.max_lon,
                    },
                    gauss_markov_params: GaussMarkovParams {
                        alpha: candidate.model.alpha,
                        variance: candidate.model.variance,
                        rng_seed: self.output.rng_seed,
                        lon_x_dims: self.output.lon_x_dims,
                        lon_y_dims: self.output.lon_y_dims,
                    },
                },
            },
        }
    }
}

/// Split the entity count across classes by largest remainder.
///
/// Fractions are normalised by their sum first, so a best-effort
/// distribution that does not sum to one still yields counts adding up to
/// the entity count. Negative and non-finite fractions count as zero.
pub fn allocate_counts(candidate: &Candidate) -> BTreeMap<MobilityClass, u32> {
    let total = candidate.entity_count;
    let weights: Vec<(MobilityClass, f64)> = MobilityClass::ALL
        .into_iter()
        .map(|class| {
            let f = candidate.distribution.fraction(class);
            (class, if f.is_finite() && f > 0.0 { f } else { 0.0 })
        })
        .collect();

    let sum: f64 = weights.iter().map(|(_, w)| w).sum();
    if sum <= 0.0 || total == 0 {
        return MobilityClass::ALL.into_iter().map(|c| (c, 0)).collect();
    }

    let mut counts = BTreeMap::new();
    let mut remainders = Vec::with_capacity(weights.len());
    let mut assigned = 0u32;
    for (class, weight) in weights {
        let exact = weight / sum * f64::from(total);
        let floor = exact.floor() as u32;
        counts.insert(class, floor);
        remainders.push((class, exact - f64::from(floor), weight > 0.0));
        assigned += floor;
    }

    // ties go to the earlier class
    remainders.sort_by(|a, b| b.1.total_cmp(&a.1));
    for (class, _, _) in remainders
        .iter()
        .filter(|(_, _, used)| *used)
        .cycle()
        .take(total.saturating_sub(assigned) as usize)
    {
        if let Some(count) = counts.get_mut(class) {
            *count += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Classification, Distribution, MergeDefaults, Provenance, RunStatus, ScenarioType,
        Violation,
    };
    use crate::services::testing::{intent, proposal, tokyo_bounds};

    fn candidate(fractions: &[(MobilityClass, f64)], entity_count: u32) -> Candidate {
        let mut c = Candidate::merge(
            &intent(ScenarioType::Urban, None),
            tokyo_bounds(),
            proposal(fractions),
            MergeDefaults {
                entity_count: 100,
                num_ticks: 50,
            },
        );
        c.entity_count = entity_count;
        c
    }

    fn retry(attempt: u32, history: &[Classification]) -> RetryState {
        RetryState {
            attempt,
            bound: 2,
            history: history
                .iter()
                .map(|c| {
                    ValidationOutcome::from_violations(match c {
                        Classification::Ok => Vec::new(),
                        Classification::Warning => vec![Violation::warning("w", "soft")],
                        Classification::CriticalFailure => vec![Violation::critical("c", "hard")],
                    })
                })
                .collect(),
        }
    }

    #[test]
    fn test_counts_sum_to_entity_count() {
        let c = candidate(
            &[
                (MobilityClass::Pedestrian, 1.0 / 3.0),
                (MobilityClass::Cyclist, 1.0 / 3.0),
                (MobilityClass::Car, 1.0 / 3.0),
            ],
            100,
        );
        let counts = allocate_counts(&c);
        assert_eq!(counts.values().sum::<u32>(), 100);
        assert_eq!(counts[&MobilityClass::Stationary], 0);
        assert_eq!(counts[&MobilityClass::Pedestrian], 34);
        assert_eq!(counts[&MobilityClass::Cyclist], 33);
    }

    #[test]
    fn test_counts_follow_fractions() {
        let c = candidate(
            &[
                (MobilityClass::Pedestrian, 0.6),
                (MobilityClass::Car, 0.3),
                (MobilityClass::Cyclist, 0.1),
            ],
            50,
        );
        let counts = allocate_counts(&c);
        assert_eq!(counts[&MobilityClass::Pedestrian], 30);
        assert_eq!(counts[&MobilityClass::Car], 15);
        assert_eq!(counts[&MobilityClass::Cyclist], 5);
    }

    #[test]
    fn test_counts_for_unnormalised_distribution() {
        let c = candidate(&[(MobilityClass::Pedestrian, 0.8), (MobilityClass::Car, 0.5)], 13);
        let counts = allocate_counts(&c);
        assert_eq!(counts.values().sum::<u32>(), 13);
        assert_eq!(counts[&MobilityClass::Stationary], 0);
        assert_eq!(counts[&MobilityClass::Cyclist], 0);
    }

    #[test]
    fn test_counts_for_empty_distribution() {
        let c = candidate(&[], 10);
        assert!(allocate_counts(&c).values().all(|&n| n == 0));
    }

    #[test]
    fn test_format_block_and_metadata() {
        let c = candidate(&[(MobilityClass::Pedestrian, 0.6), (MobilityClass::Car, 0.4)], 100);
        let source = intent(ScenarioType::Urban, None);
        let outcome = ValidationOutcome::from_violations(Vec::new());
        let formatter = Formatter::new(OutputConfig::default());

        let result = formatter.format(
            &c,
            &retry(0, &[Classification::Ok]),
            &source,
            TerminalState::Accepted,
            &outcome,
            Duration::from_millis(1500),
        );

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.retry_count, 0);
        assert!(result.warnings.is_empty());
        assert_eq!(result.intent, source);

        let params = &result.params.ue_tracks_generation.params;
        assert_eq!(params.simulation_duration, 3600);
        assert_eq!(params.num_ticks, 50);
        assert_eq!(params.ue_class_distribution.len(), 4);
        assert_eq!(params.ue_class_distribution["pedestrian"].count, 60);
        assert_eq!(params.ue_class_distribution["stationary"].velocity, 0.0);
        assert_eq!(params.gauss_markov_params.rng_seed, 42);
        assert_eq!(params.lat_lon_boundaries.min_lat, c.bounds.min_lat);

        assert_eq!(result.metadata.distribution_provenance, Provenance::Predicted);
        assert_eq!(result.metadata.elapsed_ms, 1500);
        assert_eq!(result.metadata.outcome_history, vec![Classification::Ok]);
        assert!(Uuid::parse_str(&result.metadata.run_id).is_ok());
    }

    #[test]
    fn test_warnings_ordered_critical_first() {
        let c = candidate(&[(MobilityClass::Car, 1.0)], 10);
        let outcome = ValidationOutcome::from_violations(vec![
            Violation::warning("scenario.urban_no_pedestrian", "no pedestrians"),
            Violation::critical("distribution.sum", "bad sum"),
        ]);

        let result = Formatter::new(OutputConfig::default()).format(
            &c,
            &retry(2, &[Classification::CriticalFailure; 3]),
            &intent(ScenarioType::Urban, None),
            TerminalState::FailedExhausted,
            &outcome,
            Duration::ZERO,
        );

        assert_eq!(result.status, RunStatus::SuccessWithWarnings);
        assert_eq!(result.retry_count, 2);
        assert_eq!(result.warnings[0].rule, "distribution.sum");
        assert_eq!(result.warnings[1].rule, "scenario.urban_no_pedestrian");
    }

    #[test]
    fn test_parsed_provenance_reaches_output() {
        let parsed = Distribution::parsed([(MobilityClass::Pedestrian, 1.0)]);
        let source = intent(ScenarioType::Urban, Some(parsed));
        let c = Candidate::merge(
            &source,
            tokyo_bounds(),
            proposal(&[(MobilityClass::Car, 1.0)]),
            MergeDefaults {
                entity_count: 10,
                num_ticks: 10,
            },
        );

        let result = Formatter::new(OutputConfig::default()).format(
            &c,
            &retry(0, &[Classification::Ok]),
            &source,
            TerminalState::Accepted,
            &ValidationOutcome::from_violations(Vec::new()),
            Duration::ZERO,
        );

        assert_eq!(result.metadata.distribution_provenance, Provenance::Parsed);
        let json = result.to_json();
        assert_eq!(json["intent"]["distribution"]["provenance"], "parsed");
        assert_eq!(json["status"], "success");
    }
}
