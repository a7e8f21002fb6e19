//! Candidate parameter sets and the inputs they are merged from.
//!
//! A `Candidate` is never modified in place. The first one is built by
//! `Candidate::merge` from the two resolution branches; every correction
//! produces a new value through `Candidate::apply`.

use crate::models::{Distribution, Intent, MobilityClass, Provenance, ScenarioType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Geographic bounding box from the geocoding lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationBounds {
    /// (latitude, longitude)
    pub center: (f64, f64),
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
    /// Coarse area classification inferred by the geocoder
    pub area_type: String,
}

/// Velocity coefficients for one mobility class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityProfile {
    /// Mean velocity in m/s
    pub velocity: f64,
    pub velocity_variance: f64,
}

/// Gauss-Markov / Levy walk coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MobilityModel {
    /// 0 = Brownian, 1 = ballistic
    pub alpha: f64,
    /// Step size variance
    pub variance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickConfig {
    pub num_ticks: u32,
}

/// Output of the parameter inference branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterProposal {
    /// Suggested entity count when the query gave none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_count: Option<u32>,
    pub model: MobilityModel,
    /// Always `Provenance::Predicted`
    pub distribution: Distribution,
    pub velocities: BTreeMap<MobilityClass, VelocityProfile>,
}

/// Fallbacks used when neither branch supplies a value.
#[derive(Debug, Clone, Copy)]
pub struct MergeDefaults {
    pub entity_count: u32,
    pub num_ticks: u32,
}

/// A full parameter set awaiting validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Scenario from the intent; scenario rules are checked against it
    pub scenario: ScenarioType,
    pub entity_count: u32,
    pub distribution: Distribution,
    pub bounds: LocationBounds,
    pub ticks: TickConfig,
    pub model: MobilityModel,
    pub velocities: BTreeMap<MobilityClass, VelocityProfile>,
    /// 0 for the merged candidate, +1 per applied correction
    pub revision: u32,
}

impl Candidate {
    /// Join the two resolution results with the intent.
    ///
    /// Explicit values from the intent always win over inferred ones, so a
    /// parsed distribution keeps its `Parsed` tag.
    pub fn merge(
        intent: &Intent,
        bounds: LocationBounds,
        proposal: ParameterProposal,
        defaults: MergeDefaults,
    ) -> Self {
        let distribution = match &intent.distribution {
            Some(parsed) => parsed.clone(),
            None => Distribution::new(proposal.distribution.fractions, Provenance::Predicted),
        };

        Self {
            scenario: intent.scenario,
            entity_count: intent
                .entity_count
                .or(proposal.entity_count)
                .unwrap_or(defaults.entity_count),
            distribution,
            bounds,
            ticks: TickConfig {
                num_ticks: intent.tick_count.unwrap_or(defaults.num_ticks),
            },
            model: proposal.model,
            velocities: proposal.velocities,
            revision: 0,
        }
    }

    /// Produce the next candidate with the suggested fields replaced.
    ///
    /// Fields the suggestion leaves out are carried over. Velocity profiles
    /// merge per class. The distribution keeps its provenance tag.
    pub fn apply(&self, correction: &PartialCandidate) -> Self {
        let mut velocities = self.velocities.clone();
        for (class, profile) in &correction.velocities {
            velocities.insert(*class, *profile);
        }

        Self {
            scenario: self.scenario,
            entity_count: correction.entity_count.unwrap_or(self.entity_count),
            distribution: match &correction.distribution {
                Some(fractions) => self.distribution.with_fractions(fractions.clone()),
                None => self.distribution.clone(),
            },
            bounds: correction
                .bounds
                .clone()
                .unwrap_or_else(|| self.bounds.clone()),
            ticks: TickConfig {
                num_ticks: correction.num_ticks.unwrap_or(self.ticks.num_ticks),
            },
            model: MobilityModel {
                alpha: correction.alpha.unwrap_or(self.model.alpha),
                variance: correction.variance.unwrap_or(self.model.variance),
            },
            velocities,
            revision: self.revision + 1,
        }
    }
}

/// Corrective suggestion from the advisory service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialCandidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_count: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<BTreeMap<MobilityClass, f64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<LocationBounds>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_ticks: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variance: Option<f64>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub velocities: BTreeMap<MobilityClass, VelocityProfile>,
}

impl PartialCandidate {
    /// True when the suggestion would not change anything.
    pub fn is_empty(&self) -> bool {
        self.entity_count.is_none()
            && self.distribution.is_none()
            && self.bounds.is_none()
            && self.num_ticks.is_none()
            && self.alpha.is_none()
            && self.variance.is_none()
            && self.velocities.is_empty()
    }
}
