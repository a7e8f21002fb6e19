//! Intent and distribution types.
//!
//! An `Intent` is what the extraction step understood from the query. It is
//! immutable once produced and is copied verbatim into the final result.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scenario category of the requested simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioType {
    Urban,
    Suburban,
    Rural,
    Highway,
    Mixed,
}

impl ScenarioType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioType::Urban => "urban",
            ScenarioType::Suburban => "suburban",
            ScenarioType::Rural => "rural",
            ScenarioType::Highway => "highway",
            ScenarioType::Mixed => "mixed",
        }
    }
}

impl std::fmt::Display for ScenarioType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mobility class of a simulated entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MobilityClass {
    Stationary,
    Pedestrian,
    Cyclist,
    Car,
}

impl MobilityClass {
    /// All classes in output order.
    pub const ALL: [MobilityClass; 4] = [
        MobilityClass::Stationary,
        MobilityClass::Pedestrian,
        MobilityClass::Cyclist,
        MobilityClass::Car,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MobilityClass::Stationary => "stationary",
            MobilityClass::Pedestrian => "pedestrian",
            MobilityClass::Cyclist => "cyclist",
            MobilityClass::Car => "car",
        }
    }

    /// Admissible velocity range in m/s, inclusive.
    pub fn velocity_range(&self) -> (f64, f64) {
        match self {
            MobilityClass::Stationary => (0.0, 0.0),
            MobilityClass::Pedestrian => (0.5, 2.0),
            MobilityClass::Cyclist => (3.0, 8.0),
            MobilityClass::Car => (5.0, 30.0),
        }
    }
}

impl std::fmt::Display for MobilityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a distribution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Stated explicitly in the query
    Parsed,
    /// Synthesized by the parameter inference step
    Predicted,
}

/// Fractions per mobility class, tagged with provenance.
///
/// Classes absent from `fractions` count as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub fractions: BTreeMap<MobilityClass, f64>,
    pub provenance: Provenance,
}

impl Distribution {
    pub fn new(fractions: BTreeMap<MobilityClass, f64>, provenance: Provenance) -> Self {
        Self {
            fractions,
            provenance,
        }
    }

    pub fn parsed(fractions: impl IntoIterator<Item = (MobilityClass, f64)>) -> Self {
        Self::new(fractions.into_iter().collect(), Provenance::Parsed)
    }

    pub fn predicted(fractions: impl IntoIterator<Item = (MobilityClass, f64)>) -> Self {
        Self::new(fractions.into_iter().collect(), Provenance::Predicted)
    }

    /// Fraction for a class, zero when absent.
    pub fn fraction(&self, class: MobilityClass) -> f64 {
        self.fractions.get(&class).copied().unwrap_or(0.0)
    }

    pub fn sum(&self) -> f64 {
        self.fractions.values().sum()
    }

    /// Replace the fractions while keeping the provenance tag.
    pub fn with_fractions(&self, fractions: BTreeMap<MobilityClass, f64>) -> Self {
        Self::new(fractions, self.provenance)
    }
}

/// Structured reading of a scenario query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub scenario: ScenarioType,

    /// Free-text location reference, passed to geocoding as-is
    pub location: String,

    /// Entity count, if the query stated one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_count: Option<u32>,

    /// Tick count, if the query stated one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick_count: Option<u32>,

    /// Distribution stated in the query; always `Provenance::Parsed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<Distribution>,

    /// Original query text
    pub raw_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribution_serializes_lowercase_keys() {
        let dist = Distribution::parsed([
            (MobilityClass::Pedestrian, 0.6),
            (MobilityClass::Car, 0.4),
        ]);
        let json = serde_json::to_value(&dist).unwrap();
        assert_eq!(json["fractions"]["pedestrian"], 0.6);
        assert_eq!(json["provenance"], "parsed");
    }

    #[test]
    fn test_with_fractions_keeps_provenance() {
        let dist = Distribution::parsed([(MobilityClass::Car, 1.3)]);
        let fixed = dist.with_fractions([(MobilityClass::Car, 1.0)].into_iter().collect());
        assert_eq!(fixed.provenance, Provenance::Parsed);
        assert_eq!(fixed.fraction(MobilityClass::Car), 1.0);
        assert_eq!(fixed.fraction(MobilityClass::Cyclist), 0.0);
    }
}
