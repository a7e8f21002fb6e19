//! Result types: the only artifact mobgen serializes for downstream use.

use crate::models::{Classification, Intent, LocationBounds, MobilityClass, Provenance, Violation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Caller-visible status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    SuccessWithWarnings,
    /// Fatal error, no result body. Only used in batch records.
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::SuccessWithWarnings => write!(f, "success_with_warnings"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Terminal state the correction loop stopped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Accepted,
    AcceptedWithWarnings,
    FailedExhausted,
}

impl TerminalState {
    pub fn status(&self) -> RunStatus {
        match self {
            TerminalState::Accepted => RunStatus::Success,
            TerminalState::AcceptedWithWarnings | TerminalState::FailedExhausted => {
                RunStatus::SuccessWithWarnings
            }
        }
    }
}

/// Final output of one coordinator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub status: RunStatus,
    pub retry_count: u32,
    /// Unresolved and soft violations of the final candidate, in rule order
    pub warnings: Vec<Violation>,
    /// The originating intent, provenance tags included
    pub intent: Intent,
    /// Parameter block consumed by the trace-generation engine
    pub params: TraceGenerationParams,
    pub metadata: RunMetadata,
}

impl GenerationResult {
    /// Render as a tree of primitive values.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Provenance and retry metadata attached by the formatter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub terminal_state: TerminalState,
    pub retry_count: u32,
    pub retry_bound: u32,
    /// Classification of every validation attempt, in order
    pub outcome_history: Vec<Classification>,
    pub distribution_provenance: Provenance,
    /// Class shares of the settled candidate, before count allocation
    pub class_fractions: BTreeMap<MobilityClass, f64>,
    pub location: LocationBounds,
    pub elapsed_ms: u64,
}

/// Top-level parameter document for the trace engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceGenerationParams {
    pub ue_tracks_generation: UeTracksGeneration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UeTracksGeneration {
    pub params: UeTracksParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UeTracksParams {
    pub simulation_duration: u64,
    pub simulation_time_interval_seconds: f64,
    pub num_ticks: u32,
    pub num_batches: u32,
    /// Keyed by lowercase class name, every class present
    pub ue_class_distribution: BTreeMap<String, ClassParams>,
    pub lat_lon_boundaries: LatLonBoundaries,
    pub gauss_markov_params: GaussMarkovParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassParams {
    pub count: u32,
    pub velocity: f64,
    pub velocity_variance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLonBoundaries {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussMarkovParams {
    pub alpha: f64,
    pub variance: f64,
    pub rng_seed: u64,
    pub lon_x_dims: u32,
    pub lon_y_dims: u32,
}

/// Statistics for a batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_queries: usize,
    pub total_success: usize,
    pub total_with_warnings: usize,
    pub total_failed: usize,
    /// Sum of retry counts over all non-failed runs
    pub total_retries: u64,
    pub runtime_secs: f64,
    /// Completed runs per hour
    pub throughput_per_hour: f64,
    /// Share of queries that produced a result body (0.0 - 1.0)
    pub completion_rate: f64,
}

impl BatchStats {
    /// Record one run's status.
    pub fn record(&mut self, status: RunStatus, retry_count: u32) {
        match status {
            RunStatus::Success => self.total_success += 1,
            RunStatus::SuccessWithWarnings => self.total_with_warnings += 1,
            RunStatus::Failed => self.total_failed += 1,
        }
        self.total_retries += u64::from(retry_count);
    }

    /// Calculate derived stats.
    pub fn finalize(&mut self) {
        let completed = self.total_success + self.total_with_warnings;
        if self.total_queries > 0 {
            self.completion_rate = completed as f64 / self.total_queries as f64;
        }
        if self.runtime_secs > 0.0 {
            self.throughput_per_hour = completed as f64 / self.runtime_secs * 3600.0;
        }
    }
}
