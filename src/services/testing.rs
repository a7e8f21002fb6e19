//! Deterministic test doubles for the service ports.

use super::{
    AdvisoryService, GeocodingService, IntentService, ParameterInferenceService, Services,
    bounds_around,
};
use crate::models::{
    Candidate, Distribution, Intent, LocationBounds, MobgenError, MobilityClass, MobilityModel,
    ParameterProposal, PartialCandidate, Result, ScenarioType, VelocityProfile, Violation,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) fn intent(scenario: ScenarioType, distribution: Option<Distribution>) -> Intent {
    Intent {
        scenario,
        location: "Tokyo".to_string(),
        entity_count: Some(100),
        tick_count: None,
        distribution,
        raw_text: format!("100 UEs in {scenario} Tokyo"),
    }
}

pub(crate) fn realistic_velocities() -> BTreeMap<MobilityClass, VelocityProfile> {
    [
        (MobilityClass::Stationary, 0.0, 0.0),
        (MobilityClass::Pedestrian, 1.3, 0.4),
        (MobilityClass::Cyclist, 5.0, 0.8),
        (MobilityClass::Car, 10.0, 3.0),
    ]
    .into_iter()
    .map(|(class, velocity, velocity_variance)| {
        (
            class,
            VelocityProfile {
                velocity,
                velocity_variance,
            },
        )
    })
    .collect()
}

pub(crate) fn proposal(fractions: &[(MobilityClass, f64)]) -> ParameterProposal {
    ParameterProposal {
        entity_count: None,
        model: MobilityModel {
            alpha: 0.42,
            variance: 0.68,
        },
        distribution: Distribution::predicted(fractions.iter().copied()),
        velocities: realistic_velocities(),
    }
}

pub(crate) fn tokyo_bounds() -> LocationBounds {
    bounds_around(35.68, 139.69, 5.0, "urban")
}

/// Intent service returning a fixed intent, or failing.
pub(crate) struct StubIntent {
    intent: Option<Intent>,
    calls: AtomicUsize,
}

impl StubIntent {
    pub(crate) fn returning(intent: Intent) -> Self {
        Self {
            intent: Some(intent),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            intent: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntentService for StubIntent {
    async fn extract(&self, text: &str) -> Result<Intent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.intent {
            Some(intent) => Ok(Intent {
                raw_text: text.to_string(),
                ..intent.clone()
            }),
            None => Err(MobgenError::ParseError("unparseable reply".to_string())),
        }
    }
}

/// Geocoder returning a box around a fixed point after an optional delay.
pub(crate) struct StubGeocoder {
    latency: Duration,
    fail: bool,
    calls: AtomicUsize,
}

impl Default for StubGeocoder {
    fn default() -> Self {
        Self {
            latency: Duration::ZERO,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }
}

impl StubGeocoder {
    pub(crate) fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeocodingService for StubGeocoder {
    async fn resolve(&self, location: &str) -> Result<LocationBounds> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.fail {
            return Err(MobgenError::Geocoding(format!("no match for '{location}'")));
        }
        Ok(tokyo_bounds())
    }
}

/// Parameter service returning a fixed proposal after an optional delay.
pub(crate) struct StubParameters {
    proposal: Option<ParameterProposal>,
    latency: Duration,
    completed: Arc<AtomicUsize>,
}

impl StubParameters {
    pub(crate) fn returning(proposal: ParameterProposal) -> Self {
        Self {
            proposal: Some(proposal),
            latency: Duration::ZERO,
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            proposal: None,
            latency: Duration::ZERO,
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Counter of proposals that ran to completion (not cancelled).
    pub(crate) fn completed(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.completed)
    }
}

#[async_trait]
impl ParameterInferenceService for StubParameters {
    async fn propose(&self, _intent: &Intent) -> Result<ParameterProposal> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.proposal
            .clone()
            .ok_or_else(|| MobgenError::ParseError("no proposal".to_string()))
    }
}

/// Advisory service replaying a script of corrections.
///
/// Once the script runs out it keeps returning empty corrections.
pub(crate) struct ScriptedAdvisory {
    script: Mutex<VecDeque<Result<PartialCandidate>>>,
    calls: AtomicU32,
    seen_violations: Mutex<Vec<Vec<Violation>>>,
}

impl ScriptedAdvisory {
    pub(crate) fn new(script: Vec<Result<PartialCandidate>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
            seen_violations: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn silent() -> Self {
        Self::new(Vec::new())
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn seen_violations(&self) -> Vec<Vec<Violation>> {
        self.seen_violations.lock().unwrap().clone()
    }
}

#[async_trait]
impl AdvisoryService for ScriptedAdvisory {
    async fn suggest(
        &self,
        _candidate: &Candidate,
        violations: &[Violation],
    ) -> Result<PartialCandidate> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_violations
            .lock()
            .unwrap()
            .push(violations.to_vec());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(PartialCandidate::default()))
    }
}

/// Bundle doubles into a `Services` value, keeping typed handles.
pub(crate) struct Doubles {
    pub intent: Arc<StubIntent>,
    pub geocoding: Arc<StubGeocoder>,
    pub parameters: Arc<StubParameters>,
    pub advisory: Arc<ScriptedAdvisory>,
}

impl Doubles {
    pub(crate) fn new(
        intent: StubIntent,
        geocoding: StubGeocoder,
        parameters: StubParameters,
        advisory: ScriptedAdvisory,
    ) -> Self {
        Self {
            intent: Arc::new(intent),
            geocoding: Arc::new(geocoding),
            parameters: Arc::new(parameters),
            advisory: Arc::new(advisory),
        }
    }

    pub(crate) fn services(&self) -> Services {
        Services {
            intent: self.intent.clone(),
            geocoding: self.geocoding.clone(),
            parameters: self.parameters.clone(),
            advisory: self.advisory.clone(),
        }
    }
}
