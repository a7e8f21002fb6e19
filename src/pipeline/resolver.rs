//! Concurrent resolution of location and parameters.
//!
//! Epistemic foundation:
//! - K_i: Location and parameters are independent, so both branches start together
//! - B_i: Each branch may fail or time out → Result
//! - I^B: First failure wins; the other branch is dropped, which cancels it

use crate::models::{Branch, Intent, LocationBounds, ParameterProposal, ResolutionError};
use crate::services::{GeocodingService, ParameterInferenceService};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

pub struct Resolver {
    geocoding: Arc<dyn GeocodingService>,
    parameters: Arc<dyn ParameterInferenceService>,
    timeout: Duration,
}

impl Resolver {
    pub fn new(
        geocoding: Arc<dyn GeocodingService>,
        parameters: Arc<dyn ParameterInferenceService>,
        timeout: Duration,
    ) -> Self {
        Self {
            geocoding,
            parameters,
            timeout,
        }
    }

    pub async fn resolve(
        &self,
        intent: &Intent,
    ) -> Result<(LocationBounds, ParameterProposal), ResolutionError> {
        let start = Instant::now();

        let location = bounded(
            Branch::Location,
            self.timeout,
            self.geocoding.resolve(&intent.location),
        );
        let parameters = bounded(
            Branch::Parameters,
            self.timeout,
            self.parameters.propose(intent),
        );

        let joined = tokio::try_join!(location, parameters);

        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            ok = joined.is_ok(),
            "Resolution fan-in"
        );
        joined
    }
}

/// Run one branch under the timeout, tagging failures with the branch.
async fn bounded<T>(
    branch: Branch,
    timeout: Duration,
    call: impl Future<Output = crate::models::Result<T>>,
) -> Result<T, ResolutionError> {
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| ResolutionError::Timeout {
            branch,
            after: timeout,
        })?
        .map_err(|e| ResolutionError::BranchFailed {
            branch,
            source: Box::new(e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MobilityClass, ScenarioType};
    use crate::services::testing::{StubGeocoder, StubParameters, intent, proposal};
    use std::sync::atomic::Ordering;

    fn car_only() -> ParameterProposal {
        proposal(&[(MobilityClass::Car, 1.0)])
    }

    #[tokio::test(start_paused = true)]
    async fn test_branches_run_concurrently() {
        let resolver = Resolver::new(
            Arc::new(StubGeocoder::with_latency(Duration::from_millis(300))),
            Arc::new(StubParameters::returning(car_only()).with_latency(Duration::from_millis(500))),
            Duration::from_secs(30),
        );

        let start = tokio::time::Instant::now();
        let (bounds, proposal) = resolver
            .resolve(&intent(ScenarioType::Urban, None))
            .await
            .unwrap();
        let elapsed = start.elapsed();

        // max(300, 500), not the 800ms sum
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_millis(600));
        assert_eq!(bounds.area_type, "urban");
        assert_eq!(proposal.distribution.fraction(MobilityClass::Car), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_branch_cancels_the_other() {
        let parameters = StubParameters::returning(car_only()).with_latency(Duration::from_secs(10));
        let completed = parameters.completed();
        let resolver = Resolver::new(
            Arc::new(StubGeocoder::failing()),
            Arc::new(parameters),
            Duration::from_secs(30),
        );

        let start = tokio::time::Instant::now();
        let err = resolver
            .resolve(&intent(ScenarioType::Urban, None))
            .await
            .unwrap_err();

        assert_eq!(err.branch(), Branch::Location);
        assert!(matches!(err, ResolutionError::BranchFailed { .. }));
        assert!(start.elapsed() < Duration::from_secs(1));

        // the slow branch was dropped, so it never completes
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_branch_timeout_fails_resolution() {
        let resolver = Resolver::new(
            Arc::new(StubGeocoder::default()),
            Arc::new(StubParameters::returning(car_only()).with_latency(Duration::from_secs(45))),
            Duration::from_secs(30),
        );

        let err = resolver
            .resolve(&intent(ScenarioType::Urban, None))
            .await
            .unwrap_err();

        match err {
            ResolutionError::Timeout { branch, after } => {
                assert_eq!(branch, Branch::Parameters);
                assert_eq!(after, Duration::from_secs(30));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_parameter_failure_is_tagged() {
        let resolver = Resolver::new(
            Arc::new(StubGeocoder::default()),
            Arc::new(StubParameters::failing()),
            Duration::from_secs(30),
        );
        let err = resolver
            .resolve(&intent(ScenarioType::Highway, None))
            .await
            .unwrap_err();
        assert_eq!(err.branch(), Branch::Parameters);
    }
}
