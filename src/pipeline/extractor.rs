//! Intent extraction step.
//!
//! Epistemic foundation:
//! - B_i: The intent service understands the query (might not) → Result
//! - I^B: Service latency unknowable → bounded by the branch timeout
//!
//! Any failure here ends the run: the query itself is unusable, so there is
//! nothing the correction loop could fix.

use crate::models::{ExtractionError, Intent, MobgenError};
use crate::services::IntentService;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct IntentExtractor {
    service: Arc<dyn IntentService>,
    timeout: Duration,
}

impl IntentExtractor {
    pub fn new(service: Arc<dyn IntentService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    pub async fn extract(&self, text: &str) -> Result<Intent, ExtractionError> {
        if text.trim().is_empty() {
            return Err(ExtractionError::EmptyQuery);
        }

        let intent = tokio::time::timeout(self.timeout, self.service.extract(text))
            .await
            .map_err(|_| ExtractionError::Timeout(self.timeout))?
            .map_err(|e| match e {
                MobgenError::ParseError(msg) => ExtractionError::Malformed(msg),
                other => ExtractionError::Service(Box::new(other)),
            })?;

        if intent.location.trim().is_empty() {
            return Err(ExtractionError::Malformed(
                "intent has no location".to_string(),
            ));
        }

        debug!(
            scenario = %intent.scenario,
            location = %intent.location,
            explicit_distribution = intent.distribution.is_some(),
            "Intent extracted"
        );
        Ok(intent)
    }
}
