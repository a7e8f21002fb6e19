//! External collaborators, expressed as narrow async ports.
//!
//! The coordinator only ever talks to these traits. Production adapters
//! wrap the chat-completion client and a Nominatim-style geocoder; tests
//! substitute deterministic doubles.
//!
//! Epistemic foundation:
//! - K_i: Every port is object safe and shared as `Arc<dyn ...>`
//! - B_i: Every call may fail or return nonsense → Result
//! - I^R: Endpoints and models come from config

mod cache;
mod geocoding;
mod llm;
mod prompts;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::*;
pub use geocoding::*;
pub use llm::*;

use crate::client::LLMClient;
use crate::models::{
    Candidate, Config, Intent, LocationBounds, ParameterProposal, PartialCandidate, Result,
    Violation,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Turns query text into a structured intent.
#[async_trait]
pub trait IntentService: Send + Sync {
    async fn extract(&self, text: &str) -> Result<Intent>;
}

/// Resolves a free-text location to a bounding box.
#[async_trait]
pub trait GeocodingService: Send + Sync {
    async fn resolve(&self, location: &str) -> Result<LocationBounds>;
}

/// Proposes mobility parameters for an intent.
#[async_trait]
pub trait ParameterInferenceService: Send + Sync {
    async fn propose(&self, intent: &Intent) -> Result<ParameterProposal>;
}

/// Suggests corrections for a candidate that failed validation.
#[async_trait]
pub trait AdvisoryService: Send + Sync {
    async fn suggest(
        &self,
        candidate: &Candidate,
        violations: &[Violation],
    ) -> Result<PartialCandidate>;
}

/// The four ports a coordinator needs.
#[derive(Clone)]
pub struct Services {
    pub intent: Arc<dyn IntentService>,
    pub geocoding: Arc<dyn GeocodingService>,
    pub parameters: Arc<dyn ParameterInferenceService>,
    pub advisory: Arc<dyn AdvisoryService>,
}

impl Services {
    /// Wire the production adapters.
    ///
    /// All inference ports share one client. Geocoding is wrapped in the
    /// TTL cache when enabled.
    pub fn from_config(config: &Config, client: Arc<LLMClient>) -> Result<Self> {
        let model = config.llm.model.clone();
        let geocoder = NominatimGeocoder::new(&config.geocoding)?;

        let geocoding: Arc<dyn GeocodingService> = if config.geocoding.cache_enabled {
            Arc::new(CachedGeocoder::new(geocoder, config.geocoding.cache_ttl()))
        } else {
            Arc::new(geocoder)
        };

        Ok(Self {
            intent: Arc::new(LlmIntentService::new(Arc::clone(&client), model.clone())),
            geocoding,
            parameters: Arc::new(LlmParameterService::new(Arc::clone(&client), model.clone())),
            advisory: Arc::new(LlmAdvisoryService::new(client, model)),
        })
    }
}
