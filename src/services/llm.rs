//! LLM-backed implementations of the inference ports.

use super::prompts::{
    ADVISORY_SYSTEM_PROMPT, INTENT_SYSTEM_PROMPT, PARAMETER_SYSTEM_PROMPT, advisory_user_prompt,
    intent_user_prompt, parameter_user_prompt,
};
use super::{AdvisoryService, IntentService, ParameterInferenceService};
use crate::client::LLMClient;
use crate::models::{
    Candidate, Distribution, Intent, MobgenError, MobilityClass, MobilityModel, ModelSpec,
    ParameterProposal, PartialCandidate, Result, ScenarioType, VelocityProfile, Violation,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Reply shape requested from the intent prompt.
#[derive(Debug, Deserialize)]
struct IntentReply {
    scenario_type: ScenarioType,
    location: String,
    #[serde(default)]
    num_ues: Option<u32>,
    #[serde(default)]
    num_ticks: Option<u32>,
    #[serde(default)]
    ue_distribution: Option<DistributionReply>,
}

#[derive(Debug, Deserialize)]
struct DistributionReply {
    distribution: BTreeMap<MobilityClass, f64>,
}

impl IntentReply {
    fn into_intent(self, raw_text: &str) -> Result<Intent> {
        let location = self.location.trim().to_string();
        if location.is_empty() {
            return Err(MobgenError::ParseError(
                "intent reply has an empty location".to_string(),
            ));
        }

        Ok(Intent {
            scenario: self.scenario_type,
            location,
            entity_count: self.num_ues,
            tick_count: self.num_ticks,
            distribution: self
                .ue_distribution
                .filter(|d| !d.distribution.is_empty())
                .map(|d| Distribution::parsed(d.distribution)),
            raw_text: raw_text.to_string(),
        })
    }
}

/// Reply shape requested from the parameter prompt.
#[derive(Debug, Deserialize)]
struct ProposalReply {
    #[serde(default)]
    num_ues: Option<u32>,
    alpha: f64,
    variance: f64,
    ue_class_distribution: BTreeMap<MobilityClass, f64>,
    #[serde(default)]
    velocity_adjustments: BTreeMap<MobilityClass, VelocityProfile>,
}

impl From<ProposalReply> for ParameterProposal {
    fn from(reply: ProposalReply) -> Self {
        Self {
            entity_count: reply.num_ues,
            model: MobilityModel {
                alpha: reply.alpha,
                variance: reply.variance,
            },
            distribution: Distribution::predicted(reply.ue_class_distribution),
            velocities: reply.velocity_adjustments,
        }
    }
}

/// Intent extraction through a chat completion.
pub struct LlmIntentService {
    client: Arc<LLMClient>,
    model: ModelSpec,
}

impl LlmIntentService {
    pub fn new(client: Arc<LLMClient>, model: ModelSpec) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl IntentService for LlmIntentService {
    async fn extract(&self, text: &str) -> Result<Intent> {
        let reply: IntentReply = self
            .client
            .complete_json(&self.model, INTENT_SYSTEM_PROMPT, &intent_user_prompt(text))
            .await?;
        reply.into_intent(text)
    }
}

/// Parameter inference through a chat completion.
pub struct LlmParameterService {
    client: Arc<LLMClient>,
    model: ModelSpec,
}

impl LlmParameterService {
    pub fn new(client: Arc<LLMClient>, model: ModelSpec) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl ParameterInferenceService for LlmParameterService {
    async fn propose(&self, intent: &Intent) -> Result<ParameterProposal> {
        let reply: ProposalReply = self
            .client
            .complete_json(
                &self.model,
                PARAMETER_SYSTEM_PROMPT,
                &parameter_user_prompt(intent),
            )
            .await?;
        Ok(reply.into())
    }
}

/// Correction suggestions through a chat completion.
pub struct LlmAdvisoryService {
    client: Arc<LLMClient>,
    model: ModelSpec,
}

impl LlmAdvisoryService {
    pub fn new(client: Arc<LLMClient>, model: ModelSpec) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl AdvisoryService for LlmAdvisoryService {
    async fn suggest(
        &self,
        candidate: &Candidate,
        violations: &[Violation],
    ) -> Result<PartialCandidate> {
        let candidate_json = serde_json::to_string_pretty(candidate)
            .map_err(|e| MobgenError::Internal(format!("Failed to serialize candidate: {e}")))?;
        let listed: Vec<String> = violations.iter().map(ToString::to_string).collect();

        let correction: PartialCandidate = self
            .client
            .complete_json(
                &self.model,
                ADVISORY_SYSTEM_PROMPT,
                &advisory_user_prompt(&candidate_json, &listed),
            )
            .await?;

        debug!(
            revision = candidate.revision,
            empty = correction.is_empty(),
            "Advisory reply decoded"
        );
        Ok(correction)
    }
}
