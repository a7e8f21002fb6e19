//! End-to-end run: extract, resolve, merge, settle, format.

use crate::models::{
    Candidate, GenerationResult, MergeDefaults, OutputConfig, Result, WorkflowConfig,
};
use crate::pipeline::{Formatter, IntentExtractor, Resolver, RetryController, Validator};
use crate::services::Services;
use std::time::Instant;
use tracing::{info, instrument};

/// Sequences one run per call. Holds no per-run state, so a single
/// coordinator can serve concurrent `generate` calls.
pub struct Coordinator {
    extractor: IntentExtractor,
    resolver: Resolver,
    controller: RetryController,
    formatter: Formatter,
    defaults: MergeDefaults,
}

impl Coordinator {
    pub fn new(services: Services, workflow: &WorkflowConfig, output: OutputConfig) -> Self {
        let timeout = workflow.branch_timeout();
        Self {
            extractor: IntentExtractor::new(services.intent, timeout),
            resolver: Resolver::new(services.geocoding, services.parameters, timeout),
            controller: RetryController::new(
                Validator::new(workflow.tolerance_epsilon),
                services.advisory,
                workflow.retry_bound,
                workflow.retry_on_warnings,
                timeout,
            ),
            formatter: Formatter::new(output),
            defaults: MergeDefaults {
                entity_count: workflow.default_entity_count,
                num_ticks: workflow.default_num_ticks,
            },
        }
    }

    /// Turn a scenario query into trace-generation parameters.
    ///
    /// Fails only on extraction or resolution errors. Validation problems
    /// always come back as warnings on a full result.
    #[instrument(skip(self), fields(query_len = query.len()))]
    pub async fn generate(&self, query: &str) -> Result<GenerationResult> {
        let start = Instant::now();

        let intent = self.extractor.extract(query).await?;
        info!(scenario = %intent.scenario, location = %intent.location, "Intent extracted");

        let (bounds, proposal) = self.resolver.resolve(&intent).await?;
        info!(area_type = %bounds.area_type, "Resolution complete");

        let candidate = Candidate::merge(&intent, bounds, proposal, self.defaults);
        let settled = self.controller.run(candidate).await;

        let result = self.formatter.format(
            &settled.candidate,
            &settled.retry,
            &intent,
            settled.terminal,
            &settled.outcome,
            start.elapsed(),
        );

        info!(
            status = %result.status,
            terminal = ?settled.terminal,
            retry_count = result.retry_count,
            warnings = result.warnings.len(),
            elapsed_ms = result.metadata.elapsed_ms,
            "Run complete"
        );
        Ok(result)
    }
}
