//! Validation and correction loop.
//!
//! A five-state machine. `next_state` is the whole routing table and has no
//! side effects; `RetryController::run` drives it, calling the advisory
//! service while in `Suggesting`.
//!
//! Epistemic foundation:
//! - K_i: At most `bound + 1` validations, then a terminal state
//! - B_i: A suggestion fixes the violations (might not) → revalidate
//! - I^B: Advisory outage → stop with the best candidate so far

use crate::models::{
    Candidate, Classification, MobgenError, TerminalState, ValidationOutcome, Violation,
};
use crate::pipeline::Validator;
use crate::services::AdvisoryService;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Validating,
    Suggesting,
    Accepted,
    AcceptedWithWarnings,
    FailedExhausted,
}

impl ControllerState {
    /// The terminal state this maps to, if any.
    pub fn terminal(&self) -> Option<TerminalState> {
        match self {
            ControllerState::Accepted => Some(TerminalState::Accepted),
            ControllerState::AcceptedWithWarnings => Some(TerminalState::AcceptedWithWarnings),
            ControllerState::FailedExhausted => Some(TerminalState::FailedExhausted),
            ControllerState::Validating | ControllerState::Suggesting => None,
        }
    }
}

/// Where to go after a validation attempt.
///
/// `attempt` counts corrections already applied. With `retry_on_warnings`
/// unset a soft-only outcome is accepted immediately.
pub fn next_state(
    classification: Classification,
    attempt: u32,
    bound: u32,
    retry_on_warnings: bool,
) -> ControllerState {
    let budget_left = attempt < bound;
    match classification {
        Classification::Ok => ControllerState::Accepted,
        Classification::Warning if retry_on_warnings && budget_left => ControllerState::Suggesting,
        Classification::Warning => ControllerState::AcceptedWithWarnings,
        Classification::CriticalFailure if budget_left => ControllerState::Suggesting,
        Classification::CriticalFailure => ControllerState::FailedExhausted,
    }
}

/// Attempt bookkeeping for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryState {
    /// Corrections applied so far
    pub attempt: u32,
    pub bound: u32,
    /// Every validation outcome, oldest first
    pub history: Vec<ValidationOutcome>,
}

impl RetryState {
    pub fn new(bound: u32) -> Self {
        Self {
            attempt: 0,
            bound,
            history: Vec::new(),
        }
    }

    pub fn classifications(&self) -> Vec<Classification> {
        self.history.iter().map(|o| o.classification).collect()
    }
}

/// What the loop settled on.
#[derive(Debug, Clone)]
pub struct Settled {
    /// Last candidate validated; best effort when not accepted
    pub candidate: Candidate,
    pub terminal: TerminalState,
    pub retry: RetryState,
    /// Outcome of the last validation, plus any loop annotations
    pub outcome: ValidationOutcome,
}

pub struct RetryController {
    validator: Validator,
    advisory: Arc<dyn AdvisoryService>,
    bound: u32,
    retry_on_warnings: bool,
    timeout: Duration,
}

impl RetryController {
    pub fn new(
        validator: Validator,
        advisory: Arc<dyn AdvisoryService>,
        bound: u32,
        retry_on_warnings: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            validator,
            advisory,
            bound,
            retry_on_warnings,
            timeout,
        }
    }

    /// Validate, correct and revalidate until a terminal state is reached.
    ///
    /// Never fails. Runs at most `bound + 1` validations.
    pub async fn run(&self, candidate: Candidate) -> Settled {
        let mut retry = RetryState::new(self.bound);
        let mut current = candidate;

        loop {
            let mut outcome = self.validator.validate(&current);
            retry.history.push(outcome.clone());

            let state = next_state(
                outcome.classification,
                retry.attempt,
                self.bound,
                self.retry_on_warnings,
            );
            info!(
                attempt = retry.attempt,
                revision = current.revision,
                classification = ?outcome.classification,
                violations = outcome.violations.len(),
                next = ?state,
                "Validation attempt"
            );

            if let Some(terminal) = state.terminal() {
                return Settled {
                    candidate: current,
                    terminal,
                    retry,
                    outcome,
                };
            }

            match self.suggest(&current, &outcome).await {
                Ok(correction) => {
                    debug!(
                        attempt = retry.attempt + 1,
                        empty = correction.is_empty(),
                        "Applying correction"
                    );
                    current = current.apply(&correction);
                    retry.attempt += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Advisory service unavailable, stopping correction loop");
                    let terminal = match outcome.classification {
                        Classification::CriticalFailure => TerminalState::FailedExhausted,
                        _ => TerminalState::AcceptedWithWarnings,
                    };
                    outcome.violations.push(Violation::warning(
                        "advisory.unavailable",
                        format!("Correction could not be requested: {e}"),
                    ));
                    let outcome = ValidationOutcome::from_violations(outcome.violations);
                    return Settled {
                        candidate: current,
                        terminal,
                        retry,
                        outcome,
                    };
                }
            }
        }
    }

    async fn suggest(
        &self,
        candidate: &Candidate,
        outcome: &ValidationOutcome,
    ) -> Result<crate::models::PartialCandidate, MobgenError> {
        // critical rules first, so the advisor fixes what blocks acceptance
        let mut violations: Vec<Violation> = outcome.critical().cloned().collect();
        violations.extend(outcome.warnings().cloned());

        tokio::time::timeout(self.timeout, self.advisory.suggest(candidate, &violations))
            .await
            .map_err(|_| MobgenError::Timeout(self.timeout))?
    }
}
