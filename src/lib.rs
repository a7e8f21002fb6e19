//! mobgen - Self-correcting mobility scenario parameter generation.
//!
//! ## Architecture
//!
//! A run turns one free-text scenario query into a parameter block for a
//! mobility-trace generator:
//!
//! - **Extraction**: query → structured intent (scenario, location, shares)
//! - **Resolution**: geocoding and parameter inference run concurrently
//! - **Validation**: deterministic critical and soft rules
//! - **Correction**: bounded loop asking an advisory service for fixes
//! - **Formatting**: final candidate → output schema plus run metadata
//!
//! ## Epistemic Design
//!
//! - K_i (Knowledge): Validation rules and the retry state machine are deterministic
//! - B_i (Beliefs): Every inference or lookup may fail (Result) or be wrong (Violation)
//! - I^R (Resolvable): Retry bound, timeouts and endpoints are configurable
//! - I^B (Bounded): Upstream outages end in a fatal error or a best-effort result
//!
//! ## Ports
//!
//! Every external call goes through a trait in [`services`]. Production
//! adapters use an OpenAI-compatible chat endpoint and Nominatim; tests
//! swap in deterministic doubles.

pub mod client;
pub mod models;
pub mod pipeline;
pub mod services;

// Re-exports for convenience
pub use client::LLMClient;
pub use models::{Config, GenerationResult, Intent, MobgenError, Result, RunStatus};
pub use pipeline::{BatchRunner, Coordinator};
pub use services::Services;
