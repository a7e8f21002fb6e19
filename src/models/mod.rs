//! Core data models for mobgen.
//!
//! Every value here is created fresh per coordinator run and never shared
//! between runs.
//!
//! Epistemic mapping:
//! - K_i (Knowledge): closed enums for scenarios, classes, severities and terminal states
//! - B_i (Beliefs): service replies and validation results, carried as Result and Violation
//! - I^R (Resolvable): retry bound, timeouts and tolerances from config
//! - I^B (Bounded): fatal run errors and best-effort results

mod candidate;
mod config;
mod error;
mod intent;
mod outcome;
mod result;

pub use candidate::*;
pub use config::*;
pub use error::*;
pub use intent::*;
pub use outcome::*;
pub use result::*;
