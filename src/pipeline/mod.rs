//! The workflow core.
//!
//! Flow:
//! query → extractor → resolver (geocoding ∥ parameters) → merge → controller ⟲ advisory → formatter
//!
//! K_i: Only extraction and resolution can fail a run. Everything after the
//! merge returns a result, best effort if need be.

mod batch;
mod controller;
mod coordinator;
mod extractor;
mod formatter;
mod resolver;
mod validator;

pub use batch::*;
pub use controller::*;
pub use coordinator::*;
pub use extractor::*;
pub use formatter::*;
pub use resolver::*;
pub use validator::*;
