pub mod actor;
pub mod config;
pub mod error;
pub mod propagator;

pub use actor::{Actor, Viewer};
pub use config::Configuration;
pub use error::AppResult;
pub use propagator::{PropagationOutcome, RulePropagator};
