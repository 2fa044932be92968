pub mod branch;
pub mod config;
pub mod diff;
pub mod discover;
pub mod error;
pub mod events;
pub mod gitops;
pub mod model;
pub mod orchestrator;
pub mod runner;
pub mod sandbox;
pub mod synthesize;
pub mod types;

pub use error::HealError;
pub use types::*;
