//! studyflow rule simulator
//!
//! Dry-runs study rule sets against an in-memory study database so rule
//! authors can check what a rule set does before it is deployed.

pub mod config;
pub mod simulate;

pub use config::Settings;
pub use simulate::{read_document, Simulation, SimulationReport, StudySeed};
