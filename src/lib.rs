//! suitegrid - hierarchical test execution with out-of-process agents
//!
//! - [`models`]: packages, test nodes, result trees, worker records
//! - [`executor`]: runs a test node tree and produces a result tree
//! - [`agents`]: launches platform-specific worker processes and tracks
//!   their registration and status
//! - [`config`], [`output`], [`utils`]: configuration, result rendering,
//!   logging

pub mod agents;
pub mod cli;
pub mod config;
pub mod executor;
pub mod models;
pub mod output;
pub mod utils;
