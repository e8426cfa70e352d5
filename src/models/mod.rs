//! Data models for suite execution and agent orchestration
//!
//! This module contains the data structures shared by the runner and the
//! agent layer.

mod package;
mod test_node;
mod test_result;
mod worker;

pub use package::{settings, Platform, PlatformError, TestPackage};
pub use test_node::{
    fixture_mut, Constructor, Fixture, FixtureOp, FixtureType, InstanceFn, NodeProperties,
    Operation, RunState, StaticFn, TestNode,
};
pub use test_result::{FailureSite, ResultState, TestResult};
pub use worker::{AgentHandle, AgentStatus, WorkerRecord};
