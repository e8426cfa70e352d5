//! Test execution engine
//!
//! Hierarchical execution of a test tree with one-time setup and teardown,
//! failure classification, and cooperative cancellation.

mod context;
mod failure;
mod runner;

pub use context::ExecutionContext;
pub use failure::{classify, Classified, FailureKind, InvocationError, TestFailure};
pub use runner::TestRunner;
