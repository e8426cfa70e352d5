//! Hierarchical test runner
//!
//! Executes one node of the test tree: fixture construction, one-time setup,
//! children (or the test body for a leaf), and one-time teardown. Failures in
//! user code never escape `execute`; they are converted into result state.

use anyhow::Result;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::context::ExecutionContext;
use super::failure::{classify, panic_error, FailureKind, InvocationError};
use crate::models::{
    Fixture, FixtureOp, FailureSite, Operation, ResultState, RunState, TestNode, TestResult,
};

const CHILD_FAILURE_MESSAGE: &str = "One or more child tests had errors";
const CHILD_CANCELLED_MESSAGE: &str = "One or more child tests were cancelled";
const CANCELLED_MESSAGE: &str = "Execution cancelled";

/// The fixture instance in use for one execution of a node
enum FixtureSlot<'a> {
    Empty,
    /// Supplied by the caller, shared with the parent
    Borrowed(&'a mut dyn Fixture),
    /// Constructed by this execution, disposed in teardown
    Owned(Box<dyn Fixture>),
}

impl FixtureSlot<'_> {
    fn instance(&mut self) -> Option<&mut dyn Fixture> {
        match self {
            FixtureSlot::Empty => None,
            FixtureSlot::Borrowed(fixture) => Some(&mut **fixture),
            FixtureSlot::Owned(fixture) => Some(fixture.as_mut()),
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, FixtureSlot::Empty)
    }
}

/// Runner for a test tree
#[derive(Clone, Debug, Default)]
pub struct TestRunner {
    context: ExecutionContext,
}

impl TestRunner {
    pub fn new(context: ExecutionContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Request cancellation of any execution using this runner's context
    pub fn cancel(&self) {
        info!("Cancellation requested");
        self.context.cancel();
    }

    /// Execute a node, optionally against an instance supplied by the caller
    pub fn execute(&self, node: &TestNode, fixture: Option<&mut dyn Fixture>) -> TestResult {
        let start = Instant::now();
        info!("Executing {} ({} tests)", node.full_name, node.test_count());

        let context = self.context.for_node(node);
        let slot = match fixture {
            Some(fixture) => FixtureSlot::Borrowed(fixture),
            None => FixtureSlot::Empty,
        };
        let result = execute_node(node, slot, &context);

        info!(
            "{} finished in {}ms - {} (pass {}/{})",
            node.full_name,
            start.elapsed().as_millis(),
            result.state,
            result.passed(),
            result.total_leaves()
        );
        result
    }

    /// Execute a tree on the blocking pool
    pub async fn run(&self, node: Arc<TestNode>) -> Result<TestResult> {
        let runner = self.clone();
        let result = tokio::task::spawn_blocking(move || runner.execute(&node, None)).await?;
        Ok(result)
    }
}

fn execute_node(node: &TestNode, mut slot: FixtureSlot<'_>, context: &ExecutionContext) -> TestResult {
    let mut result = TestResult::new(&node.name, &node.full_name);

    if let Some(reason) = skip_reason(node) {
        result.skip(Some(label_for(node.run_state)), reason);
        result.finish();
        return result;
    }

    if context.is_cancelled() {
        result.set_result(
            ResultState::Cancelled,
            None,
            Some("Execution cancelled before start".to_string()),
            None,
        );
        result.finish();
        return result;
    }

    // Construction failure is reported like a setup failure
    let mut setup_complete = false;
    if slot.is_empty() && node.requires_instance() {
        if let Some(fixture_type) = &node.fixture_type {
            debug!("Constructing {} for {}", fixture_type.name, node.full_name);
            let constructed = panic::catch_unwind(AssertUnwindSafe(|| fixture_type.construct()))
                .unwrap_or_else(|payload| Err(panic_error(payload)))
                .map_err(|e| InvocationError::wrap(format!("{}::new", fixture_type.name), e));
            match constructed {
                Ok(instance) => slot = FixtureSlot::Owned(instance),
                Err(e) => record_setup_failure(&mut result, e),
            }
        }
    }

    if result.state == ResultState::Inconclusive {
        setup_complete = run_one_time_setup(node, &mut slot, &mut result);
    }

    if setup_complete {
        debug!("Setup complete for {}", node.full_name);
        if let Some(body) = &node.test {
            run_test_body(node, body, &mut slot, context, &mut result);
        } else {
            run_children(node, &mut slot, context, &mut result);
        }
    }

    run_one_time_teardown(node, slot, &mut result);

    result.finish();
    result
}

fn skip_reason(node: &TestNode) -> Option<String> {
    let reason = || node.properties.skip_reason.clone();
    match node.run_state {
        RunState::Runnable | RunState::Explicit => None,
        RunState::Skipped => Some(reason().unwrap_or_else(|| "Skipped".to_string())),
        RunState::Ignored => Some(reason().unwrap_or_else(|| "Ignored".to_string())),
    }
}

fn label_for(run_state: RunState) -> &'static str {
    match run_state {
        RunState::Ignored => "Ignored",
        RunState::Explicit => "Explicit",
        RunState::Runnable | RunState::Skipped => "Skipped",
    }
}

/// Invoke one operation, catching both errors and panics
fn invoke(op: &FixtureOp, fixture: Option<&mut dyn Fixture>) -> Result<()> {
    let outcome = match &op.operation {
        Operation::Static(f) => panic::catch_unwind(AssertUnwindSafe(|| f())),
        Operation::Instance(f) => match fixture {
            Some(instance) => panic::catch_unwind(AssertUnwindSafe(|| f(instance))),
            None => Ok(Err(anyhow::anyhow!(
                "No fixture instance available for {}",
                op.name
            ))),
        },
    };

    outcome
        .unwrap_or_else(|payload| Err(panic_error(payload)))
        .map_err(|e| InvocationError::wrap(&op.name, e))
}

fn record_setup_failure(result: &mut TestResult, error: anyhow::Error) {
    let classified = classify(error);
    let state = match classified.kind {
        FailureKind::Cancelled => ResultState::Cancelled,
        FailureKind::Assertion | FailureKind::Error => ResultState::Error,
    };
    warn!("Setup failed for {}: {}", result.full_name, classified.message);
    result.set_result(
        state,
        Some(FailureSite::SetUp),
        Some(classified.message),
        Some(classified.trace),
    );
}

/// Run setup operations in declaration order; false on the first failure
fn run_one_time_setup(node: &TestNode, slot: &mut FixtureSlot<'_>, result: &mut TestResult) -> bool {
    for op in &node.one_time_setup {
        debug!("OneTimeSetUp {} on {}", op.name, node.full_name);
        if let Err(e) = invoke(op, slot.instance()) {
            record_setup_failure(result, e);
            return false;
        }
    }
    true
}

fn run_test_body(
    node: &TestNode,
    body: &FixtureOp,
    slot: &mut FixtureSlot<'_>,
    context: &ExecutionContext,
    result: &mut TestResult,
) {
    let start = Instant::now();
    let outcome = invoke(body, slot.instance());
    let elapsed = start.elapsed();

    match outcome {
        Ok(()) => match context.test_timeout {
            Some(timeout) if elapsed > timeout => result.set_result(
                ResultState::Failure,
                Some(FailureSite::Test),
                Some(format!(
                    "Test exceeded Timeout value of {}ms",
                    timeout.as_millis()
                )),
                None,
            ),
            _ => result.set_state(ResultState::Success),
        },
        Err(e) => {
            let classified = classify(e);
            let state = match classified.kind {
                FailureKind::Assertion => ResultState::Failure,
                FailureKind::Cancelled => ResultState::Cancelled,
                FailureKind::Error => ResultState::Error,
            };
            debug!("{} {}: {}", node.full_name, state, classified.message);
            result.set_result(
                state,
                Some(FailureSite::Test),
                Some(classified.message),
                Some(classified.trace),
            );
        }
    }
}

/// Run children in declaration order, stopping at the first cancellation
fn run_children(
    node: &TestNode,
    slot: &mut FixtureSlot<'_>,
    context: &ExecutionContext,
    result: &mut TestResult,
) {
    result.set_state(ResultState::Success);

    for child in &node.children {
        if context.is_cancelled() {
            debug!("Cancelled before {}", child.full_name);
            result.set_result(
                ResultState::Cancelled,
                None,
                Some(CANCELLED_MESSAGE.to_string()),
                None,
            );
            break;
        }

        let child_result = if child.run_state == RunState::Explicit {
            let mut skipped = TestResult::new(&child.name, &child.full_name);
            skipped.skip(Some("Explicit"), "Explicit tests run only when selected directly");
            skipped.finish();
            skipped
        } else {
            let child_context = context.for_node(child);
            // children without their own fixture type share this instance
            let child_slot = match slot.instance() {
                Some(instance) if child.fixture_type.is_none() => FixtureSlot::Borrowed(instance),
                _ => FixtureSlot::Empty,
            };
            execute_node(child, child_slot, &child_context)
        };

        let child_state = child_result.state;
        result.add_child(child_result);

        if child_state == ResultState::Cancelled {
            debug!(
                "{} cancelled, skipping remaining children of {}",
                child.full_name, node.full_name
            );
            result.set_result(
                ResultState::Cancelled,
                Some(FailureSite::Child),
                Some(CHILD_CANCELLED_MESSAGE.to_string()),
                None,
            );
            break;
        }

        if child_state.is_failure() && result.state == ResultState::Success {
            result.set_result(
                ResultState::Failure,
                Some(FailureSite::Child),
                Some(CHILD_FAILURE_MESSAGE.to_string()),
                None,
            );
        }
    }
}

/// Run teardown in reverse declaration order, then dispose an owned instance
fn run_one_time_teardown(node: &TestNode, mut slot: FixtureSlot<'_>, result: &mut TestResult) {
    for op in node.one_time_teardown.iter().rev() {
        if !op.is_static() && slot.is_empty() {
            debug!("Skipping {}: no fixture instance", op.name);
            continue;
        }

        debug!("OneTimeTearDown {} on {}", op.name, node.full_name);
        if let Err(e) = invoke(op, slot.instance()) {
            let classified = classify(e);
            warn!("Teardown failed for {}: {}", node.full_name, classified.message);
            result.record_teardown_failure(&classified.message, Some(&classified.trace));
        }
    }

    if let FixtureSlot::Owned(mut instance) = slot {
        let disposed = panic::catch_unwind(AssertUnwindSafe(|| instance.dispose()))
            .unwrap_or_else(|payload| Err(panic_error(payload)));
        if let Err(e) = disposed {
            let classified = classify(e);
            warn!("Dispose failed for {}: {}", node.full_name, classified.message);
            result.record_teardown_failure(&classified.message, Some(&classified.trace));
        }
    }
}
