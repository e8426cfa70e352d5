//! Execution context
//!
//! Environment settings (culture, per-test timeout, cancellation) are
//! threaded through the runner as a value instead of living in process-wide
//! state, so concurrent runs never observe each other's settings.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::models::{settings, TestNode, TestPackage};

#[derive(Clone, Debug, Default)]
pub struct ExecutionContext {
    pub culture: Option<String>,
    /// Per-test timeout applied to leaf tests
    pub test_timeout: Option<Duration>,
    cancellation: CancellationToken,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed culture and timeout from a package's settings
    pub fn from_package(package: &TestPackage) -> Self {
        Self {
            culture: package.get(settings::CULTURE).map(str::to_string),
            test_timeout: package.default_timeout(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_culture(mut self, culture: impl Into<String>) -> Self {
        self.culture = Some(culture.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Context for a node: its own settings override the inherited ones.
    /// The cancellation token is shared with the parent.
    pub fn for_node(&self, node: &TestNode) -> Self {
        let mut context = self.clone();
        if let Some(culture) = &node.properties.culture {
            context.culture = Some(culture.clone());
        }
        if let Some(ms) = node.properties.timeout_ms {
            context.test_timeout = Some(Duration::from_millis(ms));
        }
        trace!(
            "Context for {}: culture={:?} timeout={:?}",
            node.full_name,
            context.culture,
            context.test_timeout
        );
        context
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
