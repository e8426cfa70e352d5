//! Test tree models
//!
//! A `TestNode` is one suite, fixture, or leaf test in the tree handed to
//! the runner. Nodes carry their fixture descriptor and the ordered one-time
//! setup and teardown operations; user code is held as shared closures.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Whether a node should be executed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Runnable,
    Skipped,
    Ignored,
    /// Runs only when selected directly, never as part of a parent
    Explicit,
}

/// A constructed fixture instance.
///
/// `dispose` is the optional disposal capability; the runner calls it once
/// after one-time teardown.
pub trait Fixture: Send {
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn dispose(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Downcast a fixture instance to its concrete type
pub fn fixture_mut<T: 'static>(fixture: &mut dyn Fixture) -> Option<&mut T> {
    fixture.as_any_mut().downcast_mut::<T>()
}

pub type StaticFn = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;
pub type InstanceFn = Arc<dyn Fn(&mut dyn Fixture) -> anyhow::Result<()> + Send + Sync>;
pub type Constructor =
    Arc<dyn Fn(&[Value]) -> anyhow::Result<Box<dyn Fixture>> + Send + Sync>;

#[derive(Clone)]
pub enum Operation {
    /// Invoked without a fixture instance
    Static(StaticFn),
    /// Invoked against the node's fixture instance
    Instance(InstanceFn),
}

/// A named setup, teardown, or test operation
#[derive(Clone)]
pub struct FixtureOp {
    pub name: String,
    pub operation: Operation,
}

impl FixtureOp {
    pub fn static_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            operation: Operation::Static(Arc::new(f)),
        }
    }

    pub fn instance<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut dyn Fixture) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            operation: Operation::Instance(Arc::new(f)),
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(self.operation, Operation::Static(_))
    }
}

impl fmt::Debug for FixtureOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_static() { "static" } else { "instance" };
        write!(f, "FixtureOp({}, {kind})", self.name)
    }
}

/// Descriptor of a fixture type
#[derive(Clone)]
pub struct FixtureType {
    pub name: String,
    /// Static-only types are never instantiated
    pub is_static: bool,
    /// Declared constructor arguments
    pub arguments: Vec<Value>,
    constructor: Option<Constructor>,
}

impl FixtureType {
    pub fn new<F>(name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&[Value]) -> anyhow::Result<Box<dyn Fixture>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            is_static: false,
            arguments: Vec::new(),
            constructor: Some(Arc::new(constructor)),
        }
    }

    /// A type that only exposes static operations
    pub fn static_type(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_static: true,
            arguments: Vec::new(),
            constructor: None,
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<Value>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Build an instance from the declared arguments
    pub fn construct(&self) -> anyhow::Result<Box<dyn Fixture>> {
        match &self.constructor {
            Some(constructor) => constructor(&self.arguments),
            None => anyhow::bail!("{} has no usable constructor", self.name),
        }
    }
}

impl fmt::Debug for FixtureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureType")
            .field("name", &self.name)
            .field("is_static", &self.is_static)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}

/// Node-scoped environment settings
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeProperties {
    pub culture: Option<String>,
    pub timeout_ms: Option<u64>,
    pub skip_reason: Option<String>,
}

/// A node of the test tree
#[derive(Clone, Debug)]
pub struct TestNode {
    pub name: String,
    pub full_name: String,
    pub run_state: RunState,
    pub properties: NodeProperties,
    pub fixture_type: Option<FixtureType>,
    pub one_time_setup: Vec<FixtureOp>,
    pub one_time_teardown: Vec<FixtureOp>,
    /// Body of a leaf test
    pub test: Option<FixtureOp>,
    pub children: Vec<TestNode>,
}

impl TestNode {
    /// Create a suite node
    pub fn suite(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            full_name: name.clone(),
            name,
            run_state: RunState::Runnable,
            properties: NodeProperties::default(),
            fixture_type: None,
            one_time_setup: Vec::new(),
            one_time_teardown: Vec::new(),
            test: None,
            children: Vec::new(),
        }
    }

    /// Create a leaf test node
    pub fn test(name: impl Into<String>, body: FixtureOp) -> Self {
        let mut node = Self::suite(name);
        node.test = Some(body);
        node
    }

    pub fn with_fixture(mut self, fixture_type: FixtureType) -> Self {
        self.fixture_type = Some(fixture_type);
        self
    }

    pub fn with_setup(mut self, op: FixtureOp) -> Self {
        self.one_time_setup.push(op);
        self
    }

    pub fn with_teardown(mut self, op: FixtureOp) -> Self {
        self.one_time_teardown.push(op);
        self
    }

    pub fn with_run_state(mut self, run_state: RunState) -> Self {
        self.run_state = run_state;
        self
    }

    pub fn with_skip_reason(mut self, reason: impl Into<String>) -> Self {
        self.properties.skip_reason = Some(reason.into());
        self
    }

    pub fn with_culture(mut self, culture: impl Into<String>) -> Self {
        self.properties.culture = Some(culture.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.properties.timeout_ms = Some(timeout_ms);
        self
    }

    /// Append a child; its full name (and its descendants') is rebased
    /// under this node
    pub fn with_child(mut self, mut child: TestNode) -> Self {
        child.rebase(&self.full_name);
        self.children.push(child);
        self
    }

    fn rebase(&mut self, parent: &str) {
        self.full_name = format!("{parent}.{}", self.name);
        let prefix = self.full_name.clone();
        for child in &mut self.children {
            child.rebase(&prefix);
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.test.is_some()
    }

    /// Whether running this node needs a constructed instance
    pub fn requires_instance(&self) -> bool {
        self.fixture_type.as_ref().is_some_and(|t| !t.is_static)
    }

    /// Number of leaf tests under this node
    pub fn test_count(&self) -> usize {
        if self.is_leaf() {
            1
        } else {
            self.children.iter().map(TestNode::test_count).sum()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        value: u32,
    }

    impl Fixture for Counter {
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn test_full_names_are_rebased() {
        let tree = TestNode::suite("Root").with_child(
            TestNode::suite("Fixture")
                .with_child(TestNode::test("A", FixtureOp::static_fn("A", || Ok(())))),
        );

        assert_eq!(tree.children[0].full_name, "Root.Fixture");
        assert_eq!(tree.children[0].children[0].full_name, "Root.Fixture.A");
        assert_eq!(tree.test_count(), 1);
    }

    #[test]
    fn test_fixture_construction_uses_arguments() {
        let fixture_type = FixtureType::new("Counter", |args| {
            let value = args.first().and_then(Value::as_u64).unwrap_or(0) as u32;
            Ok(Box::new(Counter { value }) as Box<dyn Fixture>)
        })
        .with_arguments(vec![Value::from(7)]);

        let mut instance = fixture_type.construct().unwrap();
        let counter = fixture_mut::<Counter>(instance.as_mut()).unwrap();
        assert_eq!(counter.value, 7);
    }

    #[test]
    fn test_static_type_cannot_be_constructed() {
        let fixture_type = FixtureType::static_type("Helpers");
        assert!(fixture_type.construct().is_err());

        let node = TestNode::suite("S").with_fixture(fixture_type);
        assert!(!node.requires_instance());
    }
}
