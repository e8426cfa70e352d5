//! Failure signalling and classification
//!
//! User operations report failures as `anyhow::Error`s (or panic). The runner
//! wraps every invocation failure in an `InvocationError` naming the
//! operation; classification peels those wrappers off before deciding what
//! the failure means.

use std::any::Any;
use thiserror::Error;

/// Failures that user code raises to steer the result state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TestFailure {
    #[error("{0}")]
    AssertionFailed(String),

    #[error("Test cancelled: {0}")]
    Cancelled(String),
}

/// Wrapper added around a failure raised while invoking an operation
#[derive(Error, Debug)]
#[error("Exception invoking {operation}: {cause}")]
pub struct InvocationError {
    pub operation: String,
    pub cause: anyhow::Error,
}

impl InvocationError {
    pub fn wrap(operation: impl Into<String>, cause: anyhow::Error) -> anyhow::Error {
        anyhow::Error::new(Self {
            operation: operation.into(),
            cause,
        })
    }
}

/// What a failure means for the result state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    Assertion,
    Cancelled,
    Error,
}

/// A failure reduced to its underlying cause
#[derive(Clone, Debug)]
pub struct Classified {
    pub kind: FailureKind,
    pub message: String,
    pub trace: String,
}

/// Unwrap invocation wrappers and classify the underlying cause
pub fn classify(error: anyhow::Error) -> Classified {
    let mut frames = Vec::new();
    let mut error = error;
    loop {
        match error.downcast::<InvocationError>() {
            Ok(invocation) => {
                frames.push(format!("at {}", invocation.operation));
                error = invocation.cause;
            }
            Err(cause) => {
                error = cause;
                break;
            }
        }
    }

    let kind = match error.downcast_ref::<TestFailure>() {
        Some(TestFailure::AssertionFailed(_)) => FailureKind::Assertion,
        Some(TestFailure::Cancelled(_)) => FailureKind::Cancelled,
        None => FailureKind::Error,
    };

    // innermost frame first
    frames.reverse();
    let mut trace: Vec<String> = error
        .chain()
        .skip(1)
        .map(|cause| format!("caused by: {cause}"))
        .collect();
    trace.extend(frames);

    Classified {
        kind,
        message: error.to_string(),
        trace: trace.join("\n"),
    }
}

/// Turn a caught panic payload into an error
pub fn panic_error(payload: Box<dyn Any + Send>) -> anyhow::Error {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };
    anyhow::anyhow!("panicked: {message}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_unwraps_nested_invocations() {
        let inner = anyhow::Error::new(TestFailure::AssertionFailed("expected 1".to_string()));
        let wrapped = InvocationError::wrap("Outer", InvocationError::wrap("Inner", inner));

        let classified = classify(wrapped);
        assert_eq!(classified.kind, FailureKind::Assertion);
        assert_eq!(classified.message, "expected 1");
        assert_eq!(classified.trace, "at Inner\nat Outer");
    }

    #[test]
    fn test_plain_error_keeps_cause_chain() {
        let error: anyhow::Result<()> =
            Err(anyhow::anyhow!("connection reset")).context("loading data");
        let classified = classify(InvocationError::wrap("Load", error.unwrap_err()));

        assert_eq!(classified.kind, FailureKind::Error);
        assert_eq!(classified.message, "loading data");
        assert!(classified.trace.contains("caused by: connection reset"));
        assert!(classified.trace.ends_with("at Load"));
    }

    #[test]
    fn test_cancelled_failure() {
        let error = anyhow::Error::new(TestFailure::Cancelled("stop requested".to_string()));
        assert_eq!(classify(error).kind, FailureKind::Cancelled);
    }

    #[test]
    fn test_panic_payloads() {
        let error = panic_error(Box::new("boom"));
        assert_eq!(error.to_string(), "panicked: boom");

        let error = panic_error(Box::new(String::from("bang")));
        assert_eq!(error.to_string(), "panicked: bang");
    }
}
