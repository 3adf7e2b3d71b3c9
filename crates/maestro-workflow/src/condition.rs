//! Branch points evaluated against the workflow context.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::warn;

use maestro_core::{Data, panic_message};

use crate::error::StepError;

/// Boolean check over the workflow context.
pub type Checker = Arc<dyn Fn(&Data) -> Result<bool, StepError> + Send + Sync>;

/// Outcome of evaluating a condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// The branch taken.
    pub value: bool,
    /// Error raised by the checker, if any. An error always yields `false`.
    pub error: Option<String>,
}

/// A branch point.
///
/// On `true` execution jumps to `then_step`; on `false` to `else_step`, or
/// to the next item in sequence when there is none.
#[derive(Clone)]
pub struct Condition {
    /// Condition identifier, unique within the workflow.
    pub id: String,
    checker: Checker,
    /// Item to jump to when the check passes.
    pub then_step: String,
    /// Item to jump to when the check fails.
    pub else_step: Option<String>,
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("id", &self.id)
            .field("then_step", &self.then_step)
            .field("else_step", &self.else_step)
            .finish_non_exhaustive()
    }
}

impl Condition {
    /// Create a condition with no else branch.
    #[must_use]
    pub fn new<F>(id: impl Into<String>, checker: F, then_step: impl Into<String>) -> Self
    where
        F: Fn(&Data) -> Result<bool, StepError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            checker: Arc::new(checker),
            then_step: then_step.into(),
            else_step: None,
        }
    }

    /// Set the else branch.
    #[must_use]
    pub fn otherwise(mut self, else_step: impl Into<String>) -> Self {
        self.else_step = Some(else_step.into());
        self
    }

    /// Evaluate the checker. Errors and panics are logged and count as
    /// `false`.
    #[must_use]
    pub fn evaluate(&self, context: &Data) -> Evaluation {
        let outcome = catch_unwind(AssertUnwindSafe(|| (self.checker)(context)));
        let error = match outcome {
            Ok(Ok(value)) => {
                return Evaluation { value, error: None };
            },
            Ok(Err(e)) => e.message,
            Err(panic) => format!("checker panicked: {}", panic_message(panic.as_ref())),
        };
        warn!(condition_id = %self.id, error = %error, "Condition check failed, taking false branch");
        Evaluation {
            value: false,
            error: Some(error),
        }
    }

    /// The branch target for a result, `None` meaning "next in sequence".
    #[must_use]
    pub fn target(&self, value: bool) -> Option<&str> {
        if value {
            Some(&self.then_step)
        } else {
            self.else_step.as_deref()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(amount: i64) -> Data {
        let mut data = Data::new();
        data.insert("amount".to_string(), json!(amount));
        data
    }

    fn large(data: &Data) -> Result<bool, StepError> {
        data.get("amount")
            .and_then(serde_json::Value::as_i64)
            .map(|a| a > 100)
            .ok_or_else(|| StepError::new("amount missing"))
    }

    #[test]
    fn test_branches() {
        let condition = Condition::new("is_large", large, "review").otherwise("auto_approve");

        let eval = condition.evaluate(&ctx(500));
        assert!(eval.value);
        assert_eq!(condition.target(eval.value), Some("review"));

        let eval = condition.evaluate(&ctx(5));
        assert!(!eval.value);
        assert_eq!(condition.target(eval.value), Some("auto_approve"));
    }

    #[test]
    fn test_errors_count_as_false() {
        let condition = Condition::new("is_large", large, "review");
        let eval = condition.evaluate(&Data::new());
        assert!(!eval.value);
        assert_eq!(eval.error.as_deref(), Some("amount missing"));
        assert_eq!(condition.target(false), None);

        let panicking = Condition::new("boom", |_: &Data| -> Result<bool, StepError> { panic!("bad checker") }, "x");
        let eval = panicking.evaluate(&Data::new());
        assert!(!eval.value);
        assert!(eval.error.unwrap().contains("bad checker"));
    }
}
