//! Error container for concurrent phases
//!
//! Many concurrent producers (sub-tasks of a check, or the checks run by the
//! checker) append into one `AggregateError`. Once the phase has joined the
//! container is resolved with [`AggregateError::into_option`]: `None` when
//! nothing failed, otherwise a single error that lists every failure.

use std::fmt;

/// A collection of failures from one concurrent phase
///
/// Failures keep their insertion order and their full context chain.
/// Rendering uses the alternate `anyhow` format so every `.context(..)`
/// layer (check name, region, instance ID) ends up in the message.
#[derive(Debug, Default)]
pub struct AggregateError {
    errors: Vec<anyhow::Error>,
}

impl AggregateError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure
    pub fn push(&mut self, error: impl Into<anyhow::Error>) {
        self.errors.push(error.into());
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// The recorded failures, in insertion order
    pub fn errors(&self) -> &[anyhow::Error] {
        &self.errors
    }

    /// Resolve the container: `None` if no failure was recorded
    pub fn into_option(self) -> Option<Self> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.len() {
            0 => return write!(f, "no errors occurred"),
            1 => write!(f, "1 error occurred:")?,
            n => write!(f, "{n} errors occurred:")?,
        }
        for error in &self.errors {
            // Indent continuation lines so nested aggregates stay readable
            let rendered = format!("{error:#}").replace('\n', "\n\t  ");
            write!(f, "\n\t* {rendered}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

impl FromIterator<anyhow::Error> for AggregateError {
    fn from_iter<T: IntoIterator<Item = anyhow::Error>>(iter: T) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, anyhow};

    #[test]
    fn empty_resolves_to_none() {
        assert!(AggregateError::new().into_option().is_none());
    }

    #[test]
    fn single_error_message() {
        let mut errors = AggregateError::new();
        errors.push(anyhow!("boom"));
        let resolved = errors.into_option().expect("one failure recorded");
        assert_eq!(resolved.to_string(), "1 error occurred:\n\t* boom");
    }

    #[test]
    fn message_lists_every_failure_with_context() {
        let mut errors = AggregateError::new();
        errors.push(
            Err::<(), _>(anyhow!("AccessDenied"))
                .context("describing instances for region eu-west-1")
                .unwrap_err(),
        );
        errors.push(anyhow!("throttled"));

        let message = errors.to_string();
        assert!(message.starts_with("2 errors occurred:"));
        assert!(message.contains("describing instances for region eu-west-1: AccessDenied"));
        assert!(message.contains("* throttled"));
    }

    #[test]
    fn nested_aggregate_is_indented() {
        let inner: AggregateError = vec![anyhow!("a"), anyhow!("b")].into_iter().collect();
        let mut outer = AggregateError::new();
        outer.push(anyhow::Error::new(inner).context("running check \"x\""));

        let message = outer.to_string();
        assert!(message.contains("running check \"x\": 2 errors occurred:"));
        assert!(message.contains("\n\t  \t* a"));
        assert!(message.contains("\n\t  \t* b"));
    }
}
