//! Field-level validation shared by unit and product records.

use std::{fmt, sync::LazyLock};

use non_empty_string::NonEmptyString;
use regex::Regex;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is a valid regex")
});

/// A problem with a single field of a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {problem}")]
pub struct FieldError {
    /// Name of the offending field.
    pub field: &'static str,
    /// What is wrong with it.
    pub problem: FieldProblem,
}

/// The ways a field value can be rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldProblem {
    /// The value is empty or only whitespace.
    Empty,
    /// The value is longer than the field allows.
    TooLong {
        /// Maximum number of characters.
        max: usize,
    },
    /// The value is not a plausible e-mail address.
    InvalidEmail,
}

impl fmt::Display for FieldProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "this field may not be blank"),
            Self::TooLong { max } => {
                write!(f, "ensure this field has no more than {max} characters")
            }
            Self::InvalidEmail => write!(f, "enter a valid email address"),
        }
    }
}

/// Trim a text value and check it is non-empty and at most `max` characters.
pub(crate) fn text(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<NonEmptyString, FieldError> {
    let trimmed = value.trim();
    if trimmed.chars().count() > max {
        return Err(FieldError {
            field,
            problem: FieldProblem::TooLong { max },
        });
    }
    NonEmptyString::new(trimmed.to_string()).map_err(|_| FieldError {
        field,
        problem: FieldProblem::Empty,
    })
}

/// Validate an e-mail address.
pub(crate) fn email(field: &'static str, value: &str) -> Result<NonEmptyString, FieldError> {
    let address = text(field, value, 254)?;
    if EMAIL.is_match(address.as_str()) {
        Ok(address)
    } else {
        Err(FieldError {
            field,
            problem: FieldProblem::InvalidEmail,
        })
    }
}

/// Accumulates field errors so that every problem is reported at once.
#[derive(Debug, Default)]
pub(crate) struct Collector {
    errors: Vec<FieldError>,
}

impl Collector {
    pub(crate) fn check<T>(&mut self, result: Result<T, FieldError>) -> Option<T> {
        result.map_err(|error| self.errors.push(error)).ok()
    }

    pub(crate) fn finish(self) -> Result<(), nonempty::NonEmpty<FieldError>> {
        nonempty::NonEmpty::from_vec(self.errors).map_or(Ok(()), Err)
    }
}
