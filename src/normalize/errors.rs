use std::fmt;

use thiserror::Error;

/// A single violated constraint, located by field path
/// (e.g. `messages[1].content[0].image_url.url`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub constraint: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            constraint: constraint.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.constraint)
    }
}

/// Request validation failure. Never empty.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("request validation failed: {}", summary(.errors))]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn single(field: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError::new(field, constraint)],
        }
    }

    /// True if any error is reported against `field`.
    #[cfg(test)]
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

fn summary(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Collects field errors while walking a request.
#[derive(Debug, Default)]
pub(crate) struct Collector {
    errors: Vec<FieldError>,
}

impl Collector {
    pub fn push(&mut self, field: impl Into<String>, constraint: impl Into<String>) {
        self.errors.push(FieldError::new(field, constraint));
    }

    pub fn count(&self) -> usize {
        self.errors.len()
    }

    pub fn finish<T>(self, value: T) -> Result<T, ValidationError> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(ValidationError {
                errors: self.errors,
            })
        }
    }
}
