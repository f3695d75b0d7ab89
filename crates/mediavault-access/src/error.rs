//! Error types for the access core

use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Creation/update-time validation failures, reported per field.
///
/// Nonexistent-resource and unauthorized-creator deliberately share the same
/// "not found" message so that creation attempts cannot be used to probe for
/// resource existence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error, Serialize)]
#[error("validation failed: {}", describe(.errors))]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

fn describe(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{} {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_error_on(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// Ok when no errors were collected, Err(self) otherwise.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// Error type for access-core operations.
#[derive(Error, Debug)]
pub enum AccessError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("access token not found")]
    TokenNotFound,
}
