//! Typed errors and HTTP mapping.

use crate::config::FieldType;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("duplicate {kind}: {name}")]
    Duplicate { kind: &'static str, name: String },
    #[error("invalid name '{0}': expected lowercase identifier")]
    InvalidName(String),
    #[error("reserved name: {0}")]
    Reserved(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("settings: {0}")]
    Settings(String),
}

/// One rejected field of a record payload.
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    #[error("{field} is required")]
    MissingField { field: String },
    #[error("{field} must be of type {expected}")]
    TypeMismatch { field: String, expected: FieldType },
    #[error("{field} must be one of: {}", .allowed.join(", "))]
    InvalidEnum { field: String, allowed: Vec<String> },
    #[error("{field} already exists")]
    DuplicateValue { field: String },
}

impl Violation {
    pub fn field(&self) -> &str {
        match self {
            Violation::MissingField { field }
            | Violation::TypeMismatch { field, .. }
            | Violation::InvalidEnum { field, .. }
            | Violation::DuplicateValue { field } => field,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Violation::DuplicateValue { .. })
    }
}

/// Every violation found for one payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Violations(pub Vec<Violation>);

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", v)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(Violations),
    #[error("duplicate value: {0}")]
    Duplicate(Violations),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
}

impl AppError {
    /// Duplicates alone are a conflict; anything else makes the payload invalid.
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        if violations.iter().all(Violation::is_duplicate) {
            AppError::Duplicate(Violations(violations))
        } else {
            AppError::Validation(Violations(violations))
        }
    }

    pub fn violations(&self) -> Option<&[Violation]> {
        match self {
            AppError::Validation(v) | AppError::Duplicate(v) => Some(&v.0),
            _ => None,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(rejection.body_text())
        } else {
            AppError::BadRequest(rejection.body_text())
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody<'a> {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<&'a [Violation]>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::Duplicate(_) => (StatusCode::CONFLICT, "duplicate_value"),
            AppError::Db(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            AppError::Decode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "decode_error"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::MethodNotAllowed(_) => (StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed"),
            AppError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
            code,
            details: self.violations(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_messages() {
        let v = Violation::InvalidEnum {
            field: "work".into(),
            allowed: vec!["chef".into(), "waiter".into()],
        };
        assert_eq!(v.to_string(), "work must be one of: chef, waiter");
        let v = Violation::TypeMismatch {
            field: "salary".into(),
            expected: FieldType::Number,
        };
        assert_eq!(v.to_string(), "salary must be of type number");
    }

    #[test]
    fn duplicates_only_become_conflict() {
        let dup = Violation::DuplicateValue { field: "email".into() };
        let missing = Violation::MissingField { field: "name".into() };

        let err = AppError::from_violations(vec![dup.clone()]);
        assert!(matches!(err, AppError::Duplicate(_)));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);

        let err = AppError::from_violations(vec![missing, dup]);
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(
            err.to_string(),
            "validation failed: name is required; email already exists"
        );
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn violation_serializes_with_kind_tag() {
        let v = Violation::MissingField { field: "email".into() };
        assert_eq!(
            serde_json::to_value(&v).unwrap(),
            serde_json::json!({ "kind": "missing_field", "field": "email" })
        );
    }

    #[test]
    fn status_mapping() {
        assert_eq!(AppError::NotFound("x".into()).into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::BadRequest("x".into()).into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::MethodNotAllowed("x".into()).into_response().status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            AppError::PayloadTooLarge("x".into()).into_response().status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            AppError::Db(sqlx::Error::PoolTimedOut).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
