// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured error kinds shared by every subsystem, and their mapping onto
//! the HTTP error envelope.

use std::collections::HashMap;
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// The error kinds the core distinguishes (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Upstream,
    Timeout,
    RateLimited,
    TypeMismatch,
    Internal,
}

impl ErrorKind {
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Upstream => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::TypeMismatch => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::NotFound => "NOT_FOUND",
            Self::Upstream => "UPSTREAM_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::RateLimited => "RATE_LIMITED",
            Self::TypeMismatch => "TYPE_MISMATCH",
            Self::Internal => "INTERNAL",
        }
    }
}

/// A structured error carrying a kind, a message, a retriable flag, and
/// optional context — the common currency every subsystem's operations
/// return instead of raw `anyhow::Error`.
#[derive(Debug, Clone)]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    pub retriable: bool,
    pub context: HashMap<String, String>,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), retriable: false, context: HashMap::new() }
    }

    pub fn retriable(mut self) -> Self {
        self.retriable = true;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message).retriable()
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message).retriable()
    }

    /// Upstream HTTP failure. `retriable` follows the Fetcher's
    /// retriable/terminal classification (spec §4.2).
    pub fn upstream(message: impl Into<String>, retriable: bool) -> Self {
        let mut e = Self::new(ErrorKind::Upstream, message);
        e.retriable = retriable;
        e
    }

    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.message.clone(),
            code: self.kind.as_str().to_owned(),
            details: if self.context.is_empty() {
                None
            } else {
                Some(serde_json::to_value(&self.context).unwrap_or(serde_json::Value::Null))
            },
            timestamp: crate::time::format_rfc3339(crate::time::now_secs()),
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for CoreError {}

/// `{error, code, details, timestamp}` envelope (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub timestamp: String,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.kind.http_status();
        (status, Json(self.to_error_body())).into_response()
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
