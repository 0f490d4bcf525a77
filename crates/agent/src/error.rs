// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

/// Error codes surfaced at the HTTP/WS boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiError {
    Unauthorized,
    Forbidden,
    BadRequest,
    InvalidFilter,
    NotFound,
    Conflict,
    Busy,
    AttachmentConflict,
    NoContainer,
    OutboxFull,
    NodeStopping,
    UpstreamError,
    Internal,
}

impl ApiError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::BadRequest | Self::InvalidFilter => 400,
            Self::NotFound => 404,
            Self::Conflict | Self::Busy | Self::AttachmentConflict | Self::NodeStopping => 409,
            Self::NoContainer | Self::OutboxFull => 503,
            Self::UpstreamError => 502,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::BadRequest => "BAD_REQUEST",
            Self::InvalidFilter => "INVALID_FILTER",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Busy => "BUSY",
            Self::AttachmentConflict => "ATTACHMENT_CONFLICT",
            Self::NoContainer => "NO_CONTAINER",
            Self::OutboxFull => "OUTBOX_FULL",
            Self::NodeStopping => "NODE_STOPPING",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed failure carried through `anyhow` so handlers can map subsystem
/// errors to the right status without string matching.
#[derive(Debug, Clone)]
pub struct ApiFailure {
    pub code: ApiError,
    pub message: String,
}

impl ApiFailure {
    pub fn new(code: ApiError, message: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(Self { code, message: message.into() })
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiFailure {}

/// Map any error to an HTTP response, using the typed failure when one is
/// attached and 500 otherwise.
pub fn error_response(e: &anyhow::Error) -> (StatusCode, Json<ErrorResponse>) {
    if let Some(failure) = e.downcast_ref::<ApiFailure>() {
        return failure.code.to_http_response(failure.message.clone());
    }
    if e.downcast_ref::<crate::container::NoContainerFound>().is_some() {
        return ApiError::NoContainer.to_http_response(e.to_string());
    }
    ApiError::Internal.to_http_response(e.to_string())
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
