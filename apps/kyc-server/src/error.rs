// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::crypto::CryptoError;
use crate::providers::ProviderError;
use crate::queue::QueueError;
use crate::storage::StorageError;
use crate::workflow::TransitionError;

/// Error taxonomy of the orchestration core.
#[derive(Debug, thiserror::Error)]
pub enum KycError {
    /// A precondition of the operation does not hold.
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Webhook authenticity could not be established.
    #[error("webhook signature rejected: {0}")]
    Signature(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Encryption(#[from] CryptoError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl KycError {
    pub fn validation(message: impl Into<String>) -> Self {
        KycError::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        KycError::NotFound(what.into())
    }
}

impl From<TransitionError> for KycError {
    fn from(e: TransitionError) -> Self {
        KycError::Validation(e.to_string())
    }
}

impl From<QueueError> for KycError {
    fn from(e: QueueError) -> Self {
        KycError::Storage(StorageError::Backend(e.to_string()))
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<KycError> for ApiError {
    fn from(err: KycError) -> Self {
        match err {
            KycError::Validation(msg) => ApiError::unprocessable(msg),
            KycError::NotFound(what) => ApiError::not_found(format!("{what} not found")),
            KycError::Signature(_) => ApiError::unauthorized("Invalid webhook signature"),
            KycError::Provider(e) => {
                tracing::warn!(error = %e, "verification provider call failed");
                ApiError::bad_gateway("Verification provider request failed")
            }
            KycError::Encryption(e) => {
                tracing::error!(error = %e, "field encryption failure");
                ApiError::internal("Encryption failure")
            }
            KycError::Configuration(msg) => {
                tracing::error!(error = %msg, "service misconfigured");
                ApiError::unavailable("Service not configured")
            }
            KycError::Storage(e) if e.is_conflict() => {
                ApiError::unavailable("Concurrent update, retry the request")
            }
            KycError::Storage(e) => {
                tracing::error!(error = %e, "storage failure");
                ApiError::internal("Storage failure")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}
