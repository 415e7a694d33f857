// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Vendor webhook ingress.
//!
//! The raw body is handed to the orchestration service untouched so the
//! adapter can verify the HMAC over the exact bytes the vendor signed. A
//! 200 is returned only after the resulting update has been persisted; any
//! failure yields a non-2xx status so the vendor redelivers.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::{ApiError, KycError},
    providers::ProviderKind,
    state::AppState,
};

/// Acknowledgement returned to the vendor.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    /// Always "accepted".
    pub status: String,
}

async fn receive(
    state: &AppState,
    provider: Option<ProviderKind>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Json<WebhookAck>, ApiError> {
    let service = state.service();
    let adapter = service.registry().resolve(provider).ok_or_else(|| {
        KycError::Configuration(format!(
            "no adapter registered for provider {}",
            provider.unwrap_or(service.registry().default_kind())
        ))
    })?;
    let signature = headers
        .get(adapter.signature_header())
        .and_then(|value| value.to_str().ok());

    service
        .process_webhook(body, signature, Some(adapter.kind()))
        .await?;

    Ok(Json(WebhookAck {
        status: "accepted".to_string(),
    }))
}

/// Receive a webhook from a named vendor.
#[utoipa::path(
    post,
    path = "/v1/webhooks/{provider}",
    tag = "Webhooks",
    params(("provider" = String, Path, description = "onfido, jumio or sumsub")),
    request_body(content = String, description = "Raw vendor payload", content_type = "application/json"),
    responses(
        (status = 200, description = "Event persisted", body = WebhookAck),
        (status = 401, description = "Missing or invalid signature"),
        (status = 404, description = "Unknown provider or application"),
        (status = 422, description = "Malformed event"),
        (status = 502, description = "Vendor lookup failed"),
        (status = 503, description = "Provider not configured or storage conflict")
    )
)]
pub async fn receive_provider_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let kind: ProviderKind = provider.parse().map_err(ApiError::not_found)?;
    receive(&state, Some(kind), &headers, &body).await
}

/// Receive a webhook for the default vendor.
#[utoipa::path(
    post,
    path = "/v1/webhooks",
    tag = "Webhooks",
    request_body(content = String, description = "Raw vendor payload", content_type = "application/json"),
    responses(
        (status = 200, description = "Event persisted", body = WebhookAck),
        (status = 401, description = "Missing or invalid signature"),
        (status = 404, description = "Unknown application"),
        (status = 422, description = "Malformed event"),
        (status = 503, description = "Provider not configured or storage conflict")
    )
)]
pub async fn receive_default_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    receive(&state, None, &headers, &body).await
}
