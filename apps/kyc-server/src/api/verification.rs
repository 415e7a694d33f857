// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Orchestration operations for internal callers.
//!
//! Authentication happens upstream of this service. The acting user is read
//! from `X-Actor-Id` and the client address from `X-Forwarded-For` so that
//! audit records carry them.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::ApiError,
    models::{
        ApplicationSubmission, ApplicationView, DocumentSide, DocumentType, DocumentView,
        ProviderApplicant, ReviewDecision, VerificationCheck,
    },
    service::{DocumentSubmission, IngestOutcome, RequestContext},
    state::AppState,
};

pub const ACTOR_HEADER: &str = "x-actor-id";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Upload ceiling for one identity document (high-resolution scans and PDFs).
pub const MAX_DOCUMENT_BYTES: usize = 25 * 1024 * 1024;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Caller identity and address for the audit trail.
pub fn request_context(headers: &HeaderMap) -> RequestContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let ip_address = header(FORWARDED_FOR_HEADER)
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    RequestContext::new(header(ACTOR_HEADER).map(str::to_string), ip_address)
}

/// Query parameters accompanying a raw document upload.
#[derive(Debug, Deserialize, IntoParams)]
pub struct DocumentUploadParams {
    pub document_type: DocumentType,
    #[serde(default)]
    pub side: Option<DocumentSide>,
    pub file_name: String,
}

/// Short-lived download link for a stored document.
#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentUrlResponse {
    pub url: String,
}

/// Submit or resubmit an organization's application.
#[utoipa::path(
    post,
    path = "/v1/organizations/{organization_id}/application",
    tag = "Verification",
    params(("organization_id" = String, Path, description = "Organization ID")),
    request_body = ApplicationSubmission,
    responses(
        (status = 200, description = "Application stored", body = ApplicationView),
        (status = 422, description = "Invalid submission or status"),
        (status = 503, description = "Concurrent update")
    )
)]
pub async fn submit_application(
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
    headers: HeaderMap,
    Json(submission): Json<ApplicationSubmission>,
) -> Result<Json<ApplicationView>, ApiError> {
    let ctx = request_context(&headers);
    let view = state
        .service()
        .submit_application(&organization_id, submission, &ctx)
        .await?;
    Ok(Json(view))
}

/// Fetch the redacted application.
#[utoipa::path(
    get,
    path = "/v1/organizations/{organization_id}/application",
    tag = "Verification",
    params(("organization_id" = String, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Application", body = ApplicationView),
        (status = 404, description = "No application")
    )
)]
pub async fn get_application(
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
) -> Result<Json<ApplicationView>, ApiError> {
    Ok(Json(state.service().get_application(&organization_id).await?))
}

/// Create (or return) the vendor applicant.
#[utoipa::path(
    post,
    path = "/v1/organizations/{organization_id}/verification",
    tag = "Verification",
    params(("organization_id" = String, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Vendor applicant", body = ProviderApplicant),
        (status = 404, description = "No application"),
        (status = 422, description = "Application not in a verifiable status"),
        (status = 502, description = "Vendor call failed")
    )
)]
pub async fn initiate_verification(
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ProviderApplicant>, ApiError> {
    let ctx = request_context(&headers);
    let applicant = state
        .service()
        .initiate_verification(&organization_id, &ctx)
        .await?;
    Ok(Json(applicant))
}

/// Upload one identity document. The body is the raw file.
#[utoipa::path(
    post,
    path = "/v1/organizations/{organization_id}/documents",
    tag = "Verification",
    params(
        ("organization_id" = String, Path, description = "Organization ID"),
        DocumentUploadParams
    ),
    request_body(content = Vec<u8>, description = "Document bytes", content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "Document stored", body = DocumentView),
        (status = 404, description = "No application"),
        (status = 413, description = "Document exceeds the upload ceiling"),
        (status = 422, description = "Empty document or no applicant yet"),
        (status = 502, description = "Vendor upload failed")
    )
)]
pub async fn submit_document(
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
    Query(params): Query<DocumentUploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<DocumentView>), ApiError> {
    let ctx = request_context(&headers);
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();
    let document = DocumentSubmission {
        document_type: params.document_type,
        side: params.side,
        bytes: body.to_vec(),
        file_name: params.file_name,
        content_type,
    };
    let view = state
        .service()
        .submit_document(&organization_id, document, &ctx)
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Issue a download link for a submitted document.
#[utoipa::path(
    get,
    path = "/v1/organizations/{organization_id}/documents/{index}/url",
    tag = "Verification",
    params(
        ("organization_id" = String, Path, description = "Organization ID"),
        ("index" = usize, Path, description = "Position in the submitted document list")
    ),
    responses(
        (status = 200, description = "Download link", body = DocumentUrlResponse),
        (status = 404, description = "No such application or document"),
        (status = 502, description = "Vendor call failed")
    )
)]
pub async fn document_download_url(
    State(state): State<AppState>,
    Path((organization_id, index)): Path<(String, usize)>,
    headers: HeaderMap,
) -> Result<Json<DocumentUrlResponse>, ApiError> {
    let ctx = request_context(&headers);
    let url = state
        .service()
        .document_download_url(&organization_id, index, &ctx)
        .await?;
    Ok(Json(DocumentUrlResponse { url }))
}

/// Start a vendor check over the submitted documents.
#[utoipa::path(
    post,
    path = "/v1/organizations/{organization_id}/check",
    tag = "Verification",
    params(("organization_id" = String, Path, description = "Organization ID")),
    responses(
        (status = 201, description = "Check created", body = VerificationCheck),
        (status = 404, description = "No application"),
        (status = 422, description = "No documents or a check is already open"),
        (status = 502, description = "Vendor call failed")
    )
)]
pub async fn create_check(
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<VerificationCheck>), ApiError> {
    let ctx = request_context(&headers);
    let check = state
        .service()
        .create_verification_check(&organization_id, &ctx)
        .await?;
    Ok((StatusCode::CREATED, Json(check)))
}

/// Cancel the open check.
#[utoipa::path(
    delete,
    path = "/v1/organizations/{organization_id}/check",
    tag = "Verification",
    params(("organization_id" = String, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Check cancelled", body = VerificationCheck),
        (status = 404, description = "No application"),
        (status = 422, description = "No check, or the check already finished"),
        (status = 502, description = "Vendor call failed")
    )
)]
pub async fn cancel_check(
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<VerificationCheck>, ApiError> {
    let ctx = request_context(&headers);
    let check = state
        .service()
        .cancel_verification_check(&organization_id, &ctx)
        .await?;
    Ok(Json(check))
}

/// Poll the vendor for a check and apply the result.
#[utoipa::path(
    get,
    path = "/v1/checks/{check_id}",
    tag = "Verification",
    params(("check_id" = String, Path, description = "Vendor check ID")),
    responses(
        (status = 200, description = "Result applied", body = IngestOutcome),
        (status = 404, description = "Unknown check"),
        (status = 502, description = "Vendor call failed")
    )
)]
pub async fn get_check_status(
    State(state): State<AppState>,
    Path(check_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<IngestOutcome>, ApiError> {
    let ctx = request_context(&headers);
    Ok(Json(state.service().get_check_status(&check_id, &ctx).await?))
}

/// Record a manual reviewer decision.
#[utoipa::path(
    post,
    path = "/v1/organizations/{organization_id}/review",
    tag = "Verification",
    params(("organization_id" = String, Path, description = "Organization ID")),
    request_body = ReviewDecision,
    responses(
        (status = 200, description = "Decision applied", body = ApplicationView),
        (status = 404, description = "No application"),
        (status = 422, description = "Application not under review")
    )
)]
pub async fn record_review_decision(
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
    headers: HeaderMap,
    Json(decision): Json<ReviewDecision>,
) -> Result<Json<ApplicationView>, ApiError> {
    let ctx = request_context(&headers);
    let view = state
        .service()
        .record_review_decision(&organization_id, decision, &ctx)
        .await?;
    Ok(Json(view))
}
