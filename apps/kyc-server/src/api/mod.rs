// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderName,
    routing::{get, post},
    Router,
};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{
        ApplicationStatus, ApplicationSubmission, ApplicationView, BreakdownEntry, CheckResult,
        CheckStatus, CheckType, DocumentSide, DocumentType, DocumentView, IdType, PostalAddress,
        ProviderApplicant, ReviewDecision, VerificationCheck,
    },
    providers::ProviderKind,
    service::{EventSource, IngestOutcome},
    state::AppState,
};

pub mod health;
pub mod verification;
pub mod webhooks;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let v1_routes = Router::new()
        .route("/webhooks", post(webhooks::receive_default_webhook))
        .route("/webhooks/{provider}", post(webhooks::receive_provider_webhook))
        .route(
            "/organizations/{organization_id}/application",
            get(verification::get_application).post(verification::submit_application),
        )
        .route(
            "/organizations/{organization_id}/verification",
            post(verification::initiate_verification),
        )
        .route(
            "/organizations/{organization_id}/documents",
            post(verification::submit_document)
                .layer(DefaultBodyLimit::max(verification::MAX_DOCUMENT_BYTES)),
        )
        .route(
            "/organizations/{organization_id}/documents/{index}/url",
            get(verification::document_download_url),
        )
        .route(
            "/organizations/{organization_id}/check",
            post(verification::create_check).delete(verification::cancel_check),
        )
        .route(
            "/organizations/{organization_id}/review",
            post(verification::record_review_decision),
        )
        .route("/checks/{check_id}", get(verification::get_check_status));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        webhooks::receive_provider_webhook,
        webhooks::receive_default_webhook,
        verification::submit_application,
        verification::get_application,
        verification::initiate_verification,
        verification::submit_document,
        verification::document_download_url,
        verification::create_check,
        verification::cancel_check,
        verification::get_check_status,
        verification::record_review_decision
    ),
    components(
        schemas(
            health::ReadinessReport,
            health::ComponentProbes,
            health::ProbeStatus,
            health::LivenessReport,
            webhooks::WebhookAck,
            verification::DocumentUrlResponse,
            ApplicationSubmission,
            ApplicationView,
            ApplicationStatus,
            IdType,
            PostalAddress,
            ProviderKind,
            ProviderApplicant,
            VerificationCheck,
            CheckType,
            CheckStatus,
            CheckResult,
            BreakdownEntry,
            DocumentType,
            DocumentSide,
            DocumentView,
            ReviewDecision,
            IngestOutcome,
            EventSource
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Webhooks", description = "Signed vendor callbacks"),
        (name = "Verification", description = "Verification lifecycle operations")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support::simulated_harness;
    use std::sync::Arc;

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let app = router(AppState::new(Arc::new(simulated_harness().service)));
        let _ = app.into_make_service();
    }

    #[tokio::test]
    async fn document_route_accepts_full_size_scans() {
        use axum::body::Body;
        use axum::http::{Request, StatusCode};
        use tower::ServiceExt;

        let app = router(AppState::new(Arc::new(simulated_harness().service)));
        let oversized = Request::post(
            "/v1/organizations/org-1/documents?document_type=PASSPORT&file_name=scan.jpg",
        )
        .header("content-type", "image/jpeg")
        .body(Body::from(vec![0u8; verification::MAX_DOCUMENT_BYTES + 1]))
        .unwrap();
        let response = app.clone().oneshot(oversized).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        // Above axum's 2 MB default: reaches the handler, which finds no application.
        let scan = Request::post(
            "/v1/organizations/org-1/documents?document_type=PASSPORT&file_name=scan.jpg",
        )
        .header("content-type", "image/jpeg")
        .body(Body::from(vec![0u8; 8 * 1024 * 1024]))
        .unwrap();
        let response = app.oneshot(scan).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn openapi_lists_webhook_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/v1/webhooks/{provider}"));
        assert!(doc.paths.paths.contains_key("/v1/webhooks"));
    }
}
