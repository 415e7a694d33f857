// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Liveness and readiness probes.
//!
//! Readiness fails when the data directory cannot be written, the
//! simulation queue cannot be read, or no adapter serves the default
//! provider.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::state::AppState;

/// Outcome of one component probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Ok,
    Unavailable,
    /// Component not used by this deployment.
    Skipped,
}

impl ProbeStatus {
    fn passing(self) -> bool {
        self != ProbeStatus::Unavailable
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ComponentProbes {
    pub storage: ProbeStatus,
    pub queue: ProbeStatus,
    /// Pending simulated completions, when a queue is attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queued_tasks: Option<usize>,
    pub provider: ProbeStatus,
}

/// Readiness report.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadinessReport {
    /// "ready" or "degraded".
    pub status: String,
    pub default_provider: String,
    pub simulated: bool,
    pub components: ComponentProbes,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LivenessReport {
    pub status: String,
}

fn probe(state: &AppState) -> ReadinessReport {
    let storage = match state.storage() {
        None => ProbeStatus::Skipped,
        Some(storage) => match storage.health_check() {
            Ok(()) => ProbeStatus::Ok,
            Err(e) => {
                warn!(error = %e, "Storage probe failed");
                ProbeStatus::Unavailable
            }
        },
    };

    let (queue, queued_tasks) = match state.service().queue() {
        None => (ProbeStatus::Skipped, None),
        Some(queue) => match queue.all() {
            Ok(tasks) => (ProbeStatus::Ok, Some(tasks.len())),
            Err(e) => {
                warn!(error = %e, "Simulation queue probe failed");
                (ProbeStatus::Unavailable, None)
            }
        },
    };

    let registry = state.service().registry();
    let active = registry.active();
    let provider = if active.is_some() {
        ProbeStatus::Ok
    } else {
        ProbeStatus::Unavailable
    };

    let components = ComponentProbes {
        storage,
        queue,
        queued_tasks,
        provider,
    };
    let ready = [components.storage, components.queue, components.provider]
        .iter()
        .all(|p| p.passing());

    ReadinessReport {
        status: if ready { "ready" } else { "degraded" }.to_string(),
        default_provider: registry.default_kind().to_string(),
        simulated: active.is_some_and(|adapter| adapter.is_simulated()),
        components,
    }
}

/// Always 200 while the process is running.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses((status = 200, description = "Process is up", body = LivenessReport))
)]
pub async fn liveness() -> Json<LivenessReport> {
    Json(LivenessReport {
        status: "alive".to_string(),
    })
}

/// 200 when every component probe passes, 503 otherwise.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Ready to serve", body = ReadinessReport),
        (status = 503, description = "A component is unavailable", body = ReadinessReport)
    )
)]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadinessReport>) {
    let report = probe(&state);
    let code = if report.status == "ready" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}

/// Alias of readiness for load balancers that probe `/health`.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Ready to serve", body = ReadinessReport),
        (status = 503, description = "A component is unavailable", body = ReadinessReport)
    )
)]
pub async fn health(state: State<AppState>) -> (StatusCode, Json<ReadinessReport>) {
    readiness(state).await
}
