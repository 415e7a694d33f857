// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! KYC Orchestration Service
//!
//! Drives an organization's identity-verification application through one
//! of several third-party verification vendors (Onfido, Jumio, Sumsub),
//! ingests their signed webhooks and keeps sensitive fields encrypted at
//! rest.
//!
//! ## Modules
//!
//! - `api` - Webhook ingress and internal operations (Axum)
//! - `crypto` - AES-256-GCM field encryption and masking
//! - `providers` - Vendor adapters, retry executor and registry
//! - `service` - Verification lifecycle orchestration
//! - `scoring` / `workflow` - Pure scoring and status transitions
//! - `queue` / `simulation_worker` - Durable simulated check completion
//! - `storage` - File-backed and in-memory collaborators

pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod models;
pub mod providers;
pub mod queue;
pub mod scoring;
pub mod service;
pub mod simulation_worker;
pub mod state;
pub mod storage;
pub mod workflow;
