// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Synthetic vendor responses for simulation mode.
//!
//! Every identifier carries a `sim_` prefix and every check completes
//! `CLEAR`, so simulated applications can be told apart from real decisions
//! both by their ids and by the `simulated` flag in the provider state.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::{ApplicantRecord, CheckRecord, ProviderKind, UploadedDocument};
use crate::models::{
    category, BreakdownEntry, CheckResult, CheckStatus, CheckType, VerificationReport,
};

pub const ID_PREFIX: &str = "sim_";
pub const URL_SCHEME: &str = "simulated://";

pub fn is_simulated_id(id: &str) -> bool {
    id.starts_with(ID_PREFIX)
}

fn new_id(kind: &str) -> String {
    format!("{ID_PREFIX}{kind}_{}", Uuid::new_v4().simple())
}

pub fn applicant(provider: ProviderKind) -> ApplicantRecord {
    let id = new_id("app");
    ApplicantRecord {
        href: format!("{URL_SCHEME}{provider}/applicants/{id}"),
        id,
        created_at: Utc::now(),
    }
}

pub fn document(provider: ProviderKind) -> UploadedDocument {
    let id = new_id("doc");
    UploadedDocument {
        href: download_url(provider, &id),
        id,
    }
}

pub fn check() -> CheckRecord {
    CheckRecord {
        id: new_id("chk"),
        status: CheckStatus::InProgress,
        created_at: Utc::now(),
    }
}

pub fn download_url(provider: ProviderKind, document_id: &str) -> String {
    format!("{URL_SCHEME}{provider}/documents/{document_id}")
}

/// Breakdown categories evaluated for a check type.
pub fn categories_for(check_type: CheckType) -> &'static [&'static str] {
    match check_type {
        CheckType::Document => &[category::DOCUMENT_AUTHENTICITY],
        CheckType::Identity => &[category::IDENTITY_RECORD],
        CheckType::FacialSimilarity => &[category::FACE_COMPARISON, category::LIVENESS_CHECK],
        CheckType::ProofOfAddress => &[category::ADDRESS_VERIFICATION],
    }
}

/// A completed, all-clear report covering every requested check type.
pub fn completed_report(
    check_id: &str,
    applicant_id: Option<&str>,
    check_types: &[CheckType],
) -> VerificationReport {
    let breakdown: BTreeMap<String, BreakdownEntry> = check_types
        .iter()
        .flat_map(|t| categories_for(*t).iter())
        .map(|name| {
            (
                name.to_string(),
                BreakdownEntry::new(CheckResult::Clear, json!({ "simulated": true })),
            )
        })
        .collect();

    VerificationReport {
        check_id: check_id.to_string(),
        applicant_id: applicant_id.map(str::to_string),
        status: CheckStatus::Complete,
        result: Some(CheckResult::Clear),
        breakdown,
        completed_at: Some(Utc::now()),
    }
}
