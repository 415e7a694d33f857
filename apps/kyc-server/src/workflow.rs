// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Application State Machine
//!
//! ```text
//! NOT_STARTED ──submit──► DOCUMENTS_SUBMITTED ──initiate / create check──► UNDER_REVIEW
//!                                ▲                                            │
//!                                └──────────── CONSIDER / more info ◄─────────┤
//!                                                                             ├──► APPROVED
//! REJECTED ──resubmit──► DOCUMENTS_SUBMITTED                                  └──► REJECTED
//! ```
//!
//! Outcomes (webhook, polling or manual review) only move applications that
//! are `DOCUMENTS_SUBMITTED` or `UNDER_REVIEW`. Everything here is pure and
//! operates on an in-memory [`VerificationApplication`]; persistence belongs
//! to the orchestration service.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::models::{
    ApplicationStatus, BreakdownEntry, CheckResult, CheckStatus, VerificationApplication,
};

/// Validity period of an approval.
pub const APPROVAL_VALIDITY_DAYS: i64 = 365;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("application cannot be submitted while {0}")]
    NotResubmittable(ApplicationStatus),

    #[error("application is {0}; no verification outcome can be applied")]
    NotReviewable(ApplicationStatus),
}

/// Decision reached for an application under review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Approve,
    Reject { reason: String },
    /// Back to `DOCUMENTS_SUBMITTED` for manual follow-up.
    RequestMoreInfo,
}

impl Outcome {
    /// Derive the outcome of a check event.
    ///
    /// Returns `None` for anything that is not a completed check with a
    /// result; such events are recorded but never move the status.
    pub fn from_check(
        status: CheckStatus,
        result: Option<CheckResult>,
        breakdown: &BTreeMap<String, BreakdownEntry>,
    ) -> Option<Self> {
        if !status.is_complete() {
            return None;
        }
        match result? {
            CheckResult::Clear => Some(Outcome::Approve),
            CheckResult::Consider => Some(Outcome::RequestMoreInfo),
            other => Some(Outcome::Reject {
                reason: rejection_reason(other, breakdown),
            }),
        }
    }

    pub fn target_status(&self) -> ApplicationStatus {
        match self {
            Outcome::Approve => ApplicationStatus::Approved,
            Outcome::Reject { .. } => ApplicationStatus::Rejected,
            Outcome::RequestMoreInfo => ApplicationStatus::DocumentsSubmitted,
        }
    }
}

/// A status change applied to an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
}

/// Human-readable rejection reason from a breakdown.
pub fn rejection_reason(
    result: CheckResult,
    breakdown: &BTreeMap<String, BreakdownEntry>,
) -> String {
    let failed: Vec<&str> = breakdown
        .iter()
        .filter(|(_, entry)| entry.result != CheckResult::Clear)
        .map(|(name, _)| name.as_str())
        .collect();

    if failed.is_empty() {
        format!("Verification result: {}", result.as_str())
    } else {
        format!("Verification failed: {}", failed.join(", "))
    }
}

pub fn can_submit(status: ApplicationStatus) -> bool {
    matches!(
        status,
        ApplicationStatus::NotStarted | ApplicationStatus::Rejected
    )
}

pub fn accepts_outcome(status: ApplicationStatus) -> bool {
    matches!(
        status,
        ApplicationStatus::DocumentsSubmitted | ApplicationStatus::UnderReview
    )
}

/// Move a `NOT_STARTED` or `REJECTED` application back to
/// `DOCUMENTS_SUBMITTED`, clearing every field a previous review produced.
///
/// The provider applicant survives; the check and submitted documents do not.
pub fn resubmit(
    app: &mut VerificationApplication,
    now: DateTime<Utc>,
) -> Result<StatusChange, TransitionError> {
    if !can_submit(app.status) {
        return Err(TransitionError::NotResubmittable(app.status));
    }
    let from = app.status;

    app.status = ApplicationStatus::DocumentsSubmitted;
    app.verification_score = None;
    app.id_verified = false;
    app.address_verified = false;
    app.business_verified = false;
    app.reviewed_at = None;
    app.expires_at = None;
    app.rejection_reason = None;
    app.submitted_at = now;
    app.provider_state.check = None;
    app.provider_state.documents.clear();

    Ok(StatusChange {
        from,
        to: ApplicationStatus::DocumentsSubmitted,
    })
}

/// `DOCUMENTS_SUBMITTED -> UNDER_REVIEW`. A no-op in any other state.
pub fn begin_review(app: &mut VerificationApplication) -> Option<StatusChange> {
    if app.status != ApplicationStatus::DocumentsSubmitted {
        return None;
    }
    app.status = ApplicationStatus::UnderReview;
    Some(StatusChange {
        from: ApplicationStatus::DocumentsSubmitted,
        to: ApplicationStatus::UnderReview,
    })
}

/// Apply a verification outcome with all of its side effects.
pub fn apply_outcome(
    app: &mut VerificationApplication,
    outcome: &Outcome,
    now: DateTime<Utc>,
) -> Result<StatusChange, TransitionError> {
    if !accepts_outcome(app.status) {
        return Err(TransitionError::NotReviewable(app.status));
    }
    let from = app.status;

    match outcome {
        Outcome::Approve => {
            app.status = ApplicationStatus::Approved;
            app.id_verified = true;
            app.address_verified = true;
            app.business_verified = true;
            app.expires_at = Some(now + Duration::days(APPROVAL_VALIDITY_DAYS));
            app.rejection_reason = None;
        }
        Outcome::Reject { reason } => {
            app.status = ApplicationStatus::Rejected;
            app.expires_at = None;
            app.rejection_reason = Some(reason.clone());
        }
        Outcome::RequestMoreInfo => {
            app.status = ApplicationStatus::DocumentsSubmitted;
            app.expires_at = None;
        }
    }
    app.reviewed_at = Some(now);

    Ok(StatusChange {
        from,
        to: app.status,
    })
}
