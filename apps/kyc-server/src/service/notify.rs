// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Notification collaborator that emits one structured log line per notice.
//! Actual e-mail dispatch is performed by a separate service that consumes
//! these lines.

use async_trait::async_trait;
use tracing::info;

use super::ports::{Notice, Notifier, NotifyError};
use crate::models::ApplicationStatus;

/// Message template selected by the new status.
pub fn template_for(status: ApplicationStatus) -> &'static str {
    match status {
        ApplicationStatus::Approved => "kyc_approved",
        ApplicationStatus::Rejected => "kyc_rejected",
        ApplicationStatus::DocumentsSubmitted | ApplicationStatus::UnderReview => {
            "kyc_pending_review"
        }
        ApplicationStatus::NotStarted => "kyc_not_started",
    }
}

#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notice: &Notice) -> Result<(), NotifyError> {
        info!(
            target: "kyc::notifications",
            organization_id = %notice.organization_id,
            application_id = %notice.application_id,
            status = %notice.status,
            template = template_for(notice.status),
            simulated = notice.simulated,
            summary = %notice.summary,
            "verification notice"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_follow_status() {
        assert_eq!(template_for(ApplicationStatus::Approved), "kyc_approved");
        assert_eq!(template_for(ApplicationStatus::Rejected), "kyc_rejected");
        assert_eq!(
            template_for(ApplicationStatus::UnderReview),
            "kyc_pending_review"
        );
    }

    #[tokio::test]
    async fn tracing_notifier_never_fails() {
        let notice = Notice {
            organization_id: "org-1".to_string(),
            application_id: "app-1".to_string(),
            status: ApplicationStatus::Approved,
            summary: "Verification approved".to_string(),
            simulated: true,
        };
        assert!(TracingNotifier.notify(&notice).await.is_ok());
    }
}
