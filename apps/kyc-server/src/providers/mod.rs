// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Verification Vendor Adapters
//!
//! Every vendor integration implements [`VerificationProvider`], translating
//! the canonical verification contract into the vendor's own request and
//! response shapes and its webhook signature scheme.
//!
//! ## Adapters
//!
//! | Kind | Auth | Webhook signature |
//! |------|------|-------------------|
//! | [`ProviderKind::Onfido`] | bearer token | bare hex in `X-SHA2-Signature` |
//! | [`ProviderKind::Jumio`] | HTTP basic | `sha256=<hex>` in `X-Jumio-Signature` |
//! | [`ProviderKind::Sumsub`] | HMAC request signing | lowercase hex in `X-Payload-Digest` |
//!
//! Without credentials (or outside production) an adapter runs in
//! simulation mode and never touches the network; see [`simulation`].

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use utoipa::ToSchema;

use crate::models::{
    CanonicalWebhookEvent, CheckStatus, CheckType, DocumentSide, DocumentType, PostalAddress,
    VerificationReport,
};

pub mod http;
pub mod jumio;
pub mod onfido;
pub mod registry;
pub mod retry;
pub mod simulation;
pub mod sumsub;

#[cfg(test)]
pub(crate) mod test_support;

pub use registry::ProviderRegistry;
pub use retry::RetryPolicy;

type HmacSha256 = Hmac<Sha256>;

/// Closed set of supported verification vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Onfido,
    Jumio,
    Sumsub,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Onfido,
        ProviderKind::Jumio,
        ProviderKind::Sumsub,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Onfido => "onfido",
            ProviderKind::Jumio => "jumio",
            ProviderKind::Sumsub => "sumsub",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "onfido" => Ok(ProviderKind::Onfido),
            "jumio" => Ok(ProviderKind::Jumio),
            "sumsub" => Ok(ProviderKind::Sumsub),
            other => Err(format!("unknown verification provider: {other}")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} rejected {operation} with HTTP {status}: {detail}")]
    Rejected {
        provider: ProviderKind,
        operation: &'static str,
        status: u16,
        detail: String,
    },

    #[error("{provider} {operation} failed after {attempts} attempt(s): {detail}")]
    Exhausted {
        provider: ProviderKind,
        operation: &'static str,
        attempts: u32,
        detail: String,
    },

    #[error("{provider} returned an invalid response for {operation}: {detail}")]
    InvalidResponse {
        provider: ProviderKind,
        operation: &'static str,
        detail: String,
    },

    #[error("{provider} webhook payload is invalid: {detail}")]
    InvalidWebhook {
        provider: ProviderKind,
        detail: String,
    },

    #[error("{provider} client could not be built: {detail}")]
    Client {
        provider: ProviderKind,
        detail: String,
    },
}

impl ProviderError {
    pub(crate) fn invalid_response(
        provider: ProviderKind,
        operation: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        ProviderError::InvalidResponse {
            provider,
            operation,
            detail: detail.into(),
        }
    }

    pub(crate) fn invalid_webhook(provider: ProviderKind, detail: impl Into<String>) -> Self {
        ProviderError::InvalidWebhook {
            provider,
            detail: detail.into(),
        }
    }
}

// =============================================================================
// Contract Types
// =============================================================================

/// Organization data used to open a vendor applicant.
#[derive(Debug, Clone)]
pub struct ApplicantProfile {
    /// Our organization id, sent as the vendor's external reference.
    pub external_id: String,
    pub legal_name: String,
    pub email: String,
    pub address: Option<PostalAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicantRecord {
    pub id: String,
    pub href: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub document_type: DocumentType,
    pub side: Option<DocumentSide>,
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedDocument {
    pub id: String,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRecord {
    pub id: String,
    pub status: CheckStatus,
    pub created_at: DateTime<Utc>,
}

/// Canonical verification contract implemented by every vendor adapter.
#[async_trait]
pub trait VerificationProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// True when no network calls are made and responses are synthetic.
    fn is_simulated(&self) -> bool;

    /// HTTP header carrying this vendor's webhook signature.
    fn signature_header(&self) -> &'static str;

    /// Shared secret for webhook signatures, when configured.
    fn webhook_secret(&self) -> Option<&str>;

    async fn create_applicant(
        &self,
        profile: &ApplicantProfile,
    ) -> Result<ApplicantRecord, ProviderError>;

    async fn upload_document(
        &self,
        applicant_id: &str,
        document: &DocumentUpload,
    ) -> Result<UploadedDocument, ProviderError>;

    async fn create_check(
        &self,
        applicant_id: &str,
        check_types: &[CheckType],
    ) -> Result<CheckRecord, ProviderError>;

    async fn get_check(&self, check_id: &str) -> Result<VerificationReport, ProviderError>;

    async fn cancel_check(&self, check_id: &str) -> Result<(), ProviderError>;

    async fn document_download_url(&self, document_id: &str) -> Result<String, ProviderError>;

    /// Constant-time HMAC-SHA256 check of `payload` against the header value.
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str, secret: &str) -> bool;

    fn parse_webhook(&self, payload: &[u8]) -> Result<CanonicalWebhookEvent, ProviderError>;
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// Raw HMAC-SHA256 digest.
pub(crate) fn hmac_sha256(secret: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Compare an HMAC-SHA256 over `payload` with `expected` in constant time.
pub(crate) fn verify_hmac_sha256(secret: &str, payload: &[u8], expected: &[u8]) -> bool {
    let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(expected).is_ok()
}

/// Maximum number of characters of a vendor error body kept in errors and logs.
const REDACTED_BODY_LIMIT: usize = 256;

/// Truncate a vendor response body and mask the PII it may echo back.
///
/// Runs of four or more digits and e-mail local parts become `***`.
pub fn redact_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let chars: Vec<char> = text.chars().take(REDACTED_BODY_LIMIT).collect();

    let mut masked = vec![false; chars.len()];
    for (at, ch) in chars.iter().enumerate() {
        if *ch != '@' {
            continue;
        }
        let mut i = at;
        while i > 0 && is_local_part_char(chars[i - 1]) {
            i -= 1;
            masked[i] = true;
        }
    }
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            if i - start >= 4 {
                masked[start..i].iter_mut().for_each(|m| *m = true);
            }
        } else {
            i += 1;
        }
    }

    let mut out = String::with_capacity(chars.len());
    let mut in_mask = false;
    for (ch, hide) in chars.iter().zip(&masked) {
        if *hide {
            if !in_mask {
                out.push_str("***");
            }
            in_mask = true;
        } else {
            out.push(*ch);
            in_mask = false;
        }
    }
    if text.chars().count() > REDACTED_BODY_LIMIT {
        out.push_str("...");
    }
    out
}

fn is_local_part_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '+' | '-' | '%')
}

/// Parse a vendor timestamp, accepting RFC 3339 and `YYYY-MM-DD HH:MM:SS`.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Split an organization name into the first/last name pair some vendors require.
pub(crate) fn split_name(legal_name: &str) -> (String, String) {
    let trimmed = legal_name.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((first, rest)) if !rest.trim().is_empty() => {
            (first.to_string(), rest.trim().to_string())
        }
        _ => (trimmed.to_string(), trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parses_case_insensitively() {
        assert_eq!("Onfido".parse::<ProviderKind>(), Ok(ProviderKind::Onfido));
        assert_eq!(" sumsub ".parse::<ProviderKind>(), Ok(ProviderKind::Sumsub));
        assert!("veriff".parse::<ProviderKind>().is_err());
        for kind in ProviderKind::ALL {
            assert_eq!(kind.to_string().parse::<ProviderKind>(), Ok(kind));
        }
    }

    #[test]
    fn hmac_verification_is_exact() {
        let digest = hmac_sha256(b"secret", b"payload");
        assert!(verify_hmac_sha256("secret", b"payload", &digest));
        assert!(!verify_hmac_sha256("other", b"payload", &digest));
        assert!(!verify_hmac_sha256("secret", b"payload!", &digest));
        assert!(!verify_hmac_sha256("secret", b"payload", &digest[..16]));
    }

    #[test]
    fn redact_masks_digits_and_email_local_parts() {
        let body = br#"{"error":"applicant jane.doe@example.com with tax id 123456789 exists","code":42}"#;
        let redacted = redact_body(body);
        assert!(!redacted.contains("jane.doe"));
        assert!(!redacted.contains("123456789"));
        assert!(redacted.contains("***@example.com"));
        assert!(redacted.contains("\"code\":42"));
    }

    #[test]
    fn redact_truncates_long_bodies() {
        let body = "x".repeat(1000);
        let redacted = redact_body(body.as_bytes());
        assert_eq!(redacted.len(), REDACTED_BODY_LIMIT + 3);
        assert!(redacted.ends_with("..."));
    }

    #[test]
    fn timestamps_accept_both_vendor_formats() {
        assert!(parse_timestamp("2026-03-01T10:00:00Z").is_some());
        assert!(parse_timestamp("2026-03-01T10:00:00.123+01:00").is_some());
        assert!(parse_timestamp("2026-03-01 10:00:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn split_name_handles_single_word_names() {
        assert_eq!(
            split_name("Acme Holdings Ltd"),
            ("Acme".to_string(), "Holdings Ltd".to_string())
        );
        assert_eq!(split_name("Acme"), ("Acme".to_string(), "Acme".to_string()));
    }
}
