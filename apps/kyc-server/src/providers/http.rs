// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared HTTP plumbing for live vendor adapters.

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use super::retry::{RawResponse, RetryPolicy};
use super::{ProviderError, ProviderKind};

/// Retrying HTTP client bound to one vendor base URL.
#[derive(Debug, Clone)]
pub struct VendorHttp {
    provider: ProviderKind,
    base_url: String,
    client: Client,
    policy: RetryPolicy,
}

impl VendorHttp {
    pub fn new(
        provider: ProviderKind,
        base_url: &str,
        policy: RetryPolicy,
    ) -> Result<Self, ProviderError> {
        // The retry policy owns the per-attempt timeout.
        let client = Client::builder()
            .user_agent(concat!("kyc-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Client {
                provider,
                detail: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            policy,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request built fresh for every attempt.
    pub async fn send<F>(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        build: F,
    ) -> Result<RawResponse, ProviderError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let url = self.url(path);
        self.policy
            .execute(self.provider, operation, || {
                let request = build(self.client.request(method.clone(), &url));
                async move {
                    let response = request.send().await?;
                    let status = response.status();
                    let headers = response.headers().clone();
                    let body = response.bytes().await?.to_vec();
                    Ok::<_, reqwest::Error>(RawResponse {
                        status,
                        headers,
                        body,
                    })
                }
            })
            .await
    }

    /// Send and decode a JSON response body.
    pub async fn send_json<T, F>(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        build: F,
    ) -> Result<T, ProviderError>
    where
        T: DeserializeOwned,
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let response = self.send(operation, method, path, build).await?;
        decode_json(self.provider, operation, &response)
    }
}

pub fn decode_json<T: DeserializeOwned>(
    provider: ProviderKind,
    operation: &'static str,
    response: &RawResponse,
) -> Result<T, ProviderError> {
    if response.body.is_empty() {
        return serde_json::from_value(Value::Null).map_err(|e| {
            ProviderError::invalid_response(provider, operation, format!("empty body: {e}"))
        });
    }
    serde_json::from_slice(&response.body).map_err(|e| {
        ProviderError::invalid_response(provider, operation, format!("invalid JSON: {e}"))
    })
}

/// `multipart/form-data` body built in memory.
///
/// The exact bytes are known before sending, so request signatures that
/// cover the body can be computed over them.
#[derive(Debug, Clone)]
pub struct MultipartBody {
    boundary: String,
    body: Vec<u8>,
}

impl Default for MultipartBody {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartBody {
    pub fn new() -> Self {
        Self {
            boundary: format!("kyc-{}", Uuid::new_v4().simple()),
            body: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.open_part();
        self.body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", escape(name))
                .as_bytes(),
        );
        self.body.extend_from_slice(value.as_bytes());
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.open_part();
        self.body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                escape(name),
                escape(file_name),
                content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Close the body and return its bytes.
    pub fn finish(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (self.content_type(), self.body)
    }

    fn open_part(&mut self) {
        self.body
            .extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
    }
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipart_body_is_well_formed() {
        let (content_type, body) = MultipartBody::new()
            .text("type", "passport")
            .file("file", "pass\"port.png", "image/png", &[0x89, 0x50])
            .finish();

        let boundary = content_type
            .strip_prefix("multipart/form-data; boundary=")
            .unwrap()
            .to_string();
        let text = String::from_utf8_lossy(&body);
        assert!(text.starts_with(&format!("--{boundary}\r\n")));
        assert!(text.contains("name=\"type\"\r\n\r\npassport\r\n"));
        assert!(text.contains("filename=\"pass\\\"port.png\""));
        assert!(text.ends_with(&format!("--{boundary}--\r\n")));
    }

    #[test]
    fn url_joins_without_double_slash() {
        let http = VendorHttp::new(
            ProviderKind::Onfido,
            "https://api.eu.onfido.com/",
            RetryPolicy::default(),
        )
        .unwrap();
        assert_eq!(
            http.url("/v3.6/applicants"),
            "https://api.eu.onfido.com/v3.6/applicants"
        );
    }
}
