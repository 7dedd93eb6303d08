//! Overseerr mediation authority.
//!
//! Implements [`MediationAuthority`] against the Overseerr v1 request API:
//! - `GET /api/v1/request/{id}` for the canonical status
//! - `POST /api/v1/request/{id}/approve` and `/decline` for decisions
//!
//! A request Overseerr does not know about (HTTP 404) reports as
//! [`AuthorityStatus::Unknown`] so sweeps leave it pending.

use std::time::Duration;

use async_trait::async_trait;
use greenlight_types::config::AuthorityConfig;
use greenlight_types::errors::GreenlightError;
use greenlight_types::traits::MediationAuthority;
use greenlight_types::{AuthorityStatus, RequestId};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

const API_KEY_HEADER: &str = "X-Api-Key";

/// Overseerr request status codes.
const STATUS_PENDING: u8 = 1;
const STATUS_APPROVED: u8 = 2;
const STATUS_DECLINED: u8 = 3;

pub struct OverseerrAuthority {
    client: Client,
    /// Base URL without a trailing slash.
    api_base: String,
    api_key: String,
}

// -- Overseerr API response types --

/// The fields of `GET /api/v1/request/{id}` we read.
#[derive(Debug, Deserialize)]
struct MediaRequestResponse {
    status: u8,
}

impl OverseerrAuthority {
    /// Build an adapter from configuration, with the configured request timeout.
    pub fn new(config: &AuthorityConfig) -> Result<Self, GreenlightError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GreenlightError::Authority(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Adapter with a default client and no API key.
    pub fn with_base_url(api_base: String) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: String::new(),
        }
    }

    fn request_url(&self, request_id: RequestId) -> String {
        format!("{}/api/v1/request/{request_id}", self.api_base)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        if self.api_key.is_empty() {
            builder
        } else {
            builder.header(API_KEY_HEADER, &self.api_key)
        }
    }

    fn parse_status(code: u8) -> AuthorityStatus {
        match code {
            STATUS_PENDING => AuthorityStatus::Pending,
            STATUS_APPROVED => AuthorityStatus::Approved,
            STATUS_DECLINED => AuthorityStatus::Denied,
            _ => AuthorityStatus::Unknown,
        }
    }

    async fn decide(&self, request_id: RequestId, action: &str) -> Result<(), GreenlightError> {
        let url = format!("{}/{action}", self.request_url(request_id));
        let response = self
            .authorized(self.client.post(&url))
            .send()
            .await
            .map_err(|e| GreenlightError::Authority(format!("Overseerr HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GreenlightError::Authority(format!(
                "Overseerr {action} of request {request_id} failed (HTTP {status}): {body}"
            )));
        }
        tracing::info!(request_id, action, "pushed decision to Overseerr");
        Ok(())
    }
}

#[async_trait]
impl MediationAuthority for OverseerrAuthority {
    async fn status(&self, request_id: RequestId) -> Result<AuthorityStatus, GreenlightError> {
        let response = self
            .authorized(self.client.get(self.request_url(request_id)))
            .send()
            .await
            .map_err(|e| GreenlightError::Authority(format!("Overseerr HTTP request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(request_id, "Overseerr has no such request");
            return Ok(AuthorityStatus::Unknown);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GreenlightError::Authority(format!(
                "Overseerr API error (HTTP {status}): {body}"
            )));
        }

        let body: MediaRequestResponse = response.json().await.map_err(|e| {
            GreenlightError::Authority(format!("Failed to parse Overseerr response: {e}"))
        })?;
        Ok(Self::parse_status(body.status))
    }

    async fn approve(&self, request_id: RequestId) -> Result<(), GreenlightError> {
        self.decide(request_id, "approve").await
    }

    async fn deny(&self, request_id: RequestId) -> Result<(), GreenlightError> {
        self.decide(request_id, "decline").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> AuthorityConfig {
        AuthorityConfig {
            base_url,
            api_key: "secret".to_string(),
            timeout_secs: 5,
        }
    }

    async fn serve_status(server: &MockServer, id: RequestId, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/request/{id}")))
            .and(header(API_KEY_HEADER, "secret"))
            .respond_with(template)
            .mount(server)
            .await;
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(OverseerrAuthority::parse_status(1), AuthorityStatus::Pending);
        assert_eq!(OverseerrAuthority::parse_status(2), AuthorityStatus::Approved);
        assert_eq!(OverseerrAuthority::parse_status(3), AuthorityStatus::Denied);
        assert_eq!(OverseerrAuthority::parse_status(4), AuthorityStatus::Unknown);
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let authority = OverseerrAuthority::with_base_url("http://overseerr:5055/".to_string());
        assert_eq!(authority.request_url(42), "http://overseerr:5055/api/v1/request/42");
    }

    #[tokio::test]
    async fn test_status_reads_request() {
        let server = MockServer::start().await;
        serve_status(
            &server,
            42,
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 42,
                "status": 2,
                "media": { "tmdbId": 603 }
            })),
        )
        .await;

        let authority = OverseerrAuthority::new(&config(server.uri())).unwrap();
        assert_eq!(authority.status(42).await.unwrap(), AuthorityStatus::Approved);
    }

    #[tokio::test]
    async fn test_missing_request_is_unknown() {
        let server = MockServer::start().await;
        serve_status(&server, 42, ResponseTemplate::new(404)).await;

        let authority = OverseerrAuthority::new(&config(server.uri())).unwrap();
        assert_eq!(authority.status(42).await.unwrap(), AuthorityStatus::Unknown);
    }

    #[tokio::test]
    async fn test_server_error() {
        let server = MockServer::start().await;
        serve_status(&server, 42, ResponseTemplate::new(500).set_body_string("boom")).await;

        let authority = OverseerrAuthority::new(&config(server.uri())).unwrap();
        match authority.status(42).await.unwrap_err() {
            GreenlightError::Authority(msg) => assert!(msg.contains("500"), "unexpected message: {msg}"),
            other => panic!("Expected Authority error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unparseable_body_is_error() {
        let server = MockServer::start().await;
        serve_status(&server, 42, ResponseTemplate::new(200).set_body_string("<html>")).await;

        let authority = OverseerrAuthority::new(&config(server.uri())).unwrap();
        assert!(matches!(
            authority.status(42).await,
            Err(GreenlightError::Authority(_))
        ));
    }

    #[tokio::test]
    async fn test_approve_and_decline_post() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/request/42/approve"))
            .and(header(API_KEY_HEADER, "secret"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/request/43/decline"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let authority = OverseerrAuthority::new(&config(server.uri())).unwrap();
        authority.approve(42).await.unwrap();
        authority.deny(43).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_decision_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/request/42/approve"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let authority = OverseerrAuthority::new(&config(server.uri())).unwrap();
        match authority.approve(42).await.unwrap_err() {
            GreenlightError::Authority(msg) => assert!(msg.contains("403"), "unexpected message: {msg}"),
            other => panic!("Expected Authority error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let authority = OverseerrAuthority::with_base_url("http://127.0.0.1:1".to_string());
        assert!(matches!(
            authority.status(42).await,
            Err(GreenlightError::Authority(_))
        ));
    }
}
