// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client for the polled source endpoint.

use std::sync::Arc;

use portage_core::clock::now_ms;
use portage_core::{CredentialStore, Cursor, PortageError, SyncSettings};
use serde::Serialize;
use tracing::{debug, warn};

use crate::map_request_error;
use crate::report::StatusReport;

/// Bearer-authorized client for the source endpoint.
///
/// Endpoint location and timeout come from the persisted settings on every
/// call, so setting changes take effect on the next cycle without a rebuild.
#[derive(Clone)]
pub struct SourceClient {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialStore>,
}

impl SourceClient {
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Result<Self, PortageError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| PortageError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, credentials })
    }

    /// Current bearer token; any credential-store trouble falls back to the
    /// well-known default rather than failing the request.
    async fn token(&self) -> String {
        match self.credentials.load().await {
            Ok(Some(token)) if !token.is_empty() => token,
            Ok(_) => portage_config::DEFAULT_TOKEN.to_string(),
            Err(err) => {
                warn!(error = %err, "credential store read failed, using default token");
                portage_config::DEFAULT_TOKEN.to_string()
            }
        }
    }

    /// Poll the endpoint: `GET {base}{path}?since=<cursor>`.
    ///
    /// Returns the raw body on 2xx; non-2xx maps to `Http`, everything else
    /// to `Timeout`/`Transport`. Callers treat all three as cycle-aborting.
    pub async fn fetch_messages(
        &self,
        settings: &SyncSettings,
        cursor: Option<&Cursor>,
    ) -> Result<String, PortageError> {
        let timeout = settings.timeout();
        let mut request = self
            .http
            .get(settings.endpoint_url())
            .timeout(timeout)
            .bearer_auth(self.token().await)
            .header("Cache-Control", "no-store");
        if let Some(cursor) = cursor {
            request = request.query(&[("since", cursor.to_string())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_request_error(e, timeout))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| map_request_error(e, timeout))?;

        if !status.is_success() {
            return Err(PortageError::Http {
                status: status.as_u16(),
                body,
            });
        }
        debug!(bytes = body.len(), "poll response received");
        Ok(body)
    }

    /// `POST {base}{path}` with a JSON payload and the bearer header.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        settings: &SyncSettings,
        payload: &T,
    ) -> Result<(), PortageError> {
        let timeout = settings.timeout();
        let response = self
            .http
            .post(settings.endpoint_url())
            .timeout(timeout)
            .bearer_auth(self.token().await)
            .json(payload)
            .send()
            .await
            .map_err(|e| map_request_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortageError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    /// Acknowledge a keepalive probe.
    pub async fn send_keepalive_ack(&self, settings: &SyncSettings) -> Result<(), PortageError> {
        self.post_json(
            settings,
            &serde_json::json!({ "type": "keepalive_ack", "ts": now_ms() }),
        )
        .await
    }

    /// Report a delivery status back to the source.
    pub async fn send_status_report(
        &self,
        settings: &SyncSettings,
        report: &StatusReport,
    ) -> Result<(), PortageError> {
        self.post_json(settings, &report.to_wire(now_ms())).await
    }

    /// Two-phase credential rotation.
    ///
    /// Persists the new token, verifies the store round-trips it, then sends
    /// an acknowledgement authenticated with the NEW token (the server keeps
    /// accepting the old one during its transition window). A failed
    /// acknowledgement is logged and swallowed: the new token is already
    /// committed locally, and there is no rollback.
    pub async fn apply_credential_update(
        &self,
        settings: &SyncSettings,
        new_token: &str,
    ) -> Result<(), PortageError> {
        self.credentials.store(new_token).await?;

        let persisted = self.credentials.load().await?;
        if persisted.as_deref() != Some(new_token) {
            return Err(PortageError::Internal(
                "credential store did not round-trip the rotated token".to_string(),
            ));
        }
        debug!("rotated bearer token persisted and verified");

        if let Err(err) = self
            .post_json(
                settings,
                &serde_json::json!({ "type": "credential_ack", "ts": now_ms() }),
            )
            .await
        {
            warn!(error = %err, "credential rotation ack failed; new token stays active");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portage_test_utils::MemoryCredentialStore;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings_for(server: &MockServer) -> SyncSettings {
        let uri = server.uri();
        let addr = uri.strip_prefix("http://").unwrap();
        let (host, port) = addr.split_once(':').unwrap();
        SyncSettings {
            host: host.to_string(),
            port: port.parse().unwrap(),
            path: "/messages".to_string(),
            timeout_ms: 1000,
            ..SyncSettings::default()
        }
    }

    fn client_with(token: Option<&str>) -> (SourceClient, Arc<MemoryCredentialStore>) {
        let store = Arc::new(MemoryCredentialStore::new(token));
        let client = SourceClient::new(store.clone()).unwrap();
        (client, store)
    }

    #[tokio::test]
    async fn fetch_sends_bearer_and_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/messages"))
            .and(query_param("since", "41"))
            .and(header("Authorization", "Bearer secret-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"messages":[]}"#))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _) = client_with(Some("secret-1"));
        let body = client
            .fetch_messages(&settings_for(&server), Some(&Cursor::Number(41)))
            .await
            .unwrap();
        assert_eq!(body, r#"{"messages":[]}"#);
    }

    #[tokio::test]
    async fn fetch_without_token_uses_default() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header(
                "Authorization",
                format!("Bearer {}", portage_config::DEFAULT_TOKEN).as_str(),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _) = client_with(None);
        client
            .fetch_messages(&settings_for(&server), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_2xx_maps_to_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let (client, _) = client_with(Some("t"));
        let err = client
            .fetch_messages(&settings_for(&server), None)
            .await
            .unwrap_err();
        match err {
            PortageError::Http { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "down");
            }
            other => panic!("expected Http error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_response_maps_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(std::time::Duration::from_millis(500))
                    .set_body_string("late"),
            )
            .mount(&server)
            .await;

        let (client, _) = client_with(Some("t"));
        let mut settings = settings_for(&server);
        settings.timeout_ms = 50;
        let err = client.fetch_messages(&settings, None).await.unwrap_err();
        assert!(matches!(err, PortageError::Timeout { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn keepalive_ack_posts_typed_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(body_partial_json(
                serde_json::json!({"type": "keepalive_ack"}),
            ))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _) = client_with(Some("t"));
        client
            .send_keepalive_ack(&settings_for(&server))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn credential_rotation_persists_then_acks_with_new_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer fresh-token"))
            .and(body_partial_json(
                serde_json::json!({"type": "credential_ack"}),
            ))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let (client, store) = client_with(Some("stale-token"));
        client
            .apply_credential_update(&settings_for(&server), "fresh-token")
            .await
            .unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some("fresh-token"));
    }

    #[tokio::test]
    async fn credential_rotation_survives_failed_ack() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (client, store) = client_with(Some("stale-token"));
        // Ack fails, but the rotation itself must succeed.
        client
            .apply_credential_update(&settings_for(&server), "fresh-token")
            .await
            .unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some("fresh-token"));
    }
}
