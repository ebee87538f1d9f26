// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Thin client for a remote mail-drop service reachable over GraphQL.
//!
//! Request/response only: the service offers no push delivery, so
//! [`MailboxBackend::subscribe`] returns `None` and inbox contents are
//! observed exclusively through `poll_inbox`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use dripmail_config::model::RemoteConfig;
use dripmail_core::error::DripmailError;
use dripmail_core::traits::MailboxBackend;
use dripmail_core::types::{InboundMail, MailboxMessage, ProvisionedMailbox, SessionToken};

use crate::address;

/// GraphQL documents mirroring the mail-drop service's web API.
const INTRODUCE_SESSION: &str =
    "mutation { introduceSession { id expiresAt addresses { address } } }";
const SESSION_MAILS: &str = "query ($sessionId: ID!) { session(id: $sessionId) { \
     mails { rawSize fromAddr toAddr downloadUrl text headerSubject receivedAt } } }";
const EXTEND_SESSION: &str =
    "mutation ($sessionId: ID!) { extendSession(id: $sessionId) { expiresAt } }";
const SET_FORWARDING: &str = "mutation ($sessionId: ID!, $forwardTo: String!) { \
     setForwarding(sessionId: $sessionId, forwardTo: $forwardTo) { id forwardTo } }";
const DELETE_SESSION: &str = "mutation ($sessionId: ID!) { deleteSession(id: $sessionId) { id } }";

/// Why a GraphQL round trip failed.
enum GraphqlFailure {
    /// The HTTP exchange itself failed (connect, timeout, bad body).
    Transport(reqwest::Error),
    /// The service answered with an `errors` array.
    Api(String),
}

/// Client for the remote mail-drop GraphQL endpoint.
#[derive(Debug, Clone)]
pub struct RemoteDropClient {
    client: reqwest::Client,
    api_url: String,
}

impl RemoteDropClient {
    /// Creates a client for the configured endpoint.
    pub fn new(config: &RemoteConfig) -> Result<Self, DripmailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DripmailError::BackendUnavailable {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
        })
    }

    /// Executes one GraphQL document and returns the `data` value.
    async fn graphql(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<serde_json::Value, GraphqlFailure> {
        let response = self
            .client
            .post(&self.api_url)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(GraphqlFailure::Transport)?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(GraphqlFailure::Transport)?;

        if let Some(errors) = body.get("errors").and_then(|e| e.as_array()) {
            let joined = errors
                .iter()
                .map(|e| {
                    e.get("message")
                        .and_then(|m| m.as_str())
                        .unwrap_or("unknown error")
                        .to_string()
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(GraphqlFailure::Api(joined));
        }

        Ok(body.get("data").cloned().unwrap_or(serde_json::Value::Null))
    }
}

fn unavailable(e: reqwest::Error) -> DripmailError {
    DripmailError::BackendUnavailable {
        message: format!("mail-drop API request failed: {e}"),
        source: Some(Box::new(e)),
    }
}

/// Parses a service-supplied RFC 3339 timestamp (the service uses `Z` suffixes).
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DripmailError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DripmailError::Internal(format!("unparseable timestamp `{raw}`: {e}")))
}

#[derive(Deserialize)]
struct IntroducePayload {
    id: String,
    #[serde(rename = "expiresAt")]
    expires_at: String,
    addresses: Vec<AddressEntry>,
}

#[derive(Deserialize)]
struct AddressEntry {
    address: String,
}

#[derive(Deserialize)]
struct MailEntry {
    #[serde(rename = "rawSize")]
    raw_size: u64,
    #[serde(rename = "fromAddr")]
    from_addr: String,
    #[serde(rename = "toAddr")]
    to_addr: String,
    #[serde(rename = "downloadUrl")]
    download_url: Option<String>,
    text: Option<String>,
    #[serde(rename = "headerSubject")]
    header_subject: Option<String>,
    #[serde(rename = "receivedAt")]
    received_at: Option<String>,
}

impl MailEntry {
    fn into_message(self) -> MailboxMessage {
        let received_at = self
            .received_at
            .as_deref()
            .and_then(|raw| parse_timestamp(raw).ok())
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        MailboxMessage {
            from_addr: self.from_addr,
            to_addr: self.to_addr,
            subject: self.header_subject.unwrap_or_else(|| "(no subject)".into()),
            received_at,
            size_bytes: self.raw_size,
            body_text: self.text.unwrap_or_default(),
            download_ref: self.download_url,
        }
    }
}

#[async_trait]
impl MailboxBackend for RemoteDropClient {
    async fn create_address(&self) -> Result<ProvisionedMailbox, DripmailError> {
        let data = self
            .graphql(INTRODUCE_SESSION, json!({}))
            .await
            .map_err(|f| match f {
                GraphqlFailure::Transport(e) => unavailable(e),
                GraphqlFailure::Api(msg) => DripmailError::BackendUnavailable {
                    message: format!("mail-drop API refused new session: {msg}"),
                    source: None,
                },
            })?;

        let payload: IntroducePayload =
            serde_json::from_value(data.get("introduceSession").cloned().unwrap_or_default())
                .map_err(|e| {
                    DripmailError::Internal(format!("malformed introduceSession payload: {e}"))
                })?;

        let address = payload
            .addresses
            .first()
            .map(|a| a.address.clone())
            .ok_or_else(|| {
                DripmailError::Internal("introduceSession returned no addresses".into())
            })?;

        debug!(address = address.as_str(), "provisioned remote mailbox");

        Ok(ProvisionedMailbox {
            address,
            token: SessionToken(payload.id),
            expires_at: parse_timestamp(&payload.expires_at)?,
        })
    }

    async fn poll_inbox(
        &self,
        token: &SessionToken,
    ) -> Result<Vec<MailboxMessage>, DripmailError> {
        let data = self
            .graphql(SESSION_MAILS, json!({ "sessionId": token.0 }))
            .await
            .map_err(|f| match f {
                GraphqlFailure::Transport(e) => unavailable(e),
                // The service reports expired/unknown sessions through the
                // errors array on session-scoped queries.
                GraphqlFailure::Api(_) => DripmailError::SessionNotFound,
            })?;

        let mails = data
            .pointer("/session/mails")
            .cloned()
            .ok_or(DripmailError::SessionNotFound)?;

        let entries: Vec<MailEntry> = serde_json::from_value(mails)
            .map_err(|e| DripmailError::Internal(format!("malformed mails payload: {e}")))?;

        Ok(entries.into_iter().map(MailEntry::into_message).collect())
    }

    async fn extend(&self, token: &SessionToken) -> Result<DateTime<Utc>, DripmailError> {
        let data = self
            .graphql(EXTEND_SESSION, json!({ "sessionId": token.0 }))
            .await
            .map_err(|f| match f {
                GraphqlFailure::Transport(e) => unavailable(e),
                GraphqlFailure::Api(_) => DripmailError::SessionNotFound,
            })?;

        let raw = data
            .pointer("/extendSession/expiresAt")
            .and_then(|v| v.as_str())
            .ok_or(DripmailError::SessionNotFound)?;

        parse_timestamp(raw)
    }

    async fn set_forwarding(
        &self,
        token: &SessionToken,
        target: &str,
    ) -> Result<(), DripmailError> {
        address::validate(target)?;

        self.graphql(
            SET_FORWARDING,
            json!({ "sessionId": token.0, "forwardTo": target }),
        )
        .await
        .map_err(|f| match f {
            GraphqlFailure::Transport(e) => unavailable(e),
            GraphqlFailure::Api(msg) => DripmailError::BackendUnavailable {
                message: format!("mail-drop API rejected forwarding: {msg}"),
                source: None,
            },
        })?;

        Ok(())
    }

    async fn delete_session(&self, token: &SessionToken) -> Result<(), DripmailError> {
        match self
            .graphql(DELETE_SESSION, json!({ "sessionId": token.0 }))
            .await
        {
            Ok(_) => Ok(()),
            // The session was already gone server-side; deletion is idempotent.
            Err(GraphqlFailure::Api(msg)) => {
                debug!(error = msg.as_str(), "deleteSession reported an error, treating as gone");
                Ok(())
            }
            // Local removal proceeds regardless; the caller warns the user.
            Err(GraphqlFailure::Transport(e)) => {
                warn!(error = %e, "deleteSession unreachable, remote mailbox may linger");
                Err(DripmailError::PartialFailure(format!(
                    "mail-drop API unreachable: {e}"
                )))
            }
        }
    }

    fn subscribe(&self) -> Option<mpsc::Receiver<InboundMail>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> RemoteDropClient {
        RemoteDropClient::new(&RemoteConfig {
            api_url: server.uri(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn create_address_maps_introduce_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "introduceSession": {
                        "id": "sess-1",
                        "expiresAt": "2026-09-01T12:00:00Z",
                        "addresses": [{ "address": "abc123@drip.example" }]
                    }
                }
            })))
            .mount(&server)
            .await;

        let mailbox = client_for(&server).create_address().await.unwrap();
        assert_eq!(mailbox.address, "abc123@drip.example");
        assert_eq!(mailbox.token, SessionToken("sess-1".into()));
        assert_eq!(
            mailbox.expires_at,
            parse_timestamp("2026-09-01T12:00:00Z").unwrap()
        );
    }

    #[tokio::test]
    async fn poll_inbox_is_idempotent_and_order_stable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "session": { "mails": [
                    { "rawSize": 100, "fromAddr": "a@x.com", "toAddr": "me@drip.example",
                      "downloadUrl": null, "text": "first", "headerSubject": "one",
                      "receivedAt": "2026-08-30T10:00:00Z" },
                    { "rawSize": 200, "fromAddr": "b@y.com", "toAddr": "me@drip.example",
                      "downloadUrl": "https://drop/dl/2", "text": "second", "headerSubject": null,
                      "receivedAt": "2026-08-30T11:00:00Z" }
                ] } }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let token = SessionToken("sess-1".into());
        let first = client.poll_inbox(&token).await.unwrap();
        let second = client.poll_inbox(&token).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(first[0].subject, "one");
        assert_eq!(first[1].subject, "(no subject)");
        assert_eq!(first[1].download_ref.as_deref(), Some("https://drop/dl/2"));
    }

    #[tokio::test]
    async fn expired_session_maps_to_session_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errors": [{ "message": "session not found" }]
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .poll_inbox(&SessionToken("gone".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, DripmailError::SessionNotFound));
    }

    #[tokio::test]
    async fn set_forwarding_validates_before_any_call() {
        // No mock server needed: validation must short-circuit.
        let client = RemoteDropClient::new(&RemoteConfig {
            api_url: "http://127.0.0.1:1".into(),
        })
        .unwrap();

        let err = client
            .set_forwarding(&SessionToken("s".into()), "not-an-email")
            .await
            .unwrap_err();
        assert!(matches!(err, DripmailError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn unreachable_delete_surfaces_partial_failure() {
        let client = RemoteDropClient::new(&RemoteConfig {
            api_url: "http://127.0.0.1:1".into(),
        })
        .unwrap();

        let err = client
            .delete_session(&SessionToken("s".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, DripmailError::PartialFailure(_)));
    }

    #[tokio::test]
    async fn delete_with_api_error_is_idempotent_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errors": [{ "message": "already deleted" }]
            })))
            .mount(&server)
            .await;

        assert!(client_for(&server)
            .delete_session(&SessionToken("s".into()))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn remote_backend_has_no_push_channel() {
        let client = RemoteDropClient::new(&RemoteConfig::default()).unwrap();
        assert!(client.subscribe().is_none());
    }
}
