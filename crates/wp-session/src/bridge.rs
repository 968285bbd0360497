use tracing::{debug, info, instrument};

use crate::client::{PortalClient, RequestOptions};
use crate::errors::{BridgeError, RequestError};
use crate::session::{BridgeRequest, Session, SessionResponse};

/// Exchanges a one-time link credential for a session
#[async_trait::async_trait]
pub trait SessionBridge: Send + Sync {
    /// Exchange `credential`. On success the token store already holds the
    /// new access token when this returns.
    async fn bridge(&self, credential: &str) -> Result<Session, BridgeError>;
}

/// Bridge backed by the portal's session endpoint
#[derive(Debug, Clone)]
pub struct HttpSessionBridge {
    client: PortalClient,
}

impl HttpSessionBridge {
    pub fn new(client: PortalClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl SessionBridge for HttpSessionBridge {
    #[instrument(skip(self, credential))]
    async fn bridge(&self, credential: &str) -> Result<Session, BridgeError> {
        let body = serde_json::to_value(BridgeRequest { token: credential })
            .map_err(|e| BridgeError::Transport(e.into()))?;

        debug!("Exchanging link credential for a session");
        // A single-use credential must never be re-sent after a refresh
        let value = self
            .client
            .request(
                &self.client.config().bridge_path,
                RequestOptions::post(body).without_refresh(),
            )
            .await?;

        let response: SessionResponse = serde_json::from_value(value)
            .map_err(|e| BridgeError::Transport(RequestError::Decode(e)))?;
        let access_token = response
            .token()
            .ok_or(BridgeError::MissingAccessToken)?
            .to_string();

        self.client.store().set(&access_token);
        info!(subject_id = ?response.user_id, "Wallet session bridged");

        Ok(Session {
            access_token,
            subject_id: response.user_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::PortalConfig;
    use crate::store::TokenStore;

    const BRIDGE_PATH: &str = "/wallet-portal/sessions/bridge";

    fn bridge_for(server: &MockServer, store: TokenStore) -> HttpSessionBridge {
        let config = PortalConfig::new(Url::parse(&server.uri()).unwrap());
        HttpSessionBridge::new(PortalClient::new(config, store).unwrap())
    }

    #[tokio::test]
    async fn test_bridge_persists_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(BRIDGE_PATH))
            .and(body_json(json!({"token": "link-123"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "user_id": 42,
                "access_token": "xyz",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = TokenStore::in_memory();
        let bridge = bridge_for(&server, store.clone());

        let session = bridge.bridge("link-123").await.unwrap();
        assert_eq!(session.access_token, "xyz");
        assert_eq!(session.subject_id, Some(42));
        assert_eq!(store.get().as_deref(), Some("xyz"));
    }

    #[tokio::test]
    async fn test_gate_over_http_bridge() {
        use std::sync::Arc;

        use crate::gate::{GateState, MemoryNavigator, Navigator, SessionGate};
        use crate::location::PageLocation;

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(BRIDGE_PATH))
            .and(body_json(json!({"token": "abc"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "xyz"})))
            .expect(1)
            .mount(&server)
            .await;

        let store = TokenStore::in_memory();
        let navigator = Arc::new(MemoryNavigator::new(PageLocation::new("/", "token=abc", "")));
        let gate = SessionGate::new(
            Arc::new(bridge_for(&server, store.clone())),
            store.clone(),
            navigator.clone(),
        );

        assert_eq!(gate.run().await, GateState::Ready);
        assert_eq!(store.get().as_deref(), Some("xyz"));
        assert_eq!(navigator.location().href(), "/");
    }

    #[tokio::test]
    async fn test_missing_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(BRIDGE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let store = TokenStore::in_memory();
        let bridge = bridge_for(&server, store.clone());

        let err = bridge.bridge("link-123").await.unwrap_err();
        assert!(matches!(err, BridgeError::MissingAccessToken));
        assert_eq!(store.get(), None);
    }

    #[tokio::test]
    async fn test_rejected_credential_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(BRIDGE_PATH))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"detail": "Link token expired"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/wallet-portal/sessions/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "t"})))
            .expect(0)
            .mount(&server)
            .await;

        let bridge = bridge_for(&server, TokenStore::in_memory());

        let err = bridge.bridge("link-123").await.unwrap_err();
        assert!(matches!(err, BridgeError::Rejected(_)));
        assert_eq!(err.to_string(), "Link token expired");
    }
}
