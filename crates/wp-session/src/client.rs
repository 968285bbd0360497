use std::sync::Arc;

use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::PortalConfig;
use crate::errors::{NormalizedError, RequestError, Result};
use crate::refresh::RefreshCoordinator;
use crate::store::TokenStore;

/// Options for a single portal request
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Surface a 401 directly instead of refreshing and retrying
    pub no_refresh: bool,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn without_refresh(mut self) -> Self {
        self.no_refresh = true;
        self
    }
}

/// Authenticated JSON client for the wallet portal backend
#[derive(Debug, Clone)]
pub struct PortalClient {
    config: Arc<PortalConfig>,
    http: Client,
    store: TokenStore,
    refresher: Arc<RefreshCoordinator>,
}

impl PortalClient {
    /// Create a new client. The refresh coordinator shares its cookie jar.
    pub fn new(config: PortalConfig, store: TokenStore) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.http_timeouts.connect)
            .timeout(config.http_timeouts.request)
            .user_agent(config.user_agent.as_deref().unwrap_or("wallet-portal"))
            .cookie_store(true)
            .build()?;

        let refresher = Arc::new(RefreshCoordinator::new(
            http.clone(),
            config.endpoint(&config.refresh_path)?,
            store.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            http,
            store,
            refresher,
        })
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.refresher
    }

    /// Issue a request with the stored bearer token.
    ///
    /// A first 401 triggers one refresh and, if that yields a token, one
    /// retry of the identical request. Failures carry the normalized body
    /// message.
    #[instrument(skip(self, options), fields(method = %options.method))]
    pub async fn request(&self, path: &str, options: RequestOptions) -> Result<Value> {
        let url = self.config.endpoint(path)?;
        let response = self.send(&url, &options, self.store.get()).await?;

        if response.status() == StatusCode::UNAUTHORIZED && !options.no_refresh {
            debug!("Request unauthorized, refreshing session");
            match self.refresher.refresh().await {
                Some(token) => {
                    let retried = self.send(&url, &options, Some(token)).await?;
                    return Self::read_json(retried).await;
                }
                None => warn!("Session refresh failed, surfacing original response"),
            }
        }

        Self::read_json(response).await
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        self.request(path, RequestOptions::get()).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.request(path, RequestOptions::post(body)).await
    }

    /// Drop the stored session
    pub fn logout(&self) {
        debug!("Clearing stored session");
        self.store.clear();
    }

    async fn send(
        &self,
        url: &Url,
        options: &RequestOptions,
        token: Option<String>,
    ) -> Result<Response> {
        let mut request = self
            .http
            .request(options.method.clone(), url.clone())
            .header("Accept", "application/json");

        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = &options.body {
            request = request.json(body);
        }

        Ok(request.send().await?)
    }

    /// Read the body once and turn it into JSON or a normalized error
    async fn read_json(response: Response) -> Result<Value> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let error = NormalizedError::from_body(status.as_u16(), &body);
            debug!(status = status.as_u16(), "Request failed: {}", error);
            return Err(RequestError::Failed(error));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const LEDGER_PATH: &str = "/wallet-portal/ledger";
    const REFRESH_PATH: &str = "/wallet-portal/sessions/refresh";

    fn client_for(server: &MockServer, store: TokenStore) -> PortalClient {
        let config = PortalConfig::new(Url::parse(&server.uri()).unwrap());
        PortalClient::new(config, store).unwrap()
    }

    fn refresh_mock(token: &str) -> Mock {
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "user_id": 1,
                "access_token": token,
                "refreshed": true,
            })))
    }

    #[tokio::test]
    async fn test_success_returns_json_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LEDGER_PATH))
            .and(header("authorization", "Bearer abc"))
            .and(query_param("limit", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [1, 2]})))
            .expect(1)
            .mount(&server)
            .await;

        let store = TokenStore::in_memory();
        store.set("abc");
        let client = client_for(&server, store);

        let value = client
            .request(LEDGER_PATH, RequestOptions::get().query("limit", 20))
            .await
            .unwrap();
        assert_eq!(value, json!({"items": [1, 2]}));
    }

    #[tokio::test]
    async fn test_no_authorization_without_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LEDGER_PATH))
            .and(body_json(json!({"a": 1})))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = client_for(&server, TokenStore::in_memory());
        let value = client.post(LEDGER_PATH, json!({"a": 1})).await.unwrap();
        assert_eq!(value, Value::Null);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn test_refresh_then_retry_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LEDGER_PATH))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "expired"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(LEDGER_PATH))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .expect(1)
            .mount(&server)
            .await;
        refresh_mock("fresh").expect(1).mount(&server).await;

        let store = TokenStore::in_memory();
        store.set("stale");
        let client = client_for(&server, store.clone());

        let value = client.get(LEDGER_PATH).await.unwrap();
        assert_eq!(value, json!({"items": []}));
        assert_eq!(store.get().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_second_unauthorized_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LEDGER_PATH))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "first"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(LEDGER_PATH))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "second"})))
            .expect(1)
            .mount(&server)
            .await;
        refresh_mock("fresh").expect(1).mount(&server).await;

        let store = TokenStore::in_memory();
        store.set("stale");
        let client = client_for(&server, store);

        let err = client.get(LEDGER_PATH).await.unwrap_err();
        match err {
            RequestError::Failed(normalized) => {
                assert_eq!(normalized.message, "second");
                assert_eq!(normalized.status, Some(401));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bridge_cookie_reaches_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/wallet-portal/sessions/bridge"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "wallet_session=abc; Path=/; HttpOnly")
                    .set_body_json(json!({"access_token": "a"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(LEDGER_PATH))
            .and(header("authorization", "Bearer a"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "expired"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .and(header("cookie", "wallet_session=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "b"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(LEDGER_PATH))
            .and(header("authorization", "Bearer b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .expect(1)
            .mount(&server)
            .await;

        let store = TokenStore::in_memory();
        let client = client_for(&server, store.clone());

        let session = client
            .request(
                "/wallet-portal/sessions/bridge",
                RequestOptions::post(json!({"token": "link"})).without_refresh(),
            )
            .await
            .unwrap();
        store.set(session["access_token"].as_str().unwrap());

        let value = client.get(LEDGER_PATH).await.unwrap();
        assert_eq!(value, json!({"items": []}));
        assert_eq!(store.get().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_failed_refresh_surfaces_original_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LEDGER_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "expired"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({"detail": "Missing wallet session"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = TokenStore::in_memory();
        store.set("stale");
        let client = client_for(&server, store.clone());

        let err = client.get(LEDGER_PATH).await.unwrap_err();
        assert_eq!(err.user_message(), "expired");
        assert_eq!(err.status(), Some(401));
        assert_eq!(store.get(), None);
    }

    #[tokio::test]
    async fn test_no_refresh_option_skips_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LEDGER_PATH))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        refresh_mock("fresh").expect(0).mount(&server).await;

        let client = client_for(&server, TokenStore::in_memory());
        let err = client
            .request(LEDGER_PATH, RequestOptions::get().without_refresh())
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Request failed with status 401");
    }

    #[tokio::test]
    async fn test_error_body_priority() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/wallet-portal/withdraw"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "detail": [{"msg": "bad"}, {"msg": "worse"}],
                "message": "ignored",
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/wallet-portal/recharge"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let client = client_for(&server, TokenStore::in_memory());

        let err = client.post("/wallet-portal/withdraw", json!({})).await.unwrap_err();
        assert_eq!(err.user_message(), "bad • worse");

        let err = client.post("/wallet-portal/recharge", json!({})).await.unwrap_err();
        assert_eq!(err.user_message(), "upstream exploded");
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn test_logout_clears_store() {
        let store = TokenStore::in_memory();
        store.set("abc");
        let client = PortalClient::new(PortalConfig::default(), store.clone()).unwrap();

        client.logout();
        assert_eq!(store.get(), None);
    }
}
