//! LiteLLM client configuration and HTTP transport

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use time::{macros::format_description, Date};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::error::{LiteLlmError, LiteLlmResult};
use crate::mock;
use crate::types::*;

/// Initial backoff duration for retries (200ms)
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Maximum backoff duration for retries (5 seconds)
const RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

/// Configuration for the LiteLLM proxy connection
#[derive(Debug, Clone)]
pub struct LiteLlmConfig {
    /// Base URL of the proxy, e.g. `http://litellm:4000`
    pub base_url: String,
    /// Master key sent as bearer token
    pub api_key: Option<String>,
    pub timeout: Duration,
    /// Retry attempts for transient failures
    pub max_retries: usize,
    /// Serve deterministic data without contacting the proxy
    pub mock_mode: bool,
}

impl Default for LiteLlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            mock_mode: false,
        }
    }
}

impl LiteLlmConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("LITELLM_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            api_key: std::env::var("LITELLM_API_KEY").ok().filter(|k| !k.is_empty()),
            timeout: std::env::var("LITELLM_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            max_retries: std::env::var("LITELLM_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_retries),
            mock_mode: std::env::var("LITELLM_MOCK_MODE")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
        }
    }
}

/// LiteLLM proxy client
#[derive(Clone)]
pub struct LiteLlmClient {
    http: Client,
    config: LiteLlmConfig,
}

impl LiteLlmClient {
    /// Create a new client from config
    pub fn new(config: LiteLlmConfig) -> LiteLlmResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| LiteLlmError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    /// Create a new client from environment variables
    pub fn from_env() -> LiteLlmResult<Self> {
        Self::new(LiteLlmConfig::from_env())
    }

    pub fn config(&self) -> &LiteLlmConfig {
        &self.config
    }

    pub fn is_mock(&self) -> bool {
        self.config.mock_mode
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.config.base_url, path);
        let builder = self.http.request(method, url);
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send_once<T: DeserializeOwned>(&self, builder: RequestBuilder) -> LiteLlmResult<T> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LiteLlmError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| LiteLlmError::InvalidResponse(e.to_string()))
    }

    /// Send with exponential backoff; only transient errors are retried
    async fn send<T, F>(&self, path: &str, build: F) -> LiteLlmResult<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let retry_strategy = ExponentialBackoff::from_millis(RETRY_BASE_DELAY.as_millis() as u64)
            .max_delay(RETRY_MAX_DELAY)
            .take(self.config.max_retries)
            .map(jitter);

        Retry::spawn(retry_strategy, || async {
            let result = self.send_once::<T>(build()).await;
            match &result {
                Ok(_) => Ok(result),
                Err(e) if e.is_transient() => {
                    tracing::debug!(path, error = %e, "Transient LiteLLM error - will retry");
                    Err(result)
                }
                Err(e) => {
                    tracing::debug!(path, error = %e, "Permanent LiteLLM error - will not retry");
                    Ok(result)
                }
            }
        })
        .await
        .unwrap_or_else(|e| e)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> LiteLlmResult<T> {
        self.send(path, || self.request(Method::GET, path).query(query))
            .await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> LiteLlmResult<T> {
        self.send(path, || self.request(Method::POST, path).json(body))
            .await
    }

    /// Spend activity for a single calendar day
    pub async fn get_daily_activity(&self, date: Date) -> LiteLlmResult<DailyActivityDay> {
        let day = date
            .format(format_description!("[year]-[month]-[day]"))
            .map_err(|e| LiteLlmError::InvalidResponse(e.to_string()))?;

        if self.is_mock() {
            return Ok(mock::daily_activity(&day));
        }

        let response: DailyActivityResponse = self
            .get(
                "/user/daily/activity",
                &[
                    ("start_date", day.clone()),
                    ("end_date", day.clone()),
                    ("page_size", "1000".to_string()),
                ],
            )
            .await?;

        tracing::debug!(date = %day, results = response.results.len(), "Fetched daily activity");

        Ok(response
            .results
            .into_iter()
            .find(|r| r.date == day)
            .unwrap_or_else(|| DailyActivityDay::empty(&day)))
    }

    /// Deployed models with pricing and capability metadata
    pub async fn get_model_info(&self) -> LiteLlmResult<Vec<ModelInfoEntry>> {
        if self.is_mock() {
            return Ok(mock::model_info());
        }
        let response: ModelInfoResponse = self.get("/model/info", &[]).await?;
        Ok(response.data)
    }

    pub async fn generate_key(
        &self,
        req: &GenerateKeyRequest,
    ) -> LiteLlmResult<GenerateKeyResponse> {
        if self.is_mock() {
            return Ok(mock::generate_key(req));
        }
        self.post("/key/generate", req).await
    }

    /// Delete keys by secret or token hash
    pub async fn delete_keys(&self, keys: &[String]) -> LiteLlmResult<()> {
        if self.is_mock() || keys.is_empty() {
            return Ok(());
        }
        let _: serde_json::Value = self.post("/key/delete", &DeleteKeysRequest { keys }).await?;
        Ok(())
    }

    pub async fn create_team(&self, req: &CreateTeamRequest) -> LiteLlmResult<TeamResponse> {
        if self.is_mock() {
            return Ok(mock::create_team(req));
        }
        self.post("/team/new", req).await
    }

    /// Liveness of the proxy; mock mode is always healthy
    pub async fn health(&self) -> bool {
        if self.is_mock() {
            return true;
        }
        match self
            .request(Method::GET, "/health/liveliness")
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "LiteLLM health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use time::macros::date;

    fn client_for(server: &mockito::Server) -> LiteLlmClient {
        LiteLlmClient::new(LiteLlmConfig {
            base_url: server.url(),
            api_key: Some("sk-master".to_string()),
            timeout: Duration::from_secs(5),
            max_retries: 2,
            mock_mode: false,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_daily_activity_selects_requested_day() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/user/daily/activity")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("start_date".into(), "2025-08-15".into()),
                Matcher::UrlEncoded("end_date".into(), "2025-08-15".into()),
            ]))
            .match_header("authorization", "Bearer sk-master")
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "results": [{"date": "2025-08-15", "metrics": {"api_requests": 7}}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let day = client_for(&server)
            .get_daily_activity(date!(2025 - 08 - 15))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(day.metrics.api_requests, 7);
    }

    #[tokio::test]
    async fn test_missing_day_is_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/user/daily/activity")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"results": []}"#)
            .create_async()
            .await;

        let day = client_for(&server)
            .get_daily_activity(date!(2025 - 08 - 16))
            .await
            .unwrap();
        assert_eq!(day.date, "2025-08-16");
        assert_eq!(day.metrics, SpendMetrics::default());
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/model/info")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let result = client_for(&server).get_model_info().await;

        mock.assert_async().await;
        assert!(matches!(result, Err(LiteLlmError::Upstream { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/key/generate")
            .with_status(400)
            .with_body("bad model")
            .expect(1)
            .create_async()
            .await;

        let result = client_for(&server)
            .generate_key(&GenerateKeyRequest::default())
            .await;

        mock.assert_async().await;
        match result {
            Err(LiteLlmError::Upstream { status, body }) => {
                assert_eq!(status, 400);
                assert_eq!(body, "bad model");
            }
            other => panic!("expected upstream error, got {:?}", other.map(|r| r.key)),
        }
    }

    #[tokio::test]
    async fn test_mock_mode_does_not_touch_network() {
        let client = LiteLlmClient::new(LiteLlmConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            mock_mode: true,
            ..Default::default()
        })
        .unwrap();

        let day = client.get_daily_activity(date!(2025 - 01 - 02)).await.unwrap();
        assert!(day.metrics.api_requests > 0);
        assert!(!client.get_model_info().await.unwrap().is_empty());
        assert!(client.health().await);
        client.delete_keys(&["sk-x".to_string()]).await.unwrap();
    }
}
