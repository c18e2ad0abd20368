use std::time::Duration;

use reqwest::Method;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::Result;
use crate::models::ApiEnvelope;

/// Status and body of a backend reply, kept raw so callers can tell a
/// rejected request apart from an unreadable one.
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }

    /// Best-effort `message` from a failure envelope, else the status line.
    pub fn error_message(&self) -> String {
        self.json::<ApiEnvelope<serde_json::Value>>()
            .ok()
            .and_then(|envelope| envelope.message)
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| format!("HTTP {}", self.status.as_u16()))
    }
}

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(6))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.request(Method::GET, path, Option::<()>::None).await
    }

    pub async fn post<B: Serialize>(&self, path: &str, body: B) -> Result<ApiResponse> {
        self.request(Method::POST, path, Some(body)).await
    }

    async fn request<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<B>,
    ) -> Result<ApiResponse> {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        let mut request = self.client.request(method.clone(), &url);
        if let Some(payload) = body.as_ref() {
            request = request.json(payload);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(%method, %url, status = status.as_u16(), "backend request finished");

        Ok(ApiResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_envelope_message() {
        let response = ApiResponse {
            status: StatusCode::BAD_REQUEST,
            body: r#"{"success":false,"message":"Invalid advertisement"}"#.to_string(),
        };
        assert_eq!(response.error_message(), "Invalid advertisement");

        let response = ApiResponse {
            status: StatusCode::BAD_GATEWAY,
            body: "<html>bad gateway</html>".to_string(),
        };
        assert_eq!(response.error_message(), "HTTP 502");
    }
}
