//! Provider HTTP Client
//!
//! Thin wrapper over `reqwest` for the OpenAI-compatible REST API: bearer
//! auth, the assistants beta header, and mapping non-success responses to
//! [`UpstreamFailure`] for the stage that made the call.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ChatError, UpstreamFailure, UpstreamStage};

/// Default provider endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Longest provider error body kept in a failure cause
const MAX_ERROR_BODY: usize = 512;

/// Authenticated client for one provider endpoint
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ApiClient {
    /// Create a client for `base_url` (no trailing slash needed)
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Transport` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ChatError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Endpoint base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    /// POST a JSON body and return the raw response (for streaming)
    pub(crate) async fn post_stream<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        stage: UpstreamStage,
    ) -> Result<reqwest::Response, UpstreamFailure> {
        let builder = self
            .request(reqwest::Method::POST, path)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(body);
        send_checked(builder, stage).await
    }

    /// POST a JSON body and decode a JSON response
    pub(crate) async fn post_json<B, T>(
        &self,
        path: &str,
        body: &B,
        stage: UpstreamStage,
    ) -> Result<T, UpstreamFailure>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let builder = self.request(reqwest::Method::POST, path).json(body);
        decode(send_checked(builder, stage).await?, stage).await
    }

    /// GET and decode a JSON response
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        stage: UpstreamStage,
    ) -> Result<T, UpstreamFailure> {
        let builder = self.request(reqwest::Method::GET, path);
        decode(send_checked(builder, stage).await?, stage).await
    }
}

async fn send_checked(
    builder: reqwest::RequestBuilder,
    stage: UpstreamStage,
) -> Result<reqwest::Response, UpstreamFailure> {
    let response = builder
        .send()
        .await
        .map_err(|e| UpstreamFailure::new(stage, e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|&i| body.is_char_boundary(i))
            .unwrap_or(0);
        body.truncate(cut);
    }
    Err(UpstreamFailure::new(stage, format!("HTTP {status}: {body}")))
}

async fn decode<T: DeserializeOwned>(
    response: reqwest::Response,
    stage: UpstreamStage,
) -> Result<T, UpstreamFailure> {
    response
        .json()
        .await
        .map_err(|e| UpstreamFailure::new(stage, format!("invalid response body: {e}")))
}
