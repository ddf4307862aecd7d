//! Content generation through an HTTP service.

use core::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{Method, Request};
use http_body_util::Full;
use raffle_board_config::ContentGenerationConfig;
use raffle_board_lifecycle::content::{ContentError, ContentGenerator, RaffleText};
use raffle_board_openidconnect::http_client::send;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Serialize)]
struct TextRequest<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
struct ImagesRequest<'a> {
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Deserialize)]
struct ImagesResponse {
    image_urls: Vec<String>,
}

/// Posts JSON to `{endpoint}/raffle-text` and `{endpoint}/raffle-images`.
pub struct HttpContentGenerator {
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpContentGenerator {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            timeout,
        }
    }

    #[must_use]
    pub fn from_config(config: &ContentGenerationConfig) -> Self {
        Self::new(
            config.endpoint.clone(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn post<T: Serialize + Sync, R: DeserializeOwned>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<R, ContentError> {
        let body = serde_json::to_vec(payload).map_err(|err| ContentError::Failed(err.into()))?;
        let mut request = Request::builder()
            .method(Method::POST)
            .uri(format!("{}/{path}", self.endpoint.trim_end_matches('/')))
            .header(CONTENT_TYPE, "application/json");
        if let Some(api_key) = &self.api_key {
            request = request.header(AUTHORIZATION, format!("Bearer {api_key}"));
        }
        let request = request
            .body(Full::new(Bytes::from(body)))
            .map_err(|err| ContentError::Failed(err.into()))?;

        let response = tokio::time::timeout(self.timeout, send(request))
            .await
            .map_err(|_elapsed| ContentError::TimedOut)?
            .map_err(|err| ContentError::Failed(err.into()))?;
        debug!("content generation answered {}", response.status());
        if !response.status().is_success() {
            return Err(ContentError::Failed(
                format!("content generation answered {}", response.status()).into(),
            ));
        }
        serde_json::from_slice(response.body()).map_err(|err| ContentError::Malformed(err.to_string()))
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    async fn generate_raffle_text(&self, prompt: &str) -> Result<RaffleText, ContentError> {
        self.post("raffle-text", &TextRequest { prompt }).await
    }

    async fn generate_raffle_images(
        &self,
        description: &str,
        name: Option<&str>,
    ) -> Result<Vec<String>, ContentError> {
        let response: ImagesResponse = self
            .post("raffle-images", &ImagesRequest { description, name })
            .await?;
        Ok(response.image_urls)
    }
}
