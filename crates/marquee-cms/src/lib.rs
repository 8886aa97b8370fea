//! HTTP client for the Xibo signage CMS.
//!
//! Provides a client that transparently holds an OAuth2 bearer token, generic
//! GET/POST/DELETE helpers, domain methods (upload, layouts, displays, schedules)
//! and the [`SignagePublisher`] workflow that turns one downloaded file into the
//! content shown on a display.

pub mod api;
pub mod auth;
pub mod error;
pub mod factory;
pub mod publisher;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

pub use api::{DisplayRecord, Resolution, ScheduleRecord};
pub use auth::{ClientCredentials, TokenStore};
pub use error::{CmsError, CmsResult};
pub use factory::create_sink;
pub use publisher::{ContentSink, PublishReport, PublishSettings, SignagePublisher, StageWarning};

/// HTTP client for the Xibo CMS API with bearer-token auth.
#[derive(Clone, Debug)]
pub struct XiboClient {
    client: Client,
    base_url: String,
    tokens: Arc<TokenStore>,
}

impl XiboClient {
    pub fn new(base_url: &str, credentials: ClientCredentials, timeout: Duration) -> CmsResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CmsError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens: Arc::new(TokenStore::new(credentials)),
        })
    }

    pub fn from_config(config: &marquee_core::Config) -> CmsResult<Self> {
        let auth = &config.project_to.auth;
        Self::new(
            &config.project_to.host,
            ClientCredentials {
                client_id: auth.client_id.clone(),
                client_secret: auth.client_secret.clone(),
            },
            config.http_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Make sure a valid access token is held, requesting one if necessary.
    pub async fn authenticate(&self) -> CmsResult<()> {
        self.tokens.bearer(&self.client, &self.base_url).await.map(|_| ())
    }

    /// Attach the bearer token, send, and turn non-success statuses into errors.
    async fn execute(&self, request: RequestBuilder) -> CmsResult<Response> {
        let token = self.tokens.bearer(&self.client, &self.base_url).await?;
        let response = request.bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                self.tokens.invalidate().await;
            }
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CmsError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> CmsResult<T> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            CmsError::InvalidResponse(format!("Failed to parse response as JSON: {}", e))
        })
    }

    /// GET request with optional query parameters. Deserializes JSON response.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> CmsResult<T> {
        let mut request = self.client.get(self.build_url(path));
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = self.execute(request).await?;
        Self::parse(response).await
    }

    /// POST a url-encoded form and deserialize response.
    pub async fn post_form<T: DeserializeOwned>(&self, path: &str, form: &[(String, String)]) -> CmsResult<T> {
        let request = self.client.post(self.build_url(path)).form(form);
        let response = self.execute(request).await?;
        Self::parse(response).await
    }

    /// POST multipart form and deserialize response.
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> CmsResult<T> {
        let request = self.client.post(self.build_url(path)).multipart(form);
        let response = self.execute(request).await?;
        Self::parse(response).await
    }

    /// POST without a body, ignoring the response content.
    pub async fn post_action(&self, path: &str) -> CmsResult<()> {
        self.execute(self.client.post(self.build_url(path))).await?;
        Ok(())
    }

    /// DELETE request. Returns Ok(()) on success.
    pub async fn delete(&self, path: &str) -> CmsResult<()> {
        self.execute(self.client.delete(self.build_url(path))).await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn tokens(&self) -> &TokenStore {
        &self.tokens
    }
}
