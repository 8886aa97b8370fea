//! OAuth2 client-credentials token handling for the CMS API.

use chrono::{Duration, Utc};
use marquee_core::AuthToken;
use reqwest::Client;
use serde::Deserialize;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use tokio::sync::Mutex;

use crate::error::{CmsError, CmsResult};

const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;
/// Tokens are refreshed this long before the server-side expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Debug for ClientCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Holds the current bearer token and re-acquires it when absent or expired.
pub struct TokenStore {
    credentials: ClientCredentials,
    current: Mutex<Option<AuthToken>>,
}

impl Debug for TokenStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("TokenStore")
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl TokenStore {
    pub fn new(credentials: ClientCredentials) -> Self {
        Self {
            credentials,
            current: Mutex::new(None),
        }
    }

    /// Return a valid access token, exchanging credentials for a new one if needed.
    pub async fn bearer(&self, client: &Client, base_url: &str) -> CmsResult<String> {
        let mut current = self.current.lock().await;

        if let Some(token) = current.as_ref() {
            if !token.is_expired(Utc::now()) {
                return Ok(token.access_token.clone());
            }
            tracing::debug!("Access token expired, re-authenticating");
        }

        let token = self.request_token(client, base_url).await?;
        let access_token = token.access_token.clone();
        *current = Some(token);
        Ok(access_token)
    }

    /// Drop the held token so the next request authenticates again.
    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
    }

    #[cfg(test)]
    pub(crate) async fn force_expire(&self) {
        if let Some(token) = self.current.lock().await.as_mut() {
            token.expires_at = Utc::now() - Duration::seconds(1);
        }
    }

    async fn request_token(&self, client: &Client, base_url: &str) -> CmsResult<AuthToken> {
        let url = format!("{}/authorize/access_token", base_url);
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];

        let response = client
            .post(&url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CmsError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CmsError::InvalidResponse(format!("Token response: {}", e)))?;

        let expires_in = token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let expires_at = Utc::now() + Duration::seconds(expires_in - EXPIRY_MARGIN_SECS);

        tracing::info!(expires_in = expires_in, "Authenticated with CMS");
        Ok(AuthToken {
            access_token: token.access_token,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn store() -> TokenStore {
        TokenStore::new(ClientCredentials {
            client_id: "marquee".to_string(),
            client_secret: "s3cret".to_string(),
        })
    }

    #[tokio::test]
    async fn test_token_is_reused_until_expiry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/authorize/access_token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()),
                Matcher::UrlEncoded("client_id".into(), "marquee".into()),
                Matcher::UrlEncoded("client_secret".into(), "s3cret".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"access_token":"tok-1","token_type":"Bearer","expires_in":3600}"#)
            .expect(1)
            .create_async()
            .await;

        let client = Client::new();
        let store = store();
        assert_eq!(store.bearer(&client, &server.url()).await.unwrap(), "tok-1");
        assert_eq!(store.bearer(&client, &server.url()).await.unwrap(), "tok-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_expired_token_is_reacquired_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/authorize/access_token")
            .with_status(200)
            .with_body(r#"{"access_token":"tok","expires_in":3600}"#)
            .expect(2)
            .create_async()
            .await;

        let client = Client::new();
        let store = store();
        store.bearer(&client, &server.url()).await.unwrap();
        store.force_expire().await;
        store.bearer(&client, &server.url()).await.unwrap();
        store.bearer(&client, &server.url()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/authorize/access_token")
            .with_status(401)
            .with_body(r#"{"error":"invalid_client"}"#)
            .create_async()
            .await;

        let err = store().bearer(&Client::new(), &server.url()).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(err.to_string().contains("invalid_client"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        assert!(!format!("{:?}", store()).contains("s3cret"));
    }
}
