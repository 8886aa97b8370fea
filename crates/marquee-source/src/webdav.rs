//! Nextcloud WebDAV source implementation

use crate::propfind::{parse_multistatus, PROPFIND_BODY};
use crate::{ContentSource, SourceError, SourceResult};
use async_trait::async_trait;
use marquee_core::{SourceEntry, SourceProvider};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, Method, Response, StatusCode};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Characters left unescaped in a single path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Nextcloud file source over WebDAV with HTTP basic authentication.
#[derive(Clone)]
pub struct NextcloudSource {
    client: Client,
    server_url: String,
    username: String,
    password: String,
}

impl Debug for NextcloudSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("NextcloudSource")
            .field("server_url", &self.server_url)
            .field("username", &self.username)
            .finish()
    }
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Turn a non-success response into a classified error.
async fn error_for_status(response: Response, target: &str) -> SourceError {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SourceError::Unauthorized(format!("{} returned {}", target, status))
        }
        StatusCode::NOT_FOUND => SourceError::NotFound(target.to_string()),
        _ => SourceError::Http {
            status: status.as_u16(),
            body: response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string()),
        },
    }
}

impl NextcloudSource {
    pub fn new(
        server_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> SourceResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            server_url: server_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
        })
    }

    /// Decoded DAV prefix of the user's files, as it appears in listing hrefs.
    fn user_root(&self) -> String {
        format!("/remote.php/dav/files/{}/", self.username)
    }

    fn webdav_url(&self, path: &str) -> String {
        format!(
            "{}/remote.php/dav/files/{}/{}",
            self.server_url,
            utf8_percent_encode(&self.username, PATH_SEGMENT),
            encode_path(path)
        )
    }

    async fn propfind(&self, path: &str, depth: &str, body: Option<&'static str>) -> SourceResult<Response> {
        let method = Method::from_bytes(b"PROPFIND")
            .map_err(|e| SourceError::ConfigError(format!("Invalid WebDAV method: {}", e)))?;

        let mut request = self
            .client
            .request(method, self.webdav_url(path))
            .basic_auth(&self.username, Some(&self.password))
            .header("Depth", depth);
        if let Some(body) = body {
            request = request
                .header("Content-Type", "application/xml; charset=utf-8")
                .body(body);
        }

        Ok(request.send().await?)
    }
}

#[async_trait]
impl ContentSource for NextcloudSource {
    async fn check_connection(&self) -> SourceResult<()> {
        let response = self.propfind("", "0", None).await?;
        let status = response.status();

        // 207 Multi-Status is the normal WebDAV answer
        if status == StatusCode::OK || status == StatusCode::MULTI_STATUS {
            tracing::info!(server = %self.server_url, "Connected to Nextcloud");
            Ok(())
        } else {
            Err(error_for_status(response, &self.server_url).await)
        }
    }

    #[tracing::instrument(skip(self), fields(server = %self.server_url))]
    async fn list(&self, directory: &str) -> SourceResult<Vec<SourceEntry>> {
        let response = self.propfind(directory, "1", Some(PROPFIND_BODY)).await?;
        if !response.status().is_success() {
            return Err(error_for_status(response, directory).await);
        }

        let body = response.text().await?;
        let entries = parse_multistatus(&body, &self.user_root())?;

        tracing::debug!(count = entries.len(), "Listed directory");
        Ok(entries)
    }

    #[tracing::instrument(skip(self, entry, destination), fields(file = %entry.path))]
    async fn download(&self, entry: &SourceEntry, destination: &Path) -> SourceResult<u64> {
        let mut response = self
            .client
            .get(self.webdav_url(&entry.path))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_status(response, &entry.path).await);
        }

        let mut file = File::create(destination).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!(bytes = written, destination = %destination.display(), "Downloaded file");
        Ok(written)
    }

    fn provider(&self) -> SourceProvider {
        SourceProvider::Nextcloud
    }
}
