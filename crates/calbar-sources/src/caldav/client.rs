//! Low-level WebDAV HTTP client: PROPFIND and REPORT with Basic auth.

use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use tracing::trace;

use crate::error::{FetchError, FetchResult};

const DAV_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP client for WebDAV/CalDAV requests.
pub struct DavClient {
    client: Client,
    username: String,
    password: String,
}

impl DavClient {
    /// Creates a client with the CalDAV adapter timeout.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(DAV_TIMEOUT)
            .build()
            .map_err(FetchError::Network)?;
        Ok(Self {
            client,
            username: username.into(),
            password: password.into(),
        })
    }

    /// Issues a PROPFIND with the given Depth header.
    pub async fn propfind(&self, url: &str, body: &str, depth: u8) -> FetchResult<String> {
        self.request("PROPFIND", url, body, Some(depth)).await
    }

    /// Issues a REPORT (Depth 1).
    pub async fn report(&self, url: &str, body: &str) -> FetchResult<String> {
        self.request("REPORT", url, body, Some(1)).await
    }

    async fn request(
        &self,
        method: &str,
        url: &str,
        body: &str,
        depth: Option<u8>,
    ) -> FetchResult<String> {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| FetchError::Config(format!("invalid HTTP method {method:?}")))?;

        let mut request = self
            .client
            .request(method, url)
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(body.to_string());

        if let Some(depth) = depth {
            request = request.header("Depth", depth.to_string());
        }
        if !self.username.is_empty() && !self.password.is_empty() {
            request = request.basic_auth(&self.username, Some(&self.password));
        }

        trace!(url = %url, "sending WebDAV request");
        let response = request.send().await?;

        let status = response.status();
        match status {
            StatusCode::OK | StatusCode::MULTI_STATUS => Ok(response.text().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(FetchError::Auth(format!(
                "server rejected credentials ({})",
                status.as_u16()
            ))),
            _ => Err(FetchError::Http(status.as_u16())),
        }
    }
}
