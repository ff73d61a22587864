//! Byte sources for transfers
//!
//! A [`Source`] opens a URL and hands back its announced length together with
//! a stream of body chunks. [`HttpSource`] is the network implementation.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use url::Url;

use crate::config::DownloadConfig;
use crate::error::{DownError, DownResult};
use crate::utils::{create_client, parse_content_length};

/// An opened resource whose headers have been received successfully
pub struct SourceResponse {
    /// Length announced by the server, if any
    pub content_length: Option<u64>,
    /// Body chunks in order
    pub body: BoxStream<'static, DownResult<Bytes>>,
}

impl std::fmt::Debug for SourceResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceResponse")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Fetches resources for the transfer executor
#[async_trait]
pub trait Source: Send + Sync {
    /// Issues the request and waits for a successful response.
    ///
    /// Non-success statuses must be reported as errors.
    async fn open(&self, url: &Url) -> DownResult<SourceResponse>;
}

/// Handles HTTP operations for downloading
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(config: &DownloadConfig) -> DownResult<Self> {
        debug!("Creating new HTTP client with config: {:?}", config);
        let client = create_client(config)?;
        debug!("HTTP client created successfully");

        Ok(Self { client })
    }
}

#[async_trait]
impl Source for HttpSource {
    async fn open(&self, url: &Url) -> DownResult<SourceResponse> {
        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                warn!(url = %url, scheme, "No transport available for scheme");
                return Err(DownError::UnsupportedScheme(scheme.to_string()));
            }
        }

        debug!(url = %url, "Sending GET request");
        let resp = self.client.get(url.clone()).send().await.map_err(|e| {
            error!(error = %e, url = %url, "Error sending request");
            DownError::HttpError(e)
        })?;

        debug!(status = %resp.status(), url = %url, "Response received");

        if !resp.status().is_success() {
            warn!(
                status = %resp.status(),
                url = %url,
                "Received non-success status code"
            );
            return Err(DownError::server_error(
                resp.status().as_u16(),
                resp.status().canonical_reason().unwrap_or("Unknown status"),
            ));
        }

        let content_length = parse_content_length(&resp);
        debug!(url = %url, ?content_length, "Content length parsed from response");

        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(DownError::HttpError))
            .boxed();

        Ok(SourceResponse {
            content_length,
            body,
        })
    }
}
