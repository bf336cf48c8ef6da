//! HTTP transport used to deliver signed requests.
//!
//! The client only needs a way to POST a request and read back status,
//! headers and body. [`ReqwestTransport`] is the production implementation;
//! tests and callers with their own HTTP stack can implement [`Transport`].

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use url::Url;

use crate::error::Error;

/// A request ready to be POSTed.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Full URL, including the query string in XML mode
    pub url: Url,
    /// `User-Agent` and `Content-Type`
    pub headers: HeaderMap,
    pub body: String,
}

/// What came back from the service, whatever the status code.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Delivers requests to the service.
///
/// Implementations must not treat non-2xx statuses as failures: error
/// payloads are detected from the body. Connection, TLS and timeout handling
/// belong here, not in the client.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, request: TransportRequest) -> Result<TransportResponse, Error>;
}

/// [`Transport`] backed by a `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a preconfigured client, e.g. one with timeouts or a proxy.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post(&self, request: TransportRequest) -> Result<TransportResponse, Error> {
        let response = self
            .client
            .post(request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
