//! # MWS Client Library
//!
//! A Rust client for the Amazon Marketplace Web Service (MWS) API. It signs
//! requests with Signature Version 2 (HMAC-SHA256), sends them over a pluggable
//! HTTP transport, and classifies XML responses into success payloads or
//! structured service errors.
//!
//! ## Modules
//!
//! - [`client`] - [`MwsClient`], the entry point
//! - [`config`] - Credentials, application identity and endpoint
//! - [`environment`] - Language/platform details for the User-Agent
//! - [`request`] - Parameter handling and request building
//! - [`signer`] - Canonical string, signature, timestamps
//! - [`response`] - XML parsing and response classification
//! - [`transport`] - HTTP transport trait and reqwest implementation
//! - [`error`] - Error types
//!
//! ## Example
//!
//! ```no_run
//! use mws_client::{ClientConfig, MwsClient, RequestParameters};
//!
//! # async fn example() -> Result<(), mws_client::Error> {
//! let config = ClientConfig::new(
//!     "AKIAEXAMPLE",
//!     "secret-key",
//!     "A1SELLERID",
//!     vec!["ATVPDKIKX0DER".to_string()],
//!     "amzn.mws.token",
//! )
//! .with_base_url("https://mws.amazonservices.co.uk");
//!
//! let client = MwsClient::new(config)?;
//! let params: RequestParameters = [("CreatedAfter", "2024-01-01T00:00:00Z")].into_iter().collect();
//! let payload = client.send("ListOrders", "/Orders/2013-09-01", &params).await?;
//! # Ok(())
//! # }
//! ```
//!
//! The client performs no retries, throttling or pagination.

pub mod client;
pub mod config;
pub mod environment;
pub mod error;
pub mod request;
pub mod response;
pub mod signer;
pub mod transport;

pub use client::MwsClient;
pub use config::ClientConfig;
pub use environment::EnvironmentInfo;
pub use error::{Error, ErrorType, ServiceError};
pub use request::{RequestBody, RequestParameters, SignedRequest};
pub use response::{classify, Payload, XmlNode};
pub use transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};
