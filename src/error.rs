use std::fmt;
use std::str::FromStr;

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the MWS client.
///
/// Configuration problems are reported when a client is constructed, service
/// errors when a response body carries an `Error` node, and transport errors
/// are handed through from the HTTP layer untouched.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid application name, version or base URL
    #[error("Invalid client configuration: {0}")]
    Configuration(String),

    #[error("Missing {0} environment variable")]
    MissingEnvVar(String),

    /// The request could not be built from the supplied arguments
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The service answered with an error payload
    #[error("MWS service error: {0}")]
    Service(Box<ServiceError>),

    /// Network-level failure reported by the transport
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to parse url: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl Error {
    /// Creates a new Configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a new InvalidRequest error
    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Returns the service error details if this error came from the service
    pub fn as_service_error(&self) -> Option<&ServiceError> {
        match self {
            Error::Service(err) => Some(err),
            _ => None,
        }
    }

    /// Returns true if this error was raised while validating configuration
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_) | Error::MissingEnvVar(_))
    }
}

impl From<ServiceError> for Error {
    fn from(err: ServiceError) -> Self {
        Error::Service(Box::new(err))
    }
}

/// Which party the service blames for an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorType {
    Sender,
    Receiver,
    Unknown,
}

impl FromStr for ErrorType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "Sender" => ErrorType::Sender,
            "Receiver" => ErrorType::Receiver,
            _ => ErrorType::Unknown,
        })
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorType::Sender => "Sender",
            ErrorType::Receiver => "Receiver",
            ErrorType::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Error details reported by the service in an `ErrorResponse` payload.
///
/// Only `message` is always present; when the payload has no `Message`
/// element it is the empty string. The remaining fields are populated only
/// when the corresponding element exists.
#[derive(Debug, Clone)]
pub struct ServiceError {
    message: String,
    error_type: Option<ErrorType>,
    code: Option<String>,
    request_id: Option<String>,
    headers: HeaderMap,
}

impl ServiceError {
    pub fn new(
        message: impl Into<String>,
        error_type: Option<ErrorType>,
        code: Option<String>,
        request_id: Option<String>,
        headers: HeaderMap,
    ) -> Self {
        Self {
            message: message.into(),
            error_type,
            code,
            request_id,
            headers,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Sender, Receiver or Unknown, if the payload carried a `Type`
    pub fn error_type(&self) -> Option<ErrorType> {
        self.error_type
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Headers of the response that carried the error
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{code}: {}", self.message)?,
            None => f.write_str(&self.message)?,
        }
        if let Some(error_type) = self.error_type {
            write!(f, " (type: {error_type})")?;
        }
        if let Some(request_id) = &self.request_id {
            write!(f, " [request id: {request_id}]")?;
        }
        Ok(())
    }
}

impl std::error::Error for ServiceError {}
