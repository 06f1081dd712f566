use crate::exceptions::BoxError;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use url::ParseError as UrlParseError;

pub type Result<T> = std::result::Result<T, ApiClientError>;

#[derive(Error, Debug)]
pub enum ApiClientError {
    #[error("Configuration Error: Invalid base URL: {0}")]
    BaseUrlInvalid(#[from] UrlParseError),

    #[error("Request Error: Invalid endpoint URL '{url}': {source}")]
    UrlInvalid { url: String, source: UrlParseError },

    #[error("Configuration Error: Invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Configuration Error: Invalid settings: {0}")]
    InvalidSettings(#[from] toml::de::Error),

    #[error("Configuration Error: Failed to build HTTP client: {0}")]
    HttpClientBuildFailed(reqwest::Error),

    #[error("Request Error: Failed to build or send the request: {0}")]
    RequestFailed(reqwest::Error),

    #[error("Network Error: Connection or timeout issue: {0}")]
    NetworkIssue(reqwest::Error),

    #[error("Timeout Error: No response within {0:?}")]
    Timeout(Duration),

    #[error("Request Error: Cancelled by caller")]
    Cancelled,

    #[error("HTTP Error: Server responded with status {status}: {source}")]
    HttpError {
        // Server responded with non-2xx; `source` is the classified exception
        status: StatusCode,
        url: Option<String>,
        source: BoxError,
    },

    #[error("Response Error: Failed to deserialize response body: {source}. Body snippet: '{body_snippet}'")]
    DeserializationFailed {
        source: serde_json::Error,
        body_snippet: String,
    },
}

impl ApiClientError {
    /// Status code of a non-success response, if this is one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiClientError::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Downcasts the classified exception of a non-success response.
    pub fn exception<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            ApiClientError::HttpError { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiClientError::Timeout(_))
    }
}

/// Failures reading or writing envelope bytes. Decoding a well-formed
/// envelope map never fails.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Codec Error: JSON envelope: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Codec Error: CBOR encode: {0}")]
    CborEncode(#[from] ciborium::ser::Error<std::io::Error>),

    #[error("Codec Error: CBOR decode: {0}")]
    CborDecode(#[from] ciborium::de::Error<std::io::Error>),

    #[error("Codec Error: Envelope is not a map")]
    NotAnEnvelope,
}
