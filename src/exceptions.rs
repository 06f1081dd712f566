use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Boxed error returned by the classifier and carried by
/// [`crate::ApiClientError::HttpError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpError {
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl HttpError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(code.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct HttpException {
    message: String,
    #[source]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inner: Option<Box<Exception>>,
}

impl HttpException {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            inner: None,
        }
    }

    pub fn with_inner(message: impl Into<String>, inner: Option<Exception>) -> Self {
        Self {
            message: message.into(),
            inner: inner.map(Box::new),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn inner(&self) -> Option<&Exception> {
        self.inner.as_deref()
    }
}

/// Aggregate of several [`HttpError`]s under an optional title.
///
/// `Display` renders the title line (when non-empty) followed by one
/// ` - <message>` line per error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultipleHttpException {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<HttpError>,
}

impl MultipleHttpException {
    pub fn new(message: impl Into<String>, errors: impl IntoIterator<Item = HttpError>) -> Self {
        Self {
            message: message.into(),
            errors: errors.into_iter().collect(),
        }
    }

    pub fn from_messages<I, S>(message: impl Into<String>, messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(message, messages.into_iter().map(HttpError::new))
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn errors(&self) -> &[HttpError] {
        &self.errors
    }
}

impl fmt::Display for MultipleHttpException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.message.is_empty() {
            writeln!(f, "{}", self.message)?;
        }
        for error in &self.errors {
            writeln!(f, " - {}", error.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for MultipleHttpException {}

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct WebApiException {
    message: String,
    #[serde(default)]
    payload: Value,
}

impl WebApiException {
    pub fn new(payload: Value) -> Self {
        Self {
            message: json_text(&payload),
            payload,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

/// Every exception the codec can rebuild, tagged by its type name.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Exception {
    #[error(transparent)]
    #[serde(rename = "HttpException")]
    Http(HttpException),
    #[error(transparent)]
    #[serde(rename = "MultipleHttpException")]
    MultipleHttp(MultipleHttpException),
    #[error(transparent)]
    #[serde(rename = "WebApiException")]
    WebApi(WebApiException),
}

impl Exception {
    pub fn type_name(&self) -> &'static str {
        match self {
            Exception::Http(_) => "HttpException",
            Exception::MultipleHttp(_) => "MultipleHttpException",
            Exception::WebApi(_) => "WebApiException",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Exception::Http(e) => e.message(),
            Exception::MultipleHttp(e) => e.message(),
            Exception::WebApi(e) => e.message(),
        }
    }
}

impl From<HttpException> for Exception {
    fn from(e: HttpException) -> Self {
        Exception::Http(e)
    }
}

impl From<MultipleHttpException> for Exception {
    fn from(e: MultipleHttpException) -> Self {
        Exception::MultipleHttp(e)
    }
}

impl From<WebApiException> for Exception {
    fn from(e: WebApiException) -> Self {
        Exception::WebApi(e)
    }
}

/// String form of a JSON value: strings unquoted, `null` empty, anything
/// else as compact JSON.
pub(crate) fn json_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => {
            value.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::error::Error as _;

    #[test]
    fn multiple_renders_title_then_dashed_lines() {
        let e = MultipleHttpException::from_messages("Top", ["a", "b"]);
        assert_eq!(e.to_string(), "Top\n - a\n - b\n");
    }

    #[test]
    fn multiple_without_title_renders_only_errors() {
        let e = MultipleHttpException::from_messages("", ["only"]);
        assert_eq!(e.to_string(), " - only\n");
        assert_eq!(MultipleHttpException::default().to_string(), "");
    }

    #[test]
    fn http_error_keeps_code() {
        let e = HttpError::with_code("E42", "broken");
        assert_eq!(e.code(), Some("E42"));
        assert_eq!(e.to_string(), "broken");
        assert_eq!(HttpError::new("plain").code(), None);
    }

    #[test]
    fn web_api_message_is_payload_text() {
        let e = WebApiException::new(json!({"detail": "bad request"}));
        assert_eq!(e.message(), r#"{"detail":"bad request"}"#);

        let e = WebApiException::new(json!("plain text"));
        assert_eq!(e.to_string(), "plain text");
    }

    #[test]
    fn http_exception_exposes_inner_as_source() {
        let inner = Exception::from(HttpException::new("root cause"));
        let e = HttpException::with_inner("outer", Some(inner));
        assert_eq!(e.source().map(|s| s.to_string()).as_deref(), Some("root cause"));
        assert_eq!(e.inner().map(Exception::message), Some("root cause"));
    }

    #[test]
    fn exception_serializes_with_type_tag() {
        let e = Exception::from(HttpException::new("boom"));
        let value = serde_json::to_value(&e).unwrap();
        assert_eq!(value, json!({"type": "HttpException", "message": "boom"}));
        assert_eq!(e.type_name(), "HttpException");
    }
}
