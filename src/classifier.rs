//! Turns the body of a failed response into an error value.

use crate::exceptions::{BoxError, WebApiException};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Caller-supplied strategy mapping an error payload to a custom error.
pub type ErrorMapper = Arc<dyn Fn(Value) -> BoxError + Send + Sync>;

#[derive(Clone, Default)]
pub struct ErrorClassifier {
    mapper: Option<ErrorMapper>,
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapper<F>(mapper: F) -> Self
    where
        F: Fn(Value) -> BoxError + Send + Sync + 'static,
    {
        Self {
            mapper: Some(Arc::new(mapper)),
        }
    }

    pub fn from_mapper(mapper: Option<ErrorMapper>) -> Self {
        Self { mapper }
    }

    pub fn has_mapper(&self) -> bool {
        self.mapper.is_some()
    }

    /// Returns the mapper's result verbatim when one is set, otherwise a
    /// [`WebApiException`] wrapping `payload`.
    pub fn classify(&self, payload: Value) -> BoxError {
        match &self.mapper {
            Some(mapper) => mapper(payload),
            None => Box::new(WebApiException::new(payload)),
        }
    }
}

impl fmt::Debug for ErrorClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorClassifier")
            .field("mapper", &self.mapper.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use thiserror::Error;

    #[derive(Error, Debug, PartialEq)]
    #[error("mapped: {0}")]
    struct MappedError(String);

    fn shapes() -> Vec<Value> {
        vec![
            Value::Null,
            json!({"detail": "bad request"}),
            json!(["a", 1]),
            json!("text"),
            json!(42),
            json!(true),
        ]
    }

    #[test]
    fn mapper_result_is_returned_for_every_shape() {
        let classifier = ErrorClassifier::with_mapper(|payload| {
            Box::new(MappedError(payload.to_string())) as BoxError
        });

        for payload in shapes() {
            let expected = MappedError(payload.to_string());
            let err = classifier.classify(payload);
            assert_eq!(err.downcast_ref::<MappedError>(), Some(&expected));
        }
    }

    #[test]
    fn without_mapper_wraps_payload() {
        let classifier = ErrorClassifier::new();
        let err = classifier.classify(json!({"detail": "bad request"}));
        let web = err.downcast_ref::<WebApiException>().unwrap();
        assert_eq!(web.message(), r#"{"detail":"bad request"}"#);
        assert_eq!(web.payload(), &json!({"detail": "bad request"}));
    }

    #[test]
    fn without_mapper_handles_scalars_and_null() {
        let classifier = ErrorClassifier::new();
        for payload in shapes() {
            let err = classifier.classify(payload.clone());
            let web = err.downcast_ref::<WebApiException>().unwrap();
            assert_eq!(web.payload(), &payload);
        }
        let err = classifier.classify(Value::Null);
        assert_eq!(err.to_string(), "");
    }
}
