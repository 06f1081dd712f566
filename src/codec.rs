use crate::classifier::ErrorMapper;
use crate::errors::CodecError;
use crate::exceptions::{
    json_text, BoxError, Exception, HttpError, HttpException, MultipleHttpException,
    WebApiException,
};
use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

pub const ASSEMBLY_FIELD: &str = "assembly";
pub const TYPE_FIELD: &str = "type";
pub const EXCEPTION_FIELD: &str = "exception";
pub const ERRORS_FIELD: &str = "errors";
pub const TITLE_FIELD: &str = "title";

pub const ASSEMBLY: &str = concat!(
    env!("CARGO_PKG_NAME"),
    ", Version=",
    env!("CARGO_PKG_VERSION")
);

/// Serialization envelope around a single [`Exception`]. Always written
/// with [`ASSEMBLY`], since every variant is owned by this crate.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionResult {
    exception: Exception,
    source_assembly: Option<String>,
}

impl ExceptionResult {
    pub fn new(exception: Exception) -> Self {
        Self {
            exception,
            source_assembly: None,
        }
    }

    /// Origin recorded by the envelope this value was decoded from.
    pub fn source_assembly(&self) -> Option<&str> {
        self.source_assembly.as_deref()
    }

    pub fn exception(&self) -> &Exception {
        &self.exception
    }

    pub fn into_exception(self) -> Exception {
        self.exception
    }
}

impl Serialize for ExceptionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry(ASSEMBLY_FIELD, ASSEMBLY)?;
        map.serialize_entry(TYPE_FIELD, self.exception.type_name())?;
        match &self.exception {
            Exception::Http(e) => map.serialize_entry(EXCEPTION_FIELD, e)?,
            Exception::MultipleHttp(e) => map.serialize_entry(EXCEPTION_FIELD, e)?,
            Exception::WebApi(e) => map.serialize_entry(EXCEPTION_FIELD, e)?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ExceptionResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let info = Map::<String, Value>::deserialize(deserializer)?;
        let exception = ExceptionCodec::default().deserialize(&info);
        let source_assembly = info
            .get(ASSEMBLY_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self {
            exception,
            source_assembly,
        })
    }
}

/// Why the typed reconstruction of an envelope was abandoned.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconstructionFailure {
    UnresolvedAssembly { assembly: String, raw: Value },
    Conversion(String),
}

#[derive(Debug, Clone)]
pub struct ExceptionCodec {
    assemblies: Vec<String>,
}

impl Default for ExceptionCodec {
    fn default() -> Self {
        Self {
            assemblies: vec![ASSEMBLY.to_string()],
        }
    }
}

impl ExceptionCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers another origin whose envelopes decode to their exact type,
    /// e.g. an older release of this crate running in a peer process.
    pub fn with_assembly(mut self, assembly: impl Into<String>) -> Self {
        self.assemblies.push(assembly.into());
        self
    }

    pub fn resolves(&self, assembly: &str) -> bool {
        self.assemblies.iter().any(|known| known == assembly)
    }

    /// Registered origins only affect decoding; envelopes are always written
    /// with [`ASSEMBLY`].
    pub fn serialize(&self, exception: Exception) -> ExceptionResult {
        ExceptionResult::new(exception)
    }

    /// Rebuilds an exception from an envelope map. Never fails: anything the
    /// typed path cannot handle goes to the `errors`/`title` fallback.
    pub fn deserialize(&self, info: &Map<String, Value>) -> Exception {
        match self.reconstruct(info) {
            Ok(exception) => exception,
            Err(ReconstructionFailure::UnresolvedAssembly { assembly, raw }) => {
                debug!(%assembly, "unknown envelope origin, reading exception generically");
                match generic_exception(raw) {
                    Ok(exception) => exception,
                    Err(reason) => {
                        debug!(%reason, "falling back to errors/title");
                        Exception::MultipleHttp(multiple_from_errors(info))
                    }
                }
            }
            Err(ReconstructionFailure::Conversion(reason)) => {
                debug!(%reason, "falling back to errors/title");
                Exception::MultipleHttp(multiple_from_errors(info))
            }
        }
    }

    pub fn reconstruct(
        &self,
        info: &Map<String, Value>,
    ) -> Result<Exception, ReconstructionFailure> {
        let raw = required(info, EXCEPTION_FIELD)?.clone();
        let assembly = required_str(info, ASSEMBLY_FIELD)?;

        if !self.resolves(assembly) {
            return Err(ReconstructionFailure::UnresolvedAssembly {
                assembly: assembly.to_string(),
                raw,
            });
        }

        let type_name = required_str(info, TYPE_FIELD)?;
        match type_name {
            "HttpException" => convert::<HttpException>(raw).map(Exception::Http),
            "MultipleHttpException" => {
                convert::<MultipleHttpException>(raw).map(Exception::MultipleHttp)
            }
            "WebApiException" => convert::<WebApiException>(raw).map(Exception::WebApi),
            other => Err(ReconstructionFailure::Conversion(format!(
                "type '{other}' not found in '{assembly}'"
            ))),
        }
    }

    pub fn to_json(&self, exception: Exception) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(&self.serialize(exception))?)
    }

    pub fn from_json(&self, bytes: &[u8]) -> Result<Exception, CodecError> {
        let value: Value = serde_json::from_slice(bytes)?;
        self.from_value(value)
    }

    pub fn to_cbor(&self, exception: Exception) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::new();
        ciborium::into_writer(&self.serialize(exception), &mut buf)?;
        Ok(buf)
    }

    pub fn from_cbor(&self, bytes: &[u8]) -> Result<Exception, CodecError> {
        let value: Value = ciborium::from_reader(bytes)?;
        self.from_value(value)
    }

    fn from_value(&self, value: Value) -> Result<Exception, CodecError> {
        match value {
            Value::Object(info) => Ok(self.deserialize(&info)),
            _ => Err(CodecError::NotAnEnvelope),
        }
    }

    /// Error mapper that decodes envelope-shaped payloads and wraps any other
    /// payload in a [`WebApiException`].
    pub fn into_mapper(self) -> ErrorMapper {
        Arc::new(move |payload: Value| -> BoxError {
            match payload {
                Value::Object(info) if is_envelope(&info) => Box::new(self.deserialize(&info)),
                other => Box::new(WebApiException::new(other)),
            }
        })
    }
}

fn is_envelope(info: &Map<String, Value>) -> bool {
    [ASSEMBLY_FIELD, EXCEPTION_FIELD, ERRORS_FIELD]
        .iter()
        .any(|field| info.contains_key(*field))
}

fn required<'a>(
    info: &'a Map<String, Value>,
    field: &str,
) -> Result<&'a Value, ReconstructionFailure> {
    info.get(field)
        .ok_or_else(|| ReconstructionFailure::Conversion(format!("missing '{field}'")))
}

fn required_str<'a>(
    info: &'a Map<String, Value>,
    field: &str,
) -> Result<&'a str, ReconstructionFailure> {
    required(info, field)?
        .as_str()
        .ok_or_else(|| ReconstructionFailure::Conversion(format!("'{field}' is not a string")))
}

fn convert<T: DeserializeOwned>(raw: Value) -> Result<T, ReconstructionFailure> {
    serde_json::from_value(raw).map_err(|e| ReconstructionFailure::Conversion(e.to_string()))
}

/// Reads any exception shape generically: a `message` string is required,
/// `inner` is kept when it can be read and dropped otherwise.
fn generic_exception(raw: Value) -> Result<Exception, String> {
    let Value::Object(mut fields) = raw else {
        return Err("exception is not an object".to_string());
    };
    let message = match fields.remove("message") {
        Some(Value::String(message)) => message,
        _ => return Err("exception has no message".to_string()),
    };
    let inner = fields.remove("inner").and_then(inner_exception);
    Ok(Exception::Http(HttpException::with_inner(message, inner)))
}

fn inner_exception(inner: Value) -> Option<Exception> {
    if let Ok(exception) = serde_json::from_value::<Exception>(inner.clone()) {
        return Some(exception);
    }
    inner
        .get("message")
        .and_then(Value::as_str)
        .map(|message| Exception::Http(HttpException::new(message)))
}

fn multiple_from_errors(info: &Map<String, Value>) -> MultipleHttpException {
    let title = match info.get(TITLE_FIELD) {
        Some(value @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => json_text(value),
        _ => String::new(),
    };

    let Some(Value::Object(entries)) = info.get(ERRORS_FIELD) else {
        return MultipleHttpException::new(title, Vec::new());
    };

    let errors = entries
        .values()
        .filter_map(error_text)
        .map(HttpError::new)
        .collect::<Vec<_>>();

    MultipleHttpException::new(title, errors)
}

fn error_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Array(items) => json_text(items.first()?),
        other => json_text(other),
    };
    (!text.is_empty()).then_some(text)
}
