// Declare modules within this crate
pub mod classifier;
pub mod client;
pub mod codec;
pub mod config;
pub mod errors;
pub mod exceptions;

// Re-export the main components for users of this crate
pub use classifier::{ErrorClassifier, ErrorMapper};
pub use client::{ApiClient, ApiClientBuilder, ApiRequest};
pub use codec::{ExceptionCodec, ExceptionResult, ReconstructionFailure};
pub use config::ClientSettings;
pub use errors::{ApiClientError, CodecError, Result};
pub use exceptions::{
    BoxError, Exception, HttpError, HttpException, MultipleHttpException, WebApiException,
};

// Re-exported so callers can cancel requests without naming tokio-util.
pub use tokio_util::sync::CancellationToken;
