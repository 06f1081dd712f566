use crate::classifier::{ErrorClassifier, ErrorMapper};
use crate::codec::ExceptionCodec;
use crate::config::ClientSettings;
use crate::errors::{ApiClientError, Result};
use crate::exceptions::BoxError;
use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn, Span};
use url::Url;

/// Media types sent in `Accept` unless overridden.
pub const DEFAULT_ACCEPT: &str = "application/json, application/problem+json, text/plain";

const BODY_SNIPPET_LEN: usize = 200;

#[derive(Debug)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    headers: HeaderMap,
    classifier: ErrorClassifier,
}

impl ApiClientBuilder {
    fn new() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
        Self {
            base_url: None,
            timeout: None,
            headers,
            classifier: ErrorClassifier::new(),
        }
    }

    /// Relative endpoints are joined onto this URL, so it should end with `/`
    /// when it carries a path.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Upper bound for each request, including reading the body. Unset means
    /// no limit.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let (name, value) = parse_header(name.as_ref(), value.as_ref())?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn accept_language(self, language: impl AsRef<str>) -> Result<Self> {
        self.default_header(ACCEPT_LANGUAGE.as_str(), language)
    }

    /// Maps error payloads to caller-defined errors instead of
    /// [`crate::WebApiException`].
    pub fn error_mapper<F>(mut self, mapper: F) -> Self
    where
        F: Fn(Value) -> BoxError + Send + Sync + 'static,
    {
        self.classifier = ErrorClassifier::with_mapper(mapper);
        self
    }

    pub fn shared_error_mapper(mut self, mapper: ErrorMapper) -> Self {
        self.classifier = ErrorClassifier::from_mapper(Some(mapper));
        self
    }

    /// Decodes exception envelopes and problem-details bodies carrying
    /// `errors`/`title` into [`crate::Exception`] values.
    pub fn with_envelope_mapper(self) -> Self {
        self.shared_error_mapper(ExceptionCodec::new().into_mapper())
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        let mut builder = Self::new();
        if let Some(base_url) = &settings.base_url {
            builder = builder.base_url(base_url.as_str());
        }
        if let Some(timeout) = settings.timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(language) = &settings.accept_language {
            builder = builder.accept_language(language)?;
        }
        for (name, value) in &settings.headers {
            builder = builder.default_header(name, value)?;
        }
        Ok(builder)
    }

    pub fn build(self) -> Result<ApiClient> {
        let base_url = self.base_url.as_deref().map(Url::parse).transpose()?;

        let http_client = reqwest::Client::builder()
            .default_headers(self.headers)
            .build()
            .map_err(ApiClientError::HttpClientBuildFailed)?;

        Ok(ApiClient {
            base_url,
            http_client,
            timeout: self.timeout,
            classifier: self.classifier,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Option<Url>,
    http_client: reqwest::Client,
    timeout: Option<Duration>,
    classifier: ErrorClassifier,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::builder().base_url(base_url).build()
    }

    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::new()
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        ApiClientBuilder::from_settings(settings)?.build()
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Resolves `endpoint` against the base URL (or parses it as absolute when
    /// there is none) and appends `params` to the query string.
    pub fn build_url(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Url> {
        let resolved = match &self.base_url {
            Some(base) => base.join(endpoint),
            None => Url::parse(endpoint),
        };
        let mut url = resolved.map_err(|source| ApiClientError::UrlInvalid {
            url: endpoint.to_string(),
            source,
        })?;

        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    pub fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<ApiRequest<'_>> {
        let url = self.build_url(endpoint, params)?;
        let builder = self.http_client.request(method.clone(), url.clone());
        Ok(ApiRequest {
            client: self,
            method,
            url,
            builder,
            timeout: self.timeout,
            cancel: CancellationToken::new(),
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<T> {
        self.request(Method::GET, endpoint, params)?
            .send_json()
            .await
    }

    pub async fn get_stream(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<impl Stream<Item = Result<Bytes>>> {
        self.request(Method::GET, endpoint, params)?
            .send_stream()
            .await
    }

    pub async fn post<P, R>(&self, endpoint: &str, body: &P, params: &[(&str, &str)]) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.request(Method::POST, endpoint, params)?
            .json(body)
            .send_json()
            .await
    }

    pub async fn post_empty(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<()> {
        self.request(Method::POST, endpoint, params)?.send().await
    }

    pub async fn delete(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<()> {
        self.request(Method::DELETE, endpoint, params)?.send().await
    }

    pub async fn delete_with<P, R>(
        &self,
        endpoint: &str,
        body: &P,
        params: &[(&str, &str)],
    ) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.request(Method::DELETE, endpoint, params)?
            .json(body)
            .send_json()
            .await
    }

    #[instrument(
        name = "api_request",
        skip_all,
        fields(
            http.method = %method,
            http.url = %url,
            http.status_code = tracing::field::Empty,
        )
    )]
    async fn send_request(
        &self,
        builder: RequestBuilder,
        method: &Method,
        url: &Url,
    ) -> Result<Response> {
        debug!("sending request");
        let response = match builder.send().await {
            Ok(res) => res,
            Err(e) => {
                if e.is_connect() || e.is_timeout() {
                    return Err(ApiClientError::NetworkIssue(e));
                }
                return Err(ApiClientError::RequestFailed(e));
            }
        };

        let status = response.status();
        Span::current().record("http.status_code", status.as_u16());

        if status.is_success() {
            return Ok(response);
        }

        warn!(%status, "server rejected request");
        let payload = read_error_payload(response).await;
        Err(ApiClientError::HttpError {
            status,
            url: Some(url.to_string()),
            source: self.classifier.classify(payload),
        })
    }
}

/// A single request with its own timeout and cancellation signal.
pub struct ApiRequest<'a> {
    client: &'a ApiClient,
    method: Method,
    url: Url,
    builder: RequestBuilder,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl ApiRequest<'_> {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn json<P: Serialize + ?Sized>(mut self, body: &P) -> Self {
        self.builder = self.builder.json(body);
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.builder = self.builder.headers(headers);
        self
    }

    /// Overrides the client's timeout for this request only.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Aborts the request with [`ApiClientError::Cancelled`] once `token` is
    /// cancelled.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Sends the request and discards the success body.
    pub async fn send(self) -> Result<()> {
        let Self {
            client,
            method,
            url,
            builder,
            timeout,
            cancel,
        } = self;
        guard(timeout, &cancel, async {
            client.send_request(builder, &method, &url).await.map(drop)
        })
        .await
    }

    /// Sends the request and decodes the success body as JSON. An empty body
    /// decodes as `null`.
    pub async fn send_json<T: DeserializeOwned>(self) -> Result<T> {
        let Self {
            client,
            method,
            url,
            builder,
            timeout,
            cancel,
        } = self;
        guard(timeout, &cancel, async {
            let response = client.send_request(builder, &method, &url).await?;
            handle_json_response(response).await
        })
        .await
    }

    /// Sends the request and streams the success body. Only the wait for the
    /// response headers is bounded by the timeout.
    pub async fn send_stream(self) -> Result<impl Stream<Item = Result<Bytes>>> {
        let Self {
            client,
            method,
            url,
            builder,
            timeout,
            cancel,
        } = self;
        let response = guard(timeout, &cancel, client.send_request(builder, &method, &url)).await?;
        Ok(response.bytes_stream().map_err(ApiClientError::RequestFailed))
    }
}

/// Races `work` against the caller's token and the timer. The caller's
/// cancellation takes precedence over the timer.
async fn guard<F, T>(timeout: Option<Duration>, cancel: &CancellationToken, work: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let timer = async move {
        match timeout {
            Some(limit) => {
                tokio::time::sleep(limit).await;
                limit
            }
            None => std::future::pending::<Duration>().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!("request cancelled by caller");
            Err(ApiClientError::Cancelled)
        }
        limit = timer => {
            warn!(?limit, "request timed out");
            Err(ApiClientError::Timeout(limit))
        }
        result = work => result,
    }
}

async fn handle_json_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = response.bytes().await.map_err(ApiClientError::RequestFailed)?;
    let body: &[u8] = if body.is_empty() { b"null" } else { &body };
    serde_json::from_slice(body).map_err(|source| ApiClientError::DeserializationFailed {
        source,
        body_snippet: String::from_utf8_lossy(body)
            .chars()
            .take(BODY_SNIPPET_LEN)
            .collect(),
    })
}

async fn read_error_payload(response: Response) -> Value {
    match response.bytes().await {
        Ok(body) => parse_error_body(&body),
        Err(e) => {
            warn!(error = %e, "could not read error body");
            Value::String("Could not read error body".to_string())
        }
    }
}

/// JSON bodies (`application/json`, `application/problem+json`) parse as
/// JSON; anything else, such as an HTML error page, becomes a string.
fn parse_error_body(body: &[u8]) -> Value {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let invalid = |reason: String| ApiClientError::InvalidHeader {
        name: name.to_string(),
        reason,
    };
    let header_name = HeaderName::try_from(name).map_err(|e| invalid(e.to_string()))?;
    let header_value = HeaderValue::try_from(value).map_err(|e| invalid(e.to_string()))?;
    Ok((header_name, header_value))
}
