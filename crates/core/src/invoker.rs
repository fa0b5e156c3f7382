use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use http::{HeaderMap, StatusCode};
use reqwest::Client;
use thiserror::Error;
use url::Url;

/// A fully built outbound invocation. Reused unchanged for every attempt.
#[derive(Clone, Debug)]
pub struct InvocationRequest {
    /// The message payload.
    pub body: Bytes,

    /// Trigger metadata and content type.
    pub headers: HeaderMap,

    /// The resolved function endpoint.
    pub url: Url,
}

/// A response body that has not been read yet. Resolves to the full body or
/// the reason it could not be read.
pub type ResponseBody = BoxFuture<'static, Result<Bytes, String>>;

/// The function's answer to a single attempt: the status as soon as it is
/// known, and the body still to be read.
pub struct InvocationResponse {
    /// The unread response body.
    pub body: ResponseBody,

    /// The response status.
    pub status: StatusCode,
}

impl InvocationResponse {
    /// A response whose body is already in memory.
    pub fn ready(status: StatusCode, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self {
            body: Box::pin(async move { Ok(body) }),
            status,
        }
    }
}

impl Debug for InvocationResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Reasons a single attempt produced no response at all.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum InvokeError {
    /// No response arrived before the attempt timeout.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The endpoint could not be reached.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Performs a single synchronous request/response call to a function.
#[async_trait]
pub trait Invoker
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// Sends `request` once, returning as soon as the status is known.
    async fn invoke(&self, request: &InvocationRequest) -> Result<InvocationResponse, InvokeError>;
}

/// Invokes functions with an HTTP `POST`.
#[derive(Clone, Debug, Default)]
pub struct HttpInvoker {
    client: Client,
}

impl HttpInvoker {
    /// Creates an invoker with a default `reqwest` client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an invoker using the given client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Invoker for HttpInvoker {
    async fn invoke(&self, request: &InvocationRequest) -> Result<InvocationResponse, InvokeError> {
        let response = self
            .client
            .post(request.url.clone())
            .headers(request.headers.clone())
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| InvokeError::Transport(e.to_string()))?;

        let status = response.status();
        let body: ResponseBody =
            Box::pin(async move { response.bytes().await.map_err(|e| e.to_string()) });

        Ok(InvocationResponse { body, status })
    }
}
