//! The HTTP layer underneath the Spotify client.

use anyhow::Error;
use async_trait::async_trait;
use derive_more::From;
use serde_json::Value;
use snafu::Snafu;
use std::time::Duration;
use strum::Display;

/// HTTP methods used by the Spotify API.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl From<Method> for surf::http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::Get,
            Method::Put => Self::Put,
            Method::Post => Self::Post,
            Method::Delete => Self::Delete,
        }
    }
}

/// The body of a request.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
}

/// A request to send over a [`Transport`].
#[derive(Clone, Debug, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    /// The value of the `Authorization` header, if any.
    pub authorization: Option<String>,
    pub body: Body,
}

/// A response received over a [`Transport`].
#[derive(Clone, Debug, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// The value of the `Retry-After` header, if any.
    pub retry_after: Option<String>,
    pub body: String,
}

/// A failure to get any response at all, such as a connection error or a timeout.
#[derive(Debug, Snafu, From)]
#[snafu(display("transport error: {}", message))]
pub struct TransportError {
    message: String,
}

/// A way of making HTTP requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for the complete response.
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Wait before retrying a request.
    async fn sleep(&self, duration: Duration);
}

/// A [`Transport`] using [`surf`].
#[derive(Clone, Debug)]
pub struct SurfTransport {
    client: surf::Client,
}

impl SurfTransport {
    /// Create a transport where every request times out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        let client = surf::Config::new()
            .set_timeout(Some(timeout))
            .try_into()
            .map_err(|err| Error::msg(format!("unable to create HTTP client: {err:?}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for SurfTransport {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse, TransportError> {
        tracing::debug!(method = %req.method, url = %req.url, "Spotify request");
        let url = req
            .url
            .parse::<surf::Url>()
            .map_err(|err| format!("invalid URL {}: {err}", req.url))?;
        let mut builder = surf::RequestBuilder::new(req.method.into(), url);
        if let Some(authorization) = req.authorization {
            builder = builder.header("Authorization", authorization);
        }
        builder = match req.body {
            Body::Empty => builder,
            Body::Json(json) => builder.body_json(&json).map_err(|err| err.to_string())?,
            Body::Form(form) => {
                builder.body(surf::Body::from_form(&form).map_err(|err| err.to_string())?)
            }
        };

        let mut res = self
            .client
            .send(builder)
            .await
            .map_err(|err| err.to_string())?;
        let body = res.body_string().await.map_err(|err| err.to_string())?;
        Ok(HttpResponse {
            status: res.status().into(),
            retry_after: res
                .header("Retry-After")
                .map(|values| values.last().as_str().to_string()),
            body,
        })
    }

    async fn sleep(&self, duration: Duration) {
        async_std::task::sleep(duration).await;
    }
}
