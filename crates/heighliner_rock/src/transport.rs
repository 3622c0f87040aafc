// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The seam between [`RockApi`](crate::RockApi) and the network.

use std::{error::Error as StdError, fmt, sync::Arc};

use bytes::Bytes;
use http::{Request, Response};

/// Sends one HTTP request and returns the complete response.
///
/// [`HyperTransport`] talks to the network. Tests substitute an in-memory
/// implementation such as `testing::MockTransport` (feature `test-util`).
pub trait Transport: Send + Sync {
    /// Sends `request` and buffers the whole response body.
    fn send(&self, request: Request<Bytes>) -> impl Future<Output = Result<Response<Bytes>, TransportError>> + Send;
}

impl<T> Transport for Box<T>
where
    T: Transport,
{
    fn send(&self, request: Request<Bytes>) -> impl Future<Output = Result<Response<Bytes>, TransportError>> + Send {
        (**self).send(request)
    }
}

impl<T> Transport for Arc<T>
where
    T: Transport,
{
    fn send(&self, request: Request<Bytes>) -> impl Future<Output = Result<Response<Bytes>, TransportError>> + Send {
        (**self).send(request)
    }
}

/// A request that did not produce a response: connection failures, timeouts, broken bodies.
#[derive(Debug)]
pub struct TransportError {
    source: Box<dyn StdError + Send + Sync>,
}

impl TransportError {
    /// Wraps the error reported by the underlying client.
    pub fn new(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self { source: source.into() }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport failed: {}", self.source)
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.source)
    }
}

#[cfg(feature = "hyper")]
pub use hyper_transport::HyperTransport;

#[cfg(feature = "hyper")]
mod hyper_transport {
    use bytes::Bytes;
    use http::{Request, Response};
    use http_body_util::{BodyExt, Full};
    use hyper_util::{
        client::legacy::{
            Client,
            connect::{Connect, HttpConnector},
        },
        rt::TokioExecutor,
    };

    use super::{Transport, TransportError};

    /// [`Transport`] backed by the `hyper` client. Must be used within a Tokio runtime.
    ///
    /// [`new`](Self::new) speaks plain HTTP. For HTTPS, build a client with a TLS connector
    /// and pass it to [`from_client`](Self::from_client).
    #[derive(Clone, Debug)]
    pub struct HyperTransport<C = HttpConnector> {
        client: Client<C, Full<Bytes>>,
    }

    impl HyperTransport {
        /// Creates a transport with a pooled plain-HTTP client.
        #[must_use]
        pub fn new() -> Self {
            Self::from_client(Client::builder(TokioExecutor::new()).build_http())
        }
    }

    impl Default for HyperTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<C> HyperTransport<C> {
        /// Wraps an existing client.
        #[must_use]
        pub fn from_client(client: Client<C, Full<Bytes>>) -> Self {
            Self { client }
        }
    }

    impl<C> Transport for HyperTransport<C>
    where
        C: Connect + Clone + Send + Sync + 'static,
    {
        async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
            let response = self.client.request(request.map(Full::new)).await.map_err(TransportError::new)?;
            let (parts, body) = response.into_parts();
            let body = body.collect().await.map_err(TransportError::new)?.to_bytes();
            Ok(Response::from_parts(parts, body))
        }
    }
}
