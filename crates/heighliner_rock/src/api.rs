// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The Rock REST client.

use std::{fmt, sync::Arc};

use bytes::Bytes;
use heighliner_cache::{CacheKey, RequestCache};
use http::{HeaderName, HeaderValue, Method, Request, StatusCode, header::CONTENT_TYPE};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{Error, Result, RockSettings, endpoint::encode_uri, transport::Transport};

/// A successful Rock response.
#[derive(Clone, Debug, PartialEq)]
pub enum RockResponse {
    /// `204 No Content` or an empty body.
    NoContent,
    /// A JSON body. Shared, since memoized responses are handed to many callers.
    Json(Arc<Value>),
}

impl RockResponse {
    /// The JSON body, if there is one.
    #[must_use]
    pub fn json(&self) -> Option<&Value> {
        match self {
            Self::NoContent => None,
            Self::Json(value) => Some(value),
        }
    }

    /// Deserializes the body into `T`. An absent body deserializes like JSON `null`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the body does not have the shape of `T`.
    pub fn deserialize<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let value = match self {
            Self::NoContent => &Value::Null,
            Self::Json(value) => &**value,
        };
        T::deserialize(value).map_err(Error::Json)
    }
}

/// Identifies a request in the cache. Field order does not matter, the key is canonical.
#[derive(Serialize)]
struct RequestKey<'a> {
    method: &'a str,
    url: &'a str,
    body: Option<&'a Value>,
}

/// Client for the Rock REST API.
///
/// `GET` requests are memoized in the [`RequestCache`] handed to [`new`](Self::new):
/// identical reads issued while one is in flight share its response, and a successful
/// response is reused until it expires or is invalidated. Responses with a status
/// outside `2xx` are errors and are never kept. Other methods always reach Rock.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
///
/// use heighliner_cache::RequestCache;
/// use heighliner_rock::{HyperTransport, RockApi, RockSettings};
/// use tick::Clock;
///
/// # async fn example() -> Result<(), heighliner_rock::Error> {
/// let settings = RockSettings::from_path(".remote/settings.json")?;
/// let cache = Arc::new(RequestCache::builder(Clock::new_tokio())
///     .namespace("rock")
///     .maybe_ttl(settings.cache_ttl())
///     .build());
/// let rock = RockApi::new(settings, HyperTransport::new(), cache)?;
///
/// let campuses: Vec<serde_json::Value> = rock.get_json("Campuses").await?;
/// # Ok(())
/// # }
/// ```
pub struct RockApi<T> {
    settings: RockSettings,
    token_name: HeaderName,
    token: HeaderValue,
    transport: T,
    cache: Arc<RequestCache<RockResponse>>,
}

impl<T> fmt::Debug for RockApi<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RockApi")
            .field("settings", &self.settings)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl<T> RockApi<T>
where
    T: Transport,
{
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingCredentials`] if the settings lack a base URL, token name or
    /// token, and [`Error::Request`] if the token cannot be sent as a header.
    pub fn new(settings: RockSettings, transport: T, cache: Arc<RequestCache<RockResponse>>) -> Result<Self> {
        settings.validate()?;
        let token_name = HeaderName::try_from(settings.token_name.as_str()).map_err(http::Error::from)?;
        let mut token = HeaderValue::try_from(settings.token.as_str()).map_err(http::Error::from)?;
        token.set_sensitive(true);

        Ok(Self {
            settings,
            token_name,
            token,
            transport,
            cache,
        })
    }

    /// The settings this client was created with.
    #[must_use]
    pub fn settings(&self) -> &RockSettings {
        &self.settings
    }

    /// The cache that memoizes reads.
    #[must_use]
    pub fn cache(&self) -> &Arc<RequestCache<RockResponse>> {
        &self.cache
    }

    /// The absolute URL for `endpoint`.
    #[must_use]
    pub fn url(&self, endpoint: &str) -> String {
        format!("{}api/{endpoint}", self.settings.base_url)
    }

    /// Sends `method` to `endpoint`, which is relative to `<base_url>api/`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Status`] for a status outside `2xx`, [`Error::Transport`] if no
    /// response arrived and [`Error::Json`] if the body is not JSON. Since every caller
    /// waiting on one `GET` receives the same failure, `GET` failures arrive wrapped in
    /// [`Error::Shared`]; [`Error::status`] looks through the wrapper.
    pub async fn call(&self, method: Method, endpoint: &str, body: Option<&Value>) -> Result<RockResponse> {
        let url = self.url(endpoint);
        if method != Method::GET {
            return self.send(&method, &url, body).await;
        }

        let key = CacheKey::new("rock").param(&RequestKey {
            method: method.as_str(),
            url: &url,
            body,
        })?;
        let response = self.cache.get(&key, || self.send(&method, &url, body)).await?;
        Ok(response)
    }

    /// Sends a `GET` request; see [`call`](Self::call).
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn get(&self, endpoint: &str) -> Result<RockResponse> {
        self.call(Method::GET, endpoint, None).await
    }

    /// Sends a `POST` request with a JSON body; see [`call`](Self::call).
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn post(&self, endpoint: &str, body: &Value) -> Result<RockResponse> {
        self.call(Method::POST, endpoint, Some(body)).await
    }

    /// Sends a `PUT` request with a JSON body; see [`call`](Self::call).
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn put(&self, endpoint: &str, body: &Value) -> Result<RockResponse> {
        self.call(Method::PUT, endpoint, Some(body)).await
    }

    /// Sends a `PATCH` request with a JSON body; see [`call`](Self::call).
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn patch(&self, endpoint: &str, body: &Value) -> Result<RockResponse> {
        self.call(Method::PATCH, endpoint, Some(body)).await
    }

    /// Sends a `DELETE` request; see [`call`](Self::call).
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn delete(&self, endpoint: &str) -> Result<RockResponse> {
        self.call(Method::DELETE, endpoint, None).await
    }

    /// Reads `endpoint` and deserializes the body.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call) and [`RockResponse::deserialize`].
    pub async fn get_json<R>(&self, endpoint: &str) -> Result<R>
    where
        R: DeserializeOwned,
    {
        self.get(endpoint).await?.deserialize()
    }

    async fn send(&self, method: &Method, url: &str, body: Option<&Value>) -> Result<RockResponse> {
        let body = match body {
            Some(body) => Bytes::from(serde_json::to_vec(body).map_err(Error::Json)?),
            None => Bytes::new(),
        };
        let request = Request::builder()
            .method(method.clone())
            .uri(encode_uri(url))
            .header(self.token_name.clone(), self.token.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(body)?;

        tracing::debug!(rock.method = %method, rock.url = url, "rock.request");
        let response = self.transport.send(request).await?;
        let status = response.status();

        if !status.is_success() {
            tracing::warn!(rock.method = %method, rock.url = url, rock.status = status.as_u16(), "rock.status");
            return Err(Error::Status {
                status,
                status_text: status.canonical_reason().unwrap_or_default().to_owned(),
            });
        }

        let body = response.into_body();
        if status == StatusCode::NO_CONTENT || body.is_empty() {
            return Ok(RockResponse::NoContent);
        }

        let json = serde_json::from_slice(&body).map_err(Error::Json)?;
        Ok(RockResponse::Json(Arc::new(json)))
    }
}
