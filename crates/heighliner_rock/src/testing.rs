// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory transport for testing code that talks to Rock.

use std::{
    collections::BTreeMap,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use parking_lot::Mutex;
use serde_json::Value;

use crate::{
    endpoint::encode_uri,
    transport::{Transport, TransportError},
};

#[derive(Clone, Debug)]
enum Reply {
    Respond { status: StatusCode, body: Bytes },
    Fail(String),
}

#[derive(Debug, Default)]
struct State {
    replies: BTreeMap<String, Reply>,
    requests: Vec<Request<Bytes>>,
}

/// A [`Transport`] that answers from canned responses and records every request.
///
/// Responses are registered per endpoint, relative to `<base_url>api/`. A request is
/// answered by the longest registered endpoint its path and query start with; anything
/// else gets `404 Not Found`. Every request yields to the executor once before it is
/// answered, so concurrent callers overlap as they would over a network.
///
/// Clones share the same responses and recorded requests.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use heighliner_cache::RequestCache;
/// use heighliner_rock::{RockApi, RockSettings, testing::MockTransport};
/// use serde_json::json;
///
/// # futures::executor::block_on(async {
/// let transport = MockTransport::new();
/// transport.respond_json("Campuses", json!([{ "Id": 1, "Name": "Anderson" }]));
///
/// let settings = RockSettings {
///     base_url: "https://rock.example.com/".into(),
///     token_name: "Authorization-Token".into(),
///     token: "s3cr3t".into(),
///     cache_ttl_secs: None,
/// };
/// let rock = RockApi::new(settings, transport.clone(), Arc::new(RequestCache::new()))?;
///
/// let campuses: Vec<serde_json::Value> = rock.get_json("Campuses").await?;
/// assert_eq!(campuses[0]["Name"], "Anderson");
/// assert_eq!(transport.requests().len(), 1);
/// # Ok::<(), heighliner_rock::Error>(())
/// # }).unwrap();
/// ```
#[derive(Clone, Debug, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    /// Creates a transport with no responses registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers requests for `endpoint` with `status` and `body`.
    pub fn respond(&self, endpoint: &str, status: StatusCode, body: impl Into<Bytes>) {
        self.reply(
            endpoint,
            Reply::Respond {
                status,
                body: body.into(),
            },
        );
    }

    /// Answers requests for `endpoint` with `200 OK` and `body` as JSON.
    pub fn respond_json(&self, endpoint: &str, body: Value) {
        self.respond(endpoint, StatusCode::OK, body.to_string());
    }

    /// Fails requests for `endpoint` without a response.
    pub fn fail(&self, endpoint: &str, message: &str) {
        self.reply(endpoint, Reply::Fail(message.to_owned()));
    }

    /// Copies of every request sent so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<Request<Bytes>> {
        self.state.lock().requests.iter().map(copy_request).collect()
    }

    /// How many requests were sent to URLs containing `fragment`.
    #[must_use]
    pub fn count(&self, fragment: &str) -> usize {
        let fragment = encode_uri(fragment);
        self.state
            .lock()
            .requests
            .iter()
            .filter(|request| request.uri().to_string().contains(&fragment))
            .count()
    }

    fn reply(&self, endpoint: &str, reply: Reply) {
        self.state.lock().replies.insert(encode_uri(endpoint), reply);
    }

    fn answer(&self, request: Request<Bytes>) -> Reply {
        let mut state = self.state.lock();
        let target = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().trim_start_matches('/').to_owned())
            .unwrap_or_default();
        let target = target.strip_prefix("api/").unwrap_or(&target);

        let reply = state
            .replies
            .iter()
            .filter(|(endpoint, _)| target.starts_with(endpoint.as_str()))
            .max_by_key(|(endpoint, _)| endpoint.len())
            .map_or(
                Reply::Respond {
                    status: StatusCode::NOT_FOUND,
                    body: Bytes::new(),
                },
                |(_, reply)| reply.clone(),
            );

        state.requests.push(request);
        reply
    }
}

impl Transport for MockTransport {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        let reply = self.answer(request);
        YieldOnce::default().await;

        match reply {
            Reply::Respond { status, body } => {
                let mut response = Response::new(body);
                *response.status_mut() = status;
                Ok(response)
            }
            Reply::Fail(message) => Err(TransportError::new(message)),
        }
    }
}

fn copy_request(request: &Request<Bytes>) -> Request<Bytes> {
    let mut copy = Request::new(request.body().clone());
    *copy.method_mut() = request.method().clone();
    *copy.uri_mut() = request.uri().clone();
    *copy.version_mut() = request.version();
    *copy.headers_mut() = request.headers().clone();
    copy
}

/// Returns `Pending` once, after asking to be polled again.
#[derive(Debug, Default)]
struct YieldOnce {
    yielded: bool,
}

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}
