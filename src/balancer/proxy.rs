//! Request dispatch and forwarding.
//!
//! `dispatch` picks a live backend under the least-connections policy and
//! hands the request to `forward`, which replays it against the backend and
//! streams the response straight back. The in-flight guard rides inside the
//! response body stream, so the slot is released only once the body has been
//! fully relayed (or abandoned).

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use futures_util::StreamExt;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::warn;

use super::backend::InFlightGuard;
use super::pool::BackendPool;
use crate::config::BalancerConfig;

/// Trace header naming the backend that served a request.
pub const LB_FROM: HeaderName = HeaderName::from_static("lb-from");

/// Why a request could not be served by a backend.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("no live backends")]
    NoLiveBackends,
    #[error("forwarding failed: {0}")]
    Forward(#[from] reqwest::Error),
}

impl ProxyError {
    fn status(&self) -> StatusCode {
        match self {
            ProxyError::NoLiveBackends => StatusCode::BAD_GATEWAY,
            ProxyError::Forward(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Shared state injected into the dispatch handler.
#[derive(Clone)]
pub struct ProxyState {
    pool: Arc<BackendPool>,
    client: reqwest::Client,
    scheme: &'static str,
    timeout: Duration,
    trace: bool,
}

impl ProxyState {
    pub fn new(pool: Arc<BackendPool>, client: reqwest::Client, config: &BalancerConfig) -> Self {
        Self {
            pool,
            client,
            scheme: config.scheme(),
            timeout: config.timeout,
            trace: config.trace,
        }
    }
}

/// Builds the balancer router: every path and method lands in `dispatch`.
pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/", any(dispatch))
        .route("/{*path}", any(dispatch))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn dispatch(State(state): State<ProxyState>, request: Request) -> Response {
    match handle(&state, request).await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "request not served by a backend");
            status_response(err.status())
        }
    }
}

async fn handle(state: &ProxyState, request: Request) -> Result<Response, ProxyError> {
    let backend = state.pool.select().ok_or(ProxyError::NoLiveBackends)?;
    forward(state, backend, request).await
}

/// Replays `request` against the chosen backend and streams the response
/// back. Dropping the returned response (client disconnect) cancels the
/// outbound request and releases the in-flight slot.
async fn forward(
    state: &ProxyState,
    backend: InFlightGuard,
    request: Request,
) -> Result<Response, ProxyError> {
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}://{}{}", state.scheme, backend.addr, path_and_query);

    let method = request.method().clone();
    let mut headers = request.headers().clone();
    strip_hop_headers(&mut headers);
    // The outbound host and body framing are derived from the URL and the
    // streamed body.
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    let body = reqwest::Body::wrap_stream(request.into_body().into_data_stream());

    let upstream = state
        .client
        .request(method, &url)
        .headers(headers)
        .body(body)
        .timeout(state.timeout)
        .send()
        .await?;

    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_headers(&mut headers);
    if state.trace {
        match HeaderValue::from_str(&backend.addr) {
            Ok(value) => {
                headers.insert(LB_FROM, value);
            }
            Err(err) => warn!(addr = %backend.addr, error = %err, "untraceable backend address"),
        }
    }

    // The guard travels with the body stream: the in-flight count drops
    // when the last chunk has been relayed, not when headers go out.
    let body = Body::from_stream(upstream.bytes_stream().map(move |chunk| {
        let _held = &backend;
        chunk
    }));

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

fn status_response(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

/// Removes connection-scoped headers that must not cross the proxy, plus
/// any inbound copy of the trace header.
fn strip_hop_headers(headers: &mut HeaderMap) {
    for name in [
        header::CONNECTION,
        header::TE,
        header::TRAILER,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
    ] {
        headers.remove(&name);
    }
    headers.remove(HeaderName::from_static("keep-alive"));
    headers.remove(HeaderName::from_static("proxy-connection"));
    headers.remove(LB_FROM);
}
