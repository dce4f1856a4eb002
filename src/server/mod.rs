//! The inbound HTTP surface: CORS preflight, method filtering, header
//! validation, and relaying forward results back as JSON responses.

use crate::{
    config::TargetEndpoint,
    error::{ForwardError, Result},
    forwarder::{Forward, ForwardResult},
};
use bytes::Bytes;
use http::{HeaderValue, Method, Request, Response, StatusCode, header};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::{body::Body, server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, task::JoinSet};
use tokio_util::sync::CancellationToken;

pub mod translate;

pub use self::translate::{Rejection, translate};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Largest inbound body accepted for forwarding.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// How long in-flight connections get to finish once shutdown is requested.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

const ALLOW_METHODS: &str = "POST, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, X-Target-Endpoint, X-Target-Method, X-Target-Query, X-API-Key";

/// The listening HTTP server.
///
/// Every accepted connection runs in its own task; a connection task that
/// fails or panics is reported and the server keeps accepting.
pub struct Server<F> {
    listener: TcpListener,
    forwarder: Arc<F>,
    target: Arc<TargetEndpoint>,
}

impl<F: Forward + 'static> Server<F> {
    pub fn new(listener: TcpListener, forwarder: Arc<F>, target: Arc<TargetEndpoint>) -> Self {
        Self {
            listener,
            forwarder,
            target,
        }
    }

    pub async fn bind(addr: SocketAddr, forwarder: Arc<F>, target: Arc<TargetEndpoint>) -> std::io::Result<Self> {
        let socket = if addr.is_ipv4() {
            tokio::net::TcpSocket::new_v4()?
        } else {
            tokio::net::TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(1024)?;
        Ok(Self::new(listener, forwarder, target))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `token` is cancelled, then waits a bounded
    /// time for in-flight connections before aborting the rest.
    pub async fn run(self, token: CancellationToken) -> Result<()> {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    log::info!("CancellationToken fired, no longer accepting connections");
                    break;
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            log::error!("accept failed: {err}");
                            continue;
                        }
                    };
                    let forwarder = self.forwarder.clone();
                    let target = self.target.clone();
                    connections.spawn(async move {
                        let service = service_fn(move |req| {
                            let forwarder = forwarder.clone();
                            let target = target.clone();
                            async move { Ok::<_, Infallible>(handle(req, forwarder.as_ref(), &target).await) }
                        });
                        if let Err(err) = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await {
                            log::debug!("connection from {peer} ended: {err}");
                        }
                    });
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    supervise(joined);
                }
            }
        }

        let drain = async {
            while let Some(joined) = connections.join_next().await {
                supervise(joined);
            }
        };
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            log::warn!("aborting {} connections still open after {DRAIN_TIMEOUT:?}", connections.len());
            connections.shutdown().await;
        }
        Ok(())
    }
}

fn supervise(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        if err.is_panic() {
            log::error!("connection task panicked: {err}");
        } else {
            log::debug!("connection task cancelled: {err}");
        }
    }
}

/// Answers one inbound call. Never fails: every error becomes a JSON response.
pub async fn handle<B, F>(req: Request<B>, forwarder: &F, target: &TargetEndpoint) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<BoxError>,
    F: Forward + ?Sized,
{
    if req.method() == Method::OPTIONS {
        return respond(StatusCode::OK, None);
    }
    if req.method() != Method::POST {
        return error_response(StatusCode::METHOD_NOT_ALLOWED, ErrorBody::plain("Method not allowed"));
    }

    let (parts, body) = req.into_parts();
    let request = match translate(&parts.headers, target) {
        Ok(request) => request,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, ErrorBody::plain(&rejection.to_string())),
    };

    let body = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            log::warn!("inbound body exceeds {MAX_BODY_BYTES} bytes");
            return error_response(StatusCode::PAYLOAD_TOO_LARGE, ErrorBody::plain("Request body too large"));
        }
        Err(err) => {
            log::warn!("failed to read inbound body: {err}");
            return error_response(StatusCode::BAD_REQUEST, ErrorBody::plain("Unreadable request body"));
        }
    };
    let request = if body.is_empty() { request } else { request.with_body(body) };

    match forwarder.forward(request).await {
        Ok(ForwardResult { status, body, .. }) => {
            log::info!("destination answered {status} with {} bytes", body.len());
            respond(status, Some(body))
        }
        Err(err) => {
            log::error!("proxy request failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, ErrorBody::forward(&err))
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl<'a> ErrorBody<'a> {
    fn plain(error: &'a str) -> Self {
        Self {
            error,
            kind: None,
            message: None,
        }
    }

    fn forward(err: &ForwardError) -> Self {
        Self {
            error: "Proxy request failed",
            kind: Some(err.kind()),
            message: Some(err.to_string()),
        }
    }
}

fn error_response(status: StatusCode, body: ErrorBody<'_>) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(&body).unwrap_or_else(|_| br#"{"error":"Internal error"}"#.to_vec());
    respond(status, Some(Bytes::from(body)))
}

/// Builds a response carrying the CORS headers. Bodies are always JSON.
fn respond(status: StatusCode, body: Option<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.clone().unwrap_or_default()));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOW_METHODS));
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOW_HEADERS));
    if body.is_some() {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    response
}
