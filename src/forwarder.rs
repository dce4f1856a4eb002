//! One HTTPS exchange per call, layered by hand on top of a SOCKS5 tunnel:
//! tunnel connect, then TLS handshake on the relayed socket, then a single
//! HTTP/1.1 request/response, then teardown.

use crate::{
    config::{ForwarderConfig, TargetEndpoint, Timeouts},
    error::{Error, ForwardError, Result},
    tls,
    tunnel::TunnelConnector,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Method, Request, StatusCode, Version};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use std::{sync::Arc, time::Duration};
use tokio::{io::AsyncWriteExt, net::TcpStream};
use tokio_rustls::{TlsConnector, client::TlsStream};

/// Upper bound for the polite close after a successful exchange.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// The request to replay against the destination. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetRequest {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
}

impl TargetRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Builds the HTTP/1.1 message. Only the caller's headers are set.
    fn to_http(&self) -> Result<Request<Full<Bytes>>, ForwardError> {
        let method = Method::from_bytes(self.method.as_bytes()).map_err(|e| ForwardError::InvalidRequest(format!("method {:?}: {e}", self.method)))?;
        let mut builder = Request::builder().method(method).uri(self.path.as_str()).version(Version::HTTP_11);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
            .body(Full::new(self.body.clone().unwrap_or_default()))
            .map_err(|e| ForwardError::InvalidRequest(e.to_string()))
    }
}

/// What the destination answered, with the body fully accumulated.
#[derive(Clone, Debug)]
pub struct ForwardResult {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Anything able to carry a [`TargetRequest`] to the destination.
#[async_trait]
pub trait Forward: Send + Sync {
    async fn forward(&self, request: TargetRequest) -> Result<ForwardResult, ForwardError>;
}

/// Runs one independent pipeline per [`forward`](Forward::forward) call.
///
/// The forwarder only holds immutable configuration; every call opens its own
/// tunnel and TLS session and tears them down before returning.
#[derive(Clone)]
pub struct SecureRequestForwarder {
    connector: TunnelConnector,
    tls: TlsConnector,
    target: Arc<TargetEndpoint>,
    server_name: ServerName<'static>,
    timeouts: Timeouts,
}

impl SecureRequestForwarder {
    pub fn new(config: &ForwarderConfig) -> Result<Self> {
        let server_name = tls::server_name(&config.target.host).map_err(Error::String)?;
        Ok(Self {
            connector: TunnelConnector::new(Arc::new(config.proxy.clone()), config.timeouts.connect),
            tls: tls::build_connector(&config.tls)?,
            target: Arc::new(config.target.clone()),
            server_name,
            timeouts: config.timeouts,
        })
    }

    async fn run(&self, request: TargetRequest) -> Result<ForwardResult, ForwardError> {
        let outgoing = request.to_http()?;

        let stream = self.connector.connect(&self.target).await?;

        let handshake = self.tls.connect(self.server_name.clone(), stream);
        let session = match tokio::time::timeout(self.timeouts.handshake, handshake).await {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => return Err(ForwardError::TlsHandshakeFailed(e.to_string())),
            Err(_) => {
                let msg = format!("no handshake within {:?}", self.timeouts.handshake);
                return Err(ForwardError::TlsHandshakeFailed(msg));
            }
        };
        log::debug!("TLS session with {} established over tunnel", self.target);

        let (mut sender, connection) = http1::handshake(TokioIo::new(session))
            .await
            .map_err(|e| ForwardError::RequestFailed(e.to_string()))?;

        let exchange = async move {
            let response = sender
                .send_request(outgoing)
                .await
                .map_err(|e| ForwardError::RequestFailed(e.to_string()))?;
            let (head, mut body) = response.into_parts();
            log::debug!("{} {} -> {}", request.method(), request.path(), head.status);

            let mut buf = BytesMut::new();
            while let Some(frame) = body.frame().await {
                let frame = frame.map_err(|e| ForwardError::ResponseReadFailed(e.to_string()))?;
                if let Ok(chunk) = frame.into_data() {
                    log::trace!("received {} byte chunk", chunk.len());
                    buf.extend_from_slice(&chunk);
                }
            }
            Ok::<_, ForwardError>(ForwardResult {
                status: head.status,
                headers: head.headers,
                body: buf.freeze(),
            })
        };

        // The exchange drops its sender when done, which lets the connection
        // finish and hand the TLS session back for an orderly close.
        let (result, connection) = tokio::time::timeout(self.timeouts.request, async {
            tokio::join!(exchange, connection.without_shutdown())
        })
        .await
        .map_err(|_| ForwardError::RequestTimeout(self.timeouts.request))?;

        let response = result?;
        match connection {
            Ok(parts) => close(parts.io.into_inner()).await,
            Err(e) => log::debug!("connection to {} ended uncleanly after the response: {e}", self.target),
        }
        Ok(response)
    }
}

#[async_trait]
impl Forward for SecureRequestForwarder {
    async fn forward(&self, request: TargetRequest) -> Result<ForwardResult, ForwardError> {
        self.run(request).await
    }
}

/// Sends close_notify, then shuts the raw socket. Failures are only logged.
async fn close(mut session: TlsStream<TcpStream>) {
    let closing = async {
        session.get_mut().1.send_close_notify();
        if let Err(e) = session.flush().await {
            log::warn!("error closing TLS session: {e}");
        }
        let (mut socket, _) = session.into_inner();
        if let Err(e) = socket.shutdown().await {
            log::warn!("error closing tunnel socket: {e}");
        }
    };
    if tokio::time::timeout(CLOSE_TIMEOUT, closing).await.is_err() {
        log::warn!("tunnel close did not finish within {CLOSE_TIMEOUT:?}, dropping it");
    }
}
