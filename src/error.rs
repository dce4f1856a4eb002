use crate::protocol::{AuthMethod, Reply};
use std::time::Duration;

/// The library's error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    FromUtf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid SOCKS version: {0:x}")]
    InvalidVersion(u8),
    #[error("Invalid address type: {0:x}")]
    InvalidAtyp(u8),
    #[error("Invalid reserved bytes: {0:x}")]
    InvalidReserved(u8),
    #[error("Invalid authentication status: {0:x}")]
    InvalidAuthStatus(u8),
    #[error("Invalid authentication version of subnegotiation: {0:x}")]
    InvalidAuthSubnegotiation(u8),

    #[error("Invalid authentication method: {0}")]
    InvalidAuthMethod(AuthMethod),

    #[error("Request rejected by proxy: {0}")]
    Rejected(Reply),

    #[error("TLS: {0}")]
    Tls(#[from] rustls::Error),

    #[error("{0}")]
    String(String),
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::String(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::String(s)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Error::Io(e.into())
    }
}

/// The library's `Result` type alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure to open a relayed TCP stream through the upstream SOCKS5 proxy.
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("proxy rejected authentication: {0}")]
    AuthRejected(String),
    #[error("proxy refused CONNECT: {0}")]
    ConnectRefused(Reply),
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),
    #[error("tunnel not established within {0:?}")]
    Timeout(Duration),
    #[error("malformed proxy negotiation: {0}")]
    Protocol(String),
}

impl TunnelError {
    pub fn kind(&self) -> &'static str {
        match self {
            TunnelError::AuthRejected(_) => "AuthRejected",
            TunnelError::ConnectRefused(_) => "ConnectRefused",
            TunnelError::NetworkUnreachable(_) => "NetworkUnreachable",
            TunnelError::Timeout(_) => "Timeout",
            TunnelError::Protocol(_) => "Protocol",
        }
    }
}

impl From<Error> for TunnelError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidAuthStatus(status) => TunnelError::AuthRejected(format!("status {status:#x}")),
            Error::InvalidAuthMethod(method) => TunnelError::AuthRejected(format!("proxy selected {method}")),
            Error::Rejected(reply @ (Reply::NetworkUnreachable | Reply::HostUnreachable)) => {
                TunnelError::NetworkUnreachable(reply.to_string())
            }
            Error::Rejected(reply) => TunnelError::ConnectRefused(reply),
            other => TunnelError::Protocol(other.to_string()),
        }
    }
}

/// Failure of one `forward()` call. Every variant is terminal for that call.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("tunnel failed: {0}")]
    TunnelFailed(#[from] TunnelError),
    #[error("TLS handshake failed: {0}")]
    TlsHandshakeFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("no response within {0:?}")]
    RequestTimeout(Duration),
    #[error("response read failed: {0}")]
    ResponseReadFailed(String),
}

impl ForwardError {
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::TunnelFailed(_) => "TunnelFailed",
            ForwardError::TlsHandshakeFailed(_) => "TlsHandshakeFailed",
            ForwardError::InvalidRequest(_) => "InvalidRequest",
            ForwardError::RequestFailed(_) => "RequestFailed",
            ForwardError::RequestTimeout(_) => "RequestTimeout",
            ForwardError::ResponseReadFailed(_) => "ResponseReadFailed",
        }
    }
}
