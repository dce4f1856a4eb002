//! Forwards plain HTTP calls to a fixed HTTPS API through an authenticated
//! SOCKS5 tunnel, layering TLS by hand on the relayed socket.

pub mod client;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod protocol;
pub mod server;
pub mod tls;
pub mod tunnel;

pub use crate::error::{Error, ForwardError, Result, TunnelError};
pub use crate::forwarder::{Forward, ForwardResult, SecureRequestForwarder, TargetRequest};
pub use crate::tunnel::TunnelConnector;
