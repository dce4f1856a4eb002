//! Process configuration: command line options with environment fallbacks,
//! converted once into an immutable [`ForwarderConfig`].

use crate::{protocol::UserKey, tls::TlsPolicy};
use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

/// The destination is always reached over HTTPS.
pub const HTTPS_PORT: u16 = 443;

/// Forwards plain HTTP requests to a fixed HTTPS API through a SOCKS5 proxy.
#[derive(clap::Parser, Debug, Clone, PartialEq, Eq)]
#[command(author, version, about, long_about = None)]
pub struct CmdOpt {
    /// Address the HTTP listener binds to.
    #[arg(long, env = "LISTEN_ADDR", value_name = "ip", default_value = "0.0.0.0")]
    pub listen_addr: IpAddr,

    /// Port the HTTP listener binds to.
    #[arg(long, env = "PORT", value_name = "port", default_value_t = 3000)]
    pub port: u16,

    /// Upstream SOCKS5 proxy host.
    #[arg(long, env = "SOCKS_HOST", value_name = "host", default_value = "127.0.0.1")]
    pub socks_host: String,

    /// Upstream SOCKS5 proxy port.
    #[arg(long, env = "SOCKS_PORT", value_name = "port", default_value_t = 1080)]
    pub socks_port: u16,

    /// Username for SOCKS5 authentication.
    #[arg(long, env = "SOCKS_USER", value_name = "username", default_value = "proxy")]
    pub socks_user: String,

    /// Password for SOCKS5 authentication.
    #[arg(long, env = "SOCKS_PASSWORD", value_name = "password", default_value = "", hide_env_values = true)]
    pub socks_password: String,

    /// Hostname of the HTTPS API every request is forwarded to.
    #[arg(long, env = "TARGET_HOST", value_name = "host", default_value = "fapi.binance.com")]
    pub target_host: String,

    /// Seconds allowed for the SOCKS5 connect and negotiation.
    #[arg(long = "connect-timeout", env = "CONNECT_TIMEOUT_SECS", value_name = "secs", default_value_t = 30)]
    pub connect_timeout_secs: u64,

    /// Seconds allowed for the TLS handshake over the tunnel.
    #[arg(long = "handshake-timeout", env = "HANDSHAKE_TIMEOUT_SECS", value_name = "secs", default_value_t = 30)]
    pub handshake_timeout_secs: u64,

    /// Seconds allowed from sending the request until the response body is complete.
    #[arg(long = "request-timeout", env = "REQUEST_TIMEOUT_SECS", value_name = "secs", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Accept any certificate from the destination. Unsafe, for debugging only.
    #[arg(long, env = "TLS_INSECURE_SKIP_VERIFY")]
    pub insecure_skip_verify: bool,

    /// Verbosity level
    #[arg(short, long, value_name = "level", value_enum, default_value = "info")]
    pub verbosity: ArgVerbosity,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum ArgVerbosity {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Where and how to reach the upstream SOCKS5 proxy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyCredentials {
    pub host: String,
    pub port: u16,
    pub auth: UserKey,
}

impl ProxyCredentials {
    pub fn new(host: impl Into<String>, port: u16, auth: UserKey) -> Self {
        Self {
            host: host.into(),
            port,
            auth,
        }
    }
}

/// The fixed remote API host requests are forwarded to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetEndpoint {
    pub host: String,
    pub port: u16,
}

impl TargetEndpoint {
    pub fn https(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: HTTPS_PORT,
        }
    }
}

impl std::fmt::Display for TargetEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Independent time budgets of one pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub handshake: Duration,
    pub request: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            handshake: Duration::from_secs(30),
            request: Duration::from_secs(30),
        }
    }
}

/// Everything a pipeline needs, built once at start and shared read-only.
#[derive(Clone, Debug)]
pub struct ForwarderConfig {
    pub proxy: ProxyCredentials,
    pub target: TargetEndpoint,
    pub timeouts: Timeouts,
    pub tls: TlsPolicy,
}

impl CmdOpt {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_addr, self.port)
    }

    pub fn forwarder_config(&self) -> ForwarderConfig {
        ForwarderConfig {
            proxy: ProxyCredentials::new(&self.socks_host, self.socks_port, UserKey::new(&self.socks_user, &self.socks_password)),
            target: TargetEndpoint::https(&self.target_host),
            timeouts: Timeouts {
                connect: Duration::from_secs(self.connect_timeout_secs),
                handshake: Duration::from_secs(self.handshake_timeout_secs),
                request: Duration::from_secs(self.request_timeout_secs),
            },
            tls: if self.insecure_skip_verify {
                TlsPolicy::InsecureSkipVerify
            } else {
                TlsPolicy::WebPkiRoots
            },
        }
    }
}
