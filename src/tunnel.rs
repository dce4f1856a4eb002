use crate::{
    client,
    config::{ProxyCredentials, TargetEndpoint},
    error::TunnelError,
    protocol::Address,
};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpStream;

/// Opens raw TCP streams to the destination, relayed through the SOCKS5 upstream.
///
/// Nothing is cached between calls: every [`TunnelConnector::connect`] opens a
/// fresh connection to the proxy and negotiates from scratch.
#[derive(Clone, Debug)]
pub struct TunnelConnector {
    credentials: Arc<ProxyCredentials>,
    timeout: Duration,
}

impl TunnelConnector {
    pub fn new(credentials: Arc<ProxyCredentials>, timeout: Duration) -> Self {
        Self { credentials, timeout }
    }

    /// Returns the socket to the proxy once CONNECT succeeded. From then on it
    /// carries the destination's bytes unmodified.
    pub async fn connect(&self, destination: &TargetEndpoint) -> Result<TcpStream, TunnelError> {
        match tokio::time::timeout(self.timeout, self.establish(destination)).await {
            Ok(result) => result,
            Err(_) => Err(TunnelError::Timeout(self.timeout)),
        }
    }

    async fn establish(&self, destination: &TargetEndpoint) -> Result<TcpStream, TunnelError> {
        let proxy = (self.credentials.host.as_str(), self.credentials.port);
        let mut stream = TcpStream::connect(proxy).await.map_err(|e| {
            TunnelError::NetworkUnreachable(format!("{}:{}: {e}", self.credentials.host, self.credentials.port))
        })?;
        stream.set_nodelay(true).ok();
        log::trace!("connected to SOCKS5 proxy {}:{}", proxy.0, proxy.1);

        let addr = Address::from((destination.host.as_str(), destination.port));
        let bound = client::connect(&mut stream, addr, &self.credentials.auth).await?;
        log::debug!("SOCKS5 tunnel to {destination} established, proxy bound {bound}");

        Ok(stream)
    }
}
