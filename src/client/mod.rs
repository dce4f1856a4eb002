//! Client side of the SOCKS5 negotiation (RFC 1928 CONNECT with RFC 1929
//! username/password authentication).

use crate::{
    error::{Error, Result},
    protocol::{Address, AddressType, AuthMethod, Command, Reply, SUBNEGOTIATION_VERSION, UserKey, Version},
};
use async_trait::async_trait;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[async_trait]
pub trait Socks5Reader: AsyncReadExt + Unpin {
    async fn read_version(&mut self) -> Result<()> {
        match Version::try_from(self.read_u8().await?)? {
            Version::V5 => Ok(()),
            Version::V4 => Err(Error::InvalidVersion(Version::V4.into())),
        }
    }

    async fn read_method(&mut self) -> Result<AuthMethod> {
        Ok(AuthMethod::from(self.read_u8().await?))
    }

    async fn read_reply(&mut self) -> Result<()> {
        match Reply::from(self.read_u8().await?) {
            Reply::Succeeded => Ok(()),
            reply => Err(Error::Rejected(reply)),
        }
    }

    async fn read_reserved(&mut self) -> Result<()> {
        let value = self.read_u8().await?;
        match value {
            0x00 => Ok(()),
            _ => Err(Error::InvalidReserved(value)),
        }
    }

    async fn read_address(&mut self) -> Result<Address> {
        let addr = match AddressType::try_from(self.read_u8().await?)? {
            AddressType::IPv4 => {
                let mut ip = [0; 4];
                self.read_exact(&mut ip).await?;
                let port = self.read_u16().await?;
                Address::from(SocketAddr::from((Ipv4Addr::from(ip), port)))
            }
            AddressType::IPv6 => {
                let mut ip = [0; 16];
                self.read_exact(&mut ip).await?;
                let port = self.read_u16().await?;
                Address::from(SocketAddr::from((Ipv6Addr::from(ip), port)))
            }
            AddressType::Domain => {
                let len = self.read_u8().await? as usize;
                let mut host = vec![0; len];
                self.read_exact(&mut host).await?;
                let port = self.read_u16().await?;
                Address::DomainAddress(String::from_utf8(host)?, port)
            }
        };
        Ok(addr)
    }

    async fn read_auth_status(&mut self) -> Result<()> {
        let version = self.read_u8().await?;
        if version != SUBNEGOTIATION_VERSION {
            return Err(Error::InvalidAuthSubnegotiation(version));
        }
        let status = self.read_u8().await?;
        if status != 0x00 {
            return Err(Error::InvalidAuthStatus(status));
        }
        Ok(())
    }

    async fn read_selection_msg(&mut self) -> Result<AuthMethod> {
        self.read_version().await?;
        self.read_method().await
    }

    /// Reads the CONNECT reply and returns the address the proxy bound for us.
    async fn read_final(&mut self) -> Result<Address> {
        self.read_version().await?;
        self.read_reply().await?;
        self.read_reserved().await?;
        self.read_address().await
    }
}

#[async_trait]
impl<T: AsyncReadExt + Unpin> Socks5Reader for T {}

#[async_trait]
pub trait Socks5Writer: AsyncWriteExt + Unpin {
    async fn write_address(&mut self, address: &Address) -> Result<()> {
        match address {
            Address::SocketAddress(SocketAddr::V4(addr)) => {
                self.write_u8(AddressType::IPv4.into()).await?;
                self.write_all(&addr.ip().octets()).await?;
                self.write_u16(addr.port()).await?;
            }
            Address::SocketAddress(SocketAddr::V6(addr)) => {
                self.write_u8(AddressType::IPv6.into()).await?;
                self.write_all(&addr.ip().octets()).await?;
                self.write_u16(addr.port()).await?;
            }
            Address::DomainAddress(domain, port) => {
                self.write_u8(AddressType::Domain.into()).await?;
                self.write_string(domain).await?;
                self.write_u16(*port).await?;
            }
        }
        Ok(())
    }

    /// Writes a length-prefixed string. Fields longer than 255 bytes cannot be encoded.
    async fn write_string(&mut self, string: &str) -> Result<()> {
        let bytes = string.as_bytes();
        if bytes.len() > u8::MAX as usize {
            return Err(format!("field of {} bytes exceeds the 255 byte limit", bytes.len()).into());
        }
        self.write_u8(bytes.len() as u8).await?;
        self.write_all(bytes).await?;
        Ok(())
    }

    async fn write_selection_msg(&mut self, methods: &[AuthMethod]) -> Result<()> {
        self.write_u8(Version::V5.into()).await?;
        self.write_u8(methods.len() as u8).await?;
        for method in methods {
            self.write_u8((*method).into()).await?;
        }
        self.flush().await?;
        Ok(())
    }

    async fn write_auth(&mut self, auth: &UserKey) -> Result<()> {
        self.write_u8(SUBNEGOTIATION_VERSION).await?;
        self.write_string(&auth.username).await?;
        self.write_string(&auth.password).await?;
        self.flush().await?;
        Ok(())
    }

    async fn write_final(&mut self, command: Command, addr: &Address) -> Result<()> {
        self.write_u8(Version::V5.into()).await?;
        self.write_u8(command.into()).await?;
        self.write_u8(0x00).await?;
        self.write_address(addr).await?;
        self.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl<T: AsyncWriteExt + Unpin> Socks5Writer for T {}

/// Proxifies a TCP connection. Performs the [`CONNECT`] command under the hood.
///
/// Only username/password authentication is offered, so a proxy that would
/// accept anonymous clients still sees the credentials.
///
/// [`CONNECT`]: https://tools.ietf.org/html/rfc1928#page-6
///
/// ```no_run
/// # use socks5_tls_forwarder::Result;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<()> {
/// use socks5_tls_forwarder::{client, protocol::UserKey};
/// use tokio::net::TcpStream;
///
/// let mut stream = TcpStream::connect("my-proxy-server.com:1080").await?;
/// let auth = UserKey::new("user", "secret");
/// client::connect(&mut stream, ("fapi.binance.com", 443), &auth).await?;
/// # Ok(())
/// # }
/// ```
pub async fn connect<S, A>(stream: &mut S, addr: A, auth: &UserKey) -> Result<Address>
where
    S: Socks5Writer + Socks5Reader + Send,
    A: Into<Address>,
{
    let addr: Address = addr.into();

    stream.write_selection_msg(&[AuthMethod::UserPass]).await?;
    match stream.read_selection_msg().await? {
        AuthMethod::UserPass => {
            stream.write_auth(auth).await?;
            stream.read_auth_status().await?;
        }
        method => return Err(Error::InvalidAuthMethod(method)),
    }

    stream.write_final(Command::Connect, &addr).await?;
    stream.read_final().await
}
