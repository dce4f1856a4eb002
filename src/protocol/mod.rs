//! SOCKS5 wire vocabulary needed by a CONNECT-only, password-authenticating client.

mod address;
mod auth_method;
mod command;
mod reply;

pub use self::{
    address::{Address, AddressType},
    auth_method::AuthMethod,
    command::Command,
    reply::Reply,
};

/// Version byte of the RFC 1929 username/password sub-negotiation.
pub const SUBNEGOTIATION_VERSION: u8 = 0x01;

/// SOCKS protocol version, either 4 or 5
#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub enum Version {
    V4 = 4,
    #[default]
    V5 = 5,
}

impl TryFrom<u8> for Version {
    type Error = crate::Error;

    fn try_from(value: u8) -> crate::Result<Self> {
        match value {
            4 => Ok(Version::V4),
            5 => Ok(Version::V5),
            _ => Err(crate::Error::InvalidVersion(value)),
        }
    }
}

impl From<Version> for u8 {
    fn from(v: Version) -> Self {
        v as u8
    }
}

/// RFC 1929 credentials. The password is redacted from `Debug` output.
#[derive(Default, Eq, PartialEq, Clone, Hash)]
pub struct UserKey {
    pub username: String,
    pub password: String,
}

impl UserKey {
    pub fn new<U, P>(username: U, password: P) -> Self
    where
        U: Into<String>,
        P: Into<String>,
    {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for UserKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserKey")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
