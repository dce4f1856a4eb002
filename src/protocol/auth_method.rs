/// Authentication method carried in the SOCKS5 method-selection exchange.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Default)]
pub enum AuthMethod {
    #[default]
    NoAuth,
    /// RFC 1929 username/password, the only method this client offers.
    UserPass,
    /// X'FF': none of the offered methods is acceptable to the proxy.
    NoAcceptableMethods,
    /// GSS-API, IANA-reserved or private methods, never offered here.
    Other(u8),
}

impl From<u8> for AuthMethod {
    fn from(value: u8) -> Self {
        match value {
            0x00 => AuthMethod::NoAuth,
            0x02 => AuthMethod::UserPass,
            0xff => AuthMethod::NoAcceptableMethods,
            value => AuthMethod::Other(value),
        }
    }
}

impl From<AuthMethod> for u8 {
    fn from(value: AuthMethod) -> Self {
        match value {
            AuthMethod::NoAuth => 0x00,
            AuthMethod::UserPass => 0x02,
            AuthMethod::NoAcceptableMethods => 0xff,
            AuthMethod::Other(value) => value,
        }
    }
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            AuthMethod::NoAuth => write!(f, "NoAuth"),
            AuthMethod::UserPass => write!(f, "UserPass"),
            AuthMethod::NoAcceptableMethods => write!(f, "NoAcceptableMethods"),
            AuthMethod::Other(value) => write!(f, "Other({value:#x})"),
        }
    }
}
