#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Default)]
pub enum Reply {
    #[default]
    Succeeded = 0x00,
    GeneralFailure = 0x01,
    ConnectionNotAllowed = 0x02,
    NetworkUnreachable = 0x03,
    HostUnreachable = 0x04,
    ConnectionRefused = 0x05,
    TtlExpired = 0x06,
    CommandNotSupported = 0x07,
    AddressTypeNotSupported = 0x08,
    /// Codes 0x09..=0xff are unassigned by RFC 1928.
    Unassigned(u8),
}

impl From<u8> for Reply {
    fn from(code: u8) -> Self {
        match code {
            0x00 => Reply::Succeeded,
            0x01 => Reply::GeneralFailure,
            0x02 => Reply::ConnectionNotAllowed,
            0x03 => Reply::NetworkUnreachable,
            0x04 => Reply::HostUnreachable,
            0x05 => Reply::ConnectionRefused,
            0x06 => Reply::TtlExpired,
            0x07 => Reply::CommandNotSupported,
            0x08 => Reply::AddressTypeNotSupported,
            code => Reply::Unassigned(code),
        }
    }
}

impl From<Reply> for u8 {
    fn from(reply: Reply) -> Self {
        match reply {
            Reply::Succeeded => 0x00,
            Reply::GeneralFailure => 0x01,
            Reply::ConnectionNotAllowed => 0x02,
            Reply::NetworkUnreachable => 0x03,
            Reply::HostUnreachable => 0x04,
            Reply::ConnectionRefused => 0x05,
            Reply::TtlExpired => 0x06,
            Reply::CommandNotSupported => 0x07,
            Reply::AddressTypeNotSupported => 0x08,
            Reply::Unassigned(code) => code,
        }
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Succeeded => write!(f, "succeeded"),
            Reply::GeneralFailure => write!(f, "general SOCKS server failure"),
            Reply::ConnectionNotAllowed => write!(f, "connection not allowed by ruleset"),
            Reply::NetworkUnreachable => write!(f, "network unreachable"),
            Reply::HostUnreachable => write!(f, "host unreachable"),
            Reply::ConnectionRefused => write!(f, "connection refused"),
            Reply::TtlExpired => write!(f, "TTL expired"),
            Reply::CommandNotSupported => write!(f, "command not supported"),
            Reply::AddressTypeNotSupported => write!(f, "address type not supported"),
            Reply::Unassigned(code) => write!(f, "unassigned reply {code:#x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_from_u8() {
        assert_eq!(Reply::from(0x00), Reply::Succeeded);
        assert_eq!(Reply::from(0x02), Reply::ConnectionNotAllowed);
        assert_eq!(Reply::from(0x04), Reply::HostUnreachable);
        assert_eq!(Reply::from(0x05), Reply::ConnectionRefused);
        assert_eq!(Reply::from(0x08), Reply::AddressTypeNotSupported);
        assert_eq!(Reply::from(0x09), Reply::Unassigned(0x09));
    }

    #[test]
    fn reply_into_u8() {
        assert_eq!(u8::from(Reply::Succeeded), 0x00);
        assert_eq!(u8::from(Reply::NetworkUnreachable), 0x03);
        assert_eq!(u8::from(Reply::TtlExpired), 0x06);
        assert_eq!(u8::from(Reply::Unassigned(0x7f)), 0x7f);
    }
}
