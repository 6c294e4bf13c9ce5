//! POP3 status indicators and extended response codes.

use std::fmt;

/// Status line returned by the server for every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// `true` for `+OK`, `false` for `-ERR`.
    pub ok: bool,
    /// Extended response code (RFC 2449), if present.
    pub code: Option<ResponseCode>,
    /// Remaining text after the indicator and code.
    pub text: String,
}

impl Status {
    /// Creates a `+OK` status.
    #[must_use]
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            ok: true,
            code: None,
            text: text.into(),
        }
    }

    /// Creates a `-ERR` status.
    #[must_use]
    pub fn err(code: Option<ResponseCode>, text: impl Into<String>) -> Self {
        Self {
            ok: false,
            code,
            text: text.into(),
        }
    }

    /// Returns true if this is a positive response.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.ok
    }
}

/// Extended response codes from RFC 2449 and RFC 3206.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// `[IN-USE]` - the maildrop is locked by another session.
    InUse,
    /// `[LOGIN-DELAY]` - logging in too frequently.
    LoginDelay,
    /// `[SYS/TEMP]` - temporary system problem.
    SysTemp,
    /// `[SYS/PERM]` - permanent system problem.
    SysPerm,
    /// `[AUTH]` - credentials were rejected.
    Auth,
    /// Any other code.
    Other(String),
}

impl ResponseCode {
    /// Parses a response code without the surrounding brackets.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "IN-USE" => Self::InUse,
            "LOGIN-DELAY" => Self::LoginDelay,
            "SYS/TEMP" => Self::SysTemp,
            "SYS/PERM" => Self::SysPerm,
            "AUTH" => Self::Auth,
            _ => Self::Other(s.to_string()),
        }
    }

    /// Returns true if a retry after a pause may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::InUse | Self::LoginDelay | Self::SysTemp)
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InUse => write!(f, "IN-USE"),
            Self::LoginDelay => write!(f, "LOGIN-DELAY"),
            Self::SysTemp => write!(f, "SYS/TEMP"),
            Self::SysPerm => write!(f, "SYS/PERM"),
            Self::Auth => write!(f, "AUTH"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_codes() {
        assert_eq!(ResponseCode::parse("IN-USE"), ResponseCode::InUse);
        assert_eq!(ResponseCode::parse("sys/temp"), ResponseCode::SysTemp);
        assert_eq!(ResponseCode::parse("AUTH"), ResponseCode::Auth);
        assert_eq!(
            ResponseCode::parse("UTF8"),
            ResponseCode::Other("UTF8".into())
        );
    }

    #[test]
    fn transient_codes() {
        assert!(ResponseCode::InUse.is_transient());
        assert!(ResponseCode::LoginDelay.is_transient());
        assert!(!ResponseCode::SysPerm.is_transient());
        assert!(!ResponseCode::Auth.is_transient());
    }

    #[test]
    fn display_round_trips_known_codes() {
        for code in [
            ResponseCode::InUse,
            ResponseCode::LoginDelay,
            ResponseCode::SysTemp,
            ResponseCode::SysPerm,
            ResponseCode::Auth,
        ] {
            assert_eq!(ResponseCode::parse(&code.to_string()), code);
        }
    }
}
