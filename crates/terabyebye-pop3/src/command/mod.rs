//! POP3 command builder.

/// POP3 command.
#[derive(Clone, PartialEq, Eq)]
pub enum Command {
    /// USER - Name the maildrop
    User {
        /// Mailbox name
        name: String,
    },
    /// PASS - Supply the password
    Pass {
        /// Password
        password: String,
    },
    /// STAT - Maildrop count and size
    Stat,
    /// TOP - Headers plus the first `lines` body lines
    Top {
        /// Message number
        index: u32,
        /// Number of body lines
        lines: u32,
    },
    /// RETR - Whole message
    Retr {
        /// Message number
        index: u32,
    },
    /// DELE - Mark a message as deleted
    Dele {
        /// Message number
        index: u32,
    },
    /// RSET - Unmark all messages marked as deleted
    Rset,
    /// QUIT - Enter the UPDATE state and close
    Quit,
}

impl Command {
    /// Serializes the command to bytes.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = match self {
            Self::User { name } => format!("USER {name}").into_bytes(),
            Self::Pass { password } => format!("PASS {password}").into_bytes(),
            Self::Stat => b"STAT".to_vec(),
            Self::Top { index, lines } => format!("TOP {index} {lines}").into_bytes(),
            Self::Retr { index } => format!("RETR {index}").into_bytes(),
            Self::Dele { index } => format!("DELE {index}").into_bytes(),
            Self::Rset => b"RSET".to_vec(),
            Self::Quit => b"QUIT".to_vec(),
        };

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Returns true if the server answers this command with a multi-line response.
    #[must_use]
    pub const fn is_multiline(&self) -> bool {
        matches!(self, Self::Top { .. } | Self::Retr { .. })
    }

    /// Returns the command keyword, for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::User { .. } => "USER",
            Self::Pass { .. } => "PASS",
            Self::Stat => "STAT",
            Self::Top { .. } => "TOP",
            Self::Retr { .. } => "RETR",
            Self::Dele { .. } => "DELE",
            Self::Rset => "RSET",
            Self::Quit => "QUIT",
        }
    }
}

// Keeps the password out of logs.
impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass { .. } => write!(f, "Pass {{ password: \"***\" }}"),
            Self::User { name } => f.debug_struct("User").field("name", name).finish(),
            Self::Top { index, lines } => f
                .debug_struct("Top")
                .field("index", index)
                .field("lines", lines)
                .finish(),
            Self::Retr { index } => f.debug_struct("Retr").field("index", index).finish(),
            Self::Dele { index } => f.debug_struct("Dele").field("index", index).finish(),
            Self::Stat | Self::Rset | Self::Quit => write!(f, "{}", self.name()),
        }
    }
}
