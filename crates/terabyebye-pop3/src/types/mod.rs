//! Core POP3 types.

mod stat;
mod status;

pub use stat::MailboxStat;
pub use status::{ResponseCode, Status};
