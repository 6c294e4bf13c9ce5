//! POP3 connection management with type-state pattern.

mod client;
mod framed;
mod stream;

pub use client::{Authorization, Client, DEFAULT_TIMEOUT, Transaction};
pub use framed::FramedStream;
pub use stream::{Pop3Stream, connect_plain, connect_tls, create_tls_connector};
