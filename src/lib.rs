//! A blocking FTP client conforming to RFC 959, with RFC 2428 (EPSV/EPRT),
//! RFC 3659 (SIZE, MDTM), and RFC 4217 (explicit FTPS) extensions.
//!
//! The client is synchronous and single-session: every [`Client`] method
//! blocks the calling thread until the operation completes, and a `Client`
//! is not safe to share across threads without external synchronization.
//!
//! ```no_run
//! use ftp_rs::{Client, ClientConfig};
//!
//! # fn main() -> ftp_rs::Result<()> {
//! let mut client = Client::new(ClientConfig::plain());
//! client.connect("ftp.example.com", 21, Some("anonymous"), "guest@example.com")?;
//! let (_, names) = client.get_file_list(None, true)?;
//! for name in names {
//!     println!("{name}");
//! }
//! client.disconnect(true)?;
//! # Ok(())
//! # }
//! ```

/// Bidirectional ASCII/CRLF line-ending translation for `TYPE A` transfers.
pub mod ascii;
/// The high-level client state machine: connect, login, directory and
/// metadata commands, transfers.
pub mod client;
/// Construction-time options for a [`Client`].
pub mod config;
/// One-shot bulk data connection: PASV/EPSV/PORT/EPRT negotiation and the
/// send/recv transfer loops.
pub mod data;
/// The crate's error type.
pub mod error;
/// Synchronous observer hooks for connect/request/reply/file-list events.
pub mod observer;
/// Control connection framing: command send, multi-line reply parsing.
pub mod protocol;
/// The parsed server-reply model and its positivity aggregator.
pub mod reply;
/// The plain/TLS socket abstraction shared by control and data connections.
pub mod socket;
/// TLS client configuration helpers.
pub mod tls;

pub use client::Client;
pub use config::{ClientConfig, TransferMode, TransferType};
pub use data::{DataConnection, DataConnectionState, TransferCallback};
pub use error::{FtpError, Result};
pub use observer::{Observer, ObserverList};
pub use protocol::ControlConnection;
pub use reply::{ModifiedTime, Replies, Reply};
pub use socket::Socket;
