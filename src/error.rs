//! Error taxonomy for the FTP client (§7, §4.8 of the design).

use thiserror::Error;

/// Errors produced by the FTP client.
///
/// A negative server reply is *not* represented here — it is surfaced as a
/// [`crate::reply::Reply`]/[`crate::reply::Replies`] value whose
/// `is_positive()` is `false`. Only conditions that prevent an operation
/// from completing at all live in this enum.
#[derive(Error, Debug)]
pub enum FtpError {
    /// Any socket read/write/connect/accept/shutdown failure not in the
    /// tolerated-error set (§7 point 5).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or shutdown failure. Treated as an I/O error for
    /// control-flow purposes, but kept distinct for caller diagnostics.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Unparseable status code, or a malformed PASV/EPSV/PORT/EPRT/SIZE/MDTM
    /// payload.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An operation requires a capability the client was not configured
    /// with, e.g. an IPv6 active-mode listener with RFC 2428 support
    /// disabled.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl FtpError {
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        FtpError::Protocol(msg.into())
    }

    pub(crate) fn tls(msg: impl Into<String>) -> Self {
        FtpError::Tls(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        FtpError::Unsupported(msg.into())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, FtpError>;
