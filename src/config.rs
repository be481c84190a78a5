//! Client construction options (§4.9, §6 "Configuration options").

use std::sync::Arc;

/// Which side of the data connection initiates the TCP handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransferMode {
    /// The client connects to a server-advertised port (PASV/EPSV).
    #[default]
    Passive,
    /// The client listens and the server connects (PORT/EPRT).
    Active,
}

/// Whether the sender applies line-ending translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransferType {
    /// Treat the byte stream as opaque.
    #[default]
    Binary,
    /// Translate host line endings to/from network CRLF in-band.
    Ascii,
}

impl TransferType {
    /// The `TYPE` command argument for this transfer type.
    pub(crate) fn type_arg(self) -> &'static str {
        match self {
            TransferType::Binary => "I",
            TransferType::Ascii => "A",
        }
    }
}

/// Construction-time options for a [`crate::client::Client`].
///
/// # Example
///
/// ```
/// use ftp_rs::{ClientConfig, TransferMode, TransferType};
///
/// let config = ClientConfig::plain()
///     .with_transfer_mode(TransferMode::Active)
///     .with_transfer_type(TransferType::Ascii);
/// assert_eq!(config.transfer_mode, TransferMode::Active);
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    /// Default transfer mode used for data-bearing commands. Default: passive.
    pub transfer_mode: TransferMode,
    /// Default transfer type. Default: binary.
    pub transfer_type: TransferType,
    /// TLS client configuration. `None` means plain FTP; `Some` enables
    /// explicit FTPS (RFC 4217) via `AUTH TLS` on connect.
    pub tls: Option<Arc<rustls::ClientConfig>>,
    /// Whether to prefer EPSV/EPRT (RFC 2428) over PASV/PORT. Default: on.
    pub rfc2428_support: bool,
}

impl ClientConfig {
    /// Construct a configuration with explicit values for every field.
    pub fn new(
        transfer_mode: TransferMode,
        transfer_type: TransferType,
        tls: Option<Arc<rustls::ClientConfig>>,
        rfc2428_support: bool,
    ) -> Self {
        Self {
            transfer_mode,
            transfer_type,
            tls,
            rfc2428_support,
        }
    }

    /// A plain (non-TLS) configuration with the defaults: passive mode,
    /// binary type, RFC 2428 enabled.
    pub fn plain() -> Self {
        Self {
            transfer_mode: TransferMode::Passive,
            transfer_type: TransferType::Binary,
            tls: None,
            rfc2428_support: true,
        }
    }

    /// A configuration that opportunistically upgrades the control
    /// connection to TLS via `AUTH TLS` (RFC 4217 explicit FTPS), sharing
    /// `tls_config`'s session cache between the control handshake and
    /// every subsequent data-channel handshake (§4.3, §9).
    pub fn explicit_tls(tls_config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            tls: Some(tls_config),
            ..Self::plain()
        }
    }

    /// Builder-style setter for `transfer_mode`.
    #[must_use]
    pub fn with_transfer_mode(mut self, mode: TransferMode) -> Self {
        self.transfer_mode = mode;
        self
    }

    /// Builder-style setter for `transfer_type`.
    #[must_use]
    pub fn with_transfer_type(mut self, ty: TransferType) -> Self {
        self.transfer_type = ty;
        self
    }

    /// Builder-style setter for `rfc2428_support`.
    #[must_use]
    pub fn with_rfc2428_support(mut self, enabled: bool) -> Self {
        self.rfc2428_support = enabled;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::plain()
    }
}
