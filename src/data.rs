//! Data connection (C3, §4.3): a one-shot bulk byte pipe opened fresh for
//! every transfer, in passive (connect) or active (listen+accept) mode,
//! optionally TLS-overlaid.

use crate::config::TransferMode;
use crate::error::{FtpError, Result};
use crate::observer::ObserverList;
use crate::protocol::ControlConnection;
use crate::socket::Socket;
use rustls::pki_types::ServerName;
use std::io::{Read, Write};
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;

const TRANSFER_CHUNK: usize = 8192;

/// Lifecycle states a [`DataConnection`] passes through (§3). The state is
/// tracked for observability/testing; the type system already prevents most
/// illegal transitions (e.g. `transfer` consumes `self`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataConnectionState {
    Idle,
    Listening,
    Connected,
    Transferring,
    Closed,
}

/// Callbacks a transfer polls after each 8 KiB block (§6 `TransferCallback`).
/// All methods default to a no-op/`false` so callers only override what they
/// need.
pub trait TransferCallback {
    fn begin(&mut self) {}
    fn notify(&mut self, _n: usize) {}
    fn end(&mut self) {}
    fn is_cancelled(&mut self) -> bool {
        false
    }
}

/// A no-op callback, used when the caller doesn't supply one.
pub struct NullCallback;
impl TransferCallback for NullCallback {}

/// A connected data channel, ready to transfer exactly one stream of bytes.
pub struct DataConnection {
    socket: Socket,
    state: DataConnectionState,
}

/// What `prepare` produced: either an already-connected passive socket, or
/// a bound listener waiting for the server to connect back (active mode).
pub enum PendingData {
    Connected(Socket),
    Listening(TcpListener),
}

/// Outcome of the PASV/EPSV/PORT/EPRT negotiation: the reply is always
/// returned for aggregation (§4.6 step 8); `data` is absent when the
/// server rejected the preparatory command, which per §4.6 "exceptional
/// paths" aborts the flow without that being an [`FtpError`].
pub struct Prepared {
    pub reply: crate::reply::Reply,
    pub data: Option<PendingData>,
}

impl DataConnection {
    pub fn state(&self) -> DataConnectionState {
        self.state
    }

    /// Step 1 of the data-command flow (§4.6): negotiate PASV/EPSV or
    /// PORT/EPRT over the control connection. For active mode this binds
    /// the listener and sends the command, but does **not** accept yet —
    /// the caller must send the main command and read its preliminary
    /// reply first (§4.6 step 2-3).
    pub fn prepare(
        control: &mut ControlConnection,
        mode: TransferMode,
        rfc2428_support: bool,
        observers: &ObserverList,
    ) -> Result<Prepared> {
        tracing::debug!(?mode, rfc2428_support, "preparing data connection");
        match mode {
            TransferMode::Passive => {
                if rfc2428_support {
                    open_epsv(control, observers)
                } else {
                    open_pasv(control, observers)
                }
            }
            TransferMode::Active => {
                if rfc2428_support {
                    open_eprt(control, observers)
                } else {
                    open_port(control, observers)
                }
            }
        }
    }

    /// Step 3-4 of the data-command flow: accept (active mode only), then
    /// TLS-wrap if a TLS config was supplied, sharing `tls_config` with the
    /// control connection's handshake for session resumption (§4.3, §9).
    pub fn finalize(
        pending: PendingData,
        tls: Option<(Arc<rustls::ClientConfig>, ServerName<'static>)>,
    ) -> Result<DataConnection> {
        let tcp = match pending {
            PendingData::Connected(Socket::Plain(tcp)) => tcp,
            PendingData::Connected(Socket::Tls(_)) => {
                return Err(FtpError::protocol("data socket already TLS before finalize"));
            }
            PendingData::Listening(listener) => {
                tracing::debug!("accepting incoming active-mode data connection");
                let (tcp, _peer) = listener.accept()?;
                tcp
            }
        };
        tcp.set_nodelay(true)?;
        let _ = configure_buffers(&tcp);

        let socket = match tls {
            Some((config, name)) => {
                tracing::debug!("handshaking TLS on data connection");
                Socket::from_tcp(tcp).upgrade_client(config, name)?
            }
            None => Socket::from_tcp(tcp),
        };

        tracing::debug!("data connection ready");
        Ok(DataConnection {
            socket,
            state: DataConnectionState::Connected,
        })
    }

    /// Upload: read up to 8 KiB at a time from `source`, write to the data
    /// socket, polling `cb` for cancellation after each write (§4.3).
    pub fn send(&mut self, source: &mut dyn Read, cb: &mut dyn TransferCallback) -> Result<u64> {
        if cb.is_cancelled() {
            return Ok(0);
        }
        self.state = DataConnectionState::Transferring;
        cb.begin();
        let mut buf = [0u8; TRANSFER_CHUNK];
        let mut total = 0u64;
        loop {
            let n = source.read(&mut buf)?;
            if n == 0 {
                break;
            }
            self.socket.write_all(&buf[..n])?;
            total += n as u64;
            cb.notify(n);
            if cb.is_cancelled() {
                break;
            }
        }
        cb.end();
        Ok(total)
    }

    /// Download: read up to 8 KiB at a time from the data socket, write to
    /// `sink`, polling `cb` for cancellation after each write (§4.3).
    pub fn recv(&mut self, sink: &mut dyn Write, cb: &mut dyn TransferCallback) -> Result<u64> {
        if cb.is_cancelled() {
            return Ok(0);
        }
        self.state = DataConnectionState::Transferring;
        cb.begin();
        let mut buf = [0u8; TRANSFER_CHUNK];
        let mut total = 0u64;
        loop {
            let n = self.socket.read_some(&mut buf)?;
            if n == 0 {
                break;
            }
            sink.write_all(&buf[..n])?;
            total += n as u64;
            cb.notify(n);
            if cb.is_cancelled() {
                break;
            }
        }
        sink.flush()?;
        cb.end();
        Ok(total)
    }

    /// Graceful close: TLS shutdown if TLS, else `shutdown(Both)`,
    /// tolerating `NotConnected`/`UnexpectedEof`.
    pub fn close_graceful(mut self) {
        let _ = self.socket.shutdown();
        self.state = DataConnectionState::Closed;
    }

    /// Abortive close: no shutdown handshake, used after a cancelled
    /// transfer so no final state is exchanged with the server (§4.3).
    pub fn close_abortive(self) {
        self.socket.close_abortive();
    }
}

fn configure_buffers(tcp: &TcpStream) -> std::io::Result<()> {
    // Enlarge OS socket buffers for bulk-transfer throughput. Failures are
    // tolerated — the OS clamps to its own ceiling regardless (§4.1) — but
    // logged, since a silently-unconfigured buffer is a throughput footgun.
    const BUFFER_SIZE: usize = 256 * 1024;
    let sock = socket2::SockRef::from(tcp);
    if let Err(e) = sock.set_recv_buffer_size(BUFFER_SIZE) {
        tracing::warn!(error = %e, size = BUFFER_SIZE, "failed to set data-socket recv buffer size");
    }
    if let Err(e) = sock.set_send_buffer_size(BUFFER_SIZE) {
        tracing::warn!(error = %e, size = BUFFER_SIZE, "failed to set data-socket send buffer size");
    }
    Ok(())
}

// ─── PASV ──────────────────────────────────────────────────────────────

fn open_pasv(control: &mut ControlConnection, observers: &ObserverList) -> Result<Prepared> {
    observers.dispatch_request("PASV");
    control.send_command("PASV")?;
    let reply = control.read_reply()?;
    observers.dispatch_reply(&reply);
    if !reply.is_positive() {
        return Ok(Prepared { reply, data: None });
    }
    let addr = parse_pasv(reply.text())?;
    let socket = Socket::connect(addr)?;
    Ok(Prepared {
        reply,
        data: Some(PendingData::Connected(socket)),
    })
}

/// Parse `(h1,h2,h3,h4,p1,p2)` out of a 227 reply: locate the outermost
/// parenthesis pair and split on `,` (§6).
fn parse_pasv(text: &str) -> Result<SocketAddr> {
    let open = text
        .find('(')
        .ok_or_else(|| FtpError::protocol("PASV reply missing '('"))?;
    let close = text
        .rfind(')')
        .ok_or_else(|| FtpError::protocol("PASV reply missing ')'"))?;
    if close <= open {
        return Err(FtpError::protocol("PASV reply has malformed parentheses"));
    }
    let inner = &text[open + 1..close];
    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
    if parts.len() != 6 {
        return Err(FtpError::protocol(format!(
            "PASV reply does not contain 6 fields: {inner:?}"
        )));
    }
    let nums: Vec<u16> = parts
        .iter()
        .map(|p| {
            p.parse::<u16>()
                .map_err(|_| FtpError::protocol(format!("PASV field not numeric: {p:?}")))
        })
        .collect::<Result<_>>()?;
    if nums.iter().any(|&n| n > 255) {
        return Err(FtpError::protocol("PASV field out of byte range"));
    }
    let ip = IpAddr::from([nums[0] as u8, nums[1] as u8, nums[2] as u8, nums[3] as u8]);
    let port = nums[4] * 256 + nums[5];
    Ok(SocketAddr::new(ip, port))
}

// ─── EPSV ──────────────────────────────────────────────────────────────

fn open_epsv(control: &mut ControlConnection, observers: &ObserverList) -> Result<Prepared> {
    let host_ip = control.peer_addr()?.ip();
    observers.dispatch_request("EPSV");
    control.send_command("EPSV")?;
    let reply = control.read_reply()?;
    observers.dispatch_reply(&reply);
    if !reply.is_positive() {
        return Ok(Prepared { reply, data: None });
    }
    let port = parse_epsv(reply.text())?;
    let socket = Socket::connect(SocketAddr::new(host_ip, port))?;
    Ok(Prepared {
        reply,
        data: Some(PendingData::Connected(socket)),
    })
}

/// Parse the port out of `(|||port|)` (§6): skip the four-byte `(|||`
/// prefix and trailing `)`.
fn parse_epsv(text: &str) -> Result<u16> {
    let open = text
        .find("(|||")
        .ok_or_else(|| FtpError::protocol("EPSV reply missing '(|||' prefix"))?;
    let start = open + 4;
    let rest = &text[start..];
    let close = rest
        .find(')')
        .ok_or_else(|| FtpError::protocol("EPSV reply missing ')'"))?;
    let digits = rest[..close]
        .trim_end_matches('|')
        .trim();
    digits
        .parse::<u16>()
        .map_err(|_| FtpError::protocol(format!("EPSV port not numeric: {digits:?}")))
}

// ─── PORT ──────────────────────────────────────────────────────────────

fn open_port(control: &mut ControlConnection, observers: &ObserverList) -> Result<Prepared> {
    let local = control.local_addr()?;
    let ip = match local.ip() {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(_) => {
            return Err(FtpError::unsupported(
                "PORT requires an IPv4 control connection; use EPRT for IPv6",
            ))
        }
    };
    let listener = bind_listener(SocketAddr::new(IpAddr::V4(ip), 0))?;
    let port = listener.local_addr()?.port();
    let octets = ip.octets();
    let cmd = format!(
        "PORT {},{},{},{},{},{}",
        octets[0],
        octets[1],
        octets[2],
        octets[3],
        port / 256,
        port % 256
    );
    observers.dispatch_request(&cmd);
    control.send_command(&cmd)?;
    let reply = control.read_reply()?;
    observers.dispatch_reply(&reply);
    if !reply.is_positive() {
        return Ok(Prepared { reply, data: None });
    }
    Ok(Prepared {
        reply,
        data: Some(PendingData::Listening(listener)),
    })
}

// ─── EPRT ──────────────────────────────────────────────────────────────

fn open_eprt(control: &mut ControlConnection, observers: &ObserverList) -> Result<Prepared> {
    let local = control.local_addr()?;
    let listener = bind_listener(SocketAddr::new(local.ip(), 0))?;
    let port = listener.local_addr()?.port();
    let af = match local.ip() {
        IpAddr::V4(_) => 1,
        IpAddr::V6(_) => 2,
    };
    let cmd = format!("EPRT |{}|{}|{}|", af, local.ip(), port);
    observers.dispatch_request(&cmd);
    control.send_command(&cmd)?;
    let reply = control.read_reply()?;
    observers.dispatch_reply(&reply);
    if !reply.is_positive() {
        return Ok(Prepared { reply, data: None });
    }
    Ok(Prepared {
        reply,
        data: Some(PendingData::Listening(listener)),
    })
}

/// Bind a TCP listener at `addr` with backlog 1 (§4.3: "bind a TCP listener
/// ... with an OS-assigned port; backlog = 1").
fn bind_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    use socket2::{Domain, Socket as Socket2, Type};
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket2::new(domain, Type::STREAM, Some(socket2::Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1)?;
    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pasv_from_spec_scenario() {
        let addr = parse_pasv("227 Entering Passive Mode (127,0,0,1,8,20).").unwrap();
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 8 * 256 + 20));
    }

    #[test]
    fn parse_epsv_from_spec_scenario() {
        let port = parse_epsv("229 Entering Extended Passive Mode (|||6446|)").unwrap();
        assert_eq!(port, 6446);
    }

    #[test]
    fn parse_pasv_rejects_malformed_payload() {
        assert!(parse_pasv("227 Entering Passive Mode").is_err());
        assert!(parse_pasv("227 (1,2,3,4,5)").is_err());
    }

    #[test]
    fn parse_epsv_rejects_malformed_payload() {
        assert!(parse_epsv("229 Entering Extended Passive Mode").is_err());
    }

    #[test]
    fn port_command_format() {
        // PORT a,b,c,d,p1,p2 — verify the splitting arithmetic directly.
        let port: u16 = 2068;
        assert_eq!(port / 256, 8);
        assert_eq!(port % 256, 20);
    }
}
