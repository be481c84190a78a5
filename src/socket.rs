//! Socket abstraction (C1, §4.1): one contract over either a plain TCP
//! socket or a TLS stream, with in-place upgrade/downgrade so a control
//! connection can switch to TLS without reconnecting.

use crate::error::{FtpError, Result};
use rustls::pki_types::ServerName;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;

/// A byte-oriented connection that is either a plain TCP socket or a TLS
/// stream wrapping one. Both variants implement `Read`/`Write` uniformly so
/// callers never need to branch on the transport.
pub enum Socket {
    /// A bare TCP socket.
    Plain(TcpStream),
    /// A TLS stream, boxed to keep `Socket` itself small regardless of
    /// which variant is live.
    Tls(Box<rustls::StreamOwned<rustls::ClientConnection, TcpStream>>),
}

impl Socket {
    /// Connect a fresh plain TCP socket to `addr`, enabling `TCP_NODELAY`
    /// (§4.1: control sockets are tuned for low-latency request/response).
    pub fn connect(addr: SocketAddr) -> io::Result<Socket> {
        let tcp = TcpStream::connect(addr)?;
        tcp.set_nodelay(true)?;
        Ok(Socket::Plain(tcp))
    }

    /// Wrap an already-connected TCP socket without any transport change.
    pub fn from_tcp(tcp: TcpStream) -> Socket {
        Socket::Plain(tcp)
    }

    fn tcp(&self) -> &TcpStream {
        match self {
            Socket::Plain(t) => t,
            Socket::Tls(s) => &s.sock,
        }
    }

    /// `true` iff this socket is currently TLS-wrapped.
    pub fn is_tls(&self) -> bool {
        matches!(self, Socket::Tls(_))
    }

    /// The local endpoint of the underlying TCP socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.tcp().local_addr()
    }

    /// The remote endpoint of the underlying TCP socket.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.tcp().peer_addr()
    }

    /// Read up to `buf.len()` bytes, as `Read::read` would.
    pub fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }

    /// Upgrade a plain socket to TLS in place, performing a client-side
    /// handshake immediately (§4.1 "detach/re-wrap"; §4.3, §9 session
    /// resumption via a shared `Arc<rustls::ClientConfig>`).
    ///
    /// Consumes `self`; the underlying `TcpStream` is moved into the new
    /// variant rather than reconnected.
    pub fn upgrade_client(
        self,
        tls_config: Arc<rustls::ClientConfig>,
        server_name: ServerName<'static>,
    ) -> Result<Socket> {
        let tcp = match self {
            Socket::Plain(tcp) => tcp,
            Socket::Tls(_) => {
                return Err(FtpError::protocol("socket is already TLS-wrapped"));
            }
        };
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| FtpError::tls(e.to_string()))?;
        let mut stream = rustls::StreamOwned::new(conn, tcp);
        Self::drive_handshake(&mut stream)?;
        Ok(Socket::Tls(Box::new(stream)))
    }

    fn drive_handshake(
        stream: &mut rustls::StreamOwned<rustls::ClientConnection, TcpStream>,
    ) -> Result<()> {
        while stream.conn.is_handshaking() {
            stream
                .conn
                .complete_io(&mut stream.sock)
                .map_err(|e| FtpError::tls(e.to_string()))?;
        }
        Ok(())
    }

    /// Downgrade a TLS socket back to plain, discarding the TLS session.
    /// Used after `REIN`/`logout` swaps the control connection back to
    /// plain FTP (§4.6 `logout`).
    pub fn downgrade(self) -> Socket {
        match self {
            Socket::Tls(s) => Socket::Plain(s.sock),
            Socket::Plain(t) => Socket::Plain(t),
        }
    }

    /// Graceful shutdown: TLS `close_notify` if TLS, else `shutdown(Both)`;
    /// tolerates `NotConnected` always, and `UnexpectedEof`/`ConnectionReset`
    /// for the TLS close-notify round-trip (§4.1, §7 point 5).
    pub fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Socket::Plain(t) => tolerate_shutdown_errors(t.shutdown(Shutdown::Both)),
            Socket::Tls(s) => {
                s.conn.send_close_notify();
                match s.conn.complete_io(&mut s.sock) {
                    Ok(_) => {}
                    Err(e) if is_tolerated_tls_shutdown_error(&e) => {}
                    Err(e) => return Err(e),
                }
                tolerate_shutdown_errors(s.sock.shutdown(Shutdown::Both))
            }
        }
    }

    /// Abortive close: no shutdown handshake, just drop the socket.
    pub fn close_abortive(self) {
        drop(self);
    }
}

fn tolerate_shutdown_errors(r: io::Result<()>) -> io::Result<()> {
    match r {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
        Err(e) => Err(e),
    }
}

fn is_tolerated_tls_shutdown_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::NotConnected
    )
}

impl Read for Socket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Socket::Plain(t) => t.read(buf),
            Socket::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Socket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Socket::Plain(t) => t.write(buf),
            Socket::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Socket::Plain(t) => t.flush(),
            Socket::Tls(s) => s.flush(),
        }
    }
}
