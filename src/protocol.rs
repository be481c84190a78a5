//! Control connection framing (C2, §4.2): one command per line out, one
//! (possibly multi-line) reply in, plus the RFC 959 `421` shutdown sequence.

use crate::error::{FtpError, Result};
use crate::reply::Reply;
use crate::socket::Socket;
use std::io::{ErrorKind, Read, Write};
use std::net::SocketAddr;

/// The long-lived control channel: one socket, plus the growable read
/// accumulator that carries any bytes read past the previous reply's
/// terminator over to the next `read_reply` call.
pub struct ControlConnection {
    socket: Socket,
    buf: Vec<u8>,
    connected: bool,
}

impl ControlConnection {
    /// Take ownership of an already-connected socket.
    pub fn new(socket: Socket) -> Self {
        Self {
            socket,
            buf: Vec::new(),
            connected: true,
        }
    }

    /// `true` until a graceful/abortive teardown or a `421` reply closes
    /// the connection.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.peer_addr()
    }

    pub fn is_tls(&self) -> bool {
        self.socket.is_tls()
    }

    /// Replace the underlying socket (used when upgrading to or downgrading
    /// from TLS). The read accumulator is reset: by protocol convention the
    /// swap only ever happens immediately after a reply has been fully
    /// consumed, so no control-channel bytes are ever in flight at the swap
    /// point.
    pub fn replace_socket(&mut self, socket: Socket) {
        self.socket = socket;
        self.buf.clear();
    }

    pub(crate) fn socket_mut(&mut self) -> &mut Socket {
        &mut self.socket
    }

    /// Send one command line, appending `\r\n`.
    ///
    /// Callers are responsible for redacting `PASS` before observer
    /// dispatch (§4.2) — this method writes exactly the bytes it is given,
    /// but redacts its own `trace` log the same way (§4.10).
    pub fn send_command(&mut self, command: &str) -> Result<()> {
        tracing::trace!(command = %redact(command), ">>> command");
        let mut line = String::with_capacity(command.len() + 2);
        line.push_str(command);
        line.push_str("\r\n");
        self.socket.write_all(line.as_bytes())?;
        self.socket.flush()?;
        Ok(())
    }

    /// Read one raw line (through and including the first `\n`), or `None`
    /// on a clean EOF with no buffered bytes. An EOF that leaves buffered
    /// bytes with no terminator yields those bytes as a final "line".
    fn read_raw_line(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buf.drain(..=pos).collect();
                return Ok(Some(line));
            }
            let mut tmp = [0u8; 4096];
            let n = match self.socket.read(&mut tmp) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => 0,
                Err(e) => return Err(FtpError::Io(e)),
            };
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.buf)));
            }
            self.buf.extend_from_slice(&tmp[..n]);
        }
    }

    fn read_line_text(&mut self) -> Result<Option<String>> {
        let raw = match self.read_raw_line()? {
            Some(r) => r,
            None => return Ok(None),
        };
        let mut s = String::from_utf8_lossy(&raw).into_owned();
        if s.ends_with('\n') {
            s.pop();
        }
        if s.ends_with('\r') {
            s.pop();
        }
        Ok(Some(s))
    }

    /// Read one reply, implementing the RFC 959 multi-line grammar (§4.2).
    /// A `421` reply triggers the same teardown sequence as `disconnect`.
    pub fn read_reply(&mut self) -> Result<Reply> {
        let first = self
            .read_line_text()?
            .ok_or_else(|| FtpError::protocol("connection closed before a reply was received"))?;
        if first.len() < 4 {
            return Err(FtpError::protocol(format!(
                "reply line too short to contain a status code: {first:?}"
            )));
        }
        let code: u16 = first[..3]
            .parse()
            .map_err(|_| FtpError::protocol(format!("unparseable status code in {first:?}")))?;

        let mut lines = vec![first.clone()];
        if first.as_bytes()[3] == b'-' {
            let terminator_prefix = &first[..3];
            loop {
                let line = self
                    .read_line_text()?
                    .ok_or_else(|| FtpError::protocol("connection closed mid multi-line reply"))?;
                let is_terminator = line.len() >= 4
                    && &line[..3] == terminator_prefix
                    && line.as_bytes()[3] == b' ';
                lines.push(line);
                if is_terminator {
                    break;
                }
            }
        }

        let reply = Reply::new(code, lines.join("\r\n"));
        tracing::trace!(code, last_line = %lines.last().unwrap(), "<<< reply");
        if code == 421 {
            tracing::debug!("received 421, tearing down control connection");
            self.teardown();
        }
        Ok(reply)
    }

    /// Perform the teardown sequence used by both a `421` reply and an
    /// explicit `disconnect`: TLS close-notify if TLS, else `shutdown(Both)`,
    /// tolerating `NotConnected`/`UnexpectedEof`; then mark closed.
    pub fn teardown(&mut self) {
        if let Err(e) = self.socket.shutdown() {
            tracing::warn!(error = %e, "socket shutdown returned an untolerated error");
        }
        self.connected = false;
    }
}

/// Redact a `PASS` command's argument for logging, matching the observer
/// convention (§4.2, §4.10).
fn redact(command: &str) -> &str {
    if command.starts_with("PASS") {
        "PASS *****"
    } else {
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};

    fn pair_with_scripted_reply(script: &[u8]) -> (ControlConnection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (mut server, _) = listener.accept().unwrap();
        server.write_all(script).unwrap();
        (ControlConnection::new(Socket::from_tcp(client)), server)
    }

    #[test]
    fn single_line_reply() {
        let (mut cc, _server) = pair_with_scripted_reply(b"220 FTP server is ready.\r\n");
        let reply = cc.read_reply().unwrap();
        assert_eq!(reply.code(), Some(220));
        assert_eq!(reply.text(), "220 FTP server is ready.");
        assert!(reply.is_positive());
    }

    #[test]
    fn multi_line_reply() {
        let script = b"211-FTP server status:\r\n Connected to: 1.2.3.4:21\r\n Waiting for username.\r\n211 End of status.\r\n";
        let (mut cc, _server) = pair_with_scripted_reply(script);
        let reply = cc.read_reply().unwrap();
        assert_eq!(reply.code(), Some(211));
        assert_eq!(
            reply.text(),
            "211-FTP server status:\r\n Connected to: 1.2.3.4:21\r\n Waiting for username.\r\n211 End of status."
        );
    }

    #[test]
    fn multiline_continuation_heuristic_terminates_early() {
        // An intermediate line that happens to start with "211 " ends the
        // reply early — this is a latent RFC 959 behavior, not a bug (§9).
        let script = b"211-first\r\n211 looks like a terminator\r\n211 actual end\r\n";
        let (mut cc, _server) = pair_with_scripted_reply(script);
        let reply = cc.read_reply().unwrap();
        assert_eq!(reply.text(), "211-first\r\n211 looks like a terminator");
    }

    #[test]
    fn empty_text_single_line_reply() {
        let (mut cc, _server) = pair_with_scripted_reply(b"200 \r\n");
        let reply = cc.read_reply().unwrap();
        assert_eq!(reply.code(), Some(200));
        assert_eq!(reply.text(), "200 ");
    }

    #[test]
    fn code_421_tears_down_connection() {
        let (mut cc, _server) = pair_with_scripted_reply(b"421 Service not available.\r\n");
        let reply = cc.read_reply().unwrap();
        assert_eq!(reply.code(), Some(421));
        assert!(!cc.is_connected());
    }

    #[test]
    fn unparseable_code_is_protocol_error() {
        let (mut cc, _server) = pair_with_scripted_reply(b"abc not a code\r\n");
        let err = cc.read_reply().unwrap_err();
        assert!(matches!(err, FtpError::Protocol(_)));
    }

    #[test]
    fn surplus_bytes_carry_to_next_reply() {
        let script = b"220 hello.\r\n230 logged in.\r\n";
        let (mut cc, _server) = pair_with_scripted_reply(script);
        let r1 = cc.read_reply().unwrap();
        assert_eq!(r1.code(), Some(220));
        let r2 = cc.read_reply().unwrap();
        assert_eq!(r2.code(), Some(230));
    }

    #[test]
    fn size_reply_parses_through_the_wire_protocol() {
        let (mut cc, _server) = pair_with_scripted_reply(b"213 1234\r\n");
        let reply = cc.read_reply().unwrap();
        assert_eq!(reply.size(), Some(1234));
    }

    #[test]
    fn mdtm_reply_parses_through_the_wire_protocol() {
        let (mut cc, _server) = pair_with_scripted_reply(b"213 20240102030405\r\n");
        let reply = cc.read_reply().unwrap();
        let mt = reply.modified_time().unwrap();
        assert_eq!(mt.year, 2024);
        assert_eq!(mt.second, 5);
    }

    #[test]
    fn send_command_appends_crlf() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (mut server, _) = listener.accept().unwrap();
        let mut cc = ControlConnection::new(Socket::from_tcp(client));
        cc.send_command("NOOP").unwrap();
        let mut buf = [0u8; 6];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"NOOP\r\n");
    }
}
