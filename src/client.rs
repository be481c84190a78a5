//! Client state machine (C6, §4.6): the single high-level entry point
//! composing the control connection, data connection, ASCII codec, and
//! observer fan-out into the operations a caller actually invokes.

use crate::ascii::{AsciiDecoder, AsciiEncoder};
use crate::config::{ClientConfig, TransferType};
use crate::data::{DataConnection, NullCallback, TransferCallback};
use crate::error::{FtpError, Result};
use crate::observer::{Observer, ObserverList};
use crate::protocol::ControlConnection;
use crate::reply::{Reply, Replies};
use crate::socket::Socket;
use rustls::pki_types::ServerName;
use std::io::{Read, Write};
use std::net::ToSocketAddrs;
use std::sync::Arc;

/// A single-session FTP client. Owns at most one control connection and,
/// transiently, at most one data connection (§3). Not thread-safe —
/// callers must externally serialize (§5).
pub struct Client {
    control: Option<ControlConnection>,
    config: ClientConfig,
    observers: ObserverList,
    host: String,
}

impl Client {
    /// Construct a disconnected client with the given configuration.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            control: None,
            config,
            observers: ObserverList::new(),
            host: String::new(),
        }
    }

    /// Register an observer (§4.7).
    pub fn add_observer(&mut self, observer: Arc<dyn Observer>) {
        self.observers.add(observer);
    }

    /// Remove a previously registered observer.
    pub fn remove_observer(&mut self, observer: &Arc<dyn Observer>) {
        self.observers.remove(observer);
    }

    /// `true` until a graceful/abortive teardown or a `421` reply closes
    /// the control connection; `false` before the first `connect`.
    pub fn is_connected(&self) -> bool {
        self.control.as_ref().is_some_and(ControlConnection::is_connected)
    }

    /// The configured transfer mode/type and TLS/RFC 2428 options.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn control_mut(&mut self) -> Result<&mut ControlConnection> {
        self.control
            .as_mut()
            .ok_or_else(|| FtpError::protocol("not connected"))
    }

    /// Open the control connection, read the greeting, optionally
    /// negotiate explicit FTPS, and optionally log in (§4.6 `connect`).
    pub fn connect(
        &mut self,
        host: &str,
        port: u16,
        user: Option<&str>,
        password: &str,
    ) -> Result<Replies> {
        tracing::debug!(host, port, "connecting");
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| FtpError::protocol(format!("could not resolve {host}:{port}")))?;
        let socket = Socket::connect(addr)?;
        self.host = host.to_string();
        self.observers.dispatch_connected(host, port);

        let mut control = ControlConnection::new(socket);
        let mut replies = Replies::new();

        let greeting = control.read_reply()?;
        self.observers.dispatch_reply(&greeting);
        replies.push(greeting);
        self.control = Some(control);

        if self.config.tls.is_some() && replies.is_positive() {
            let reply = self.exchange("AUTH TLS")?;
            let upgrade_ok = reply.is_positive();
            replies.push(reply);
            if upgrade_ok {
                self.upgrade_control_to_tls()?;
            }
        }

        if let Some(user) = user {
            if replies.is_positive() {
                for r in self.login(user, password)? {
                    replies.push(r);
                }
            }
        }

        tracing::debug!(connected = replies.is_positive(), "connect finished");
        Ok(replies)
    }

    fn upgrade_control_to_tls(&mut self) -> Result<()> {
        tracing::debug!(host = %self.host, "handshaking TLS on control connection");
        let tls_config = self
            .config
            .tls
            .clone()
            .ok_or_else(|| FtpError::protocol("no TLS context configured"))?;
        let name = ServerName::try_from(self.host.clone())
            .map_err(|e| FtpError::tls(e.to_string()))?;
        let control = self.control_mut()?;
        let socket = std::mem::replace(control.socket_mut(), Socket::Plain(dummy_tcp()?));
        let upgraded = socket.upgrade_client(tls_config, name)?;
        control.replace_socket(upgraded);
        tracing::debug!("control connection TLS handshake complete");
        Ok(())
    }

    /// `USER` then (if challenged) `PASS`, then (if a TLS context is
    /// configured) `PBSZ 0`/`PROT P`, then a `TYPE` re-assertion (§4.6).
    pub fn login(&mut self, user: &str, password: &str) -> Result<Replies> {
        let mut replies = Replies::new();
        let user_reply = self.exchange(&format!("USER {user}"))?;
        let needs_password = user_reply.code() == Some(331);
        replies.push(user_reply);

        if needs_password {
            // `exchange` dispatches the raw command to `ObserverList`, which
            // redacts any `PASS`-prefixed command to `PASS *****` itself.
            replies.push(self.exchange(&format!("PASS {password}"))?);
        }

        if replies.is_positive() && self.config.tls.is_some() {
            replies.push(self.exchange("PBSZ 0")?);
            replies.push(self.exchange("PROT P")?);
        }

        if replies.is_positive() {
            let type_cmd = format!("TYPE {}", self.config.transfer_type.type_arg());
            replies.push(self.exchange(&type_cmd)?);
        }

        Ok(replies)
    }

    /// `REIN`; on success, downgrade an active TLS control connection
    /// back to plain (§4.6 `logout`).
    pub fn logout(&mut self) -> Result<Replies> {
        let mut replies = Replies::new();
        let reply = self.exchange("REIN")?;
        let was_positive = reply.is_positive();
        replies.push(reply);
        if was_positive {
            let control = self.control_mut()?;
            if control.is_tls() {
                let _ = control.socket_mut().shutdown();
                let socket = std::mem::replace(control.socket_mut(), Socket::Plain(dummy_tcp()?));
                control.replace_socket(socket.downgrade());
            }
        }
        Ok(replies)
    }

    // ─── Directory & metadata: one command, one reply ───────────────

    pub fn cwd(&mut self, path: &str) -> Result<Reply> {
        self.exchange(&format!("CWD {path}"))
    }

    pub fn cdup(&mut self) -> Result<Reply> {
        self.exchange("CDUP")
    }

    pub fn pwd(&mut self) -> Result<Reply> {
        self.exchange("PWD")
    }

    pub fn mkdir(&mut self, path: &str) -> Result<Reply> {
        self.exchange(&format!("MKD {path}"))
    }

    pub fn rmdir(&mut self, path: &str) -> Result<Reply> {
        self.exchange(&format!("RMD {path}"))
    }

    pub fn delete(&mut self, path: &str) -> Result<Reply> {
        self.exchange(&format!("DELE {path}"))
    }

    /// RFC 3659 `SIZE`. Use [`Reply::size`] to extract the byte count.
    pub fn size(&mut self, path: &str) -> Result<Reply> {
        self.exchange(&format!("SIZE {path}"))
    }

    /// RFC 3659 `MDTM`. Use [`Reply::modified_time`] to extract the timestamp.
    pub fn modified_time(&mut self, path: &str) -> Result<Reply> {
        self.exchange(&format!("MDTM {path}"))
    }

    pub fn stat(&mut self, path: Option<&str>) -> Result<Reply> {
        match path {
            Some(p) => self.exchange(&format!("STAT {p}")),
            None => self.exchange("STAT"),
        }
    }

    pub fn syst(&mut self) -> Result<Reply> {
        self.exchange("SYST")
    }

    pub fn help(&mut self, command: Option<&str>) -> Result<Reply> {
        match command {
            Some(c) => self.exchange(&format!("HELP {c}")),
            None => self.exchange("HELP"),
        }
    }

    pub fn site_help(&mut self) -> Result<Reply> {
        self.exchange("SITE HELP")
    }

    pub fn site(&mut self, args: &str) -> Result<Reply> {
        self.exchange(&format!("SITE {args}"))
    }

    pub fn noop(&mut self) -> Result<Reply> {
        self.exchange("NOOP")
    }

    /// `RNFR from` → if 350, `RNTO to` (§4.6 `rename`).
    pub fn rename(&mut self, from: &str, to: &str) -> Result<Replies> {
        let mut replies = Replies::new();
        let rnfr = self.exchange(&format!("RNFR {from}"))?;
        let ready = rnfr.code() == Some(350);
        replies.push(rnfr);
        if ready {
            replies.push(self.exchange(&format!("RNTO {to}"))?);
        }
        Ok(replies)
    }

    /// `TYPE I`/`TYPE A`; on success, update the stored transfer type.
    pub fn set_transfer_type(&mut self, ty: TransferType) -> Result<Reply> {
        let reply = self.exchange(&format!("TYPE {}", ty.type_arg()))?;
        if reply.is_positive() {
            self.config.transfer_type = ty;
        }
        Ok(reply)
    }

    /// `LIST`/`NLST`, captured into an in-memory buffer, split on `\n`
    /// with trailing `\r` stripped per line (§4.6 `get_file_list`).
    pub fn get_file_list(&mut self, path: Option<&str>, names_only: bool) -> Result<(Replies, Vec<String>)> {
        let verb = if names_only { "NLST" } else { "LIST" };
        let cmd = match path {
            Some(p) => format!("{verb} {p}"),
            None => verb.to_string(),
        };
        let mut buf = Vec::new();
        let (replies, _) = self.data_command_flow(&cmd, &mut NullCallback, |data, cb| {
            data.recv(&mut buf, cb)
        })?;
        let text = String::from_utf8_lossy(&buf).into_owned();
        self.observers.dispatch_file_list(&text);
        let lines = text
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
            .filter(|l| !l.is_empty())
            .collect();
        Ok((replies, lines))
    }

    /// `RETR path`, streamed through the ASCII codec when `transfer_type`
    /// is ASCII (§4.6 `download`).
    pub fn download(
        &mut self,
        sink: &mut dyn Write,
        path: &str,
        cb: Option<&mut dyn TransferCallback>,
    ) -> Result<Replies> {
        let cmd = format!("RETR {path}");
        let ascii = self.config.transfer_type == TransferType::Ascii;
        let mut null = NullCallback;
        let cb = cb.unwrap_or(&mut null);
        let (replies, _) = self.data_command_flow(&cmd, cb, |data, cb| {
            if ascii {
                let mut decoder = AsciiDecoder::new(&mut *sink);
                let n = data.recv(&mut decoder, cb)?;
                decoder.flush()?;
                Ok(n)
            } else {
                data.recv(sink, cb)
            }
        })?;
        Ok(replies)
    }

    /// `STOR path` or, if `unique`, `STOU`, streamed through the ASCII
    /// codec when `transfer_type` is ASCII (§4.6 `upload`).
    pub fn upload(
        &mut self,
        source: &mut dyn Read,
        path: &str,
        unique: bool,
        cb: Option<&mut dyn TransferCallback>,
    ) -> Result<Replies> {
        let cmd = if unique {
            "STOU".to_string()
        } else {
            format!("STOR {path}")
        };
        self.put(&cmd, source, cb)
    }

    /// `APPE path`, like `upload` (§4.6 `append`).
    pub fn append(
        &mut self,
        source: &mut dyn Read,
        path: &str,
        cb: Option<&mut dyn TransferCallback>,
    ) -> Result<Replies> {
        self.put(&format!("APPE {path}"), source, cb)
    }

    fn put(
        &mut self,
        cmd: &str,
        source: &mut dyn Read,
        cb: Option<&mut dyn TransferCallback>,
    ) -> Result<Replies> {
        let ascii = self.config.transfer_type == TransferType::Ascii;
        let mut null = NullCallback;
        let cb = cb.unwrap_or(&mut null);
        let (replies, _) = self.data_command_flow(cmd, cb, |data, cb| {
            if ascii {
                let mut encoder = AsciiEncoder::new(&mut *source);
                data.send(&mut encoder, cb)
            } else {
                data.send(source, cb)
            }
        })?;
        Ok(replies)
    }

    /// Close the session. If `graceful`, send `QUIT` and keep its reply
    /// first; either way, tear down the control connection (§4.6
    /// `disconnect`).
    pub fn disconnect(&mut self, graceful: bool) -> Result<Replies> {
        tracing::debug!(graceful, "disconnecting");
        let mut replies = Replies::new();
        if graceful {
            if self.control.is_some() {
                self.observers.dispatch_request("QUIT");
            }
            if let Ok(control) = self.control_mut() {
                let _ = control.send_command("QUIT");
                if let Ok(reply) = control.read_reply() {
                    self.observers.dispatch_reply(&reply);
                    replies.push(reply);
                }
            }
        }
        if let Some(control) = self.control.as_mut() {
            if control.is_connected() {
                control.teardown();
            }
        }
        Ok(replies)
    }

    // ─── Shared plumbing ──────────────────────────────────────────────

    /// Send one command line and read its single reply, dispatching the
    /// observer events (`PASS` redaction happens inside `dispatch_request`).
    fn exchange(&mut self, command: &str) -> Result<Reply> {
        self.observers.dispatch_request(command);
        let control = self.control_mut()?;
        control.send_command(command)?;
        let reply = control.read_reply()?;
        self.observers.dispatch_reply(&reply);
        Ok(reply)
    }

    /// The shared data-command flow (§4.6): negotiate a data connection,
    /// send the main command, transfer, close, and aggregate every reply
    /// seen along the way.
    fn data_command_flow<F>(
        &mut self,
        main_command: &str,
        cb: &mut dyn TransferCallback,
        mut body: F,
    ) -> Result<(Replies, u64)>
    where
        F: FnMut(&mut DataConnection, &mut dyn TransferCallback) -> Result<u64>,
    {
        let mut replies = Replies::new();
        let mode = self.config.transfer_mode;
        let rfc2428 = self.config.rfc2428_support;

        // Borrow `control` and `observers` as disjoint fields (not through
        // `self.control_mut()`, which ties up the whole of `self`) so
        // `prepare` can dispatch its own request/reply events for
        // PASV/EPSV/PORT/EPRT (§4.2, §4.6).
        let control = self
            .control
            .as_mut()
            .ok_or_else(|| FtpError::protocol("not connected"))?;
        let prepared = DataConnection::prepare(control, mode, rfc2428, &self.observers)?;
        let prepare_was_positive = prepared.reply.is_positive();
        replies.push(prepared.reply);
        let pending = match prepared.data {
            Some(p) => p,
            None => return Ok((replies, 0)),
        };
        debug_assert!(prepare_was_positive);

        self.observers.dispatch_request(main_command);
        let control = self.control_mut()?;
        control.send_command(main_command)?;
        let prelim = control.read_reply()?;
        self.observers.dispatch_reply(&prelim);
        let prelim_ok = prelim.is_positive();
        replies.push(prelim);
        if !prelim_ok {
            // The server rejected the main command outright; drop the
            // unconnected/unaccepted data channel without transferring.
            drop(pending);
            return Ok((replies, 0));
        }

        let tls = self.config.tls.clone().map(|cfg| {
            let name = ServerName::try_from(self.host.clone())
                .unwrap_or_else(|_| ServerName::try_from("localhost".to_string()).unwrap());
            (cfg, name)
        });
        let mut data = DataConnection::finalize(pending, tls)?;

        let transferred = body(&mut data, cb);

        match transferred {
            Ok(n) => {
                if cb.is_cancelled() {
                    self.abort_and_drain(&mut replies, data)?;
                } else {
                    data.close_graceful();
                    let control = self.control_mut()?;
                    let final_reply = control.read_reply()?;
                    self.observers.dispatch_reply(&final_reply);
                    replies.push(final_reply);
                }
                Ok((replies, n))
            }
            Err(e) => {
                data.close_abortive();
                Err(e)
            }
        }
    }

    /// Step 6 of the data-command flow: the transfer was cancelled, so
    /// send `ABOR`, read the 426 (if any) and the reply that follows it,
    /// and close the data connection abortively (§4.6, §8 scenario 7).
    fn abort_and_drain(&mut self, replies: &mut Replies, data: DataConnection) -> Result<()> {
        data.close_abortive();
        self.observers.dispatch_request("ABOR");
        let control = self.control_mut()?;
        control.send_command("ABOR")?;
        let first = control.read_reply()?;
        self.observers.dispatch_reply(&first);
        let saw_426 = first.code() == Some(426);
        replies.push(first);
        if saw_426 {
            let control = self.control_mut()?;
            let second = control.read_reply()?;
            self.observers.dispatch_reply(&second);
            replies.push(second);
        }
        Ok(())
    }
}

/// A throwaway, never-connected `TcpStream` placeholder used only as the
/// `mem::replace` source value while swapping a live socket out of
/// `ControlConnection` for its TLS-upgraded/downgraded replacement. It is
/// never read from or written to.
fn dummy_tcp() -> Result<std::net::TcpStream> {
    use std::net::{TcpListener, TcpStream};
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    Ok(TcpStream::connect(addr)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use std::net::TcpListener;
    use std::thread;

    fn spawn_fake_server(script: Vec<u8>) -> (u16, thread::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(&script).unwrap();
            let mut received = Vec::new();
            stream.set_read_timeout(Some(std::time::Duration::from_millis(200))).ok();
            let mut buf = [0u8; 1024];
            loop {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => received.extend_from_slice(&buf[..n]),
                }
            }
            received
        });
        (port, handle)
    }

    #[test]
    fn connect_reads_greeting() {
        let (port, handle) = spawn_fake_server(b"220 FTP server is ready.\r\n".to_vec());
        let mut client = Client::new(ClientConfig::plain());
        let replies = client.connect("127.0.0.1", port, None, "").unwrap();
        assert!(replies.is_positive());
        assert_eq!(replies.last().unwrap().code(), Some(220));
        assert!(client.is_connected());
        drop(client);
        let _ = handle.join();
    }

    #[test]
    fn login_sequence_without_tls() {
        let script = b"220 ready.\r\n331 need password.\r\n230 logged in.\r\n200 type set.\r\n".to_vec();
        let (port, handle) = spawn_fake_server(script);
        let mut client = Client::new(ClientConfig::plain());
        let replies = client
            .connect("127.0.0.1", port, Some("anonymous"), "guest@")
            .unwrap();
        assert!(replies.is_positive());
        assert_eq!(replies.len(), 4);
        let _ = handle.join();
    }

    #[test]
    fn rename_stops_if_rnfr_not_350() {
        let script = b"220 ready.\r\n550 no such file.\r\n".to_vec();
        let (port, handle) = spawn_fake_server(script);
        let mut client = Client::new(ClientConfig::plain());
        client.connect("127.0.0.1", port, None, "").unwrap();
        let replies = client.rename("missing", "new").unwrap();
        assert_eq!(replies.len(), 1);
        assert!(!replies.is_positive());
        let _ = handle.join();
    }

    #[test]
    fn negative_pasv_reply_aborts_data_flow() {
        let script = b"220 ready.\r\n502 PASV not implemented.\r\n".to_vec();
        let (port, handle) = spawn_fake_server(script);
        let mut client = Client::new(ClientConfig::plain().with_rfc2428_support(false));
        client.connect("127.0.0.1", port, None, "").unwrap();
        let mut sink = Vec::new();
        let replies = client.download(&mut sink, "f.txt", None).unwrap();
        assert_eq!(replies.len(), 1);
        assert!(!replies.is_positive());
        let _ = handle.join();
    }

    #[test]
    fn disconnect_sends_quit_and_tears_down() {
        let script = b"220 ready.\r\n221 bye.\r\n".to_vec();
        let (port, handle) = spawn_fake_server(script);
        let mut client = Client::new(ClientConfig::plain());
        client.connect("127.0.0.1", port, None, "").unwrap();
        let replies = client.disconnect(true).unwrap();
        assert_eq!(replies.last().unwrap().code(), Some(221));
        assert!(!client.is_connected());
        let _ = handle.join();
    }
}
