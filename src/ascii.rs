//! ASCII transfer-type codec (C4, §4.4): bidirectional line-ending
//! translation between a host's native text form and the network's
//! NVT-ASCII CRLF form, streamed through fixed-size buffers.
//!
//! [`AsciiEncoder`] wraps a [`Read`] source (host → network, used for
//! upload) and itself implements `Read`. [`AsciiDecoder`] wraps a [`Write`]
//! sink (network → host, used for download) and itself implements `Write`.
//! Both compose with any existing reader/writer — `File`, `Vec<u8>`,
//! `Cursor`, a data-connection socket — without an adapter layer.
//!
//! On platforms whose native text form already uses CRLF (Windows), both
//! adapters become identity transforms; this is a runtime check
//! (`cfg!(windows)`) rather than a compile-time swap, so both code paths
//! are exercised uniformly in tests regardless of host platform (§9).

use std::collections::VecDeque;
use std::io::{self, Read, Write};

/// Translate one source byte into zero or more network bytes, appending
/// them to `out`. Mirrors §4.4's encoder state machine: a lone `\r` or `\n`
/// each become `\r\n`; an existing `\r\n` pair collapses to one `\r\n`.
#[derive(Default)]
struct EncodeState {
    /// The previous source byte was `\r`; an immediate `\n` is the second
    /// half of that CRLF pair and must not trigger a second one.
    suppress_next_lf: bool,
}

impl EncodeState {
    fn process(&mut self, b: u8, out: &mut VecDeque<u8>) {
        match b {
            b'\r' => {
                out.push_back(b'\r');
                out.push_back(b'\n');
                self.suppress_next_lf = true;
            }
            b'\n' => {
                if self.suppress_next_lf {
                    self.suppress_next_lf = false;
                } else {
                    out.push_back(b'\r');
                    out.push_back(b'\n');
                }
            }
            other => {
                out.push_back(other);
                self.suppress_next_lf = false;
            }
        }
    }
}

/// Host → network ASCII encoder, used for uploads. Wraps a [`Read`] source
/// of host-native bytes and yields NVT-ASCII (CRLF-terminated) bytes.
///
/// Output is buffered internally (a `VecDeque<u8>`) so that a single source
/// byte producing two output bytes (`\r` → `\r\n`) never loses a byte at a
/// caller-buffer boundary — this queue is the idiomatic generalization of
/// the single-bit `pending_lf` flag described in the design: any amount of
/// not-yet-delivered output survives across `read` calls, not just one
/// trailing `\n`.
pub struct AsciiEncoder<R> {
    inner: R,
    state: EncodeState,
    pending: VecDeque<u8>,
    windows_bypass: bool,
}

impl<R: Read> AsciiEncoder<R> {
    /// Wrap `inner` with the ASCII encoder.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            state: EncodeState::default(),
            pending: VecDeque::new(),
            windows_bypass: cfg!(windows),
        }
    }
}

impl<R: Read> Read for AsciiEncoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.windows_bypass {
            return self.inner.read(buf);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let mut written = 0;
        loop {
            while written < buf.len() {
                match self.pending.pop_front() {
                    Some(b) => {
                        buf[written] = b;
                        written += 1;
                    }
                    None => break,
                }
            }
            // Either the caller's buffer is full, or we drained everything
            // pending and have at least one byte to hand back — don't block
            // for more input once we have something to return.
            if written == buf.len() || written > 0 {
                return Ok(written);
            }
            let mut tmp = [0u8; 4096];
            let n = self.inner.read(&mut tmp)?;
            if n == 0 {
                return Ok(0);
            }
            for &b in &tmp[..n] {
                self.state.process(b, &mut self.pending);
            }
        }
    }
}

/// Network → host ASCII decoder, used for downloads. Wraps a [`Write`] sink
/// of host-native bytes; callers `write()` NVT-ASCII bytes into it.
pub struct AsciiDecoder<W> {
    inner: W,
    /// The previous source byte was `\r` and has not yet been emitted.
    prev_cr: bool,
    windows_bypass: bool,
}

impl<W: Write> AsciiDecoder<W> {
    /// Wrap `inner` with the ASCII decoder.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            prev_cr: false,
            windows_bypass: cfg!(windows),
        }
    }

    /// Consume the decoder, returning the wrapped sink.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for AsciiDecoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.windows_bypass {
            return self.inner.write(buf);
        }
        let mut out = Vec::with_capacity(buf.len());
        for &b in buf {
            match b {
                b'\r' => {
                    if self.prev_cr {
                        out.push(b'\r');
                    }
                    self.prev_cr = true;
                }
                b'\n' => {
                    out.push(b'\n');
                    self.prev_cr = false;
                }
                other => {
                    if self.prev_cr {
                        out.push(b'\r');
                        self.prev_cr = false;
                    }
                    out.push(other);
                }
            }
        }
        self.inner.write_all(&out)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.windows_bypass {
            return self.inner.flush();
        }
        if self.prev_cr {
            self.inner.write_all(&[b'\r'])?;
            self.prev_cr = false;
        }
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Drive `AsciiEncoder` with a fixed-size internal read and a fixed-size
    /// caller buffer, to exercise the chunk-boundary-safety requirement.
    fn encode_all(input: &[u8], read_chunk: usize, out_chunk: usize) -> Vec<u8> {
        struct Chunked<'a> {
            data: &'a [u8],
            pos: usize,
            chunk: usize,
        }
        impl<'a> Read for Chunked<'a> {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                let n = self.chunk.min(buf.len()).min(self.data.len() - self.pos);
                buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
                self.pos += n;
                Ok(n)
            }
        }
        let mut enc = AsciiEncoder::new(Chunked {
            data: input,
            pos: 0,
            chunk: read_chunk,
        });
        let mut out = Vec::new();
        let mut buf = vec![0u8; out_chunk];
        loop {
            let n = enc.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    fn decode_all(input: &[u8], write_chunk: usize) -> Vec<u8> {
        let mut dec = AsciiDecoder::new(Vec::new());
        for chunk in input.chunks(write_chunk) {
            dec.write_all(chunk).unwrap();
        }
        dec.flush().unwrap();
        dec.into_inner()
    }

    #[test]
    fn encode_scenario_from_spec() {
        let input = b"\r\rc\n\r\r\n\ro\r\n\r\n\n\rn\nte\rnt\n";
        let expected = b"\r\n\r\nc\r\n\r\n\r\n\r\no\r\n\r\n\r\n\r\nn\r\nte\r\nnt\r\n";
        assert_eq!(encode_all(input, 4, 4), expected);
    }

    #[test]
    fn decode_scenario_from_spec() {
        let input = b"\r\n\rc\r\n\r\n\no\r\r\n\r\nn\r\nte\n\rnt\r\n";
        let expected = b"\n\rc\n\n\no\r\n\nn\nte\n\rnt\n";
        assert_eq!(decode_all(input, 4), expected);
    }

    #[test]
    fn encode_with_output_buffer_of_one() {
        let input = b"\r\n";
        assert_eq!(encode_all(input, 16, 1), b"\r\n\r\n");
    }

    #[test]
    fn round_trip_law() {
        let samples: &[&[u8]] = &[
            b"hello world\n",
            b"line one\r\nline two\r\n",
            b"\r\r\r",
            b"\n\n\n",
            b"mixed\rline\nendings\r\n",
            b"",
        ];
        for s in samples {
            if cfg!(windows) {
                continue;
            }
            let encoded = encode_all(s, 3, 3);
            let decoded = decode_all(&encoded, 3);
            assert_eq!(&decoded, s, "round-trip failed for {:?}", s);
        }
    }

    #[test]
    fn crlf_pair_collapses_to_single_crlf() {
        assert_eq!(encode_all(b"\r\n", 16, 16), b"\r\n");
    }
}
