//! Resumable HTTP/1.1 message parser.
//!
//! Converts an accumulating byte stream into a [`Message`], suspending at
//! any byte boundary. The caller re-presents the *entire* stream-so-far on
//! every call (same logical origin); a cumulative consumed-byte offset skips
//! the phases already parsed, and the chunked decoder keeps its own cursor
//! into the body region of the caller's buffer. Phases never re-run once
//! complete: past the status line it is never re-parsed, past the headers
//! they are frozen.

use bytes::BytesMut;

use crate::message::{Body, Headers, Message, StartLine, TransferEncoding, Version};

/// Result of one [`Parser::try_parse`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// A complete message is available.
    Done,
    /// The stream ends mid-phase; call again once more bytes arrived.
    NeedsMoreData,
    /// The stream is not valid HTTP. Terminal.
    InvalidData,
    /// The stream uses a feature this parser deliberately does not support
    /// (non-identity/chunked encodings, identity without Content-Length).
    /// Terminal.
    Unimplemented,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    StatusLine,
    Headers,
    Body,
    Done,
    Failed(ParseStatus),
}

/// Incremental parser for one HTTP message.
#[derive(Debug)]
pub struct Parser {
    phase: Phase,
    /// Bytes of the stream consumed by completed status/header phases.
    consumed: usize,
    start: Option<StartLine>,
    headers: Headers,
    encoding: Option<TransferEncoding>,
    body: BytesMut,
    /// Cursor into the body region (`buf[consumed..]`) for chunked decoding.
    chunk_cursor: usize,
    message: Option<Message>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Parser {
            phase: Phase::StatusLine,
            consumed: 0,
            start: None,
            headers: Headers::new(),
            encoding: None,
            body: BytesMut::new(),
            chunk_cursor: 0,
            message: None,
        }
    }

    /// Run the phases still pending against the accumulated stream `buf`.
    ///
    /// `buf` must always start at the same logical origin as every previous
    /// call; already-consumed bytes are skipped internally. Deterministic and
    /// idempotent under no new input: terminal outcomes (Done, InvalidData,
    /// Unimplemented) repeat on further calls without mutating anything.
    pub fn try_parse(&mut self, buf: &[u8]) -> ParseStatus {
        if let Phase::Failed(status) = self.phase {
            return status;
        }

        if self.phase == Phase::StatusLine {
            match parse_start_line(&buf[self.consumed..]) {
                StartOutcome::NeedMore => return ParseStatus::NeedsMoreData,
                StartOutcome::Invalid => return self.fail(ParseStatus::InvalidData),
                StartOutcome::Parsed(start, n) => {
                    log::trace!("parsed start line: {start:?}");
                    self.start = Some(start);
                    self.consumed += n;
                    self.phase = Phase::Headers;
                }
            }
        }

        if self.phase == Phase::Headers {
            match parse_headers(&buf[self.consumed..]) {
                HeaderOutcome::NeedMore => return ParseStatus::NeedsMoreData,
                HeaderOutcome::Invalid => return self.fail(ParseStatus::InvalidData),
                HeaderOutcome::Parsed(headers, n) => {
                    log::trace!("parsed {} header(s)", headers.len());
                    self.headers = headers;
                    self.consumed += n;
                    self.phase = Phase::Body;
                }
            }
        }

        if self.phase == Phase::Body {
            match self.parse_body(&buf[self.consumed..]) {
                ParseStatus::Done => self.freeze(),
                other => return other,
            }
        }

        ParseStatus::Done
    }

    /// The finished message, once [`ParseStatus::Done`] has been returned.
    pub fn message(&self) -> Option<&Message> {
        self.message.as_ref()
    }

    /// Move the finished message out, leaving the parser in its terminal
    /// Done state.
    pub fn take_message(&mut self) -> Option<Message> {
        self.message.take()
    }

    fn fail(&mut self, status: ParseStatus) -> ParseStatus {
        self.phase = Phase::Failed(status);
        status
    }

    /// Decode the body region (everything past the frozen headers).
    fn parse_body(&mut self, region: &[u8]) -> ParseStatus {
        // A GET request carries no body by definition.
        if let Some(StartLine::Request { method, .. }) = &self.start {
            if method == "GET" {
                return ParseStatus::Done;
            }
        }

        // Classify the transfer encoding exactly once.
        if self.encoding.is_none() {
            let encoding = match self.headers.get("Transfer-Encoding") {
                None => TransferEncoding::Identity,
                Some(token) => match TransferEncoding::from_token(token) {
                    Some(e) => e,
                    // Unknown token or a comma-separated list.
                    None => return self.fail(ParseStatus::Unimplemented),
                },
            };
            self.encoding = Some(encoding);
        }

        match self.encoding {
            Some(TransferEncoding::Identity) => self.parse_identity_body(region),
            Some(TransferEncoding::Chunked) => self.parse_chunked_body(region),
            // Recognised but not decodable.
            _ => self.fail(ParseStatus::Unimplemented),
        }
    }

    fn parse_identity_body(&mut self, region: &[u8]) -> ParseStatus {
        let length_text = match self.headers.get("Content-Length") {
            Some(v) => v,
            // Reading until connection close is deliberately not supported.
            None => return self.fail(ParseStatus::Unimplemented),
        };
        let content_length: usize = match length_text.parse() {
            Ok(n) => n,
            Err(_) => return self.fail(ParseStatus::InvalidData),
        };

        if region.len() < content_length {
            return ParseStatus::NeedsMoreData;
        }

        self.body.extend_from_slice(&region[..content_length]);
        ParseStatus::Done
    }

    fn parse_chunked_body(&mut self, region: &[u8]) -> ParseStatus {
        loop {
            match decode_chunk(&region[self.chunk_cursor..]) {
                ChunkOutcome::NeedMore => return ParseStatus::NeedsMoreData,
                ChunkOutcome::Invalid => return self.fail(ParseStatus::InvalidData),
                ChunkOutcome::Last => return ParseStatus::Done,
                ChunkOutcome::Data { payload, consumed } => {
                    self.body.extend_from_slice(payload);
                    self.chunk_cursor += consumed;
                }
            }
        }
    }

    /// Snapshot the finished message. The parser state past this point is
    /// frozen; further `try_parse` calls return Done without mutation.
    fn freeze(&mut self) {
        let start = match self.start.take() {
            Some(s) => s,
            // Unreachable: the body phase only runs after the start line.
            None => {
                self.fail(ParseStatus::InvalidData);
                return;
            }
        };
        let body = Body {
            data: self.body.split().freeze(),
            encoding: self.encoding.unwrap_or(TransferEncoding::Identity),
        };
        self.message = Some(Message {
            start,
            headers: std::mem::take(&mut self.headers),
            body,
        });
        self.phase = Phase::Done;
    }
}

// ── Start line ──────────────────────────────────────────────────────

enum StartOutcome {
    NeedMore,
    Invalid,
    Parsed(StartLine, usize),
}

/// Parse `HTTP/maj.min` into a [`Version`].
fn parse_version(text: &str) -> Option<Version> {
    let rest = text.strip_prefix("HTTP/")?;
    let (major, minor) = rest.split_once('.')?;
    Some(Version {
        major: major.parse().ok()?,
        minor: minor.parse().ok()?,
    })
}

fn parse_start_line(buf: &[u8]) -> StartOutcome {
    let newline = match buf.iter().position(|&b| b == b'\n') {
        Some(i) => i,
        None => return StartOutcome::NeedMore,
    };
    let consumed = newline + 1; // Terminator included.

    let mut line = &buf[..newline];
    if line.last() == Some(&b'\r') {
        line = &line[..line.len() - 1];
    }
    let text = match std::str::from_utf8(line) {
        Ok(t) => t,
        Err(_) => return StartOutcome::Invalid,
    };

    // Request shape first: METHOD SP TARGET SP HTTP/x.y
    let mut parts = text.splitn(3, ' ');
    if let (Some(method), Some(target), Some(tail)) = (parts.next(), parts.next(), parts.next()) {
        if !method.is_empty() && !target.is_empty() {
            if let Some(version) = parse_version(tail) {
                return StartOutcome::Parsed(
                    StartLine::Request {
                        method: method.to_string(),
                        target: target.to_string(),
                        version,
                    },
                    consumed,
                );
            }
        }
    }

    // Response shape: HTTP/x.y SP code [SP reason]
    let mut parts = text.splitn(3, ' ');
    if let (Some(head), Some(code_text)) = (parts.next(), parts.next()) {
        let reason = parts.next().unwrap_or("");
        if let (Some(version), Ok(code)) = (parse_version(head), code_text.parse::<u16>()) {
            return StartOutcome::Parsed(
                StartLine::Response {
                    version,
                    code,
                    reason: reason.to_string(),
                },
                consumed,
            );
        }
    }

    StartOutcome::Invalid
}

// ── Headers ─────────────────────────────────────────────────────────

enum HeaderOutcome {
    NeedMore,
    Invalid,
    Parsed(Headers, usize),
}

/// Scan header lines until the empty line marking end-of-headers. Nothing is
/// committed unless that empty line is present in `buf`.
fn parse_headers(buf: &[u8]) -> HeaderOutcome {
    let mut headers = Headers::new();
    let mut line_start = 0;

    for (i, &byte) in buf.iter().enumerate() {
        if byte != b'\n' {
            continue;
        }

        let mut line = &buf[line_start..i];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }

        if line.is_empty() {
            // Terminator immediately following a terminator: end of headers.
            return HeaderOutcome::Parsed(headers, i + 1);
        }

        let colon = match line.iter().position(|&b| b == b':') {
            Some(c) => c,
            None => return HeaderOutcome::Invalid,
        };
        let key = match std::str::from_utf8(&line[..colon]) {
            Ok(k) => k,
            Err(_) => return HeaderOutcome::Invalid,
        };
        let value_raw = &line[colon + 1..];
        let value = match std::str::from_utf8(value_raw) {
            Ok(v) => v.trim_start_matches(' '),
            Err(_) => return HeaderOutcome::Invalid,
        };

        headers.push(key.to_string(), value.to_string());
        line_start = i + 1;
    }

    HeaderOutcome::NeedMore
}

// ── Chunked body ────────────────────────────────────────────────────

enum ChunkOutcome<'a> {
    NeedMore,
    Invalid,
    /// Zero-size chunk: body complete. Its own trailing CRLF is not
    /// re-validated.
    Last,
    Data {
        payload: &'a [u8],
        /// Size line, both terminators, and payload.
        consumed: usize,
    },
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    (0..data.len().saturating_sub(1)).find(|&i| data[i] == b'\r' && data[i + 1] == b'\n')
}

/// Decode one chunk of `hex-size [;ext] CRLF payload CRLF` framing.
fn decode_chunk(data: &[u8]) -> ChunkOutcome<'_> {
    let crlf = match find_crlf(data) {
        Some(pos) => pos,
        None => return ChunkOutcome::NeedMore,
    };

    let size_text = match std::str::from_utf8(&data[..crlf]) {
        Ok(s) => s.trim(),
        Err(_) => return ChunkOutcome::Invalid,
    };
    // Chunk extensions (;key=value) are ignored.
    let size_hex = size_text.split(';').next().unwrap_or("").trim();
    let size = match usize::from_str_radix(size_hex, 16) {
        Ok(s) => s,
        Err(_) => return ChunkOutcome::Invalid,
    };

    if size == 0 {
        return ChunkOutcome::Last;
    }

    let payload_start = crlf + 2;
    // Size line, payload, and trailing CRLF. A declared size anywhere near
    // usize::MAX can never be satisfied, so arithmetic overflow is a
    // malformed frame, not a short read.
    let total = match payload_start
        .checked_add(size)
        .and_then(|n| n.checked_add(2))
    {
        Some(t) => t,
        None => return ChunkOutcome::Invalid,
    };
    if data.len() < total {
        return ChunkOutcome::NeedMore;
    }

    ChunkOutcome::Data {
        payload: &data[payload_start..payload_start + size],
        consumed: total,
    }
}
