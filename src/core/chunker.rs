//! Reconstructs a connection's byte streams into payload chunks.
//!
//! Each direction is framed independently:
//! - RAW: one chunk per observation
//! - HTTP: one chunk per complete request/response message
//! - WebSocket: one chunk per complete frame, after a `101` upgrade
//!
//! A message or frame that outgrows [`ChunkerConfig::max_buffered`] is split:
//! the HTTP header block becomes its own chunk and the rest of the unit is
//! emitted as it arrives. Chunked bodies that outgrow it degrade to RAW.
//!
//! Framing that cannot be parsed degrades the direction to RAW. Bytes are
//! never dropped: per direction, the concatenation of the emitted chunks is
//! exactly the concatenation of the pushed data (once [`PayloadChunker::finish`]
//! has flushed what is still buffered).

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

use crate::config::{
    MAX_BUFFERED_UNIT_BYTES, MAX_HTTP_HEADERS, MAX_HTTP_HEADER_SIZE, MAX_PAYLOAD_BYTES,
};
use crate::core::payload::{ChunkType, PayloadChunk};

const HTTP_METHODS: &[&[u8]] = &[
    b"GET ", b"POST ", b"PUT ", b"DELETE ", b"HEAD ", b"OPTIONS ", b"PATCH ", b"CONNECT ",
    b"TRACE ",
];

const HTTP_RESPONSE_PREFIX: &[u8] = b"HTTP/";

/// Longest chunk-size line accepted in a chunked body.
const MAX_CHUNK_SIZE_LINE: usize = 1024;

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Try to frame HTTP/WebSocket; when false everything is RAW.
    pub http_enabled: bool,
    pub max_header_size: usize,
    /// Bytes of one incomplete unit held back before it is streamed.
    pub max_buffered: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            http_enabled: true,
            max_header_size: MAX_HTTP_HEADER_SIZE,
            max_buffered: MAX_BUFFERED_UNIT_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// Not enough bytes yet to tell HTTP from RAW.
    Detect,
    Raw,
    Http,
    /// Response body delimited by connection close, behind `header_len`
    /// bytes of headers.
    HttpUntilClose { header_len: usize },
    WebSocket,
    /// Rest of an oversized HTTP body or WebSocket frame, emitted as it
    /// arrives. `None` runs until close.
    Streaming {
        chunk_type: ChunkType,
        remaining: Option<u64>,
    },
}

#[derive(Debug)]
struct StreamDirection {
    is_sent: bool,
    framing: Framing,
    buf: BytesMut,
    /// Length and timestamp of each buffered observation, oldest first.
    segments: VecDeque<(usize, u64)>,
    /// Metadata of a response read until close.
    close_meta: (Option<String>, Option<String>),
}

impl StreamDirection {
    fn new(is_sent: bool) -> Self {
        Self {
            is_sent,
            framing: Framing::Detect,
            buf: BytesMut::new(),
            segments: VecDeque::new(),
            close_meta: (None, None),
        }
    }

    fn append(&mut self, timestamp: u64, data: &[u8]) {
        self.buf.extend_from_slice(data);
        self.segments.push_back((data.len(), timestamp));
    }

    /// Split off the first `n` buffered bytes along with the timestamp of
    /// the observation they start in.
    fn take(&mut self, n: usize) -> (Bytes, u64) {
        let timestamp = self.segments.front().map_or(0, |&(_, ts)| ts);
        let mut left = n;
        while left > 0 {
            let Some(front) = self.segments.front_mut() else {
                break;
            };
            if front.0 <= left {
                left -= front.0;
                self.segments.pop_front();
            } else {
                front.0 -= left;
                left = 0;
            }
        }
        (self.buf.split_to(n).freeze(), timestamp)
    }

    fn take_all(&mut self) -> Option<(Bytes, u64)> {
        if self.buf.is_empty() {
            return None;
        }
        Some(self.take(self.buf.len()))
    }

    fn emit(&mut self, n: usize, chunk_type: ChunkType, out: &mut Vec<PayloadChunk>) {
        let (bytes, ts) = self.take(n);
        out.push(PayloadChunk::new(bytes, chunk_type, self.is_sent, ts));
    }

    /// Flush everything as one RAW chunk and stop framing this direction.
    fn degrade(&mut self, out: &mut Vec<PayloadChunk>) {
        tracing::debug!(
            is_sent = self.is_sent,
            buffered = self.buf.len(),
            "Unparsable framing, falling back to raw chunks"
        );
        if let Some((bytes, ts)) = self.take_all() {
            out.push(PayloadChunk::new(bytes, ChunkType::Raw, self.is_sent, ts));
        }
        self.framing = Framing::Raw;
    }
}

#[derive(Debug)]
struct PendingRequest {
    method: String,
    path: Option<String>,
}

/// Per-connection stream reconstruction.
#[derive(Debug)]
pub struct PayloadChunker {
    config: ChunkerConfig,
    sent: StreamDirection,
    rcvd: StreamDirection,
    /// Requests awaiting a response, oldest first.
    pending: VecDeque<PendingRequest>,
}

impl PayloadChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self {
            config,
            sent: StreamDirection::new(true),
            rcvd: StreamDirection::new(false),
            pending: VecDeque::new(),
        }
    }

    /// Feed one observation; returns the chunks it completed.
    pub fn push(&mut self, is_sent: bool, timestamp: u64, data: &[u8]) -> Vec<PayloadChunk> {
        let mut out = Vec::new();
        if data.is_empty() {
            return out;
        }
        if is_sent {
            self.sent.append(timestamp, data);
        } else {
            self.rcvd.append(timestamp, data);
        }
        self.drain(is_sent, &mut out);
        out
    }

    /// Flush buffered bytes at connection end.
    ///
    /// A response delimited by close becomes an HTTP chunk, the tail of a
    /// streamed unit keeps its type, and any other leftover is an incomplete
    /// unit and becomes RAW.
    pub fn finish(&mut self) -> Vec<PayloadChunk> {
        let mut out = Vec::new();
        for dir in [&mut self.sent, &mut self.rcvd] {
            let Some((bytes, ts)) = dir.take_all() else {
                continue;
            };
            let chunk = match dir.framing {
                Framing::HttpUntilClose { .. } => {
                    let (content_type, path) = std::mem::take(&mut dir.close_meta);
                    PayloadChunk::new(bytes, ChunkType::Http, dir.is_sent, ts)
                        .with_http_meta(content_type, path)
                }
                Framing::Streaming { chunk_type, .. } => {
                    PayloadChunk::new(bytes, chunk_type, dir.is_sent, ts)
                }
                _ => PayloadChunk::new(bytes, ChunkType::Raw, dir.is_sent, ts),
            };
            out.push(chunk);
        }
        out
    }

    fn drain(&mut self, is_sent: bool, out: &mut Vec<PayloadChunk>) {
        loop {
            let dir = if is_sent { &mut self.sent } else { &mut self.rcvd };
            if dir.buf.is_empty() {
                return;
            }

            match dir.framing {
                Framing::Detect => {
                    dir.framing = match detect(is_sent, &dir.buf, self.config.http_enabled) {
                        Detected::Http => Framing::Http,
                        Detected::Raw => Framing::Raw,
                        Detected::NeedMore => return,
                    };
                    if !is_sent && dir.framing == Framing::Raw {
                        self.pending.clear();
                    }
                }
                Framing::Raw => {
                    while let Some(&(len, _)) = dir.segments.front() {
                        dir.emit(len, ChunkType::Raw, out);
                    }
                    return;
                }
                Framing::HttpUntilClose { header_len } => {
                    if dir.buf.len() <= self.config.max_buffered {
                        return;
                    }
                    tracing::debug!(is_sent, "Response read until close outgrew the buffer, streaming body");
                    let (content_type, path) = std::mem::take(&mut dir.close_meta);
                    let (bytes, ts) = dir.take(header_len);
                    out.push(
                        PayloadChunk::new(bytes, ChunkType::Http, is_sent, ts)
                            .with_http_meta(content_type, path),
                    );
                    dir.framing = Framing::Streaming {
                        chunk_type: ChunkType::Http,
                        remaining: None,
                    };
                }
                Framing::Streaming {
                    chunk_type,
                    remaining,
                } => {
                    let available = dir.buf.len();
                    let n = remaining.map_or(available, |r| {
                        usize::try_from(r).map_or(available, |r| r.min(available))
                    });
                    dir.emit(n, chunk_type, out);
                    if let Some(r) = remaining {
                        let left = r - n as u64;
                        dir.framing = if left > 0 {
                            Framing::Streaming {
                                chunk_type,
                                remaining: Some(left),
                            }
                        } else if chunk_type == ChunkType::WebSocket {
                            Framing::WebSocket
                        } else {
                            Framing::Http
                        };
                    }
                }
                Framing::WebSocket => match websocket_frame_len(&dir.buf) {
                    FrameScan::Complete(n) => dir.emit(n, ChunkType::WebSocket, out),
                    FrameScan::Incomplete => return,
                    FrameScan::Partial(total) => {
                        if dir.buf.len() <= self.config.max_buffered {
                            return;
                        }
                        tracing::debug!(is_sent, frame_len = total, "Oversized WebSocket frame, streaming");
                        dir.framing = Framing::Streaming {
                            chunk_type: ChunkType::WebSocket,
                            remaining: Some(total),
                        };
                    }
                    FrameScan::Invalid => {
                        dir.degrade(out);
                        return;
                    }
                },
                Framing::Http => {
                    let parsed = if is_sent {
                        parse_request(&dir.buf, self.config.max_header_size)
                    } else {
                        parse_response(&dir.buf, self.config.max_header_size, self.pending.front())
                    };

                    match parsed {
                        HttpParse::Incomplete => return,
                        HttpParse::Invalid => {
                            tracing::warn!(is_sent, "Malformed HTTP message, degrading to raw");
                            dir.degrade(out);
                            if !is_sent {
                                self.pending.clear();
                            }
                            return;
                        }
                        HttpParse::UntilClose {
                            header_len,
                            content_type,
                            path,
                        } => {
                            dir.framing = Framing::HttpUntilClose { header_len };
                            dir.close_meta = (content_type, path);
                            self.pending.pop_front();
                        }
                        HttpParse::BodyIncomplete(msg) => {
                            if dir.buf.len() <= self.config.max_buffered {
                                return;
                            }
                            let (bytes, ts) = dir.take(msg.header_len);
                            out.push(
                                PayloadChunk::new(bytes, ChunkType::Http, is_sent, ts)
                                    .with_http_meta(msg.content_type, msg.path.clone()),
                            );
                            dir.framing = match msg.body_len {
                                Some(n) => Framing::Streaming {
                                    chunk_type: ChunkType::Http,
                                    remaining: Some(n),
                                },
                                // chunk boundaries are not tracked while streaming
                                None => Framing::Raw,
                            };
                            tracing::debug!(
                                is_sent,
                                buffered = dir.buf.len(),
                                "Oversized HTTP message, headers emitted"
                            );

                            let degraded = dir.framing == Framing::Raw;
                            if is_sent {
                                self.track_request(msg.method, msg.path);
                            } else if degraded {
                                self.pending.clear();
                            } else {
                                self.pending.pop_front();
                            }
                        }
                        HttpParse::Complete(msg) => {
                            let (bytes, ts) = dir.take(msg.len);
                            out.push(
                                PayloadChunk::new(bytes, ChunkType::Http, is_sent, ts)
                                    .with_http_meta(msg.content_type, msg.path.clone()),
                            );

                            if is_sent {
                                self.track_request(msg.method, msg.path);
                            } else if !msg.interim {
                                self.pending.pop_front();
                            }

                            match msg.switch {
                                Some(ProtocolSwitch::WebSocket) => {
                                    self.switch_framing(Framing::WebSocket, out);
                                    return;
                                }
                                Some(ProtocolSwitch::Opaque) => {
                                    self.switch_framing(Framing::Raw, out);
                                    return;
                                }
                                None => {}
                            }
                        }
                    }
                }
            }
        }
    }

    /// Queue a request for pairing with its response.
    fn track_request(&mut self, method: Option<String>, path: Option<String>) {
        // a raw receive side never pops the queue
        if self.rcvd.framing == Framing::Raw {
            return;
        }
        self.pending.push_back(PendingRequest {
            method: method.unwrap_or_default(),
            path,
        });
    }

    fn switch_framing(&mut self, framing: Framing, out: &mut Vec<PayloadChunk>) {
        tracing::debug!(?framing, "Protocol switch");
        self.sent.framing = framing;
        self.rcvd.framing = framing;
        self.pending.clear();
        self.drain(true, out);
        self.drain(false, out);
    }
}

impl Default for PayloadChunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}

enum Detected {
    Http,
    Raw,
    NeedMore,
}

fn detect(is_sent: bool, buf: &[u8], http_enabled: bool) -> Detected {
    if !http_enabled {
        return Detected::Raw;
    }
    let prefixes: &[&[u8]] = if is_sent {
        HTTP_METHODS
    } else {
        &[HTTP_RESPONSE_PREFIX]
    };

    let mut need_more = false;
    for prefix in prefixes {
        if buf.starts_with(prefix) {
            return Detected::Http;
        }
        if prefix.starts_with(buf) {
            need_more = true;
        }
    }
    if need_more {
        Detected::NeedMore
    } else {
        Detected::Raw
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProtocolSwitch {
    WebSocket,
    /// Tunnel or unknown upgraded protocol.
    Opaque,
}

#[derive(Debug)]
struct HttpMessage {
    len: usize,
    method: Option<String>,
    path: Option<String>,
    content_type: Option<String>,
    /// 1xx response other than 101; the request still awaits its final response.
    interim: bool,
    switch: Option<ProtocolSwitch>,
}

/// Message whose headers are complete but whose body is still arriving.
#[derive(Debug)]
struct PartialMessage {
    header_len: usize,
    /// Announced by Content-Length; `None` for a chunked body.
    body_len: Option<u64>,
    method: Option<String>,
    path: Option<String>,
    content_type: Option<String>,
}

#[derive(Debug)]
enum HttpParse {
    /// Header block not complete yet.
    Incomplete,
    Invalid,
    Complete(HttpMessage),
    BodyIncomplete(PartialMessage),
    UntilClose {
        header_len: usize,
        content_type: Option<String>,
        path: Option<String>,
    },
}

enum BodyLen {
    Known(usize),
    /// Content-Length when announced.
    Incomplete(Option<u64>),
    Invalid,
    /// No length information in the headers.
    Absent,
}

fn header_value(headers: &[httparse::Header<'_>], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .and_then(|h| std::str::from_utf8(h.value).ok())
        .map(|v| v.trim().to_string())
}

fn is_chunked(headers: &[httparse::Header<'_>]) -> bool {
    header_value(headers, "transfer-encoding").is_some_and(|te| {
        te.split(',')
            .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
    })
}

fn body_len(headers: &[httparse::Header<'_>], body: &[u8]) -> BodyLen {
    if is_chunked(headers) {
        return match walk_chunked(body, None) {
            ChunkedScan::Complete(n) => BodyLen::Known(n),
            ChunkedScan::Incomplete => BodyLen::Incomplete(None),
            ChunkedScan::Invalid => BodyLen::Invalid,
        };
    }
    match header_value(headers, "content-length") {
        Some(value) => match value.parse::<u64>() {
            Ok(n) => match usize::try_from(n) {
                Ok(n) if body.len() >= n => BodyLen::Known(n),
                _ => BodyLen::Incomplete(Some(n)),
            },
            Err(_) => BodyLen::Invalid,
        },
        None => BodyLen::Absent,
    }
}

fn partial(buf: &[u8], max_header_size: usize) -> HttpParse {
    if buf.len() > max_header_size {
        HttpParse::Invalid
    } else {
        HttpParse::Incomplete
    }
}

fn parse_request(buf: &[u8], max_header_size: usize) -> HttpParse {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HTTP_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    let header_len = match req.parse(buf) {
        Ok(httparse::Status::Complete(n)) if n <= max_header_size => n,
        Ok(httparse::Status::Complete(_)) => return HttpParse::Invalid,
        Ok(httparse::Status::Partial) => return partial(buf, max_header_size),
        Err(e) => {
            tracing::debug!("HTTP request parse error: {e}");
            return HttpParse::Invalid;
        }
    };

    let method = req.method.map(str::to_string);
    let path = req.path.map(str::to_string);
    let content_type = header_value(req.headers, "content-type");

    let len = match body_len(req.headers, &buf[header_len..]) {
        BodyLen::Known(n) => header_len + n,
        BodyLen::Absent => header_len,
        BodyLen::Incomplete(body_len) => {
            return HttpParse::BodyIncomplete(PartialMessage {
                header_len,
                body_len,
                method,
                path,
                content_type,
            })
        }
        BodyLen::Invalid => return HttpParse::Invalid,
    };

    HttpParse::Complete(HttpMessage {
        len,
        method,
        path,
        content_type,
        interim: false,
        switch: None,
    })
}

fn parse_response(
    buf: &[u8],
    max_header_size: usize,
    request: Option<&PendingRequest>,
) -> HttpParse {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HTTP_HEADERS];
    let mut resp = httparse::Response::new(&mut headers);
    let header_len = match resp.parse(buf) {
        Ok(httparse::Status::Complete(n)) if n <= max_header_size => n,
        Ok(httparse::Status::Complete(_)) => return HttpParse::Invalid,
        Ok(httparse::Status::Partial) => return partial(buf, max_header_size),
        Err(e) => {
            tracing::debug!("HTTP response parse error: {e}");
            return HttpParse::Invalid;
        }
    };

    let code = resp.code.unwrap_or_default();
    let method = request.map(|r| r.method.as_str()).unwrap_or_default();
    let path = request.and_then(|r| r.path.clone());
    let content_type = header_value(resp.headers, "content-type");

    let switch = if code == 101 {
        let websocket = header_value(resp.headers, "upgrade")
            .is_some_and(|u| u.eq_ignore_ascii_case("websocket"));
        Some(if websocket {
            ProtocolSwitch::WebSocket
        } else {
            ProtocolSwitch::Opaque
        })
    } else if method.eq_ignore_ascii_case("CONNECT") && (200..300).contains(&code) {
        Some(ProtocolSwitch::Opaque)
    } else {
        None
    };

    let bodyless = switch.is_some()
        || method.eq_ignore_ascii_case("HEAD")
        || (100..200).contains(&code)
        || code == 204
        || code == 304;

    let len = if bodyless {
        header_len
    } else {
        match body_len(resp.headers, &buf[header_len..]) {
            BodyLen::Known(n) => header_len + n,
            BodyLen::Absent => {
                return HttpParse::UntilClose {
                    header_len,
                    content_type,
                    path,
                }
            }
            BodyLen::Incomplete(body_len) => {
                return HttpParse::BodyIncomplete(PartialMessage {
                    header_len,
                    body_len,
                    method: None,
                    path,
                    content_type,
                })
            }
            BodyLen::Invalid => return HttpParse::Invalid,
        }
    };

    HttpParse::Complete(HttpMessage {
        len,
        method: None,
        path,
        content_type,
        interim: (100..200).contains(&code) && code != 101,
        switch,
    })
}

enum ChunkedScan {
    /// Total length of the encoded body, trailers included.
    Complete(usize),
    Incomplete,
    Invalid,
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

/// Walk a chunked-encoded body, optionally collecting the decoded bytes.
fn walk_chunked(body: &[u8], mut decoded: Option<&mut Vec<u8>>) -> ChunkedScan {
    let mut pos = 0;
    loop {
        let Some(line_len) = find_crlf(&body[pos..]) else {
            return if body.len() - pos > MAX_CHUNK_SIZE_LINE {
                ChunkedScan::Invalid
            } else {
                ChunkedScan::Incomplete
            };
        };
        let Ok(line) = std::str::from_utf8(&body[pos..pos + line_len]) else {
            return ChunkedScan::Invalid;
        };
        let size_field = line.split(';').next().unwrap_or_default().trim();
        let Ok(size) = usize::from_str_radix(size_field, 16) else {
            return ChunkedScan::Invalid;
        };
        pos += line_len + 2;

        if size == 0 {
            // optional trailers, terminated by an empty line
            loop {
                let Some(end) = find_crlf(&body[pos..]) else {
                    return ChunkedScan::Incomplete;
                };
                pos += end + 2;
                if end == 0 {
                    return ChunkedScan::Complete(pos);
                }
            }
        }

        let Some(data_end) = pos.checked_add(size) else {
            return ChunkedScan::Invalid;
        };
        if body.len() < data_end || body.len() - data_end < 2 {
            return ChunkedScan::Incomplete;
        }
        if &body[data_end..data_end + 2] != b"\r\n" {
            return ChunkedScan::Invalid;
        }
        if let Some(out) = decoded.as_deref_mut() {
            out.extend_from_slice(&body[pos..data_end]);
        }
        pos = data_end + 2;
    }
}

/// HTTP chunk with its chunked transfer-encoding body decoded.
///
/// Returns `None` for non-HTTP chunks, bodies that are not chunked, and
/// bodies that do not decode.
pub fn strip_chunked_encoding(chunk: &PayloadChunk) -> Option<PayloadChunk> {
    if chunk.chunk_type != ChunkType::Http {
        return None;
    }
    let data = chunk.payload();
    let mut headers = [httparse::EMPTY_HEADER; MAX_HTTP_HEADERS];

    let (header_len, chunked) = if chunk.is_sent {
        let mut req = httparse::Request::new(&mut headers);
        match req.parse(data).ok()? {
            httparse::Status::Complete(n) => (n, is_chunked(req.headers)),
            httparse::Status::Partial => return None,
        }
    } else {
        let mut resp = httparse::Response::new(&mut headers);
        match resp.parse(data).ok()? {
            httparse::Status::Complete(n) => (n, is_chunked(resp.headers)),
            httparse::Status::Partial => return None,
        }
    };
    if !chunked {
        return None;
    }

    let mut payload = data[..header_len].to_vec();
    match walk_chunked(&data[header_len..], Some(&mut payload)) {
        ChunkedScan::Complete(_) => Some(chunk.with_payload(payload)),
        ChunkedScan::Incomplete | ChunkedScan::Invalid => None,
    }
}

enum FrameScan {
    Complete(usize),
    /// Header not complete yet.
    Incomplete,
    /// Header complete; total frame length.
    Partial(u64),
    Invalid,
}

/// Length of the WebSocket frame at the start of `buf` (RFC 6455 §5.2).
fn websocket_frame_len(buf: &[u8]) -> FrameScan {
    if buf.len() < 2 {
        return FrameScan::Incomplete;
    }
    let masked = buf[1] & 0x80 != 0;
    let (header_len, payload_len) = match buf[1] & 0x7f {
        126 => {
            if buf.len() < 4 {
                return FrameScan::Incomplete;
            }
            (4, u64::from(u16::from_be_bytes([buf[2], buf[3]])))
        }
        127 => {
            if buf.len() < 10 {
                return FrameScan::Incomplete;
            }
            let mut len = [0u8; 8];
            len.copy_from_slice(&buf[2..10]);
            (10, u64::from_be_bytes(len))
        }
        n => (2, u64::from(n)),
    };
    let header_len = header_len + if masked { 4 } else { 0 };

    let Some(total) = usize::try_from(payload_len)
        .ok()
        .and_then(|len| len.checked_add(header_len))
    else {
        return FrameScan::Invalid;
    };
    if buf.len() >= total {
        FrameScan::Complete(total)
    } else {
        FrameScan::Partial(total as u64)
    }
}

/// Chunk history of one connection.
///
/// Retention stops once `max_bytes` worth of chunks are stored; the
/// chunker keeps running so framing stays aligned.
#[derive(Debug)]
pub struct ConnectionPayload {
    chunker: PayloadChunker,
    chunks: Vec<PayloadChunk>,
    stored_bytes: usize,
    max_bytes: usize,
    truncated: bool,
}

impl ConnectionPayload {
    pub fn new(config: ChunkerConfig, max_bytes: usize) -> Self {
        Self {
            chunker: PayloadChunker::new(config),
            chunks: Vec::new(),
            stored_bytes: 0,
            max_bytes,
            truncated: false,
        }
    }

    pub fn observe(&mut self, is_sent: bool, timestamp: u64, data: &[u8]) {
        let completed = self.chunker.push(is_sent, timestamp, data);
        self.retain(completed);
    }

    /// Flush the chunker at connection close.
    pub fn close(&mut self) {
        let completed = self.chunker.finish();
        self.retain(completed);
    }

    fn retain(&mut self, completed: Vec<PayloadChunk>) {
        for chunk in completed {
            if self.truncated {
                return;
            }
            if self.stored_bytes + chunk.len() > self.max_bytes {
                self.truncated = true;
                tracing::debug!(stored = self.stored_bytes, "Payload history truncated");
                return;
            }
            self.stored_bytes += chunk.len();
            self.chunks.push(chunk);
        }
    }

    pub fn chunks(&self) -> &[PayloadChunk] {
        &self.chunks
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn stored_bytes(&self) -> usize {
        self.stored_bytes
    }
}

impl Default for ConnectionPayload {
    fn default() -> Self {
        Self::new(ChunkerConfig::default(), MAX_PAYLOAD_BYTES)
    }
}
