//! HTTP/1.1 decoders feeding the relay session.
//!
//! # Responsibilities
//! - `RequestDecoder`: parse one client request head, ignore anything after it
//! - `ResponseDecoder`: parse the origin response head, then split the body
//!   into ordered fragments with the final one flagged
//!
//! # Data Flow
//! ```text
//! origin bytes
//!     → Head (skip 1xx, pick body framing)
//!     → Length(n) | Chunked(size/data/trailers) | UntilEof
//!     → RelayEvent::BodyChunk { data, last }
//! ```
//!
//! # Design Decisions
//! - Body fragments are emitted as they arrive; nothing buffers a whole body
//! - Chunked framing is removed here and re-applied on the way out only when
//!   the client needs it

use std::io;

use bytes::{Buf, Bytes, BytesMut};
use hyper::header::{HeaderName, HeaderValue, CONTENT_LENGTH, TRANSFER_ENCODING};
use hyper::{HeaderMap, Method, StatusCode};
use thiserror::Error;
use tokio_util::codec::Decoder;

use crate::http::request::RequestHead;
use crate::http::response::ResponseHead;
use crate::relay::event::{BodyChunk, RelayEvent};

const MAX_HEADERS: usize = 64;
const MAX_CHUNK_LINE: usize = 1024;
const MAX_TRAILER_BYTES: usize = 16 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("message head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("malformed message head: {0}")]
    MalformedHead(String),

    #[error("invalid chunked body: {0}")]
    InvalidChunk(&'static str),

    #[error("invalid content-length")]
    InvalidContentLength,

    #[error("connection closed mid-message")]
    Truncated,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// True when the peer sent a request that cannot be framed at all.
    pub fn is_framing(&self) -> bool {
        matches!(self, CodecError::HeadTooLarge(_) | CodecError::MalformedHead(_))
    }
}

fn header_map(raw: &[httparse::Header<'_>]) -> Result<HeaderMap, CodecError> {
    let mut headers = HeaderMap::with_capacity(raw.len());
    for header in raw {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|_| CodecError::MalformedHead(format!("bad header name {:?}", header.name)))?;
        let value = HeaderValue::from_bytes(header.value)
            .map_err(|_| CodecError::MalformedHead(format!("bad value for {}", name)))?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn parse_failure(err: httparse::Error, max_head: usize) -> CodecError {
    match err {
        httparse::Error::TooManyHeaders => CodecError::HeadTooLarge(max_head),
        other => CodecError::MalformedHead(other.to_string()),
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Decodes the single request a client connection carries.
#[derive(Debug)]
pub struct RequestDecoder {
    max_head: usize,
    done: bool,
}

impl RequestDecoder {
    pub fn new(max_head: usize) -> Self {
        Self {
            max_head,
            done: false,
        }
    }
}

impl Decoder for RequestDecoder {
    type Item = RelayEvent;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RelayEvent>, CodecError> {
        if self.done {
            // One request per connection; pipelined bytes are dropped.
            src.clear();
            return Ok(None);
        }

        let mut raw = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut raw);
        let status = req.parse(src).map_err(|e| parse_failure(e, self.max_head))?;

        let head_len = match status {
            httparse::Status::Partial => {
                if src.len() > self.max_head {
                    return Err(CodecError::HeadTooLarge(self.max_head));
                }
                return Ok(None);
            }
            httparse::Status::Complete(len) => len,
        };
        if head_len > self.max_head {
            return Err(CodecError::HeadTooLarge(self.max_head));
        }

        let method = Method::from_bytes(req.method.unwrap_or_default().as_bytes())
            .map_err(|_| CodecError::MalformedHead("bad method".to_string()))?;
        let target = req.path.unwrap_or_default().to_string();
        let version = req.version.unwrap_or(1);
        let headers = header_map(req.headers)?;

        src.advance(head_len);
        src.clear();
        self.done = true;

        Ok(Some(RelayEvent::RequestHead(RequestHead {
            method,
            target,
            version,
            headers,
        })))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<RelayEvent>, CodecError> {
        if let Some(event) = self.decode(src)? {
            return Ok(Some(event));
        }
        if self.done || src.is_empty() {
            Ok(None)
        } else {
            Err(CodecError::Truncated)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data(u64),
    DataEnd,
    Trailers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseState {
    Head,
    Length(u64),
    Chunked(ChunkState),
    UntilEof,
    Done,
}

/// Decodes the origin response into a head and ordered body fragments.
#[derive(Debug)]
pub struct ResponseDecoder {
    max_head: usize,
    state: ResponseState,
}

impl ResponseDecoder {
    pub fn new(max_head: usize) -> Self {
        Self {
            max_head,
            state: ResponseState::Head,
        }
    }

    fn decode_head(&mut self, src: &mut BytesMut) -> Result<Option<RelayEvent>, CodecError> {
        loop {
            let mut raw = [httparse::EMPTY_HEADER; MAX_HEADERS];
            let mut res = httparse::Response::new(&mut raw);
            let status = res.parse(src).map_err(|e| parse_failure(e, self.max_head))?;

            let head_len = match status {
                httparse::Status::Partial => {
                    if src.len() > self.max_head {
                        return Err(CodecError::HeadTooLarge(self.max_head));
                    }
                    return Ok(None);
                }
                httparse::Status::Complete(len) => len,
            };
            if head_len > self.max_head {
                return Err(CodecError::HeadTooLarge(self.max_head));
            }

            let code = res.code.unwrap_or_default();
            let status = StatusCode::from_u16(code)
                .map_err(|_| CodecError::MalformedHead(format!("bad status {}", code)))?;
            if status.is_informational() {
                src.advance(head_len);
                continue;
            }

            let headers = header_map(res.headers)?;
            src.advance(head_len);

            self.state = body_state(status, &headers)?;
            return Ok(Some(RelayEvent::ResponseHead(ResponseHead { status, headers })));
        }
    }

    fn decode_chunked(&mut self, src: &mut BytesMut, mut chunk: ChunkState) -> Result<Option<RelayEvent>, CodecError> {
        loop {
            match chunk {
                ChunkState::Size => {
                    let Some(end) = find_crlf(src) else {
                        if src.len() > MAX_CHUNK_LINE {
                            return Err(CodecError::InvalidChunk("size line too long"));
                        }
                        self.state = ResponseState::Chunked(chunk);
                        return Ok(None);
                    };
                    let size = parse_chunk_size(&src[..end])?;
                    src.advance(end + 2);
                    chunk = if size == 0 {
                        ChunkState::Trailers
                    } else {
                        ChunkState::Data(size)
                    };
                }
                ChunkState::Data(remaining) => {
                    if src.is_empty() {
                        self.state = ResponseState::Chunked(chunk);
                        return Ok(None);
                    }
                    let take = remaining.min(src.len() as u64) as usize;
                    let data = src.split_to(take).freeze();
                    let left = remaining - take as u64;
                    self.state = ResponseState::Chunked(if left == 0 {
                        ChunkState::DataEnd
                    } else {
                        ChunkState::Data(left)
                    });
                    return Ok(Some(RelayEvent::BodyChunk(BodyChunk::data(data))));
                }
                ChunkState::DataEnd => {
                    if src.len() < 2 {
                        self.state = ResponseState::Chunked(chunk);
                        return Ok(None);
                    }
                    if &src[..2] != b"\r\n" {
                        return Err(CodecError::InvalidChunk("missing CRLF after chunk data"));
                    }
                    src.advance(2);
                    chunk = ChunkState::Size;
                }
                ChunkState::Trailers => {
                    let Some(end) = find_crlf(src) else {
                        if src.len() > MAX_TRAILER_BYTES {
                            return Err(CodecError::InvalidChunk("trailer section too long"));
                        }
                        self.state = ResponseState::Chunked(chunk);
                        return Ok(None);
                    };
                    src.advance(end + 2);
                    if end == 0 {
                        self.state = ResponseState::Done;
                        return Ok(Some(RelayEvent::BodyChunk(BodyChunk::last(Bytes::new()))));
                    }
                }
            }
        }
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, CodecError> {
    let digits = line.split(|b| *b == b';').next().unwrap_or_default();
    let digits = std::str::from_utf8(digits)
        .map_err(|_| CodecError::InvalidChunk("non-ascii chunk size"))?
        .trim();
    if digits.is_empty() {
        return Err(CodecError::InvalidChunk("empty chunk size"));
    }
    u64::from_str_radix(digits, 16).map_err(|_| CodecError::InvalidChunk("bad chunk size"))
}

fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .last()
        .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

/// Parse the `content-length` header, if any.
pub fn content_length(headers: &HeaderMap) -> Result<Option<u64>, CodecError> {
    match headers.get(CONTENT_LENGTH) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Some)
            .ok_or(CodecError::InvalidContentLength),
    }
}

fn body_state(status: StatusCode, headers: &HeaderMap) -> Result<ResponseState, CodecError> {
    if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
        return Ok(ResponseState::Length(0));
    }
    if is_chunked(headers) {
        return Ok(ResponseState::Chunked(ChunkState::Size));
    }
    Ok(match content_length(headers)? {
        Some(len) => ResponseState::Length(len),
        None => ResponseState::UntilEof,
    })
}

impl Decoder for ResponseDecoder {
    type Item = RelayEvent;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RelayEvent>, CodecError> {
        match self.state {
            ResponseState::Head => self.decode_head(src),
            ResponseState::Length(0) => {
                self.state = ResponseState::Done;
                Ok(Some(RelayEvent::BodyChunk(BodyChunk::last(Bytes::new()))))
            }
            ResponseState::Length(remaining) => {
                if src.is_empty() {
                    return Ok(None);
                }
                let take = remaining.min(src.len() as u64) as usize;
                let data = src.split_to(take).freeze();
                let left = remaining - take as u64;
                if left == 0 {
                    self.state = ResponseState::Done;
                    Ok(Some(RelayEvent::BodyChunk(BodyChunk::last(data))))
                } else {
                    self.state = ResponseState::Length(left);
                    Ok(Some(RelayEvent::BodyChunk(BodyChunk::data(data))))
                }
            }
            ResponseState::Chunked(chunk) => self.decode_chunked(src, chunk),
            ResponseState::UntilEof => {
                if src.is_empty() {
                    return Ok(None);
                }
                let data = src.split().freeze();
                Ok(Some(RelayEvent::BodyChunk(BodyChunk::data(data))))
            }
            ResponseState::Done => {
                src.clear();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<RelayEvent>, CodecError> {
        if let Some(event) = self.decode(src)? {
            return Ok(Some(event));
        }
        match self.state {
            ResponseState::UntilEof => {
                self.state = ResponseState::Done;
                Ok(Some(RelayEvent::BodyChunk(BodyChunk::last(Bytes::new()))))
            }
            ResponseState::Done => Ok(None),
            ResponseState::Head if src.is_empty() => Ok(None),
            _ => Err(CodecError::Truncated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(decoder: &mut ResponseDecoder, input: &[u8]) -> Vec<RelayEvent> {
        let mut buf = BytesMut::from(input);
        let mut events = Vec::new();
        while let Some(event) = decoder.decode(&mut buf).unwrap() {
            events.push(event);
        }
        events
    }

    fn body_of(events: &[RelayEvent]) -> (Vec<u8>, usize) {
        let mut body = Vec::new();
        let mut lasts = 0;
        for event in events {
            if let RelayEvent::BodyChunk(chunk) = event {
                body.extend_from_slice(&chunk.data);
                if chunk.last {
                    lasts += 1;
                }
            }
        }
        (body, lasts)
    }

    #[test]
    fn request_head_is_decoded_once() {
        let mut decoder = RequestDecoder::new(8192);
        let mut buf = BytesMut::from(&b"GET /b/photo.jpg?x=1 HTTP/1.1\r\nHost: relay\r\n\r\nGET /again HTTP/1.1\r\n\r\n"[..]);

        let event = decoder.decode(&mut buf).unwrap().unwrap();
        match event {
            RelayEvent::RequestHead(head) => {
                assert_eq!(head.method, Method::GET);
                assert_eq!(head.target, "/b/photo.jpg?x=1");
                assert_eq!(head.headers.get("host").unwrap(), "relay");
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_request_waits_for_more() {
        let mut decoder = RequestDecoder::new(8192);
        let mut buf = BytesMut::from(&b"GET /a HTTP/1.1\r\nHo"[..]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"st: x\r\n\r\n");
        assert!(matches!(decoder.decode(&mut buf).unwrap(), Some(RelayEvent::RequestHead(_))));
    }

    #[test]
    fn oversized_request_head_is_rejected() {
        let mut decoder = RequestDecoder::new(64);
        let mut input = b"GET /a HTTP/1.1\r\nX-Pad: ".to_vec();
        input.extend(std::iter::repeat(b'a').take(128));
        let mut buf = BytesMut::from(&input[..]);

        let err = decoder.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::HeadTooLarge(64)));
        assert!(err.is_framing());
    }

    #[test]
    fn garbage_request_is_malformed() {
        let mut decoder = RequestDecoder::new(8192);
        let mut buf = BytesMut::from(&b"\x01\x02 nonsense\r\n\r\n"[..]);
        let err = decoder.decode(&mut buf).unwrap_err();
        assert!(err.is_framing());
    }

    #[test]
    fn truncated_request_at_eof() {
        let mut decoder = RequestDecoder::new(8192);
        let mut buf = BytesMut::from(&b"GET /a HTT"[..]);
        assert!(matches!(decoder.decode_eof(&mut buf), Err(CodecError::Truncated)));

        let mut idle = RequestDecoder::new(8192);
        assert!(idle.decode_eof(&mut BytesMut::new()).unwrap().is_none());
    }

    #[test]
    fn length_delimited_body() {
        let mut decoder = ResponseDecoder::new(8192);
        let events = drain(
            &mut decoder,
            b"HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\nContent-Length: 5\r\n\r\nhello",
        );

        match &events[0] {
            RelayEvent::ResponseHead(head) => {
                assert_eq!(head.status, StatusCode::OK);
                assert_eq!(head.headers.get("content-type").unwrap(), "application/pdf");
            }
            other => panic!("unexpected event {:?}", other),
        }
        let (body, lasts) = body_of(&events);
        assert_eq!(body, b"hello");
        assert_eq!(lasts, 1);
        assert!(matches!(&events[events.len() - 1], RelayEvent::BodyChunk(c) if c.last));
    }

    #[test]
    fn body_split_across_reads() {
        let mut decoder = ResponseDecoder::new(8192);
        let mut events = drain(&mut decoder, b"HTTP/1.1 200 OK\r\nContent-Length: 6\r\n\r\nabc");
        let mut buf = BytesMut::from(&b"def"[..]);
        while let Some(event) = decoder.decode(&mut buf).unwrap() {
            events.push(event);
        }

        let (body, lasts) = body_of(&events);
        assert_eq!(body, b"abcdef");
        assert_eq!(lasts, 1);
    }

    #[test]
    fn empty_body_still_ends() {
        let mut decoder = ResponseDecoder::new(8192);
        let events = drain(&mut decoder, b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], RelayEvent::BodyChunk(c) if c.last && c.data.is_empty()));
    }

    #[test]
    fn chunked_body_is_unframed() {
        let mut decoder = ResponseDecoder::new(8192);
        let events = drain(
            &mut decoder,
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4;ext=1\r\nWiki\r\n5\r\npedia\r\n0\r\nX-Trailer: y\r\n\r\n",
        );
        let (body, lasts) = body_of(&events);
        assert_eq!(body, b"Wikipedia");
        assert_eq!(lasts, 1);
    }

    #[test]
    fn bad_chunk_size_is_an_error() {
        let mut decoder = ResponseDecoder::new(8192);
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n"[..]);
        assert!(decoder.decode(&mut buf).unwrap().is_some());
        assert!(matches!(decoder.decode(&mut buf), Err(CodecError::InvalidChunk(_))));
    }

    #[test]
    fn informational_responses_are_skipped() {
        let mut decoder = ResponseDecoder::new(8192);
        let events = drain(
            &mut decoder,
            b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nx",
        );
        assert!(matches!(&events[0], RelayEvent::ResponseHead(h) if h.status == StatusCode::OK));
    }

    #[test]
    fn body_until_eof() {
        let mut decoder = ResponseDecoder::new(8192);
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\n\r\nstream"[..]);
        assert!(decoder.decode(&mut buf).unwrap().is_some());
        assert!(matches!(decoder.decode(&mut buf).unwrap(), Some(RelayEvent::BodyChunk(c)) if !c.last));

        let end = decoder.decode_eof(&mut buf).unwrap().unwrap();
        assert!(matches!(end, RelayEvent::BodyChunk(c) if c.last));
        assert!(decoder.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn eof_inside_length_body_is_truncation() {
        let mut decoder = ResponseDecoder::new(8192);
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc"[..]);
        while decoder.decode(&mut buf).unwrap().is_some() {}
        assert!(matches!(decoder.decode_eof(&mut buf), Err(CodecError::Truncated)));
    }

    #[test]
    fn invalid_content_length() {
        let mut decoder = ResponseDecoder::new(8192);
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: lots\r\n\r\n"[..]);
        assert!(matches!(decoder.decode(&mut buf), Err(CodecError::InvalidContentLength)));
    }
}
