//! Response translation for the client leg.
//!
//! # Responsibilities
//! - Map the origin status to what the client sees (200 stays, 404 stays,
//!   everything else becomes 500)
//! - Copy `content-type` / `content-length` on success, nothing else
//! - Re-frame the body as chunked when the origin gave no length
//! - Render the plain-text error page
//!
//! # Design Decisions
//! - Origin error bodies are never forwarded; the client gets the standard
//!   page for the mapped status
//! - Every response closes the client connection

use bytes::{BufMut, Bytes, BytesMut};
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{HeaderMap, StatusCode};

use crate::http::codec::content_length;
use crate::relay::event::BodyChunk;

/// A decoded origin response head.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ResponseHead {
    pub fn content_type(&self) -> Option<&[u8]> {
        self.headers.get(CONTENT_TYPE).map(|v| v.as_bytes())
    }

    pub fn content_length(&self) -> Option<u64> {
        content_length(&self.headers).ok().flatten()
    }
}

/// How body fragments are written to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// Bytes pass through unchanged; the client knows the length.
    Identity,
    /// Each fragment becomes one chunk, ended by the zero chunk.
    Chunked,
}

impl BodyFraming {
    /// Encode one fragment. `None` when there is nothing to write.
    pub fn encode(&self, chunk: &BodyChunk) -> Option<Bytes> {
        match self {
            BodyFraming::Identity => (!chunk.data.is_empty()).then(|| chunk.data.clone()),
            BodyFraming::Chunked => {
                if chunk.data.is_empty() && !chunk.last {
                    return None;
                }
                let mut buf = BytesMut::with_capacity(chunk.data.len() + 16);
                if !chunk.data.is_empty() {
                    buf.put_slice(format!("{:x}\r\n", chunk.data.len()).as_bytes());
                    buf.put_slice(&chunk.data);
                    buf.put_slice(b"\r\n");
                }
                if chunk.last {
                    buf.put_slice(b"0\r\n\r\n");
                }
                Some(buf.freeze())
            }
        }
    }
}

/// What the client receives for an origin response head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    /// Write `head`, then stream the body with `framing`.
    Stream { head: Bytes, framing: BodyFraming },
    /// Write the error page for this status and stop.
    Error(StatusCode),
}

pub fn translate_head(origin: &ResponseHead) -> Translation {
    match origin.status {
        StatusCode::OK => {
            let mut buf = BytesMut::with_capacity(128);
            buf.put_slice(b"HTTP/1.1 200 OK\r\n");
            if let Some(content_type) = origin.content_type() {
                buf.put_slice(b"content-type: ");
                buf.put_slice(content_type);
                buf.put_slice(b"\r\n");
            }
            let framing = match origin.content_length() {
                Some(len) => {
                    buf.put_slice(format!("content-length: {}\r\n", len).as_bytes());
                    BodyFraming::Identity
                }
                None => {
                    buf.put_slice(b"transfer-encoding: chunked\r\n");
                    BodyFraming::Chunked
                }
            };
            buf.put_slice(b"connection: close\r\n\r\n");
            Translation::Stream {
                head: buf.freeze(),
                framing,
            }
        }
        StatusCode::NOT_FOUND => Translation::Error(StatusCode::NOT_FOUND),
        _ => Translation::Error(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// A complete error response: `Failure: <code> <reason>`.
pub fn error_response(status: StatusCode) -> Bytes {
    let body = format!("Failure: {}\r\n", status);
    let mut buf = BytesMut::with_capacity(128 + body.len());
    buf.put_slice(format!("HTTP/1.1 {}\r\n", status).as_bytes());
    buf.put_slice(b"content-type: text/plain; charset=UTF-8\r\n");
    buf.put_slice(format!("content-length: {}\r\n", body.len()).as_bytes());
    buf.put_slice(b"connection: close\r\n\r\n");
    buf.put_slice(body.as_bytes());
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    fn origin(status: u16, headers: &[(&'static str, &'static str)]) -> ResponseHead {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        ResponseHead {
            status: StatusCode::from_u16(status).unwrap(),
            headers: map,
        }
    }

    #[test]
    fn ok_copies_type_and_length_only() {
        let head = origin(
            200,
            &[
                ("content-type", "application/pdf"),
                ("content-length", "1024"),
                ("x-amz-request-id", "abc"),
                ("etag", "\"e\""),
            ],
        );
        match translate_head(&head) {
            Translation::Stream { head, framing } => {
                assert_eq!(framing, BodyFraming::Identity);
                assert_eq!(
                    &head[..],
                    &b"HTTP/1.1 200 OK\r\ncontent-type: application/pdf\r\ncontent-length: 1024\r\nconnection: close\r\n\r\n"[..]
                );
            }
            other => panic!("unexpected translation {:?}", other),
        }
    }

    #[test]
    fn ok_without_length_is_chunked() {
        let head = origin(200, &[("transfer-encoding", "chunked")]);
        match translate_head(&head) {
            Translation::Stream { head, framing } => {
                assert_eq!(framing, BodyFraming::Chunked);
                let text = std::str::from_utf8(&head).unwrap();
                assert!(text.contains("transfer-encoding: chunked\r\n"));
                assert!(!text.contains("content-type"));
            }
            other => panic!("unexpected translation {:?}", other),
        }
    }

    #[test]
    fn status_mapping() {
        assert_eq!(translate_head(&origin(404, &[])), Translation::Error(StatusCode::NOT_FOUND));
        assert_eq!(
            translate_head(&origin(503, &[])),
            Translation::Error(StatusCode::INTERNAL_SERVER_ERROR)
        );
        assert_eq!(
            translate_head(&origin(403, &[])),
            Translation::Error(StatusCode::INTERNAL_SERVER_ERROR)
        );
        assert_eq!(
            translate_head(&origin(206, &[])),
            Translation::Error(StatusCode::INTERNAL_SERVER_ERROR)
        );
    }

    #[test]
    fn error_page_text() {
        let page = error_response(StatusCode::NOT_FOUND);
        let text = std::str::from_utf8(&page).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("content-type: text/plain; charset=UTF-8\r\n"));
        assert!(text.contains("content-length: 24\r\n"));
        assert!(text.ends_with("\r\n\r\nFailure: 404 Not Found\r\n"));
    }

    #[test]
    fn chunked_framing() {
        let framing = BodyFraming::Chunked;
        assert_eq!(
            framing.encode(&BodyChunk::data(Bytes::from_static(b"0123456789abcdef0"))).unwrap(),
            Bytes::from_static(b"11\r\n0123456789abcdef0\r\n")
        );
        assert_eq!(framing.encode(&BodyChunk::data(Bytes::new())), None);
        assert_eq!(
            framing.encode(&BodyChunk::last(Bytes::new())).unwrap(),
            Bytes::from_static(b"0\r\n\r\n")
        );
        assert_eq!(
            framing.encode(&BodyChunk::last(Bytes::from_static(b"ab"))).unwrap(),
            Bytes::from_static(b"2\r\nab\r\n0\r\n\r\n")
        );
    }

    #[test]
    fn identity_framing_skips_empty() {
        let framing = BodyFraming::Identity;
        assert_eq!(framing.encode(&BodyChunk::last(Bytes::new())), None);
        assert_eq!(
            framing.encode(&BodyChunk::data(Bytes::from_static(b"x"))).unwrap(),
            Bytes::from_static(b"x")
        );
    }
}
