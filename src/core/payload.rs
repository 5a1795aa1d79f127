//! A piece of application payload. It may or may not correspond to a packet.

use base64::Engine;
use bytes::Bytes;
use serde::{Serialize, Serializer};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Raw,
    Http,
    WebSocket,
}

/// Immutable unit of application data, tagged with direction and time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayloadChunk {
    #[serde(serialize_with = "serialize_base64")]
    payload: Bytes,
    pub is_sent: bool,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub chunk_type: ChunkType,
    pub content_type: Option<String>,
    pub path: Option<String>,
}

impl PayloadChunk {
    pub fn new(payload: impl Into<Bytes>, chunk_type: ChunkType, is_sent: bool, timestamp: u64) -> Self {
        Self {
            payload: payload.into(),
            is_sent,
            timestamp,
            chunk_type,
            content_type: None,
            path: None,
        }
    }

    pub fn with_http_meta(mut self, content_type: Option<String>, path: Option<String>) -> Self {
        self.content_type = content_type;
        self.path = path;
        self
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Chunk holding `payload[start..start + size]`, same type, direction and time.
    pub fn subchunk(&self, start: usize, size: usize) -> Result<PayloadChunk, AppError> {
        let len = self.payload.len();
        let end = start
            .checked_add(size)
            .filter(|&end| end <= len)
            .ok_or(AppError::OutOfBounds { start, size, len })?;

        Ok(PayloadChunk::new(
            self.payload.slice(start..end),
            self.chunk_type,
            self.is_sent,
            self.timestamp,
        ))
    }

    /// Same chunk metadata over a different payload.
    pub fn with_payload(&self, payload: impl Into<Bytes>) -> PayloadChunk {
        PayloadChunk {
            payload: payload.into(),
            ..self.clone()
        }
    }
}

fn serialize_base64<S: Serializer>(payload: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(data: &'static [u8]) -> PayloadChunk {
        PayloadChunk::new(Bytes::from_static(data), ChunkType::WebSocket, true, 1234)
    }

    #[test]
    fn test_full_range_subchunk_equals_original() {
        let c = chunk(b"hello world");
        let sub = c.subchunk(0, c.len()).unwrap();
        assert_eq!(sub.payload(), c.payload());
        assert_eq!(sub.chunk_type, ChunkType::WebSocket);
        assert!(sub.is_sent);
        assert_eq!(sub.timestamp, 1234);
    }

    #[test]
    fn test_subchunk_composes() {
        let c = chunk(b"0123456789");
        let direct = c.subchunk(3, 4).unwrap();
        let nested = c.subchunk(3, 6).unwrap().subchunk(0, 4).unwrap();
        assert_eq!(direct.payload(), b"3456");
        assert_eq!(nested.payload(), direct.payload());
    }

    #[test]
    fn test_subchunk_out_of_bounds() {
        let c = chunk(b"abc");
        assert_eq!(c.subchunk(2, 2).unwrap_err().kind(), "OutOfBounds");
        assert_eq!(c.subchunk(usize::MAX, 2).unwrap_err().kind(), "OutOfBounds");
        assert!(c.subchunk(3, 0).unwrap().is_empty());
    }

    #[test]
    fn test_subchunk_leaves_source_untouched() {
        let c = chunk(b"abcdef");
        let _ = c.subchunk(1, 2).unwrap();
        assert_eq!(c.payload(), b"abcdef");
    }

    #[test]
    fn test_with_payload_keeps_metadata() {
        let c = PayloadChunk::new(&b"GET / HTTP/1.1\r\n\r\n"[..], ChunkType::Http, true, 99)
            .with_http_meta(Some("text/html".into()), Some("/".into()));
        let replaced = c.with_payload(vec![0u8; 21]);
        assert_eq!(replaced.len(), 21);
        assert_eq!(replaced.chunk_type, ChunkType::Http);
        assert_eq!(replaced.timestamp, 99);
        assert_eq!(replaced.content_type.as_deref(), Some("text/html"));
        assert_eq!(replaced.path.as_deref(), Some("/"));
        assert_eq!(c.len(), 18);
    }

    #[test]
    fn test_serializes_payload_as_base64() {
        let c = chunk(b"hi");
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["payload"], "aGk=");
        assert_eq!(json["chunk_type"], "web_socket");
        assert_eq!(json["is_sent"], true);
    }
}
