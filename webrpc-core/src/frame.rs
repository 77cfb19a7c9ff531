//! Frame layer: the 5-byte-header wire framing gRPC-Web uses for both
//! message and trailer frames.
//!
//! Flag byte `0x80` marks a trailer frame; `0x00` marks a message frame.
//! This is gRPC-Web's trailer-in-body convention — there is no per-message
//! compression flag in this wire format, only message vs. trailer.

use bytes::{Bytes, BytesMut};

pub const HEADER_SIZE: usize = 5;
pub const TRAILER_FLAG: u8 = 0x80;
pub const MESSAGE_FLAG: u8 = 0x00;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub is_trailer: bool,
    pub payload: Bytes,
}

/// Encode a single frame: one flag byte, a big-endian u32 payload length,
/// then the payload itself.
pub fn encode_frame(flag: u8, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&[flag]);
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    buf.freeze()
}

pub fn encode_message_frame(payload: &[u8]) -> Bytes {
    encode_frame(MESSAGE_FLAG, payload)
}

pub fn encode_trailer_frame(payload: &[u8]) -> Bytes {
    encode_frame(TRAILER_FLAG, payload)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    AwaitingHeader,
    AwaitingPayload { flag: u8, len: u32 },
}

/// Incremental parser that turns a stream of arbitrarily-fragmented chunks
/// into complete [`Frame`]s. Owned exclusively by one stream; never
/// shared across concurrent chunks.
///
/// Invariant: the concatenation of every yielded frame's header + payload
/// equals the concatenation of every chunk fed to [`ChunkParser::parse`].
#[derive(Debug)]
pub struct ChunkParser {
    state: ParserState,
    header_buf: BytesMut,
    payload_buf: BytesMut,
}

impl Default for ChunkParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::AwaitingHeader,
            header_buf: BytesMut::new(),
            payload_buf: BytesMut::new(),
        }
    }

    /// Feed a chunk of bytes, returning every frame that became complete as
    /// a result. A chunk may complete zero, one, or many frames, and may
    /// leave a partial frame buffered for the next call.
    pub fn parse(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut input = chunk;
        let mut out = Vec::new();

        loop {
            match self.state {
                ParserState::AwaitingHeader => {
                    let need = HEADER_SIZE - self.header_buf.len();
                    let take = need.min(input.len());
                    self.header_buf.extend_from_slice(&input[..take]);
                    input = &input[take..];
                    if self.header_buf.len() < HEADER_SIZE {
                        break;
                    }
                    let flag = self.header_buf[0];
                    let len = u32::from_be_bytes([
                        self.header_buf[1],
                        self.header_buf[2],
                        self.header_buf[3],
                        self.header_buf[4],
                    ]);
                    self.header_buf.clear();
                    self.state = ParserState::AwaitingPayload { flag, len };
                }
                ParserState::AwaitingPayload { flag, len } => {
                    let need = len as usize - self.payload_buf.len();
                    let take = need.min(input.len());
                    self.payload_buf.extend_from_slice(&input[..take]);
                    input = &input[take..];
                    if self.payload_buf.len() < len as usize {
                        break;
                    }
                    let payload = self.payload_buf.split().freeze();
                    out.push(Frame {
                        is_trailer: flag & TRAILER_FLAG != 0,
                        payload,
                    });
                    self.state = ParserState::AwaitingHeader;
                }
            }
            if input.is_empty() {
                break;
            }
        }
        out
    }
}

/// CRLF-joined `name: value` trailer metadata, as carried in a trailer
/// frame's payload. Keys are case-insensitive; empty values are omitted on
/// encode.
pub fn encode_trailer_metadata(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut out = String::new();
    for (k, v) in entries {
        if v.is_empty() {
            continue;
        }
        out.push_str(k);
        out.push_str(": ");
        out.push_str(v);
        out.push_str("\r\n");
    }
    out.into_bytes()
}

/// Decode CRLF `name: value` trailer metadata. Keys are lowercased, values
/// trimmed, so `decode(encode(x)) == x` holds for any representable metadata.
pub fn decode_trailer_metadata(payload: &[u8]) -> Vec<(String, String)> {
    let text = String::from_utf8_lossy(payload);
    let mut out = Vec::new();
    for line in text.split("\r\n") {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some((k, v)) = line.split_once(':') {
            out.push((k.trim().to_ascii_lowercase(), v.trim().to_string()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_single_message_frame() {
        let frame = encode_message_frame(b"hello");
        let mut parser = ChunkParser::new();
        let frames = parser.parse(&frame);
        assert_eq!(frames.len(), 1);
        assert!(!frames[0].is_trailer);
        assert_eq!(&frames[0].payload[..], b"hello");
    }

    #[test]
    fn encode_decode_trailer_frame() {
        let frame = encode_trailer_frame(b"grpc-status: 0\r\n");
        let mut parser = ChunkParser::new();
        let frames = parser.parse(&frame);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_trailer);
    }

    #[test]
    fn parser_respects_fragment_boundaries() {
        let frame = encode_message_frame(b"hello world");
        let mut parser = ChunkParser::new();
        let mut got = Vec::new();
        for byte in frame.iter() {
            got.extend(parser.parse(&[*byte]));
        }
        assert_eq!(got.len(), 1);
        assert_eq!(&got[0].payload[..], b"hello world");
    }

    #[test]
    fn parser_yields_multiple_frames_from_one_chunk() {
        let mut combined = Vec::new();
        combined.extend_from_slice(&encode_message_frame(b"a"));
        combined.extend_from_slice(&encode_message_frame(b"bb"));
        combined.extend_from_slice(&encode_trailer_frame(b"grpc-status: 0\r\n"));

        let mut parser = ChunkParser::new();
        let frames = parser.parse(&combined);
        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[0].payload[..], b"a");
        assert_eq!(&frames[1].payload[..], b"bb");
        assert!(frames[2].is_trailer);
    }

    #[test]
    fn trailer_metadata_round_trips_and_omits_empty() {
        let encoded = encode_trailer_metadata(&[
            ("grpc-status", "0"),
            ("grpc-message", ""),
            ("x-response-id", "abc123"),
        ]);
        let decoded = decode_trailer_metadata(&encoded);
        assert_eq!(
            decoded,
            vec![
                ("grpc-status".to_string(), "0".to_string()),
                ("x-response-id".to_string(), "abc123".to_string()),
            ]
        );
    }

    #[test]
    fn trailer_decode_lowercases_keys() {
        let decoded = decode_trailer_metadata(b"Grpc-Status: 0\r\nGrpc-Message: boom\r\n");
        assert_eq!(decoded[0].0, "grpc-status");
        assert_eq!(decoded[1].0, "grpc-message");
    }
}
