use bytes::BytesMut;
use serde::Deserialize;

const DONE_SENTINEL: &str = "[DONE]";
const DATA_PREFIX: &str = "data:";
/// Longest delimiter is `\r\n\r\n`; a partial one may straddle two pushes.
const DELIMITER_OVERLAP: usize = 3;
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// One decoded unit of the generation event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Delta(String),
    Done,
    /// The server reported an upstream failure instead of a delta.
    ServerError(String),
    Malformed(String),
    /// Comments, keep-alives and frames without a `data:` line.
    Ignored,
}

#[derive(Debug, Deserialize)]
struct Payload {
    content: Option<String>,
    error: Option<String>,
}

/// Incremental splitter for blank-line delimited event frames.
///
/// Bytes are buffered until a full frame is present, so UTF-8 sequences and
/// JSON payloads split across network chunks decode correctly. A frame that
/// grows past the size cap without a delimiter fails the stream.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    /// Bytes of `buffer` already known to hold no complete delimiter.
    scanned: usize,
    max_frame_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("event frame exceeds {limit} bytes without a delimiter")]
pub struct FrameTooLarge {
    pub limit: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            scanned: 0,
            max_frame_bytes,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Frame>, FrameTooLarge> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some((end, delimiter_len)) = find_delimiter(&self.buffer, self.scanned) {
            let raw = self.buffer.split_to(end + delimiter_len);
            frames.push(parse_frame(&raw[..end]));
            self.scanned = 0;
        }
        self.scanned = self.buffer.len().saturating_sub(DELIMITER_OVERLAP);
        if self.buffer.len() > self.max_frame_bytes {
            self.buffer.clear();
            self.scanned = 0;
            return Err(FrameTooLarge {
                limit: self.max_frame_bytes,
            });
        }
        Ok(frames)
    }

    /// Decode whatever is left once the transport has ended.
    pub fn finish(&mut self) -> Option<Frame> {
        self.scanned = 0;
        if self.buffer.iter().all(u8::is_ascii_whitespace) {
            self.buffer.clear();
            return None;
        }
        let raw = self.buffer.split();
        Some(parse_frame(&raw))
    }
}

/// Earliest delimiter at or after `from`, as `(frame_end, delimiter_len)`.
fn find_delimiter(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let tail = buf.get(from..)?;
    let lf = find(tail, b"\n\n").map(|at| (from + at, 2));
    let crlf = find(tail, b"\r\n\r\n").map(|at| (from + at, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_frame(raw: &[u8]) -> Frame {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text,
        Err(err) => return Frame::Malformed(format!("invalid utf-8: {err}")),
    };

    let data: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix(DATA_PREFIX))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();
    if data.is_empty() {
        return Frame::Ignored;
    }

    parse_payload(data.join("\n").trim())
}

fn parse_payload(payload: &str) -> Frame {
    if payload == DONE_SENTINEL {
        return Frame::Done;
    }
    match serde_json::from_str::<Payload>(payload) {
        Ok(Payload {
            content,
            error: Some(error),
        }) if content.as_deref().is_none_or(str::is_empty) => Frame::ServerError(error),
        Ok(Payload {
            content: Some(content),
            ..
        }) => Frame::Delta(content),
        Ok(_) => Frame::Malformed("payload has no content field".to_string()),
        Err(err) => Frame::Malformed(format!("invalid payload {payload:?}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::{Frame, FrameDecoder, FrameTooLarge};

    #[test]
    fn frames_split_across_chunks_are_reassembled() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"cont").unwrap().is_empty());
        assert_eq!(
            decoder.push(b"ent\":\"Hi\"}\n\ndata: [DO").unwrap(),
            vec![Frame::Delta("Hi".into())]
        );
        assert_eq!(decoder.push(b"NE]\n\n").unwrap(), vec![Frame::Done]);
    }

    #[test]
    fn multibyte_characters_survive_chunk_boundaries() {
        let frame = "data: {\"content\":\"caf\u{e9}\"}\n\n".as_bytes();
        let split = frame.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&frame[..split]).unwrap().is_empty());
        assert_eq!(
            decoder.push(&frame[split..]).unwrap(),
            vec![Frame::Delta("caf\u{e9}".into())]
        );
    }

    #[test]
    fn crlf_delimiters_are_accepted() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder
            .push(b"data: {\"content\":\"a\"}\r\n\r\ndata: [DONE]\r\n\r\n")
            .unwrap();
        assert_eq!(frames, vec![Frame::Delta("a".into()), Frame::Done]);
    }

    #[test]
    fn bad_payloads_are_reported_not_fatal() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder
            .push(
                b"data: not json\n\ndata: {\"other\":1}\n\n: keep-alive\n\ndata: {\"error\":\"upstream\"}\n\n",
            )
            .unwrap();
        assert!(matches!(frames[0], Frame::Malformed(_)));
        assert!(matches!(frames[1], Frame::Malformed(_)));
        assert_eq!(frames[2], Frame::Ignored);
        assert_eq!(frames[3], Frame::ServerError("upstream".into()));
    }

    #[test]
    fn finish_decodes_unterminated_tail() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: [DONE]").unwrap().is_empty());
        assert_eq!(decoder.finish(), Some(Frame::Done));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn error_wins_over_empty_content() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder
            .push(b"data: {\"content\":\"\",\"error\":\"quota exceeded\"}\n\n")
            .unwrap();
        assert_eq!(frames, vec![Frame::ServerError("quota exceeded".into())]);
    }

    #[test]
    fn delimiter_straddling_pushes_is_found() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"content\":\"a\"}\r").unwrap().is_empty());
        assert!(decoder.push(b"\n\r").unwrap().is_empty());
        assert_eq!(
            decoder.push(b"\ndata: [DONE]\n\n").unwrap(),
            vec![Frame::Delta("a".into()), Frame::Done]
        );
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut decoder = FrameDecoder::with_max_frame_bytes(64);
        let chunk = [b'x'; 40];
        assert!(decoder.push(b"data: ").unwrap().is_empty());
        assert!(decoder.push(&chunk).unwrap().is_empty());
        assert_eq!(decoder.push(&chunk), Err(FrameTooLarge { limit: 64 }));
    }
}
