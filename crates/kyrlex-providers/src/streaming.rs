//! Helpers for decoding server-sent event streams.

/// Decode as much of `buffer` as forms complete UTF-8, leaving a trailing partial
/// character in place for the next network chunk.
///
/// Returns `None` when nothing can be decoded yet. Invalid sequences are replaced
/// with U+FFFD rather than stalling the stream.
pub fn decode_utf8_streaming(buffer: &mut Vec<u8>) -> Option<String> {
    if buffer.is_empty() {
        return None;
    }

    match std::str::from_utf8(buffer) {
        Ok(text) => {
            let text = text.to_string();
            buffer.clear();
            Some(text)
        }
        Err(e) if e.error_len().is_some() => {
            let text = String::from_utf8_lossy(buffer).into_owned();
            buffer.clear();
            Some(text)
        }
        Err(e) => {
            let valid = e.valid_up_to();
            if valid == 0 {
                return None;
            }
            let text = String::from_utf8_lossy(&buffer[..valid]).into_owned();
            buffer.drain(..valid);
            Some(text)
        }
    }
}

/// Splits a byte stream into SSE `data:` payloads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    bytes: Vec<u8>,
    text: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a network chunk, returning every `data:` payload completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.bytes.extend_from_slice(chunk);
        if let Some(decoded) = decode_utf8_streaming(&mut self.bytes) {
            self.text.push_str(&decoded);
        }

        let mut payloads = Vec::new();
        while let Some(line_end) = self.text.find('\n') {
            let line = self.text[..line_end].trim().to_string();
            self.text.drain(..line_end + 1);
            if let Some(data) = data_payload(&line) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flush a final unterminated line once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if !self.bytes.is_empty() {
            self.text.push_str(&String::from_utf8_lossy(&self.bytes));
            self.bytes.clear();
        }
        let line = std::mem::take(&mut self.text);
        data_payload(line.trim())
    }
}

fn data_payload(line: &str) -> Option<String> {
    let data = line.strip_prefix("data:")?.trim_start();
    if data.is_empty() {
        None
    } else {
        Some(data.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_complete_text() {
        let mut buffer = "Статья 1".as_bytes().to_vec();
        assert_eq!(decode_utf8_streaming(&mut buffer).as_deref(), Some("Статья 1"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_decode_keeps_split_character() {
        // "я" is two bytes; deliver the first one only
        let bytes = "ая".as_bytes();
        let mut buffer = bytes[..3].to_vec();
        assert_eq!(decode_utf8_streaming(&mut buffer).as_deref(), Some("а"));
        assert_eq!(buffer.len(), 1);

        buffer.push(bytes[3]);
        assert_eq!(decode_utf8_streaming(&mut buffer).as_deref(), Some("я"));
    }

    #[test]
    fn test_decode_lone_partial_waits() {
        let mut buffer = vec!["ж".as_bytes()[0]];
        assert!(decode_utf8_streaming(&mut buffer).is_none());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_decode_invalid_bytes_are_replaced() {
        let mut buffer = vec![b'a', 0xFF, b'b'];
        assert_eq!(decode_utf8_streaming(&mut buffer).as_deref(), Some("a\u{FFFD}b"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_sse_payloads_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\":").is_empty());
        let payloads = decoder.push(b"1}\r\n\r\ndata: {\"b\":2}\n");
        assert_eq!(payloads, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn test_sse_ignores_non_data_lines() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push(b": keep-alive\nevent: message\ndata: x\n");
        assert_eq!(payloads, vec!["x"]);
    }

    #[test]
    fn test_sse_finish_flushes_last_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("tail"));
        assert!(decoder.finish().is_none());
    }
}
