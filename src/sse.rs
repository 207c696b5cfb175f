//! Incremental line framing for the upstream SSE byte stream.
//!
//! The upstream responds with newline-delimited frames where event
//! payloads ride on `data:` lines. Network reads arrive at arbitrary
//! byte boundaries, so [`LineBuffer`] carries the unterminated tail
//! (possibly mid-character) between reads and only decodes complete
//! lines. The buffer is owned by a single attempt and rebuilt for each
//! retry so no partial data leaks across attempts.

/// Carry-over buffer that turns arbitrary byte chunks into complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every newly complete line.
    ///
    /// Splitting happens on raw bytes, so a multi-byte character divided
    /// across two chunks decodes intact once its line completes. Invalid
    /// byte sequences are replaced rather than aborting the stream. A
    /// trailing `\r` is stripped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop(); // the '\n'
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }
}

/// Extract the payload of a `data:` line, or `None` for anything else
/// (blank lines, comments, other SSE fields). Lines we do not recognize
/// are dropped silently; that is not an error condition.
#[must_use]
pub fn event_payload(line: &str) -> Option<&str> {
    let data = line
        .strip_prefix("data: ")
        .or_else(|| line.strip_prefix("data:"))?;
    let data = data.trim();
    if data.is_empty() {
        None
    } else {
        Some(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(input: &[u8], chunk_size: usize) -> Vec<String> {
        let mut buffer = LineBuffer::new();
        let mut lines = Vec::new();
        for chunk in input.chunks(chunk_size.max(1)) {
            lines.extend(buffer.push(chunk));
        }
        lines
    }

    #[test]
    fn test_chunk_boundary_invariance() {
        let input = b"data: {\"type\":\"text\"}\n\ndata: second\nevent: ping\ntail";
        let whole = feed_all(input, input.len());

        for size in 1..=input.len() {
            assert_eq!(feed_all(input, size), whole, "chunk size {size}");
        }
        // Tail without a terminator is never surfaced
        assert!(!whole.iter().any(|l| l.contains("tail")));
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let text = "data: 你好\n";
        let bytes = text.as_bytes();
        // Split inside the first multi-byte character
        let mut buffer = LineBuffer::new();
        let mut lines = buffer.push(&bytes[..8]);
        lines.extend(buffer.push(&bytes[8..]));
        assert_eq!(lines, vec!["data: 你好".to_string()]);
    }

    #[test]
    fn test_invalid_bytes_are_replaced_not_fatal() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push(b"data: a\xff\xfeb\ndata: clean\n");
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains('\u{FFFD}'));
        assert_eq!(lines[1], "data: clean");
    }

    #[test]
    fn test_crlf_terminators() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push(b"data: one\r\ndata: two\n");
        assert_eq!(lines, vec!["data: one".to_string(), "data: two".to_string()]);
    }

    #[test]
    fn test_event_payload_filtering() {
        assert_eq!(event_payload("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(event_payload("data:{\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(event_payload("data:   "), None);
        assert_eq!(event_payload(""), None);
        assert_eq!(event_payload(": comment"), None);
        assert_eq!(event_payload("event: ping"), None);
        assert_eq!(event_payload("retry: 500"), None);
    }
}
