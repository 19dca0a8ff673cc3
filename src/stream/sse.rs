//! Server-Sent Events framing (spec §4.G(a)): a re-encodable decoder/encoder
//! pair, since `eventsource-stream` only parses one direction.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    pub event: Option<String>,
    pub id: Option<String>,
    pub retry: Option<String>,
    pub data: String,
}

/// Streaming SSE decoder: feed bytes, get back complete records; the
/// remainder after the last `\n\n` is carried across calls.
#[derive(Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode UTF-8 with replacement, buffer until the last `\n\n`, and
    /// return every complete record found so far.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Chunk> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        self.drain_complete_records()
    }

    /// Attempt to parse a final record from whatever remains in the buffer.
    pub fn finish(mut self) -> Vec<Chunk> {
        let mut out = self.drain_complete_records();
        let tail = std::mem::take(&mut self.buffer);
        if let Some(chunk) = parse_record(&tail) {
            out.push(chunk);
        }
        out
    }

    fn drain_complete_records(&mut self) -> Vec<Chunk> {
        let mut out = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let record = self.buffer[..pos].to_string();
            self.buffer = self.buffer[pos + 2..].to_string();
            if let Some(chunk) = parse_record(&record) {
                out.push(chunk);
            }
        }
        out
    }
}

fn parse_record(record: &str) -> Option<Chunk> {
    if record.trim().is_empty() {
        return None;
    }

    let mut chunk = Chunk::default();
    let mut data_lines = Vec::new();

    for line in record.split('\n') {
        if let Some(rest) = line.strip_prefix("event:") {
            chunk.event = Some(rest.trim_start().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start().to_string());
        } else if let Some(rest) = line.strip_prefix("id:") {
            chunk.id = Some(rest.trim_start().to_string());
        } else if let Some(rest) = line.strip_prefix("retry:") {
            chunk.retry = Some(rest.trim_start().to_string());
        }
    }

    chunk.data = data_lines.join("\n");
    Some(chunk)
}

/// Re-encode a chunk symmetrically: `event`/`id`/`retry` headers, each
/// `data` line prefixed with `data: `, terminator `\n\n`.
pub fn encode(chunk: &Chunk) -> String {
    let mut out = String::new();
    if let Some(event) = &chunk.event {
        out.push_str("event: ");
        out.push_str(event);
        out.push('\n');
    }
    if let Some(id) = &chunk.id {
        out.push_str("id: ");
        out.push_str(id);
        out.push('\n');
    }
    if let Some(retry) = &chunk.retry {
        out.push_str("retry: ");
        out.push_str(retry);
        out.push('\n');
    }
    for line in chunk.data.split('\n') {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_multiline_data_and_carries_remainder() {
        let mut decoder = SseDecoder::new();
        let chunks = decoder.push(b"event: foo\ndata: line1\ndata: line2\n\ndata: partial");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].event.as_deref(), Some("foo"));
        assert_eq!(chunks[0].data, "line1\nline2");

        let rest = decoder.finish();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].data, "partial");
    }

    #[test]
    fn encode_is_symmetric_with_decode() {
        let chunk = Chunk {
            event: Some("message".to_string()),
            id: Some("42".to_string()),
            retry: None,
            data: "a\nb".to_string(),
        };
        let encoded = encode(&chunk);
        let mut decoder = SseDecoder::new();
        let decoded = decoder.push(encoded.as_bytes());
        assert_eq!(decoded, vec![chunk]);
    }

    #[test]
    fn done_literal_round_trips_as_plain_data() {
        let mut decoder = SseDecoder::new();
        let chunks = decoder.push(b"data: [DONE]\n\n");
        assert_eq!(chunks[0].data, "[DONE]");
    }
}
