//! Reassembles `\r`-delimited JSON records across arbitrary chunk boundaries.
//!
//! This plays the role `util::Lines` played in the crate this one grew out
//! of — an owned buffer that carries an unterminated remainder forward
//! across `poll`/`consume` calls — except it splits on `\r` instead of
//! `\r\n` and decodes each completed segment as JSON instead of yielding raw
//! byte lines.

use serde_json::Value;

/// A JSON record that failed to decode, together with the raw bytes that
/// were fed to the decoder.
///
/// Per the crate's resolved design choice (see DESIGN.md), encountering one
/// of these does not discard records already decoded from the same chunk:
/// [`FrameExtractor::consume`] keeps collecting the records around it.
#[derive(Debug)]
pub struct InvalidJson {
    pub segment: Vec<u8>,
    pub error: serde_json::Error,
}

/// The result of feeding one chunk to a [`FrameExtractor`].
#[derive(Debug, Default)]
pub struct Consumed {
    /// Records completed by this chunk, in wire order.
    pub records: Vec<Value>,
    /// Segments that looked like complete records (i.e. were not the
    /// unterminated tail carried into the next chunk) but failed to decode.
    pub errors: Vec<InvalidJson>,
}

/// A stateful decoder that turns a sequence of binary chunks into a sequence
/// of parsed JSON records, carrying any unterminated suffix forward.
///
/// Invariant: `self.buffer` never contains a complete record terminator
/// (`\r`); any complete record has already been yielded and removed.
#[derive(Debug, Default)]
pub struct FrameExtractor {
    buffer: Vec<u8>,
}

impl FrameExtractor {
    pub fn new() -> Self {
        FrameExtractor::default()
    }

    /// Resets the buffer. Called when a new request's headers arrive so
    /// leftovers from the previous one never leak into the new stream.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Feeds one chunk of bytes, returning any records it completed.
    pub fn consume(&mut self, chunk: &[u8]) -> Consumed {
        if is_blank(chunk) {
            return Consumed::default();
        }

        let segments: Vec<&[u8]> = chunk.split(|&b| b == b'\r').collect();
        let last = segments.len() - 1;
        let mut out = Consumed::default();

        for (i, seg) in segments.into_iter().enumerate() {
            if i == 0 && i == last {
                // No `\r` anywhere in this chunk: nothing is terminated yet,
                // so the whole thing just extends the carried-over buffer.
                self.buffer.extend_from_slice(seg);
            } else if i == 0 {
                let mut combined = std::mem::take(&mut self.buffer);
                combined.extend_from_slice(seg);
                self.decode_non_terminal(combined, &mut out);
            } else if i == last {
                self.finish_tail(seg);
            } else if !is_blank(seg) {
                self.decode_non_terminal(seg.to_vec(), &mut out);
            }
        }

        out
    }

    fn decode_non_terminal(&mut self, segment: Vec<u8>, out: &mut Consumed) {
        if is_blank(&segment) {
            return;
        }
        match serde_json::from_slice(&segment) {
            Ok(value) => out.records.push(value),
            Err(error) => out.errors.push(InvalidJson { segment, error }),
        }
    }

    /// The segment after the last `\r` in a chunk is never known to be
    /// complete — it isn't decoded at all here, only carried forward as the
    /// new buffer, verbatim, to be decoded once a later chunk terminates it
    /// with its own `\r` (see the `i == 0` arm of `consume`). An empty tail
    /// (the chunk ended exactly on a separator) just clears the buffer,
    /// since there's nothing left to carry.
    fn finish_tail(&mut self, tail: &[u8]) {
        if is_blank(tail) {
            self.buffer.clear();
        } else {
            self.buffer = tail.to_vec();
        }
    }
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.is_empty() || bytes == b"\n"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_single_record() {
        let mut extractor = FrameExtractor::new();
        let consumed = extractor.consume(b"{\"text\":\"hi\"}\r");
        assert_eq!(consumed.records, vec![serde_json::json!({"text": "hi"})]);
        assert!(consumed.errors.is_empty());
    }

    #[test]
    fn empty_and_newline_chunks_are_inert() {
        let mut extractor = FrameExtractor::new();
        assert!(extractor.consume(b"").records.is_empty());
        assert!(extractor.consume(b"\n").records.is_empty());
        assert!(extractor.consume(b"\r").records.is_empty());
    }

    #[test]
    fn record_split_across_many_chunks_decodes_once_terminated() {
        let mut extractor = FrameExtractor::new();
        assert!(extractor.consume(b"{\"te").records.is_empty());
        assert!(extractor.consume(b"xt\":\"hel").records.is_empty());
        let consumed = extractor.consume(b"lo\"}\r");
        assert_eq!(consumed.records, vec![serde_json::json!({"text": "hello"})]);
    }

    #[test]
    fn feeding_whole_stream_at_once_matches_incremental_feeding() {
        let whole = b"{\"a\":1}\r{\"b\":2}\r{\"c\":3}\r";
        let mut all_at_once = FrameExtractor::new();
        let one_shot = all_at_once.consume(whole).records;

        let mut incremental = FrameExtractor::new();
        let mut piecewise = Vec::new();
        for byte in whole {
            piecewise.extend(incremental.consume(&[*byte]).records);
        }

        assert_eq!(one_shot, piecewise);
    }

    #[test]
    fn invalid_json_on_non_terminal_segment_is_reported_but_others_survive() {
        let mut extractor = FrameExtractor::new();
        let consumed = extractor.consume(b"{\"ok\":1}\r not json\r {\"ok\":2}\r");
        assert_eq!(consumed.errors.len(), 1);
        assert_eq!(
            consumed.records,
            vec![serde_json::json!({"ok": 1}), serde_json::json!({"ok": 2})]
        );
    }

    #[test]
    fn final_record_without_trailing_separator_is_retained_until_terminated() {
        let mut extractor = FrameExtractor::new();
        let consumed = extractor.consume(b"{\"a\":1}\r{\"b\":2}");
        assert_eq!(consumed.records, vec![serde_json::json!({"a": 1})]);
        let consumed = extractor.consume(b"\r");
        assert_eq!(consumed.records, vec![serde_json::json!({"b": 2})]);
    }
}
