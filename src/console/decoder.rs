//! Line Decoder - reassembles console lines from raw pipe chunks
//!
//! The server's stdout/stderr arrive as unframed byte chunks. A chunk may end in
//! the middle of a line, and with a multi-byte console encoding (UTF-8, GBK, ...)
//! it may end in the middle of a character. The decoder keeps both kinds of
//! leftovers between calls:
//! - undecoded trailing bytes stay inside the stateful `encoding_rs` decoder
//! - decoded text without a terminating `\n` stays in `partial`

use encoding_rs::{CoderResult, Decoder, Encoding, UTF_8};

/// Fallback reservation when the decoder cannot bound its output size.
const FALLBACK_RESERVE: usize = 4096;

/// Resolve a console encoding label (`"utf-8"`, `"gbk"`, `"shift_jis"`, ...).
///
/// Unknown labels fall back to UTF-8 so a typo in the configuration never
/// prevents the server from starting.
pub fn resolve_encoding(label: &str) -> &'static Encoding {
    match Encoding::for_label(label.trim().as_bytes()) {
        Some(encoding) => encoding,
        None => {
            tracing::warn!("Unknown console encoding '{}', falling back to UTF-8", label);
            UTF_8
        }
    }
}

/// Stateful byte-to-line decoder, one per output stream per process lifetime.
pub struct LineDecoder {
    encoding: &'static Encoding,
    decoder: Decoder,
    partial: String,
}

impl LineDecoder {
    pub fn new(encoding: &'static Encoding) -> Self {
        Self {
            encoding,
            decoder: encoding.new_decoder_without_bom_handling(),
            partial: String::new(),
        }
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Feed one chunk and return every line it completed, in order.
    ///
    /// Lines are returned without their `\n` (and without a `\r` directly before it).
    /// Empty lines are kept; filtering is the consumer's business.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut consumed = 0;
        loop {
            let remaining = &chunk[consumed..];
            let reserve = self
                .decoder
                .max_utf8_buffer_length(remaining.len())
                .unwrap_or(FALLBACK_RESERVE);
            self.partial.reserve(reserve);

            let (result, read, _had_errors) =
                self.decoder.decode_to_string(remaining, &mut self.partial, false);
            consumed += read;
            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => continue,
            }
        }

        let Some(last_newline) = self.partial.rfind('\n') else {
            return Vec::new();
        };
        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);

        complete
            .split_terminator('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect()
    }

    /// Text decoded so far that has not been terminated by a newline yet.
    pub fn pending(&self) -> &str {
        &self.partial
    }

    /// End of stream: hand back the unterminated tail (if any) and reset.
    ///
    /// Bytes still waiting inside the decoder for the rest of a character are discarded.
    pub fn finish(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.partial);
        self.reset();
        let tail = tail.strip_suffix('\r').map(str::to_string).unwrap_or(tail);
        if tail.is_empty() {
            None
        } else {
            Some(tail)
        }
    }

    /// Drop all carried state, both undecoded bytes and the partial line.
    pub fn reset(&mut self) {
        self.decoder = self.encoding.new_decoder_without_bom_handling();
        self.partial.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::GBK;

    fn feed_all(decoder: &mut LineDecoder, chunks: &[&[u8]]) -> Vec<String> {
        chunks.iter().flat_map(|c| decoder.feed(c)).collect()
    }

    #[test]
    fn test_complete_lines_in_one_chunk() {
        let mut decoder = LineDecoder::new(UTF_8);
        let lines = decoder.feed(b"first\nsecond\n");
        assert_eq!(lines, vec!["first", "second"]);
        assert_eq!(decoder.pending(), "");
    }

    #[test]
    fn test_partial_line_carried_forward() {
        let mut decoder = LineDecoder::new(UTF_8);
        assert!(decoder.feed(b"[12:00:00] [Server thr").is_empty());
        assert_eq!(decoder.pending(), "[12:00:00] [Server thr");

        let lines = decoder.feed(b"ead/INFO]: Done!\nnext");
        assert_eq!(lines, vec!["[12:00:00] [Server thread/INFO]: Done!"]);
        assert_eq!(decoder.pending(), "next");
    }

    #[test]
    fn test_crlf_is_stripped() {
        let mut decoder = LineDecoder::new(UTF_8);
        let lines = feed_all(&mut decoder, &[b"a\r", b"\nb\r\n"]);
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn test_empty_lines_are_kept() {
        let mut decoder = LineDecoder::new(UTF_8);
        assert_eq!(decoder.feed(b"a\n\nb\n"), vec!["a", "", "b"]);
    }

    #[test]
    fn test_utf8_split_at_every_offset() {
        let data = "[12:00:00] [Server thread/INFO]: <玩家> 你好世界\n第二行 ✓\n".as_bytes();
        let mut whole = LineDecoder::new(UTF_8);
        let expected = whole.feed(data);
        assert_eq!(expected.len(), 2);

        for offset in 0..=data.len() {
            let mut decoder = LineDecoder::new(UTF_8);
            let lines = feed_all(&mut decoder, &[&data[..offset], &data[offset..]]);
            assert_eq!(lines, expected, "split at byte {}", offset);
            assert_eq!(decoder.pending(), "");
        }
    }

    #[test]
    fn test_byte_by_byte_feeding() {
        let data = "ÄÖÜ 日本語\n🙂 emoji\n".as_bytes();
        let mut decoder = LineDecoder::new(UTF_8);
        let lines: Vec<String> = data.iter().flat_map(|b| decoder.feed(&[*b])).collect();
        assert_eq!(lines, vec!["ÄÖÜ 日本語", "🙂 emoji"]);
    }

    #[test]
    fn test_gbk_split_mid_character() {
        let (encoded, _, had_errors) = GBK.encode("服务器已启动\n<所长> 开服\n");
        assert!(!had_errors);
        let bytes = encoded.into_owned();

        for offset in 0..=bytes.len() {
            let mut decoder = LineDecoder::new(GBK);
            let lines = feed_all(&mut decoder, &[&bytes[..offset], &bytes[offset..]]);
            assert_eq!(lines, vec!["服务器已启动", "<所长> 开服"], "split at byte {}", offset);
        }
    }

    #[test]
    fn test_invalid_bytes_become_replacement_char() {
        let mut decoder = LineDecoder::new(UTF_8);
        let lines = decoder.feed(b"bad \xFF byte\n");
        assert_eq!(lines, vec!["bad \u{FFFD} byte"]);
    }

    #[test]
    fn test_finish_returns_tail_and_discards_split_char() {
        let mut decoder = LineDecoder::new(UTF_8);
        let bytes = "tail 你".as_bytes();
        // cut inside the last 3-byte character
        assert!(decoder.feed(&bytes[..bytes.len() - 1]).is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("tail "));
        assert_eq!(decoder.pending(), "");
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_reset_clears_carried_bytes() {
        let mut decoder = LineDecoder::new(UTF_8);
        let bytes = "你".as_bytes();
        decoder.feed(&bytes[..2]);
        decoder.reset();
        // the dangling continuation byte is invalid on its own after a reset
        assert_eq!(decoder.feed(&[bytes[2], b'\n']), vec!["\u{FFFD}"]);
    }

    #[test]
    fn test_resolve_encoding() {
        assert_eq!(resolve_encoding("utf-8"), UTF_8);
        assert_eq!(resolve_encoding(" GBK "), GBK);
        assert_eq!(resolve_encoding("definitely-not-an-encoding"), UTF_8);
    }
}
