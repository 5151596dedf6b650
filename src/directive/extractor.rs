//! Incremental directive extraction over a streaming token feed.
//!
//! Chunk boundaries are arbitrary: a marker, a kind token, or an argument
//! may arrive split across any number of chunks. The extractor keeps an
//! accumulation buffer across calls and holds back any trailing text that
//! could still become a start marker, so a split like `"[AC" + "TION: ..."`
//! scans identically to the unsplit text.
//!
//! Directives do not nest: the scanner takes the first unmatched start
//! marker and the first end token after it; a start marker inside an open
//! candidate is literal argument content. A tag that closes but fails the
//! body grammar, and an open fragment still unterminated when the stream
//! ends, are both discarded without ever reaching the plain-text output.

use super::grammar::{self, END_MARKER, START_MARKER};
use super::{RawDirectiveCandidate, StreamItem};

/// Stateful scanner for one turn's token stream.
///
/// Feed chunks as they arrive, then call [`finish`](Self::finish) when the
/// stream for the turn ends. [`reset`](Self::reset) restarts it for the
/// next turn.
#[derive(Debug, Default)]
pub struct StreamExtractor {
    /// Unconsumed tail of the accumulated text.
    buffer: String,
    /// Bytes already consumed before `buffer`; offset base for candidates.
    consumed: usize,
    /// Count of discarded malformed tags and fragments this turn.
    malformed: u32,
}

impl StreamExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk of model output and return everything that became
    /// decidable: plain text safe to forward, and complete candidates.
    pub fn feed(&mut self, chunk: &str) -> Vec<StreamItem> {
        self.buffer.push_str(chunk);
        let mut items = Vec::new();

        loop {
            let Some(marker_at) = self.buffer.find(START_MARKER) else {
                // No start marker. Forward everything except a trailing
                // partial marker prefix, which the next chunk may complete.
                let hold = grammar::partial_marker_suffix(&self.buffer);
                let safe_len = self.buffer.len() - hold;
                if safe_len > 0 {
                    let safe: String = self.buffer.drain(..safe_len).collect();
                    self.consumed += safe_len;
                    items.push(StreamItem::PlainText(safe));
                }
                break;
            };

            if marker_at > 0 {
                let before: String = self.buffer.drain(..marker_at).collect();
                self.consumed += marker_at;
                items.push(StreamItem::PlainText(before));
            }

            // Marker is now at the buffer start. Without an end token the
            // candidate is still open; hold it until more text arrives.
            let Some(rel_end) = self.buffer[START_MARKER.len()..].find(END_MARKER) else {
                break;
            };

            let body_end = START_MARKER.len() + rel_end;
            let tag_len = body_end + END_MARKER.len_utf8();
            match grammar::split_body(&self.buffer[START_MARKER.len()..body_end]) {
                Some((kind_token, raw_argument)) => {
                    items.push(StreamItem::Candidate(RawDirectiveCandidate {
                        kind_token,
                        raw_argument,
                        start_offset: self.consumed,
                        end_offset: self.consumed + tag_len,
                    }));
                }
                None => {
                    self.malformed += 1;
                    tracing::warn!(
                        tag = %&self.buffer[..tag_len],
                        "discarding unparsable directive tag"
                    );
                }
            }
            self.buffer.drain(..tag_len);
            self.consumed += tag_len;
        }

        items
    }

    /// Signal end of stream for the turn. An open fragment from the last
    /// start marker onward is discarded here, never forwarded; held text
    /// that turned out not to be directive syntax is released.
    pub fn finish(&mut self) -> Vec<StreamItem> {
        let mut items = Vec::new();
        match self.buffer.find(START_MARKER) {
            Some(marker_at) => {
                if marker_at > 0 {
                    items.push(StreamItem::PlainText(self.buffer[..marker_at].to_string()));
                }
                self.malformed += 1;
                tracing::warn!(
                    fragment = %&self.buffer[marker_at..],
                    "discarding unterminated directive fragment at end of stream"
                );
                self.consumed += self.buffer.len();
                self.buffer.clear();
            }
            None => {
                if !self.buffer.is_empty() {
                    let text = std::mem::take(&mut self.buffer);
                    self.consumed += text.len();
                    items.push(StreamItem::PlainText(text));
                }
            }
        }
        items
    }

    /// Restart for a new turn.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.consumed = 0;
        self.malformed = 0;
    }

    /// Malformed tags and fragments discarded since the last reset.
    pub fn malformed_count(&self) -> u32 {
        self.malformed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(items: &[StreamItem]) -> String {
        items
            .iter()
            .filter_map(|item| match item {
                StreamItem::PlainText(text) => Some(text.as_str()),
                StreamItem::Candidate(_) => None,
            })
            .collect()
    }

    fn candidates(items: &[StreamItem]) -> Vec<RawDirectiveCandidate> {
        items
            .iter()
            .filter_map(|item| match item {
                StreamItem::Candidate(c) => Some(c.clone()),
                StreamItem::PlainText(_) => None,
            })
            .collect()
    }

    fn run_in_chunks(chunks: &[&str]) -> Vec<StreamItem> {
        let mut extractor = StreamExtractor::new();
        let mut items = Vec::new();
        for chunk in chunks {
            items.extend(extractor.feed(chunk));
        }
        items.extend(extractor.finish());
        items
    }

    #[test]
    fn single_chunk_directive_with_leading_text() {
        let items = run_in_chunks(&["Let me check. [ACTION: TERMINAL | ls -la]"]);
        assert_eq!(items[0], StreamItem::PlainText("Let me check. ".into()));
        let found = candidates(&items);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind_token, "TERMINAL");
        assert_eq!(found[0].raw_argument, "ls -la");
        assert_eq!(found[0].start_offset, 14);
        assert_eq!(found[0].end_offset, 41);
    }

    #[test]
    fn marker_split_across_two_chunks() {
        let items = run_in_chunks(&["Sure [ACTION: OP", "EN | firefox]"]);
        assert_eq!(plain(&items), "Sure ");
        let found = candidates(&items);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind_token, "OPEN");
        assert_eq!(found[0].raw_argument, "firefox");
    }

    #[test]
    fn chunk_boundary_invariance_char_by_char() {
        let text = "Thinking… [ACTION: SEARCH | rust async book] done";
        let whole = run_in_chunks(&[text]);

        let mut extractor = StreamExtractor::new();
        let mut items = Vec::new();
        for (at, ch) in text.char_indices() {
            items.extend(extractor.feed(&text[at..at + ch.len_utf8()]));
        }
        items.extend(extractor.finish());

        assert_eq!(plain(&items), plain(&whole));
        assert_eq!(candidates(&items), candidates(&whole));
    }

    #[test]
    fn unterminated_fragment_is_discarded_not_forwarded() {
        let mut extractor = StreamExtractor::new();
        let mut items = extractor.feed("ok [ACTION: TERMINAL | ls");
        items.extend(extractor.finish());
        assert_eq!(plain(&items), "ok ");
        assert!(candidates(&items).is_empty());
        assert_eq!(extractor.malformed_count(), 1);
    }

    #[test]
    fn held_partial_prefix_is_released_when_not_a_marker() {
        let items = run_in_chunks(&["a [AC", "DC] b"]);
        assert_eq!(plain(&items), "a [ACDC] b");
        assert!(candidates(&items).is_empty());
    }

    #[test]
    fn start_marker_inside_open_candidate_is_literal() {
        let items = run_in_chunks(&["[ACTION: TYPE | say [ACTION: hi]"]);
        let found = candidates(&items);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind_token, "TYPE");
        assert_eq!(found[0].raw_argument, "say [ACTION: hi");
    }

    #[test]
    fn two_directives_in_one_stream_both_extracted() {
        let items = run_in_chunks(&["[ACTION: OPEN | gedit] then [ACTION: TYPE | hi]"]);
        let found = candidates(&items);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].kind_token, "OPEN");
        assert_eq!(found[1].kind_token, "TYPE");
        assert_eq!(plain(&items), " then ");
    }

    #[test]
    fn unparsable_closed_tag_is_discarded() {
        let items = run_in_chunks(&["before [ACTION:] after"]);
        assert_eq!(plain(&items), "before  after");
        assert!(candidates(&items).is_empty());
    }

    #[test]
    fn directive_without_argument() {
        let items = run_in_chunks(&["[ACTION: SCREENSHOT]"]);
        let found = candidates(&items);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind_token, "SCREENSHOT");
        assert_eq!(found[0].raw_argument, "");
    }

    #[test]
    fn reset_clears_state_between_turns() {
        let mut extractor = StreamExtractor::new();
        extractor.feed("[ACTION: TERM");
        extractor.finish();
        assert_eq!(extractor.malformed_count(), 1);
        extractor.reset();
        assert_eq!(extractor.malformed_count(), 0);
        let items = extractor.feed("plain text");
        assert_eq!(plain(&items), "plain text");
    }

    #[test]
    fn candidate_offsets_track_across_chunks() {
        let mut extractor = StreamExtractor::new();
        let mut items = extractor.feed("abc");
        items.extend(extractor.feed("[ACTION: SNAP]"));
        let found = candidates(&items);
        assert_eq!(found[0].start_offset, 3);
        assert_eq!(found[0].end_offset, 17);
    }
}
