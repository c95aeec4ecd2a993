// Streaming Parser
//
// Stateful chunked parser for processing large inputs with bounded memory.
// Feed chunks of data and take complete rows as they become available.
//
// Key design:
// - Wraps a Scanner whose sink is a RowChannel, so completed rows can be
//   taken in batches (or from another thread) while feeding continues
// - Only the bytes of the still-open row are carried between feeds
// - The carried row is bounded by max_buffer_size

use crate::core::{Classifier, Dialect, FieldState, ParseFlag, Row, RowChannel, Scanner};
use crate::error::{Error, Result};
use log::warn;
use std::sync::Arc;

/// Default maximum size of a carried partial row (256 MB).
pub const DEFAULT_MAX_BUFFER: usize = 256 * 1024 * 1024;

/// State for streaming CSV parser
pub struct StreamingParser {
    scanner: Scanner<Arc<RowChannel>>,
    rows: Arc<RowChannel>,
    /// Maximum carried bytes
    max_buffer_size: usize,
}

impl StreamingParser {
    /// Create a new streaming parser with the default dialect
    pub fn new() -> Self {
        Self::with_classifier(Arc::new(Classifier::default()))
    }

    /// Create a new streaming parser for `dialect`
    pub fn with_dialect(dialect: &Dialect) -> Result<Self> {
        dialect.validate()?;
        Ok(Self::with_classifier(Arc::new(Classifier::new(dialect))))
    }

    pub fn with_classifier(classifier: Arc<Classifier>) -> Self {
        let rows = Arc::new(RowChannel::new());
        StreamingParser {
            scanner: Scanner::new(classifier, Arc::clone(&rows)),
            rows,
            max_buffer_size: DEFAULT_MAX_BUFFER,
        }
    }

    /// Feed a chunk of data to the parser.
    /// Returns `Err(BufferOverflow)` if the partial row left open after this
    /// chunk would exceed `max_buffer_size`; the chunk is not consumed in that
    /// case.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        let pending = self.scanner.pending_len();
        if pending + chunk.len() > self.max_buffer_size {
            let open = self.open_row_after(chunk);
            if open > self.max_buffer_size {
                warn!(
                    "streaming feed rejected: open row would reach {} bytes, limit {}",
                    open, self.max_buffer_size
                );
                return Err(Error::BufferOverflow {
                    limit: self.max_buffer_size,
                });
            }
        }
        self.scanner.scan(chunk, false);
        Ok(())
    }

    /// Set the maximum carried partial-row size in bytes.
    pub fn set_max_buffer_size(&mut self, max: usize) {
        self.max_buffer_size = max;
    }

    /// Take up to `max` complete rows from the parser
    pub fn take_rows(&mut self, max: usize) -> Vec<Row> {
        self.rows.drain_up_to(max)
    }

    /// Check how many complete rows are available
    pub fn available_rows(&self) -> usize {
        self.rows.len()
    }

    /// Check if there's a partial row waiting for more data
    pub fn has_partial(&self) -> bool {
        !self.scanner.state().is_idle()
    }

    /// Size of the carried partial row (for memory monitoring)
    pub fn buffer_size(&self) -> usize {
        self.scanner.pending_len()
    }

    /// Handle to the row queue, for consumers on other threads.
    pub fn rows(&self) -> Arc<RowChannel> {
        Arc::clone(&self.rows)
    }

    /// Finalize parsing - complete any partial row and take every remaining row
    pub fn finalize(&mut self) -> Vec<Row> {
        self.scanner.finish();
        self.rows.drain()
    }

    /// Reset the parser state; the dialect is preserved
    pub fn reset(&mut self) {
        let classifier = Arc::clone(self.scanner.classifier());
        self.rows.clear();
        self.scanner = Scanner::new(classifier, Arc::clone(&self.rows));
    }
}

impl StreamingParser {
    /// Length of the row still open once `chunk` has been scanned. Quote
    /// parity continues from the scanner's state, so a newline inside an open
    /// quoted field does not count as closing the row.
    fn open_row_after(&self, chunk: &[u8]) -> usize {
        let classifier = self.scanner.classifier();
        let mut in_quotes = self.scanner.state().field_state() == FieldState::Quoted;
        let mut last_row_end = None;
        for (i, &byte) in chunk.iter().enumerate() {
            match classifier.parse_flag(byte) {
                ParseFlag::Quote => in_quotes = !in_quotes,
                ParseFlag::Newline if !in_quotes => last_row_end = Some(i + 1),
                _ => {}
            }
        }
        match last_row_end {
            Some(end) => chunk.len() - end,
            None => self.scanner.pending_len() + chunk.len(),
        }
    }
}

impl Default for StreamingParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(rows: Vec<Row>) -> Vec<Vec<String>> {
        rows.iter().map(Row::to_strings).collect()
    }

    #[test]
    fn test_streaming_chunked() {
        let mut parser = StreamingParser::new();
        parser.feed(b"a,b,").unwrap();
        assert_eq!(parser.available_rows(), 0);
        assert!(parser.has_partial());

        parser.feed(b"c\n1,2,3\n").unwrap();
        assert_eq!(parser.available_rows(), 2);
        assert!(!parser.has_partial());

        let rows = parser.take_rows(10);
        assert_eq!(rows[0].to_strings(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_streaming_quoted_across_chunks() {
        let mut parser = StreamingParser::new();
        parser.feed(b"a,\"hello ").unwrap();
        assert_eq!(parser.available_rows(), 0);

        parser.feed(b"world\",c\n").unwrap();
        assert_eq!(parser.available_rows(), 1);

        let rows = parser.take_rows(10);
        assert_eq!(rows[0].to_strings(), vec!["a", "hello world", "c"]);
    }

    #[test]
    fn test_streaming_finalize() {
        let mut parser = StreamingParser::new();
        parser.feed(b"a,b,c\n1,2,3").unwrap();

        let rows1 = parser.take_rows(10);
        assert_eq!(rows1.len(), 1);

        let rows2 = parser.finalize();
        assert_eq!(strings(rows2), vec![vec!["1", "2", "3"]]);
    }

    #[test]
    fn test_take_rows_partial() {
        let mut parser = StreamingParser::new();
        parser.feed(b"a\nb\nc\nd\n").unwrap();

        let rows1 = parser.take_rows(2);
        assert_eq!(strings(rows1), vec![vec!["a"], vec!["b"]]);

        let rows2 = parser.take_rows(10);
        assert_eq!(rows2.len(), 2);
    }

    #[test]
    fn test_streaming_crlf_at_chunk_boundary() {
        let mut parser = StreamingParser::new();
        parser.feed(b"a,b\r").unwrap();
        assert_eq!(parser.available_rows(), 1);

        parser.feed(b"\nc,d\n").unwrap();
        let rows = parser.take_rows(10);
        assert_eq!(strings(rows), vec![vec!["a", "b"], vec!["c", "d"]]);
    }

    #[test]
    fn test_buffer_size_tracks_partial_row_only() {
        let mut parser = StreamingParser::new();
        parser.feed(b"done,row\npart").unwrap();
        assert_eq!(parser.buffer_size(), 4);
        parser.feed(b"ial\n").unwrap();
        assert_eq!(parser.buffer_size(), 0);
    }

    #[test]
    fn test_buffer_overflow() {
        let mut parser = StreamingParser::new();
        parser.set_max_buffer_size(8);
        parser.feed(b"abcdef").unwrap();
        let err = parser.feed(b"ghijk").unwrap_err();
        assert!(matches!(err, Error::BufferOverflow { limit: 8 }));
        // A chunk that can close the row is still accepted
        parser.feed(b"gh\nij").unwrap();
        assert_eq!(strings(parser.finalize()), vec![vec!["abcdefgh"], vec!["ij"]]);
    }

    #[test]
    fn test_buffer_limit_holds_inside_quotes() {
        let mut parser = StreamingParser::new();
        parser.set_max_buffer_size(8);
        parser.feed(b"\"").unwrap();
        parser.feed(b"aaaa\n").unwrap();
        // The newline is quoted content, so the row stays open
        let err = parser.feed(b"aaaa\n").unwrap_err();
        assert!(matches!(err, Error::BufferOverflow { limit: 8 }));
        assert_eq!(parser.buffer_size(), 6);
        assert!(parser.has_partial());

        parser.feed(b"\"\n").unwrap();
        assert_eq!(parser.buffer_size(), 0);
        assert_eq!(strings(parser.take_rows(10)), vec![vec!["aaaa\n"]]);
    }

    #[test]
    fn test_buffer_limit_counts_tail_after_last_row() {
        let mut parser = StreamingParser::new();
        parser.set_max_buffer_size(4);
        parser.feed(b"ab").unwrap();
        // Closes the open row but leaves a tail longer than the limit
        assert!(parser.feed(b"\nlongtail").is_err());
        parser.feed(b"\nok").unwrap();
        assert_eq!(parser.buffer_size(), 2);
    }

    #[test]
    fn test_escaped_quote_keeps_row_open_for_limit() {
        let mut parser = StreamingParser::new();
        parser.set_max_buffer_size(6);
        parser.feed(b"\"x").unwrap();
        // `""` is an escaped pair: still quoted, the newline is content
        assert!(parser.feed(b"\"\"\nyyy").is_err());
        parser.feed(b"\"\n").unwrap();
        assert_eq!(strings(parser.finalize()), vec![vec!["x"]]);
    }

    #[test]
    fn test_reset() {
        let mut parser = StreamingParser::with_dialect(&Dialect::default().with_delimiter(b'|'))
            .unwrap();
        parser.feed(b"x|y\nunfinished").unwrap();
        parser.reset();
        assert_eq!(parser.available_rows(), 0);
        assert!(!parser.has_partial());
        parser.feed(b"p|q\n").unwrap();
        assert_eq!(strings(parser.take_rows(10)), vec![vec!["p", "q"]]);
    }
}
