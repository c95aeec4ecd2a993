// Resumable table-driven CSV scanner
//
// Bytes are classified through the Classifier tables and split into fields
// and rows. Rows completed during a call go to a RowSink before the call
// returns. Everything needed to continue after a chunk boundary lives in
// ParserState, including the bytes of the row that is still open, so chunks
// may be cut anywhere: between a CR and LF, inside quotes, between the two
// quotes of an escaped pair.
//
// Address space: each call appends the new chunk to the carried open-row
// bytes. When rows complete, the prefix holding them is cut off as one shared
// segment and the rest stays carried. Offsets inside the open row are kept
// relative to the row start, so they survive the cut.

use super::channel::RowChannel;
use super::classify::{Classifier, ParseFlag};
use super::field::{RawCsvData, RawField};
use super::row::Row;
use log::{trace, warn};
use std::ops::Range;
use std::sync::Arc;

/// Destination for completed rows.
pub trait RowSink {
    fn push_row(&mut self, row: Row);
}

impl RowSink for Vec<Row> {
    #[inline]
    fn push_row(&mut self, row: Row) {
        self.push(row);
    }
}

impl RowSink for &RowChannel<Row> {
    #[inline]
    fn push_row(&mut self, row: Row) {
        self.push(row);
    }
}

impl RowSink for Arc<RowChannel<Row>> {
    #[inline]
    fn push_row(&mut self, row: Row) {
        self.push(row);
    }
}

/// Where the scanner is inside the current field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldState {
    /// Between fields; leading whitespace is being skipped
    #[default]
    FieldStart,
    /// Inside an unquoted stretch of a field
    Unquoted,
    /// Inside quotes; delimiters and newlines are content
    Quoted,
    /// Just saw a quote while quoted: either half of an escaped pair or the
    /// closing quote, decided by the next byte
    QuoteInQuoted,
}

/// Scanner state that survives between `scan` calls.
///
/// Offsets are relative to the start of the open row, whose bytes are kept in
/// `carry`.
#[derive(Debug, Clone, Default)]
pub struct ParserState {
    field: FieldState,
    field_start: Option<usize>,
    /// Field began with a quote, so its closing quote is not content
    opened_quoted: bool,
    /// Most recent quote seen while quoted
    last_quote: Option<usize>,
    /// Quote that ended the quoted region
    closing_quote: Option<usize>,
    has_quote: bool,
    row_fields: Vec<RawField>,
    carry: Vec<u8>,
}

impl ParserState {
    pub fn field_state(&self) -> FieldState {
        self.field
    }

    /// Start of the open field relative to the open row, if one started.
    pub fn field_start(&self) -> Option<usize> {
        self.field_start
    }

    /// True while inside a quoted region (delimiters are content).
    pub fn in_quotes(&self) -> bool {
        matches!(self.field, FieldState::Quoted | FieldState::QuoteInQuoted)
    }

    /// Fields of the open row finished so far.
    pub fn open_fields(&self) -> usize {
        self.row_fields.len()
    }

    /// Bytes of the open row carried into the next call.
    pub fn carried(&self) -> &[u8] {
        &self.carry
    }

    /// True when no row has been started.
    pub fn is_idle(&self) -> bool {
        self.row_fields.is_empty() && self.field_start.is_none()
    }

    fn reset_field(&mut self) {
        self.field = FieldState::FieldStart;
        self.field_start = None;
        self.opened_quoted = false;
        self.last_quote = None;
        self.closing_quote = None;
        self.has_quote = false;
    }
}

/// Rows completed during one call, held until their segment is cut.
/// Field offsets are absolute in the buffer being scanned.
#[derive(Debug, Default)]
struct Completed {
    fields: Vec<RawField>,
    /// (first field, field count) per row
    rows: Vec<(usize, usize)>,
}

/// The scanning engine. Not reentrant; feed it one chunk at a time.
pub struct Scanner<S: RowSink> {
    classifier: Arc<Classifier>,
    sink: S,
    state: ParserState,
    completed: Completed,
    /// Absolute start of the open row in the buffer being scanned
    row_start: usize,
    rows_emitted: usize,
}

impl<S: RowSink> Scanner<S> {
    pub fn new(classifier: Arc<Classifier>, sink: S) -> Self {
        Self::with_state(classifier, sink, ParserState::default())
    }

    /// Continue a session from a previously saved state.
    pub fn with_state(classifier: Arc<Classifier>, sink: S, state: ParserState) -> Self {
        Scanner {
            classifier,
            sink,
            state,
            completed: Completed::default(),
            row_start: 0,
            rows_emitted: 0,
        }
    }

    /// Scan the next chunk. Returns the number of bytes advanced over, which
    /// is always the whole chunk: an unfinished row is carried, not re-fed.
    /// With `is_final_chunk` an open row is completed as if a newline followed.
    ///
    /// The chunk is appended to the carried open row. A new segment is cut
    /// from the front of that buffer only when rows complete, so a row that
    /// spans many chunks is copied once.
    pub fn scan(&mut self, chunk: &[u8], is_final_chunk: bool) -> usize {
        let before = self.rows_emitted;
        let mut buf = std::mem::take(&mut self.state.carry);
        let resume = buf.len();
        buf.extend_from_slice(chunk);
        let end = buf.len();

        self.row_start = 0;
        self.run(&buf, resume, end);
        let consumed = if is_final_chunk {
            self.finish_input(&buf, end);
            end
        } else {
            self.row_start
        };

        if !self.completed.rows.is_empty() {
            self.publish(Arc::from(&buf[..consumed]));
        }
        buf.drain(..consumed);
        self.state.carry = buf;
        self.row_start = 0;

        self.trace_chunk(chunk.len(), before, is_final_chunk);
        chunk.len()
    }

    /// Scan a shared buffer. When no row is carried the rows reference
    /// `buffer` directly, without copying.
    pub fn scan_shared(&mut self, buffer: Arc<[u8]>, is_final_chunk: bool) -> usize {
        let len = buffer.len();
        self.scan_range(buffer, 0..len, is_final_chunk)
    }

    /// Scan `range` of a shared buffer.
    pub fn scan_range(
        &mut self,
        buffer: Arc<[u8]>,
        range: Range<usize>,
        is_final_chunk: bool,
    ) -> usize {
        if !self.state.carry.is_empty() {
            return self.scan(&buffer[range], is_final_chunk);
        }

        let before = self.rows_emitted;
        self.row_start = range.start;
        self.run(&buffer, range.start, range.end);
        if is_final_chunk {
            self.finish_input(&buffer, range.end);
        } else {
            self.state.carry = buffer[self.row_start..range.end].to_vec();
        }
        self.row_start = 0;

        if !self.completed.rows.is_empty() {
            self.publish(buffer);
        }
        self.trace_chunk(range.len(), before, is_final_chunk);
        range.len()
    }

    /// Complete the open row, if any, with no further input.
    pub fn finish(&mut self) {
        self.scan(&[], true);
    }

    /// Move the rows completed in this call into one field store over
    /// `bytes` and hand them to the sink.
    fn publish(&mut self, bytes: Arc<[u8]>) {
        let data = Arc::new(RawCsvData::new(bytes, self.classifier.quote()));
        let base = data.append_row(0, &self.completed.fields);
        for &(first, len) in &self.completed.rows {
            self.sink.push_row(Row::new(Arc::clone(&data), base + first, len));
        }
        self.rows_emitted += self.completed.rows.len();
        self.completed.fields.clear();
        self.completed.rows.clear();
    }

    fn trace_chunk(&self, len: usize, rows_before: usize, is_final: bool) {
        trace!(
            "scanned {} bytes: {} rows, {} bytes carried{}",
            len,
            self.rows_emitted - rows_before,
            self.state.carry.len(),
            if is_final { " (final)" } else { "" }
        );
    }

    fn run(&mut self, bytes: &[u8], from: usize, to: usize) {
        let classifier = Arc::clone(&self.classifier);
        let c = &*classifier;
        let mut i = from;

        while i < to {
            match self.state.field {
                FieldState::FieldStart => {
                    if c.trim_leading() {
                        let ws_start = i;
                        while i < to && c.is_whitespace(bytes[i]) {
                            i += 1;
                        }
                        if i > ws_start {
                            // Trimmed whitespace still starts a (possibly empty) field
                            self.state.field_start = Some(i - self.row_start);
                        }
                        if i == to {
                            break;
                        }
                    }
                    match c.parse_flag(bytes[i]) {
                        ParseFlag::NotSpecial => {
                            self.state.field_start = Some(i - self.row_start);
                            self.state.field = FieldState::Unquoted;
                        }
                        ParseFlag::Quote => {
                            self.state.field_start = Some(i + 1 - self.row_start);
                            self.state.opened_quoted = true;
                            self.state.has_quote = true;
                            self.state.field = FieldState::Quoted;
                            i += 1;
                        }
                        ParseFlag::Delimiter => {
                            self.push_field(bytes, i);
                            i += 1;
                        }
                        ParseFlag::Newline => {
                            // A newline with nothing before it is a blank line
                            // or the second half of a CRLF: no row.
                            if !self.state.is_idle() {
                                self.push_field(bytes, i);
                                self.push_row();
                            }
                            i += 1;
                            self.row_start = i;
                        }
                    }
                }
                FieldState::Unquoted => {
                    while i < to && c.parse_flag(bytes[i]) == ParseFlag::NotSpecial {
                        i += 1;
                    }
                    if i == to {
                        break;
                    }
                    match c.parse_flag(bytes[i]) {
                        ParseFlag::Delimiter => {
                            self.push_field(bytes, i);
                        }
                        ParseFlag::Newline => {
                            self.push_field(bytes, i);
                            self.push_row();
                            self.row_start = i + 1;
                        }
                        ParseFlag::Quote => {
                            self.state.has_quote = true;
                            self.state.field = FieldState::Quoted;
                        }
                        ParseFlag::NotSpecial => unreachable!(),
                    }
                    i += 1;
                }
                FieldState::Quoted => {
                    while i < to && c.parse_flag(bytes[i]) != ParseFlag::Quote {
                        i += 1;
                    }
                    if i == to {
                        break;
                    }
                    self.state.last_quote = Some(i - self.row_start);
                    self.state.field = FieldState::QuoteInQuoted;
                    i += 1;
                }
                FieldState::QuoteInQuoted => match c.parse_flag(bytes[i]) {
                    ParseFlag::Quote => {
                        // Escaped pair, still quoted
                        self.state.field = FieldState::Quoted;
                        i += 1;
                    }
                    ParseFlag::Delimiter => {
                        self.state.closing_quote = self.state.last_quote;
                        self.push_field(bytes, i);
                        i += 1;
                    }
                    ParseFlag::Newline => {
                        self.state.closing_quote = self.state.last_quote;
                        self.push_field(bytes, i);
                        self.push_row();
                        i += 1;
                        self.row_start = i;
                    }
                    ParseFlag::NotSpecial => {
                        // Text after a closing quote stays part of the field
                        self.state.closing_quote = self.state.last_quote;
                        self.state.field = FieldState::Unquoted;
                    }
                },
            }
        }
    }

    /// Finalize the open field, ending at absolute position `end`.
    fn push_field(&mut self, bytes: &[u8], end: usize) {
        let c = &*self.classifier;
        let row_start = self.row_start;
        let mut end = end - row_start;
        let start = self.state.field_start.unwrap_or(end);

        // Content of an unterminated quote is kept verbatim
        if c.trim_trailing() && self.state.field != FieldState::Quoted {
            while end > start && c.is_whitespace(bytes[row_start + end - 1]) {
                end -= 1;
            }
        }
        if self.state.opened_quoted {
            if let Some(q) = self.state.closing_quote {
                if q + 1 == end && end > start {
                    end -= 1;
                }
            }
        }

        self.state.row_fields.push(RawField {
            start,
            length: end.saturating_sub(start),
            has_escaped_quote: self.state.has_quote,
        });
        self.state.reset_field();
    }

    /// Close the open row and start a new one.
    fn push_row(&mut self) {
        let row_start = self.row_start;
        let first = self.completed.fields.len();
        self.completed
            .fields
            .extend(self.state.row_fields.drain(..).map(|f| RawField {
                start: row_start + f.start,
                ..f
            }));
        let len = self.completed.fields.len() - first;
        self.completed.rows.push((first, len));
    }

    fn finish_input(&mut self, bytes: &[u8], end: usize) {
        if !self.state.is_idle() {
            match self.state.field {
                FieldState::Quoted => {
                    warn!("input ended inside a quoted field; closing it at end of input");
                }
                FieldState::QuoteInQuoted => {
                    self.state.closing_quote = self.state.last_quote;
                }
                _ => {}
            }
            self.push_field(bytes, end);
            self.push_row();
        }
        self.state = ParserState::default();
    }

    pub fn state(&self) -> &ParserState {
        &self.state
    }

    /// Bytes of the open row held until the next call.
    pub fn pending_len(&self) -> usize {
        self.state.carry.len()
    }

    pub fn rows_emitted(&self) -> usize {
        self.rows_emitted
    }

    pub fn classifier(&self) -> &Arc<Classifier> {
        &self.classifier
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Split into the sink and the state needed to resume later.
    pub fn into_parts(self) -> (S, ParserState) {
        (self.sink, self.state)
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
