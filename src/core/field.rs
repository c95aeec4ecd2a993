// Field descriptors, the shared field store, and quote unescaping

use parking_lot::RwLock;
use std::borrow::Cow;
use std::sync::Arc;

/// Location of one field inside the buffer owned by its [`RawCsvData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawField {
    pub start: usize,
    pub length: usize,
    /// Field text may contain doubled quotes that need collapsing
    pub has_escaped_quote: bool,
}

impl RawField {
    #[inline]
    pub fn end(&self) -> usize {
        self.start + self.length
    }
}

/// One buffer segment plus the append-only store of every field found in it.
///
/// Rows hold an `Arc` to this, so the bytes and descriptors live as long as
/// the last row that references them. Fields are only ever appended, whole
/// rows at a time, and never rewritten.
#[derive(Debug)]
pub struct RawCsvData {
    bytes: Arc<[u8]>,
    fields: RwLock<Vec<RawField>>,
    quote: Option<u8>,
}

impl RawCsvData {
    pub fn new(bytes: Arc<[u8]>, quote: Option<u8>) -> Self {
        RawCsvData {
            bytes,
            fields: RwLock::new(Vec::new()),
            quote,
        }
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The shared buffer handle (cheap clone).
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    #[inline]
    pub fn quote(&self) -> Option<u8> {
        self.quote
    }

    /// Append the fields of one or more completed rows, returning the index
    /// of the first one. Offsets in `row_fields` are relative to `row_start`.
    pub fn append_row(&self, row_start: usize, row_fields: &[RawField]) -> usize {
        let mut fields = self.fields.write();
        let first = fields.len();
        fields.extend(row_fields.iter().map(|f| RawField {
            start: row_start + f.start,
            ..*f
        }));
        first
    }

    #[inline]
    pub fn field(&self, index: usize) -> Option<RawField> {
        self.fields.read().get(index).copied()
    }

    /// Number of descriptors stored so far.
    pub fn field_count(&self) -> usize {
        self.fields.read().len()
    }

    /// Slice of the buffer a descriptor covers, without unescaping.
    #[inline]
    pub fn raw_slice(&self, field: RawField) -> &[u8] {
        &self.bytes[field.start..field.end()]
    }

    /// Field text with doubled quotes collapsed when the descriptor asks for it.
    pub fn materialize(&self, field: RawField) -> Cow<'_, [u8]> {
        let raw = self.raw_slice(field);
        match self.quote {
            Some(q) if field.has_escaped_quote => unescape_quotes(raw, q),
            _ => Cow::Borrowed(raw),
        }
    }
}

/// Collapse every doubled `quote` into a single one.
/// Returns `Cow::Borrowed` when there is nothing to collapse.
pub fn unescape_quotes(field: &[u8], quote: u8) -> Cow<'_, [u8]> {
    let first = match field.windows(2).position(|w| w[0] == quote && w[1] == quote) {
        Some(pos) => pos,
        None => return Cow::Borrowed(field),
    };

    let mut result = Vec::with_capacity(field.len());
    result.extend_from_slice(&field[..first]);
    let mut i = first;
    while i < field.len() {
        if field[i] == quote && i + 1 < field.len() && field[i + 1] == quote {
            result.push(quote);
            i += 2;
        } else {
            result.push(field[i]);
            i += 1;
        }
    }
    Cow::Owned(result)
}
