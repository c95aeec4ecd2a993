// Row handle: a span of field descriptors in a shared RawCsvData

use super::field::{RawCsvData, RawField};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// A completed row. Cloning is cheap; field text is sliced out of the
/// shared buffer on demand.
#[derive(Clone)]
pub struct Row {
    data: Arc<RawCsvData>,
    /// Index of the first field in the store
    start: usize,
    len: usize,
}

impl Row {
    pub(crate) fn new(data: Arc<RawCsvData>, start: usize, len: usize) -> Self {
        Row { data, start, len }
    }

    /// Number of fields.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The store this row's descriptors live in.
    pub fn data(&self) -> &Arc<RawCsvData> {
        &self.data
    }

    /// Range of this row's descriptors inside the store.
    pub fn field_range(&self) -> std::ops::Range<usize> {
        self.start..self.start + self.len
    }

    pub fn descriptor(&self, index: usize) -> Option<RawField> {
        if index >= self.len {
            return None;
        }
        self.data.field(self.start + index)
    }

    /// Field text, with doubled quotes collapsed.
    pub fn get(&self, index: usize) -> Option<Cow<'_, [u8]>> {
        self.descriptor(index).map(|f| self.data.materialize(f))
    }

    /// Field text as a string, replacing invalid UTF-8.
    pub fn get_str(&self, index: usize) -> Option<String> {
        self.get(index)
            .map(|f| String::from_utf8_lossy(&f).into_owned())
    }

    /// Field bytes exactly as they appear in the buffer.
    pub fn raw(&self, index: usize) -> Option<&[u8]> {
        self.descriptor(index).map(|f| self.data.raw_slice(f))
    }

    pub fn iter(&self) -> Fields<'_> {
        Fields { row: self, index: 0 }
    }

    /// Owned copies of every field.
    pub fn to_vec(&self) -> Vec<Vec<u8>> {
        self.iter().map(Cow::into_owned).collect()
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.iter()
            .map(|f| String::from_utf8_lossy(&f).into_owned())
            .collect()
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.to_strings()).finish()
    }
}

/// Iterator over the materialized fields of a [`Row`].
pub struct Fields<'a> {
    row: &'a Row,
    index: usize,
}

impl<'a> Iterator for Fields<'a> {
    type Item = Cow<'a, [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        let field = self.row.get(self.index)?;
        self.index += 1;
        Some(field)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.row.len - self.index.min(self.row.len);
        (rest, Some(rest))
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = Cow<'a, [u8]>;
    type IntoIter = Fields<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
