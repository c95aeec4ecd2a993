// Core primitives for CSV scanning

pub mod channel;
pub mod classify;
pub mod field;
pub mod row;
pub mod scanner;

pub use channel::RowChannel;
pub use classify::{Classifier, Dialect, ParseFlag, ParseFlagMap, Trim, WhitespaceMap};
pub use field::{unescape_quotes, RawCsvData, RawField};
pub use row::{Fields, Row};
pub use scanner::{FieldState, ParserState, RowSink, Scanner};
