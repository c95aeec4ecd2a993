// Direct parsing: one final scan over a whole in-memory buffer
//
// The simplest driver. Everything is handed to the scanner as a single final
// chunk and rows are collected into a Vec.

use crate::core::{Classifier, Dialect, Row, Scanner};
use crate::error::Result;
use std::sync::Arc;

/// Parse a byte buffer. The bytes are copied once into a shared buffer that
/// every returned row references.
pub fn parse_bytes(input: &[u8], dialect: &Dialect) -> Result<Vec<Row>> {
    parse_shared(Arc::from(input), dialect)
}

/// Parse a buffer that is already shared; rows reference it without copying.
pub fn parse_shared(input: Arc<[u8]>, dialect: &Dialect) -> Result<Vec<Row>> {
    dialect.validate()?;
    let classifier = Arc::new(Classifier::new(dialect));
    Ok(parse_shared_with(input, classifier))
}

/// Parse with a prebuilt classifier (no dialect validation).
pub fn parse_shared_with(input: Arc<[u8]>, classifier: Arc<Classifier>) -> Vec<Row> {
    let est_rows = input.len() / 50 + 4;
    let mut scanner = Scanner::new(classifier, Vec::with_capacity(est_rows));
    scanner.scan_shared(input, true);
    scanner.into_sink()
}

/// Parse a string with the given dialect.
pub fn parse_str(input: &str, dialect: &Dialect) -> Result<Vec<Row>> {
    parse_bytes(input.as_bytes(), dialect)
}

/// Parse with the default dialect (comma, double quote, CR/LF).
pub fn parse_csv(input: &[u8]) -> Vec<Row> {
    parse_shared_with(Arc::from(input), Arc::new(Classifier::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Trim;

    #[test]
    fn test_parse_csv_simple() {
        let rows = parse_csv(b"a,b,c\n1,2,3\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].to_strings(), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_parse_str_with_dialect() {
        let dialect = Dialect::default().with_delimiter(b';').with_trim(Trim::Both);
        let rows = parse_str("name ; age \n bob ; 42\n", &dialect).unwrap();
        assert_eq!(rows[0].to_strings(), vec!["name", "age"]);
        assert_eq!(rows[1].to_strings(), vec!["bob", "42"]);
    }

    #[test]
    fn test_rejects_bad_dialect() {
        let dialect = Dialect::default().with_quote(b',');
        assert!(parse_bytes(b"a,b\n", &dialect).is_err());
    }

    #[test]
    fn test_rows_share_one_store() {
        let rows = parse_csv(b"a\nb\nc\n");
        assert!(Arc::ptr_eq(rows[0].data(), rows[2].data()));
        assert_eq!(rows[2].data().field_count(), 3);
    }
}
