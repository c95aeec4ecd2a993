// Parallel Parser using Rayon
//
// Strategy:
// 1. Single-threaded: find row starts near evenly spaced targets. Quoted
//    newlines are skipped by tracking quote parity, which matches the
//    scanner's notion of "inside quotes" exactly.
// 2. Parallel: scan each segment with its own Scanner over the shared buffer.
//    Every segment gets its own field store; all rows reference the same bytes.
// 3. Concatenate segment results in order.

use crate::core::{Classifier, Dialect, ParseFlag, Row, Scanner};
use crate::error::Result;
use log::debug;
use rayon::prelude::*;
use std::ops::Range;
use std::sync::Arc;

/// Segments smaller than this are not worth a rayon task.
pub const MIN_SEGMENT_BYTES: usize = 64 * 1024;

/// Every position where a row may start: 0 plus the byte after each unquoted
/// newline. Blank lines show up as starts too; the scanner skips them.
pub fn find_row_starts(input: &[u8], classifier: &Classifier) -> Vec<usize> {
    let mut starts = Vec::with_capacity(input.len() / 50 + 1);
    if input.is_empty() {
        return starts;
    }
    starts.push(0);
    let mut in_quotes = false;
    for (i, &byte) in input.iter().enumerate() {
        match classifier.parse_flag(byte) {
            ParseFlag::Quote => in_quotes = !in_quotes,
            ParseFlag::Newline if !in_quotes && i + 1 < input.len() => starts.push(i + 1),
            _ => {}
        }
    }
    starts
}

/// Split `input` into at most `segments` ranges that each begin at a row start.
pub fn split_segments(input: &[u8], classifier: &Classifier, segments: usize) -> Vec<Range<usize>> {
    let len = input.len();
    let segments = segments.max(1);
    let mut bounds = vec![0];
    if segments > 1 {
        let step = len.div_ceil(segments);
        let mut target = step;
        let mut in_quotes = false;
        for (i, &byte) in input.iter().enumerate() {
            match classifier.parse_flag(byte) {
                ParseFlag::Quote => in_quotes = !in_quotes,
                ParseFlag::Newline if !in_quotes && i + 1 >= target && i + 1 < len => {
                    bounds.push(i + 1);
                    target = i + 1 + step;
                    if bounds.len() == segments {
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    bounds.push(len);
    bounds.windows(2).map(|w| w[0]..w[1]).collect()
}

/// Parse in parallel over `segments` segments.
pub fn parse_parallel(input: Arc<[u8]>, dialect: &Dialect, segments: usize) -> Result<Vec<Row>> {
    dialect.validate()?;
    Ok(parse_parallel_with(
        input,
        Arc::new(Classifier::new(dialect)),
        segments,
    ))
}

/// Parse in parallel with a segment count derived from the input size and
/// the rayon pool.
pub fn parse_parallel_auto(input: Arc<[u8]>, dialect: &Dialect) -> Result<Vec<Row>> {
    let segments = recommended_segments().min(input.len() / MIN_SEGMENT_BYTES + 1);
    parse_parallel(input, dialect, segments)
}

pub fn parse_parallel_with(
    input: Arc<[u8]>,
    classifier: Arc<Classifier>,
    segments: usize,
) -> Vec<Row> {
    let ranges = split_segments(&input, &classifier, segments);
    debug!(
        "parallel scan of {} bytes in {} segments",
        input.len(),
        ranges.len()
    );

    let parts: Vec<Vec<Row>> = ranges
        .into_par_iter()
        .map(|range| {
            let mut scanner = Scanner::new(Arc::clone(&classifier), Vec::new());
            scanner.scan_range(Arc::clone(&input), range, true);
            scanner.into_sink()
        })
        .collect();

    parts.into_iter().flatten().collect()
}

/// Number of segments to aim for: one per rayon worker.
pub fn recommended_segments() -> usize {
    rayon::current_num_threads().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::direct::parse_csv;

    fn strings(rows: &[Row]) -> Vec<Vec<String>> {
        rows.iter().map(Row::to_strings).collect()
    }

    fn parallel(input: &[u8], segments: usize) -> Vec<Row> {
        parse_parallel(Arc::from(input), &Dialect::default(), segments).unwrap()
    }

    #[test]
    fn test_parallel_simple() {
        let rows = parallel(b"a,b,c\n1,2,3\n", 2);
        assert_eq!(strings(&rows), vec![vec!["a", "b", "c"], vec!["1", "2", "3"]]);
    }

    #[test]
    fn test_parallel_quoted_newline() {
        let input = b"a,\"line1\nline2\",c\nd,e,f\n";
        let rows = parallel(input, 4);
        assert_eq!(
            strings(&rows),
            vec![vec!["a", "line1\nline2", "c"], vec!["d", "e", "f"]]
        );
    }

    #[test]
    fn test_parallel_no_trailing_newline() {
        let rows = parallel(b"a,b\nc,d", 3);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_parallel_many_rows() {
        let mut input = Vec::new();
        for i in 0..1000 {
            input.extend_from_slice(format!("{},\"{}\n{}\",{}\r\n", i, i + 1, i, i + 2).as_bytes());
        }

        let rows = parallel(&input, 8);
        assert_eq!(rows.len(), 1000);
        assert_eq!(rows[0].to_strings(), vec!["0", "1\n0", "2"]);
        assert_eq!(rows[999].to_strings(), vec!["999", "1000\n999", "1001"]);
        assert_eq!(strings(&rows), strings(&parse_csv(&input)));
    }

    #[test]
    fn test_row_starts_skip_quoted_newlines() {
        let c = Classifier::default();
        assert_eq!(find_row_starts(b"a\n\"b\nc\"\nd", &c), vec![0, 2, 8]);
        assert!(find_row_starts(b"", &c).is_empty());
    }

    #[test]
    fn test_split_segments_cover_input() {
        let c = Classifier::default();
        let input = b"aa\nbb\ncc\ndd\nee\n";
        let ranges = split_segments(input, &c, 3);
        assert!(ranges.len() <= 3);
        assert_eq!(ranges.first().unwrap().start, 0);
        assert_eq!(ranges.last().unwrap().end, input.len());
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
            assert_eq!(input[pair[1].start - 1], b'\n');
        }
        assert_eq!(split_segments(input, &c, 1), vec![0..input.len()]);
    }

    #[test]
    fn test_segments_share_buffer() {
        let input: Arc<[u8]> = Arc::from(&b"a\nb\nc\nd\n"[..]);
        let rows = parse_parallel(Arc::clone(&input), &Dialect::default(), 4).unwrap();
        assert_eq!(rows.len(), 4);
        for row in &rows {
            assert!(Arc::ptr_eq(&row.data().shared_bytes(), &input));
        }
    }
}
