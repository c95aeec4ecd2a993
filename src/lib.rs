// csvscan - table-driven CSV scanning with resumable chunked input
//
// Core:
//   Classifier tables -> Scanner (resumable state machine) -> RowSink
//   Rows are zero-copy views into a shared buffer + field store.
//   RowChannel hands rows from a producer to blocking consumers.
//
// Drivers:
//   direct    - one final scan over an in-memory buffer
//   streaming - feed chunks, take rows in batches
//   parallel  - row-aligned segments scanned on the rayon pool
//   reader    - producer thread over any `Read` source
//
// The NIFs below expose the drivers to Elixir.

use rustler::{Binary, Env, NifResult, Term};
use std::sync::Arc;

pub mod core;
pub mod error;
mod resource;
pub mod strategy;
mod term;

pub use crate::core::{
    Classifier, Dialect, ParseFlag, ParserState, RawCsvData, RawField, Row, RowChannel, RowSink,
    Scanner, Trim,
};
pub use crate::strategy::{
    parse_bytes, parse_csv, parse_parallel, parse_shared, parse_str, Reader, StreamingParser,
};

use resource::{StreamingParserRef, StreamingParserResource};
use term::rows_to_term;

// ============================================================================
// Allocator Configuration
// ============================================================================

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod atoms {
    rustler::atoms! {
        nil,
        buffer_overflow,
        invalid_dialect,
        io_error,
    }
}

// ============================================================================
// Dialect decoding
// ============================================================================

/// Decode a single structural byte.
/// Accepts: integer 44 or binary <<44>>
fn decode_byte(term: Term<'_>) -> NifResult<u8> {
    if let Ok(byte) = term.decode::<u8>() {
        return Ok(byte);
    }
    if let Ok(binary) = term.decode::<Binary<'_>>() {
        if let [byte] = binary.as_slice() {
            return Ok(*byte);
        }
    }
    Err(rustler::Error::BadArg)
}

/// Decode the quote byte; `nil` disables quoting.
fn decode_quote(term: Term<'_>) -> NifResult<Option<u8>> {
    if term.decode::<rustler::Atom>().ok() == Some(atoms::nil()) {
        return Ok(None);
    }
    decode_byte(term).map(Some)
}

/// Decode trim mode atom: :none | :leading | :trailing | :both
fn decode_trim(term: Term<'_>) -> NifResult<Trim> {
    let name = term.atom_to_string().map_err(|_| rustler::Error::BadArg)?;
    match name.as_str() {
        "none" => Ok(Trim::None),
        "leading" => Ok(Trim::Leading),
        "trailing" => Ok(Trim::Trailing),
        "both" => Ok(Trim::Both),
        _ => Err(rustler::Error::BadArg),
    }
}

fn decode_dialect(sep: Term<'_>, quote: Term<'_>, trim: Term<'_>) -> NifResult<Dialect> {
    let dialect = Dialect::default()
        .with_delimiter(decode_byte(sep)?)
        .with_trim(decode_trim(trim)?);
    let dialect = match decode_quote(quote)? {
        Some(q) => dialect.with_quote(q),
        None => dialect.without_quote(),
    };
    dialect.validate().map_err(|_| rustler::Error::BadArg)?;
    Ok(dialect)
}

fn to_nif_error(err: error::Error) -> rustler::Error {
    let reason = match err {
        error::Error::Dialect(_) => atoms::invalid_dialect(),
        error::Error::Io(_) => atoms::io_error(),
        error::Error::BufferOverflow { .. } => atoms::buffer_overflow(),
    };
    rustler::Error::Term(Box::new(reason))
}

// ============================================================================
// Single-shot parsing
// ============================================================================

/// Parse a whole binary into a list of rows
#[rustler::nif]
fn parse_string<'a>(
    env: Env<'a>,
    input: Binary<'a>,
    sep: Term<'a>,
    quote: Term<'a>,
    trim: Term<'a>,
) -> NifResult<Term<'a>> {
    let dialect = decode_dialect(sep, quote, trim)?;
    let rows = parse_bytes(input.as_slice(), &dialect).map_err(to_nif_error)?;
    Ok(rows_to_term(env, &rows))
}

/// Parse in parallel using the rayon pool.
/// Uses DirtyCpu scheduler since this can take significant time
#[rustler::nif(schedule = "DirtyCpu")]
fn parse_string_parallel<'a>(
    env: Env<'a>,
    input: Binary<'a>,
    sep: Term<'a>,
    quote: Term<'a>,
    trim: Term<'a>,
) -> NifResult<Term<'a>> {
    let dialect = decode_dialect(sep, quote, trim)?;
    let rows = strategy::parse_parallel_auto(Arc::from(input.as_slice()), &dialect)
        .map_err(to_nif_error)?;
    Ok(rows_to_term(env, &rows))
}

// ============================================================================
// Streaming
// ============================================================================

/// Create a new streaming parser
#[rustler::nif]
fn streaming_new<'a>(
    sep: Term<'a>,
    quote: Term<'a>,
    trim: Term<'a>,
) -> NifResult<StreamingParserRef> {
    let dialect = decode_dialect(sep, quote, trim)?;
    let parser = StreamingParser::with_dialect(&dialect).map_err(to_nif_error)?;
    Ok(rustler::ResourceArc::new(StreamingParserResource::new(parser)))
}

/// Feed a chunk of data to the streaming parser.
/// Returns (available_rows, buffer_size).
#[rustler::nif]
fn streaming_feed(parser: StreamingParserRef, chunk: Binary) -> NifResult<(usize, usize)> {
    let mut inner = parser.inner.lock();
    inner.feed(chunk.as_slice()).map_err(to_nif_error)?;
    Ok((inner.available_rows(), inner.buffer_size()))
}

/// Take up to `max` rows from the streaming parser
#[rustler::nif]
fn streaming_next_rows<'a>(env: Env<'a>, parser: StreamingParserRef, max: usize) -> Term<'a> {
    let rows = parser.inner.lock().take_rows(max);
    rows_to_term(env, &rows)
}

/// Finalize the streaming parser (complete the partial row, take the rest)
#[rustler::nif]
fn streaming_finalize<'a>(env: Env<'a>, parser: StreamingParserRef) -> Term<'a> {
    let rows = parser.inner.lock().finalize();
    rows_to_term(env, &rows)
}

/// Get streaming parser status (available_rows, buffer_size, has_partial)
#[rustler::nif]
fn streaming_status(parser: StreamingParserRef) -> (usize, usize, bool) {
    let inner = parser.inner.lock();
    (
        inner.available_rows(),
        inner.buffer_size(),
        inner.has_partial(),
    )
}

// ============================================================================
// NIF Initialization
// ============================================================================

rustler::init!("Elixir.CsvScan.Native");
