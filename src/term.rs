// Term building utilities for converting rows to Elixir terms

use crate::core::Row;
use rustler::{Env, NewBinary, Term};

/// Convert rows to an Elixir list of lists of binaries
pub fn rows_to_term<'a>(env: Env<'a>, rows: &[Row]) -> Term<'a> {
    // Build list in reverse (efficient for cons lists)
    let mut list = Term::list_new_empty(env);

    for row in rows.iter().rev() {
        list = list.list_prepend(row_to_term(env, row));
    }

    list
}

/// Convert a single row's materialized fields to an Elixir list of binaries
pub fn row_to_term<'a>(env: Env<'a>, row: &Row) -> Term<'a> {
    let fields: Vec<_> = row.iter().collect();
    let mut list = Term::list_new_empty(env);

    for field in fields.iter().rev() {
        list = list.list_prepend(bytes_to_term(env, field));
    }

    list
}

fn bytes_to_term<'a>(env: Env<'a>, bytes: &[u8]) -> Term<'a> {
    let mut binary = NewBinary::new(env, bytes.len());
    binary.as_mut_slice().copy_from_slice(bytes);
    binary.into()
}
