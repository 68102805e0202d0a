//! Identifier safety for operator-supplied names.
//!
//! Schema, table, and column names arrive from CLI flags and cannot be
//! bound as query parameters, so they are validated against a conservative
//! grammar and double-quoted before interpolation. Anything outside
//! `[A-Za-z_][A-Za-z0-9_]*` is rejected rather than escaped.

use tally_core::{Error, Result};

/// Maximum identifier length accepted (Postgres truncates at 63 bytes).
const MAX_IDENT_LEN: usize = 63;

/// Validates and quotes a single SQL identifier.
///
/// # Errors
///
/// Returns [`Error::InvalidIdentifier`] for empty names, names longer
/// than Postgres accepts, or names containing anything beyond ASCII
/// alphanumerics and underscores.
pub fn quote_ident(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(Error::InvalidIdentifier("empty identifier".to_string()));
    }
    if name.len() > MAX_IDENT_LEN {
        return Err(Error::InvalidIdentifier(format!(
            "identifier too long ({} bytes): {name}",
            name.len()
        )));
    }
    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !first_ok || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}

/// Validates and quotes a `schema.table` pair.
///
/// # Errors
///
/// Returns [`Error::InvalidIdentifier`] if either part fails validation.
pub fn quote_qualified(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_ident(schema)?, quote_ident(table)?))
}
