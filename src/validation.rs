//! Identifier validation for dynamically created tables and columns.
//!
//! Frame types become table names and frame keys become column names, so both come
//! straight off the radio. Every identifier is double-quoted when it reaches SQL,
//! which makes almost any text legal; the checks here only reject names SQLite
//! can never accept.

/// Prefix SQLite keeps for its internal tables, matched case-insensitively.
const RESERVED_PREFIX: &[u8] = b"sqlite_";

/// Reasons an identifier cannot be used as a table or column name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,

    #[error("identifier contains a NUL character")]
    ContainsNul,

    #[error("identifier uses the reserved sqlite_ prefix: {name}")]
    Reserved { name: String },
}

/// Check that `name` can be used as a quoted SQLite identifier.
pub fn validate_identifier(name: &str) -> Result<(), IdentifierError> {
    if name.is_empty() {
        return Err(IdentifierError::Empty);
    }
    if name.contains('\0') {
        return Err(IdentifierError::ContainsNul);
    }
    let reserved = name
        .as_bytes()
        .get(..RESERVED_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(RESERVED_PREFIX));
    if reserved {
        return Err(IdentifierError::Reserved {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Render `name` as a double-quoted SQL identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('"');
    for ch in name.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
    out
}
