//! Table identity types.
//!
//! A [`TableRef`] names one side of a reconciliation as
//! database + schema + table; a [`TablePair`] is the source/target
//! relationship the audit trail is keyed by.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a single table: database, schema, and table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRef {
    /// Logical database name.
    pub database: String,
    /// Schema the table lives in.
    pub schema: String,
    /// Table name.
    pub table: String,
}

impl TableRef {
    /// Creates a new table reference.
    #[must_use]
    pub fn new(
        database: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Returns the `schema.table` form used when addressing the table in SQL.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.schema, self.table)
    }
}

/// The `(source table, target table)` relationship under reconciliation.
///
/// Every check record and run record is scoped to one pair; the single-
/// flight invariant (at most one RUNNING run) also holds per pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePair {
    /// The side rows originate from.
    pub source: TableRef,
    /// The side rows are loaded into.
    pub target: TableRef,
}

impl TablePair {
    /// Creates a new pair.
    #[must_use]
    pub const fn new(source: TableRef, target: TableRef) -> Self {
        Self { source, target }
    }

    /// Canonical identity string for hashing and deterministic IDs.
    ///
    /// Stable across processes: field order is fixed and the separator
    /// cannot appear in SQL identifiers.
    #[must_use]
    pub fn canonical_string(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.source.database,
            self.source.schema,
            self.source.table,
            self.target.database,
            self.target.schema,
            self.target.table,
        )
    }
}

impl fmt::Display for TablePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}
