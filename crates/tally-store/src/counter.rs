//! Day-grain row counting against one side's Postgres table.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use tally_core::count::CountRecord;
use tally_core::counter::{Counter, Side};
use tally_core::dimension::DimensionKey;
use tally_core::pair::TableRef;
use tally_core::planner::CheckPlan;
use tally_core::{Error, Result};

use crate::ident::{quote_ident, quote_qualified};

/// Column the day grain is derived from unless configured otherwise.
pub const DEFAULT_DATE_COLUMN: &str = "created_at";

/// Placeholder recorded for SQL `NULL` dimension values, keeping them
/// distinct from empty strings.
const NULL_DIMENSION: &str = "<null>";

/// Counts rows per day (and per dimension key) in one side's table.
///
/// One `SELECT ... GROUP BY` per fetch covers both the forward range and
/// the backfill days; the plan's bounds and day list are bound as
/// parameters, only validated identifiers are interpolated.
#[derive(Debug, Clone)]
pub struct PgCounter {
    pool: PgPool,
    side: Side,
    table: TableRef,
    date_column: String,
    dimension_columns: Vec<String>,
}

impl PgCounter {
    /// Creates a counter over `table`, counting by the default date column.
    #[must_use]
    pub fn new(pool: PgPool, side: Side, table: TableRef, dimension_columns: Vec<String>) -> Self {
        Self {
            pool,
            side,
            table,
            date_column: DEFAULT_DATE_COLUMN.to_string(),
            dimension_columns,
        }
    }

    /// Overrides the column the day grain is derived from.
    #[must_use]
    pub fn with_date_column(mut self, column: impl Into<String>) -> Self {
        self.date_column = column.into();
        self
    }

    /// Builds the count query for this counter's configuration.
    ///
    /// ```sql
    /// SELECT "created_at"::DATE AS day, "status"::TEXT AS "status", COUNT(*) AS cnt
    /// FROM "public"."orders"
    /// WHERE ("created_at"::DATE > $1 AND "created_at"::DATE <= $2)
    ///    OR "created_at"::DATE = ANY($3)
    /// GROUP BY 1, 2
    /// ```
    ///
    /// An empty forward range needs no special casing: its predicate is
    /// unsatisfiable and the backfill array carries the remaining days.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] for unsafe identifiers or a
    /// dimension column that collides with the `day`/`cnt` output names.
    pub fn build_query(&self) -> Result<String> {
        let date = quote_ident(&self.date_column)?;
        let relation = quote_qualified(&self.table.schema, &self.table.table)?;

        let mut select_list = vec![format!("{date}::DATE AS day")];
        for column in &self.dimension_columns {
            if column == "day" || column == "cnt" || *column == self.date_column {
                return Err(Error::InvalidIdentifier(format!(
                    "dimension column '{column}' collides with a reserved output column"
                )));
            }
            let quoted = quote_ident(column)?;
            select_list.push(format!("{quoted}::TEXT AS {quoted}"));
        }
        select_list.push("COUNT(*) AS cnt".to_string());

        let group_by = (1..=1 + self.dimension_columns.len())
            .map(|ordinal| ordinal.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!(
            "SELECT {} FROM {relation} \
             WHERE ({date}::DATE > $1 AND {date}::DATE <= $2) OR {date}::DATE = ANY($3) \
             GROUP BY {group_by}",
            select_list.join(", "),
        ))
    }
}

#[async_trait]
impl Counter for PgCounter {
    async fn fetch(&self, plan: &CheckPlan) -> Result<Vec<CountRecord>> {
        let query = self.build_query()?;
        tracing::debug!(side = %self.side, table = %self.table, "executing count query");

        let rows = sqlx::query(&query)
            .bind(plan.after)
            .bind(plan.until)
            .bind(&plan.backfill)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::counter_with_source(
                    self.side,
                    format!("count query failed for {}", self.table),
                    e,
                )
            })?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let day = row.try_get("day").map_err(|e| {
                Error::counter_with_source(self.side, "count row missing day column", e)
            })?;
            let count: i64 = row.try_get("cnt").map_err(|e| {
                Error::counter_with_source(self.side, "count row missing cnt column", e)
            })?;
            let mut dimensions = DimensionKey::none();
            for column in &self.dimension_columns {
                let value: Option<String> = row.try_get(column.as_str()).map_err(|e| {
                    Error::counter_with_source(
                        self.side,
                        format!("count row missing dimension column '{column}'"),
                        e,
                    )
                })?;
                dimensions.insert(
                    column.as_str(),
                    value.unwrap_or_else(|| NULL_DIMENSION.to_string()),
                );
            }
            records.push(CountRecord::new(day, count, dimensions));
        }

        tracing::debug!(side = %self.side, keys = records.len(), "count query returned");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    fn counter(dimensions: Vec<String>) -> PgCounter {
        // Lazy pool: never connects; these tests only build SQL.
        let pool = PgPoolOptions::new().connect_lazy("postgres://localhost/unused");
        PgCounter::new(
            pool.expect("lazy pool"),
            Side::Source,
            TableRef::new("orders_db", "public", "orders"),
            dimensions,
        )
    }

    #[tokio::test]
    async fn plain_query_groups_by_day_only() {
        let sql = counter(vec![]).build_query().unwrap();
        assert_eq!(
            sql,
            "SELECT \"created_at\"::DATE AS day, COUNT(*) AS cnt \
             FROM \"public\".\"orders\" \
             WHERE (\"created_at\"::DATE > $1 AND \"created_at\"::DATE <= $2) \
             OR \"created_at\"::DATE = ANY($3) \
             GROUP BY 1"
        );
    }

    #[tokio::test]
    async fn dimension_columns_are_selected_and_grouped() {
        let sql = counter(vec!["status".to_string(), "country".to_string()])
            .build_query()
            .unwrap();
        assert!(sql.contains("\"status\"::TEXT AS \"status\""));
        assert!(sql.contains("\"country\"::TEXT AS \"country\""));
        assert!(sql.ends_with("GROUP BY 1, 2, 3"));
    }

    #[tokio::test]
    async fn custom_date_column_is_used_throughout() {
        let sql = counter(vec![])
            .with_date_column("loaded_at")
            .build_query()
            .unwrap();
        assert!(sql.contains("\"loaded_at\"::DATE AS day"));
        assert!(!sql.contains("created_at"));
    }

    #[tokio::test]
    async fn unsafe_dimension_column_is_rejected() {
        let err = counter(vec!["status; --".to_string()]).build_query().unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(_)));
    }

    #[tokio::test]
    async fn reserved_output_names_are_rejected_as_dimensions() {
        for reserved in ["day", "cnt", "created_at"] {
            let err = counter(vec![reserved.to_string()]).build_query().unwrap_err();
            assert!(matches!(err, Error::InvalidIdentifier(_)), "{reserved}");
        }
    }
}
