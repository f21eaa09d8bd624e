//! The capability contract a SQL backend must offer, plus the bundled
//! DuckDB implementation. The compiler itself never talks to a backend;
//! only materialization and final execution do.

use anyhow::Result;
use chrono::NaiveDate;

use crate::context::BuildOptions;
use crate::error::CohortError;
use crate::models::{CohortExpression, Criterion};

/// One cohort event row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CohortEvent {
    pub person_id: i64,
    pub event_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub visit_occurrence_id: Option<i64>,
}

/// What the pipeline needs from a backend: statement execution for staging
/// tables and `ANALYZE`, scalar counts for the short-circuit check, and row
/// retrieval for the final event relation.
pub trait Backend {
    fn execute(&mut self, sql: &str) -> Result<()>;

    /// Run `SELECT COUNT(*) FROM (select) t` and return the count.
    fn query_count(&mut self, select: &str) -> Result<i64>;

    /// Run a SELECT with the five-column event schema and fetch its rows.
    fn query_events(&mut self, select: &str) -> Result<Vec<CohortEvent>>;
}

/// The tables an expression will touch, used to fail fast with
/// `MissingTable` before emitting any SQL against a misconfigured source.
pub fn required_tables(expression: &CohortExpression) -> Vec<&'static str> {
    let mut tables = vec![
        "person",
        "observation_period",
        "concept",
        "concept_ancestor",
        "concept_relationship",
    ];
    let mut push_criterion = |criterion: &Criterion| {
        let mut stack = vec![criterion.domain_table()];
        if let Some(group) = criterion.correlated_criteria() {
            let mut groups = vec![group];
            while let Some(group) = groups.pop() {
                for correlated in &group.criteria_list {
                    if let Some(child) = &correlated.criteria {
                        stack.push(child.domain_table());
                    }
                }
                groups.extend(group.groups.iter());
            }
        }
        tables.extend(stack);
    };
    for criterion in &expression.primary_criteria.criteria_list {
        push_criterion(criterion);
    }
    for criterion in &expression.censoring_criteria {
        push_criterion(criterion);
    }
    if expression
        .end_strategy
        .as_ref()
        .and_then(|s| s.custom_era.as_ref())
        .is_some()
    {
        tables.push("drug_exposure");
    }
    tables.sort_unstable();
    tables.dedup();
    tables
}

/// Probe each required table with a zero-row select; the first failure maps
/// to `MissingTable`.
pub fn verify_tables(
    backend: &mut dyn Backend,
    expression: &CohortExpression,
    options: &BuildOptions,
) -> Result<(), CohortError> {
    for table in required_tables(expression) {
        let vocabulary = matches!(table, "concept" | "concept_ancestor" | "concept_relationship");
        let qualified = if vocabulary {
            options.vocabulary_table(table)
        } else {
            options.cdm_table(table)
        };
        let probe = format!("SELECT * FROM {qualified} WHERE 1 = 0");
        if backend.execute(&probe).is_err() {
            let schema = if vocabulary {
                options.vocabulary_schema_name()
            } else {
                options.cdm_schema_name()
            };
            return Err(CohortError::MissingTable {
                name: table.to_string(),
                schema,
            });
        }
    }
    Ok(())
}

#[cfg(feature = "duckdb")]
pub use duck::DuckDbBackend;

#[cfg(feature = "duckdb")]
mod duck {
    use super::{Backend, CohortEvent};
    use anyhow::{Context, Result};
    use chrono::NaiveDate;
    use duckdb::Connection;

    /// In-process DuckDB, the default conformance target.
    pub struct DuckDbBackend {
        conn: Connection,
    }

    impl DuckDbBackend {
        pub fn open_in_memory() -> Result<Self> {
            let conn = Connection::open_in_memory().context("open in-memory duckdb")?;
            Ok(DuckDbBackend { conn })
        }

        pub fn open(path: &str) -> Result<Self> {
            let conn = Connection::open(path).with_context(|| format!("open duckdb at {path}"))?;
            Ok(DuckDbBackend { conn })
        }

        pub fn connection(&self) -> &Connection {
            &self.conn
        }
    }

    fn parse_date(raw: &str) -> Result<NaiveDate> {
        let head = raw.get(..10).unwrap_or(raw);
        NaiveDate::parse_from_str(head, "%Y-%m-%d")
            .with_context(|| format!("unparseable date {raw:?}"))
    }

    impl Backend for DuckDbBackend {
        fn execute(&mut self, sql: &str) -> Result<()> {
            self.conn
                .execute_batch(sql)
                .with_context(|| format!("execute: {sql}"))
        }

        fn query_count(&mut self, select: &str) -> Result<i64> {
            let sql = format!("SELECT COUNT(*) FROM ({select}) t");
            let count = self
                .conn
                .query_row(&sql, [], |row| row.get::<_, i64>(0))
                .with_context(|| format!("count: {select}"))?;
            Ok(count)
        }

        fn query_events(&mut self, select: &str) -> Result<Vec<CohortEvent>> {
            // Dates travel as text so no backend-specific date binding is
            // required.
            let sql = format!(
                "SELECT person_id, event_id, CAST(start_date AS VARCHAR), \
                 CAST(end_date AS VARCHAR), visit_occurrence_id \
                 FROM ({select}) q ORDER BY person_id, event_id"
            );
            let mut stmt = self.conn.prepare(&sql).context("prepare event select")?;
            let mut rows = stmt.query([]).context("run event select")?;
            let mut events = Vec::new();
            while let Some(row) = rows.next()? {
                events.push(CohortEvent {
                    person_id: row.get(0)?,
                    event_id: row.get(1)?,
                    start_date: parse_date(&row.get::<_, String>(2)?)?,
                    end_date: parse_date(&row.get::<_, String>(3)?)?,
                    visit_occurrence_id: row.get::<_, Option<i64>>(4)?,
                });
            }
            Ok(events)
        }
    }
}
