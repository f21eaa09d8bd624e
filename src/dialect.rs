//! Backend dialect adapters. Everything that differs between DuckDB,
//! Postgres, and Spark-family backends lives here: identifier quoting,
//! day arithmetic, statistics collection, temp-table emulation, and the
//! inline-VALUES form for literal id lists.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    #[serde(rename = "duckdb")]
    DuckDb,
    #[serde(rename = "postgres", alias = "postgresql")]
    Postgres,
    #[serde(rename = "spark", alias = "databricks")]
    Spark,
}

impl Dialect {
    pub fn from_name(name: &str) -> Option<Dialect> {
        match name.to_ascii_lowercase().as_str() {
            "duckdb" => Some(Dialect::DuckDb),
            "postgres" | "postgresql" => Some(Dialect::Postgres),
            "spark" | "databricks" => Some(Dialect::Spark),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::DuckDb => "duckdb",
            Dialect::Postgres => "postgres",
            Dialect::Spark => "spark",
        }
    }

    /// Double-quoted identifiers with internal quotes doubled; Spark wants
    /// backticks.
    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Dialect::Spark => format!("`{}`", ident.replace('`', "``")),
            _ => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// `expr` shifted by a constant number of days (negative allowed).
    /// DuckDB adds integers to dates directly; Postgres wants an interval.
    pub fn add_days(&self, expr: &str, days: i64) -> String {
        match self {
            Dialect::DuckDb => format!("({expr} + ({days}))"),
            Dialect::Postgres => format!("({expr} + ({days}) * INTERVAL '1 day')"),
            Dialect::Spark => format!("date_add({expr}, {days})"),
        }
    }

    /// `expr` shifted by a day count taken from another expression. A NULL
    /// day count propagates to a NULL result on every backend.
    pub fn add_days_expr(&self, expr: &str, days: &str) -> String {
        match self {
            Dialect::DuckDb => format!("({expr} + CAST({days} AS INTEGER))"),
            Dialect::Postgres => {
                format!("({expr} + CAST({days} AS INTEGER) * INTERVAL '1 day')")
            }
            Dialect::Spark => format!("date_add({expr}, CAST({days} AS INT))"),
        }
    }

    pub fn date_literal(&self, iso_date: &str) -> String {
        format!("DATE '{}'", crate::sql::escape_str(iso_date))
    }

    pub fn analyze_stmt(&self, table: &str) -> String {
        match self {
            Dialect::Spark => format!("ANALYZE TABLE {table} COMPUTE STATISTICS"),
            _ => format!("ANALYZE {table}"),
        }
    }

    /// CTAS for a staging table. Spark has no session temp CTAS, so `temp`
    /// only has an effect on DuckDB/Postgres; the caller routes Spark
    /// staging tables into the temp-emulation schema instead.
    pub fn create_table_as(&self, table: &str, select: &str, temp: bool) -> String {
        let keyword = if temp && !matches!(self, Dialect::Spark) {
            "CREATE TEMP TABLE"
        } else {
            "CREATE TABLE"
        };
        format!("{keyword} {table} AS {select}")
    }

    pub fn drop_table_stmt(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {table}")
    }

    /// Whether session temp tables exist at all; when they do not, staging
    /// requires a temp-emulation schema.
    pub fn supports_temp_tables(&self) -> bool {
        !matches!(self, Dialect::Spark)
    }

    /// A SELECT producing one BIGINT column named `column` from a literal,
    /// non-empty id list. Empty lists never reach this point: an empty
    /// relation is built from a filtered dummy row instead, because empty
    /// literal arrays are not portable (Postgres rejects them untyped).
    pub fn inline_ids(&self, column: &str, ids: &[i64]) -> String {
        debug_assert!(!ids.is_empty());
        let rows = ids
            .iter()
            .map(|id| format!("({id})"))
            .collect::<Vec<_>>()
            .join(", ");
        match self {
            Dialect::Spark => {
                format!("SELECT CAST(v AS BIGINT) AS {column} FROM VALUES {rows} AS t(v)")
            }
            _ => format!("SELECT CAST(v AS BIGINT) AS {column} FROM (VALUES {rows}) AS t(v)"),
        }
    }

    /// A comma-separated literal list usable inside `IN (…)`.
    pub fn id_list(&self, ids: &[i64]) -> String {
        ids.iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_doubles_internal_quotes() {
        assert_eq!(Dialect::DuckDb.quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(Dialect::Spark.quote_ident("a`b"), "`a``b`");
    }

    #[test]
    fn day_arithmetic_per_dialect() {
        assert_eq!(Dialect::DuckDb.add_days("d", -30), "(d + (-30))");
        assert_eq!(
            Dialect::Postgres.add_days("d", 7),
            "(d + (7) * INTERVAL '1 day')"
        );
        assert_eq!(Dialect::Spark.add_days("d", 7), "date_add(d, 7)");
    }

    #[test]
    fn analyze_forms() {
        assert_eq!(Dialect::Postgres.analyze_stmt("t"), "ANALYZE t");
        assert_eq!(
            Dialect::Spark.analyze_stmt("t"),
            "ANALYZE TABLE t COMPUTE STATISTICS"
        );
    }

    #[test]
    fn spark_never_emits_temp_ctas() {
        assert_eq!(
            Dialect::Spark.create_table_as("s.t", "SELECT 1", true),
            "CREATE TABLE s.t AS SELECT 1"
        );
        assert_eq!(
            Dialect::DuckDb.create_table_as("t", "SELECT 1", true),
            "CREATE TEMP TABLE t AS SELECT 1"
        );
    }

    #[test]
    fn inline_ids_values_form() {
        assert_eq!(
            Dialect::DuckDb.inline_ids("concept_id", &[1, 2]),
            "SELECT CAST(v AS BIGINT) AS concept_id FROM (VALUES (1), (2)) AS t(v)"
        );
        assert_eq!(
            Dialect::Spark.inline_ids("concept_id", &[1]),
            "SELECT CAST(v AS BIGINT) AS concept_id FROM VALUES (1) AS t(v)"
        );
    }

    #[test]
    fn dialect_names_round_trip() {
        for d in [Dialect::DuckDb, Dialect::Postgres, Dialect::Spark] {
            assert_eq!(Dialect::from_name(d.name()), Some(d));
        }
        assert_eq!(Dialect::from_name("databricks"), Some(Dialect::Spark));
        assert_eq!(Dialect::from_name("oracle"), None);
    }
}
