//! Compile OHDSI cohort definitions into SQL.
//!
//! A cohort definition is a JSON document describing a patient population
//! over an OMOP CDM source. This crate parses that document into a typed
//! expression model, expands its concept sets through the vocabulary,
//! translates each criterion into a uniform event relation, and composes
//! the full pipeline (primary events, inclusion rules, censoring, end
//! strategies, era collapse) into SQL for DuckDB, Postgres, or
//! Spark-family backends.

pub mod backend;
pub mod builders;
pub mod codesets;
pub mod context;
pub mod dialect;
pub mod error;
pub mod groups;
pub mod inventory;
pub mod models;
pub mod pipeline;
pub mod sql;
pub mod strategy;

pub use backend::{Backend, CohortEvent};
pub use context::{BuildContext, BuildOptions};
pub use dialect::Dialect;
pub use error::CohortError;
pub use models::{CohortExpression, ConceptSet, Criterion};
pub use pipeline::{compile_cohort, generate_cohort};
