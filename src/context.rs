//! Shared build state: schemas and materialization policy, the compiled
//! codeset handle, staging-table lifecycle, and the per-criterion slice
//! cache. One context serves one cohort build and is not shared across
//! threads.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::backend::{Backend, CohortEvent};
use crate::codesets;
use crate::dialect::Dialect;
use crate::error::CohortError;
use crate::models::ConceptSet;
use crate::sql::Relation;

/// Where tables live and how aggressively intermediate stages are
/// materialized. Loadable from TOML for CLI profiles.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    pub dialect: Dialect,
    pub cdm_schema: Option<String>,
    pub vocabulary_schema: Option<String>,
    pub result_schema: Option<String>,
    pub target_table: Option<String>,
    pub cohort_id: Option<i64>,
    /// Schema for "temp" tables on backends without session temporaries,
    /// or when staging tables must be visible across sessions.
    pub temp_emulation_schema: Option<String>,
    /// Materialize each pipeline stage into a staging table. Multi-stage
    /// pipelines reference slices repeatedly, so this defaults on.
    pub materialize_stages: bool,
    pub materialize_codesets: bool,
    /// Run the dialect's ANALYZE on each staging table.
    pub analyze_stages: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            dialect: Dialect::DuckDb,
            cdm_schema: None,
            vocabulary_schema: None,
            result_schema: None,
            target_table: None,
            cohort_id: None,
            temp_emulation_schema: None,
            materialize_stages: true,
            materialize_codesets: true,
            analyze_stages: true,
        }
    }
}

impl BuildOptions {
    /// Compile-only profile: nothing is materialized, the emitted plan is a
    /// single self-contained SELECT.
    pub fn inline(dialect: Dialect) -> Self {
        BuildOptions {
            dialect,
            materialize_stages: false,
            materialize_codesets: false,
            analyze_stages: false,
            ..BuildOptions::default()
        }
    }

    fn qualify(schema: &Option<String>, name: &str) -> String {
        match schema {
            Some(schema) => format!("{schema}.{name}"),
            None => name.to_string(),
        }
    }

    pub fn cdm_table(&self, name: &str) -> String {
        Self::qualify(&self.cdm_schema, name)
    }

    /// Vocabulary tables fall back to the CDM schema when no dedicated
    /// vocabulary schema is configured.
    pub fn vocabulary_table(&self, name: &str) -> String {
        let schema = self.vocabulary_schema.as_ref().or(self.cdm_schema.as_ref());
        match schema {
            Some(schema) => format!("{schema}.{name}"),
            None => name.to_string(),
        }
    }

    pub fn cdm_schema_name(&self) -> String {
        self.cdm_schema.clone().unwrap_or_default()
    }

    pub fn vocabulary_schema_name(&self) -> String {
        self.vocabulary_schema
            .clone()
            .or_else(|| self.cdm_schema.clone())
            .unwrap_or_default()
    }

    fn staging_table(&self, name: &str) -> (String, bool) {
        match &self.temp_emulation_schema {
            Some(schema) => (format!("{schema}.{name}"), false),
            None => (name.to_string(), self.dialect.supports_temp_tables()),
        }
    }
}

pub struct BuildContext<'a> {
    backend: Option<&'a mut dyn Backend>,
    options: BuildOptions,
    codesets_source: String,
    cleanup: Vec<String>,
    slice_cache: HashMap<String, Relation>,
    stage_counter: u32,
    closed: bool,
}

impl<'a> BuildContext<'a> {
    /// Compile-only context: the codeset relation is inlined and no staging
    /// tables are ever created.
    pub fn compile_only(options: BuildOptions, concept_sets: &[ConceptSet]) -> BuildContext<'a> {
        let mut options = options;
        options.materialize_stages = false;
        options.materialize_codesets = false;
        let codesets_source = format!("({})", codesets::codesets_sql(concept_sets, &options));
        BuildContext {
            backend: None,
            options,
            codesets_source,
            cleanup: Vec::new(),
            slice_cache: HashMap::new(),
            stage_counter: 0,
            closed: false,
        }
    }

    /// Full context over a live backend; compiles (and by default
    /// materializes) the codeset relation up front.
    pub fn new(
        backend: &'a mut dyn Backend,
        options: BuildOptions,
        concept_sets: &[ConceptSet],
    ) -> Result<BuildContext<'a>, CohortError> {
        let compiled = codesets::codesets_sql(concept_sets, &options);
        let mut ctx = BuildContext {
            backend: Some(backend),
            options,
            codesets_source: String::new(),
            cleanup: Vec::new(),
            slice_cache: HashMap::new(),
            stage_counter: 0,
            closed: false,
        };
        if ctx.options.materialize_codesets {
            let (name, temp) = ctx.options.staging_table("_cohort_codesets");
            ctx.create_staging(&name, &compiled, temp, "codesets")?;
            ctx.codesets_source = name;
        } else {
            ctx.codesets_source = format!("({compiled})");
        }
        Ok(ctx)
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn dialect(&self) -> Dialect {
        self.options.dialect
    }

    pub fn cdm_table(&self, name: &str) -> String {
        self.options.cdm_table(name)
    }

    /// The codeset relation as a FROM source (table name or subselect).
    pub fn codesets(&self) -> &str {
        &self.codesets_source
    }

    pub fn should_materialize_stages(&self) -> bool {
        self.backend.is_some() && self.options.materialize_stages
    }

    fn create_staging(
        &mut self,
        name: &str,
        select: &str,
        temp: bool,
        stage: &str,
    ) -> Result<(), CohortError> {
        let dialect = self.options.dialect;
        let create = dialect.create_table_as(name, select, temp);
        let analyze = self.options.analyze_stages;
        let backend = self
            .backend
            .as_deref_mut()
            .ok_or_else(|| CohortError::invalid("materialization requires a backend"))?;
        tracing::debug!(table = name, stage, "materializing staging table");
        backend
            .execute(&create)
            .map_err(|e| CohortError::backend(stage, e))?;
        if analyze {
            if let Err(err) = backend.execute(&dialect.analyze_stmt(name)) {
                tracing::warn!(table = name, error = %err, "analyze failed, continuing");
            }
        }
        self.cleanup.push(name.to_string());
        Ok(())
    }

    /// Materialize a relation into the next staging table and return a scan
    /// over it; identity when staging is disabled.
    pub fn maybe_materialize(
        &mut self,
        relation: Relation,
        label: &str,
    ) -> Result<Relation, CohortError> {
        if !self.should_materialize_stages() {
            return Ok(relation);
        }
        self.materialize(relation, label)
    }

    fn materialize(&mut self, relation: Relation, label: &str) -> Result<Relation, CohortError> {
        self.stage_counter += 1;
        let (name, temp) = self
            .options
            .staging_table(&format!("_stage_{label}_{}", self.stage_counter));
        self.create_staging(&name, relation.sql(), temp, label)?;
        let columns: Vec<&str> = relation.columns().iter().map(|c| c.as_str()).collect();
        Ok(Relation::new(
            format!("SELECT {} FROM {name}", columns.join(", ")),
            &columns,
        ))
    }

    /// Materialize a criterion slice once and reuse it for identical
    /// criteria. The cache key is the criterion's serialized form; the
    /// digest only names the staging table.
    pub fn get_or_materialize_slice(
        &mut self,
        cache_key: String,
        relation: Relation,
        label: &str,
    ) -> Result<Relation, CohortError> {
        if !self.should_materialize_stages() {
            return Ok(relation);
        }
        if let Some(cached) = self.slice_cache.get(&cache_key) {
            return Ok(cached.clone());
        }
        let digest = Sha256::digest(cache_key.as_bytes());
        let short = hex_prefix(&digest, 8);
        let table = self.materialize(relation, &format!("{label}_{short}"))?;
        self.slice_cache.insert(cache_key, table.clone());
        Ok(table)
    }

    /// Primary-event count for the zero-row short circuit; None when no
    /// backend is attached or the count itself fails.
    pub fn query_count(&mut self, select: &str) -> Option<i64> {
        let backend = self.backend.as_deref_mut()?;
        match backend.query_count(select) {
            Ok(count) => Some(count),
            Err(err) => {
                tracing::warn!(error = %err, "primary count failed, skipping short circuit");
                None
            }
        }
    }

    pub fn query_events(&mut self, select: &str) -> Result<Vec<CohortEvent>, CohortError> {
        let backend = self
            .backend
            .as_deref_mut()
            .ok_or_else(|| CohortError::invalid("event execution requires a backend"))?;
        backend
            .query_events(select)
            .map_err(|e| CohortError::backend("execute", e))
    }

    pub fn execute(&mut self, sql: &str, stage: &str) -> Result<(), CohortError> {
        let backend = self
            .backend
            .as_deref_mut()
            .ok_or_else(|| CohortError::invalid("statement execution requires a backend"))?;
        backend.execute(sql).map_err(|e| CohortError::backend(stage, e))
    }

    /// Drop staging tables in reverse creation order. A failing drop is
    /// logged and the rest still run. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let dialect = self.options.dialect;
        if let Some(backend) = self.backend.as_deref_mut() {
            while let Some(table) = self.cleanup.pop() {
                let drop = dialect.drop_table_stmt(&table);
                if let Err(err) = backend.execute(&drop) {
                    tracing::warn!(table = %table, error = %err, "failed to drop staging table");
                }
            }
        }
        self.slice_cache.clear();
    }
}

impl Drop for BuildContext<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

fn hex_prefix(digest: &[u8], chars: usize) -> String {
    let mut out = String::with_capacity(chars);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
        if out.len() >= chars {
            break;
        }
    }
    out.truncate(chars);
    out
}
