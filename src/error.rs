use thiserror::Error;

/// Everything that can go wrong between a cohort JSON document and a set of
/// cohort rows. Parser problems short-circuit; builder and backend problems
/// propagate untouched. Cleanup failures are logged, never raised.
#[derive(Debug, Error)]
pub enum CohortError {
    /// The cohort JSON did not match the wire schema.
    #[error("cohort definition parse error at {path}: {expected}")]
    Parse { path: String, expected: String },

    /// A criterion kind with no registered builder.
    #[error("no builder registered for criterion kind {kind}")]
    UnsupportedCriterion { kind: String },

    /// A criterion referenced a codeset id that no concept set declares.
    #[error("criterion references codeset {codeset_id} which is not declared in ConceptSets")]
    MissingCodeset { codeset_id: i64 },

    /// The backend cannot resolve a table the plan needs.
    #[error("required table {schema}.{name} is missing")]
    MissingTable { name: String, schema: String },

    /// A backend compile/execute failure, tagged with the pipeline stage.
    #[error("backend failure during {stage}: {source}")]
    Backend {
        stage: String,
        #[source]
        source: anyhow::Error,
    },

    /// A combination the expression model can represent but the pipeline
    /// cannot evaluate (e.g. a between filter with no extent).
    #[error("invalid cohort expression: {reason}")]
    InvalidExpression { reason: String },
}

impl CohortError {
    pub fn backend(stage: &str, source: anyhow::Error) -> Self {
        CohortError::Backend {
            stage: stage.to_string(),
            source,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        CohortError::InvalidExpression {
            reason: reason.into(),
        }
    }

    /// Stable process exit code for the CLI, one per variant.
    pub fn exit_code(&self) -> i32 {
        match self {
            CohortError::Parse { .. } => 2,
            CohortError::UnsupportedCriterion { .. } => 3,
            CohortError::MissingCodeset { .. } => 4,
            CohortError::MissingTable { .. } => 5,
            CohortError::Backend { .. } => 6,
            CohortError::InvalidExpression { .. } => 7,
        }
    }
}

impl From<serde_json::Error> for CohortError {
    fn from(err: serde_json::Error) -> Self {
        CohortError::Parse {
            path: format!("line {} column {}", err.line(), err.column()),
            expected: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let errors = [
            CohortError::Parse {
                path: "$".into(),
                expected: "object".into(),
            },
            CohortError::UnsupportedCriterion { kind: "Foo".into() },
            CohortError::MissingCodeset { codeset_id: 3 },
            CohortError::MissingTable {
                name: "person".into(),
                schema: "cdm".into(),
            },
            CohortError::backend("codesets", anyhow::anyhow!("boom")),
            CohortError::invalid("between without extent"),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
