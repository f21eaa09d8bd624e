//! Small SQL assembly helpers shared by the codeset compiler, the criterion
//! builders, and the pipeline. Plans are composed as plain SELECT text; the
//! dialect adapter owns every construct that differs between backends.

/// Column layout every criterion builder must emit, in order.
pub const EVENT_COLUMNS: [&str; 5] = [
    "person_id",
    "event_id",
    "start_date",
    "end_date",
    "visit_occurrence_id",
];

/// A composed SELECT together with the columns it is known to produce.
/// Column tracking is what lets later stages decide whether observation
/// period bounds or auxiliary ordinals are available.
#[derive(Debug, Clone)]
pub struct Relation {
    sql: String,
    columns: Vec<String>,
}

impl Relation {
    pub fn new(sql: impl Into<String>, columns: &[&str]) -> Self {
        Relation {
            sql: sql.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// A relation with the standard five-column event schema.
    pub fn events(sql: impl Into<String>) -> Self {
        Relation::new(sql, &EVENT_COLUMNS)
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

/// Re-select a relation with some columns replaced by new expressions,
/// preserving the column layout. Override expressions may reference the
/// given alias.
pub fn reproject(relation: &Relation, alias: &str, overrides: &[(&str, String)]) -> Relation {
    let projection: Vec<String> = relation
        .columns()
        .iter()
        .map(|column| {
            match overrides.iter().find(|(name, _)| name == column) {
                Some((_, expr)) => format!("{expr} AS {column}"),
                None => format!("{alias}.{column}"),
            }
        })
        .collect();
    let columns: Vec<&str> = relation.columns().iter().map(|c| c.as_str()).collect();
    Relation::new(
        format!(
            "SELECT {} FROM ({}) {alias}",
            projection.join(", "),
            relation.sql()
        ),
        &columns,
    )
}

/// Escape a string literal body (single quotes doubled, ANSI style).
pub fn escape_str(value: &str) -> String {
    value.replace('\'', "''")
}

/// Quote a string literal.
pub fn quote_str(value: &str) -> String {
    format!("'{}'", escape_str(value))
}

/// Incremental SELECT assembly: a projection, a FROM source, join clauses,
/// and conjunctive predicates. Builders push onto this as they walk a
/// criterion's filters, then wrap the result into the event schema.
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    projection: Vec<String>,
    from: String,
    joins: Vec<String>,
    predicates: Vec<String>,
}

impl SelectBuilder {
    /// `from` is the full FROM source including its alias, e.g.
    /// `cdm.condition_occurrence co` or `(SELECT …) co`.
    pub fn from_clause(from: impl Into<String>) -> Self {
        SelectBuilder {
            projection: Vec::new(),
            from: from.into(),
            joins: Vec::new(),
            predicates: Vec::new(),
        }
    }

    pub fn select(&mut self, expr: impl Into<String>) {
        self.projection.push(expr.into());
    }

    /// Push a complete join clause, e.g. `JOIN cdm.person pe ON …`.
    pub fn join(&mut self, clause: impl Into<String>) {
        self.joins.push(clause.into());
    }

    pub fn filter(&mut self, predicate: impl Into<String>) {
        self.predicates.push(predicate.into());
    }

    pub fn build(&self) -> String {
        let projection = if self.projection.is_empty() {
            "*".to_string()
        } else {
            self.projection.join(", ")
        };
        let mut sql = format!("SELECT {} FROM {}", projection, self.from);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if !self.predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.predicates.join(" AND "));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_in_clause_order() {
        let mut q = SelectBuilder::from_clause("cdm.condition_occurrence co");
        q.select("co.*");
        q.join("JOIN cdm.person pe ON pe.person_id = co.person_id");
        q.filter("co.condition_concept_id = 1001");
        q.filter("pe.year_of_birth < 2000");
        assert_eq!(
            q.build(),
            "SELECT co.* FROM cdm.condition_occurrence co \
             JOIN cdm.person pe ON pe.person_id = co.person_id \
             WHERE co.condition_concept_id = 1001 AND pe.year_of_birth < 2000"
        );
    }

    #[test]
    fn empty_projection_falls_back_to_star() {
        let q = SelectBuilder::from_clause("t");
        assert_eq!(q.build(), "SELECT * FROM t");
    }

    #[test]
    fn escapes_single_quotes() {
        assert_eq!(quote_str("Maps to"), "'Maps to'");
        assert_eq!(quote_str("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn relation_tracks_columns() {
        let rel = Relation::events("SELECT 1");
        assert!(rel.has_column("visit_occurrence_id"));
        assert!(!rel.has_column("observation_period_end_date"));
    }
}
