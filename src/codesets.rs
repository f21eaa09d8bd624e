//! Vocabulary compiler: expands authored concept sets into the
//! `(codeset_id, concept_id)` relation every criterion joins against.
//!
//! Per set, include and exclude items each expand to the distinct union of
//! their literal ids, descendants, and mapped concepts; exclusion wins by
//! anti-join. The per-set relations are unioned and de-duplicated.

use crate::context::BuildOptions;
use crate::models::{ConceptSet, ConceptSetItem};
use crate::sql::quote_str;

/// Item ids partitioned by how far the vocabulary walk must go.
#[derive(Debug, Default)]
struct Buckets {
    literal: Vec<i64>,
    descendants: Vec<i64>,
    mapped: Vec<i64>,
    mapped_descendants: Vec<i64>,
}

impl Buckets {
    fn push(&mut self, item: &ConceptSetItem, concept_id: i64) {
        self.literal.push(concept_id);
        let descendants = item.include_descendants.unwrap_or(false);
        let mapped = item.include_mapped.unwrap_or(false);
        if descendants {
            self.descendants.push(concept_id);
        }
        if mapped {
            self.mapped.push(concept_id);
            if descendants {
                self.mapped_descendants.push(concept_id);
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.literal.is_empty()
    }
}

/// The full codeset relation for an expression's concept sets. An empty
/// list (or all-empty sets) still yields a schema-correct empty relation.
pub fn codesets_sql(concept_sets: &[ConceptSet], options: &BuildOptions) -> String {
    let compiled: Vec<String> = concept_sets
        .iter()
        .filter_map(|set| single_codeset_sql(set, options))
        .collect();
    if compiled.is_empty() {
        return empty_codesets_sql();
    }
    let unioned = compiled.join(" UNION ALL ");
    format!("SELECT DISTINCT codeset_id, concept_id FROM ({unioned}) codesets")
}

/// An empty `(codeset_id, concept_id)` relation built from a filtered dummy
/// row; empty literal arrays are not portable across dialects.
pub fn empty_codesets_sql() -> String {
    "SELECT CAST(NULL AS BIGINT) AS codeset_id, CAST(NULL AS BIGINT) AS concept_id \
     FROM (SELECT 1 AS one) dummy WHERE 1 = 0"
        .to_string()
}

fn single_codeset_sql(set: &ConceptSet, options: &BuildOptions) -> Option<String> {
    let expression = set.expression.as_ref()?;
    if expression.items.is_empty() {
        return None;
    }

    let mut include = Buckets::default();
    let mut exclude = Buckets::default();
    for item in &expression.items {
        let Some(concept_id) = item.concept.concept_id else {
            continue;
        };
        if item.is_excluded.unwrap_or(false) {
            exclude.push(item, concept_id);
        } else {
            include.push(item, concept_id);
        }
    }

    let include_sql = bucket_union(&include, options)?;
    let mut body = include_sql;
    if let Some(exclude_sql) = bucket_union(&exclude, options) {
        body = format!(
            "SELECT inc.concept_id FROM ({body}) inc \
             WHERE NOT EXISTS (SELECT 1 FROM ({exclude_sql}) exc \
             WHERE exc.concept_id = inc.concept_id)"
        );
    }
    Some(format!(
        "SELECT CAST({id} AS BIGINT) AS codeset_id, included.concept_id \
         FROM ({body}) included",
        id = set.id
    ))
}

/// Distinct union of the three expansion arms of one bucket set.
fn bucket_union(buckets: &Buckets, options: &BuildOptions) -> Option<String> {
    if buckets.is_empty() {
        return None;
    }
    let mut arms = vec![options.dialect.inline_ids("concept_id", &buckets.literal)];
    if let Some(descendants) = descendants_sql(&buckets.descendants, options) {
        arms.push(descendants);
    }
    if let Some(mapped) = mapped_sql(&buckets.mapped, &buckets.mapped_descendants, options) {
        arms.push(mapped);
    }
    if arms.len() == 1 {
        return Some(arms.remove(0));
    }
    Some(format!(
        "SELECT DISTINCT concept_id FROM ({}) unioned",
        arms.join(" UNION ALL ")
    ))
}

/// Valid descendants of the given ancestors.
fn descendants_sql(ancestor_ids: &[i64], options: &BuildOptions) -> Option<String> {
    if ancestor_ids.is_empty() {
        return None;
    }
    let concept = options.vocabulary_table("concept");
    let ancestor = options.vocabulary_table("concept_ancestor");
    Some(format!(
        "SELECT DISTINCT CAST(c.concept_id AS BIGINT) AS concept_id \
         FROM {ancestor} ca \
         JOIN {concept} c ON c.concept_id = ca.descendant_concept_id \
         WHERE ca.ancestor_concept_id IN ({ids}) AND c.invalid_reason IS NULL",
        ids = options.dialect.id_list(ancestor_ids)
    ))
}

/// Standard concepts the source ids (and, where requested, their
/// descendants) map to via valid `Maps to` relationships.
fn mapped_sql(
    mapped_ids: &[i64],
    mapped_descendant_ids: &[i64],
    options: &BuildOptions,
) -> Option<String> {
    let mut sources = Vec::new();
    if !mapped_ids.is_empty() {
        sources.push(options.dialect.inline_ids("concept_id", mapped_ids));
    }
    if let Some(descendants) = descendants_sql(mapped_descendant_ids, options) {
        sources.push(descendants);
    }
    if sources.is_empty() {
        return None;
    }
    let source_sql = if sources.len() == 1 {
        sources.remove(0)
    } else {
        format!(
            "SELECT DISTINCT concept_id FROM ({}) sources",
            sources.join(" UNION ALL ")
        )
    };
    let relationship = options.vocabulary_table("concept_relationship");
    Some(format!(
        "SELECT DISTINCT CAST(cr.concept_id_1 AS BIGINT) AS concept_id \
         FROM ({source_sql}) src \
         JOIN {relationship} cr ON cr.concept_id_2 = src.concept_id \
         WHERE cr.relationship_id = {maps_to} AND cr.invalid_reason IS NULL",
        maps_to = quote_str("Maps to")
    ))
}
