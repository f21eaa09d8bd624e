//! The cohort pipeline: union the primary criteria, assign deterministic
//! event ids, gate through additional criteria and inclusion rules, censor,
//! compute end dates, clamp, and collapse overlapping events into eras.

use crate::backend::{verify_tables, Backend, CohortEvent};
use crate::builders::build_events;
use crate::context::{BuildContext, BuildOptions};
use crate::error::CohortError;
use crate::groups;
use crate::models::{
    CohortExpression, CollapseSettings, CollapseType, Criterion, InclusionRule, ObservationFilter,
    Period,
};
use crate::sql::Relation;
use crate::strategy::apply_end_strategy;

const EVENT_PROJECTION: &str = "person_id, event_id, start_date, end_date, visit_occurrence_id";

/// Compile an expression to a single self-contained SELECT (no backend, no
/// staging tables). Byte-identical for identical inputs.
pub fn compile_cohort(
    expression: &CohortExpression,
    options: &BuildOptions,
) -> Result<String, CohortError> {
    expression.validate()?;
    let mut ctx = BuildContext::compile_only(options.clone(), &expression.concept_sets);
    let events = build_cohort(expression, &mut ctx)?;
    Ok(events.sql().to_string())
}

/// Compile and execute an expression against a live backend, returning the
/// cohort events. Staging tables are dropped before returning.
pub fn generate_cohort(
    backend: &mut dyn Backend,
    expression: &CohortExpression,
    options: &BuildOptions,
) -> Result<Vec<CohortEvent>, CohortError> {
    expression.validate()?;
    verify_tables(backend, expression, options)?;
    let mut ctx = BuildContext::new(backend, options.clone(), &expression.concept_sets)?;
    let result = build_cohort(expression, &mut ctx)
        .and_then(|events| ctx.query_events(events.sql()));
    ctx.close();
    result
}

/// Run the full pipeline in an existing context and return the final event
/// relation.
pub fn build_cohort(
    expression: &CohortExpression,
    ctx: &mut BuildContext,
) -> Result<Relation, CohortError> {
    let primary = &expression.primary_criteria;
    if primary.criteria_list.is_empty() {
        return Err(CohortError::invalid(
            "primary criteria must list at least one criterion",
        ));
    }

    let mut events = union_primary(&primary.criteria_list, ctx)?;
    if let Some(window) = &primary.observation_window {
        events = apply_observation_window(events, window, ctx);
    }
    events = assign_event_ids(&events, &["E.start_date", "E.source_event_id"], true);
    if primary.primary_limit.is_limited() {
        events = keep_first_per_person(&events);
    }
    events = ctx.maybe_materialize(events, "primary_events")?;
    tracing::debug!("primary events assembled");

    // With zero primary events the rest of the pipeline is a no-op; emit a
    // trivially empty plan instead of executing every stage.
    if ctx.should_materialize_stages() {
        if let Some(0) = ctx.query_count(events.sql()) {
            tracing::info!("no primary events, short-circuiting pipeline");
            return Ok(Relation::events(format!(
                "SELECT {EVENT_PROJECTION} FROM ({}) empty LIMIT 0",
                events.sql()
            )));
        }
    }

    if expression.additional_criteria.is_some() {
        events =
            groups::apply_criteria_group(events, expression.additional_criteria.as_ref(), ctx)?;
        events = ctx.maybe_materialize(events, "additional_criteria")?;
    }

    if !expression.inclusion_rules.is_empty() {
        events = apply_inclusion_rules(events, &expression.inclusion_rules, ctx)?;
        events = ctx.maybe_materialize(events, "inclusion")?;
    }
    // QualifiedLimit stays unapplied to match the reference engine.

    if !expression.censoring_criteria.is_empty() {
        events = apply_censoring(events, &expression.censoring_criteria, ctx)?;
        events = ctx.maybe_materialize(events, "censoring")?;
    }

    if expression.expression_limit.is_limited() {
        events = keep_earliest_event(&events);
    }

    let has_strategy = expression
        .end_strategy
        .as_ref()
        .map(|s| !s.is_empty())
        .unwrap_or(false);
    events = apply_end_strategy(events, expression.end_strategy.as_ref(), ctx)?;
    if has_strategy {
        events = ctx.maybe_materialize(events, "strategy_ends")?;
    }

    events = apply_censor_window(events, expression.censor_window.as_ref(), ctx);
    events = drop_aux_columns(&events);
    events = collapse_events(&events, &expression.collapse_settings, ctx);
    events = ctx.maybe_materialize(events, "final_cohort")?;
    Ok(events)
}

/// OHDSI cohort-table adapter: reshape the event relation into
/// `(cohort_definition_id, subject_id, cohort_start_date, cohort_end_date)`.
pub fn cohort_rows_select(events: &Relation, cohort_id: Option<i64>) -> String {
    let id_expr = match cohort_id {
        Some(id) => format!("CAST({id} AS BIGINT)"),
        None => "CAST(NULL AS BIGINT)".to_string(),
    };
    format!(
        "SELECT {id_expr} AS cohort_definition_id, \
         CAST(person_id AS BIGINT) AS subject_id, \
         CAST(start_date AS DATE) AS cohort_start_date, \
         CAST(end_date AS DATE) AS cohort_end_date \
         FROM ({}) cohort",
        events.sql()
    )
}

/// Persist the final relation to the configured result table.
pub fn write_cohort_table(
    ctx: &mut BuildContext,
    events: &Relation,
) -> Result<(), CohortError> {
    let options = ctx.options();
    let target = options
        .target_table
        .clone()
        .ok_or_else(|| CohortError::invalid("target_table must be configured"))?;
    let schema = options
        .result_schema
        .clone()
        .ok_or_else(|| CohortError::invalid("result_schema must be configured"))?;
    let select = cohort_rows_select(events, options.cohort_id);
    let table = format!("{schema}.{target}");
    let create = ctx.dialect().create_table_as(&table, &select, false);
    ctx.execute(&format!("DROP TABLE IF EXISTS {table}"), "write_cohort")?;
    ctx.execute(&create, "write_cohort")
}

fn union_primary(
    criteria: &[Criterion],
    ctx: &mut BuildContext,
) -> Result<Relation, CohortError> {
    let mut parts = Vec::new();
    for criterion in criteria {
        let events = build_events(criterion, ctx)?;
        // The source row id survives as the deterministic tie-breaker.
        parts.push(format!(
            "SELECT {EVENT_PROJECTION}, event_id AS source_event_id FROM ({}) pe",
            events.sql()
        ));
    }
    Ok(Relation::new(
        parts.join(" UNION ALL "),
        &[
            "person_id",
            "event_id",
            "start_date",
            "end_date",
            "visit_occurrence_id",
            "source_event_id",
        ],
    ))
}

/// Keep events whose start sits inside `[op_start + prior, op_end - post]`
/// of a containing observation period; the period bounds ride along for
/// the end-strategy and correlated-criteria stages.
fn apply_observation_window(
    events: Relation,
    window: &ObservationFilter,
    ctx: &BuildContext,
) -> Relation {
    let dialect = ctx.dialect();
    let lower = dialect.add_days("OP.observation_period_start_date", window.prior_days);
    let upper = dialect.add_days("OP.observation_period_end_date", -window.post_days);
    let mut columns: Vec<&str> = events.columns().iter().map(|c| c.as_str()).collect();
    let projection: Vec<String> = columns.iter().map(|c| format!("E.{c}")).collect();
    columns.push("observation_period_start_date");
    columns.push("observation_period_end_date");
    Relation::new(
        format!(
            "SELECT {projection}, OP.observation_period_start_date, \
             OP.observation_period_end_date \
             FROM ({events}) E \
             JOIN {op} OP ON OP.person_id = E.person_id \
             WHERE E.start_date >= {lower} AND E.start_date <= {upper}",
            projection = projection.join(", "),
            events = events.sql(),
            op = ctx.cdm_table("observation_period"),
        ),
        &columns,
    )
}

/// Deterministic id assignment without an event-level single-partition
/// window: a per-person ordinal plus per-person bases derived from person
/// counts. The composed id equals the rank in the global
/// `(person_id, order_by)` ordering.
fn assign_event_ids(
    events: &Relation,
    order_by: &[&str],
    keep_person_ordinal: bool,
) -> Relation {
    let passthrough: Vec<&str> = events
        .columns()
        .iter()
        .map(|c| c.as_str())
        .filter(|c| *c != "event_id")
        .collect();
    let mut ranked_projection: Vec<String> =
        passthrough.iter().map(|c| format!("E.{c}")).collect();
    ranked_projection.push(format!(
        "ROW_NUMBER() OVER (PARTITION BY E.person_id ORDER BY {}) AS person_ordinal",
        order_by.join(", ")
    ));
    let ranked = format!(
        "SELECT {} FROM ({}) E",
        ranked_projection.join(", "),
        events.sql()
    );
    let bases = format!(
        "SELECT person_id, SUM(person_events) OVER (ORDER BY person_id \
         ROWS BETWEEN UNBOUNDED PRECEDING AND 1 PRECEDING) AS rank_base \
         FROM (SELECT person_id, COUNT(*) AS person_events \
         FROM ({}) g GROUP BY person_id) counts",
        events.sql()
    );

    let mut out_columns = vec![
        "person_id",
        "event_id",
        "start_date",
        "end_date",
        "visit_occurrence_id",
    ];
    let mut projection = vec![
        "r.person_id".to_string(),
        "CAST(COALESCE(b.rank_base, 0) + r.person_ordinal AS BIGINT) AS event_id".to_string(),
        "r.start_date".to_string(),
        "r.end_date".to_string(),
        "r.visit_occurrence_id".to_string(),
    ];
    for column in &passthrough {
        if !out_columns.contains(column) {
            out_columns.push(*column);
            projection.push(format!("r.{column}"));
        }
    }
    if keep_person_ordinal {
        out_columns.push("person_ordinal");
        projection.push("r.person_ordinal".to_string());
    }
    Relation::new(
        format!(
            "SELECT {} FROM ({ranked}) r JOIN ({bases}) b ON b.person_id = r.person_id",
            projection.join(", ")
        ),
        &out_columns,
    )
}

fn keep_first_per_person(events: &Relation) -> Relation {
    let columns: Vec<&str> = events.columns().iter().map(|c| c.as_str()).collect();
    Relation::new(
        format!(
            "SELECT E.* FROM ({}) E WHERE E.person_ordinal = 1",
            events.sql()
        ),
        &columns,
    )
}

/// Earliest event per person by `(start_date, event_id)`; used by the
/// expression limit after event ids are final.
fn keep_earliest_event(events: &Relation) -> Relation {
    let columns: Vec<&str> = events.columns().iter().map(|c| c.as_str()).collect();
    let projection: Vec<String> = columns.iter().map(|c| format!("ranked.{c}")).collect();
    Relation::new(
        format!(
            "SELECT {projection} FROM ( \
             SELECT E.*, ROW_NUMBER() OVER (PARTITION BY E.person_id \
             ORDER BY E.start_date, E.event_id) AS expr_ordinal \
             FROM ({events}) E) ranked WHERE ranked.expr_ordinal = 1",
            projection = projection.join(", "),
            events = events.sql()
        ),
        &columns,
    )
}

/// Each rule contributes its bit to every surviving `(person, event)`; an
/// event passes when the summed mask covers every rule. The sum is cast
/// back through BIGINT so dialects that widen SUM keep integer semantics.
fn apply_inclusion_rules(
    events: Relation,
    rules: &[InclusionRule],
    ctx: &mut BuildContext,
) -> Result<Relation, CohortError> {
    let mut hits = Vec::new();
    for (index, rule) in rules.iter().enumerate() {
        let bit = 1i64 << index;
        let predicate = match &rule.expression {
            Some(group) => groups::group_predicate(&events, "E", group, ctx)?,
            None => None,
        };
        let mut sql = format!(
            "SELECT DISTINCT E.person_id, E.event_id, CAST({bit} AS BIGINT) AS rule_bit \
             FROM ({}) E",
            events.sql()
        );
        if let Some(predicate) = predicate {
            sql.push_str(&format!(" WHERE {predicate}"));
        }
        hits.push(sql);
    }
    let hits_relation = ctx.maybe_materialize(
        Relation::new(
            hits.join(" UNION ALL "),
            &["person_id", "event_id", "rule_bit"],
        ),
        "inclusion_hits",
    )?;
    let target: i64 = (1 << rules.len()) - 1;
    let mask = format!(
        "SELECT person_id, event_id FROM ( \
         SELECT person_id, event_id, CAST(SUM(rule_bit) AS BIGINT) AS rule_mask \
         FROM ({hits}) hits GROUP BY person_id, event_id) m \
         WHERE m.rule_mask = {target}",
        hits = hits_relation.sql()
    );
    let columns: Vec<&str> = events.columns().iter().map(|c| c.as_str()).collect();
    Ok(Relation::new(
        format!(
            "SELECT E.* FROM ({events}) E WHERE EXISTS ( \
             SELECT 1 FROM ({mask}) M \
             WHERE M.person_id = E.person_id AND M.event_id = E.event_id)",
            events = events.sql()
        ),
        &columns,
    ))
}

/// Shorten an event at the earliest matching censor event that starts on
/// or after the event's own start.
fn apply_censoring(
    events: Relation,
    criteria: &[Criterion],
    ctx: &mut BuildContext,
) -> Result<Relation, CohortError> {
    let mut parts = Vec::new();
    for criterion in criteria {
        let censor = build_events(criterion, ctx)?;
        parts.push(format!(
            "SELECT person_id, start_date AS censor_start FROM ({}) c",
            censor.sql()
        ));
    }
    let censors = parts.join(" UNION ALL ");
    let cutoffs = format!(
        "SELECT E2.person_id, E2.event_id, MIN(C.censor_start) AS censor_date \
         FROM ({events}) E2 \
         JOIN ({censors}) C ON C.person_id = E2.person_id \
         AND C.censor_start >= E2.start_date \
         GROUP BY E2.person_id, E2.event_id",
        events = events.sql()
    );
    let projection: Vec<String> = events
        .columns()
        .iter()
        .map(|column| {
            if column == "end_date" {
                "CASE WHEN M.censor_date IS NOT NULL AND M.censor_date < E.end_date \
                 THEN M.censor_date ELSE E.end_date END AS end_date"
                    .to_string()
            } else {
                format!("E.{column}")
            }
        })
        .collect();
    let columns: Vec<&str> = events.columns().iter().map(|c| c.as_str()).collect();
    Ok(Relation::new(
        format!(
            "SELECT {projection} FROM ({events}) E \
             LEFT JOIN ({cutoffs}) M \
             ON M.person_id = E.person_id AND M.event_id = E.event_id",
            projection = projection.join(", "),
            events = events.sql()
        ),
        &columns,
    ))
}

/// The censor window filters events to the configured absolute bounds.
fn apply_censor_window(
    events: Relation,
    window: Option<&Period>,
    ctx: &BuildContext,
) -> Relation {
    let Some(window) = window else { return events };
    let dialect = ctx.dialect();
    let mut predicates = Vec::new();
    if let Some(start) = &window.start_date {
        predicates.push(format!(
            "E.start_date >= {}",
            dialect.date_literal(&start.format("%Y-%m-%d").to_string())
        ));
    }
    if let Some(end) = &window.end_date {
        predicates.push(format!(
            "E.end_date <= {}",
            dialect.date_literal(&end.format("%Y-%m-%d").to_string())
        ));
    }
    if predicates.is_empty() {
        return events;
    }
    let columns: Vec<&str> = events.columns().iter().map(|c| c.as_str()).collect();
    Relation::new(
        format!(
            "SELECT E.* FROM ({}) E WHERE {}",
            events.sql(),
            predicates.join(" AND ")
        ),
        &columns,
    )
}

fn drop_aux_columns(events: &Relation) -> Relation {
    Relation::events(format!(
        "SELECT {EVENT_PROJECTION} FROM ({}) E",
        events.sql()
    ))
}

/// Merge events that overlap once each end is padded by `era_pad` days:
/// a row opens a new era only when no earlier padded end reaches its
/// start. Era end is the max padded end minus the pad; ids are renumbered
/// densely.
fn collapse_events(
    events: &Relation,
    settings: &CollapseSettings,
    ctx: &BuildContext,
) -> Relation {
    match settings.collapse_type {
        CollapseType::Era => {}
    }
    let dialect = ctx.dialect();
    let pad = settings.era_pad;
    let padded = format!(
        "SELECT {EVENT_PROJECTION}, {padded_end} AS padded_end FROM ({events}) E",
        padded_end = dialect.add_days("E.end_date", pad),
        events = events.sql()
    );
    let marked = format!(
        "SELECT p.*, CASE WHEN MAX(padded_end) OVER (PARTITION BY person_id \
         ORDER BY start_date, end_date, event_id \
         ROWS BETWEEN UNBOUNDED PRECEDING AND 1 PRECEDING) >= p.start_date \
         THEN 0 ELSE 1 END AS era_head \
         FROM ({padded}) p"
    );
    let grouped = format!(
        "SELECT m.*, SUM(era_head) OVER (PARTITION BY person_id \
         ORDER BY start_date, era_head DESC, end_date, event_id \
         ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW) AS era_group \
         FROM ({marked}) m"
    );
    let eras = Relation::new(
        format!(
            "SELECT person_id, MIN(start_date) AS start_date, \
             {era_end} AS end_date, \
             MAX(visit_occurrence_id) AS visit_occurrence_id \
             FROM ({grouped}) g GROUP BY person_id, era_group",
            era_end = dialect.add_days("MAX(padded_end)", -pad)
        ),
        &["person_id", "start_date", "end_date", "visit_occurrence_id"],
    );
    assign_event_ids(&eras, &["E.start_date", "E.end_date"], false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expression(doc: serde_json::Value) -> CohortExpression {
        CohortExpression::from_json(&doc.to_string()).unwrap()
    }

    fn base_doc() -> serde_json::Value {
        serde_json::json!({
            "ConceptSets": [
                {"id": 1, "name": "target", "expression": {"items": [
                    {"concept": {"CONCEPT_ID": 1001}}
                ]}}
            ],
            "PrimaryCriteria": {
                "CriteriaList": [{"ConditionOccurrence": {"CodesetId": 1}}],
                "PrimaryCriteriaLimit": {"Type": "All"}
            }
        })
    }

    #[test]
    fn compile_is_deterministic() {
        let expr = expression(base_doc());
        let options = BuildOptions::default();
        let a = compile_cohort(&expr, &options).unwrap();
        let b = compile_cohort(&expr, &options).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn compile_rejects_empty_primary_list() {
        let mut doc = base_doc();
        doc["PrimaryCriteria"]["CriteriaList"] = serde_json::json!([]);
        let expr = expression(doc);
        assert!(matches!(
            compile_cohort(&expr, &BuildOptions::default()).unwrap_err(),
            CohortError::InvalidExpression { .. }
        ));
    }

    #[test]
    fn id_assignment_partitions_by_person() {
        let events = Relation::new(
            "SELECT 1",
            &[
                "person_id",
                "event_id",
                "start_date",
                "end_date",
                "visit_occurrence_id",
                "source_event_id",
            ],
        );
        let assigned = assign_event_ids(&events, &["E.start_date", "E.source_event_id"], true);
        let sql = assigned.sql();
        assert!(sql.contains("PARTITION BY E.person_id"));
        // The only unpartitioned window runs over one row per person.
        assert!(sql.contains("SUM(person_events) OVER (ORDER BY person_id"));
        assert!(!sql.contains("ROW_NUMBER() OVER (ORDER BY"));
        assert!(assigned.has_column("person_ordinal"));
        assert!(assigned.has_column("source_event_id"));
    }

    #[test]
    fn observation_window_carries_period_bounds() {
        let ctx = BuildContext::compile_only(BuildOptions::default(), &[]);
        let events = Relation::new(
            "SELECT 1",
            &[
                "person_id",
                "event_id",
                "start_date",
                "end_date",
                "visit_occurrence_id",
                "source_event_id",
            ],
        );
        let window = ObservationFilter {
            prior_days: 365,
            post_days: 0,
        };
        let out = apply_observation_window(events, &window, &ctx);
        assert!(out.has_column("observation_period_end_date"));
        assert!(out
            .sql()
            .contains("E.start_date >= (OP.observation_period_start_date + (365))"));
        assert!(out
            .sql()
            .contains("E.start_date <= (OP.observation_period_end_date + (0))"));
    }

    #[test]
    fn inclusion_mask_requires_every_rule_bit() {
        let mut ctx = BuildContext::compile_only(BuildOptions::default(), &[]);
        let events = Relation::events("SELECT 1");
        let rules = vec![InclusionRule::default(), InclusionRule::default()];
        let out = apply_inclusion_rules(events, &rules, &mut ctx).unwrap();
        let sql = out.sql();
        assert!(sql.contains("CAST(1 AS BIGINT) AS rule_bit"));
        assert!(sql.contains("CAST(2 AS BIGINT) AS rule_bit"));
        assert!(sql.contains("CAST(SUM(rule_bit) AS BIGINT)"));
        assert!(sql.contains("m.rule_mask = 3"));
    }

    #[test]
    fn collapse_pads_and_renumbers() {
        let ctx = BuildContext::compile_only(BuildOptions::default(), &[]);
        let events = Relation::events("SELECT 1");
        let settings = CollapseSettings {
            collapse_type: CollapseType::Era,
            era_pad: 10,
        };
        let out = collapse_events(&events, &settings, &ctx);
        let sql = out.sql();
        assert_eq!(out.columns(), crate::sql::EVENT_COLUMNS);
        assert!(sql.contains("(E.end_date + (10)) AS padded_end"));
        assert!(sql.contains("(MAX(padded_end) + (-10)) AS end_date"));
        assert!(sql.contains("ROWS BETWEEN UNBOUNDED PRECEDING AND 1 PRECEDING"));
    }

    #[test]
    fn cohort_rows_select_shapes_the_ohdsi_table() {
        let events = Relation::events("SELECT 1");
        let sql = cohort_rows_select(&events, Some(42));
        assert!(sql.contains("CAST(42 AS BIGINT) AS cohort_definition_id"));
        assert!(sql.contains("AS cohort_start_date"));
        let sql = cohort_rows_select(&events, None);
        assert!(sql.contains("CAST(NULL AS BIGINT) AS cohort_definition_id"));
    }

    #[test]
    fn other_dialects_compile_with_their_own_arithmetic() {
        let mut doc = base_doc();
        doc["CollapseSettings"] = serde_json::json!({"CollapseType": "ERA", "EraPad": 7});
        let expr = expression(doc);

        let mut options = BuildOptions::default();
        options.dialect = crate::dialect::Dialect::Postgres;
        let postgres = compile_cohort(&expr, &options).unwrap();
        assert!(postgres.contains("INTERVAL '1 day'"));

        options.dialect = crate::dialect::Dialect::Spark;
        let spark = compile_cohort(&expr, &options).unwrap();
        assert!(spark.contains("date_add("));
        assert!(!spark.contains("INTERVAL"));
    }

    #[test]
    fn full_compile_includes_every_requested_stage() {
        let mut doc = base_doc();
        doc["PrimaryCriteria"]["ObservationWindow"] =
            serde_json::json!({"PriorDays": 0, "PostDays": 0});
        doc["InclusionRules"] = serde_json::json!([
            {"name": "any drug", "expression": {"Type": "ALL", "CriteriaList": [{
                "Criteria": {"DrugExposure": {"CodesetId": 1}},
                "StartWindow": {"Start": {"Days": 30, "Coeff": -1}, "End": {"Days": 0, "Coeff": 1}},
                "Occurrence": {"Type": 2, "Count": 1}
            }]}}
        ]);
        doc["EndStrategy"] = serde_json::json!({"DateOffset": {"DateField": "StartDate", "Offset": 7}});
        doc["CollapseSettings"] = serde_json::json!({"CollapseType": "ERA", "EraPad": 30});
        doc["CensorWindow"] = serde_json::json!({"StartDate": "2010-01-01"});
        let expr = expression(doc);
        let sql = compile_cohort(&expr, &BuildOptions::default()).unwrap();
        assert!(sql.contains("rule_mask"));
        assert!(sql.contains("GREATEST"));
        assert!(sql.contains("era_group"));
        assert!(sql.contains("DATE '2010-01-01'"));
    }
}
