//! Correlated-criteria evaluation: windowed existence and count predicates
//! against index events, demographic predicates on the index person, and
//! the ALL / ANY / AT_LEAST / AT_MOST combinators that tie them together.
//!
//! Each member becomes a boolean predicate over the index relation; a
//! correlated criterion's predicate is an EXISTS against a per-index-event
//! aggregate so that `AT_MOST 0` ("no child events in the window") falls
//! out of the LEFT JOIN count.

use crate::builders::build_events;
use crate::builders::filters::{date_predicate, numeric_predicate};
use crate::context::BuildContext;
use crate::dialect::Dialect;
use crate::error::CohortError;
use crate::models::criteria::concept_ids;
use crate::models::{
    CorrelatedCriteria, CriteriaColumn, CriteriaGroup, Criterion, DemographicCriteria,
    GroupCombinator, Occurrence, OccurrenceType, Window,
};
use crate::sql::Relation;

/// Filter `events` by a criteria group; identity for an absent or empty
/// group. Column layout is preserved.
pub fn apply_criteria_group(
    events: Relation,
    group: Option<&CriteriaGroup>,
    ctx: &mut BuildContext,
) -> Result<Relation, CohortError> {
    let Some(group) = group else {
        return Ok(events);
    };
    let Some(predicate) = group_predicate(&events, "E", group, ctx)? else {
        return Ok(events);
    };
    let columns: Vec<&str> = events.columns().iter().map(|c| c.as_str()).collect();
    Ok(Relation::new(
        format!(
            "SELECT E.* FROM ({index}) E WHERE {predicate}",
            index = events.sql()
        ),
        &columns,
    ))
}

/// The group's combined predicate over `alias`, or None when the group has
/// no effective members.
pub fn group_predicate(
    events: &Relation,
    alias: &str,
    group: &CriteriaGroup,
    ctx: &mut BuildContext,
) -> Result<Option<String>, CohortError> {
    if group.is_empty() {
        return Ok(None);
    }

    let mut masks = Vec::new();
    for correlated in &group.criteria_list {
        masks.push(correlated_predicate(events, alias, correlated, ctx)?);
    }
    for demographic in &group.demographic_criteria_list {
        if let Some(mask) = demographic_predicate(alias, demographic, ctx)? {
            masks.push(mask);
        }
    }
    for subgroup in &group.groups {
        if let Some(mask) = group_predicate(events, alias, subgroup, ctx)? {
            masks.push(mask);
        }
    }
    if masks.is_empty() {
        return Ok(None);
    }

    let combined = match group.combinator() {
        GroupCombinator::All => masks
            .iter()
            .map(|m| format!("({m})"))
            .collect::<Vec<_>>()
            .join(" AND "),
        GroupCombinator::Any => format!(
            "({})",
            masks
                .iter()
                .map(|m| format!("({m})"))
                .collect::<Vec<_>>()
                .join(" OR ")
        ),
        GroupCombinator::AtLeast(threshold) => {
            format!("{} >= {threshold}", indicator_sum(&masks))
        }
        GroupCombinator::AtMost(threshold) => {
            format!("{} <= {threshold}", indicator_sum(&masks))
        }
    };
    Ok(Some(combined))
}

/// Indicator bits are summed through BIGINT; summing raw booleans promotes
/// to NUMERIC on some backends and breaks comparisons downstream.
fn indicator_sum(masks: &[String]) -> String {
    let terms: Vec<String> = masks
        .iter()
        .map(|m| format!("CAST(CASE WHEN {m} THEN 1 ELSE 0 END AS BIGINT)"))
        .collect();
    format!("({})", terms.join(" + "))
}

fn correlated_predicate(
    events: &Relation,
    alias: &str,
    correlated: &CorrelatedCriteria,
    ctx: &mut BuildContext,
) -> Result<String, CohortError> {
    let Some(child_criterion) = correlated.criteria.as_deref() else {
        return Ok("1 = 1".to_string());
    };
    let child = build_events(child_criterion, ctx)?;
    let ignore_observation_period = correlated.ignore_observation_period.unwrap_or(false);

    // Child events must fall inside one of their person's observation
    // periods unless the criterion opts out.
    let child_sql = if ignore_observation_period {
        child.sql().to_string()
    } else {
        format!(
            "SELECT C.person_id, C.event_id, C.start_date, C.end_date, C.visit_occurrence_id \
             FROM ({child}) C \
             JOIN {op} cop ON cop.person_id = C.person_id \
             AND C.start_date >= cop.observation_period_start_date \
             AND C.start_date <= cop.observation_period_end_date",
            child = child.sql(),
            op = ctx.cdm_table("observation_period")
        )
    };

    let mut join_conditions = vec!["A.person_id = I.person_id".to_string()];

    // Containment within the index row's own observation period, when the
    // index relation still carries those bounds.
    if !ignore_observation_period {
        if events.has_column("observation_period_start_date") {
            join_conditions.push("A.start_date >= I.observation_period_start_date".to_string());
        }
        if events.has_column("observation_period_end_date") {
            join_conditions.push("A.start_date <= I.observation_period_end_date".to_string());
            join_conditions.push("A.end_date <= I.observation_period_end_date".to_string());
        }
    }

    join_conditions.extend(window_conditions(correlated, ctx.dialect()));

    // Same-visit restriction; a visit-detail child restricts by default.
    let restrict_visit = correlated
        .restrict_visit
        .unwrap_or(matches!(child_criterion, Criterion::VisitDetail(_)));
    if restrict_visit {
        join_conditions.push(
            "I.visit_occurrence_id IS NOT NULL AND A.visit_occurrence_id IS NOT NULL \
             AND A.visit_occurrence_id = I.visit_occurrence_id"
                .to_string(),
        );
    }

    let having = occurrence_predicate(correlated.occurrence.as_ref());
    let mask = format!(
        "SELECT I.person_id, I.event_id FROM ({index}) I \
         LEFT JOIN ({child_sql}) A ON {conditions} \
         GROUP BY I.person_id, I.event_id HAVING {having}",
        index = events.sql(),
        conditions = join_conditions.join(" AND "),
    );
    Ok(format!(
        "EXISTS (SELECT 1 FROM ({mask}) M \
         WHERE M.person_id = {alias}.person_id AND M.event_id = {alias}.event_id)"
    ))
}

/// Window bounds on the child anchor dates, relative to the index anchors.
/// A missing `days` leaves that side unbounded; bounds are inclusive.
fn window_conditions(correlated: &CorrelatedCriteria, dialect: Dialect) -> Vec<String> {
    let mut conditions = Vec::new();

    if let Some(window) = &correlated.start_window {
        let child_anchor = if window.use_event_end.unwrap_or(false) {
            "A.end_date"
        } else {
            "A.start_date"
        };
        push_window_bounds(&mut conditions, window, child_anchor, dialect);
    }

    if let Some(window) = &correlated.end_window {
        // The end window always constrains the child's end anchor.
        push_window_bounds(&mut conditions, window, "A.end_date", dialect);
    }

    conditions
}

fn push_window_bounds(
    conditions: &mut Vec<String>,
    window: &Window,
    child_anchor: &str,
    dialect: Dialect,
) {
    let index_anchor = if window.use_index_end.unwrap_or(false) {
        "I.end_date"
    } else {
        "I.start_date"
    };
    if let Some(days) = window.start.as_ref().and_then(|e| e.signed_days()) {
        conditions.push(format!(
            "{child_anchor} >= {}",
            dialect.add_days(index_anchor, days)
        ));
    }
    if let Some(days) = window.end.as_ref().and_then(|e| e.signed_days()) {
        conditions.push(format!(
            "{child_anchor} <= {}",
            dialect.add_days(index_anchor, days)
        ));
    }
}

/// HAVING predicate over the joined child rows. LEFT JOIN misses count as
/// zero, so `AT_MOST 0` keeps index events with no children in the window.
fn occurrence_predicate(occurrence: Option<&Occurrence>) -> String {
    let Some(occurrence) = occurrence else {
        return "COUNT(A.event_id) > 0".to_string();
    };
    let column = match occurrence.count_column {
        Some(CriteriaColumn::StartDate) => "A.start_date",
        Some(CriteriaColumn::EndDate) => "A.end_date",
        Some(CriteriaColumn::VisitId) => "A.visit_occurrence_id",
        // Columns outside the event contract count matched rows.
        _ => "A.event_id",
    };
    let count = if occurrence.is_distinct.unwrap_or(false) {
        format!("COUNT(DISTINCT {column})")
    } else {
        format!("COUNT({column})")
    };
    let comparator = match occurrence.kind {
        OccurrenceType::Exactly => "=",
        OccurrenceType::AtMost => "<=",
        OccurrenceType::AtLeast => ">=",
    };
    format!("{count} {comparator} {}", occurrence.count)
}

/// Demographic predicates evaluate directly against the index row and a
/// correlated probe into `person`.
fn demographic_predicate(
    alias: &str,
    demographic: &DemographicCriteria,
    ctx: &BuildContext,
) -> Result<Option<String>, CohortError> {
    let mut person_conditions = Vec::new();
    if let Some(age) = &demographic.age {
        let age_expr = format!("(EXTRACT(YEAR FROM {alias}.start_date) - P.year_of_birth)");
        person_conditions.push(numeric_predicate(&age_expr, age)?);
    }
    for (column, concepts, selection) in [
        ("P.gender_concept_id", &demographic.gender, &demographic.gender_cs),
        ("P.race_concept_id", &demographic.race, &demographic.race_cs),
        (
            "P.ethnicity_concept_id",
            &demographic.ethnicity,
            &demographic.ethnicity_cs,
        ),
    ] {
        let ids = concept_ids(concepts);
        if !ids.is_empty() {
            person_conditions.push(format!("{column} IN ({})", ctx.dialect().id_list(&ids)));
        }
        if let Some(selection) = selection {
            if let Some(codeset_id) = selection.codeset_id {
                let member = format!(
                    "{column} IN (SELECT cs.concept_id FROM {codesets} cs \
                     WHERE cs.codeset_id = {codeset_id})",
                    codesets = ctx.codesets()
                );
                if selection.is_exclusion {
                    person_conditions.push(format!("NOT ({member})"));
                } else {
                    person_conditions.push(member);
                }
            }
        }
    }

    let mut predicates = Vec::new();
    if !person_conditions.is_empty() {
        predicates.push(format!(
            "EXISTS (SELECT 1 FROM {person} P \
             WHERE P.person_id = {alias}.person_id AND {conditions})",
            person = ctx.cdm_table("person"),
            conditions = person_conditions.join(" AND ")
        ));
    }
    if let Some(range) = &demographic.occurrence_start_date {
        predicates.push(date_predicate(
            ctx.dialect(),
            &format!("{alias}.start_date"),
            range,
        )?);
    }
    if let Some(range) = &demographic.occurrence_end_date {
        predicates.push(date_predicate(
            ctx.dialect(),
            &format!("{alias}.end_date"),
            range,
        )?);
    }

    if predicates.is_empty() {
        return Ok(None);
    }
    Ok(Some(format!("({})", predicates.join(" AND "))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BuildOptions;
    use crate::models::criteria::Endpoint;

    fn ctx<'a>() -> BuildContext<'a> {
        BuildContext::compile_only(BuildOptions::default(), &[])
    }

    fn correlated(json: serde_json::Value) -> CorrelatedCriteria {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn empty_group_is_identity() {
        let mut ctx = ctx();
        let events = Relation::events("SELECT 1");
        let out = apply_criteria_group(events.clone(), Some(&CriteriaGroup::default()), &mut ctx)
            .unwrap();
        assert_eq!(out.sql(), events.sql());
    }

    #[test]
    fn window_bounds_are_inclusive_and_open_when_days_missing() {
        let cc = correlated(serde_json::json!({
            "Criteria": {"ConditionOccurrence": {}},
            "StartWindow": {
                "Start": {"Days": 30, "Coeff": -1},
                "End": {"Coeff": 1}
            },
            "Occurrence": {"Type": 2, "Count": 1}
        }));
        let conditions = window_conditions(&cc, Dialect::DuckDb);
        assert_eq!(
            conditions,
            vec!["A.start_date >= (I.start_date + (-30))".to_string()]
        );
    }

    #[test]
    fn end_window_constrains_the_child_end_anchor() {
        let cc = correlated(serde_json::json!({
            "Criteria": {"ConditionOccurrence": {}},
            "EndWindow": {
                "Start": {"Days": 0, "Coeff": 1},
                "End": {"Days": 60, "Coeff": 1},
                "UseIndexEnd": true
            }
        }));
        let conditions = window_conditions(&cc, Dialect::DuckDb);
        assert_eq!(
            conditions,
            vec![
                "A.end_date >= (I.end_date + (0))".to_string(),
                "A.end_date <= (I.end_date + (60))".to_string(),
            ]
        );
    }

    #[test]
    fn at_most_zero_counts_left_join_misses() {
        let predicate = occurrence_predicate(Some(&Occurrence {
            kind: OccurrenceType::AtMost,
            count: 0,
            is_distinct: None,
            count_column: None,
        }));
        assert_eq!(predicate, "COUNT(A.event_id) <= 0");
    }

    #[test]
    fn distinct_visit_counting() {
        let predicate = occurrence_predicate(Some(&Occurrence {
            kind: OccurrenceType::AtLeast,
            count: 2,
            is_distinct: Some(true),
            count_column: Some(CriteriaColumn::VisitId),
        }));
        assert_eq!(predicate, "COUNT(DISTINCT A.visit_occurrence_id) >= 2");
    }

    #[test]
    fn correlated_mask_left_joins_and_aggregates() {
        let mut ctx = ctx();
        let events = Relation::events("SELECT 1 AS person_id");
        let cc = correlated(serde_json::json!({
            "Criteria": {"ConditionOccurrence": {"CodesetId": 2}},
            "StartWindow": {"Start": {"Days": 0, "Coeff": 1}, "End": {"Days": 30, "Coeff": 1}},
            "Occurrence": {"Type": 2, "Count": 2, "IsDistinct": true, "CountColumn": "VISIT_ID"}
        }));
        let predicate = correlated_predicate(&events, "E", &cc, &mut ctx).unwrap();
        assert!(predicate.starts_with("EXISTS"));
        assert!(predicate.contains("LEFT JOIN"));
        assert!(predicate.contains("GROUP BY I.person_id, I.event_id"));
        assert!(predicate.contains("COUNT(DISTINCT A.visit_occurrence_id) >= 2"));
        // Child events are pinned to an observation period by default.
        assert!(predicate.contains("cop.observation_period_start_date"));
    }

    #[test]
    fn ignore_observation_period_drops_the_containment_join() {
        let mut ctx = ctx();
        let events = Relation::events("SELECT 1 AS person_id");
        let cc = correlated(serde_json::json!({
            "Criteria": {"ConditionOccurrence": {}},
            "IgnoreObservationPeriod": true
        }));
        let predicate = correlated_predicate(&events, "E", &cc, &mut ctx).unwrap();
        assert!(!predicate.contains("cop."));
    }

    #[test]
    fn visit_detail_child_restricts_visit_by_default() {
        let mut ctx = ctx();
        let events = Relation::events("SELECT 1 AS person_id");
        let cc = correlated(serde_json::json!({
            "Criteria": {"VisitDetail": {}}
        }));
        let predicate = correlated_predicate(&events, "E", &cc, &mut ctx).unwrap();
        assert!(predicate.contains("A.visit_occurrence_id = I.visit_occurrence_id"));
    }

    #[test]
    fn threshold_combinators_sum_through_bigint() {
        let masks = vec!["a = 1".to_string(), "b = 2".to_string()];
        let sum = indicator_sum(&masks);
        assert_eq!(
            sum,
            "(CAST(CASE WHEN a = 1 THEN 1 ELSE 0 END AS BIGINT) + \
             CAST(CASE WHEN b = 2 THEN 1 ELSE 0 END AS BIGINT))"
        );
    }

    #[test]
    fn demographic_predicate_probes_person_once() {
        let ctx = ctx();
        let demographic: DemographicCriteria = serde_json::from_value(serde_json::json!({
            "Age": {"Value": 18, "Op": "gte"},
            "Gender": [{"CONCEPT_ID": 8507}]
        }))
        .unwrap();
        let predicate = demographic_predicate("E", &demographic, &ctx).unwrap().unwrap();
        assert_eq!(predicate.matches("EXISTS").count(), 1);
        assert!(predicate.contains("EXTRACT(YEAR FROM E.start_date) - P.year_of_birth"));
        assert!(predicate.contains("P.gender_concept_id IN (8507)"));
    }

    #[test]
    fn window_endpoint_json_shape() {
        let endpoint: Endpoint = serde_json::from_str(r#"{"Days": 7, "Coeff": -1}"#).unwrap();
        assert_eq!(endpoint.signed_days(), Some(-7));
    }
}
