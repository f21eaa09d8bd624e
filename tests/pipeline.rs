//! End-to-end scenarios: cohort definitions compiled and executed against
//! an in-memory DuckDB holding a synthetic CDM.

mod common;

use chrono::NaiveDate;
use common::{concept_set, Cdm};
use omop_cohort::{
    compile_cohort, generate_cohort, BuildOptions, CohortError, CohortExpression,
};

fn date(text: &str) -> NaiveDate {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap()
}

fn expression(doc: serde_json::Value) -> CohortExpression {
    CohortExpression::from_json(&doc.to_string()).unwrap()
}

fn generate(cdm: &mut Cdm, doc: serde_json::Value) -> Vec<omop_cohort::CohortEvent> {
    let expr = expression(doc);
    generate_cohort(&mut cdm.backend, &expr, &BuildOptions::default()).unwrap()
}

/// One condition inside an observation period becomes one event bounded by
/// the condition's own dates.
#[test]
fn trivial_primary_no_rules() {
    let mut cdm = Cdm::new();
    cdm.add_person(1);
    cdm.add_observation_period(1, "2019-01-01", "2021-01-01");
    cdm.add_condition(1, 1001, "2020-06-15", "2020-06-15", None);

    let events = generate(
        &mut cdm,
        serde_json::json!({
            "ConceptSets": [concept_set(1, "target", &[1001])],
            "PrimaryCriteria": {
                "CriteriaList": [{"ConditionOccurrence": {"CodesetId": 1}}],
                "PrimaryCriteriaLimit": {"Type": "All"}
            }
        }),
    );

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].person_id, 1);
    assert_eq!(events[0].event_id, 1);
    assert_eq!(events[0].start_date, date("2020-06-15"));
    assert_eq!(events[0].end_date, date("2020-06-15"));
    assert_eq!(events[0].visit_occurrence_id, None);
}

/// `First` on the criterion keeps only the earliest exposure per person.
#[test]
fn first_exposure_only() {
    let mut cdm = Cdm::new();
    cdm.add_person(1);
    cdm.add_observation_period(1, "2019-01-01", "2021-01-01");
    cdm.add_drug_exposure(1, 2001, "2020-06-01", "2020-06-01", None);
    cdm.add_drug_exposure(1, 2001, "2020-07-01", "2020-07-01", None);

    let events = generate(
        &mut cdm,
        serde_json::json!({
            "ConceptSets": [concept_set(1, "drug", &[2001])],
            "PrimaryCriteria": {
                "CriteriaList": [{"DrugExposure": {"CodesetId": 1, "First": true}}],
                "PrimaryCriteriaLimit": {"Type": "All"}
            }
        }),
    );

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].start_date, date("2020-06-01"));
}

/// AT_LEAST 2 with a distinct visit count: two child events on one visit
/// do not qualify; on two visits they do.
#[test]
fn correlated_at_least_two_distinct_visits() {
    let mut cdm = Cdm::new();
    for person_id in [1, 2] {
        cdm.add_person(person_id);
        cdm.add_observation_period(person_id, "2019-01-01", "2021-01-01");
        cdm.add_condition(person_id, 1001, "2020-01-01", "2020-01-01", None);
    }
    // Person 1: both follow-ups on the same visit.
    cdm.add_condition(1, 1002, "2020-01-05", "2020-01-05", Some(100));
    cdm.add_condition(1, 1002, "2020-01-10", "2020-01-10", Some(100));
    // Person 2: follow-ups on two different visits.
    cdm.add_condition(2, 1002, "2020-01-05", "2020-01-05", Some(200));
    cdm.add_condition(2, 1002, "2020-01-10", "2020-01-10", Some(201));

    let events = generate(
        &mut cdm,
        serde_json::json!({
            "ConceptSets": [
                concept_set(1, "index", &[1001]),
                concept_set(2, "follow-up", &[1002])
            ],
            "PrimaryCriteria": {
                "CriteriaList": [{"ConditionOccurrence": {
                    "CodesetId": 1,
                    "CorrelatedCriteria": {
                        "Type": "ALL",
                        "CriteriaList": [{
                            "Criteria": {"ConditionOccurrence": {"CodesetId": 2}},
                            "StartWindow": {
                                "Start": {"Days": 0, "Coeff": 1},
                                "End": {"Days": 30, "Coeff": 1}
                            },
                            "Occurrence": {
                                "Type": 2, "Count": 2,
                                "IsDistinct": true, "CountColumn": "VISIT_ID"
                            }
                        }]
                    }
                }}],
                "PrimaryCriteriaLimit": {"Type": "All"}
            }
        }),
    );

    let persons: Vec<i64> = events.iter().map(|e| e.person_id).collect();
    assert_eq!(persons, vec![2]);
}

/// Both inclusion rules must hold: the bitmask keeps only events carrying
/// every rule's bit.
#[test]
fn inclusion_rule_bitmask() {
    let mut cdm = Cdm::new();
    for person_id in [1, 2] {
        cdm.add_person(person_id);
        cdm.add_observation_period(person_id, "2019-01-01", "2021-01-01");
        cdm.add_condition(person_id, 1001, "2020-06-01", "2020-06-01", None);
    }
    cdm.add_drug_exposure(1, 2001, "2020-01-01", "2020-01-01", None);
    cdm.add_drug_exposure(1, 2002, "2020-02-01", "2020-02-01", None);
    cdm.add_drug_exposure(2, 2002, "2020-02-01", "2020-02-01", None);

    fn rule(name: &str, codeset: i64) -> serde_json::Value {
        serde_json::json!({
            "name": name,
            "expression": {
                "Type": "ALL",
                "CriteriaList": [{
                    "Criteria": {"DrugExposure": {"CodesetId": codeset}},
                    "StartWindow": {
                        "Start": {"Days": 365, "Coeff": -1},
                        "End": {"Days": 0, "Coeff": 1}
                    },
                    "Occurrence": {"Type": 2, "Count": 1}
                }]
            }
        })
    }

    let events = generate(
        &mut cdm,
        serde_json::json!({
            "ConceptSets": [
                concept_set(1, "index", &[1001]),
                concept_set(2, "drug a", &[2001]),
                concept_set(3, "drug b", &[2002])
            ],
            "PrimaryCriteria": {
                "CriteriaList": [{"ConditionOccurrence": {"CodesetId": 1}}],
                "PrimaryCriteriaLimit": {"Type": "All"}
            },
            "InclusionRules": [rule("has drug a", 2), rule("has drug b", 3)]
        }),
    );

    let persons: Vec<i64> = events.iter().map(|e| e.person_id).collect();
    assert_eq!(persons, vec![1]);
}

/// Custom drug era: overlapping (gap-extended) exposures merge into one
/// run and the event end snaps to the run's end.
#[test]
fn end_strategy_custom_era() {
    let mut cdm = Cdm::new();
    cdm.add_person(1);
    cdm.add_observation_period(1, "2019-01-01", "2021-01-01");
    cdm.add_condition(1, 1001, "2020-01-05", "2020-01-05", None);
    cdm.add_drug_exposure(1, 2001, "2020-01-01", "2020-01-10", None);
    cdm.add_drug_exposure(1, 2001, "2020-01-15", "2020-01-20", None);

    let events = generate(
        &mut cdm,
        serde_json::json!({
            "ConceptSets": [
                concept_set(1, "index", &[1001]),
                concept_set(2, "era drug", &[2001])
            ],
            "PrimaryCriteria": {
                "CriteriaList": [{"ConditionOccurrence": {"CodesetId": 1}}],
                "PrimaryCriteriaLimit": {"Type": "All"}
            },
            "EndStrategy": {"CustomEra": {"DrugCodesetId": 2, "GapDays": 5}}
        }),
    );

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].start_date, date("2020-01-05"));
    assert_eq!(events[0].end_date, date("2020-01-20"));
}

/// Era collapse with a 10-day pad merges events separated by fewer than
/// 10 days into one interval with the unpadded end.
#[test]
fn collapse_era_with_pad() {
    let mut cdm = Cdm::new();
    cdm.add_person(1);
    cdm.add_observation_period(1, "2019-01-01", "2021-01-01");
    cdm.add_condition(1, 1001, "2020-01-01", "2020-01-05", None);
    cdm.add_condition(1, 1001, "2020-01-10", "2020-01-12", None);

    let doc = serde_json::json!({
        "ConceptSets": [concept_set(1, "target", &[1001])],
        "PrimaryCriteria": {
            "CriteriaList": [{"ConditionOccurrence": {"CodesetId": 1}}],
            "PrimaryCriteriaLimit": {"Type": "All"}
        },
        "CollapseSettings": {"CollapseType": "ERA", "EraPad": 10}
    });
    let events = generate(&mut cdm, doc.clone());

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_id, 1);
    assert_eq!(events[0].start_date, date("2020-01-01"));
    assert_eq!(events[0].end_date, date("2020-01-12"));

    // The collapsed output is a fixed point: feeding it back through the
    // same pipeline changes nothing.
    let mut collapsed_cdm = Cdm::new();
    collapsed_cdm.add_person(1);
    collapsed_cdm.add_observation_period(1, "2019-01-01", "2021-01-01");
    collapsed_cdm.add_condition(1, 1001, "2020-01-01", "2020-01-12", None);
    let again = generate(&mut collapsed_cdm, doc);
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].start_date, date("2020-01-01"));
    assert_eq!(again[0].end_date, date("2020-01-12"));
}

/// Washout lookback is inclusive: a prior exposure exactly at the lower
/// bound disqualifies the event.
#[test]
fn washout_lower_bound_is_inclusive() {
    let mut cdm = Cdm::new();
    for person_id in [1, 2] {
        cdm.add_person(person_id);
        cdm.add_observation_period(person_id, "2019-01-01", "2021-01-01");
        cdm.add_condition(person_id, 1001, "2020-03-01", "2020-03-01", None);
    }
    // Exactly 30 days before the index: inside the window.
    cdm.add_drug_exposure(1, 2001, "2020-01-31", "2020-01-31", None);
    // 31 days before the index: outside.
    cdm.add_drug_exposure(2, 2001, "2020-01-30", "2020-01-30", None);

    let events = generate(
        &mut cdm,
        serde_json::json!({
            "ConceptSets": [
                concept_set(1, "index", &[1001]),
                concept_set(2, "washout drug", &[2001])
            ],
            "PrimaryCriteria": {
                "CriteriaList": [{"ConditionOccurrence": {"CodesetId": 1}}],
                "ObservationWindow": {"PriorDays": 0, "PostDays": 0},
                "PrimaryCriteriaLimit": {"Type": "All"}
            },
            "AdditionalCriteria": {
                "Type": "ALL",
                "CriteriaList": [{
                    "Criteria": {"DrugExposure": {"CodesetId": 2}},
                    "StartWindow": {
                        "Start": {"Days": 30, "Coeff": -1},
                        "End": {"Days": 1, "Coeff": -1}
                    },
                    "Occurrence": {"Type": 1, "Count": 0}
                }]
            }
        }),
    );

    let persons: Vec<i64> = events.iter().map(|e| e.person_id).collect();
    assert_eq!(persons, vec![2]);
}

/// With an observation window and a date-offset end strategy, the shifted
/// end is capped at the observation period end.
#[test]
fn date_offset_capped_by_observation_period() {
    let mut cdm = Cdm::new();
    cdm.add_person(1);
    cdm.add_observation_period(1, "2019-01-01", "2020-07-01");
    cdm.add_condition(1, 1001, "2020-06-15", "2020-06-15", None);

    let events = generate(
        &mut cdm,
        serde_json::json!({
            "ConceptSets": [concept_set(1, "target", &[1001])],
            "PrimaryCriteria": {
                "CriteriaList": [{"ConditionOccurrence": {"CodesetId": 1}}],
                "ObservationWindow": {"PriorDays": 0, "PostDays": 0},
                "PrimaryCriteriaLimit": {"Type": "All"}
            },
            "EndStrategy": {"DateOffset": {"DateField": "EndDate", "Offset": 30}}
        }),
    );

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].end_date, date("2020-07-01"));
}

/// No end strategy plus an observation window: events run to the end of
/// observation.
#[test]
fn default_end_is_observation_period_end() {
    let mut cdm = Cdm::new();
    cdm.add_person(1);
    cdm.add_observation_period(1, "2019-01-01", "2021-01-01");
    cdm.add_condition(1, 1001, "2020-06-15", "2020-06-15", None);

    let events = generate(
        &mut cdm,
        serde_json::json!({
            "ConceptSets": [concept_set(1, "target", &[1001])],
            "PrimaryCriteria": {
                "CriteriaList": [{"ConditionOccurrence": {"CodesetId": 1}}],
                "ObservationWindow": {"PriorDays": 0, "PostDays": 0},
                "PrimaryCriteriaLimit": {"Type": "All"}
            }
        }),
    );

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].end_date, date("2021-01-01"));
}

/// Primary limit `First` combined with the expression limit is idempotent:
/// one event per person either way.
#[test]
fn first_limits_are_idempotent() {
    let mut cdm = Cdm::new();
    cdm.add_person(1);
    cdm.add_observation_period(1, "2019-01-01", "2021-01-01");
    for day in ["2020-01-01", "2020-02-01", "2020-03-01"] {
        cdm.add_condition(1, 1001, day, day, None);
    }

    let events = generate(
        &mut cdm,
        serde_json::json!({
            "ConceptSets": [concept_set(1, "target", &[1001])],
            "PrimaryCriteria": {
                "CriteriaList": [{"ConditionOccurrence": {"CodesetId": 1}}],
                "PrimaryCriteriaLimit": {"Type": "First"}
            },
            "ExpressionLimit": {"Type": "First"}
        }),
    );

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].start_date, date("2020-01-01"));
}

/// A matching codeset with no matching rows short-circuits to an empty
/// cohort.
#[test]
fn empty_primary_events_yield_empty_cohort() {
    let mut cdm = Cdm::new();
    cdm.add_person(1);
    cdm.add_observation_period(1, "2019-01-01", "2021-01-01");
    cdm.add_condition(1, 9999, "2020-06-15", "2020-06-15", None);

    let events = generate(
        &mut cdm,
        serde_json::json!({
            "ConceptSets": [concept_set(1, "target", &[1001])],
            "PrimaryCriteria": {
                "CriteriaList": [{"ConditionOccurrence": {"CodesetId": 1}}],
                "PrimaryCriteriaLimit": {"Type": "All"}
            }
        }),
    );
    assert!(events.is_empty());
}

/// Multiset determinism: executing the same definition twice over
/// identical fixtures produces identical rows, and compilation is
/// byte-identical.
#[test]
fn generation_is_deterministic() {
    let doc = serde_json::json!({
        "ConceptSets": [concept_set(1, "target", &[1001])],
        "PrimaryCriteria": {
            "CriteriaList": [{"ConditionOccurrence": {"CodesetId": 1}}],
            "PrimaryCriteriaLimit": {"Type": "All"}
        }
    });
    let build = || {
        let mut cdm = Cdm::new();
        cdm.add_person(1);
        cdm.add_person(2);
        for person_id in [1, 2] {
            cdm.add_observation_period(person_id, "2019-01-01", "2021-01-01");
            cdm.add_condition(person_id, 1001, "2020-01-01", "2020-01-02", None);
            cdm.add_condition(person_id, 1001, "2020-05-01", "2020-05-02", None);
        }
        cdm
    };
    let first = generate(&mut build(), doc.clone());
    let second = generate(&mut build(), doc.clone());
    assert_eq!(first, second);
    assert_eq!(first.len(), 4);

    let expr = expression(doc);
    let options = BuildOptions::default();
    assert_eq!(
        compile_cohort(&expr, &options).unwrap(),
        compile_cohort(&expr, &options).unwrap()
    );
}

/// Event ids are a dense global rank ordered by person and start date.
#[test]
fn event_ids_are_densely_ranked() {
    let mut cdm = Cdm::new();
    for person_id in [1, 2] {
        cdm.add_person(person_id);
        cdm.add_observation_period(person_id, "2019-01-01", "2021-01-01");
    }
    cdm.add_condition(2, 1001, "2020-01-01", "2020-01-01", None);
    cdm.add_condition(1, 1001, "2020-03-01", "2020-03-01", None);
    cdm.add_condition(1, 1001, "2020-02-01", "2020-02-01", None);

    let events = generate(
        &mut cdm,
        serde_json::json!({
            "ConceptSets": [concept_set(1, "target", &[1001])],
            "PrimaryCriteria": {
                "CriteriaList": [{"ConditionOccurrence": {"CodesetId": 1}}],
                "PrimaryCriteriaLimit": {"Type": "All"}
            }
        }),
    );

    let ids: Vec<(i64, i64, NaiveDate)> = events
        .iter()
        .map(|e| (e.person_id, e.event_id, e.start_date))
        .collect();
    assert_eq!(
        ids,
        vec![
            (1, 1, date("2020-02-01")),
            (1, 2, date("2020-03-01")),
            (2, 3, date("2020-01-01")),
        ]
    );
}

/// A missing CDM table surfaces as the dedicated error variant before any
/// SQL is emitted.
#[test]
fn missing_table_is_reported() {
    use omop_cohort::backend::DuckDbBackend;
    let mut backend = DuckDbBackend::open_in_memory().unwrap();
    let expr = expression(serde_json::json!({
        "ConceptSets": [concept_set(1, "target", &[1001])],
        "PrimaryCriteria": {
            "CriteriaList": [{"ConditionOccurrence": {"CodesetId": 1}}],
            "PrimaryCriteriaLimit": {"Type": "All"}
        }
    }));
    let err = generate_cohort(&mut backend, &expr, &BuildOptions::default()).unwrap_err();
    assert!(matches!(err, CohortError::MissingTable { .. }));
    assert_eq!(err.exit_code(), 5);
}
