//! End strategies: how a cohort event's end date is computed once the
//! index events are fixed. With no strategy the event runs to the end of
//! its observation period; a date offset shifts one endpoint; a custom era
//! rebuilds drug exposure runs and snaps the end to the containing run.

use crate::builders::filters::codeset_in;
use crate::context::BuildContext;
use crate::error::CohortError;
use crate::models::{CustomEraStrategy, DateField, DateOffsetStrategy, EndStrategy};
use crate::sql::{reproject, Relation};

pub fn apply_end_strategy(
    events: Relation,
    strategy: Option<&EndStrategy>,
    ctx: &mut BuildContext,
) -> Result<Relation, CohortError> {
    let Some(strategy) = strategy.filter(|s| !s.is_empty()) else {
        // Default: the event persists until the end of observation.
        if events.has_column("observation_period_end_date") {
            return Ok(reproject(
                &events,
                "E",
                &[("end_date", "E.observation_period_end_date".to_string())],
            ));
        }
        return Ok(events);
    };
    let mut result = events;
    if let Some(custom_era) = &strategy.custom_era {
        result = apply_custom_era(result, custom_era, ctx)?;
    }
    if let Some(date_offset) = &strategy.date_offset {
        result = apply_date_offset(result, date_offset, ctx);
    }
    Ok(result)
}

/// Shift the chosen endpoint by the offset, then floor the start at the
/// observation period start (START field) or cap the end at the
/// observation period end (END field) when those bounds are available.
fn apply_date_offset(
    events: Relation,
    strategy: &DateOffsetStrategy,
    ctx: &BuildContext,
) -> Relation {
    let dialect = ctx.dialect();
    match strategy.date_field {
        DateField::StartDate => {
            let mut shifted = dialect.add_days("E.start_date", strategy.offset);
            if events.has_column("observation_period_start_date") {
                shifted = format!("GREATEST({shifted}, E.observation_period_start_date)");
            }
            reproject(&events, "E", &[("start_date", shifted)])
        }
        DateField::EndDate => {
            let mut shifted = dialect.add_days("E.end_date", strategy.offset);
            if events.has_column("observation_period_end_date") {
                shifted = format!("LEAST({shifted}, E.observation_period_end_date)");
            }
            reproject(&events, "E", &[("end_date", shifted)])
        }
    }
}

/// Build maximal drug-exposure runs for the cohort's persons and snap each
/// event's end to the end of the run containing its start. Events outside
/// every run are dropped.
fn apply_custom_era(
    events: Relation,
    strategy: &CustomEraStrategy,
    ctx: &mut BuildContext,
) -> Result<Relation, CohortError> {
    let Some(drug_codeset_id) = strategy.drug_codeset_id else {
        return Err(CohortError::invalid(
            "custom era end strategy requires a drug codeset id",
        ));
    };
    let dialect = ctx.dialect();
    let gap_days = strategy.gap_days;
    let start = "de.drug_exposure_start_date";

    // Per-exposure end: the override wins, else the recorded end, else
    // start + days_supply, else a single day.
    let end_expr = match strategy.days_supply_override {
        Some(days) => dialect.add_days(start, days),
        None => format!(
            "COALESCE(de.drug_exposure_end_date, {supply}, {one_day})",
            supply = dialect.add_days_expr(start, "de.days_supply"),
            one_day = dialect.add_days(start, 1)
        ),
    };
    let extended_end = dialect.add_days(&end_expr, gap_days + strategy.offset);

    let exposures = format!(
        "SELECT de.person_id, {start} AS start_date, {extended_end} AS extended_end \
         FROM {drug_exposure} de \
         WHERE de.person_id IN (SELECT DISTINCT person_id FROM ({index}) cohort) \
         AND ({by_concept} OR {by_source})",
        drug_exposure = ctx.cdm_table("drug_exposure"),
        index = events.sql(),
        by_concept = codeset_in(ctx, "de.drug_concept_id", drug_codeset_id),
        by_source = codeset_in(ctx, "de.drug_source_concept_id", drug_codeset_id),
    );

    // Classic gaps-and-islands: a row heads a new run when no earlier
    // exposure's extended end reaches its start.
    let marked = format!(
        "SELECT person_id, start_date, extended_end, \
         CASE WHEN MAX(extended_end) OVER (PARTITION BY person_id \
         ORDER BY start_date, extended_end \
         ROWS BETWEEN UNBOUNDED PRECEDING AND 1 PRECEDING) >= start_date \
         THEN 0 ELSE 1 END AS era_head \
         FROM ({exposures}) exposures"
    );
    let grouped = format!(
        "SELECT person_id, start_date, extended_end, \
         SUM(era_head) OVER (PARTITION BY person_id \
         ORDER BY start_date, extended_end \
         ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW) AS era_group \
         FROM ({marked}) marked"
    );
    let eras = format!(
        "SELECT person_id, MIN(start_date) AS era_start, {era_end} AS era_end \
         FROM ({grouped}) grouped GROUP BY person_id, era_group",
        era_end = dialect.add_days("MAX(extended_end)", -gap_days)
    );

    let projection: Vec<String> = events
        .columns()
        .iter()
        .map(|column| {
            if column == "end_date" {
                "R.era_end AS end_date".to_string()
            } else {
                format!("E.{column}")
            }
        })
        .collect();
    let columns: Vec<&str> = events.columns().iter().map(|c| c.as_str()).collect();
    Ok(Relation::new(
        format!(
            "SELECT {projection} FROM ({index}) E \
             JOIN ({eras}) R ON R.person_id = E.person_id \
             AND E.start_date >= R.era_start AND E.start_date <= R.era_end",
            projection = projection.join(", "),
            index = events.sql(),
        ),
        &columns,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BuildOptions;
    use crate::sql::EVENT_COLUMNS;

    fn ctx<'a>() -> BuildContext<'a> {
        BuildContext::compile_only(BuildOptions::default(), &[])
    }

    fn events_with_op() -> Relation {
        Relation::new(
            "SELECT 1",
            &[
                "person_id",
                "event_id",
                "start_date",
                "end_date",
                "visit_occurrence_id",
                "observation_period_start_date",
                "observation_period_end_date",
            ],
        )
    }

    #[test]
    fn empty_strategy_runs_to_observation_period_end() {
        let mut ctx = ctx();
        let out = apply_end_strategy(events_with_op(), None, &mut ctx).unwrap();
        assert!(out
            .sql()
            .contains("E.observation_period_end_date AS end_date"));
        // Without the bounds there is nothing to extend to.
        let plain = Relation::events("SELECT 1");
        let out = apply_end_strategy(plain.clone(), None, &mut ctx).unwrap();
        assert_eq!(out.sql(), plain.sql());
    }

    #[test]
    fn date_offset_end_is_capped_by_observation_period() {
        let mut ctx = ctx();
        let strategy = EndStrategy {
            date_offset: Some(DateOffsetStrategy {
                date_field: DateField::EndDate,
                offset: 30,
            }),
            custom_era: None,
        };
        let out = apply_end_strategy(events_with_op(), Some(&strategy), &mut ctx).unwrap();
        assert!(out.sql().contains(
            "LEAST((E.end_date + (30)), E.observation_period_end_date) AS end_date"
        ));
    }

    #[test]
    fn date_offset_start_is_floored() {
        let mut ctx = ctx();
        let strategy = EndStrategy {
            date_offset: Some(DateOffsetStrategy {
                date_field: DateField::StartDate,
                offset: -7,
            }),
            custom_era: None,
        };
        let out = apply_end_strategy(events_with_op(), Some(&strategy), &mut ctx).unwrap();
        assert!(out.sql().contains(
            "GREATEST((E.start_date + (-7)), E.observation_period_start_date) AS start_date"
        ));
    }

    #[test]
    fn custom_era_builds_runs_and_snaps_ends() {
        let mut ctx = ctx();
        let strategy = EndStrategy {
            date_offset: None,
            custom_era: Some(CustomEraStrategy {
                drug_codeset_id: Some(2),
                gap_days: 5,
                offset: 0,
                days_supply_override: None,
            }),
        };
        let out =
            apply_end_strategy(Relation::events("SELECT 1"), Some(&strategy), &mut ctx).unwrap();
        let sql = out.sql();
        assert_eq!(out.columns(), EVENT_COLUMNS);
        assert!(sql.contains("de.drug_concept_id IN"));
        assert!(sql.contains("de.drug_source_concept_id IN"));
        assert!(sql.contains("COALESCE(de.drug_exposure_end_date"));
        assert!(sql.contains("ROWS BETWEEN UNBOUNDED PRECEDING AND 1 PRECEDING"));
        assert!(sql.contains("R.era_end AS end_date"));
        assert!(sql.contains("E.start_date >= R.era_start"));
    }

    #[test]
    fn custom_era_without_codeset_fails() {
        let mut ctx = ctx();
        let strategy = EndStrategy {
            date_offset: None,
            custom_era: Some(CustomEraStrategy::default()),
        };
        let err =
            apply_end_strategy(Relation::events("SELECT 1"), Some(&strategy), &mut ctx).unwrap_err();
        assert!(matches!(err, CohortError::InvalidExpression { .. }));
    }

    #[test]
    fn days_supply_override_replaces_the_coalesce_chain() {
        let mut ctx = ctx();
        let strategy = EndStrategy {
            date_offset: None,
            custom_era: Some(CustomEraStrategy {
                drug_codeset_id: Some(2),
                gap_days: 0,
                offset: 0,
                days_supply_override: Some(90),
            }),
        };
        let out =
            apply_end_strategy(Relation::events("SELECT 1"), Some(&strategy), &mut ctx).unwrap();
        assert!(out.sql().contains("(de.drug_exposure_start_date + (90))"));
        assert!(!out.sql().contains("COALESCE(de.drug_exposure_end_date"));
    }
}
