//! Builders for the interval domains: eras, periods, and visits. These
//! sources carry real end dates, length filters, and (for the periods) an
//! optional user-defined override window.

use chrono::NaiveDate;

use crate::context::BuildContext;
use crate::error::CohortError;
use crate::models::domains::{
    ConditionEra, DoseEra, DrugEra, ObservationPeriod, PayerPlanPeriod, UserDefinedPeriod,
    VisitDetail, VisitOccurrence,
};
use crate::sql::{Relation, SelectBuilder};

use super::filters::{
    apply_care_site_place_of_service, apply_codeset_filter, apply_concept_list,
    apply_concept_set_selection, apply_date_range, apply_interval_range, apply_location_region,
    apply_numeric_range, apply_provider_specialty, retain_first, standardize, PersonJoin,
};

fn scan(ctx: &BuildContext, table: &str, alias: &str) -> SelectBuilder {
    let mut q = SelectBuilder::from_clause(format!("{} {alias}", ctx.cdm_table(table)));
    q.select(format!("{alias}.*"));
    q
}

/// Rows must contain the override dates; the overridden endpoints become
/// the emitted event dates.
fn apply_user_defined_period(
    q: &mut SelectBuilder,
    ctx: &BuildContext,
    alias: &str,
    start_column: &str,
    end_column: &str,
    period: Option<&UserDefinedPeriod>,
) -> (String, String) {
    let mut start = start_column.to_string();
    let mut end = end_column.to_string();
    let Some(period) = period else {
        return (start, end);
    };
    let literal = |date: &NaiveDate| {
        ctx.dialect()
            .date_literal(&date.format("%Y-%m-%d").to_string())
    };
    if let Some(date) = &period.start_date {
        let lit = literal(date);
        q.filter(format!("{alias}.{start_column} <= {lit}"));
        q.filter(format!("{alias}.{end_column} >= {lit}"));
        q.select(format!("{lit} AS udp_start_date"));
        start = "udp_start_date".to_string();
    }
    if let Some(date) = &period.end_date {
        let lit = literal(date);
        q.filter(format!("{alias}.{start_column} <= {lit}"));
        q.filter(format!("{alias}.{end_column} >= {lit}"));
        q.select(format!("{lit} AS udp_end_date"));
        end = "udp_end_date".to_string();
    }
    (start, end)
}

pub fn condition_era(c: &ConditionEra, ctx: &mut BuildContext) -> Result<Relation, CohortError> {
    let d = ctx.dialect();
    let mut q = scan(ctx, "condition_era", "ce");
    apply_codeset_filter(&mut q, ctx, "ce.condition_concept_id", c.codeset_id);
    apply_date_range(&mut q, d, "ce.condition_era_start_date", c.era_start_date.as_ref())?;
    apply_date_range(&mut q, d, "ce.condition_era_end_date", c.era_end_date.as_ref())?;
    apply_numeric_range(&mut q, "ce.condition_occurrence_count", c.occurrence_count.as_ref())?;
    apply_interval_range(
        &mut q,
        d,
        "ce.condition_era_start_date",
        "ce.condition_era_end_date",
        c.era_length.as_ref(),
    )?;

    let mut person = PersonJoin::new();
    person.apply_age(&mut q, ctx, "ce", "ce.condition_era_start_date", c.age_at_start.as_ref())?;
    person.apply_age(&mut q, ctx, "ce", "ce.condition_era_end_date", c.age_at_end.as_ref())?;
    person.apply_concept(&mut q, ctx, "ce", "gender_concept_id", &c.gender, c.gender_cs.as_ref());

    if c.first.unwrap_or(false) {
        q = retain_first(q, "ce", "condition_era_start_date", "condition_era_id");
    }

    Ok(standardize(
        q,
        d,
        "condition_era_id",
        "condition_era_start_date",
        "condition_era_end_date",
        None,
    ))
}

pub fn drug_era(c: &DrugEra, ctx: &mut BuildContext) -> Result<Relation, CohortError> {
    let d = ctx.dialect();
    let mut q = scan(ctx, "drug_era", "dre");
    apply_codeset_filter(&mut q, ctx, "dre.drug_concept_id", c.codeset_id);
    apply_date_range(&mut q, d, "dre.drug_era_start_date", c.era_start_date.as_ref())?;
    apply_date_range(&mut q, d, "dre.drug_era_end_date", c.era_end_date.as_ref())?;
    apply_numeric_range(&mut q, "dre.drug_exposure_count", c.occurrence_count.as_ref())?;
    apply_numeric_range(&mut q, "dre.gap_days", c.gap_days.as_ref())?;
    apply_interval_range(
        &mut q,
        d,
        "dre.drug_era_start_date",
        "dre.drug_era_end_date",
        c.era_length.as_ref(),
    )?;

    let mut person = PersonJoin::new();
    person.apply_age(&mut q, ctx, "dre", "dre.drug_era_start_date", c.age_at_start.as_ref())?;
    person.apply_age(&mut q, ctx, "dre", "dre.drug_era_end_date", c.age_at_end.as_ref())?;
    person.apply_concept(&mut q, ctx, "dre", "gender_concept_id", &c.gender, c.gender_cs.as_ref());

    if c.first.unwrap_or(false) {
        q = retain_first(q, "dre", "drug_era_start_date", "drug_era_id");
    }

    Ok(standardize(
        q,
        d,
        "drug_era_id",
        "drug_era_start_date",
        "drug_era_end_date",
        None,
    ))
}

pub fn dose_era(c: &DoseEra, ctx: &mut BuildContext) -> Result<Relation, CohortError> {
    let d = ctx.dialect();
    let mut q = scan(ctx, "dose_era", "doe");
    apply_codeset_filter(&mut q, ctx, "doe.drug_concept_id", c.codeset_id);
    apply_date_range(&mut q, d, "doe.dose_era_start_date", c.era_start_date.as_ref())?;
    apply_date_range(&mut q, d, "doe.dose_era_end_date", c.era_end_date.as_ref())?;
    apply_concept_list(&mut q, d, "doe.unit_concept_id", &c.unit, false);
    apply_concept_set_selection(&mut q, ctx, "doe.unit_concept_id", c.unit_cs.as_ref());
    apply_numeric_range(&mut q, "doe.dose_value", c.dose_value.as_ref())?;
    apply_interval_range(
        &mut q,
        d,
        "doe.dose_era_start_date",
        "doe.dose_era_end_date",
        c.era_length.as_ref(),
    )?;

    let mut person = PersonJoin::new();
    person.apply_age(&mut q, ctx, "doe", "doe.dose_era_start_date", c.age_at_start.as_ref())?;
    person.apply_age(&mut q, ctx, "doe", "doe.dose_era_end_date", c.age_at_end.as_ref())?;
    person.apply_concept(&mut q, ctx, "doe", "gender_concept_id", &c.gender, c.gender_cs.as_ref());

    if c.first.unwrap_or(false) {
        q = retain_first(q, "doe", "dose_era_start_date", "dose_era_id");
    }

    Ok(standardize(
        q,
        d,
        "dose_era_id",
        "dose_era_start_date",
        "dose_era_end_date",
        None,
    ))
}

pub fn observation_period(
    c: &ObservationPeriod,
    ctx: &mut BuildContext,
) -> Result<Relation, CohortError> {
    let d = ctx.dialect();
    let mut q = scan(ctx, "observation_period", "op");
    apply_date_range(&mut q, d, "op.observation_period_start_date", c.period_start_date.as_ref())?;
    apply_date_range(&mut q, d, "op.observation_period_end_date", c.period_end_date.as_ref())?;
    apply_concept_list(&mut q, d, "op.period_type_concept_id", &c.period_type, false);
    apply_concept_set_selection(&mut q, ctx, "op.period_type_concept_id", c.period_type_cs.as_ref());
    apply_interval_range(
        &mut q,
        d,
        "op.observation_period_start_date",
        "op.observation_period_end_date",
        c.period_length.as_ref(),
    )?;

    let mut person = PersonJoin::new();
    person.apply_age(&mut q, ctx, "op", "op.observation_period_start_date", c.age_at_start.as_ref())?;
    person.apply_age(&mut q, ctx, "op", "op.observation_period_end_date", c.age_at_end.as_ref())?;

    let (start, end) = apply_user_defined_period(
        &mut q,
        ctx,
        "op",
        "observation_period_start_date",
        "observation_period_end_date",
        c.user_defined_period.as_ref(),
    );

    if c.first.unwrap_or(false) {
        // An overridden start is the same literal on every row, so the
        // earliest row is decided by the primary key.
        let order_column = if start == "observation_period_start_date" {
            "observation_period_start_date"
        } else {
            "observation_period_id"
        };
        q = retain_first(q, "op", order_column, "observation_period_id");
    }

    Ok(standardize(q, d, "observation_period_id", &start, &end, None))
}

pub fn payer_plan_period(
    c: &PayerPlanPeriod,
    ctx: &mut BuildContext,
) -> Result<Relation, CohortError> {
    let d = ctx.dialect();
    let mut q = scan(ctx, "payer_plan_period", "ppp");
    apply_date_range(&mut q, d, "ppp.payer_plan_period_start_date", c.period_start_date.as_ref())?;
    apply_date_range(&mut q, d, "ppp.payer_plan_period_end_date", c.period_end_date.as_ref())?;
    apply_interval_range(
        &mut q,
        d,
        "ppp.payer_plan_period_start_date",
        "ppp.payer_plan_period_end_date",
        c.period_length.as_ref(),
    )?;

    let mut person = PersonJoin::new();
    person.apply_age(&mut q, ctx, "ppp", "ppp.payer_plan_period_start_date", c.age_at_start.as_ref())?;
    person.apply_age(&mut q, ctx, "ppp", "ppp.payer_plan_period_end_date", c.age_at_end.as_ref())?;
    person.apply_concept(&mut q, ctx, "ppp", "gender_concept_id", &c.gender, c.gender_cs.as_ref());

    for (column, codeset_id) in [
        ("ppp.payer_concept_id", c.payer_concept),
        ("ppp.plan_concept_id", c.plan_concept),
        ("ppp.sponsor_concept_id", c.sponsor_concept),
        ("ppp.stop_reason_concept_id", c.stop_reason_concept),
        ("ppp.payer_source_concept_id", c.payer_source_concept),
        ("ppp.plan_source_concept_id", c.plan_source_concept),
        ("ppp.sponsor_source_concept_id", c.sponsor_source_concept),
        ("ppp.stop_reason_source_concept_id", c.stop_reason_source_concept),
    ] {
        apply_codeset_filter(&mut q, ctx, column, codeset_id);
    }

    let (start, end) = apply_user_defined_period(
        &mut q,
        ctx,
        "ppp",
        "payer_plan_period_start_date",
        "payer_plan_period_end_date",
        c.user_defined_period.as_ref(),
    );

    if c.first.unwrap_or(false) {
        let order_column = if start == "payer_plan_period_start_date" {
            "payer_plan_period_start_date"
        } else {
            "payer_plan_period_id"
        };
        q = retain_first(q, "ppp", order_column, "payer_plan_period_id");
    }

    Ok(standardize(q, d, "payer_plan_period_id", &start, &end, None))
}

pub fn visit_occurrence(
    c: &VisitOccurrence,
    ctx: &mut BuildContext,
) -> Result<Relation, CohortError> {
    let d = ctx.dialect();
    let mut q = scan(ctx, "visit_occurrence", "vo");
    apply_codeset_filter(&mut q, ctx, "vo.visit_concept_id", c.codeset_id);
    apply_date_range(&mut q, d, "vo.visit_start_date", c.occurrence_start_date.as_ref())?;
    apply_date_range(&mut q, d, "vo.visit_end_date", c.occurrence_end_date.as_ref())?;

    apply_concept_list(
        &mut q,
        d,
        "vo.visit_type_concept_id",
        &c.visit_type,
        c.visit_type_exclude.unwrap_or(false),
    );
    apply_concept_set_selection(&mut q, ctx, "vo.visit_type_concept_id", c.visit_type_cs.as_ref());
    apply_provider_specialty(&mut q, ctx, "vo", &c.provider_specialty, c.provider_specialty_cs.as_ref());
    apply_care_site_place_of_service(&mut q, ctx, "vo", &c.place_of_service, c.place_of_service_cs.as_ref());
    // Visit length is the span of the visit in days.
    apply_interval_range(
        &mut q,
        d,
        "vo.visit_start_date",
        "vo.visit_end_date",
        c.visit_length.as_ref(),
    )?;

    let mut person = PersonJoin::new();
    person.apply_age(&mut q, ctx, "vo", "vo.visit_start_date", c.age.as_ref())?;
    person.apply_concept(&mut q, ctx, "vo", "gender_concept_id", &c.gender, c.gender_cs.as_ref());

    apply_codeset_filter(&mut q, ctx, "vo.visit_source_concept_id", c.visit_source_concept);

    if c.first.unwrap_or(false) {
        q = retain_first(q, "vo", "visit_start_date", "visit_occurrence_id");
    }

    Ok(standardize(
        q,
        d,
        "visit_occurrence_id",
        "visit_start_date",
        "visit_end_date",
        Some("visit_occurrence_id"),
    ))
}

pub fn visit_detail(c: &VisitDetail, ctx: &mut BuildContext) -> Result<Relation, CohortError> {
    let d = ctx.dialect();
    let mut q = scan(ctx, "visit_detail", "vd");
    apply_codeset_filter(&mut q, ctx, "vd.visit_detail_concept_id", c.codeset_id);
    if c.first.unwrap_or(false) {
        q = retain_first(q, "vd", "visit_detail_start_date", "visit_detail_id");
    }

    apply_date_range(&mut q, d, "vd.visit_detail_start_date", c.visit_detail_start_date.as_ref())?;
    apply_date_range(&mut q, d, "vd.visit_detail_end_date", c.visit_detail_end_date.as_ref())?;
    apply_concept_set_selection(&mut q, ctx, "vd.visit_detail_type_concept_id", c.visit_detail_type_cs.as_ref());
    apply_codeset_filter(
        &mut q,
        ctx,
        "vd.visit_detail_source_concept_id",
        c.visit_detail_source_concept,
    );
    apply_interval_range(
        &mut q,
        d,
        "vd.visit_detail_start_date",
        "vd.visit_detail_end_date",
        c.visit_detail_length.as_ref(),
    )?;

    let mut person = PersonJoin::new();
    person.apply_age(&mut q, ctx, "vd", "vd.visit_detail_end_date", c.age.as_ref())?;
    person.apply_concept(&mut q, ctx, "vd", "gender_concept_id", &[], c.gender_cs.as_ref());
    apply_provider_specialty(&mut q, ctx, "vd", &[], c.provider_specialty_cs.as_ref());
    apply_care_site_place_of_service(&mut q, ctx, "vd", &[], c.place_of_service_cs.as_ref());
    apply_location_region(
        &mut q,
        ctx,
        "vd",
        "visit_detail_start_date",
        "visit_detail_end_date",
        c.place_of_service_location,
    );

    Ok(standardize(
        q,
        d,
        "visit_detail_id",
        "visit_detail_start_date",
        "visit_detail_end_date",
        Some("visit_occurrence_id"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BuildOptions;
    use crate::models::{NumericRange, RangeOp};
    use crate::sql::EVENT_COLUMNS;

    fn ctx<'a>() -> BuildContext<'a> {
        BuildContext::compile_only(BuildOptions::default(), &[])
    }

    #[test]
    fn era_length_compares_span_in_days() {
        let mut ctx = ctx();
        let c = ConditionEra {
            era_length: Some(NumericRange {
                value: Some(serde_json::Number::from(30)),
                op: Some(RangeOp::Gte),
                extent: None,
            }),
            ..ConditionEra::default()
        };
        let rel = condition_era(&c, &mut ctx).unwrap();
        assert!(rel
            .sql()
            .contains("ce.condition_era_end_date >= (ce.condition_era_start_date + (30))"));
    }

    #[test]
    fn visit_occurrence_emits_its_own_id_as_visit() {
        let mut ctx = ctx();
        let rel = visit_occurrence(&VisitOccurrence::default(), &mut ctx).unwrap();
        assert_eq!(rel.columns(), EVENT_COLUMNS);
        assert!(rel
            .sql()
            .contains("CAST(src.visit_occurrence_id AS BIGINT) AS visit_occurrence_id"));
    }

    #[test]
    fn user_defined_period_overrides_endpoints() {
        let mut ctx = ctx();
        let c = ObservationPeriod {
            user_defined_period: Some(UserDefinedPeriod {
                start_date: NaiveDate::from_ymd_opt(2020, 1, 1),
                end_date: None,
            }),
            ..ObservationPeriod::default()
        };
        let rel = observation_period(&c, &mut ctx).unwrap();
        let sql = rel.sql();
        assert!(sql.contains("DATE '2020-01-01' AS udp_start_date"));
        assert!(sql.contains("op.observation_period_start_date <= DATE '2020-01-01'"));
        assert!(sql.contains("op.observation_period_end_date >= DATE '2020-01-01'"));
        assert!(sql.contains("src.udp_start_date AS start_date"));
    }

    #[test]
    fn payer_plan_codeset_filters_hit_every_concept_column() {
        let mut ctx = ctx();
        let c = PayerPlanPeriod {
            payer_concept: Some(11),
            plan_source_concept: Some(12),
            ..PayerPlanPeriod::default()
        };
        let rel = payer_plan_period(&c, &mut ctx).unwrap();
        assert!(rel.sql().contains("ppp.payer_concept_id IN"));
        assert!(rel.sql().contains("ppp.plan_source_concept_id IN"));
    }

    #[test]
    fn visit_detail_region_filter_walks_location_history() {
        let mut ctx = ctx();
        let c = VisitDetail {
            place_of_service_location: Some(5),
            ..VisitDetail::default()
        };
        let rel = visit_detail(&c, &mut ctx).unwrap();
        let sql = rel.sql();
        assert!(sql.contains("location_history"));
        assert!(sql.contains("'CARE_SITE'"));
        assert!(sql.contains("loc.region_concept_id IN"));
    }
}
