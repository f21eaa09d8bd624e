//! Builders for the point-event domains: rows keyed by an occurrence id
//! whose end date either exists on the row or collapses to the start date.

use crate::context::BuildContext;
use crate::error::CohortError;
use crate::models::criteria::concept_ids;
use crate::models::domains::{
    ConditionOccurrence, Death, DeviceExposure, DrugExposure, Measurement, Observation,
    ProcedureOccurrence, Specimen,
};
use crate::models::{Concept, ConceptSetSelection, SourceConceptFilter};
use crate::sql::{Relation, SelectBuilder};

use super::filters::{
    apply_codeset_filter, apply_concept_list, apply_concept_set_selection, apply_date_range,
    apply_numeric_range, apply_provider_specialty, apply_text_filter, retain_first, standardize,
    PersonJoin, VisitJoin,
};

fn scan(ctx: &BuildContext, table: &str, alias: &str) -> SelectBuilder {
    let mut q = SelectBuilder::from_clause(format!("{} {alias}", ctx.cdm_table(table)));
    q.select(format!("{alias}.*"));
    q
}

/// Integer source concepts on this domain name a codeset.
fn source_as_codeset(filter: &Option<SourceConceptFilter>) -> Option<ConceptSetSelection> {
    match filter {
        Some(SourceConceptFilter::Concept(id)) => Some(ConceptSetSelection::from_codeset(*id)),
        Some(SourceConceptFilter::Selection(selection)) => Some(selection.clone()),
        None => None,
    }
}

pub fn condition_occurrence(
    c: &ConditionOccurrence,
    ctx: &mut BuildContext,
) -> Result<Relation, CohortError> {
    let d = ctx.dialect();
    let mut q = scan(ctx, "condition_occurrence", "co");
    apply_codeset_filter(&mut q, ctx, "co.condition_concept_id", c.codeset_id);

    apply_date_range(&mut q, d, "co.condition_start_date", c.occurrence_start_date.as_ref())?;
    apply_date_range(&mut q, d, "co.condition_end_date", c.occurrence_end_date.as_ref())?;

    apply_concept_list(&mut q, d, "co.condition_type_concept_id", &c.condition_type, false);
    apply_concept_set_selection(&mut q, ctx, "co.condition_type_concept_id", c.condition_type_cs.as_ref());
    if c.condition_type_exclude.unwrap_or(false) {
        apply_concept_list(&mut q, d, "co.condition_type_concept_id", &c.condition_type, true);
    }
    apply_text_filter(&mut q, "co.stop_reason", c.stop_reason.as_ref());

    let mut person = PersonJoin::new();
    person.apply_age(&mut q, ctx, "co", "co.condition_start_date", c.age.as_ref())?;
    person.apply_concept(&mut q, ctx, "co", "gender_concept_id", &c.gender, c.gender_cs.as_ref());

    apply_concept_set_selection(
        &mut q,
        ctx,
        "co.condition_source_concept_id",
        source_as_codeset(&c.condition_source_concept).as_ref(),
    );
    apply_provider_specialty(&mut q, ctx, "co", &c.provider_specialty, c.provider_specialty_cs.as_ref());

    let mut visit = VisitJoin::new();
    visit.apply_visit_type(&mut q, ctx, "co", &c.visit_type, c.visit_type_cs.as_ref());
    visit.apply_visit_source(&mut q, ctx, "co", c.visit_source_concept);

    if c.first.unwrap_or(false) {
        q = retain_first(q, "co", "condition_start_date", "condition_occurrence_id");
    }

    Ok(standardize(
        q,
        d,
        "condition_occurrence_id",
        "condition_start_date",
        "condition_end_date",
        Some("visit_occurrence_id"),
    ))
}

pub fn drug_exposure(c: &DrugExposure, ctx: &mut BuildContext) -> Result<Relation, CohortError> {
    let d = ctx.dialect();
    let mut q = scan(ctx, "drug_exposure", "de");
    apply_codeset_filter(&mut q, ctx, "de.drug_concept_id", c.codeset_id);
    if c.first.unwrap_or(false) {
        q = retain_first(q, "de", "drug_exposure_start_date", "drug_exposure_id");
    }

    apply_date_range(&mut q, d, "de.drug_exposure_start_date", c.occurrence_start_date.as_ref())?;
    apply_date_range(&mut q, d, "de.drug_exposure_end_date", c.occurrence_end_date.as_ref())?;

    apply_concept_list(
        &mut q,
        d,
        "de.drug_type_concept_id",
        &c.drug_type,
        c.drug_type_exclude.unwrap_or(false),
    );
    apply_concept_set_selection(&mut q, ctx, "de.drug_type_concept_id", c.drug_type_cs.as_ref());
    apply_concept_list(&mut q, d, "de.route_concept_id", &c.route_concept, false);
    apply_concept_set_selection(&mut q, ctx, "de.route_concept_id", c.route_concept_cs.as_ref());
    apply_concept_list(&mut q, d, "de.dose_unit_concept_id", &c.dose_unit, false);
    apply_concept_set_selection(&mut q, ctx, "de.dose_unit_concept_id", c.dose_unit_cs.as_ref());

    apply_numeric_range(&mut q, "de.quantity", c.quantity.as_ref())?;
    apply_numeric_range(&mut q, "de.days_supply", c.days_supply.as_ref())?;
    apply_numeric_range(&mut q, "de.refills", c.refills.as_ref())?;
    apply_text_filter(&mut q, "de.stop_reason", c.stop_reason.as_ref());
    apply_text_filter(&mut q, "de.lot_number", c.lot_number.as_ref());

    let mut person = PersonJoin::new();
    person.apply_age(&mut q, ctx, "de", "de.drug_exposure_start_date", c.age.as_ref())?;
    person.apply_concept(&mut q, ctx, "de", "gender_concept_id", &c.gender, c.gender_cs.as_ref());
    apply_provider_specialty(&mut q, ctx, "de", &c.provider_specialty, c.provider_specialty_cs.as_ref());

    let mut visit = VisitJoin::new();
    visit.apply_visit_type(&mut q, ctx, "de", &c.visit_type, c.visit_type_cs.as_ref());

    apply_concept_set_selection(
        &mut q,
        ctx,
        "de.drug_source_concept_id",
        source_as_codeset(&c.drug_source_concept).as_ref(),
    );

    Ok(standardize(
        q,
        d,
        "drug_exposure_id",
        "drug_exposure_start_date",
        "drug_exposure_end_date",
        Some("visit_occurrence_id"),
    ))
}

/// Whitelisted unit conversions: (unit concept id, scale group, multiplier).
/// Normalization applies only when every referenced unit sits in a single
/// group; otherwise values are compared in their native units.
const UNIT_NORMALIZATION: [(i64, &str, f64); 9] = [
    (9529, "mass_kg", 1.0),        // kilogram
    (3195625, "mass_kg", 0.45359237), // pound
    (9444, "count_10e9_per_l", 1.0),
    (44777588, "count_10e9_per_l", 1.0),
    (8848, "count_10e9_per_l", 1.0),  // thousand per microliter
    (8816, "count_10e9_per_l", 1.0),  // million per milliliter
    (8961, "count_10e9_per_l", 1.0),  // thousand per cubic millimeter
    (8784, "count_10e9_per_l", 0.001), // cells per microliter
    (8647, "count_10e9_per_l", 0.001), // per microliter
];

fn normalized_value_expr(units: &[Concept]) -> Option<String> {
    let unit_ids = concept_ids(units);
    if unit_ids.is_empty() {
        return None;
    }
    let mut group: Option<&str> = None;
    let mut cases = String::new();
    for unit_id in &unit_ids {
        let (_, unit_group, multiplier) =
            UNIT_NORMALIZATION.iter().find(|(id, _, _)| id == unit_id)?;
        match group {
            None => group = Some(*unit_group),
            Some(existing) if existing == *unit_group => {}
            Some(_) => return None,
        }
        cases.push_str(&format!(
            " WHEN m.unit_concept_id = {unit_id} THEN {multiplier}"
        ));
    }
    Some(format!("(m.value_as_number * CASE{cases} ELSE 1 END)"))
}

pub fn measurement(c: &Measurement, ctx: &mut BuildContext) -> Result<Relation, CohortError> {
    let d = ctx.dialect();
    let mut q = scan(ctx, "measurement", "m");
    apply_codeset_filter(&mut q, ctx, "m.measurement_concept_id", c.codeset_id);
    if c.first.unwrap_or(false) {
        q = retain_first(q, "m", "measurement_date", "measurement_id");
    }

    apply_date_range(&mut q, d, "m.measurement_date", c.occurrence_start_date.as_ref())?;
    apply_date_range(&mut q, d, "m.measurement_date", c.occurrence_end_date.as_ref())?;

    apply_concept_list(&mut q, d, "m.measurement_type_concept_id", &c.measurement_type, false);
    apply_concept_set_selection(&mut q, ctx, "m.measurement_type_concept_id", c.measurement_type_cs.as_ref());
    if c.measurement_type_exclude.unwrap_or(false) {
        apply_concept_list(&mut q, d, "m.measurement_type_concept_id", &c.measurement_type, true);
    }
    apply_concept_list(&mut q, d, "m.operator_concept_id", &c.operator_concept, false);
    apply_concept_set_selection(&mut q, ctx, "m.operator_concept_id", c.operator_concept_cs.as_ref());

    let mut value_expr = "m.value_as_number".to_string();
    if !c.unit.is_empty() {
        apply_concept_list(&mut q, d, "m.unit_concept_id", &c.unit, false);
        if let Some(normalized) = normalized_value_expr(&c.unit) {
            value_expr = normalized;
        }
    }
    apply_concept_set_selection(&mut q, ctx, "m.unit_concept_id", c.unit_cs.as_ref());

    apply_concept_list(&mut q, d, "m.value_as_concept_id", &c.value_as_concept, false);
    apply_concept_set_selection(&mut q, ctx, "m.value_as_concept_id", c.value_as_concept_cs.as_ref());

    apply_numeric_range(&mut q, &value_expr, c.value_as_number.as_ref())?;
    apply_numeric_range(&mut q, "m.range_low", c.range_low.as_ref())?;
    apply_numeric_range(&mut q, "m.range_high", c.range_high.as_ref())?;
    // Ratio filters relate the value to the row's own reference range.
    apply_numeric_range(
        &mut q,
        "(m.value_as_number / m.range_low)",
        c.range_low_ratio.as_ref(),
    )?;
    apply_numeric_range(
        &mut q,
        "(m.value_as_number / m.range_high)",
        c.range_high_ratio.as_ref(),
    )?;

    let mut person = PersonJoin::new();
    person.apply_age(&mut q, ctx, "m", "m.measurement_date", c.age.as_ref())?;
    person.apply_concept(&mut q, ctx, "m", "gender_concept_id", &c.gender, c.gender_cs.as_ref());
    apply_provider_specialty(&mut q, ctx, "m", &c.provider_specialty, c.provider_specialty_cs.as_ref());

    let mut visit = VisitJoin::new();
    visit.apply_visit_type(&mut q, ctx, "m", &c.visit_type, c.visit_type_cs.as_ref());

    // An integer here is a literal source concept id, not a codeset.
    match &c.measurement_source_concept {
        Some(SourceConceptFilter::Concept(id)) => {
            q.filter(format!("m.measurement_source_concept_id = {id}"));
        }
        Some(SourceConceptFilter::Selection(selection)) => {
            apply_concept_set_selection(
                &mut q,
                ctx,
                "m.measurement_source_concept_id",
                Some(selection),
            );
        }
        None => {}
    }

    Ok(standardize(
        q,
        d,
        "measurement_id",
        "measurement_date",
        "measurement_date",
        Some("visit_occurrence_id"),
    ))
}

pub fn observation(c: &Observation, ctx: &mut BuildContext) -> Result<Relation, CohortError> {
    let d = ctx.dialect();
    let mut q = scan(ctx, "observation", "o");
    apply_codeset_filter(&mut q, ctx, "o.observation_concept_id", c.codeset_id);

    apply_date_range(&mut q, d, "o.observation_date", c.occurrence_start_date.as_ref())?;
    apply_date_range(&mut q, d, "o.observation_date", c.occurrence_end_date.as_ref())?;

    apply_concept_list(&mut q, d, "o.observation_type_concept_id", &c.observation_type, false);
    apply_concept_set_selection(&mut q, ctx, "o.observation_type_concept_id", c.observation_type_cs.as_ref());
    if c.observation_type_exclude.unwrap_or(false) {
        apply_concept_list(&mut q, d, "o.observation_type_concept_id", &c.observation_type, true);
    }

    apply_concept_list(&mut q, d, "o.qualifier_concept_id", &c.qualifier, false);
    apply_concept_set_selection(&mut q, ctx, "o.qualifier_concept_id", c.qualifier_cs.as_ref());
    apply_concept_list(&mut q, d, "o.unit_concept_id", &c.unit, false);
    apply_concept_set_selection(&mut q, ctx, "o.unit_concept_id", c.unit_cs.as_ref());
    apply_concept_list(&mut q, d, "o.value_as_concept_id", &c.value_as_concept, false);
    apply_concept_set_selection(&mut q, ctx, "o.value_as_concept_id", c.value_as_concept_cs.as_ref());
    apply_numeric_range(&mut q, "o.value_as_number", c.value_as_number.as_ref())?;
    apply_text_filter(&mut q, "o.value_as_string", c.value_as_string.as_ref());

    let mut person = PersonJoin::new();
    person.apply_age(&mut q, ctx, "o", "o.observation_date", c.age.as_ref())?;
    person.apply_concept(&mut q, ctx, "o", "gender_concept_id", &c.gender, c.gender_cs.as_ref());
    apply_provider_specialty(&mut q, ctx, "o", &c.provider_specialty, c.provider_specialty_cs.as_ref());

    let mut visit = VisitJoin::new();
    visit.apply_visit_type(&mut q, ctx, "o", &c.visit_type, c.visit_type_cs.as_ref());

    match &c.observation_source_concept {
        Some(SourceConceptFilter::Concept(id)) => {
            q.filter(format!("o.observation_source_concept_id = {id}"));
        }
        Some(SourceConceptFilter::Selection(selection)) => {
            apply_concept_set_selection(
                &mut q,
                ctx,
                "o.observation_source_concept_id",
                Some(selection),
            );
        }
        None => {}
    }

    if c.first.unwrap_or(false) {
        q = retain_first(q, "o", "observation_date", "observation_id");
    }

    Ok(standardize(
        q,
        d,
        "observation_id",
        "observation_date",
        "observation_date",
        Some("visit_occurrence_id"),
    ))
}

pub fn procedure_occurrence(
    c: &ProcedureOccurrence,
    ctx: &mut BuildContext,
) -> Result<Relation, CohortError> {
    let d = ctx.dialect();
    let mut q = scan(ctx, "procedure_occurrence", "po");
    apply_codeset_filter(&mut q, ctx, "po.procedure_concept_id", c.codeset_id);
    if c.first.unwrap_or(false) {
        q = retain_first(q, "po", "procedure_date", "procedure_occurrence_id");
    }

    apply_date_range(&mut q, d, "po.procedure_date", c.occurrence_start_date.as_ref())?;
    apply_date_range(&mut q, d, "po.procedure_date", c.occurrence_end_date.as_ref())?;

    apply_concept_list(&mut q, d, "po.procedure_type_concept_id", &c.procedure_type, false);
    apply_concept_set_selection(&mut q, ctx, "po.procedure_type_concept_id", c.procedure_type_cs.as_ref());
    if c.procedure_type_exclude.unwrap_or(false) {
        apply_concept_list(&mut q, d, "po.procedure_type_concept_id", &c.procedure_type, true);
    }
    apply_concept_list(&mut q, d, "po.modifier_concept_id", &c.modifier, false);
    apply_concept_set_selection(&mut q, ctx, "po.modifier_concept_id", c.modifier_cs.as_ref());
    apply_numeric_range(&mut q, "po.quantity", c.quantity.as_ref())?;

    let mut person = PersonJoin::new();
    person.apply_age(&mut q, ctx, "po", "po.procedure_date", c.age.as_ref())?;
    person.apply_concept(&mut q, ctx, "po", "gender_concept_id", &c.gender, c.gender_cs.as_ref());
    apply_provider_specialty(&mut q, ctx, "po", &c.provider_specialty, c.provider_specialty_cs.as_ref());

    let mut visit = VisitJoin::new();
    visit.apply_visit_type(&mut q, ctx, "po", &c.visit_type, c.visit_type_cs.as_ref());

    apply_concept_set_selection(
        &mut q,
        ctx,
        "po.procedure_source_concept_id",
        source_as_codeset(&c.procedure_source_concept).as_ref(),
    );

    Ok(standardize(
        q,
        d,
        "procedure_occurrence_id",
        "procedure_date",
        "procedure_date",
        Some("visit_occurrence_id"),
    ))
}

pub fn device_exposure(c: &DeviceExposure, ctx: &mut BuildContext) -> Result<Relation, CohortError> {
    let d = ctx.dialect();
    let mut q = scan(ctx, "device_exposure", "dev");
    apply_codeset_filter(&mut q, ctx, "dev.device_concept_id", c.codeset_id);

    apply_date_range(&mut q, d, "dev.device_exposure_start_date", c.occurrence_start_date.as_ref())?;
    apply_date_range(&mut q, d, "dev.device_exposure_end_date", c.occurrence_end_date.as_ref())?;

    apply_concept_list(&mut q, d, "dev.device_type_concept_id", &c.device_type, false);
    apply_concept_set_selection(&mut q, ctx, "dev.device_type_concept_id", c.device_type_cs.as_ref());
    if c.device_type_exclude.unwrap_or(false) {
        apply_concept_list(&mut q, d, "dev.device_type_concept_id", &c.device_type, true);
    }
    apply_numeric_range(&mut q, "dev.quantity", c.quantity.as_ref())?;
    apply_text_filter(&mut q, "dev.unique_device_id", c.unique_device_id.as_ref());

    let mut person = PersonJoin::new();
    person.apply_age(&mut q, ctx, "dev", "dev.device_exposure_start_date", c.age.as_ref())?;
    person.apply_concept(&mut q, ctx, "dev", "gender_concept_id", &c.gender, c.gender_cs.as_ref());
    apply_provider_specialty(&mut q, ctx, "dev", &c.provider_specialty, c.provider_specialty_cs.as_ref());

    let mut visit = VisitJoin::new();
    visit.apply_visit_type(&mut q, ctx, "dev", &c.visit_type, c.visit_type_cs.as_ref());

    apply_concept_set_selection(
        &mut q,
        ctx,
        "dev.device_source_concept_id",
        source_as_codeset(&c.device_source_concept).as_ref(),
    );

    if c.first.unwrap_or(false) {
        q = retain_first(q, "dev", "device_exposure_start_date", "device_exposure_id");
    }

    Ok(standardize(
        q,
        d,
        "device_exposure_id",
        "device_exposure_start_date",
        "device_exposure_end_date",
        Some("visit_occurrence_id"),
    ))
}

pub fn specimen(c: &Specimen, ctx: &mut BuildContext) -> Result<Relation, CohortError> {
    let d = ctx.dialect();
    let mut q = scan(ctx, "specimen", "sp");
    apply_codeset_filter(&mut q, ctx, "sp.specimen_concept_id", c.codeset_id);
    apply_date_range(&mut q, d, "sp.specimen_date", c.occurrence_start_date.as_ref())?;

    apply_concept_list(
        &mut q,
        d,
        "sp.specimen_type_concept_id",
        &c.specimen_type,
        c.specimen_type_exclude,
    );
    apply_concept_set_selection(&mut q, ctx, "sp.specimen_type_concept_id", c.specimen_type_cs.as_ref());
    apply_numeric_range(&mut q, "sp.quantity", c.quantity.as_ref())?;
    apply_concept_list(&mut q, d, "sp.unit_concept_id", &c.unit, false);
    apply_concept_set_selection(&mut q, ctx, "sp.unit_concept_id", c.unit_cs.as_ref());
    apply_concept_list(&mut q, d, "sp.anatomic_site_concept_id", &c.anatomic_site, false);
    apply_concept_set_selection(&mut q, ctx, "sp.anatomic_site_concept_id", c.anatomic_site_cs.as_ref());
    apply_concept_list(&mut q, d, "sp.disease_status_concept_id", &c.disease_status, false);
    apply_concept_set_selection(&mut q, ctx, "sp.disease_status_concept_id", c.disease_status_cs.as_ref());
    apply_text_filter(&mut q, "sp.specimen_source_id", c.source_id.as_ref());

    match &c.specimen_source_concept {
        Some(SourceConceptFilter::Concept(id)) => {
            q.filter(format!("sp.specimen_source_concept_id = {id}"));
        }
        Some(SourceConceptFilter::Selection(selection)) => {
            apply_concept_set_selection(&mut q, ctx, "sp.specimen_source_concept_id", Some(selection));
        }
        None => {}
    }

    let mut person = PersonJoin::new();
    person.apply_age(&mut q, ctx, "sp", "sp.specimen_date", c.age.as_ref())?;
    person.apply_concept(&mut q, ctx, "sp", "gender_concept_id", &c.gender, c.gender_cs.as_ref());

    if c.first.unwrap_or(false) {
        q = retain_first(q, "sp", "specimen_date", "specimen_id");
    }

    Ok(standardize(
        q,
        d,
        "specimen_id",
        "specimen_date",
        "specimen_date",
        None,
    ))
}

pub fn death(c: &Death, ctx: &mut BuildContext) -> Result<Relation, CohortError> {
    let d = ctx.dialect();
    let mut q = scan(ctx, "death", "dt");
    apply_codeset_filter(&mut q, ctx, "dt.cause_concept_id", c.codeset_id);
    apply_date_range(&mut q, d, "dt.death_date", c.occurrence_start_date.as_ref())?;

    apply_concept_list(
        &mut q,
        d,
        "dt.death_type_concept_id",
        &c.death_type,
        c.death_type_exclude.unwrap_or(false),
    );
    apply_concept_set_selection(&mut q, ctx, "dt.death_type_concept_id", c.death_type_cs.as_ref());
    apply_codeset_filter(&mut q, ctx, "dt.cause_source_concept_id", c.death_source_concept);

    let mut person = PersonJoin::new();
    person.apply_age(&mut q, ctx, "dt", "dt.death_date", c.age.as_ref())?;
    person.apply_concept(&mut q, ctx, "dt", "gender_concept_id", &c.gender, c.gender_cs.as_ref());

    // Death is keyed on person, so an ordinal row id is synthesized.
    q.select(
        "ROW_NUMBER() OVER (PARTITION BY dt.person_id ORDER BY dt.death_date) AS death_event_id",
    );

    Ok(standardize(
        q,
        d,
        "death_event_id",
        "death_date",
        "death_date",
        None,
    ))
}
