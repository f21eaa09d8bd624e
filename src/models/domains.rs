//! The fifteen domain criteria. Each struct mirrors one CDM domain table
//! and carries that domain's filterable attributes; `Criterion` is the
//! externally tagged sum the wire format uses (`{"ConditionOccurrence":
//! {…}}`).

use serde::{Deserialize, Serialize};

use super::criteria::{
    Concept, ConceptSetSelection, CriteriaGroup, DateAdjustment, DateRange, NumericRange,
    SourceConceptFilter, TextFilter,
};
use chrono::NaiveDate;

/// Optional absolute override window used by the period domains; a row must
/// contain the given dates, and the emitted endpoints become the literals.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserDefinedPeriod {
    #[serde(
        rename = "StartDate",
        default,
        skip_serializing_if = "Option::is_none",
        with = "super::wire_date"
    )]
    pub start_date: Option<NaiveDate>,
    #[serde(
        rename = "EndDate",
        default,
        skip_serializing_if = "Option::is_none",
        with = "super::wire_date"
    )]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConditionOccurrence {
    #[serde(rename = "CodesetId", default, skip_serializing_if = "Option::is_none")]
    pub codeset_id: Option<i64>,
    #[serde(rename = "First", default, skip_serializing_if = "Option::is_none")]
    pub first: Option<bool>,
    #[serde(
        rename = "OccurrenceStartDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub occurrence_start_date: Option<DateRange>,
    #[serde(
        rename = "OccurrenceEndDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub occurrence_end_date: Option<DateRange>,
    #[serde(rename = "ConditionType", default, skip_serializing_if = "Vec::is_empty")]
    pub condition_type: Vec<Concept>,
    #[serde(
        rename = "ConditionTypeCS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub condition_type_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "ConditionTypeExclude",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub condition_type_exclude: Option<bool>,
    #[serde(rename = "StopReason", default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<TextFilter>,
    #[serde(
        rename = "ConditionSourceConcept",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub condition_source_concept: Option<SourceConceptFilter>,
    #[serde(rename = "Age", default, skip_serializing_if = "Option::is_none")]
    pub age: Option<NumericRange>,
    #[serde(rename = "Gender", default, skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", default, skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "ProviderSpecialty",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub provider_specialty: Vec<Concept>,
    #[serde(
        rename = "ProviderSpecialtyCS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub provider_specialty_cs: Option<ConceptSetSelection>,
    #[serde(rename = "VisitType", default, skip_serializing_if = "Vec::is_empty")]
    pub visit_type: Vec<Concept>,
    #[serde(rename = "VisitTypeCS", default, skip_serializing_if = "Option::is_none")]
    pub visit_type_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "VisitSourceConcept",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub visit_source_concept: Option<i64>,
    #[serde(rename = "ConditionStatus", default, skip_serializing_if = "Vec::is_empty")]
    pub condition_status: Vec<Concept>,
    #[serde(
        rename = "ConditionStatusCS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub condition_status_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "CorrelatedCriteria",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlated_criteria: Option<CriteriaGroup>,
    #[serde(
        rename = "DateAdjustment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub date_adjustment: Option<DateAdjustment>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConditionEra {
    #[serde(rename = "CodesetId", default, skip_serializing_if = "Option::is_none")]
    pub codeset_id: Option<i64>,
    #[serde(rename = "First", default, skip_serializing_if = "Option::is_none")]
    pub first: Option<bool>,
    #[serde(rename = "EraStartDate", default, skip_serializing_if = "Option::is_none")]
    pub era_start_date: Option<DateRange>,
    #[serde(rename = "EraEndDate", default, skip_serializing_if = "Option::is_none")]
    pub era_end_date: Option<DateRange>,
    #[serde(
        rename = "OccurrenceCount",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub occurrence_count: Option<NumericRange>,
    #[serde(rename = "EraLength", default, skip_serializing_if = "Option::is_none")]
    pub era_length: Option<NumericRange>,
    #[serde(rename = "AgeAtStart", default, skip_serializing_if = "Option::is_none")]
    pub age_at_start: Option<NumericRange>,
    #[serde(rename = "AgeAtEnd", default, skip_serializing_if = "Option::is_none")]
    pub age_at_end: Option<NumericRange>,
    #[serde(rename = "Gender", default, skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", default, skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "CorrelatedCriteria",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlated_criteria: Option<CriteriaGroup>,
    #[serde(
        rename = "DateAdjustment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub date_adjustment: Option<DateAdjustment>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DrugExposure {
    #[serde(rename = "CodesetId", default, skip_serializing_if = "Option::is_none")]
    pub codeset_id: Option<i64>,
    #[serde(rename = "First", default, skip_serializing_if = "Option::is_none")]
    pub first: Option<bool>,
    #[serde(
        rename = "OccurrenceStartDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub occurrence_start_date: Option<DateRange>,
    #[serde(
        rename = "OccurrenceEndDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub occurrence_end_date: Option<DateRange>,
    #[serde(rename = "DrugType", default, skip_serializing_if = "Vec::is_empty")]
    pub drug_type: Vec<Concept>,
    #[serde(rename = "DrugTypeCS", default, skip_serializing_if = "Option::is_none")]
    pub drug_type_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "DrugTypeExclude",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub drug_type_exclude: Option<bool>,
    #[serde(rename = "RouteConcept", default, skip_serializing_if = "Vec::is_empty")]
    pub route_concept: Vec<Concept>,
    #[serde(
        rename = "RouteConceptCS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub route_concept_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "EffectiveDrugDose",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub effective_drug_dose: Option<NumericRange>,
    #[serde(rename = "DoseUnit", default, skip_serializing_if = "Vec::is_empty")]
    pub dose_unit: Vec<Concept>,
    #[serde(rename = "DoseUnitCS", default, skip_serializing_if = "Option::is_none")]
    pub dose_unit_cs: Option<ConceptSetSelection>,
    #[serde(rename = "Quantity", default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<NumericRange>,
    #[serde(rename = "DaysSupply", default, skip_serializing_if = "Option::is_none")]
    pub days_supply: Option<NumericRange>,
    #[serde(rename = "Refills", default, skip_serializing_if = "Option::is_none")]
    pub refills: Option<NumericRange>,
    #[serde(rename = "StopReason", default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<TextFilter>,
    #[serde(rename = "LotNumber", default, skip_serializing_if = "Option::is_none")]
    pub lot_number: Option<TextFilter>,
    #[serde(rename = "Age", default, skip_serializing_if = "Option::is_none")]
    pub age: Option<NumericRange>,
    #[serde(rename = "Gender", default, skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", default, skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "ProviderSpecialty",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub provider_specialty: Vec<Concept>,
    #[serde(
        rename = "ProviderSpecialtyCS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub provider_specialty_cs: Option<ConceptSetSelection>,
    #[serde(rename = "VisitType", default, skip_serializing_if = "Vec::is_empty")]
    pub visit_type: Vec<Concept>,
    #[serde(rename = "VisitTypeCS", default, skip_serializing_if = "Option::is_none")]
    pub visit_type_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "DrugSourceConcept",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub drug_source_concept: Option<SourceConceptFilter>,
    #[serde(
        rename = "CorrelatedCriteria",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlated_criteria: Option<CriteriaGroup>,
    #[serde(
        rename = "DateAdjustment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub date_adjustment: Option<DateAdjustment>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DrugEra {
    #[serde(rename = "CodesetId", default, skip_serializing_if = "Option::is_none")]
    pub codeset_id: Option<i64>,
    #[serde(rename = "First", default, skip_serializing_if = "Option::is_none")]
    pub first: Option<bool>,
    #[serde(rename = "EraStartDate", default, skip_serializing_if = "Option::is_none")]
    pub era_start_date: Option<DateRange>,
    #[serde(rename = "EraEndDate", default, skip_serializing_if = "Option::is_none")]
    pub era_end_date: Option<DateRange>,
    #[serde(
        rename = "OccurrenceCount",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub occurrence_count: Option<NumericRange>,
    #[serde(rename = "EraLength", default, skip_serializing_if = "Option::is_none")]
    pub era_length: Option<NumericRange>,
    #[serde(rename = "GapDays", default, skip_serializing_if = "Option::is_none")]
    pub gap_days: Option<NumericRange>,
    #[serde(rename = "AgeAtStart", default, skip_serializing_if = "Option::is_none")]
    pub age_at_start: Option<NumericRange>,
    #[serde(rename = "AgeAtEnd", default, skip_serializing_if = "Option::is_none")]
    pub age_at_end: Option<NumericRange>,
    #[serde(rename = "Gender", default, skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", default, skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "CorrelatedCriteria",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlated_criteria: Option<CriteriaGroup>,
    #[serde(
        rename = "DateAdjustment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub date_adjustment: Option<DateAdjustment>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DoseEra {
    #[serde(rename = "CodesetId", default, skip_serializing_if = "Option::is_none")]
    pub codeset_id: Option<i64>,
    #[serde(rename = "First", default, skip_serializing_if = "Option::is_none")]
    pub first: Option<bool>,
    #[serde(rename = "EraStartDate", default, skip_serializing_if = "Option::is_none")]
    pub era_start_date: Option<DateRange>,
    #[serde(rename = "EraEndDate", default, skip_serializing_if = "Option::is_none")]
    pub era_end_date: Option<DateRange>,
    #[serde(rename = "Unit", default, skip_serializing_if = "Vec::is_empty")]
    pub unit: Vec<Concept>,
    #[serde(rename = "UnitCS", default, skip_serializing_if = "Option::is_none")]
    pub unit_cs: Option<ConceptSetSelection>,
    #[serde(rename = "DoseValue", default, skip_serializing_if = "Option::is_none")]
    pub dose_value: Option<NumericRange>,
    #[serde(rename = "EraLength", default, skip_serializing_if = "Option::is_none")]
    pub era_length: Option<NumericRange>,
    #[serde(rename = "AgeAtStart", default, skip_serializing_if = "Option::is_none")]
    pub age_at_start: Option<NumericRange>,
    #[serde(rename = "AgeAtEnd", default, skip_serializing_if = "Option::is_none")]
    pub age_at_end: Option<NumericRange>,
    #[serde(rename = "Gender", default, skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", default, skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "CorrelatedCriteria",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlated_criteria: Option<CriteriaGroup>,
    #[serde(
        rename = "DateAdjustment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub date_adjustment: Option<DateAdjustment>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VisitOccurrence {
    #[serde(rename = "CodesetId", default, skip_serializing_if = "Option::is_none")]
    pub codeset_id: Option<i64>,
    #[serde(rename = "First", default, skip_serializing_if = "Option::is_none")]
    pub first: Option<bool>,
    #[serde(
        rename = "OccurrenceStartDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub occurrence_start_date: Option<DateRange>,
    #[serde(
        rename = "OccurrenceEndDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub occurrence_end_date: Option<DateRange>,
    #[serde(rename = "VisitType", default, skip_serializing_if = "Vec::is_empty")]
    pub visit_type: Vec<Concept>,
    #[serde(rename = "VisitTypeCS", default, skip_serializing_if = "Option::is_none")]
    pub visit_type_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "VisitTypeExclude",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub visit_type_exclude: Option<bool>,
    #[serde(
        rename = "VisitSourceConcept",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub visit_source_concept: Option<i64>,
    #[serde(rename = "VisitLength", default, skip_serializing_if = "Option::is_none")]
    pub visit_length: Option<NumericRange>,
    #[serde(rename = "Age", default, skip_serializing_if = "Option::is_none")]
    pub age: Option<NumericRange>,
    #[serde(rename = "Gender", default, skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", default, skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "ProviderSpecialty",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub provider_specialty: Vec<Concept>,
    #[serde(
        rename = "ProviderSpecialtyCS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub provider_specialty_cs: Option<ConceptSetSelection>,
    #[serde(rename = "PlaceOfService", default, skip_serializing_if = "Vec::is_empty")]
    pub place_of_service: Vec<Concept>,
    #[serde(
        rename = "PlaceOfServiceCS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub place_of_service_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "PlaceOfServiceLocation",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub place_of_service_location: Option<i64>,
    #[serde(
        rename = "CorrelatedCriteria",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlated_criteria: Option<CriteriaGroup>,
    #[serde(
        rename = "DateAdjustment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub date_adjustment: Option<DateAdjustment>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VisitDetail {
    #[serde(rename = "CodesetId", default, skip_serializing_if = "Option::is_none")]
    pub codeset_id: Option<i64>,
    #[serde(rename = "First", default, skip_serializing_if = "Option::is_none")]
    pub first: Option<bool>,
    #[serde(
        rename = "VisitDetailStartDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub visit_detail_start_date: Option<DateRange>,
    #[serde(
        rename = "VisitDetailEndDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub visit_detail_end_date: Option<DateRange>,
    #[serde(
        rename = "VisitDetailTypeCS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub visit_detail_type_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "VisitDetailSourceConcept",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub visit_detail_source_concept: Option<i64>,
    #[serde(
        rename = "VisitDetailLength",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub visit_detail_length: Option<NumericRange>,
    #[serde(rename = "Age", default, skip_serializing_if = "Option::is_none")]
    pub age: Option<NumericRange>,
    #[serde(rename = "GenderCS", default, skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "ProviderSpecialtyCS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub provider_specialty_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "PlaceOfServiceCS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub place_of_service_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "PlaceOfServiceLocation",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub place_of_service_location: Option<i64>,
    #[serde(
        rename = "CorrelatedCriteria",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlated_criteria: Option<CriteriaGroup>,
    #[serde(
        rename = "DateAdjustment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub date_adjustment: Option<DateAdjustment>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Measurement {
    #[serde(rename = "CodesetId", default, skip_serializing_if = "Option::is_none")]
    pub codeset_id: Option<i64>,
    #[serde(rename = "First", default, skip_serializing_if = "Option::is_none")]
    pub first: Option<bool>,
    #[serde(
        rename = "OccurrenceStartDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub occurrence_start_date: Option<DateRange>,
    #[serde(
        rename = "OccurrenceEndDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub occurrence_end_date: Option<DateRange>,
    #[serde(
        rename = "MeasurementType",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub measurement_type: Vec<Concept>,
    #[serde(
        rename = "MeasurementTypeCS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub measurement_type_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "MeasurementTypeExclude",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub measurement_type_exclude: Option<bool>,
    #[serde(
        rename = "Operator",
        alias = "OperatorConcept",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub operator_concept: Vec<Concept>,
    #[serde(
        rename = "OperatorCS",
        alias = "OperatorConceptCS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub operator_concept_cs: Option<ConceptSetSelection>,
    #[serde(rename = "ValueAsNumber", default, skip_serializing_if = "Option::is_none")]
    pub value_as_number: Option<NumericRange>,
    #[serde(rename = "ValueAsConcept", default, skip_serializing_if = "Vec::is_empty")]
    pub value_as_concept: Vec<Concept>,
    #[serde(
        rename = "ValueAsConceptCS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub value_as_concept_cs: Option<ConceptSetSelection>,
    #[serde(rename = "Unit", default, skip_serializing_if = "Vec::is_empty")]
    pub unit: Vec<Concept>,
    #[serde(rename = "UnitCS", default, skip_serializing_if = "Option::is_none")]
    pub unit_cs: Option<ConceptSetSelection>,
    #[serde(rename = "RangeLow", default, skip_serializing_if = "Option::is_none")]
    pub range_low: Option<NumericRange>,
    #[serde(rename = "RangeHigh", default, skip_serializing_if = "Option::is_none")]
    pub range_high: Option<NumericRange>,
    #[serde(rename = "RangeLowRatio", default, skip_serializing_if = "Option::is_none")]
    pub range_low_ratio: Option<NumericRange>,
    #[serde(
        rename = "RangeHighRatio",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub range_high_ratio: Option<NumericRange>,
    #[serde(rename = "Abnormal", default, skip_serializing_if = "Option::is_none")]
    pub abnormal: Option<bool>,
    #[serde(rename = "Age", default, skip_serializing_if = "Option::is_none")]
    pub age: Option<NumericRange>,
    #[serde(rename = "Gender", default, skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", default, skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "ProviderSpecialty",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub provider_specialty: Vec<Concept>,
    #[serde(
        rename = "ProviderSpecialtyCS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub provider_specialty_cs: Option<ConceptSetSelection>,
    #[serde(rename = "VisitType", default, skip_serializing_if = "Vec::is_empty")]
    pub visit_type: Vec<Concept>,
    #[serde(rename = "VisitTypeCS", default, skip_serializing_if = "Option::is_none")]
    pub visit_type_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "MeasurementSourceConcept",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub measurement_source_concept: Option<SourceConceptFilter>,
    #[serde(
        rename = "CorrelatedCriteria",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlated_criteria: Option<CriteriaGroup>,
    #[serde(
        rename = "DateAdjustment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub date_adjustment: Option<DateAdjustment>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Observation {
    #[serde(rename = "CodesetId", default, skip_serializing_if = "Option::is_none")]
    pub codeset_id: Option<i64>,
    #[serde(rename = "First", default, skip_serializing_if = "Option::is_none")]
    pub first: Option<bool>,
    #[serde(
        rename = "OccurrenceStartDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub occurrence_start_date: Option<DateRange>,
    #[serde(
        rename = "OccurrenceEndDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub occurrence_end_date: Option<DateRange>,
    #[serde(
        rename = "ObservationType",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub observation_type: Vec<Concept>,
    #[serde(
        rename = "ObservationTypeCS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub observation_type_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "ObservationTypeExclude",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub observation_type_exclude: Option<bool>,
    #[serde(rename = "Qualifier", default, skip_serializing_if = "Vec::is_empty")]
    pub qualifier: Vec<Concept>,
    #[serde(rename = "QualifierCS", default, skip_serializing_if = "Option::is_none")]
    pub qualifier_cs: Option<ConceptSetSelection>,
    #[serde(rename = "Unit", default, skip_serializing_if = "Vec::is_empty")]
    pub unit: Vec<Concept>,
    #[serde(rename = "UnitCS", default, skip_serializing_if = "Option::is_none")]
    pub unit_cs: Option<ConceptSetSelection>,
    #[serde(rename = "ValueAsNumber", default, skip_serializing_if = "Option::is_none")]
    pub value_as_number: Option<NumericRange>,
    #[serde(rename = "ValueAsConcept", default, skip_serializing_if = "Vec::is_empty")]
    pub value_as_concept: Vec<Concept>,
    #[serde(
        rename = "ValueAsConceptCS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub value_as_concept_cs: Option<ConceptSetSelection>,
    #[serde(rename = "ValueAsString", default, skip_serializing_if = "Option::is_none")]
    pub value_as_string: Option<TextFilter>,
    #[serde(rename = "Age", default, skip_serializing_if = "Option::is_none")]
    pub age: Option<NumericRange>,
    #[serde(rename = "Gender", default, skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", default, skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "ProviderSpecialty",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub provider_specialty: Vec<Concept>,
    #[serde(
        rename = "ProviderSpecialtyCS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub provider_specialty_cs: Option<ConceptSetSelection>,
    #[serde(rename = "VisitType", default, skip_serializing_if = "Vec::is_empty")]
    pub visit_type: Vec<Concept>,
    #[serde(rename = "VisitTypeCS", default, skip_serializing_if = "Option::is_none")]
    pub visit_type_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "ObservationSourceConcept",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub observation_source_concept: Option<SourceConceptFilter>,
    #[serde(
        rename = "CorrelatedCriteria",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlated_criteria: Option<CriteriaGroup>,
    #[serde(
        rename = "DateAdjustment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub date_adjustment: Option<DateAdjustment>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObservationPeriod {
    #[serde(rename = "First", default, skip_serializing_if = "Option::is_none")]
    pub first: Option<bool>,
    #[serde(
        rename = "PeriodStartDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub period_start_date: Option<DateRange>,
    #[serde(rename = "PeriodEndDate", default, skip_serializing_if = "Option::is_none")]
    pub period_end_date: Option<DateRange>,
    #[serde(
        rename = "UserDefinedPeriod",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub user_defined_period: Option<UserDefinedPeriod>,
    #[serde(rename = "PeriodType", default, skip_serializing_if = "Vec::is_empty")]
    pub period_type: Vec<Concept>,
    #[serde(rename = "PeriodTypeCS", default, skip_serializing_if = "Option::is_none")]
    pub period_type_cs: Option<ConceptSetSelection>,
    #[serde(rename = "PeriodLength", default, skip_serializing_if = "Option::is_none")]
    pub period_length: Option<NumericRange>,
    #[serde(rename = "AgeAtStart", default, skip_serializing_if = "Option::is_none")]
    pub age_at_start: Option<NumericRange>,
    #[serde(rename = "AgeAtEnd", default, skip_serializing_if = "Option::is_none")]
    pub age_at_end: Option<NumericRange>,
    #[serde(
        rename = "CorrelatedCriteria",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlated_criteria: Option<CriteriaGroup>,
    #[serde(
        rename = "DateAdjustment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub date_adjustment: Option<DateAdjustment>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcedureOccurrence {
    #[serde(rename = "CodesetId", default, skip_serializing_if = "Option::is_none")]
    pub codeset_id: Option<i64>,
    #[serde(rename = "First", default, skip_serializing_if = "Option::is_none")]
    pub first: Option<bool>,
    #[serde(
        rename = "OccurrenceStartDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub occurrence_start_date: Option<DateRange>,
    #[serde(
        rename = "OccurrenceEndDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub occurrence_end_date: Option<DateRange>,
    #[serde(rename = "ProcedureType", default, skip_serializing_if = "Vec::is_empty")]
    pub procedure_type: Vec<Concept>,
    #[serde(
        rename = "ProcedureTypeCS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub procedure_type_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "ProcedureTypeExclude",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub procedure_type_exclude: Option<bool>,
    #[serde(rename = "Modifier", default, skip_serializing_if = "Vec::is_empty")]
    pub modifier: Vec<Concept>,
    #[serde(rename = "ModifierCS", default, skip_serializing_if = "Option::is_none")]
    pub modifier_cs: Option<ConceptSetSelection>,
    #[serde(rename = "Quantity", default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<NumericRange>,
    #[serde(rename = "Age", default, skip_serializing_if = "Option::is_none")]
    pub age: Option<NumericRange>,
    #[serde(rename = "Gender", default, skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", default, skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "ProviderSpecialty",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub provider_specialty: Vec<Concept>,
    #[serde(
        rename = "ProviderSpecialtyCS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub provider_specialty_cs: Option<ConceptSetSelection>,
    #[serde(rename = "VisitType", default, skip_serializing_if = "Vec::is_empty")]
    pub visit_type: Vec<Concept>,
    #[serde(rename = "VisitTypeCS", default, skip_serializing_if = "Option::is_none")]
    pub visit_type_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "ProcedureSourceConcept",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub procedure_source_concept: Option<SourceConceptFilter>,
    #[serde(
        rename = "CorrelatedCriteria",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlated_criteria: Option<CriteriaGroup>,
    #[serde(
        rename = "DateAdjustment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub date_adjustment: Option<DateAdjustment>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceExposure {
    #[serde(rename = "CodesetId", default, skip_serializing_if = "Option::is_none")]
    pub codeset_id: Option<i64>,
    #[serde(rename = "First", default, skip_serializing_if = "Option::is_none")]
    pub first: Option<bool>,
    #[serde(
        rename = "OccurrenceStartDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub occurrence_start_date: Option<DateRange>,
    #[serde(
        rename = "OccurrenceEndDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub occurrence_end_date: Option<DateRange>,
    #[serde(rename = "DeviceType", default, skip_serializing_if = "Vec::is_empty")]
    pub device_type: Vec<Concept>,
    #[serde(rename = "DeviceTypeCS", default, skip_serializing_if = "Option::is_none")]
    pub device_type_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "DeviceTypeExclude",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub device_type_exclude: Option<bool>,
    #[serde(rename = "Quantity", default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<NumericRange>,
    #[serde(rename = "UniqueDeviceId", default, skip_serializing_if = "Option::is_none")]
    pub unique_device_id: Option<TextFilter>,
    #[serde(rename = "Age", default, skip_serializing_if = "Option::is_none")]
    pub age: Option<NumericRange>,
    #[serde(rename = "Gender", default, skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", default, skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "ProviderSpecialty",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub provider_specialty: Vec<Concept>,
    #[serde(
        rename = "ProviderSpecialtyCS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub provider_specialty_cs: Option<ConceptSetSelection>,
    #[serde(rename = "VisitType", default, skip_serializing_if = "Vec::is_empty")]
    pub visit_type: Vec<Concept>,
    #[serde(rename = "VisitTypeCS", default, skip_serializing_if = "Option::is_none")]
    pub visit_type_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "DeviceSourceConcept",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub device_source_concept: Option<SourceConceptFilter>,
    #[serde(
        rename = "CorrelatedCriteria",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlated_criteria: Option<CriteriaGroup>,
    #[serde(
        rename = "DateAdjustment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub date_adjustment: Option<DateAdjustment>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Specimen {
    #[serde(rename = "CodesetId", default, skip_serializing_if = "Option::is_none")]
    pub codeset_id: Option<i64>,
    #[serde(rename = "First", default, skip_serializing_if = "Option::is_none")]
    pub first: Option<bool>,
    #[serde(
        rename = "OccurrenceStartDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub occurrence_start_date: Option<DateRange>,
    #[serde(rename = "SpecimenType", default, skip_serializing_if = "Vec::is_empty")]
    pub specimen_type: Vec<Concept>,
    #[serde(rename = "SpecimenTypeCS", default, skip_serializing_if = "Option::is_none")]
    pub specimen_type_cs: Option<ConceptSetSelection>,
    #[serde(rename = "SpecimenTypeExclude", default)]
    pub specimen_type_exclude: bool,
    #[serde(rename = "Quantity", default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<NumericRange>,
    #[serde(rename = "Unit", default, skip_serializing_if = "Vec::is_empty")]
    pub unit: Vec<Concept>,
    #[serde(rename = "UnitCS", default, skip_serializing_if = "Option::is_none")]
    pub unit_cs: Option<ConceptSetSelection>,
    #[serde(rename = "AnatomicSite", default, skip_serializing_if = "Vec::is_empty")]
    pub anatomic_site: Vec<Concept>,
    #[serde(rename = "AnatomicSiteCS", default, skip_serializing_if = "Option::is_none")]
    pub anatomic_site_cs: Option<ConceptSetSelection>,
    #[serde(rename = "DiseaseStatus", default, skip_serializing_if = "Vec::is_empty")]
    pub disease_status: Vec<Concept>,
    #[serde(
        rename = "DiseaseStatusCS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub disease_status_cs: Option<ConceptSetSelection>,
    #[serde(rename = "SourceId", default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<TextFilter>,
    #[serde(
        rename = "SpecimenSourceConcept",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub specimen_source_concept: Option<SourceConceptFilter>,
    #[serde(rename = "Age", default, skip_serializing_if = "Option::is_none")]
    pub age: Option<NumericRange>,
    #[serde(rename = "Gender", default, skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", default, skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "CorrelatedCriteria",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlated_criteria: Option<CriteriaGroup>,
    #[serde(
        rename = "DateAdjustment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub date_adjustment: Option<DateAdjustment>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Death {
    #[serde(rename = "CodesetId", default, skip_serializing_if = "Option::is_none")]
    pub codeset_id: Option<i64>,
    #[serde(
        rename = "OccurrenceStartDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub occurrence_start_date: Option<DateRange>,
    #[serde(rename = "DeathType", default, skip_serializing_if = "Vec::is_empty")]
    pub death_type: Vec<Concept>,
    #[serde(
        rename = "DeathTypeExclude",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub death_type_exclude: Option<bool>,
    #[serde(rename = "DeathTypeCS", default, skip_serializing_if = "Option::is_none")]
    pub death_type_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "DeathSourceConcept",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub death_source_concept: Option<i64>,
    #[serde(rename = "Age", default, skip_serializing_if = "Option::is_none")]
    pub age: Option<NumericRange>,
    #[serde(rename = "Gender", default, skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", default, skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(
        rename = "CorrelatedCriteria",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlated_criteria: Option<CriteriaGroup>,
    #[serde(
        rename = "DateAdjustment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub date_adjustment: Option<DateAdjustment>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PayerPlanPeriod {
    #[serde(rename = "First", default, skip_serializing_if = "Option::is_none")]
    pub first: Option<bool>,
    #[serde(
        rename = "PeriodStartDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub period_start_date: Option<DateRange>,
    #[serde(rename = "PeriodEndDate", default, skip_serializing_if = "Option::is_none")]
    pub period_end_date: Option<DateRange>,
    #[serde(
        rename = "UserDefinedPeriod",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub user_defined_period: Option<UserDefinedPeriod>,
    #[serde(rename = "PeriodLength", default, skip_serializing_if = "Option::is_none")]
    pub period_length: Option<NumericRange>,
    #[serde(rename = "AgeAtStart", default, skip_serializing_if = "Option::is_none")]
    pub age_at_start: Option<NumericRange>,
    #[serde(rename = "AgeAtEnd", default, skip_serializing_if = "Option::is_none")]
    pub age_at_end: Option<NumericRange>,
    #[serde(rename = "Gender", default, skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", default, skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(rename = "PayerConcept", default, skip_serializing_if = "Option::is_none")]
    pub payer_concept: Option<i64>,
    #[serde(rename = "PlanConcept", default, skip_serializing_if = "Option::is_none")]
    pub plan_concept: Option<i64>,
    #[serde(rename = "SponsorConcept", default, skip_serializing_if = "Option::is_none")]
    pub sponsor_concept: Option<i64>,
    #[serde(
        rename = "StopReasonConcept",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub stop_reason_concept: Option<i64>,
    #[serde(
        rename = "PayerSourceConcept",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub payer_source_concept: Option<i64>,
    #[serde(
        rename = "PlanSourceConcept",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub plan_source_concept: Option<i64>,
    #[serde(
        rename = "SponsorSourceConcept",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sponsor_source_concept: Option<i64>,
    #[serde(
        rename = "StopReasonSourceConcept",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub stop_reason_source_concept: Option<i64>,
    #[serde(
        rename = "CorrelatedCriteria",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlated_criteria: Option<CriteriaGroup>,
    #[serde(
        rename = "DateAdjustment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub date_adjustment: Option<DateAdjustment>,
}

/// One criterion, tagged by its domain kind on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Criterion {
    ConditionEra(ConditionEra),
    ConditionOccurrence(ConditionOccurrence),
    Death(Death),
    DeviceExposure(DeviceExposure),
    DoseEra(DoseEra),
    DrugEra(DrugEra),
    DrugExposure(DrugExposure),
    Measurement(Measurement),
    Observation(Observation),
    ObservationPeriod(ObservationPeriod),
    PayerPlanPeriod(PayerPlanPeriod),
    ProcedureOccurrence(ProcedureOccurrence),
    Specimen(Specimen),
    VisitDetail(VisitDetail),
    VisitOccurrence(VisitOccurrence),
}

impl Criterion {
    pub fn kind(&self) -> &'static str {
        match self {
            Criterion::ConditionEra(_) => "ConditionEra",
            Criterion::ConditionOccurrence(_) => "ConditionOccurrence",
            Criterion::Death(_) => "Death",
            Criterion::DeviceExposure(_) => "DeviceExposure",
            Criterion::DoseEra(_) => "DoseEra",
            Criterion::DrugEra(_) => "DrugEra",
            Criterion::DrugExposure(_) => "DrugExposure",
            Criterion::Measurement(_) => "Measurement",
            Criterion::Observation(_) => "Observation",
            Criterion::ObservationPeriod(_) => "ObservationPeriod",
            Criterion::PayerPlanPeriod(_) => "PayerPlanPeriod",
            Criterion::ProcedureOccurrence(_) => "ProcedureOccurrence",
            Criterion::Specimen(_) => "Specimen",
            Criterion::VisitDetail(_) => "VisitDetail",
            Criterion::VisitOccurrence(_) => "VisitOccurrence",
        }
    }

    /// The CDM table the criterion scans.
    pub fn domain_table(&self) -> &'static str {
        match self {
            Criterion::ConditionEra(_) => "condition_era",
            Criterion::ConditionOccurrence(_) => "condition_occurrence",
            Criterion::Death(_) => "death",
            Criterion::DeviceExposure(_) => "device_exposure",
            Criterion::DoseEra(_) => "dose_era",
            Criterion::DrugEra(_) => "drug_era",
            Criterion::DrugExposure(_) => "drug_exposure",
            Criterion::Measurement(_) => "measurement",
            Criterion::Observation(_) => "observation",
            Criterion::ObservationPeriod(_) => "observation_period",
            Criterion::PayerPlanPeriod(_) => "payer_plan_period",
            Criterion::ProcedureOccurrence(_) => "procedure_occurrence",
            Criterion::Specimen(_) => "specimen",
            Criterion::VisitDetail(_) => "visit_detail",
            Criterion::VisitOccurrence(_) => "visit_occurrence",
        }
    }

    pub fn correlated_criteria(&self) -> Option<&CriteriaGroup> {
        match self {
            Criterion::ConditionEra(c) => c.correlated_criteria.as_ref(),
            Criterion::ConditionOccurrence(c) => c.correlated_criteria.as_ref(),
            Criterion::Death(c) => c.correlated_criteria.as_ref(),
            Criterion::DeviceExposure(c) => c.correlated_criteria.as_ref(),
            Criterion::DoseEra(c) => c.correlated_criteria.as_ref(),
            Criterion::DrugEra(c) => c.correlated_criteria.as_ref(),
            Criterion::DrugExposure(c) => c.correlated_criteria.as_ref(),
            Criterion::Measurement(c) => c.correlated_criteria.as_ref(),
            Criterion::Observation(c) => c.correlated_criteria.as_ref(),
            Criterion::ObservationPeriod(c) => c.correlated_criteria.as_ref(),
            Criterion::PayerPlanPeriod(c) => c.correlated_criteria.as_ref(),
            Criterion::ProcedureOccurrence(c) => c.correlated_criteria.as_ref(),
            Criterion::Specimen(c) => c.correlated_criteria.as_ref(),
            Criterion::VisitDetail(c) => c.correlated_criteria.as_ref(),
            Criterion::VisitOccurrence(c) => c.correlated_criteria.as_ref(),
        }
    }

    /// Collect every codeset id this criterion resolves against, including
    /// attribute selections, source-concept references that name codesets,
    /// and nested correlated criteria.
    pub fn collect_codesets(&self, out: &mut Vec<i64>) {
        fn push(out: &mut Vec<i64>, id: Option<i64>) {
            if let Some(id) = id {
                out.push(id);
            }
        }
        fn push_cs(out: &mut Vec<i64>, cs: &Option<ConceptSetSelection>) {
            if let Some(cs) = cs {
                push(out, cs.codeset_id);
            }
        }
        // Source-concept attributes interpreted as codeset references in
        // both their integer and selection forms.
        fn push_source(out: &mut Vec<i64>, filter: &Option<SourceConceptFilter>) {
            match filter {
                Some(SourceConceptFilter::Concept(id)) => out.push(*id),
                Some(SourceConceptFilter::Selection(sel)) => push(out, sel.codeset_id),
                None => {}
            }
        }
        // Source-concept attributes whose integer form is a literal concept
        // id; only the selection form touches a codeset.
        fn push_source_selection_only(out: &mut Vec<i64>, filter: &Option<SourceConceptFilter>) {
            if let Some(SourceConceptFilter::Selection(sel)) = filter {
                push(out, sel.codeset_id);
            }
        }

        match self {
            Criterion::ConditionEra(c) => {
                push(out, c.codeset_id);
                push_cs(out, &c.gender_cs);
            }
            Criterion::ConditionOccurrence(c) => {
                push(out, c.codeset_id);
                push_cs(out, &c.condition_type_cs);
                push_source(out, &c.condition_source_concept);
                push_cs(out, &c.gender_cs);
                push_cs(out, &c.provider_specialty_cs);
                push_cs(out, &c.visit_type_cs);
                push_cs(out, &c.condition_status_cs);
            }
            Criterion::Death(c) => {
                push(out, c.codeset_id);
                push_cs(out, &c.death_type_cs);
                push(out, c.death_source_concept);
                push_cs(out, &c.gender_cs);
            }
            Criterion::DeviceExposure(c) => {
                push(out, c.codeset_id);
                push_cs(out, &c.device_type_cs);
                push_source(out, &c.device_source_concept);
                push_cs(out, &c.gender_cs);
                push_cs(out, &c.provider_specialty_cs);
                push_cs(out, &c.visit_type_cs);
            }
            Criterion::DoseEra(c) => {
                push(out, c.codeset_id);
                push_cs(out, &c.unit_cs);
                push_cs(out, &c.gender_cs);
            }
            Criterion::DrugEra(c) => {
                push(out, c.codeset_id);
                push_cs(out, &c.gender_cs);
            }
            Criterion::DrugExposure(c) => {
                push(out, c.codeset_id);
                push_cs(out, &c.drug_type_cs);
                push_cs(out, &c.route_concept_cs);
                push_cs(out, &c.dose_unit_cs);
                push_source(out, &c.drug_source_concept);
                push_cs(out, &c.gender_cs);
                push_cs(out, &c.provider_specialty_cs);
                push_cs(out, &c.visit_type_cs);
            }
            Criterion::Measurement(c) => {
                push(out, c.codeset_id);
                push_cs(out, &c.measurement_type_cs);
                push_cs(out, &c.operator_concept_cs);
                push_cs(out, &c.value_as_concept_cs);
                push_cs(out, &c.unit_cs);
                push_source_selection_only(out, &c.measurement_source_concept);
                push_cs(out, &c.gender_cs);
                push_cs(out, &c.provider_specialty_cs);
                push_cs(out, &c.visit_type_cs);
            }
            Criterion::Observation(c) => {
                push(out, c.codeset_id);
                push_cs(out, &c.observation_type_cs);
                push_cs(out, &c.qualifier_cs);
                push_cs(out, &c.unit_cs);
                push_cs(out, &c.value_as_concept_cs);
                push_source_selection_only(out, &c.observation_source_concept);
                push_cs(out, &c.gender_cs);
                push_cs(out, &c.provider_specialty_cs);
                push_cs(out, &c.visit_type_cs);
            }
            Criterion::ObservationPeriod(c) => {
                push_cs(out, &c.period_type_cs);
            }
            Criterion::PayerPlanPeriod(c) => {
                push_cs(out, &c.gender_cs);
                for id in [
                    c.payer_concept,
                    c.plan_concept,
                    c.sponsor_concept,
                    c.stop_reason_concept,
                    c.payer_source_concept,
                    c.plan_source_concept,
                    c.sponsor_source_concept,
                    c.stop_reason_source_concept,
                ] {
                    push(out, id);
                }
            }
            Criterion::ProcedureOccurrence(c) => {
                push(out, c.codeset_id);
                push_cs(out, &c.procedure_type_cs);
                push_cs(out, &c.modifier_cs);
                push_source(out, &c.procedure_source_concept);
                push_cs(out, &c.gender_cs);
                push_cs(out, &c.provider_specialty_cs);
                push_cs(out, &c.visit_type_cs);
            }
            Criterion::Specimen(c) => {
                push(out, c.codeset_id);
                push_cs(out, &c.specimen_type_cs);
                push_cs(out, &c.unit_cs);
                push_cs(out, &c.anatomic_site_cs);
                push_cs(out, &c.disease_status_cs);
                push_source_selection_only(out, &c.specimen_source_concept);
                push_cs(out, &c.gender_cs);
            }
            Criterion::VisitDetail(c) => {
                push(out, c.codeset_id);
                push_cs(out, &c.visit_detail_type_cs);
                push(out, c.visit_detail_source_concept);
                push_cs(out, &c.gender_cs);
                push_cs(out, &c.provider_specialty_cs);
                push_cs(out, &c.place_of_service_cs);
                push(out, c.place_of_service_location);
            }
            Criterion::VisitOccurrence(c) => {
                push(out, c.codeset_id);
                push_cs(out, &c.visit_type_cs);
                push(out, c.visit_source_concept);
                push_cs(out, &c.gender_cs);
                push_cs(out, &c.provider_specialty_cs);
                push_cs(out, &c.place_of_service_cs);
            }
        }

        if let Some(group) = self.correlated_criteria() {
            collect_group_codesets(group, out);
        }
    }
}

pub(crate) fn collect_group_codesets(group: &CriteriaGroup, out: &mut Vec<i64>) {
    for correlated in &group.criteria_list {
        if let Some(child) = &correlated.criteria {
            child.collect_codesets(out);
        }
    }
    for demographic in &group.demographic_criteria_list {
        for cs in [
            &demographic.gender_cs,
            &demographic.race_cs,
            &demographic.ethnicity_cs,
        ] {
            if let Some(cs) = cs {
                if let Some(id) = cs.codeset_id {
                    out.push(id);
                }
            }
        }
    }
    for sub in &group.groups {
        collect_group_codesets(sub, out);
    }
}
