//! The top-level cohort expression and its pipeline-level settings.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::concept_set::ConceptSet;
use super::criteria::CriteriaGroup;
use super::domains::{collect_group_codesets, Criterion};
use crate::error::CohortError;

/// `All` keeps every event; anything else keeps the earliest per person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultLimit {
    #[serde(rename = "Type", default = "ResultLimit::default_type")]
    pub kind: String,
}

impl ResultLimit {
    fn default_type() -> String {
        "All".to_string()
    }

    pub fn is_limited(&self) -> bool {
        !self.kind.eq_ignore_ascii_case("all")
    }
}

impl Default for ResultLimit {
    fn default() -> Self {
        ResultLimit {
            kind: Self::default_type(),
        }
    }
}

/// Required continuous observation around the index date.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObservationFilter {
    #[serde(rename = "PriorDays", default)]
    pub prior_days: i64,
    #[serde(rename = "PostDays", default)]
    pub post_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryCriteria {
    #[serde(rename = "CriteriaList")]
    pub criteria_list: Vec<Criterion>,
    #[serde(
        rename = "ObservationWindow",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub observation_window: Option<ObservationFilter>,
    #[serde(rename = "PrimaryCriteriaLimit", default)]
    pub primary_limit: ResultLimit,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InclusionRule {
    #[serde(
        rename = "name",
        alias = "Name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
    #[serde(
        rename = "description",
        alias = "Description",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
    #[serde(
        rename = "expression",
        alias = "Expression",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub expression: Option<CriteriaGroup>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollapseType {
    #[serde(rename = "ERA")]
    Era,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollapseSettings {
    #[serde(rename = "CollapseType", default = "CollapseSettings::default_type")]
    pub collapse_type: CollapseType,
    #[serde(rename = "EraPad", default)]
    pub era_pad: i64,
}

impl CollapseSettings {
    fn default_type() -> CollapseType {
        CollapseType::Era
    }
}

impl Default for CollapseSettings {
    fn default() -> Self {
        CollapseSettings {
            collapse_type: CollapseType::Era,
            era_pad: 0,
        }
    }
}

/// Absolute-date bounds applied at the end of the pipeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Period {
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateField {
    #[serde(rename = "StartDate")]
    StartDate,
    #[serde(rename = "EndDate")]
    EndDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateOffsetStrategy {
    #[serde(rename = "DateField", default = "DateOffsetStrategy::default_field")]
    pub date_field: DateField,
    #[serde(rename = "Offset", default)]
    pub offset: i64,
}

impl DateOffsetStrategy {
    fn default_field() -> DateField {
        DateField::StartDate
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CustomEraStrategy {
    #[serde(rename = "DrugCodesetId", default, skip_serializing_if = "Option::is_none")]
    pub drug_codeset_id: Option<i64>,
    #[serde(rename = "GapDays", default)]
    pub gap_days: i64,
    #[serde(rename = "Offset", default)]
    pub offset: i64,
    #[serde(
        rename = "DaysSupplyOverride",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub days_supply_override: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EndStrategy {
    #[serde(rename = "DateOffset", default, skip_serializing_if = "Option::is_none")]
    pub date_offset: Option<DateOffsetStrategy>,
    #[serde(rename = "CustomEra", default, skip_serializing_if = "Option::is_none")]
    pub custom_era: Option<CustomEraStrategy>,
}

impl EndStrategy {
    pub fn is_empty(&self) -> bool {
        self.date_offset.is_none() && self.custom_era.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortExpression {
    #[serde(
        rename = "cdmVersionRange",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cdm_version_range: Option<String>,
    #[serde(rename = "Title", default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "PrimaryCriteria")]
    pub primary_criteria: PrimaryCriteria,
    #[serde(
        rename = "AdditionalCriteria",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub additional_criteria: Option<CriteriaGroup>,
    #[serde(rename = "ConceptSets", default)]
    pub concept_sets: Vec<ConceptSet>,
    /// Parsed but never applied; the engine this compiler is conformance
    /// tested against ignores it, and parity wins.
    #[serde(rename = "QualifiedLimit", default)]
    pub qualified_limit: ResultLimit,
    #[serde(rename = "ExpressionLimit", default)]
    pub expression_limit: ResultLimit,
    #[serde(rename = "InclusionRules", default, skip_serializing_if = "Vec::is_empty")]
    pub inclusion_rules: Vec<InclusionRule>,
    #[serde(rename = "EndStrategy", default, skip_serializing_if = "Option::is_none")]
    pub end_strategy: Option<EndStrategy>,
    #[serde(
        rename = "CensoringCriteria",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub censoring_criteria: Vec<Criterion>,
    #[serde(rename = "CollapseSettings", default)]
    pub collapse_settings: CollapseSettings,
    #[serde(rename = "CensorWindow", default, skip_serializing_if = "Option::is_none")]
    pub censor_window: Option<Period>,
}

impl CohortExpression {
    pub fn from_json(text: &str) -> Result<Self, CohortError> {
        let expression: CohortExpression = serde_json::from_str(text)?;
        Ok(expression)
    }

    /// Strict parse: the parsed expression plus every field of the raw
    /// document the compiler does not interpret.
    pub fn from_json_strict(
        text: &str,
    ) -> Result<(Self, Vec<crate::inventory::UnknownField>), CohortError> {
        let document: serde_json::Value = serde_json::from_str(text)?;
        let unknown = crate::inventory::scan_unknown_fields(&document);
        let expression: CohortExpression = serde_json::from_value(document)?;
        Ok((expression, unknown))
    }

    pub fn to_json(&self) -> Result<String, CohortError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Every codeset id any criterion in the expression resolves against.
    pub fn referenced_codesets(&self) -> BTreeSet<i64> {
        let mut ids = Vec::new();
        for criterion in &self.primary_criteria.criteria_list {
            criterion.collect_codesets(&mut ids);
        }
        if let Some(group) = &self.additional_criteria {
            collect_group_codesets(group, &mut ids);
        }
        for rule in &self.inclusion_rules {
            if let Some(group) = &rule.expression {
                collect_group_codesets(group, &mut ids);
            }
        }
        for criterion in &self.censoring_criteria {
            criterion.collect_codesets(&mut ids);
        }
        if let Some(strategy) = &self.end_strategy {
            if let Some(era) = &strategy.custom_era {
                if let Some(id) = era.drug_codeset_id {
                    ids.push(id);
                }
            }
        }
        ids.into_iter().collect()
    }

    /// Structural checks that must hold before any SQL is emitted: every
    /// referenced codeset is declared, and a custom era names its drug
    /// codeset.
    pub fn validate(&self) -> Result<(), CohortError> {
        let declared: BTreeSet<i64> = self.concept_sets.iter().map(|cs| cs.id).collect();
        for codeset_id in self.referenced_codesets() {
            if !declared.contains(&codeset_id) {
                return Err(CohortError::MissingCodeset { codeset_id });
            }
        }
        if let Some(strategy) = &self.end_strategy {
            if let Some(era) = &strategy.custom_era {
                if era.drug_codeset_id.is_none() {
                    return Err(CohortError::invalid(
                        "custom era end strategy requires a drug codeset id",
                    ));
                }
            }
        }
        Ok(())
    }
}
