//! Typed representation of the cohort definition wire format. Field names
//! are pascal-cased on the wire and snake-cased here; serialization elides
//! absent fields so shape-preserving documents round-trip.

pub mod concept_set;
pub mod criteria;
pub mod domains;
pub mod expression;

pub use concept_set::{ConceptSet, ConceptSetExpression, ConceptSetItem};
pub use criteria::{
    Concept, ConceptSetSelection, CorrelatedCriteria, CriteriaColumn, CriteriaGroup, DateAdjustment,
    DateRange, DateType, DemographicCriteria, Endpoint, GroupCombinator, NumericRange, Occurrence,
    OccurrenceType, RangeOp, SourceConceptFilter, TextFilter, TextOp, Window,
};
pub use domains::Criterion;
pub use expression::{
    CohortExpression, CollapseSettings, CollapseType, CustomEraStrategy, DateField,
    DateOffsetStrategy, EndStrategy, InclusionRule, ObservationFilter, Period, PrimaryCriteria,
    ResultLimit,
};

/// Absolute dates arrive as `2020-01-01` or as a full timestamp string;
/// only the date part is meaningful and only the date part is emitted.
pub(crate) mod wire_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDate>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(date) => serializer.serialize_str(&date.format("%Y-%m-%d").to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDate>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(text) => {
                let head = text.get(..10).unwrap_or(&text);
                NaiveDate::parse_from_str(head, "%Y-%m-%d")
                    .map(Some)
                    .map_err(|_| {
                        serde::de::Error::custom(format!("expected a YYYY-MM-DD date, got {text:?}"))
                    })
            }
        }
    }
}
