//! Cross-cutting criterion pieces: range and text filters, concept
//! references, temporal windows, occurrence counts, and criteria groups.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::domains::Criterion;

/// Comparison operators shared by numeric, date, and interval filters.
/// `Bt` is an inclusive between over `[value, extent]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeOp {
    #[serde(rename = "lt")]
    Lt,
    #[serde(rename = "lte")]
    Lte,
    #[serde(rename = "eq")]
    Eq,
    #[serde(rename = "!eq")]
    NotEq,
    #[serde(rename = "gt")]
    Gt,
    #[serde(rename = "gte")]
    Gte,
    #[serde(rename = "bt")]
    Bt,
    #[serde(rename = "!bt")]
    NotBt,
}

impl RangeOp {
    pub fn is_between(&self) -> bool {
        matches!(self, RangeOp::Bt | RangeOp::NotBt)
    }

    pub fn is_negated(&self) -> bool {
        matches!(self, RangeOp::NotEq | RangeOp::NotBt)
    }

    /// The SQL comparison token for the simple (non-between) operators.
    pub fn comparator(&self) -> &'static str {
        match self {
            RangeOp::Lt => "<",
            RangeOp::Lte => "<=",
            RangeOp::Eq => "=",
            RangeOp::NotEq => "<>",
            RangeOp::Gt => ">",
            RangeOp::Gte => ">=",
            RangeOp::Bt | RangeOp::NotBt => "=",
        }
    }
}

/// Numbers are kept in their wire form so integer literals serialize back
/// as integers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NumericRange {
    #[serde(rename = "Value", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Number>,
    #[serde(rename = "Op", default, skip_serializing_if = "Option::is_none")]
    pub op: Option<RangeOp>,
    #[serde(rename = "Extent", default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<serde_json::Number>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(rename = "Value")]
    pub value: String,
    #[serde(rename = "Op")]
    pub op: RangeOp,
    #[serde(rename = "Extent", default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextOp {
    #[serde(rename = "startsWith")]
    StartsWith,
    #[serde(rename = "endsWith")]
    EndsWith,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "!startsWith")]
    NotStartsWith,
    #[serde(rename = "!endsWith")]
    NotEndsWith,
    #[serde(rename = "!contains")]
    NotContains,
}

impl TextOp {
    pub fn is_negated(&self) -> bool {
        matches!(
            self,
            TextOp::NotStartsWith | TextOp::NotEndsWith | TextOp::NotContains
        )
    }

    /// LIKE pattern anchoring: (leading wildcard, trailing wildcard).
    pub fn wildcards(&self) -> (bool, bool) {
        match self {
            TextOp::StartsWith | TextOp::NotStartsWith => (false, true),
            TextOp::EndsWith | TextOp::NotEndsWith => (true, false),
            TextOp::Contains | TextOp::NotContains => (true, true),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TextFilter {
    #[serde(rename = "Text", default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "Op", default, skip_serializing_if = "Option::is_none")]
    pub op: Option<TextOp>,
}

/// A codeset reference used as an attribute filter; `is_exclusion` flips
/// the semi-join into an anti-join.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConceptSetSelection {
    #[serde(rename = "CodesetId", default, skip_serializing_if = "Option::is_none")]
    pub codeset_id: Option<i64>,
    #[serde(rename = "IsExclusion", default)]
    pub is_exclusion: bool,
}

impl ConceptSetSelection {
    pub fn from_codeset(codeset_id: i64) -> Self {
        ConceptSetSelection {
            codeset_id: Some(codeset_id),
            is_exclusion: false,
        }
    }
}

/// An authored vocabulary concept. The wire shape is the upper-cased export
/// format of the OHDSI vocabulary browser; only `CONCEPT_ID` matters to the
/// compiler, the rest rides along for round-trips.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Concept {
    #[serde(rename = "CONCEPT_ID", default, skip_serializing_if = "Option::is_none")]
    pub concept_id: Option<i64>,
    #[serde(rename = "CONCEPT_NAME", default, skip_serializing_if = "Option::is_none")]
    pub concept_name: Option<String>,
    #[serde(
        rename = "STANDARD_CONCEPT",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub standard_concept: Option<String>,
    #[serde(
        rename = "INVALID_REASON",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub invalid_reason: Option<String>,
    #[serde(
        rename = "INVALID_REASON_CAPTION",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub invalid_reason_caption: Option<String>,
    #[serde(rename = "CONCEPT_CODE", default, skip_serializing_if = "Option::is_none")]
    pub concept_code: Option<String>,
    #[serde(rename = "DOMAIN_ID", default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<String>,
    #[serde(rename = "VOCABULARY_ID", default, skip_serializing_if = "Option::is_none")]
    pub vocabulary_id: Option<String>,
    #[serde(
        rename = "CONCEPT_CLASS_ID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub concept_class_id: Option<String>,
    #[serde(
        rename = "STANDARD_CONCEPT_CAPTION",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub standard_concept_caption: Option<String>,
}

impl Concept {
    pub fn with_id(concept_id: i64) -> Self {
        Concept {
            concept_id: Some(concept_id),
            ..Concept::default()
        }
    }
}

/// Collect the non-null ids out of a concept filter list.
pub fn concept_ids(concepts: &[Concept]) -> Vec<i64> {
    concepts.iter().filter_map(|c| c.concept_id).collect()
}

/// Source-concept attributes accept either a bare integer or a full codeset
/// selection object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceConceptFilter {
    Concept(i64),
    Selection(ConceptSetSelection),
}

// ── Temporal windows ──

/// One side of a window. Missing `days` means unbounded on that side;
/// `coeff` is −1 (before the anchor) or +1 (after it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(rename = "Days", default, skip_serializing_if = "Option::is_none")]
    pub days: Option<i64>,
    #[serde(rename = "Coeff")]
    pub coeff: i64,
}

impl Endpoint {
    /// The signed day offset, or None when the side is open.
    pub fn signed_days(&self) -> Option<i64> {
        self.days.map(|d| d * self.coeff)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Window {
    #[serde(rename = "Start", default, skip_serializing_if = "Option::is_none")]
    pub start: Option<Endpoint>,
    #[serde(rename = "End", default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Endpoint>,
    #[serde(rename = "UseIndexEnd", default, skip_serializing_if = "Option::is_none")]
    pub use_index_end: Option<bool>,
    #[serde(rename = "UseEventEnd", default, skip_serializing_if = "Option::is_none")]
    pub use_event_end: Option<bool>,
}

// ── Occurrence counts ──

/// Wire values 0/1/2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum OccurrenceType {
    Exactly,
    AtMost,
    AtLeast,
}

impl TryFrom<i64> for OccurrenceType {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OccurrenceType::Exactly),
            1 => Ok(OccurrenceType::AtMost),
            2 => Ok(OccurrenceType::AtLeast),
            other => Err(format!("unsupported occurrence type {other}")),
        }
    }
}

impl From<OccurrenceType> for i64 {
    fn from(value: OccurrenceType) -> i64 {
        match value {
            OccurrenceType::Exactly => 0,
            OccurrenceType::AtMost => 1,
            OccurrenceType::AtLeast => 2,
        }
    }
}

/// Columns an occurrence count may be taken over. The wire accepts the
/// member name (`VISIT_ID`), the column name (`visit_occurrence_id`), and
/// the column name with its `_id` suffix trimmed; serialization always
/// emits the member name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriteriaColumn {
    DaysSupply,
    DomainConcept,
    DomainSourceConcept,
    Duration,
    EndDate,
    EraOccurrences,
    GapDays,
    Quantity,
    RangeHigh,
    RangeLow,
    Refills,
    StartDate,
    Unit,
    ValueAsNumber,
    VisitId,
    VisitDetailId,
}

impl CriteriaColumn {
    const ALL: [CriteriaColumn; 16] = [
        CriteriaColumn::DaysSupply,
        CriteriaColumn::DomainConcept,
        CriteriaColumn::DomainSourceConcept,
        CriteriaColumn::Duration,
        CriteriaColumn::EndDate,
        CriteriaColumn::EraOccurrences,
        CriteriaColumn::GapDays,
        CriteriaColumn::Quantity,
        CriteriaColumn::RangeHigh,
        CriteriaColumn::RangeLow,
        CriteriaColumn::Refills,
        CriteriaColumn::StartDate,
        CriteriaColumn::Unit,
        CriteriaColumn::ValueAsNumber,
        CriteriaColumn::VisitId,
        CriteriaColumn::VisitDetailId,
    ];

    pub fn member_name(&self) -> &'static str {
        match self {
            CriteriaColumn::DaysSupply => "DAYS_SUPPLY",
            CriteriaColumn::DomainConcept => "DOMAIN_CONCEPT",
            CriteriaColumn::DomainSourceConcept => "DOMAIN_SOURCE_CONCEPT",
            CriteriaColumn::Duration => "DURATION",
            CriteriaColumn::EndDate => "END_DATE",
            CriteriaColumn::EraOccurrences => "ERA_OCCURRENCES",
            CriteriaColumn::GapDays => "GAP_DAYS",
            CriteriaColumn::Quantity => "QUANTITY",
            CriteriaColumn::RangeHigh => "RANGE_HIGH",
            CriteriaColumn::RangeLow => "RANGE_LOW",
            CriteriaColumn::Refills => "REFILLS",
            CriteriaColumn::StartDate => "START_DATE",
            CriteriaColumn::Unit => "UNIT",
            CriteriaColumn::ValueAsNumber => "VALUE_AS_NUMBER",
            CriteriaColumn::VisitId => "VISIT_ID",
            CriteriaColumn::VisitDetailId => "VISIT_DETAIL_ID",
        }
    }

    pub fn column_name(&self) -> &'static str {
        match self {
            CriteriaColumn::DaysSupply => "days_supply",
            CriteriaColumn::DomainConcept => "domain_concept_id",
            CriteriaColumn::DomainSourceConcept => "domain_source_concept_id",
            CriteriaColumn::Duration => "duration",
            CriteriaColumn::EndDate => "end_date",
            CriteriaColumn::EraOccurrences => "occurrence_count",
            CriteriaColumn::GapDays => "gap_days",
            CriteriaColumn::Quantity => "quantity",
            CriteriaColumn::RangeHigh => "range_high",
            CriteriaColumn::RangeLow => "range_low",
            CriteriaColumn::Refills => "refills",
            CriteriaColumn::StartDate => "start_date",
            CriteriaColumn::Unit => "unit_concept_id",
            CriteriaColumn::ValueAsNumber => "value_as_number",
            CriteriaColumn::VisitId => "visit_occurrence_id",
            CriteriaColumn::VisitDetailId => "visit_detail_id",
        }
    }

    fn parse(value: &str) -> Option<CriteriaColumn> {
        let upper = value.to_ascii_uppercase();
        if let Some(col) = Self::ALL.iter().find(|c| c.member_name() == upper) {
            return Some(*col);
        }
        let lower = value.to_ascii_lowercase();
        if let Some(col) = Self::ALL.iter().find(|c| c.column_name() == lower) {
            return Some(*col);
        }
        // Tolerate a trimmed `_id` suffix, e.g. `visit_occurrence`.
        if let Some(col) = Self::ALL.iter().find(|c| {
            c.column_name()
                .strip_suffix("_id")
                .is_some_and(|base| base == lower)
        }) {
            return Some(*col);
        }
        None
    }
}

impl Serialize for CriteriaColumn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.member_name())
    }
}

impl<'de> Deserialize<'de> for CriteriaColumn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        CriteriaColumn::parse(&raw)
            .ok_or_else(|| D::Error::custom(format!("unsupported occurrence count column: {raw}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    #[serde(rename = "Type")]
    pub kind: OccurrenceType,
    #[serde(rename = "Count")]
    pub count: i64,
    #[serde(rename = "IsDistinct", default, skip_serializing_if = "Option::is_none")]
    pub is_distinct: Option<bool>,
    #[serde(rename = "CountColumn", default, skip_serializing_if = "Option::is_none")]
    pub count_column: Option<CriteriaColumn>,
}

// ── Date adjustment ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateType {
    #[serde(rename = "StartDate")]
    StartDate,
    #[serde(rename = "EndDate")]
    EndDate,
}

/// Parsed for wire parity; the pipeline does not shift criterion dates by
/// it (matching the engine this compiler is conformance-tested against).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateAdjustment {
    #[serde(rename = "StartWith", default = "DateAdjustment::default_start_with")]
    pub start_with: DateType,
    #[serde(rename = "StartOffset", default)]
    pub start_offset: i64,
    #[serde(rename = "EndWith", default = "DateAdjustment::default_end_with")]
    pub end_with: DateType,
    #[serde(rename = "EndOffset", default)]
    pub end_offset: i64,
}

impl DateAdjustment {
    fn default_start_with() -> DateType {
        DateType::StartDate
    }

    fn default_end_with() -> DateType {
        DateType::EndDate
    }
}

// ── Groups ──

/// Demographic predicates evaluated against the index event's person.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DemographicCriteria {
    #[serde(rename = "Age", default, skip_serializing_if = "Option::is_none")]
    pub age: Option<NumericRange>,
    #[serde(rename = "Gender", default, skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", default, skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(rename = "Race", default, skip_serializing_if = "Vec::is_empty")]
    pub race: Vec<Concept>,
    #[serde(rename = "RaceCS", default, skip_serializing_if = "Option::is_none")]
    pub race_cs: Option<ConceptSetSelection>,
    #[serde(rename = "Ethnicity", default, skip_serializing_if = "Vec::is_empty")]
    pub ethnicity: Vec<Concept>,
    #[serde(rename = "EthnicityCS", default, skip_serializing_if = "Option::is_none")]
    pub ethnicity_cs: Option<ConceptSetSelection>,
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
}

/// A child criterion evaluated relative to each index event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CorrelatedCriteria {
    #[serde(rename = "Criteria", default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<Box<Criterion>>,
    #[serde(rename = "StartWindow", default, skip_serializing_if = "Option::is_none")]
    pub start_window: Option<Window>,
    #[serde(rename = "EndWindow", default, skip_serializing_if = "Option::is_none")]
    pub end_window: Option<Window>,
    #[serde(rename = "RestrictVisit", default, skip_serializing_if = "Option::is_none")]
    pub restrict_visit: Option<bool>,
    #[serde(
        rename = "IgnoreObservationPeriod",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub ignore_observation_period: Option<bool>,
    #[serde(rename = "Occurrence", default, skip_serializing_if = "Option::is_none")]
    pub occurrence: Option<Occurrence>,
}

/// How a group combines its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupCombinator {
    All,
    Any,
    AtLeast(i64),
    AtMost(i64),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CriteriaGroup {
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "Count", default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(rename = "CriteriaList", default, skip_serializing_if = "Vec::is_empty")]
    pub criteria_list: Vec<CorrelatedCriteria>,
    #[serde(
        rename = "DemographicCriteriaList",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub demographic_criteria_list: Vec<DemographicCriteria>,
    #[serde(rename = "Groups", default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<CriteriaGroup>,
}

impl CriteriaGroup {
    pub fn is_empty(&self) -> bool {
        self.criteria_list.is_empty()
            && self.demographic_criteria_list.is_empty()
            && self.groups.is_empty()
    }

    /// An unrecognized or absent type means ALL; AT_LEAST defaults its
    /// threshold to 1 and AT_MOST to 0 when no count is given.
    pub fn combinator(&self) -> GroupCombinator {
        let kind = self
            .kind
            .as_deref()
            .unwrap_or("ALL")
            .to_ascii_uppercase();
        match kind.as_str() {
            "ANY" => GroupCombinator::Any,
            "AT_LEAST" => GroupCombinator::AtLeast(self.count.unwrap_or(1)),
            "AT_MOST" => GroupCombinator::AtMost(self.count.unwrap_or(0)),
            _ => GroupCombinator::All,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occurrence_type_round_trips_as_integers() {
        let occ: Occurrence =
            serde_json::from_str(r#"{"Type": 2, "Count": 3, "IsDistinct": true}"#).unwrap();
        assert_eq!(occ.kind, OccurrenceType::AtLeast);
        let back = serde_json::to_value(&occ).unwrap();
        assert_eq!(back["Type"], 2);
        assert!(serde_json::from_str::<Occurrence>(r#"{"Type": 5, "Count": 1}"#).is_err());
    }

    #[test]
    fn count_column_accepts_all_spellings() {
        for spelling in ["VISIT_ID", "visit_occurrence_id", "visit_occurrence"] {
            let col: CriteriaColumn =
                serde_json::from_value(serde_json::Value::String(spelling.into())).unwrap();
            assert_eq!(col, CriteriaColumn::VisitId);
        }
        let serialized = serde_json::to_value(CriteriaColumn::VisitId).unwrap();
        assert_eq!(serialized, "VISIT_ID");
        assert!(serde_json::from_value::<CriteriaColumn>(serde_json::Value::String(
            "nonsense".into()
        ))
        .is_err());
    }

    #[test]
    fn endpoint_signed_days() {
        let before = Endpoint {
            days: Some(30),
            coeff: -1,
        };
        assert_eq!(before.signed_days(), Some(-30));
        let open = Endpoint {
            days: None,
            coeff: 1,
        };
        assert_eq!(open.signed_days(), None);
    }

    #[test]
    fn group_combinator_defaults() {
        let mut group = CriteriaGroup::default();
        assert_eq!(group.combinator(), GroupCombinator::All);
        group.kind = Some("AT_LEAST".into());
        assert_eq!(group.combinator(), GroupCombinator::AtLeast(1));
        group.count = Some(2);
        assert_eq!(group.combinator(), GroupCombinator::AtLeast(2));
        group.kind = Some("AT_MOST".into());
        group.count = None;
        assert_eq!(group.combinator(), GroupCombinator::AtMost(0));
    }

    #[test]
    fn source_concept_filter_accepts_both_shapes() {
        let bare: SourceConceptFilter = serde_json::from_str("44").unwrap();
        assert_eq!(bare, SourceConceptFilter::Concept(44));
        let object: SourceConceptFilter =
            serde_json::from_str(r#"{"CodesetId": 3, "IsExclusion": true}"#).unwrap();
        match object {
            SourceConceptFilter::Selection(sel) => {
                assert_eq!(sel.codeset_id, Some(3));
                assert!(sel.is_exclusion);
            }
            other => panic!("expected selection, got {other:?}"),
        }
    }

    #[test]
    fn defaults_are_elided_on_serialization() {
        let group = CriteriaGroup {
            kind: Some("ALL".into()),
            ..CriteriaGroup::default()
        };
        let value = serde_json::to_value(&group).unwrap();
        assert_eq!(value, serde_json::json!({"Type": "ALL"}));
    }
}
