//! Wire-field inventory: the set of properties the compiler interprets on
//! each wire class. The lenient parser ignores unknown fields (as the
//! reference engine does); strict mode walks the raw document against this
//! inventory and reports everything the compiler would silently drop.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownField {
    /// JSON-pointer-ish path to the owning object.
    pub path: String,
    /// The wire class the object was interpreted as.
    pub class: String,
    /// The unrecognized property name.
    pub field: String,
}

impl std::fmt::Display for UnknownField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{} (on {})", self.path, self.field, self.class)
    }
}

/// How a known property's value is interpreted.
enum Shape {
    /// Opaque scalar (or anything we do not descend into).
    Leaf,
    /// A nested object of the named class.
    Object(&'static str),
    /// A list of objects of the named class.
    List(&'static str),
    /// A criterion wrapper: `{"ConditionOccurrence": {…}}`.
    Criterion,
    /// A list of criterion wrappers.
    CriterionList,
    /// Integer or a ConceptSetSelection object.
    ScalarOrSelection,
}

const CRITERION_CLASSES: [&str; 15] = [
    "ConditionEra",
    "ConditionOccurrence",
    "Death",
    "DeviceExposure",
    "DoseEra",
    "DrugEra",
    "DrugExposure",
    "Measurement",
    "Observation",
    "ObservationPeriod",
    "PayerPlanPeriod",
    "ProcedureOccurrence",
    "Specimen",
    "VisitDetail",
    "VisitOccurrence",
];

fn shape(class: &str, property: &str) -> Option<Shape> {
    use Shape::*;
    // Cross-cutting properties every criterion carries.
    if CRITERION_CLASSES.contains(&class) {
        match property {
            "CorrelatedCriteria" => return Some(Object("CriteriaGroup")),
            "DateAdjustment" => return Some(Object("DateAdjustment")),
            "CodesetId" | "First" => return Some(Leaf),
            "Age" | "AgeAtStart" | "AgeAtEnd" => return Some(Object("NumericRange")),
            "Gender" => return Some(List("Concept")),
            "GenderCS" => return Some(Object("ConceptSetSelection")),
            "ProviderSpecialty" => return Some(List("Concept")),
            "ProviderSpecialtyCS" => return Some(Object("ConceptSetSelection")),
            "VisitType" => return Some(List("Concept")),
            "VisitTypeCS" => return Some(Object("ConceptSetSelection")),
            "OccurrenceStartDate" | "OccurrenceEndDate" => return Some(Object("DateRange")),
            _ => {}
        }
    }
    let found = match (class, property) {
        ("CohortExpression", "cdmVersionRange" | "Title") => Leaf,
        ("CohortExpression", "PrimaryCriteria") => Object("PrimaryCriteria"),
        ("CohortExpression", "AdditionalCriteria") => Object("CriteriaGroup"),
        ("CohortExpression", "ConceptSets") => List("ConceptSet"),
        ("CohortExpression", "QualifiedLimit" | "ExpressionLimit") => Object("ResultLimit"),
        ("CohortExpression", "InclusionRules") => List("InclusionRule"),
        ("CohortExpression", "EndStrategy") => Object("EndStrategy"),
        ("CohortExpression", "CensoringCriteria") => CriterionList,
        ("CohortExpression", "CollapseSettings") => Object("CollapseSettings"),
        ("CohortExpression", "CensorWindow") => Object("Period"),

        ("PrimaryCriteria", "CriteriaList") => CriterionList,
        ("PrimaryCriteria", "ObservationWindow") => Object("ObservationWindow"),
        ("PrimaryCriteria", "PrimaryCriteriaLimit") => Object("ResultLimit"),
        ("ObservationWindow", "PriorDays" | "PostDays") => Leaf,
        ("ResultLimit", "Type") => Leaf,

        ("ConceptSet", "id" | "name") => Leaf,
        ("ConceptSet", "expression") => Object("ConceptSetExpression"),
        ("ConceptSetExpression", "items") => List("ConceptSetItem"),
        ("ConceptSetItem", "concept") => Object("Concept"),
        ("ConceptSetItem", "isExcluded" | "includeDescendants" | "includeMapped") => Leaf,
        (
            "Concept",
            "CONCEPT_ID" | "CONCEPT_NAME" | "STANDARD_CONCEPT" | "INVALID_REASON"
            | "INVALID_REASON_CAPTION" | "CONCEPT_CODE" | "DOMAIN_ID" | "VOCABULARY_ID"
            | "CONCEPT_CLASS_ID" | "STANDARD_CONCEPT_CAPTION",
        ) => Leaf,

        ("CriteriaGroup", "Type" | "Count") => Leaf,
        ("CriteriaGroup", "CriteriaList") => List("CorrelatedCriteria"),
        ("CriteriaGroup", "DemographicCriteriaList") => List("DemographicCriteria"),
        ("CriteriaGroup", "Groups") => List("CriteriaGroup"),
        ("CorrelatedCriteria", "Criteria") => Criterion,
        ("CorrelatedCriteria", "StartWindow" | "EndWindow") => Object("Window"),
        ("CorrelatedCriteria", "RestrictVisit" | "IgnoreObservationPeriod") => Leaf,
        ("CorrelatedCriteria", "Occurrence") => Object("Occurrence"),
        ("Window", "Start" | "End") => Object("Endpoint"),
        ("Window", "UseIndexEnd" | "UseEventEnd") => Leaf,
        ("Endpoint", "Days" | "Coeff") => Leaf,
        ("Occurrence", "Type" | "Count" | "IsDistinct" | "CountColumn") => Leaf,

        ("DemographicCriteria", "Age") => Object("NumericRange"),
        ("DemographicCriteria", "Gender" | "Race" | "Ethnicity") => List("Concept"),
        ("DemographicCriteria", "GenderCS" | "RaceCS" | "EthnicityCS") => {
            Object("ConceptSetSelection")
        }
        ("DemographicCriteria", "OccurrenceStartDate" | "OccurrenceEndDate") => {
            Object("DateRange")
        }

        ("NumericRange" | "DateRange", "Value" | "Op" | "Extent") => Leaf,
        ("TextFilter", "Text" | "Op") => Leaf,
        ("ConceptSetSelection", "CodesetId" | "IsExclusion") => Leaf,
        ("Period" | "UserDefinedPeriod", "StartDate" | "EndDate") => Leaf,
        ("DateAdjustment", "StartWith" | "StartOffset" | "EndWith" | "EndOffset") => Leaf,

        ("InclusionRule", "name" | "Name" | "description" | "Description") => Leaf,
        ("InclusionRule", "expression" | "Expression") => Object("CriteriaGroup"),
        ("EndStrategy", "DateOffset") => Object("DateOffsetStrategy"),
        ("EndStrategy", "CustomEra") => Object("CustomEraStrategy"),
        ("DateOffsetStrategy", "DateField" | "Offset") => Leaf,
        (
            "CustomEraStrategy",
            "DrugCodesetId" | "GapDays" | "Offset" | "DaysSupplyOverride",
        ) => Leaf,
        ("CollapseSettings", "CollapseType" | "EraPad") => Leaf,

        // Domain-specific attributes.
        ("ConditionOccurrence", "ConditionType" | "ConditionStatus") => List("Concept"),
        ("ConditionOccurrence", "ConditionTypeCS" | "ConditionStatusCS") => {
            Object("ConceptSetSelection")
        }
        ("ConditionOccurrence", "ConditionTypeExclude") => Leaf,
        ("ConditionOccurrence", "StopReason") => Object("TextFilter"),
        ("ConditionOccurrence", "ConditionSourceConcept") => ScalarOrSelection,
        ("ConditionOccurrence", "VisitSourceConcept") => Leaf,

        ("ConditionEra" | "DrugEra" | "DoseEra", "EraStartDate" | "EraEndDate") => {
            Object("DateRange")
        }
        ("ConditionEra" | "DrugEra", "OccurrenceCount") => Object("NumericRange"),
        ("ConditionEra" | "DrugEra" | "DoseEra", "EraLength") => Object("NumericRange"),
        ("DrugEra", "GapDays") => Object("NumericRange"),
        ("DoseEra", "Unit") => List("Concept"),
        ("DoseEra", "UnitCS") => Object("ConceptSetSelection"),
        ("DoseEra", "DoseValue") => Object("NumericRange"),

        ("DrugExposure", "DrugType") => List("Concept"),
        ("DrugExposure", "DrugTypeCS") => Object("ConceptSetSelection"),
        ("DrugExposure", "DrugTypeExclude") => Leaf,
        ("DrugExposure", "RouteConcept" | "DoseUnit") => List("Concept"),
        ("DrugExposure", "RouteConceptCS" | "DoseUnitCS") => Object("ConceptSetSelection"),
        (
            "DrugExposure",
            "EffectiveDrugDose" | "Quantity" | "DaysSupply" | "Refills",
        ) => Object("NumericRange"),
        ("DrugExposure", "StopReason" | "LotNumber") => Object("TextFilter"),
        ("DrugExposure", "DrugSourceConcept") => ScalarOrSelection,

        ("Measurement", "MeasurementType") => List("Concept"),
        ("Measurement", "MeasurementTypeCS") => Object("ConceptSetSelection"),
        ("Measurement", "MeasurementTypeExclude" | "Abnormal") => Leaf,
        ("Measurement", "Operator" | "OperatorConcept") => List("Concept"),
        ("Measurement", "OperatorCS" | "OperatorConceptCS") => Object("ConceptSetSelection"),
        (
            "Measurement",
            "ValueAsNumber" | "RangeLow" | "RangeHigh" | "RangeLowRatio" | "RangeHighRatio",
        ) => Object("NumericRange"),
        ("Measurement" | "Observation", "ValueAsConcept") => List("Concept"),
        ("Measurement" | "Observation", "ValueAsConceptCS") => Object("ConceptSetSelection"),
        ("Measurement" | "Observation", "Unit") => List("Concept"),
        ("Measurement" | "Observation", "UnitCS") => Object("ConceptSetSelection"),
        ("Measurement", "MeasurementSourceConcept") => ScalarOrSelection,

        ("Observation", "ObservationType" | "Qualifier") => List("Concept"),
        ("Observation", "ObservationTypeCS" | "QualifierCS") => Object("ConceptSetSelection"),
        ("Observation", "ObservationTypeExclude") => Leaf,
        ("Observation", "ValueAsNumber") => Object("NumericRange"),
        ("Observation", "ValueAsString") => Object("TextFilter"),
        ("Observation", "ObservationSourceConcept") => ScalarOrSelection,

        (
            "ObservationPeriod" | "PayerPlanPeriod",
            "PeriodStartDate" | "PeriodEndDate",
        ) => Object("DateRange"),
        ("ObservationPeriod" | "PayerPlanPeriod", "PeriodLength") => Object("NumericRange"),
        ("ObservationPeriod" | "PayerPlanPeriod", "UserDefinedPeriod") => {
            Object("UserDefinedPeriod")
        }
        ("ObservationPeriod", "PeriodType") => List("Concept"),
        ("ObservationPeriod", "PeriodTypeCS") => Object("ConceptSetSelection"),
        (
            "PayerPlanPeriod",
            "PayerConcept" | "PlanConcept" | "SponsorConcept" | "StopReasonConcept"
            | "PayerSourceConcept" | "PlanSourceConcept" | "SponsorSourceConcept"
            | "StopReasonSourceConcept",
        ) => Leaf,

        ("ProcedureOccurrence", "ProcedureType" | "Modifier") => List("Concept"),
        ("ProcedureOccurrence", "ProcedureTypeCS" | "ModifierCS") => {
            Object("ConceptSetSelection")
        }
        ("ProcedureOccurrence", "ProcedureTypeExclude") => Leaf,
        ("ProcedureOccurrence", "Quantity") => Object("NumericRange"),
        ("ProcedureOccurrence", "ProcedureSourceConcept") => ScalarOrSelection,

        ("DeviceExposure", "DeviceType") => List("Concept"),
        ("DeviceExposure", "DeviceTypeCS") => Object("ConceptSetSelection"),
        ("DeviceExposure", "DeviceTypeExclude") => Leaf,
        ("DeviceExposure", "Quantity") => Object("NumericRange"),
        ("DeviceExposure", "UniqueDeviceId") => Object("TextFilter"),
        ("DeviceExposure", "DeviceSourceConcept") => ScalarOrSelection,

        ("Specimen", "SpecimenType" | "Unit" | "AnatomicSite" | "DiseaseStatus") => {
            List("Concept")
        }
        (
            "Specimen",
            "SpecimenTypeCS" | "UnitCS" | "AnatomicSiteCS" | "DiseaseStatusCS",
        ) => Object("ConceptSetSelection"),
        ("Specimen", "SpecimenTypeExclude") => Leaf,
        ("Specimen", "Quantity") => Object("NumericRange"),
        ("Specimen", "SourceId") => Object("TextFilter"),
        ("Specimen", "SpecimenSourceConcept") => ScalarOrSelection,

        ("Death", "DeathType") => List("Concept"),
        ("Death", "DeathTypeCS") => Object("ConceptSetSelection"),
        ("Death", "DeathTypeExclude" | "DeathSourceConcept") => Leaf,

        ("VisitOccurrence", "VisitTypeExclude" | "VisitSourceConcept") => Leaf,
        ("VisitOccurrence", "VisitLength") => Object("NumericRange"),
        ("VisitOccurrence", "PlaceOfService") => List("Concept"),
        ("VisitOccurrence", "PlaceOfServiceCS") => Object("ConceptSetSelection"),
        ("VisitOccurrence" | "VisitDetail", "PlaceOfServiceLocation") => Leaf,

        ("VisitDetail", "VisitDetailStartDate" | "VisitDetailEndDate") => Object("DateRange"),
        ("VisitDetail", "VisitDetailTypeCS" | "PlaceOfServiceCS") => {
            Object("ConceptSetSelection")
        }
        ("VisitDetail", "VisitDetailSourceConcept") => Leaf,
        ("VisitDetail", "VisitDetailLength") => Object("NumericRange"),

        _ => return None,
    };
    Some(found)
}

/// Walk a raw cohort document and report every property the compiler does
/// not interpret.
pub fn scan_unknown_fields(document: &Value) -> Vec<UnknownField> {
    let mut out = Vec::new();
    walk_object(document, "CohortExpression", "$", &mut out);
    out
}

fn walk_object(value: &Value, class: &str, path: &str, out: &mut Vec<UnknownField>) {
    let Some(object) = value.as_object() else {
        return;
    };
    for (property, child) in object {
        match shape(class, property) {
            None => out.push(UnknownField {
                path: path.to_string(),
                class: class.to_string(),
                field: property.clone(),
            }),
            Some(Shape::Leaf) => {}
            Some(Shape::Object(child_class)) => {
                walk_object(child, child_class, &format!("{path}.{property}"), out);
            }
            Some(Shape::List(child_class)) => {
                walk_list(child, child_class, &format!("{path}.{property}"), out);
            }
            Some(Shape::Criterion) => {
                walk_criterion(child, &format!("{path}.{property}"), out);
            }
            Some(Shape::CriterionList) => {
                if let Some(items) = child.as_array() {
                    for (index, item) in items.iter().enumerate() {
                        walk_criterion(item, &format!("{path}.{property}[{index}]"), out);
                    }
                }
            }
            Some(Shape::ScalarOrSelection) => {
                if child.is_object() {
                    walk_object(
                        child,
                        "ConceptSetSelection",
                        &format!("{path}.{property}"),
                        out,
                    );
                }
            }
        }
    }
}

fn walk_list(value: &Value, class: &str, path: &str, out: &mut Vec<UnknownField>) {
    let Some(items) = value.as_array() else { return };
    for (index, item) in items.iter().enumerate() {
        walk_object(item, class, &format!("{path}[{index}]"), out);
    }
}

fn walk_criterion(value: &Value, path: &str, out: &mut Vec<UnknownField>) {
    let Some(object) = value.as_object() else {
        return;
    };
    for (kind, body) in object {
        if CRITERION_CLASSES.contains(&kind.as_str()) {
            walk_object(body, kind, &format!("{path}.{kind}"), out);
        } else {
            out.push(UnknownField {
                path: path.to_string(),
                class: "Criteria".to_string(),
                field: kind.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_document_reports_nothing() {
        let doc = serde_json::json!({
            "ConceptSets": [
                {"id": 1, "name": "x", "expression": {"items": [
                    {"concept": {"CONCEPT_ID": 1}, "includeDescendants": true}
                ]}}
            ],
            "PrimaryCriteria": {
                "CriteriaList": [{"ConditionOccurrence": {"CodesetId": 1, "First": true}}],
                "ObservationWindow": {"PriorDays": 0, "PostDays": 0},
                "PrimaryCriteriaLimit": {"Type": "First"}
            },
            "ExpressionLimit": {"Type": "All"},
            "CollapseSettings": {"CollapseType": "ERA", "EraPad": 0}
        });
        assert!(scan_unknown_fields(&doc).is_empty());
    }

    #[test]
    fn unknown_fields_are_located() {
        let doc = serde_json::json!({
            "PrimaryCriteria": {
                "CriteriaList": [{"ConditionOccurrence": {"CodesetId": 1, "Mystery": 7}}],
                "PrimaryCriteriaLimit": {"Type": "All"}
            },
            "FutureKnob": true
        });
        let unknown = scan_unknown_fields(&doc);
        assert_eq!(unknown.len(), 2);
        assert!(unknown.iter().any(|u| u.field == "FutureKnob" && u.path == "$"));
        assert!(unknown
            .iter()
            .any(|u| u.field == "Mystery" && u.class == "ConditionOccurrence"));
    }

    #[test]
    fn unknown_criterion_kind_is_reported() {
        let doc = serde_json::json!({
            "PrimaryCriteria": {
                "CriteriaList": [{"Telepathy": {}}],
                "PrimaryCriteriaLimit": {"Type": "All"}
            }
        });
        let unknown = scan_unknown_fields(&doc);
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].field, "Telepathy");
    }

    #[test]
    fn nested_correlated_criteria_are_walked() {
        let doc = serde_json::json!({
            "PrimaryCriteria": {
                "CriteriaList": [{"ConditionOccurrence": {
                    "CorrelatedCriteria": {
                        "Type": "ALL",
                        "CriteriaList": [{
                            "Criteria": {"DrugExposure": {"Oddball": 1}},
                            "StartWindow": {"Start": {"Days": 1, "Coeff": -1}},
                            "Occurrence": {"Type": 2, "Count": 1}
                        }]
                    }
                }}],
                "PrimaryCriteriaLimit": {"Type": "All"}
            }
        });
        let unknown = scan_unknown_fields(&doc);
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].field, "Oddball");
        assert!(unknown[0].path.contains("CriteriaList[0].Criteria.DrugExposure"));
    }
}
