//! Authored concept sets: the concept selections a cohort definition
//! declares, before vocabulary expansion.

use serde::{Deserialize, Serialize};

use super::criteria::Concept;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptSetItem {
    pub concept: Concept,
    #[serde(rename = "isExcluded", default, skip_serializing_if = "Option::is_none")]
    pub is_excluded: Option<bool>,
    #[serde(
        rename = "includeDescendants",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub include_descendants: Option<bool>,
    #[serde(
        rename = "includeMapped",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub include_mapped: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConceptSetExpression {
    #[serde(default)]
    pub items: Vec<ConceptSetItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptSet {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<ConceptSetExpression>,
}

impl ConceptSet {
    pub fn is_empty(&self) -> bool {
        self.expression
            .as_ref()
            .map(|e| e.items.is_empty())
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_browser_export_shape() {
        let json = r#"{
            "id": 1,
            "name": "Type 2 diabetes",
            "expression": {
                "items": [
                    {"concept": {"CONCEPT_ID": 201826, "CONCEPT_NAME": "Type 2 diabetes mellitus"},
                     "includeDescendants": true},
                    {"concept": {"CONCEPT_ID": 4058243}, "isExcluded": true}
                ]
            }
        }"#;
        let set: ConceptSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.id, 1);
        assert!(!set.is_empty());
        let items = &set.expression.as_ref().unwrap().items;
        assert_eq!(items[0].concept.concept_id, Some(201826));
        assert_eq!(items[0].include_descendants, Some(true));
        assert_eq!(items[1].is_excluded, Some(true));
    }

    #[test]
    fn missing_expression_is_empty() {
        let set: ConceptSet = serde_json::from_str(r#"{"id": 3, "name": "empty"}"#).unwrap();
        assert!(set.is_empty());
    }
}
