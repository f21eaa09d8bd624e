//! Synthetic OMOP CDM fixture over in-memory DuckDB: the full table
//! surface the compiler can reference, plus row builders for the handful
//! of domains the scenarios populate.

use omop_cohort::backend::DuckDbBackend;

pub struct Cdm {
    pub backend: DuckDbBackend,
    next_row_id: i64,
}

const SCHEMA: &str = "
CREATE TABLE person (
    person_id BIGINT, gender_concept_id BIGINT, year_of_birth INTEGER,
    race_concept_id BIGINT, ethnicity_concept_id BIGINT
);
CREATE TABLE observation_period (
    observation_period_id BIGINT, person_id BIGINT,
    observation_period_start_date DATE, observation_period_end_date DATE,
    period_type_concept_id BIGINT
);
CREATE TABLE condition_occurrence (
    condition_occurrence_id BIGINT, person_id BIGINT, condition_concept_id BIGINT,
    condition_start_date DATE, condition_end_date DATE,
    condition_type_concept_id BIGINT, condition_status_concept_id BIGINT,
    stop_reason VARCHAR, provider_id BIGINT, visit_occurrence_id BIGINT,
    condition_source_concept_id BIGINT
);
CREATE TABLE drug_exposure (
    drug_exposure_id BIGINT, person_id BIGINT, drug_concept_id BIGINT,
    drug_exposure_start_date DATE, drug_exposure_end_date DATE,
    drug_type_concept_id BIGINT, stop_reason VARCHAR, refills INTEGER,
    quantity DOUBLE, days_supply INTEGER, lot_number VARCHAR,
    route_concept_id BIGINT, dose_unit_concept_id BIGINT,
    provider_id BIGINT, visit_occurrence_id BIGINT, drug_source_concept_id BIGINT
);
CREATE TABLE drug_era (
    drug_era_id BIGINT, person_id BIGINT, drug_concept_id BIGINT,
    drug_era_start_date DATE, drug_era_end_date DATE,
    drug_exposure_count INTEGER, gap_days INTEGER
);
CREATE TABLE condition_era (
    condition_era_id BIGINT, person_id BIGINT, condition_concept_id BIGINT,
    condition_era_start_date DATE, condition_era_end_date DATE,
    condition_occurrence_count INTEGER
);
CREATE TABLE dose_era (
    dose_era_id BIGINT, person_id BIGINT, drug_concept_id BIGINT,
    unit_concept_id BIGINT, dose_value DOUBLE,
    dose_era_start_date DATE, dose_era_end_date DATE
);
CREATE TABLE visit_occurrence (
    visit_occurrence_id BIGINT, person_id BIGINT, visit_concept_id BIGINT,
    visit_start_date DATE, visit_end_date DATE, visit_type_concept_id BIGINT,
    provider_id BIGINT, care_site_id BIGINT, visit_source_concept_id BIGINT
);
CREATE TABLE visit_detail (
    visit_detail_id BIGINT, person_id BIGINT, visit_detail_concept_id BIGINT,
    visit_detail_start_date DATE, visit_detail_end_date DATE,
    visit_detail_type_concept_id BIGINT, provider_id BIGINT, care_site_id BIGINT,
    visit_detail_source_concept_id BIGINT, visit_occurrence_id BIGINT
);
CREATE TABLE measurement (
    measurement_id BIGINT, person_id BIGINT, measurement_concept_id BIGINT,
    measurement_date DATE, measurement_type_concept_id BIGINT,
    operator_concept_id BIGINT, value_as_number DOUBLE, value_as_concept_id BIGINT,
    unit_concept_id BIGINT, range_low DOUBLE, range_high DOUBLE,
    provider_id BIGINT, visit_occurrence_id BIGINT, measurement_source_concept_id BIGINT
);
CREATE TABLE observation (
    observation_id BIGINT, person_id BIGINT, observation_concept_id BIGINT,
    observation_date DATE, observation_type_concept_id BIGINT,
    value_as_number DOUBLE, value_as_string VARCHAR, value_as_concept_id BIGINT,
    qualifier_concept_id BIGINT, unit_concept_id BIGINT,
    provider_id BIGINT, visit_occurrence_id BIGINT, observation_source_concept_id BIGINT
);
CREATE TABLE procedure_occurrence (
    procedure_occurrence_id BIGINT, person_id BIGINT, procedure_concept_id BIGINT,
    procedure_date DATE, procedure_type_concept_id BIGINT, modifier_concept_id BIGINT,
    quantity INTEGER, provider_id BIGINT, visit_occurrence_id BIGINT,
    procedure_source_concept_id BIGINT
);
CREATE TABLE device_exposure (
    device_exposure_id BIGINT, person_id BIGINT, device_concept_id BIGINT,
    device_exposure_start_date DATE, device_exposure_end_date DATE,
    device_type_concept_id BIGINT, unique_device_id VARCHAR, quantity INTEGER,
    provider_id BIGINT, visit_occurrence_id BIGINT, device_source_concept_id BIGINT
);
CREATE TABLE specimen (
    specimen_id BIGINT, person_id BIGINT, specimen_concept_id BIGINT,
    specimen_type_concept_id BIGINT, specimen_date DATE, quantity DOUBLE,
    unit_concept_id BIGINT, anatomic_site_concept_id BIGINT,
    disease_status_concept_id BIGINT, specimen_source_id VARCHAR,
    specimen_source_concept_id BIGINT
);
CREATE TABLE death (
    person_id BIGINT, death_date DATE, death_type_concept_id BIGINT,
    cause_concept_id BIGINT, cause_source_concept_id BIGINT
);
CREATE TABLE payer_plan_period (
    payer_plan_period_id BIGINT, person_id BIGINT,
    payer_plan_period_start_date DATE, payer_plan_period_end_date DATE,
    payer_concept_id BIGINT, plan_concept_id BIGINT, sponsor_concept_id BIGINT,
    stop_reason_concept_id BIGINT, payer_source_concept_id BIGINT,
    plan_source_concept_id BIGINT, sponsor_source_concept_id BIGINT,
    stop_reason_source_concept_id BIGINT
);
CREATE TABLE provider (provider_id BIGINT, specialty_concept_id BIGINT, care_site_id BIGINT);
CREATE TABLE care_site (care_site_id BIGINT, place_of_service_concept_id BIGINT, location_id BIGINT);
CREATE TABLE location (location_id BIGINT, region_concept_id BIGINT);
CREATE TABLE location_history (
    entity_id BIGINT, domain_id VARCHAR, location_id BIGINT,
    start_date DATE, end_date DATE
);
CREATE TABLE concept (concept_id BIGINT, concept_name VARCHAR, invalid_reason VARCHAR);
CREATE TABLE concept_ancestor (ancestor_concept_id BIGINT, descendant_concept_id BIGINT);
CREATE TABLE concept_relationship (
    concept_id_1 BIGINT, concept_id_2 BIGINT, relationship_id VARCHAR, invalid_reason VARCHAR
);
";

#[allow(dead_code)]
impl Cdm {
    pub fn new() -> Cdm {
        let mut backend = DuckDbBackend::open_in_memory().expect("in-memory duckdb");
        use omop_cohort::Backend as _;
        backend.execute(SCHEMA).expect("create cdm schema");
        Cdm {
            backend,
            next_row_id: 0,
        }
    }

    fn next_id(&mut self) -> i64 {
        self.next_row_id += 1;
        self.next_row_id
    }

    pub fn run(&mut self, sql: &str) {
        use omop_cohort::Backend as _;
        self.backend.execute(sql).expect("fixture insert");
    }

    /// A person born 1980 with a male gender concept.
    pub fn add_person(&mut self, person_id: i64) {
        self.run(&format!(
            "INSERT INTO person (person_id, gender_concept_id, year_of_birth, \
             race_concept_id, ethnicity_concept_id) \
             VALUES ({person_id}, 8507, 1980, 8527, 38003564)"
        ));
    }

    pub fn add_observation_period(&mut self, person_id: i64, start: &str, end: &str) {
        let id = self.next_id();
        self.run(&format!(
            "INSERT INTO observation_period (observation_period_id, person_id, \
             observation_period_start_date, observation_period_end_date, period_type_concept_id) \
             VALUES ({id}, {person_id}, DATE '{start}', DATE '{end}', 44814724)"
        ));
    }

    pub fn add_condition(
        &mut self,
        person_id: i64,
        concept_id: i64,
        start: &str,
        end: &str,
        visit_occurrence_id: Option<i64>,
    ) {
        let id = self.next_id();
        let visit = visit_occurrence_id
            .map(|v| v.to_string())
            .unwrap_or_else(|| "NULL".to_string());
        self.run(&format!(
            "INSERT INTO condition_occurrence (condition_occurrence_id, person_id, \
             condition_concept_id, condition_start_date, condition_end_date, \
             condition_type_concept_id, visit_occurrence_id) \
             VALUES ({id}, {person_id}, {concept_id}, DATE '{start}', DATE '{end}', \
             32020, {visit})"
        ));
    }

    pub fn add_drug_exposure(
        &mut self,
        person_id: i64,
        concept_id: i64,
        start: &str,
        end: &str,
        days_supply: Option<i64>,
    ) {
        let id = self.next_id();
        let supply = days_supply
            .map(|d| d.to_string())
            .unwrap_or_else(|| "NULL".to_string());
        self.run(&format!(
            "INSERT INTO drug_exposure (drug_exposure_id, person_id, drug_concept_id, \
             drug_exposure_start_date, drug_exposure_end_date, drug_type_concept_id, \
             days_supply) \
             VALUES ({id}, {person_id}, {concept_id}, DATE '{start}', DATE '{end}', \
             38000177, {supply})"
        ));
    }

    pub fn add_visit(
        &mut self,
        visit_occurrence_id: i64,
        person_id: i64,
        concept_id: i64,
        start: &str,
        end: &str,
    ) {
        self.run(&format!(
            "INSERT INTO visit_occurrence (visit_occurrence_id, person_id, visit_concept_id, \
             visit_start_date, visit_end_date, visit_type_concept_id) \
             VALUES ({visit_occurrence_id}, {person_id}, {concept_id}, \
             DATE '{start}', DATE '{end}', 44818517)"
        ));
    }

    pub fn add_measurement(
        &mut self,
        person_id: i64,
        concept_id: i64,
        date: &str,
        value: f64,
        unit_concept_id: Option<i64>,
    ) {
        let id = self.next_id();
        let unit = unit_concept_id
            .map(|u| u.to_string())
            .unwrap_or_else(|| "NULL".to_string());
        self.run(&format!(
            "INSERT INTO measurement (measurement_id, person_id, measurement_concept_id, \
             measurement_date, measurement_type_concept_id, value_as_number, unit_concept_id) \
             VALUES ({id}, {person_id}, {concept_id}, DATE '{date}', 44818702, {value}, {unit})"
        ));
    }
}

/// One literal concept set: `{id: [concept ids]}` with no descendants.
pub fn concept_set(id: i64, name: &str, concept_ids: &[i64]) -> serde_json::Value {
    let items: Vec<serde_json::Value> = concept_ids
        .iter()
        .map(|cid| serde_json::json!({"concept": {"CONCEPT_ID": cid}}))
        .collect();
    serde_json::json!({"id": id, "name": name, "expression": {"items": items}})
}
