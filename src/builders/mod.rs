//! Criterion builders: one per domain kind, all emitting the uniform
//! five-column event relation. `build_events` is the single entry point; it
//! dispatches on the criterion variant, applies any embedded correlated
//! criteria group, and serves repeated identical criteria out of the
//! context's slice cache.

pub mod events;
pub mod filters;
pub mod spans;

use crate::context::BuildContext;
use crate::error::CohortError;
use crate::groups;
use crate::models::Criterion;
use crate::sql::Relation;

pub fn build_events(
    criterion: &Criterion,
    ctx: &mut BuildContext,
) -> Result<Relation, CohortError> {
    let relation = match criterion {
        Criterion::ConditionEra(c) => spans::condition_era(c, ctx)?,
        Criterion::ConditionOccurrence(c) => events::condition_occurrence(c, ctx)?,
        Criterion::Death(c) => events::death(c, ctx)?,
        Criterion::DeviceExposure(c) => events::device_exposure(c, ctx)?,
        Criterion::DoseEra(c) => spans::dose_era(c, ctx)?,
        Criterion::DrugEra(c) => spans::drug_era(c, ctx)?,
        Criterion::DrugExposure(c) => events::drug_exposure(c, ctx)?,
        Criterion::Measurement(c) => events::measurement(c, ctx)?,
        Criterion::Observation(c) => events::observation(c, ctx)?,
        Criterion::ObservationPeriod(c) => spans::observation_period(c, ctx)?,
        Criterion::PayerPlanPeriod(c) => spans::payer_plan_period(c, ctx)?,
        Criterion::ProcedureOccurrence(c) => events::procedure_occurrence(c, ctx)?,
        Criterion::Specimen(c) => events::specimen(c, ctx)?,
        Criterion::VisitDetail(c) => spans::visit_detail(c, ctx)?,
        Criterion::VisitOccurrence(c) => spans::visit_occurrence(c, ctx)?,
    };

    let relation = match criterion.correlated_criteria() {
        Some(group) => groups::apply_criteria_group(relation, Some(group), ctx)?,
        None => relation,
    };

    let cache_key = slice_cache_key(criterion)?;
    let label = criterion.kind().to_ascii_lowercase();
    ctx.get_or_materialize_slice(cache_key, relation, &label)
}

/// Identical criteria share one materialized slice; the serialized form is
/// the identity.
fn slice_cache_key(criterion: &Criterion) -> Result<String, CohortError> {
    let payload = serde_json::to_string(criterion)?;
    Ok(format!("{}:{payload}", criterion.kind()))
}
