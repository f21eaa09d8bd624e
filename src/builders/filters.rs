//! Filter application helpers shared by every domain builder. Each helper
//! pushes predicates (and joins, where a filter needs one) onto the
//! criterion's SELECT under construction.

use crate::context::BuildContext;
use crate::dialect::Dialect;
use crate::error::CohortError;
use crate::models::criteria::concept_ids;
use crate::models::{Concept, ConceptSetSelection, DateRange, NumericRange, RangeOp, TextFilter};
use crate::sql::{quote_str, Relation, SelectBuilder};

/// Semi-join a concept column against one codeset.
pub fn apply_codeset_filter(
    q: &mut SelectBuilder,
    ctx: &BuildContext,
    column: &str,
    codeset_id: Option<i64>,
) {
    if let Some(codeset_id) = codeset_id {
        q.filter(codeset_in(ctx, column, codeset_id));
    }
}

pub fn codeset_in(ctx: &BuildContext, column: &str, codeset_id: i64) -> String {
    format!(
        "{column} IN (SELECT cs.concept_id FROM {codesets} cs WHERE cs.codeset_id = {codeset_id})",
        codesets = ctx.codesets()
    )
}

/// Semi- or anti-join a column against a codeset selection.
pub fn apply_concept_set_selection(
    q: &mut SelectBuilder,
    ctx: &BuildContext,
    column: &str,
    selection: Option<&ConceptSetSelection>,
) {
    let Some(selection) = selection else { return };
    let Some(codeset_id) = selection.codeset_id else {
        return;
    };
    if selection.is_exclusion {
        q.filter(format!(
            "NOT EXISTS (SELECT 1 FROM {codesets} cs \
             WHERE cs.codeset_id = {codeset_id} AND cs.concept_id = {column})",
            codesets = ctx.codesets()
        ));
    } else {
        q.filter(codeset_in(ctx, column, codeset_id));
    }
}

/// Discrete concept-id list filter; a list with no usable ids is a no-op.
pub fn apply_concept_list(
    q: &mut SelectBuilder,
    dialect: Dialect,
    column: &str,
    concepts: &[Concept],
    exclude: bool,
) {
    let ids = concept_ids(concepts);
    if ids.is_empty() {
        return;
    }
    let list = dialect.id_list(&ids);
    if exclude {
        q.filter(format!("{column} NOT IN ({list})"));
    } else {
        q.filter(format!("{column} IN ({list})"));
    }
}

/// The `bt` operator is an inclusive between and requires an extent.
pub fn numeric_predicate(
    expr: &str,
    range: &NumericRange,
) -> Result<String, CohortError> {
    let op = range.op.unwrap_or(RangeOp::Gte);
    let value = range
        .value
        .as_ref()
        .ok_or_else(|| CohortError::invalid("numeric range filter has no value"))?;
    if op.is_between() {
        let extent = range
            .extent
            .as_ref()
            .ok_or_else(|| CohortError::invalid("between operator requires an extent"))?;
        let between = format!("{expr} BETWEEN {value} AND {extent}");
        return Ok(if op.is_negated() {
            format!("NOT ({between})")
        } else {
            between
        });
    }
    Ok(format!("{expr} {} {value}", op.comparator()))
}

pub fn apply_numeric_range(
    q: &mut SelectBuilder,
    expr: &str,
    range: Option<&NumericRange>,
) -> Result<(), CohortError> {
    if let Some(range) = range {
        q.filter(numeric_predicate(expr, range)?);
    }
    Ok(())
}

pub fn date_predicate(
    dialect: Dialect,
    column: &str,
    range: &DateRange,
) -> Result<String, CohortError> {
    if range.op.is_between() {
        let extent = range
            .extent
            .as_ref()
            .ok_or_else(|| CohortError::invalid("between operator requires an extent"))?;
        let between = format!(
            "{column} BETWEEN {} AND {}",
            dialect.date_literal(&range.value),
            dialect.date_literal(extent)
        );
        return Ok(if range.op.is_negated() {
            format!("NOT ({between})")
        } else {
            between
        });
    }
    Ok(format!(
        "{column} {} {}",
        range.op.comparator(),
        dialect.date_literal(&range.value)
    ))
}

pub fn apply_date_range(
    q: &mut SelectBuilder,
    dialect: Dialect,
    column: &str,
    range: Option<&DateRange>,
) -> Result<(), CohortError> {
    if let Some(range) = range {
        q.filter(date_predicate(dialect, column, range)?);
    }
    Ok(())
}

/// LIKE with anchoring chosen by the operator; absent op means contains.
pub fn apply_text_filter(q: &mut SelectBuilder, column: &str, filter: Option<&TextFilter>) {
    let Some(filter) = filter else { return };
    let Some(text) = filter.text.as_deref() else {
        return;
    };
    let op = filter.op.unwrap_or(crate::models::TextOp::Contains);
    let (leading, trailing) = op.wildcards();
    let pattern = format!(
        "{}{}{}",
        if leading { "%" } else { "" },
        text,
        if trailing { "%" } else { "" }
    );
    let like = format!("{column} LIKE {}", quote_str(&pattern));
    if op.is_negated() {
        q.filter(format!("NOT ({like})"));
    } else {
        q.filter(like);
    }
}

/// Length filters (era length, visit length, period length) compare
/// `end - start` in whole days without computing an explicit difference.
pub fn apply_interval_range(
    q: &mut SelectBuilder,
    dialect: Dialect,
    start: &str,
    end: &str,
    range: Option<&NumericRange>,
) -> Result<(), CohortError> {
    let Some(range) = range else { return Ok(()) };
    let Some(value) = range.value.as_ref() else {
        return Ok(());
    };
    let days = number_as_days(value)?;
    let op = range.op.unwrap_or(RangeOp::Gte);
    let target = dialect.add_days(start, days);
    let predicate = match op {
        RangeOp::Lt => format!("{end} < {target}"),
        RangeOp::Lte => format!("{end} <= {target}"),
        RangeOp::Gt => format!("{end} > {target}"),
        RangeOp::Gte => format!("{end} >= {target}"),
        RangeOp::Eq | RangeOp::NotEq => {
            let next = dialect.add_days(start, days + 1);
            let exact = format!("({end} >= {target} AND {end} < {next})");
            if op == RangeOp::NotEq {
                format!("NOT {exact}")
            } else {
                exact
            }
        }
        RangeOp::Bt | RangeOp::NotBt => {
            let extent = range
                .extent
                .as_ref()
                .ok_or_else(|| CohortError::invalid("between operator requires an extent"))?;
            let upper = dialect.add_days(start, number_as_days(extent)?);
            let between = format!("({end} >= {target} AND {end} <= {upper})");
            if op == RangeOp::NotBt {
                format!("NOT {between}")
            } else {
                between
            }
        }
    };
    q.filter(predicate);
    Ok(())
}

fn number_as_days(value: &serde_json::Number) -> Result<i64, CohortError> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .ok_or_else(|| CohortError::invalid("interval range value is not a day count"))
}

/// Tracks the single shared `person` join a builder may need for age and
/// demographic filters.
pub struct PersonJoin {
    alias: &'static str,
    joined: bool,
}

impl PersonJoin {
    pub fn new() -> Self {
        PersonJoin {
            alias: "pe",
            joined: false,
        }
    }

    fn ensure(&mut self, q: &mut SelectBuilder, ctx: &BuildContext, table_alias: &str) {
        if !self.joined {
            q.join(format!(
                "JOIN {person} {pe} ON {pe}.person_id = {table_alias}.person_id",
                person = ctx.cdm_table("person"),
                pe = self.alias
            ));
            self.joined = true;
        }
    }

    /// Age at `start_expr` is `year(start) - year_of_birth`.
    pub fn apply_age(
        &mut self,
        q: &mut SelectBuilder,
        ctx: &BuildContext,
        table_alias: &str,
        start_expr: &str,
        range: Option<&NumericRange>,
    ) -> Result<(), CohortError> {
        let Some(range) = range else { return Ok(()) };
        self.ensure(q, ctx, table_alias);
        let age = format!(
            "(EXTRACT(YEAR FROM {start_expr}) - {pe}.year_of_birth)",
            pe = self.alias
        );
        q.filter(numeric_predicate(&age, range)?);
        Ok(())
    }

    /// Gender / race / ethnicity style filters against a person column.
    pub fn apply_concept(
        &mut self,
        q: &mut SelectBuilder,
        ctx: &BuildContext,
        table_alias: &str,
        person_column: &str,
        concepts: &[Concept],
        selection: Option<&ConceptSetSelection>,
    ) {
        if concepts.is_empty() && selection.is_none() {
            return;
        }
        self.ensure(q, ctx, table_alias);
        let column = format!("{}.{person_column}", self.alias);
        apply_concept_list(q, ctx.dialect(), &column, concepts, false);
        apply_concept_set_selection(q, ctx, &column, selection);
    }
}

/// Provider-specialty filters semi-join the provider table.
pub fn apply_provider_specialty(
    q: &mut SelectBuilder,
    ctx: &BuildContext,
    table_alias: &str,
    concepts: &[Concept],
    selection: Option<&ConceptSetSelection>,
) {
    if concepts.is_empty() && selection.is_none() {
        return;
    }
    let mut inner = SelectBuilder::from_clause(format!("{} pr", ctx.cdm_table("provider")));
    inner.select("1");
    inner.filter(format!("pr.provider_id = {table_alias}.provider_id"));
    apply_concept_list(
        &mut inner,
        ctx.dialect(),
        "pr.specialty_concept_id",
        concepts,
        false,
    );
    apply_concept_set_selection(&mut inner, ctx, "pr.specialty_concept_id", selection);
    q.filter(format!("EXISTS ({})", inner.build()));
}

/// Place-of-service filters resolve through the row's care site.
pub fn apply_care_site_place_of_service(
    q: &mut SelectBuilder,
    ctx: &BuildContext,
    table_alias: &str,
    concepts: &[Concept],
    selection: Option<&ConceptSetSelection>,
) {
    if concepts.is_empty() && selection.is_none() {
        return;
    }
    let mut inner = SelectBuilder::from_clause(format!("{} csite", ctx.cdm_table("care_site")));
    inner.select("1");
    inner.filter(format!("csite.care_site_id = {table_alias}.care_site_id"));
    apply_concept_list(
        &mut inner,
        ctx.dialect(),
        "csite.place_of_service_concept_id",
        concepts,
        false,
    );
    apply_concept_set_selection(&mut inner, ctx, "csite.place_of_service_concept_id", selection);
    q.filter(format!("EXISTS ({})", inner.build()));
}

/// Region filter: care site → its location history entry covering the row's
/// dates → location region against a codeset.
pub fn apply_location_region(
    q: &mut SelectBuilder,
    ctx: &BuildContext,
    table_alias: &str,
    start_column: &str,
    end_column: &str,
    location_codeset_id: Option<i64>,
) {
    let Some(codeset_id) = location_codeset_id else {
        return;
    };
    let open_end = ctx.dialect().date_literal("2099-12-31");
    let predicate = format!(
        "EXISTS (SELECT 1 FROM {care_site} csite \
         JOIN {history} lh ON lh.entity_id = csite.care_site_id \
           AND lh.domain_id = {care_site_domain} \
           AND {table_alias}.{start_column} >= lh.start_date \
           AND {table_alias}.{end_column} <= COALESCE(lh.end_date, {open_end}) \
         JOIN {location} loc ON loc.location_id = csite.location_id \
         WHERE csite.care_site_id = {table_alias}.care_site_id \
           AND {region_in})",
        care_site = ctx.cdm_table("care_site"),
        history = ctx.cdm_table("location_history"),
        location = ctx.cdm_table("location"),
        care_site_domain = quote_str("CARE_SITE"),
        region_in = codeset_in(ctx, "loc.region_concept_id", codeset_id),
    );
    q.filter(predicate);
}

/// Visit-type filters on domains whose rows only carry a visit id: join the
/// visit and filter its concept columns.
pub struct VisitJoin {
    joined: bool,
}

impl VisitJoin {
    pub fn new() -> Self {
        VisitJoin { joined: false }
    }

    fn ensure(&mut self, q: &mut SelectBuilder, ctx: &BuildContext, table_alias: &str) {
        if !self.joined {
            q.join(format!(
                "JOIN {visit} vo ON vo.visit_occurrence_id = {table_alias}.visit_occurrence_id",
                visit = ctx.cdm_table("visit_occurrence")
            ));
            self.joined = true;
        }
    }

    pub fn apply_visit_type(
        &mut self,
        q: &mut SelectBuilder,
        ctx: &BuildContext,
        table_alias: &str,
        concepts: &[Concept],
        selection: Option<&ConceptSetSelection>,
    ) {
        if concepts.is_empty() && selection.is_none() {
            return;
        }
        self.ensure(q, ctx, table_alias);
        apply_concept_list(q, ctx.dialect(), "vo.visit_concept_id", concepts, false);
        apply_concept_set_selection(q, ctx, "vo.visit_concept_id", selection);
    }

    pub fn apply_visit_source(
        &mut self,
        q: &mut SelectBuilder,
        ctx: &BuildContext,
        table_alias: &str,
        visit_source_concept: Option<i64>,
    ) {
        if let Some(concept_id) = visit_source_concept {
            self.ensure(q, ctx, table_alias);
            q.filter(format!("vo.visit_source_concept_id = {concept_id}"));
        }
    }
}

/// Keep the earliest row per person, ties broken by primary key. The
/// builder continues filtering under the same alias.
pub fn retain_first(
    q: SelectBuilder,
    alias: &str,
    start_column: &str,
    primary_key: &str,
) -> SelectBuilder {
    let mut inner = q;
    inner.select(format!(
        "ROW_NUMBER() OVER (PARTITION BY {alias}.person_id \
         ORDER BY {alias}.{start_column}, {alias}.{primary_key}) AS first_ordinal"
    ));
    let mut outer = SelectBuilder::from_clause(format!("({}) {alias}", inner.build()));
    outer.select(format!("{alias}.*"));
    outer.filter(format!("{alias}.first_ordinal = 1"));
    outer
}

/// Project a filtered domain scan onto the five-column event contract.
/// A NULL end date becomes `start + 1 day`; a source whose end column is
/// its start column keeps `end = start`.
pub fn standardize(
    q: SelectBuilder,
    dialect: Dialect,
    primary_key: &str,
    start_column: &str,
    end_column: &str,
    visit_column: Option<&str>,
) -> Relation {
    let start = format!("src.{start_column}");
    let end = format!("src.{end_column}");
    let plus_one = dialect.add_days(&start, 1);
    let visit = match visit_column {
        Some(column) => format!("CAST(src.{column} AS BIGINT)"),
        None => "CAST(NULL AS BIGINT)".to_string(),
    };
    let sql = format!(
        "SELECT CAST(src.person_id AS BIGINT) AS person_id, \
         CAST(src.{primary_key} AS BIGINT) AS event_id, \
         {start} AS start_date, \
         CASE WHEN {end} IS NULL THEN {plus_one} ELSE {end} END AS end_date, \
         {visit} AS visit_occurrence_id \
         FROM ({inner}) src",
        inner = q.build()
    );
    Relation::events(sql)
}
