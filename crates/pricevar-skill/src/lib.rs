//! Price variance analysis entry point.
//!
//! [`run_analysis`] drives one request end to end: filters, the three
//! rollup queries, metric derivation, facts, narrative, and pages. External
//! services arrive through [`SkillContext`] and live only as long as the
//! request.
//!
//! Failure policy: a failed or empty supplier rollup ends the run with
//! [`AnalysisStatus::NoData`]. KPI and contract failures degrade the result
//! but never abort it. A narrative failure only adds a warning.

use std::time::Duration;

use arrow::record_batch::RecordBatch;
use pricevar_ai::{Narrator, narrate, render_facts_prompt};
use pricevar_core::derive::rank_contracts;
use pricevar_core::{
    AnalysisConfig, FactContext, FactGroup, FilterGrounding, Predicate, assemble_pages,
    build_entity_filter, build_time_filter, derive_metrics, extract_facts, fact_table, ranked,
};
use pricevar_store::rollup::{decode_contracts, decode_kpi, decode_suppliers};
use pricevar_store::{
    QueryError, QueryExecutor, QueryRequest, RollupError, RollupQueries, execute_with_timeout,
};
use thiserror::Error;
use tracing::{error, info, warn};

pub mod output;
pub mod report;
pub mod request;

pub use output::{AnalysisStatus, ExportTable, SkillOutput};
pub use report::{FINAL_PROMPT_TEMPLATE, ParameterPill, render_final_prompt};
pub use request::SkillRequest;

const NO_DATA: &str = "No data available for the selected period and filters";

/// A rollup that could not be fetched or decoded.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("unexpected rollup shape: {0}")]
    Decode(#[from] RollupError),
}

/// Request-scoped dependencies.
pub struct SkillContext<'a> {
    pub executor: &'a dyn QueryExecutor,
    pub narrator: Option<&'a dyn Narrator>,
    pub grounding: Option<&'a dyn FilterGrounding>,
    pub config: &'a AnalysisConfig,
}

impl<'a> SkillContext<'a> {
    pub fn new(executor: &'a dyn QueryExecutor, config: &'a AnalysisConfig) -> Self {
        Self {
            executor,
            narrator: None,
            grounding: None,
            config,
        }
    }

    pub fn with_narrator(mut self, narrator: &'a dyn Narrator) -> Self {
        self.narrator = Some(narrator);
        self
    }

    pub fn with_grounding(mut self, grounding: &'a dyn FilterGrounding) -> Self {
        self.grounding = Some(grounding);
        self
    }

    fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.config.query_timeout_secs)
    }

    fn narrative_timeout(&self) -> Duration {
        Duration::from_secs(self.config.narrative_timeout_secs)
    }
}

async fn fetch<T>(
    ctx: &SkillContext<'_>,
    request: &QueryRequest,
    decode: fn(&[RecordBatch]) -> Result<T, RollupError>,
) -> Result<(Vec<RecordBatch>, T), StageError> {
    let batches = execute_with_timeout(ctx.executor, request, ctx.query_timeout()).await?;
    let decoded = decode(&batches)?;
    Ok((batches, decoded))
}

/// Run one analysis. Always returns a well-formed output.
pub async fn run_analysis(request: &SkillRequest, ctx: &SkillContext<'_>) -> SkillOutput {
    let config = ctx.config;
    let mut warnings = Vec::new();
    let mut degraded = false;

    // Filters
    let time = build_time_filter(&request.time_periods, config);
    for token in time.unrecognized() {
        warnings.push(format!(
            "Unrecognized time period '{token}'; showing data since {}",
            config.recent_fallback_start
        ));
    }
    let entity = build_entity_filter(&request.other_filters, ctx.grounding);
    let filters_applied = entity.predicate != Predicate::True;
    warnings.extend(entity.warnings);
    let predicate = Predicate::all([time.predicate.clone(), entity.predicate]);
    let queries = RollupQueries::new(config, &predicate);

    // Supplier rollup: the only fatal stage.
    let supplier_rows = match fetch(ctx, &queries.supplier(), decode_suppliers).await {
        Ok((_, rows)) if rows.is_empty() => {
            error!("supplier rollup returned no rows");
            return SkillOutput::no_data(NO_DATA, warnings);
        }
        Ok((_, rows)) => rows,
        Err(e) => {
            error!(error = %e, "supplier rollup failed");
            return SkillOutput::no_data(&e.to_string(), warnings);
        }
    };
    info!(suppliers = supplier_rows.len(), "supplier rollup complete");

    // KPI rollup
    let (kpi_batches, kpi_row) = match fetch(ctx, &queries.kpi(), decode_kpi).await {
        Ok((batches, Some(row))) => (batches, Some(row)),
        Ok((batches, None)) => {
            warn!("KPI rollup returned no rows, approximating from suppliers");
            warnings.push(
                "Overall KPIs approximated from supplier data: KPI rollup returned no rows".into(),
            );
            degraded = true;
            (batches, None)
        }
        Err(e) => {
            warn!(error = %e, "KPI rollup failed, approximating from suppliers");
            warnings.push(format!("Overall KPIs approximated from supplier data: {e}"));
            degraded = true;
            (Vec::new(), None)
        }
    };

    let mut analysis = derive_metrics(supplier_rows, kpi_row, Vec::new(), &config.kpi_fallback);

    // Contract rollup for the top supplier
    if let Some(top) = analysis.top_supplier() {
        let top_name = top.supplier_name.clone();
        match fetch(ctx, &queries.contract(&top_name), decode_contracts).await {
            Ok((_, rows)) => {
                info!(supplier = %top_name, contracts = rows.len(), "contract rollup complete");
                analysis.contracts = rank_contracts(rows);
            }
            Err(e) => {
                warn!(supplier = %top_name, error = %e, "contract rollup failed");
                warnings.push(format!("Contract analysis unavailable for {top_name}: {e}"));
                degraded = true;
            }
        }
    }

    // Facts and prompts
    let context = FactContext {
        period: (!time.is_all_time()).then(|| {
            request
                .time_periods
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        }),
        filters: filters_applied
            .then(|| request.other_filters.display())
            .flatten(),
    };
    let fact_groups = extract_facts(&analysis, &context, config);

    let insight_prompt = render_or_raw(&request.insight_prompt, &fact_groups, &mut warnings);
    let max_response_prompt = render_or_raw(&request.max_prompt, &fact_groups, &mut warnings);

    let narrative = match ctx.narrator {
        Some(narrator) => match narrate(narrator, &insight_prompt, ctx.narrative_timeout()).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(error = %e, "narrative generation failed");
                warnings.push(format!("Narrative unavailable: {e}"));
                None
            }
        },
        None => None,
    };

    let visualizations = match assemble_pages(&analysis, narrative.as_deref(), config) {
        Ok(pages) => pages,
        Err(e) => {
            error!(error = %e, "page assembly failed");
            warnings.push(format!("Visualizations unavailable: {e}"));
            degraded = true;
            Vec::new()
        }
    };

    let fields = report::FinalFields::from_analysis(&analysis, config.opportunity_count);
    let final_prompt = render_final_prompt(&request.final_prompt_template, &fields);

    let mut exports = Vec::with_capacity(3 + output::FACT_EXPORTS.len());
    match ranked::suppliers_to_batch(&analysis.suppliers) {
        Ok(batch) => exports.push(ExportTable::new(output::SUPPLIER_EXPORT, vec![batch])),
        Err(e) => warn!(error = %e, "supplier export skipped"),
    }
    exports.push(ExportTable::new(output::KPI_EXPORT, kpi_batches));
    match ranked::contracts_to_batch(&analysis.contracts) {
        Ok(batch) => exports.push(ExportTable::new(output::CONTRACT_EXPORT, vec![batch])),
        Err(e) => warn!(error = %e, "contract export skipped"),
    }
    for &(name, fact_types) in output::FACT_EXPORTS {
        let facts = fact_groups
            .iter()
            .flat_map(|g| &g.facts)
            .filter(|f| fact_types.contains(&f.fact_type()));
        match fact_table::facts_to_batch(facts) {
            Ok(batch) => exports.push(ExportTable::new(name, batch.into_iter().collect())),
            Err(e) => warn!(export = name, error = %e, "fact export skipped"),
        }
    }

    let status = if degraded {
        AnalysisStatus::Degraded
    } else {
        AnalysisStatus::Complete
    };
    info!(?status, warnings = warnings.len(), "analysis finished");

    SkillOutput {
        status,
        final_prompt,
        narrative,
        visualizations,
        parameter_pills: report::parameter_pills(request, filters_applied),
        fact_groups,
        insight_prompt,
        max_response_prompt,
        exports,
        warnings,
    }
}

fn render_or_raw(
    template: &str,
    groups: &[FactGroup],
    warnings: &mut Vec<String>,
) -> String {
    render_facts_prompt(template, groups).unwrap_or_else(|e| {
        warn!(error = %e, "fact serialization failed");
        warnings.push(format!("Prompt rendered without facts: {e}"));
        template.to_string()
    })
}
