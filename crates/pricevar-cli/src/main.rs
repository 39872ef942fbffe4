mod display;
mod settings;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pricevar_ai::OllamaNarrator;
use pricevar_core::{FilterExpr, OtherFilters, PeriodToken, build_time_filter};
use pricevar_skill::{SkillContext, SkillOutput, SkillRequest, run_analysis};
use pricevar_store::{DuckStore, RollupQueries, write_parquet};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::settings::{Overrides, Settings};

#[derive(Debug, Parser)]
#[command(name = "pricevar", version, about = "Procurement price variance analysis")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load a transaction file and run the full analysis.
    Analyze(AnalyzeArgs),
    /// Print the three rollup queries for the given periods.
    Sql(SqlArgs),
}

#[derive(Debug, Args)]
struct CommonArgs {
    /// TOML settings file with [analysis] and [llm] tables.
    #[arg(long, env = "PRICEVAR_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,
    /// Period token, e.g. "2024", "q3 2025", "2025-01-01 to 2025-03-31". Repeatable.
    #[arg(long = "period", value_name = "TOKEN")]
    periods: Vec<String>,
    #[arg(long, env = "PRICEVAR_DATASET_ID")]
    dataset_id: Option<String>,
    #[arg(long, env = "PRICEVAR_QUERY_TIMEOUT_SECS")]
    query_timeout_secs: Option<u64>,
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    /// Transaction data, `.csv` or `.parquet`.
    #[arg(value_name = "DATA")]
    data: PathBuf,
    #[command(flatten)]
    common: CommonArgs,
    /// Free-text entity filter. Repeatable.
    #[arg(long = "filter", value_name = "TEXT")]
    filters: Vec<String>,
    /// JSON request body; replaces --period and --filter.
    #[arg(long, value_name = "FILE", conflicts_with_all = ["periods", "filters"])]
    request: Option<PathBuf>,
    /// Print the output as JSON instead of a report.
    #[arg(long)]
    json: bool,
    /// Write each export table as Parquet into this directory.
    #[arg(long, value_name = "DIR")]
    export_dir: Option<PathBuf>,
    /// Skip narrative generation.
    #[arg(long)]
    no_llm: bool,
    #[arg(long, env = "PRICEVAR_LLM_URL")]
    llm_url: Option<String>,
    #[arg(long, env = "PRICEVAR_LLM_MODEL")]
    llm_model: Option<String>,
}

#[derive(Debug, Args)]
struct SqlArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// Supplier used for the contract rollup.
    #[arg(long, default_value = "<top supplier>")]
    supplier: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    info!("pricevar v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Analyze(args) => analyze(args).await,
        Commands::Sql(args) => sql(args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_settings(
    common: &CommonArgs,
    llm_url: Option<String>,
    llm_model: Option<String>,
) -> Result<Settings> {
    Ok(Settings::load(common.config.as_deref())?.apply(Overrides {
        dataset_id: common.dataset_id.clone(),
        llm_url,
        llm_model,
        query_timeout_secs: common.query_timeout_secs,
    }))
}

async fn analyze(args: AnalyzeArgs) -> Result<()> {
    let settings = load_settings(&args.common, args.llm_url.clone(), args.llm_model.clone())?;

    let request = match &args.request {
        Some(path) => {
            let body = fs::read_to_string(path)
                .with_context(|| format!("reading request {}", path.display()))?;
            serde_json::from_str::<SkillRequest>(&body)
                .with_context(|| format!("parsing request {}", path.display()))?
        }
        None => SkillRequest::default()
            .with_periods(args.common.periods.iter().map(String::as_str))
            .with_filters(OtherFilters(
                args.filters.iter().cloned().map(FilterExpr::Text).collect(),
            )),
    };

    let store = DuckStore::open()?.with_table(&settings.analysis.source_table);
    let rows = store
        .load_transactions(&args.data)
        .with_context(|| format!("loading {}", args.data.display()))?;
    info!(rows, path = %args.data.display(), "transactions loaded");

    let output = {
        let session = store.session()?;
        let narrator = (!args.no_llm).then(|| OllamaNarrator::new(settings.llm.clone()));
        let mut ctx = SkillContext::new(&session, &settings.analysis);
        if let Some(narrator) = &narrator {
            ctx = ctx.with_narrator(narrator);
        }
        run_analysis(&request, &ctx).await
    };

    if let Some(dir) = &args.export_dir {
        export(&output, dir)?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        display::print_report(&output);
    }
    Ok(())
}

fn export(output: &SkillOutput, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    for table in &output.exports {
        let Some(schema) = table.schema() else {
            warn!(export = %table.name, "nothing to export");
            continue;
        };
        let path = dir.join(export_file_name(&table.name));
        let rows = write_parquet(&path, schema, &table.batches)
            .with_context(|| format!("writing {}", path.display()))?;
        eprintln!("  {} → {} ({rows} rows)", table.name, path.display());
    }
    Ok(())
}

/// "Supplier Variance Analysis" → "supplier_variance_analysis.parquet".
fn export_file_name(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{stem}.parquet")
}

fn sql(args: SqlArgs) -> Result<()> {
    let settings = load_settings(&args.common, None, None)?;
    let periods: Vec<PeriodToken> = args
        .common
        .periods
        .iter()
        .map(|p| PeriodToken::from(p.as_str()))
        .collect();
    let time = build_time_filter(&periods, &settings.analysis);
    for token in time.unrecognized() {
        warn!(token, "period not recognized, using recent-data fallback");
    }
    let queries = RollupQueries::new(&settings.analysis, &time.predicate);

    println!("-- supplier rollup\n{};\n", queries.supplier().sql);
    println!("-- kpi rollup\n{};\n", queries.kpi().sql);
    println!("-- contract rollup\n{};", queries.contract(&args.supplier).sql);
    Ok(())
}
