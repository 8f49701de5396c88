use anyhow::{Context, Result};
use chrono::NaiveDate;
use colored::*;
use indicatif::MultiProgress;
use itertools::Itertools;
use ixsheet::{
    core::{CancelFlag, EngineConfig, SignConvention, Warning},
    edgar::{CompanionOverrides, FilingMetadata, FilingSource, ReportType, Ticker},
    fetch::{load_batch, BatchRunner, FetchStatus},
    pipeline::{Conversion, Pipeline},
    utils::dirs,
    workbook::display_value,
};
use std::path::PathBuf;
use std::sync::Arc;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "ixsheet", about = "Turn inline XBRL filings into financial statement workbooks")]
struct Opt {
    /// How statement cells are signed: canonical or reported
    #[structopt(long, global = true)]
    sign_convention: Option<SignConvention>,

    /// Role keyword policy (JSON)
    #[structopt(long, global = true, parse(from_os_str))]
    policy: Option<PathBuf>,

    /// Leave out the All Facts sheet
    #[structopt(long, global = true)]
    no_all_facts: bool,

    /// Leave out per-member rows
    #[structopt(long, global = true)]
    no_dimensions: bool,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt, Debug)]
enum Command {
    /// Convert a single filing
    Convert {
        /// Filing URL or local path
        source: String,

        /// Output file, defaults to a name derived from the filing
        #[structopt(short, long, parse(from_os_str))]
        output: Option<PathBuf>,

        #[structopt(long)]
        ticker: Option<String>,

        /// Form type, e.g. 10-K
        #[structopt(long)]
        form: Option<ReportType>,

        /// Filing date (YYYY-MM-DD)
        #[structopt(long)]
        date: Option<NaiveDate>,

        /// Presentation linkbase to use instead of the discovered one
        #[structopt(long)]
        presentation: Option<String>,

        /// Label linkbase to use instead of the discovered one
        #[structopt(long)]
        labels: Option<String>,

        /// Extension schema to use instead of the discovered one
        #[structopt(long)]
        schema: Option<String>,

        /// Write warnings as JSON to this file
        #[structopt(long, parse(from_os_str))]
        warnings_json: Option<PathBuf>,

        /// Print the statements to the terminal as well
        #[structopt(long)]
        preview: bool,
    },
    /// Convert every filing listed in a JSON batch file
    Batch {
        #[structopt(parse(from_os_str))]
        list: PathBuf,

        #[structopt(long, parse(from_os_str))]
        output_dir: Option<PathBuf>,

        #[structopt(long)]
        workers: Option<usize>,
    },
}

fn override_source(location: Option<String>) -> Result<Option<FilingSource>> {
    location
        .map(|l| l.parse::<FilingSource>())
        .transpose()
        .context("Invalid companion location")
}

fn print_warnings(warnings: &[Warning]) {
    if warnings.is_empty() {
        println!("{}", "No warnings".green());
        return;
    }
    println!("{}", format!("{} warning(s):", warnings.len()).yellow().bold());
    for warning in warnings {
        let line = format!("  - {}", warning);
        match warning {
            Warning::ManualReview { .. } | Warning::EmptyClassification { .. } => {
                println!("{}", line.red())
            }
            _ => println!("{}", line.yellow()),
        }
    }
}

fn print_preview(conversion: &Conversion) {
    for sheet in &conversion.workbook.sheets {
        println!("\n{}", sheet.name.cyan().bold());
        println!("{}", sheet.title.dimmed());
        println!("{:<60}{}", "", sheet.headers.join(" | "));
        for row in &sheet.rows {
            let label = format!("{}{}", "  ".repeat(row.depth), row.label);
            let line = format!(
                "{:<60}{}",
                label,
                row.cells.iter().map(display_value).join(" | ")
            );
            if row.bold {
                println!("{}", line.bold());
            } else {
                println!("{}", line);
            }
        }
    }
}

async fn convert(
    pipeline: &Pipeline,
    source: String,
    output: Option<PathBuf>,
    metadata: FilingMetadata,
    overrides: CompanionOverrides,
    warnings_json: Option<PathBuf>,
    preview: bool,
) -> Result<()> {
    let location: FilingSource = source.parse()?;
    let conversion = pipeline.convert(&location, &overrides).await?;

    let output = match output {
        Some(path) => path,
        None => {
            dirs::ensure_dir(&pipeline.config().output_dir)?;
            dirs::output_path(&pipeline.config().output_dir, &metadata, &source)
        }
    };
    conversion
        .save(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    if preview {
        print_preview(&conversion);
    }
    println!(
        "{} {} ({} sheet(s))",
        "Saved".green().bold(),
        output.display(),
        conversion.workbook.sheets.len()
    );
    print_warnings(&conversion.warnings);

    if let Some(path) = warnings_json {
        std::fs::write(&path, serde_json::to_string_pretty(&conversion.warnings)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

async fn batch(config: EngineConfig, cancel: CancelFlag, list: PathBuf) -> Result<()> {
    let entries = load_batch(&list)?;
    let pipeline = Pipeline::new(config, cancel)?;

    let multi_progress = Arc::new(MultiProgress::new());
    let results = BatchRunner::new(pipeline)
        .with_progress(multi_progress)
        .run(entries)
        .await?;

    for result in &results {
        match result.status {
            FetchStatus::Success => println!(
                "{} {} -> {} ({} warning(s))",
                "OK".green().bold(),
                result.entry.source,
                result
                    .output_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                result.warnings.len()
            ),
            FetchStatus::Failed => println!(
                "{} {}: {}",
                "FAILED".red().bold(),
                result.entry.source,
                result.error.as_deref().unwrap_or("unknown error")
            ),
            FetchStatus::Skipped => {
                println!("{} {}", "SKIPPED".yellow().bold(), result.entry.source)
            }
        }
    }

    if results.iter().any(|r| r.status != FetchStatus::Success) {
        anyhow::bail!("some filings were not converted");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();
    log::debug!("Logger initialized");

    let opt = Opt::from_args();

    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nReceived Ctrl+C, stopping after the current step");
        flag.cancel();
    })?;

    let mut config = EngineConfig::from_env()?;
    if let Some(convention) = opt.sign_convention {
        config.sign_convention = convention;
    }
    if opt.policy.is_some() {
        config.role_policy_path = opt.policy;
    }
    if opt.no_all_facts {
        config.include_all_facts = false;
    }
    if opt.no_dimensions {
        config.include_dimensional = false;
    }

    match opt.cmd {
        Command::Convert {
            source,
            output,
            ticker,
            form,
            date,
            presentation,
            labels,
            schema,
            warnings_json,
            preview,
        } => {
            let metadata = FilingMetadata {
                ticker: ticker.map(Ticker::new).transpose()?,
                report_type: form,
                filing_date: date,
            };
            let overrides = CompanionOverrides {
                schema: override_source(schema)?,
                presentation: override_source(presentation)?,
                labels: override_source(labels)?,
            };
            let pipeline = Pipeline::new(config, cancel)?;
            convert(
                &pipeline,
                source,
                output,
                metadata,
                overrides,
                warnings_json,
                preview,
            )
            .await
        }
        Command::Batch {
            list,
            output_dir,
            workers,
        } => {
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(workers) = workers {
                config.max_workers = workers;
            }
            batch(config, cancel, list).await
        }
    }
}
