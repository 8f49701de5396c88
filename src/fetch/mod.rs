//! Converting many filings at once.
//!
//! Every entry gets its own task; a [`WorkerPool`] bounds how many of them
//! fetch and parse at the same time. Results come back over a channel and are
//! returned in input order.

use chrono::NaiveDate;
use futures::future::join_all;
use indicatif::MultiProgress;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::core::{EngineError, Result, Warning};
use crate::edgar::filing::{CompanionOverrides, FilingSource};
use crate::edgar::rate_limiter::WorkerPool;
use crate::edgar::report::ReportType;
use crate::edgar::tickers::{FilingMetadata, Ticker};
use crate::pipeline::Pipeline;
use crate::utils::dirs::{distinct_paths, ensure_dir, output_path};
use crate::utils::progress::ProgressTracker;

/// One line of a batch file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchEntry {
    pub source: String,
    #[serde(default)]
    pub ticker: Option<Ticker>,
    #[serde(default)]
    pub report_type: Option<ReportType>,
    #[serde(default)]
    pub filing_date: Option<NaiveDate>,
}

impl BatchEntry {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ticker: None,
            report_type: None,
            filing_date: None,
        }
    }

    pub fn metadata(&self) -> FilingMetadata {
        FilingMetadata {
            ticker: self.ticker.clone(),
            report_type: self.report_type.clone(),
            filing_date: self.filing_date,
        }
    }
}

pub fn parse_batch(content: &str) -> Result<Vec<BatchEntry>> {
    serde_json::from_str(content)
        .map_err(|e| EngineError::Config(format!("invalid batch file: {}", e)))
}

pub fn load_batch(path: &Path) -> Result<Vec<BatchEntry>> {
    let content = std::fs::read_to_string(path)?;
    let entries = parse_batch(&content)?;
    log::info!("Loaded {} batch entries from {}", entries.len(), path.display());
    Ok(entries)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FetchStatus {
    Success,
    Failed,
    /// Cancelled before it finished.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub entry: BatchEntry,
    pub status: FetchStatus,
    pub output_path: Option<PathBuf>,
    pub warnings: Vec<Warning>,
    pub error: Option<String>,
}

impl BatchResult {
    fn from_outcome(entry: BatchEntry, outcome: Result<(PathBuf, Vec<Warning>)>) -> Self {
        match outcome {
            Ok((path, warnings)) => Self {
                entry,
                status: FetchStatus::Success,
                output_path: Some(path),
                warnings,
                error: None,
            },
            Err(EngineError::Cancelled) => Self {
                entry,
                status: FetchStatus::Skipped,
                output_path: None,
                warnings: Vec::new(),
                error: Some(EngineError::Cancelled.to_string()),
            },
            Err(e) => Self {
                entry,
                status: FetchStatus::Failed,
                output_path: None,
                warnings: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }
}

pub struct BatchRunner {
    pipeline: Pipeline,
    pool: WorkerPool,
    output_dir: PathBuf,
    multi_progress: Option<Arc<MultiProgress>>,
}

impl BatchRunner {
    pub fn new(pipeline: Pipeline) -> Self {
        let pool = WorkerPool::new(pipeline.config().max_workers);
        let output_dir = pipeline.config().output_dir.clone();
        Self {
            pipeline,
            pool,
            output_dir,
            multi_progress: None,
        }
    }

    pub fn with_output_dir(mut self, output_dir: PathBuf) -> Self {
        self.output_dir = output_dir;
        self
    }

    pub fn with_progress(mut self, multi_progress: Arc<MultiProgress>) -> Self {
        self.multi_progress = Some(multi_progress);
        self
    }

    pub async fn run(&self, entries: Vec<BatchEntry>) -> Result<Vec<BatchResult>> {
        ensure_dir(&self.output_dir)?;

        let total = entries.len();
        let (tx, mut rx) = mpsc::channel(total.max(1));
        let mut handles = Vec::with_capacity(total);
        let paths = distinct_paths(
            entries
                .iter()
                .map(|entry| output_path(&self.output_dir, &entry.metadata(), &entry.source))
                .collect(),
        );

        for (index, (entry, path)) in entries.into_iter().zip(paths).enumerate() {
            let tx = tx.clone();
            let pipeline = self.pipeline.clone();
            let pool = self.pool.clone();
            let progress = ProgressTracker::new(self.multi_progress.as_ref(), &entry.source);

            handles.push(tokio::spawn(async move {
                let outcome = convert_entry(&pipeline, &pool, path, &entry, &progress).await;
                match &outcome {
                    Ok((path, _)) => progress.finish(&format!("Saved {}", path.display())),
                    Err(e) => progress.finish(&format!("Failed: {}", e)),
                }
                let result = BatchResult::from_outcome(entry, outcome);
                if tx.send((index, result)).await.is_err() {
                    log::debug!("Batch receiver dropped before result {}", index);
                }
            }));
        }
        drop(tx);

        let mut results: Vec<(usize, BatchResult)> = Vec::with_capacity(total);
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        for joined in join_all(handles).await {
            if let Err(e) = joined {
                log::error!("Batch task failed: {}", e);
            }
        }

        results.sort_by_key(|(index, _)| *index);
        let results: Vec<BatchResult> = results.into_iter().map(|(_, r)| r).collect();
        log::info!(
            "Batch finished: {} succeeded, {} failed, {} skipped",
            results.iter().filter(|r| r.status == FetchStatus::Success).count(),
            results.iter().filter(|r| r.status == FetchStatus::Failed).count(),
            results.iter().filter(|r| r.status == FetchStatus::Skipped).count()
        );
        Ok(results)
    }
}

async fn convert_entry(
    pipeline: &Pipeline,
    pool: &WorkerPool,
    path: PathBuf,
    entry: &BatchEntry,
    progress: &ProgressTracker,
) -> Result<(PathBuf, Vec<Warning>)> {
    progress.update_message("Waiting");
    let _permit = pool.acquire().await?;
    pipeline.cancel_flag().check()?;

    let source: FilingSource = entry.source.parse()?;
    progress.step("Converting");
    let conversion = pipeline
        .convert(&source, &CompanionOverrides::default())
        .await?;

    progress.step("Writing");
    let bytes = conversion.to_bytes()?;
    tokio::fs::write(&path, bytes).await?;
    Ok((path, conversion.warnings))
}
