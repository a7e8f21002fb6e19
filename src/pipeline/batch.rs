//! Batch runner over a JSONL file of queries.
//!
//! Flow:
//! queries.jsonl → concurrent `generate` calls (bounded) → one record per query → JSONL

use crate::models::{BatchStats, GenerationResult, MobgenError, Result, RunStatus};
use crate::pipeline::Coordinator;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// One input line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: String,
    pub query: String,
}

/// One output line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRecord {
    pub id: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GenerationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchRecord {
    fn from_run(id: String, run: Result<GenerationResult>) -> Self {
        match run {
            Ok(result) => Self {
                id,
                status: result.status,
                result: Some(result),
                error: None,
            },
            Err(e) => Self {
                id,
                status: RunStatus::Failed,
                result: None,
                error: Some(e.to_string()),
            },
        }
    }
}

pub struct BatchRunner {
    coordinator: Arc<Coordinator>,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    show_progress: bool,
}

impl BatchRunner {
    pub fn new(coordinator: Arc<Coordinator>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            coordinator,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            show_progress: true,
        }
    }

    /// Disable the progress bar.
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    /// Load queries from a JSONL file, skipping blank lines.
    pub fn load_queries(path: &Path) -> Result<Vec<QueryRecord>> {
        let file = File::open(path).map_err(|e| MobgenError::io("opening queries file", e))?;
        let reader = BufReader::new(file);
        let mut queries = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| MobgenError::io("reading queries file", e))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: QueryRecord = serde_json::from_str(&line)
                .map_err(|e| MobgenError::ParseError(format!("Line {}: {}", line_num + 1, e)))?;
            queries.push(record);
        }

        info!(count = queries.len(), "Loaded queries");
        Ok(queries)
    }

    /// Run every query and write one record per query, in input order.
    ///
    /// A failed run is recorded, not propagated. Only I/O problems abort.
    pub async fn run(&self, queries: Vec<QueryRecord>, output_path: &Path) -> Result<BatchStats> {
        let start = Instant::now();
        let total = queries.len();

        info!(
            total_queries = total,
            concurrency = self.concurrency,
            "Starting batch"
        );

        let pb = if self.show_progress {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
                    .map_err(|e| MobgenError::Internal(format!("progress template: {e}")))?
                    .progress_chars("##-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let output_file =
            File::create(output_path).map_err(|e| MobgenError::io("creating output file", e))?;
        let mut writer = BufWriter::new(output_file);

        let handles: Vec<_> = queries
            .into_iter()
            .map(|record| {
                let coordinator = Arc::clone(&self.coordinator);
                let semaphore = Arc::clone(&self.semaphore);
                let id = record.id.clone();
                let handle = tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| MobgenError::Internal("Semaphore closed".to_string()))?;
                    coordinator.generate(&record.query).await
                });
                (id, handle)
            })
            .collect();

        let mut stats = BatchStats {
            total_queries: total,
            ..Default::default()
        };

        for (id, handle) in handles {
            let run = match handle.await {
                Ok(run) => run,
                Err(e) => Err(MobgenError::Internal(format!("Task panicked: {e}"))),
            };
            if let Err(e) = &run {
                warn!(id = %id, error = %e, fatal = e.is_fatal_run_error(), "Query failed");
            }

            let record = BatchRecord::from_run(id, run);
            stats.record(
                record.status,
                record.result.as_ref().map_or(0, |r| r.retry_count),
            );

            let json = serde_json::to_string(&record)
                .map_err(|e| MobgenError::Internal(format!("Failed to serialize record: {e}")))?;
            writeln!(writer, "{json}").map_err(|e| MobgenError::io("writing output", e))?;

            pb.inc(1);
            pb.set_message(format!(
                "ok: {}, warnings: {}, failed: {}",
                stats.total_success, stats.total_with_warnings, stats.total_failed
            ));
        }

        writer
            .flush()
            .map_err(|e| MobgenError::io("flushing output", e))?;
        pb.finish_with_message("Done");

        stats.runtime_secs = start.elapsed().as_secs_f64();
        stats.finalize();

        info!(
            success = stats.total_success,
            with_warnings = stats.total_with_warnings,
            failed = stats.total_failed,
            retries = stats.total_retries,
            completion_rate = format!("{:.1}%", stats.completion_rate * 100.0),
            throughput = format!("{:.0}/hr", stats.throughput_per_hour),
            "Batch complete"
        );

        Ok(stats)
    }
}
