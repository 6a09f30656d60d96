//! Batch orchestration: directory → text → model JSON → normalized record →
//! reconciled project.
//!
//! Each file is processed in isolation. Any failure (unreadable file, model
//! error, storage error) becomes a [`FileOutcome::Failed`] for that file and
//! the run moves on; only a missing input directory aborts the batch. Files
//! are taken in name order, with up to `workers` documents in flight.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use futures::stream::{self, StreamExt};
use sqlx::SqlitePool;
use walkdir::WalkDir;

use crate::config::Config;
use crate::db;
use crate::extract::{read_document, DocumentKind};
use crate::llm::{Extractor, OllamaExtractor};
use crate::migrate;
use crate::models::{Reconciled, SkipReason, UpdatePolicy};
use crate::normalize::normalize;
use crate::reconcile::reconcile;

/// Pipeline step at which a document failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Read,
    Extract,
    Reconcile,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Read => "read",
            Stage::Extract => "extract",
            Stage::Reconcile => "reconcile",
        })
    }
}

#[derive(Debug)]
pub enum FileOutcome {
    /// Not a supported document (wrong extension or not a regular file).
    Ignored,
    Created { project_id: String },
    Updated { project_id: String },
    Skipped(SkipReason),
    Failed { stage: Stage, error: anyhow::Error },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub file: String,
    pub stage: Stage,
    pub cause: String,
}

/// Aggregate counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
    pub ignored: u64,
    pub failures: Vec<FailedFile>,
}

impl RunSummary {
    pub fn record(&mut self, file: &str, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Ignored => self.ignored += 1,
            FileOutcome::Created { .. } => self.created += 1,
            FileOutcome::Updated { .. } => self.updated += 1,
            FileOutcome::Skipped(_) => self.skipped += 1,
            FileOutcome::Failed { stage, error } => {
                self.failed += 1;
                self.failures.push(FailedFile {
                    file: file.to_string(),
                    stage,
                    cause: format!("{:#}", error),
                });
            }
        }
    }

    pub fn documents(&self) -> u64 {
        self.created + self.updated + self.skipped + self.failed
    }
}

pub struct Pipeline<E> {
    pool: SqlitePool,
    extractor: E,
    policy: UpdatePolicy,
    workers: usize,
}

impl<E: Extractor> Pipeline<E> {
    pub fn new(pool: SqlitePool, extractor: E, policy: UpdatePolicy) -> Self {
        Self {
            pool,
            extractor,
            policy,
            workers: 1,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Process every direct child of `dir`.
    pub async fn run(&self, dir: &Path) -> Result<RunSummary> {
        if !dir.is_dir() {
            bail!("Directory not found: '{}'", dir.display());
        }

        let entries = list_entries(dir)?;
        tracing::info!(
            dir = %dir.display(),
            entries = entries.len(),
            workers = self.workers,
            "starting to process documents"
        );

        let outcomes: Vec<(String, FileOutcome)> = stream::iter(entries)
            .map(|path| async move {
                let file = file_label(&path);
                let outcome = self.process_file(&path, &file).await;
                (file, outcome)
            })
            .buffered(self.workers)
            .collect()
            .await;

        let mut summary = RunSummary::default();
        for (file, outcome) in outcomes {
            summary.record(&file, outcome);
        }
        Ok(summary)
    }

    /// Run one file through every stage. Never returns an error: failures are
    /// folded into the outcome.
    pub async fn process_file(&self, path: &Path, file: &str) -> FileOutcome {
        let Some(kind) = DocumentKind::from_path(path).filter(|_| path.is_file()) else {
            tracing::debug!(file, "ignoring non-document entry");
            return FileOutcome::Ignored;
        };

        tracing::info!(file, kind = kind.label(), "processing document");
        let outcome = self.process_document(path, kind, file).await;
        log_outcome(file, &outcome);
        outcome
    }

    async fn process_document(&self, path: &Path, kind: DocumentKind, file: &str) -> FileOutcome {
        let owned = path.to_path_buf();
        let text = match tokio::task::spawn_blocking(move || read_document(&owned, kind)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                return FileOutcome::Failed {
                    stage: Stage::Read,
                    error: e.into(),
                }
            }
            Err(e) => {
                return FileOutcome::Failed {
                    stage: Stage::Read,
                    error: anyhow::anyhow!("document reader aborted: {}", e),
                }
            }
        };

        if text.trim().is_empty() {
            return FileOutcome::Skipped(SkipReason::NoText);
        }

        tracing::info!(file, chars = text.chars().count(), "extracting fields with model");
        let raw = match self.extractor.extract(&text).await {
            Ok(raw) => raw,
            Err(e) => {
                return FileOutcome::Failed {
                    stage: Stage::Extract,
                    error: e.into(),
                }
            }
        };

        let record = normalize(&raw);
        match reconcile(&self.pool, &record, self.policy).await {
            Ok(Reconciled::Created { project_id }) => FileOutcome::Created { project_id },
            Ok(Reconciled::Updated { project_id }) => FileOutcome::Updated { project_id },
            Ok(Reconciled::Skipped(reason)) => FileOutcome::Skipped(reason),
            Err(error) => FileOutcome::Failed {
                stage: Stage::Reconcile,
                error,
            },
        }
    }
}

fn log_outcome(file: &str, outcome: &FileOutcome) {
    match outcome {
        FileOutcome::Ignored => {}
        FileOutcome::Created { project_id } => {
            tracing::info!(file, project_id = %project_id, "created new project")
        }
        FileOutcome::Updated { project_id } => {
            tracing::info!(file, project_id = %project_id, "updated existing project")
        }
        FileOutcome::Skipped(SkipReason::MissingIdentifier) => {
            tracing::warn!(file, "skipping document: no project_id in extracted data")
        }
        FileOutcome::Skipped(SkipReason::Exists { project_id }) => {
            tracing::info!(
                file,
                project_id = %project_id,
                "skipping existing project, use --update to overwrite"
            )
        }
        FileOutcome::Skipped(SkipReason::NoText) => {
            tracing::info!(file, "no extractable text, nothing to do")
        }
        FileOutcome::Failed { stage, error } => {
            tracing::warn!(file, %stage, error = %format!("{:#}", error), "document failed")
        }
    }
}

/// Direct children of `dir`, sorted by file name.
fn list_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        entries.push(entry?.into_path());
    }
    Ok(entries)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// CLI entry point for `pjx process`.
pub async fn run_process(
    config: &Config,
    dir: &Path,
    update: bool,
    workers: Option<usize>,
) -> Result<RunSummary> {
    if !dir.is_dir() {
        bail!("Directory not found: '{}'", dir.display());
    }

    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let extractor = OllamaExtractor::new(&config.model)?;
    let pipeline = Pipeline::new(pool.clone(), extractor, UpdatePolicy::from_flag(update))
        .with_workers(workers.unwrap_or(config.batch.workers));

    let summary = pipeline.run(dir).await;
    pool.close().await;
    let summary = summary?;

    print_summary(dir, &summary);
    Ok(summary)
}

pub fn print_summary(dir: &Path, summary: &RunSummary) {
    println!("process {}", dir.display());
    println!("  documents: {}", summary.documents());
    println!("  created: {}", summary.created);
    println!("  updated: {}", summary.updated);
    println!("  skipped: {}", summary.skipped);
    println!("  failed: {}", summary.failed);
    println!("  ignored: {}", summary.ignored);
    if !summary.failures.is_empty() {
        println!("  failures:");
        for f in &summary.failures {
            println!("    {} [{}]: {}", f.file, f.stage, f.cause);
        }
    }
    println!("ok");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_each_outcome() {
        let mut summary = RunSummary::default();
        summary.record("a.docx", FileOutcome::Created { project_id: "P-1".into() });
        summary.record("b.docx", FileOutcome::Updated { project_id: "P-2".into() });
        summary.record("c.pdf", FileOutcome::Skipped(SkipReason::MissingIdentifier));
        summary.record("d.txt", FileOutcome::Ignored);
        summary.record(
            "e.pdf",
            FileOutcome::Failed {
                stage: Stage::Extract,
                error: anyhow::anyhow!("timed out"),
            },
        );

        assert_eq!(summary.created, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.ignored, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.documents(), 4);
        assert_eq!(
            summary.failures,
            vec![FailedFile {
                file: "e.pdf".into(),
                stage: Stage::Extract,
                cause: "timed out".into(),
            }]
        );
    }

    #[test]
    fn listing_is_sorted_and_shallow() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("b.pdf"), b"x").unwrap();
        std::fs::write(tmp.path().join("a.docx"), b"x").unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();
        std::fs::write(tmp.path().join("nested").join("c.pdf"), b"x").unwrap();

        let names: Vec<String> = list_entries(tmp.path())
            .unwrap()
            .iter()
            .map(|p| file_label(p))
            .collect();
        assert_eq!(names, ["a.docx", "b.pdf", "nested"]);
    }
}
