//! Batch runs over snapshot trees.
//!
//! [`run_prepare`] walks an input directory of timestamped CSV exports and
//! takes each file through anonymize -> clean -> featurize -> label, writing
//! every stage to its configured sinks. Failures are per-file: a bad export
//! is logged and counted without touching the artifacts of other files.
//!
//! [`run_combine`] pairs two prepared snapshots into the final combined
//! dataset.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::anonymize::{hash_player_ids, AnonymizeError, HashAlgorithm};
use crate::combine::{combine_features, CombineError};
use crate::prepare::{
    clean_snapshot, featurize_snapshot, label_snapshot, CleanReport, DateParsePolicy, PrepareError,
};
use crate::store::{
    list_snapshot_files, read_snapshot, recording_timestamp_for, SinkSet, Stage, StageWriter,
    StoreError, COMBINED_FILE_NAME,
};
use crate::table::Table;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Anonymize(#[from] AnonymizeError),
    #[error(transparent)]
    Prepare(#[from] PrepareError),
    #[error(transparent)]
    Combine(#[from] CombineError),
}

#[derive(Debug, Clone)]
pub struct PrepareRunConfig {
    pub input_dir: PathBuf,
    pub data_root: PathBuf,
    /// Hashing secret, supplied explicitly; see
    /// [`crate::anonymize::pepper_from_env`] for the environment loader.
    pub pepper: String,
    pub algorithm: HashAlgorithm,
    pub sinks: SinkSet,
    pub date_policy: DateParsePolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareRunReport {
    pub files_seen: u64,
    pub files_prepared: u64,
    pub files_failed: u64,
    pub rows_read: u64,
    pub rows_kept: u64,
    pub rows_missing_lastseen: u64,
    pub rows_unparseable_lastseen: u64,
    pub first_error: Option<String>,
}

impl PrepareRunReport {
    fn absorb_clean(&mut self, clean: &CleanReport) {
        self.rows_read += clean.rows_in;
        self.rows_kept += clean.rows_kept;
        self.rows_missing_lastseen += clean.rows_missing_lastseen;
        self.rows_unparseable_lastseen += clean.rows_unparseable_lastseen;
    }
}

/// Prepares every snapshot CSV under `config.input_dir`.
///
/// Only the directory walk itself can fail the whole run; anything wrong
/// with an individual file is recorded in the report and skipped.
pub fn run_prepare(config: &PrepareRunConfig) -> Result<PrepareRunReport, PipelineError> {
    let files = list_snapshot_files(&config.input_dir)?;
    let writer = StageWriter::new(config.data_root.clone(), config.sinks.clone());
    let mut report = PrepareRunReport::default();

    info!(
        component = "pipeline",
        event = "pipeline.prepare.start",
        input_dir = %config.input_dir.display(),
        data_root = %config.data_root.display(),
        files = files.len(),
        algorithm = config.algorithm.as_str()
    );

    for path in &files {
        report.files_seen += 1;
        let relative = match path.strip_prefix(&config.input_dir) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => path.file_name().map(PathBuf::from).unwrap_or_default(),
        };

        match prepare_one_file(config, &writer, path, &relative) {
            Ok(clean) => {
                report.files_prepared += 1;
                report.absorb_clean(&clean);
                info!(
                    component = "pipeline",
                    event = "pipeline.file.prepared",
                    file = %relative.display(),
                    rows_kept = clean.rows_kept
                );
            }
            Err(err) => {
                report.files_failed += 1;
                if report.first_error.is_none() {
                    report.first_error = Some(format!("{}: {err}", relative.display()));
                }
                error!(
                    component = "pipeline",
                    event = "pipeline.file.failed",
                    file = %relative.display(),
                    error = %err
                );
            }
        }
    }

    info!(
        component = "pipeline",
        event = "pipeline.prepare.finish",
        files_seen = report.files_seen,
        files_prepared = report.files_prepared,
        files_failed = report.files_failed,
        rows_kept = report.rows_kept
    );

    Ok(report)
}

fn prepare_one_file(
    config: &PrepareRunConfig,
    writer: &StageWriter,
    path: &Path,
    relative: &Path,
) -> Result<CleanReport, PipelineError> {
    let recording_ts = recording_timestamp_for(path)?;
    let mut table = read_snapshot(path)?;

    hash_player_ids(&mut table, &config.pepper, config.algorithm)?;
    writer.write_stage(Stage::Anonymized, relative, &table)?;

    let (cleaned, clean_report) = clean_snapshot(table, recording_ts, config.date_policy)?;
    writer.write_stage(Stage::Cleaned, relative, &cleaned)?;

    let featurized = featurize_snapshot(cleaned)?;
    writer.write_stage(Stage::Featurized, relative, &featurized)?;

    let prepared = label_snapshot(featurized)?;
    writer.write_stage(Stage::Prepared, relative, &prepared)?;

    Ok(clean_report)
}

#[derive(Debug, Clone)]
pub struct CombineRunConfig {
    /// Prepared (private) snapshot for the later recording instant.
    pub later_file: PathBuf,
    /// Prepared (private) snapshot for the earlier recording instant.
    pub earlier_file: PathBuf,
    pub data_root: PathBuf,
    pub sinks: SinkSet,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombineRunReport {
    pub later_rows: u64,
    pub earlier_rows: u64,
    pub combined_rows: u64,
    pub written: Vec<PathBuf>,
}

/// Combines two prepared snapshots and writes `CombinedData.csv` to the
/// configured sinks. Returns the combined table alongside the report so
/// callers can keep working in memory.
pub fn run_combine(config: &CombineRunConfig) -> Result<(Table, CombineRunReport), PipelineError> {
    let later = read_snapshot(&config.later_file)?;
    let earlier = read_snapshot(&config.earlier_file)?;

    let combined = combine_features(&later, &earlier)?;

    let writer = StageWriter::new(config.data_root.clone(), config.sinks.clone());
    let written = writer.write_stage(Stage::Combined, Path::new(COMBINED_FILE_NAME), &combined)?;

    let report = CombineRunReport {
        later_rows: later.row_count() as u64,
        earlier_rows: earlier.row_count() as u64,
        combined_rows: combined.row_count() as u64,
        written,
    };

    info!(
        component = "pipeline",
        event = "pipeline.combine.finish",
        later_rows = report.later_rows,
        earlier_rows = report.earlier_rows,
        combined_rows = report.combined_rows
    );

    Ok((combined, report))
}
