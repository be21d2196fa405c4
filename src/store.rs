//! CSV snapshot store: reading exports, writing stage artifacts.
//!
//! Output artifacts mirror each input file's path relative to the input
//! root, under `<data_root>/<stage>/<visibility>/`. Public artifacts have
//! the identifier column removed; private artifacts keep it.
//!
//! The legacy output-mode flag is lowered to an explicit [`SinkSet`] at the
//! configuration boundary; transforms return tables and only
//! [`StageWriter`] touches the filesystem.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::anonymize::clear_player_ids;
use crate::table::{Cell, Table, TableError, ID_COLUMN};

/// File name of the cross-timestamp result.
pub const COMBINED_FILE_NAME: &str = "CombinedData.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Anonymized,
    Cleaned,
    Featurized,
    Prepared,
    Combined,
}

impl Stage {
    pub fn dir_name(self) -> &'static str {
        match self {
            Stage::Anonymized => "anonymized",
            Stage::Cleaned => "cleaned",
            Stage::Featurized => "featurized",
            Stage::Prepared => "prepared",
            Stage::Combined => "combined",
        }
    }

    const ALL: [Stage; 5] = [
        Stage::Anonymized,
        Stage::Cleaned,
        Stage::Featurized,
        Stage::Prepared,
        Stage::Combined,
    ];

    /// The last stage of each pipeline, the only ones emitted in `final`
    /// output mode.
    const FINAL: [Stage; 2] = [Stage::Prepared, Stage::Combined];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    /// Identifier column removed.
    Public,
    /// Identifier column retained.
    Private,
}

impl Visibility {
    pub fn dir_name(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    None,
    Public,
    Private,
    Final,
    All,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unrecognized output mode: {0}")]
    InvalidOutputMode(String),
    #[error("cannot derive a recording timestamp from path {0}")]
    InvalidTimestampDir(PathBuf),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn parse_output_mode(input: &str) -> Result<OutputMode, StoreError> {
    match input.trim().to_ascii_lowercase().as_str() {
        "none" => Ok(OutputMode::None),
        "public" => Ok(OutputMode::Public),
        "private" => Ok(OutputMode::Private),
        "final" => Ok(OutputMode::Final),
        "all" => Ok(OutputMode::All),
        other => Err(StoreError::InvalidOutputMode(other.to_string())),
    }
}

/// The set of `(stage, visibility)` artifact sinks a run writes to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkSet {
    sinks: HashSet<(Stage, Visibility)>,
}

impl SinkSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stage: Stage, visibility: Visibility) {
        self.sinks.insert((stage, visibility));
    }

    pub fn contains(&self, stage: Stage, visibility: Visibility) -> bool {
        self.sinks.contains(&(stage, visibility))
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Lowers a legacy output mode into its sink set.
    pub fn from_mode(mode: OutputMode) -> Self {
        let mut set = Self::empty();
        match mode {
            OutputMode::None => {}
            OutputMode::Public => {
                for stage in Stage::ALL {
                    set.insert(stage, Visibility::Public);
                }
            }
            OutputMode::Private => {
                for stage in Stage::ALL {
                    set.insert(stage, Visibility::Private);
                }
            }
            OutputMode::Final => {
                for stage in Stage::FINAL {
                    set.insert(stage, Visibility::Public);
                    set.insert(stage, Visibility::Private);
                }
            }
            OutputMode::All => {
                for stage in Stage::ALL {
                    set.insert(stage, Visibility::Public);
                    set.insert(stage, Visibility::Private);
                }
            }
        }
        set
    }
}

/// Reads one snapshot CSV into a [`Table`].
///
/// Empty fields become Missing. Fields that parse as numbers are stored
/// numerically, except in the identifier column, which always stays text.
pub fn read_snapshot(path: &Path) -> Result<Table, StoreError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut table = Table::new(headers);
    let id_col = table.require_column(ID_COLUMN)?;

    for record in reader.records() {
        let record = record?;
        let row: Vec<Cell> = record
            .iter()
            .enumerate()
            .map(|(col, field)| parse_field(field, col == id_col))
            .collect();
        table.push_row(row)?;
    }

    Ok(table)
}

fn parse_field(field: &str, is_id: bool) -> Cell {
    if field.is_empty() {
        return Cell::Missing;
    }
    if !is_id {
        if let Ok(value) = field.trim().parse::<f64>() {
            return Cell::Number(value);
        }
    }
    Cell::Text(field.to_string())
}

/// Writes a table as CSV, creating parent directories as needed.
pub fn write_table(path: &Path, table: &Table) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(format_cell))?;
    }
    writer.flush()?;
    Ok(())
}

fn format_cell(cell: &Cell) -> String {
    match cell {
        Cell::Missing => String::new(),
        Cell::Text(s) => s.clone(),
        Cell::Number(v) => {
            if v.fract() == 0.0 && v.is_finite() && v.abs() < 1e15 {
                format!("{}", *v as i64)
            } else {
                format!("{v}")
            }
        }
    }
}

/// Derives the recording timestamp from a snapshot file's parent directory
/// name, per the export convention `<input>/<unix_ts>/PlayerData.csv`.
pub fn recording_timestamp_for(path: &Path) -> Result<i64, StoreError> {
    path.parent()
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .and_then(|name| name.parse::<f64>().ok())
        .map(|ts| ts as i64)
        .ok_or_else(|| StoreError::InvalidTimestampDir(path.to_path_buf()))
}

/// Recursively lists `*.csv` files under a directory, sorted for
/// deterministic batch order.
pub fn list_snapshot_files(input_dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut files = Vec::new();
    collect_csv_files(input_dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_csv_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), StoreError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_csv_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "csv") {
            out.push(path);
        }
    }
    Ok(())
}

/// Writes stage artifacts under a data root, honoring a [`SinkSet`].
#[derive(Debug, Clone)]
pub struct StageWriter {
    data_root: PathBuf,
    sinks: SinkSet,
}

impl StageWriter {
    pub fn new(data_root: PathBuf, sinks: SinkSet) -> Self {
        Self { data_root, sinks }
    }

    pub fn stage_path(&self, stage: Stage, visibility: Visibility, relative: &Path) -> PathBuf {
        self.data_root
            .join(stage.dir_name())
            .join(visibility.dir_name())
            .join(relative)
    }

    /// Writes `table` to every configured sink for `stage`. The public
    /// variant drops the identifier column; a table that never had one
    /// (already public) is written as-is.
    pub fn write_stage(
        &self,
        stage: Stage,
        relative: &Path,
        table: &Table,
    ) -> Result<Vec<PathBuf>, StoreError> {
        let mut written = Vec::new();

        if self.sinks.contains(stage, Visibility::Private) {
            let path = self.stage_path(stage, Visibility::Private, relative);
            write_table(&path, table)?;
            written.push(path);
        }

        if self.sinks.contains(stage, Visibility::Public) {
            let path = self.stage_path(stage, Visibility::Public, relative);
            if table.has_column(ID_COLUMN) {
                let mut public = table.clone();
                clear_player_ids(&mut public).map_err(|_| {
                    StoreError::Table(TableError::MissingColumn(ID_COLUMN.to_string()))
                })?;
                write_table(&path, &public)?;
            } else {
                write_table(&path, table)?;
            }
            written.push(path);
        }

        for path in &written {
            debug!(
                component = "store",
                event = "store.stage.written",
                stage = stage.dir_name(),
                path = %path.display()
            );
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn output_modes_lower_to_expected_sink_sets() {
        assert!(SinkSet::from_mode(OutputMode::None).is_empty());

        let public = SinkSet::from_mode(OutputMode::Public);
        assert!(public.contains(Stage::Cleaned, Visibility::Public));
        assert!(!public.contains(Stage::Cleaned, Visibility::Private));

        let private = SinkSet::from_mode(OutputMode::Private);
        assert!(private.contains(Stage::Anonymized, Visibility::Private));
        assert!(!private.contains(Stage::Anonymized, Visibility::Public));

        let final_only = SinkSet::from_mode(OutputMode::Final);
        assert!(final_only.contains(Stage::Prepared, Visibility::Public));
        assert!(final_only.contains(Stage::Prepared, Visibility::Private));
        assert!(final_only.contains(Stage::Combined, Visibility::Private));
        assert!(!final_only.contains(Stage::Featurized, Visibility::Private));

        let all = SinkSet::from_mode(OutputMode::All);
        for stage in Stage::ALL {
            assert!(all.contains(stage, Visibility::Public));
            assert!(all.contains(stage, Visibility::Private));
        }
    }

    #[test]
    fn parse_output_mode_rejects_unknown_values() {
        assert!(matches!(parse_output_mode("all"), Ok(OutputMode::All)));
        assert!(matches!(parse_output_mode(" Final "), Ok(OutputMode::Final)));
        assert!(matches!(
            parse_output_mode("everything"),
            Err(StoreError::InvalidOutputMode(_))
        ));
    }

    #[test]
    fn read_snapshot_sniffs_numbers_but_keeps_ids_text() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("PlayerData.csv");
        let mut file = std::fs::File::create(&path).expect("create csv");
        writeln!(file, "UUID,balance,plan_player_lastseen").expect("write header");
        writeln!(file, "123,42.5,Today 10:00").expect("write row");
        writeln!(file, "abc,,Yesterday 09:00").expect("write row");
        drop(file);

        let table = read_snapshot(&path).expect("snapshot reads");
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.cell(0, 0), &Cell::from("123"));
        assert_eq!(table.cell(0, 1), &Cell::Number(42.5));
        assert_eq!(table.cell(1, 1), &Cell::Missing);
        assert_eq!(table.cell(0, 2), &Cell::from("Today 10:00"));
    }

    #[test]
    fn read_snapshot_requires_the_id_column() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("PlayerData.csv");
        std::fs::write(&path, "balance\n1\n").expect("write csv");

        let err = read_snapshot(&path).expect_err("id column required");
        assert!(matches!(
            err,
            StoreError::Table(TableError::MissingColumn(_))
        ));
    }

    #[test]
    fn write_then_read_round_trips_cells() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("out.csv");

        let mut table = Table::new(vec![ID_COLUMN.to_string(), "balance".to_string()]);
        table
            .push_row(vec![Cell::from("p1"), Cell::Number(10.0)])
            .expect("row fits");
        table
            .push_row(vec![Cell::from("p2"), Cell::Missing])
            .expect("row fits");
        write_table(&path, &table).expect("table writes");

        let read_back = read_snapshot(&path).expect("reads back");
        assert_eq!(read_back.cell(0, 1), &Cell::Number(10.0));
        assert_eq!(read_back.cell(1, 1), &Cell::Missing);
    }

    #[test]
    fn integral_numbers_are_written_without_decimals() {
        assert_eq!(format_cell(&Cell::Number(1_209_600.0)), "1209600");
        assert_eq!(format_cell(&Cell::Number(0.25)), "0.25");
        assert_eq!(format_cell(&Cell::Missing), "");
    }

    #[test]
    fn recording_timestamp_comes_from_the_parent_directory() {
        let path = Path::new("/data/input/1736942400/PlayerData.csv");
        assert_eq!(recording_timestamp_for(path).expect("valid dir"), 1_736_942_400);

        let fractional = Path::new("/data/input/1736942400.5/PlayerData.csv");
        assert_eq!(
            recording_timestamp_for(fractional).expect("valid dir"),
            1_736_942_400
        );

        let bad = Path::new("/data/input/latest/PlayerData.csv");
        assert!(matches!(
            recording_timestamp_for(bad),
            Err(StoreError::InvalidTimestampDir(_))
        ));
    }

    #[test]
    fn stage_writer_honors_sinks_and_strips_ids_publicly() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut sinks = SinkSet::empty();
        sinks.insert(Stage::Prepared, Visibility::Public);
        sinks.insert(Stage::Prepared, Visibility::Private);
        let writer = StageWriter::new(dir.path().to_path_buf(), sinks);

        let mut table = Table::new(vec![ID_COLUMN.to_string(), "balance".to_string()]);
        table
            .push_row(vec![Cell::from("p1"), Cell::Number(10.0)])
            .expect("row fits");

        let written = writer
            .write_stage(Stage::Prepared, Path::new("1000/PlayerData.csv"), &table)
            .expect("stage writes");
        assert_eq!(written.len(), 2);

        let private = std::fs::read_to_string(
            dir.path().join("prepared/private/1000/PlayerData.csv"),
        )
        .expect("private artifact exists");
        assert!(private.contains("UUID"));
        assert!(private.contains("p1"));

        let public = std::fs::read_to_string(
            dir.path().join("prepared/public/1000/PlayerData.csv"),
        )
        .expect("public artifact exists");
        assert!(!public.contains("UUID"));
        assert!(!public.contains("p1"));

        // Cleaned stage has no sink configured, so nothing is written.
        let none = writer
            .write_stage(Stage::Cleaned, Path::new("1000/PlayerData.csv"), &table)
            .expect("no-op write");
        assert!(none.is_empty());
        assert!(!dir.path().join("cleaned").exists());
    }
}
