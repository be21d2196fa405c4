//! Per-snapshot cleaning, featurizing, and activity labeling.
//!
//! The three stage functions are pure transforms over one [`Table`] and are
//! applied in order: [`clean_snapshot`] -> [`featurize_snapshot`] ->
//! [`label_snapshot`]. [`prepare_snapshot`] composes them. Each stage's
//! output is what the batch pipeline persists under the matching artifact
//! tree. The stages are single-application: running them on an
//! already-prepared table fails fast instead of corrupting columns.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::lastseen::{seconds_since_last_seen, LastSeenError};
use crate::table::{Cell, Table, TableError};

pub const LASTSEEN_COLUMN: &str = "plan_player_lastseen";
pub const BALANCE_COLUMN: &str = "balance";
pub const ACTIVE_COLUMN: &str = "active";
pub const FAVORITE_SERVER_COLUMN: &str = "plan_player_favorite_server";
pub const SESSIONS_COUNT_COLUMN: &str = "plan_player_sessions_count";

pub const RATIO_TOTAL_MONTH_COLUMN: &str = "plan_player_relativePlaytime_totalmonth";
pub const RATIO_WEEK_MONTH_COLUMN: &str = "plan_player_relativePlaytime_weekmonth";
pub const RATIO_DAY_WEEK_COLUMN: &str = "plan_player_relativePlaytime_dayweek";

/// 14 days. A player last seen strictly under this many seconds before the
/// recording instant is labeled active; the boundary value itself is
/// inactive.
pub const ACTIVE_THRESHOLD_SECONDS: i64 = 1_209_600;

/// Raw export markers that mean "no value".
const NULL_SENTINELS: [&str; 3] = ["<none>", " <none>", "-"];

/// Unit words the export appends to balances, stripped case-sensitively.
const CURRENCY_WORDS: [&str; 6] = ["dollars", "dollar", "money", "Dollars", "Dollar", "Money"];

/// Columns defaulted to 0 when missing. Exact names are part of the export
/// contract; a renamed column silently stops receiving its default.
const ZERO_FILL_COLUMNS: [&str; 37] = [
    "mcmmo_power_level",
    "mcmmo_skill_ACROBATICS",
    "mcmmo_skill_ALCHEMY",
    "mcmmo_skill_ARCHERY",
    "mcmmo_skill_AXES",
    "mcmmo_skill_CROSSBOWS",
    "mcmmo_skill_EXCAVATION",
    "mcmmo_skill_FISHING",
    "mcmmo_skill_HERBALISM",
    "mcmmo_skill_MACES",
    "mcmmo_skill_MINING",
    "mcmmo_skill_REPAIR",
    "mcmmo_skill_SALVAGE",
    "mcmmo_skill_SMELTING",
    "mcmmo_skill_SWORDS",
    "mcmmo_skill_TAMING",
    "mcmmo_skill_TRIDENTS",
    "mcmmo_skill_UNARMED",
    "mcmmo_skill_WOODCUTTING",
    "lw_rev_total",
    "lw_rev_phase",
    "chemrank",
    "policerank",
    "donorrank",
    "goldrank",
    "current_month_votes",
    "plan_player_time_total_raw",
    "plan_player_time_month_raw",
    "plan_player_time_week_raw",
    "plan_player_time_day_raw",
    "plan_player_time_afk_raw",
    "plan_player_latest_session_length_raw",
    "leaderboard_position_chems_all",
    "leaderboard_position_chems_week",
    "leaderboard_position_police_all",
    "leaderboard_position_police_week",
    "balance",
];

/// What to do when a non-missing last-seen value does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateParsePolicy {
    /// Fail the whole table on the first unparseable value.
    Strict,
    /// Drop the offending row, log it, and count it in the report.
    ReportAndSkip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanReport {
    pub rows_in: u64,
    pub rows_missing_lastseen: u64,
    pub rows_unparseable_lastseen: u64,
    pub rows_kept: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrepareError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("unparseable last-seen value '{value}': {source}")]
    UnparseableDate {
        value: String,
        source: LastSeenError,
    },
    #[error("table already carries derived column '{0}'; stages are single-application")]
    AlreadyFeaturized(String),
    #[error("last-seen column holds '{0}' instead of seconds; run clean_snapshot first")]
    UncleanedLastSeen(String),
}

/// Normalizes sentinels, fills contract defaults, drops rows without a
/// last-seen value, rewrites last-seen into seconds-since, and strips
/// currency words from the balance column.
pub fn clean_snapshot(
    mut table: Table,
    recording_ts: i64,
    policy: DateParsePolicy,
) -> Result<(Table, CleanReport), PrepareError> {
    for derived in [
        ACTIVE_COLUMN,
        RATIO_TOTAL_MONTH_COLUMN,
        RATIO_WEEK_MONTH_COLUMN,
        RATIO_DAY_WEEK_COLUMN,
    ] {
        if table.has_column(derived) {
            return Err(PrepareError::AlreadyFeaturized(derived.to_string()));
        }
    }
    let lastseen_col = table.require_column(LASTSEEN_COLUMN)?;

    let rows_in = table.row_count() as u64;

    // 1. Sentinel markers become explicit missing values, table-wide.
    for row in 0..table.row_count() {
        for col in 0..table.columns().len() {
            if let Some(text) = table.cell(row, col).as_text() {
                if NULL_SENTINELS.contains(&text) {
                    table.set_cell(row, col, Cell::Missing);
                }
            }
        }
    }

    // 2. Contract defaults for columns present in the table.
    for name in ZERO_FILL_COLUMNS {
        fill_missing(&mut table, name, Cell::Number(0.0));
    }
    fill_missing(&mut table, FAVORITE_SERVER_COLUMN, Cell::from("Spawn"));
    fill_missing(&mut table, SESSIONS_COUNT_COLUMN, Cell::Number(1.0));

    // 3. Unknown activity is excluded, not defaulted.
    table.retain_rows(|row| !row[lastseen_col].is_missing());
    let rows_missing_lastseen = rows_in - table.row_count() as u64;

    // 4. Last-seen text -> seconds since, per policy.
    let mut keep = vec![true; table.row_count()];
    let mut rows_unparseable_lastseen = 0u64;
    for row in 0..table.row_count() {
        let raw = match table.cell(row, lastseen_col) {
            Cell::Text(s) => s.clone(),
            other => {
                return Err(PrepareError::UncleanedLastSeen(format!("{other:?}")));
            }
        };
        match seconds_since_last_seen(&raw, recording_ts) {
            Ok(seconds) => table.set_cell(row, lastseen_col, Cell::Number(seconds as f64)),
            Err(source) => match policy {
                DateParsePolicy::Strict => {
                    return Err(PrepareError::UnparseableDate { value: raw, source });
                }
                DateParsePolicy::ReportAndSkip => {
                    warn!(
                        component = "prepare",
                        event = "prepare.clean.unparseable_lastseen",
                        value = %raw,
                        recording_ts = recording_ts
                    );
                    keep[row] = false;
                    rows_unparseable_lastseen += 1;
                }
            },
        }
    }
    let mut visited = 0usize;
    table.retain_rows(|_| {
        let kept = keep[visited];
        visited += 1;
        kept
    });

    // 5. Strip unit words from balances, then re-coerce.
    if let Some(balance_col) = table.column_index(BALANCE_COLUMN) {
        for row in 0..table.row_count() {
            if let Some(text) = table.cell(row, balance_col).as_text() {
                let mut stripped = text.to_string();
                for word in CURRENCY_WORDS {
                    stripped = stripped.replace(word, "");
                }
                let trimmed = stripped.trim();
                let replacement = if trimmed.is_empty() {
                    Cell::Missing
                } else if let Ok(value) = trimmed.parse::<f64>() {
                    Cell::Number(value)
                } else {
                    Cell::Text(trimmed.to_string())
                };
                table.set_cell(row, balance_col, replacement);
            }
        }
    }

    let report = CleanReport {
        rows_in,
        rows_missing_lastseen,
        rows_unparseable_lastseen,
        rows_kept: table.row_count() as u64,
    };

    info!(
        component = "prepare",
        event = "prepare.clean.finish",
        rows_in = report.rows_in,
        rows_missing_lastseen = report.rows_missing_lastseen,
        rows_unparseable_lastseen = report.rows_unparseable_lastseen,
        rows_kept = report.rows_kept
    );

    Ok((table, report))
}

/// Derives the three relative-playtime ratios. A divide-by-zero or other
/// non-finite result is substituted with 0.
pub fn featurize_snapshot(mut table: Table) -> Result<Table, PrepareError> {
    let specs = [
        (
            RATIO_TOTAL_MONTH_COLUMN,
            "plan_player_time_total_raw",
            "plan_player_time_month_raw",
        ),
        (
            RATIO_WEEK_MONTH_COLUMN,
            "plan_player_time_week_raw",
            "plan_player_time_month_raw",
        ),
        (
            RATIO_DAY_WEEK_COLUMN,
            "plan_player_time_day_raw",
            "plan_player_time_week_raw",
        ),
    ];

    for (name, numerator, denominator) in specs {
        if table.has_column(name) {
            return Err(PrepareError::AlreadyFeaturized(name.to_string()));
        }
        let num_col = table.require_column(numerator)?;
        let den_col = table.require_column(denominator)?;
        let values: Vec<Cell> = (0..table.row_count())
            .map(|row| {
                let num = table.cell(row, num_col).as_f64().unwrap_or(0.0);
                let den = table.cell(row, den_col).as_f64().unwrap_or(0.0);
                let ratio = num / den;
                Cell::Number(if ratio.is_finite() { ratio } else { 0.0 })
            })
            .collect();
        table.add_column(name, values)?;
    }

    Ok(table)
}

/// Appends the binary `active` label: 1 when the player was seen within the
/// last 14 days of the recording instant, 0 otherwise.
pub fn label_snapshot(mut table: Table) -> Result<Table, PrepareError> {
    if table.has_column(ACTIVE_COLUMN) {
        return Err(PrepareError::AlreadyFeaturized(ACTIVE_COLUMN.to_string()));
    }
    let lastseen_col = table.require_column(LASTSEEN_COLUMN)?;

    let mut values = Vec::with_capacity(table.row_count());
    for row in 0..table.row_count() {
        let cell = table.cell(row, lastseen_col);
        let seconds = cell
            .as_f64()
            .ok_or_else(|| PrepareError::UncleanedLastSeen(format!("{cell:?}")))?;
        let active = if (seconds as i64) < ACTIVE_THRESHOLD_SECONDS {
            1.0
        } else {
            0.0
        };
        values.push(Cell::Number(active));
    }
    table.add_column(ACTIVE_COLUMN, values)?;
    Ok(table)
}

/// Full per-snapshot preparation: clean, featurize, label.
pub fn prepare_snapshot(
    table: Table,
    recording_ts: i64,
    policy: DateParsePolicy,
) -> Result<(Table, CleanReport), PrepareError> {
    let (cleaned, report) = clean_snapshot(table, recording_ts, policy)?;
    let featurized = featurize_snapshot(cleaned)?;
    let labeled = label_snapshot(featurized)?;
    Ok((labeled, report))
}

fn fill_missing(table: &mut Table, column: &str, default: Cell) {
    let Some(col) = table.column_index(column) else {
        return;
    };
    for row in 0..table.row_count() {
        if table.cell(row, col).is_missing() {
            table.set_cell(row, col, default.clone());
        }
    }
}
