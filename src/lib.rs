//! Churn dataset preparation for player-activity snapshots.
//!
//! Implemented scope:
//! - keyed anonymization of player identifiers
//! - per-snapshot cleaning, feature engineering, and activity labeling
//! - cross-timestamp combination with delta features and the 4-class
//!   churn/retention label
//! - batch runs over timestamped CSV export trees with per-stage artifacts

mod anonymize;
mod combine;
mod lastseen;
mod observability;
mod pipeline;
mod prepare;
mod stats;
mod store;
mod table;
mod target;

pub use anonymize::{
    clear_player_ids, hash_player_ids, parse_hash_algorithm, pepper_from_env, AnonymizeError,
    HashAlgorithm, SecretError, PEPPER_ENV_VAR,
};
pub use combine::{combine_features, CombineError, CHURN_COLUMN};
pub use lastseen::{seconds_since_last_seen, LastSeenError};
pub use observability::{
    init_logging, log_app_start, logging_config_from_env, LogFormat, LoggingConfig,
    LoggingInitError,
};
pub use pipeline::{
    run_combine, run_prepare, CombineRunConfig, CombineRunReport, PipelineError, PrepareRunConfig,
    PrepareRunReport,
};
pub use prepare::{
    clean_snapshot, featurize_snapshot, label_snapshot, prepare_snapshot, CleanReport,
    DateParsePolicy, PrepareError, ACTIVE_COLUMN, ACTIVE_THRESHOLD_SECONDS, BALANCE_COLUMN,
    LASTSEEN_COLUMN, RATIO_DAY_WEEK_COLUMN, RATIO_TOTAL_MONTH_COLUMN, RATIO_WEEK_MONTH_COLUMN,
};
pub use stats::{summary_statistics, ColumnSummary};
pub use store::{
    list_snapshot_files, parse_output_mode, read_snapshot, recording_timestamp_for, write_table,
    OutputMode, SinkSet, Stage, StageWriter, StoreError, Visibility, COMBINED_FILE_NAME,
};
pub use table::{Cell, Table, TableError, ID_COLUMN};
pub use target::{build_target, TargetError};
