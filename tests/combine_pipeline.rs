use std::fs;
use std::path::{Path, PathBuf};

use churnprep::{
    build_target, read_snapshot, run_combine, run_prepare, CombineRunConfig, DateParsePolicy,
    HashAlgorithm, OutputMode, PrepareRunConfig, SinkSet, CHURN_COLUMN, ID_COLUMN,
};
use sha2::{Digest, Sha256};
use tempfile::TempDir;

const PEPPER: &str = "integration-pepper";
// 2025-01-15T12:00:00Z and 2025-02-15T12:00:00Z.
const EARLIER_TS: i64 = 1_736_942_400;
const LATER_TS: i64 = 1_739_620_800;

const HEADER: &str = "UUID,balance,chemrank,plan_player_time_total_raw,\
plan_player_time_month_raw,plan_player_time_week_raw,plan_player_time_day_raw,\
plan_player_favorite_server,plan_player_sessions_count,plan_player_lastseen";

fn write_snapshot(root: &Path, recording_ts: i64, rows: &[&str]) {
    let dir = root.join(recording_ts.to_string());
    fs::create_dir_all(&dir).expect("snapshot dir");
    let mut content = String::from(HEADER);
    for row in rows {
        content.push('\n');
        content.push_str(row);
    }
    content.push('\n');
    fs::write(dir.join("PlayerData.csv"), content).expect("snapshot file");
}

fn digest(raw_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{PEPPER}:{raw_id}").as_bytes());
    hex::encode(hasher.finalize())
}

/// Prepares both snapshots and returns the two prepared private files.
fn prepare_both(input: &Path, data_root: &Path) -> (PathBuf, PathBuf) {
    // Earlier snapshot: p1 active, p2 inactive. Later snapshot: p2 active
    // again, p4 long gone; p1 has left entirely.
    write_snapshot(
        input,
        EARLIER_TS,
        &[
            "uuid-p1,100,5,100,50,20,5,Spawn,3,Today 10:00",
            "uuid-p2,40,2,200,0,10,2,Factory,2,Jan 10 2024 09:30",
        ],
    );
    write_snapshot(
        input,
        LATER_TS,
        &[
            "uuid-p2,90,6,210,30,12,3,Factory,4,Today 09:00",
            "uuid-p4,10,1,50,0,0,0,Spawn,1,Jan 10 2024 12:00",
        ],
    );

    let report = run_prepare(&PrepareRunConfig {
        input_dir: input.to_path_buf(),
        data_root: data_root.to_path_buf(),
        pepper: PEPPER.to_string(),
        algorithm: HashAlgorithm::Sha256,
        sinks: SinkSet::from_mode(OutputMode::Private),
        date_policy: DateParsePolicy::Strict,
    })
    .expect("prepare run succeeds");
    assert_eq!(report.files_prepared, 2);

    (
        data_root
            .join("prepared/private")
            .join(format!("{EARLIER_TS}/PlayerData.csv")),
        data_root
            .join("prepared/private")
            .join(format!("{LATER_TS}/PlayerData.csv")),
    )
}

fn churn_for(table: &churnprep::Table, raw_id: &str) -> f64 {
    let id_col = table.column_index(ID_COLUMN).expect("id column");
    let churn_col = table.column_index(CHURN_COLUMN).expect("churn column");
    let row = (0..table.row_count())
        .find(|&r| table.cell(r, id_col).as_text() == Some(digest(raw_id).as_str()))
        .expect("player present in combined output");
    table.cell(row, churn_col).as_f64().expect("numeric churn")
}

#[test]
fn combine_run_produces_the_labeled_dataset() {
    let tmp = TempDir::new().expect("temp dir");
    let input = tmp.path().join("input");
    let data_root = tmp.path().join("data");
    let (earlier_file, later_file) = prepare_both(&input, &data_root);

    let (combined, report) = run_combine(&CombineRunConfig {
        later_file,
        earlier_file,
        data_root: data_root.clone(),
        sinks: SinkSet::from_mode(OutputMode::Final),
    })
    .expect("combine run succeeds");

    assert_eq!(report.earlier_rows, 2);
    assert_eq!(report.later_rows, 2);
    assert_eq!(report.combined_rows, 3);
    assert_eq!(report.written.len(), 2);

    // p1 was active then vanished: churned. p2 was inactive then returned:
    // recovered. p4 only ever appears inactive: inactive-inactive.
    assert_eq!(churn_for(&combined, "uuid-p1"), 2.0);
    assert_eq!(churn_for(&combined, "uuid-p2"), 1.0);
    assert_eq!(churn_for(&combined, "uuid-p4"), 0.0);

    // Deltas: p2 present in both, |90 - 40| = 50; one-sided players keep a
    // missing delta rather than a fabricated zero.
    let id_col = combined.column_index(ID_COLUMN).expect("id column");
    let change_col = combined
        .column_index("balance_change")
        .expect("delta column");
    for row in 0..combined.row_count() {
        let id = combined.cell(row, id_col).as_text().expect("hashed id");
        if id == digest("uuid-p2") {
            assert_eq!(combined.cell(row, change_col).as_f64(), Some(50.0));
        } else {
            assert!(combined.cell(row, change_col).is_missing());
        }
    }

    // Raw activity columns are intermediate, not output.
    assert!(combined.column_index("active").is_none());
    assert!(combined.column_index("active_t1").is_none());
    assert!(combined.column_index("active_t2").is_none());

    let private = fs::read_to_string(data_root.join("combined/private/CombinedData.csv"))
        .expect("private combined artifact");
    assert!(private.contains("churn"));
    assert!(private.contains(&digest("uuid-p2")));

    let public = fs::read_to_string(data_root.join("combined/public/CombinedData.csv"))
        .expect("public combined artifact");
    assert!(!public.contains("UUID"));
    assert!(!public.contains(&digest("uuid-p2")));
}

#[test]
fn target_pipeline_agrees_with_the_combiner_labels() {
    let tmp = TempDir::new().expect("temp dir");
    let input = tmp.path().join("input");
    let data_root = tmp.path().join("data");
    let (earlier_file, later_file) = prepare_both(&input, &data_root);

    let earlier = read_snapshot(&earlier_file).expect("earlier prepared table");
    let later = read_snapshot(&later_file).expect("later prepared table");

    let labels = build_target(&earlier, &later, true).expect("target build succeeds");
    assert_eq!(labels.columns(), &[ID_COLUMN, CHURN_COLUMN]);
    assert_eq!(labels.row_count(), 3);
    assert_eq!(churn_for(&labels, "uuid-p1"), 2.0);
    assert_eq!(churn_for(&labels, "uuid-p2"), 1.0);
    assert_eq!(churn_for(&labels, "uuid-p4"), 0.0);

    let full = build_target(&earlier, &later, false).expect("target build succeeds");
    assert!(full.column_index(CHURN_COLUMN).is_some());
    assert!(full.column_index("active").is_none());
    assert!(full.column_index("balance").is_some());
}
