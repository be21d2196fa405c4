//! Cross-timestamp combination of two prepared snapshots.
//!
//! [`combine_features`] outer-joins the later and earlier prepared tables on
//! the player identifier, derives absolute-difference delta columns for the
//! paired numeric metrics, computes the 4-class activity-transition label,
//! and then reduces the output to the later-timestamp state plus deltas.
//!
//! Churn classes: 0 inactive in both, 1 recovered (inactive then active),
//! 2 churned (active then inactive), 3 retained (active in both).

use std::collections::HashMap;

use thiserror::Error;
use tracing::info;

use crate::prepare::ACTIVE_COLUMN;
use crate::table::{Cell, Table, TableError, ID_COLUMN};

pub const CHURN_COLUMN: &str = "churn";

pub(crate) const LATER_SUFFIX: &str = "_t2";
pub(crate) const EARLIER_SUFFIX: &str = "_t1";

/// Metrics that get a `*_change` delta column when present in both inputs.
const DELTA_COLUMNS: [&str; 11] = [
    "balance",
    "lw_rev_total",
    "lw_rev_phase",
    "leaderboard_position_chems_all",
    "leaderboard_position_chems_week",
    "leaderboard_position_police_all",
    "leaderboard_position_police_week",
    "chemrank",
    "policerank",
    "donorrank",
    "goldrank",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CombineError {
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Outer join on the identifier column. Columns present in both inputs are
/// suffixed; one-sided columns keep their names. A player present in only
/// one input appears with the other side's cells Missing.
///
/// Duplicate identifier values are a precondition violation; rows then match
/// the first occurrence only.
pub(crate) fn outer_join(
    left: &Table,
    right: &Table,
    left_suffix: &str,
    right_suffix: &str,
) -> Result<Table, CombineError> {
    let left_id = left.require_column(ID_COLUMN)?;
    let right_id = right.require_column(ID_COLUMN)?;

    let overlap: Vec<&String> = left
        .columns()
        .iter()
        .filter(|c| *c != ID_COLUMN && right.has_column(c))
        .collect();
    let suffixed = |name: &str, suffix: &str| {
        if overlap.iter().any(|c| *c == name) {
            format!("{name}{suffix}")
        } else {
            name.to_string()
        }
    };

    let mut columns = vec![ID_COLUMN.to_string()];
    let left_cols: Vec<usize> = (0..left.columns().len()).filter(|&i| i != left_id).collect();
    let right_cols: Vec<usize> = (0..right.columns().len())
        .filter(|&i| i != right_id)
        .collect();
    for &i in &left_cols {
        columns.push(suffixed(&left.columns()[i], left_suffix));
    }
    for &i in &right_cols {
        columns.push(suffixed(&right.columns()[i], right_suffix));
    }

    let mut right_by_id: HashMap<&str, usize> = HashMap::new();
    for (row, cells) in right.rows().iter().enumerate() {
        if let Some(id) = cells[right_id].as_text() {
            right_by_id.entry(id).or_insert(row);
        }
    }

    let mut joined = Table::new(columns);
    let mut matched_right = vec![false; right.row_count()];

    for cells in left.rows() {
        let mut row = vec![cells[left_id].clone()];
        for &i in &left_cols {
            row.push(cells[i].clone());
        }
        let right_row = cells[left_id]
            .as_text()
            .and_then(|id| right_by_id.get(id).copied());
        match right_row {
            Some(r) => {
                matched_right[r] = true;
                for &i in &right_cols {
                    row.push(right.cell(r, i).clone());
                }
            }
            None => row.extend(std::iter::repeat(Cell::Missing).take(right_cols.len())),
        }
        joined.push_row(row)?;
    }

    for (r, cells) in right.rows().iter().enumerate() {
        if matched_right[r] {
            continue;
        }
        let mut row = vec![cells[right_id].clone()];
        row.extend(std::iter::repeat(Cell::Missing).take(left_cols.len()));
        for &i in &right_cols {
            row.push(cells[i].clone());
        }
        joined.push_row(row)?;
    }

    Ok(joined)
}

/// Combines two prepared snapshots into the final labeled dataset.
///
/// Both inputs must carry the `active` column from [`crate::label_snapshot`].
/// The output holds one row per distinct identifier across both inputs: the
/// later snapshot's columns (suffix stripped), the `*_change` deltas, and
/// `churn`. A delta with a missing side stays Missing rather than zero.
pub fn combine_features(later: &Table, earlier: &Table) -> Result<Table, CombineError> {
    let mut joined = outer_join(later, earlier, LATER_SUFFIX, EARLIER_SUFFIX)?;

    for name in DELTA_COLUMNS {
        let later_name = format!("{name}{LATER_SUFFIX}");
        let earlier_name = format!("{name}{EARLIER_SUFFIX}");
        let (Some(later_col), Some(earlier_col)) = (
            joined.column_index(&later_name),
            joined.column_index(&earlier_name),
        ) else {
            continue;
        };
        let deltas: Vec<Cell> = (0..joined.row_count())
            .map(|row| {
                match (
                    joined.cell(row, later_col).as_f64(),
                    joined.cell(row, earlier_col).as_f64(),
                ) {
                    (Some(t2), Some(t1)) => Cell::Number((t2 - t1).abs()),
                    _ => Cell::Missing,
                }
            })
            .collect();
        joined.add_column(&format!("{name}_change"), deltas)?;
    }

    let later_active = joined.require_column(&format!("{ACTIVE_COLUMN}{LATER_SUFFIX}"))?;
    let earlier_active = joined.require_column(&format!("{ACTIVE_COLUMN}{EARLIER_SUFFIX}"))?;
    let churn: Vec<Cell> = (0..joined.row_count())
        .map(|row| {
            // A player absent from a snapshot is treated as inactive for it.
            let earlier = joined.cell(row, earlier_active).as_f64().unwrap_or(0.0);
            let later = joined.cell(row, later_active).as_f64().unwrap_or(0.0);
            Cell::Number(earlier * 2.0 + later)
        })
        .collect();
    joined.add_column(CHURN_COLUMN, churn)?;

    joined.drop_column(&format!("{ACTIVE_COLUMN}{LATER_SUFFIX}"))?;
    joined.drop_column(&format!("{ACTIVE_COLUMN}{EARLIER_SUFFIX}"))?;

    let earlier_cols: Vec<String> = joined
        .columns()
        .iter()
        .filter(|c| c.ends_with(EARLIER_SUFFIX))
        .cloned()
        .collect();
    for name in earlier_cols {
        joined.drop_column(&name)?;
    }

    let later_cols: Vec<String> = joined
        .columns()
        .iter()
        .filter(|c| c.ends_with(LATER_SUFFIX))
        .cloned()
        .collect();
    for name in later_cols {
        let stripped = name
            .strip_suffix(LATER_SUFFIX)
            .unwrap_or(name.as_str())
            .to_string();
        joined.rename_column(&name, &stripped)?;
    }

    info!(
        component = "combine",
        event = "combine.features.finish",
        later_rows = later.row_count(),
        earlier_rows = earlier.row_count(),
        combined_rows = joined.row_count()
    );

    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared(rows: &[(&str, f64, f64)]) -> Table {
        // (id, balance, active)
        let mut t = Table::new(vec![
            ID_COLUMN.to_string(),
            "balance".to_string(),
            "chemrank".to_string(),
            ACTIVE_COLUMN.to_string(),
        ]);
        for (id, balance, active) in rows {
            t.push_row(vec![
                Cell::from(*id),
                Cell::Number(*balance),
                Cell::Number(1.0),
                Cell::Number(*active),
            ])
            .expect("fixture row fits");
        }
        t
    }

    fn churn_for(combined: &Table, id: &str) -> f64 {
        let id_col = combined.column_index(ID_COLUMN).expect("id column");
        let churn_col = combined.column_index(CHURN_COLUMN).expect("churn column");
        let row = (0..combined.row_count())
            .find(|&r| combined.cell(r, id_col).as_text() == Some(id))
            .expect("player present");
        combined
            .cell(row, churn_col)
            .as_f64()
            .expect("churn is numeric")
    }

    #[test]
    fn churn_label_covers_all_four_transitions() {
        let earlier = prepared(&[
            ("retained", 10.0, 1.0),
            ("churned", 10.0, 1.0),
            ("recovered", 10.0, 0.0),
            ("gone", 10.0, 0.0),
        ]);
        let later = prepared(&[
            ("retained", 12.0, 1.0),
            ("churned", 12.0, 0.0),
            ("recovered", 12.0, 1.0),
            ("gone", 12.0, 0.0),
        ]);

        let combined = combine_features(&later, &earlier).expect("combine succeeds");
        assert_eq!(churn_for(&combined, "retained"), 3.0);
        assert_eq!(churn_for(&combined, "churned"), 2.0);
        assert_eq!(churn_for(&combined, "recovered"), 1.0);
        assert_eq!(churn_for(&combined, "gone"), 0.0);
    }

    #[test]
    fn outer_merge_keeps_one_sided_players() {
        let earlier = prepared(&[("a", 10.0, 1.0), ("b", 10.0, 1.0)]);
        let later = prepared(&[("b", 12.0, 1.0), ("c", 12.0, 1.0)]);

        let combined = combine_features(&later, &earlier).expect("combine succeeds");
        assert_eq!(combined.row_count(), 3);

        // Present only earlier: treated inactive later -> churned.
        assert_eq!(churn_for(&combined, "a"), 2.0);
        assert_eq!(churn_for(&combined, "b"), 3.0);
        // Present only later: treated inactive earlier -> recovered.
        assert_eq!(churn_for(&combined, "c"), 1.0);
    }

    #[test]
    fn deltas_are_absolute_and_missing_side_propagates() {
        let earlier = prepared(&[("both", 100.0, 1.0)]);
        let later = prepared(&[("both", 40.0, 1.0), ("only-later", 40.0, 1.0)]);

        let combined = combine_features(&later, &earlier).expect("combine succeeds");
        let id_col = combined.column_index(ID_COLUMN).expect("id column");
        let change_col = combined
            .column_index("balance_change")
            .expect("delta column");

        for row in 0..combined.row_count() {
            let id = combined.cell(row, id_col).as_text().expect("text id");
            match id {
                "both" => assert_eq!(combined.cell(row, change_col), &Cell::Number(60.0)),
                "only-later" => assert!(combined.cell(row, change_col).is_missing()),
                other => panic!("unexpected player {other}"),
            }
        }
    }

    #[test]
    fn output_reports_later_state_without_suffixes_or_active() {
        let earlier = prepared(&[("p", 100.0, 1.0)]);
        let later = prepared(&[("p", 40.0, 1.0)]);

        let combined = combine_features(&later, &earlier).expect("combine succeeds");
        assert_eq!(
            combined.columns(),
            &[
                ID_COLUMN,
                "balance",
                "chemrank",
                "balance_change",
                "chemrank_change",
                CHURN_COLUMN,
            ]
        );
        let balance_col = combined.column_index("balance").expect("balance column");
        assert_eq!(combined.cell(0, balance_col), &Cell::Number(40.0));
    }

    #[test]
    fn unlabeled_inputs_are_rejected() {
        let mut earlier = prepared(&[("p", 100.0, 1.0)]);
        earlier.drop_column(ACTIVE_COLUMN).expect("column exists");
        let later = prepared(&[("p", 40.0, 1.0)]);

        let err = combine_features(&later, &earlier).expect_err("missing active column");
        assert!(matches!(
            err,
            CombineError::Table(TableError::MissingColumn(_))
        ));
    }
}
