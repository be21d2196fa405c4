//! Target-label derivation from two already-labeled snapshots.
//!
//! Unlike [`crate::combine_features`], this path touches nothing but the
//! activity columns: it outer-joins the earlier feature table against the
//! later table's `{UUID, active}` projection and derives the 4-class churn
//! label. With `label_only` it returns just `{UUID, churn}`.

use thiserror::Error;
use tracing::info;

use crate::combine::{outer_join, CombineError, CHURN_COLUMN, EARLIER_SUFFIX, LATER_SUFFIX};
use crate::prepare::ACTIVE_COLUMN;
use crate::table::{Cell, Table, TableError, ID_COLUMN};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error(transparent)]
    Table(#[from] TableError),
}

impl From<CombineError> for TargetError {
    fn from(err: CombineError) -> Self {
        match err {
            CombineError::Table(e) => TargetError::Table(e),
        }
    }
}

/// Builds `churn = 2*active_earlier + active_later` across the two snapshots.
///
/// Players absent from either snapshot still appear; the missing side's
/// `active` defaults to 0. When `label_only` is false the result is the
/// earlier snapshot's feature set with `churn` appended and the temporary
/// activity columns removed.
pub fn build_target(earlier: &Table, later: &Table, label_only: bool) -> Result<Table, TargetError> {
    later.require_column(ACTIVE_COLUMN)?;
    earlier.require_column(ACTIVE_COLUMN)?;

    let later_activity = later.select(&[ID_COLUMN, ACTIVE_COLUMN])?;
    let mut joined = outer_join(earlier, &later_activity, EARLIER_SUFFIX, LATER_SUFFIX)?;

    let earlier_active = joined.require_column(&format!("{ACTIVE_COLUMN}{EARLIER_SUFFIX}"))?;
    let later_active = joined.require_column(&format!("{ACTIVE_COLUMN}{LATER_SUFFIX}"))?;

    let churn: Vec<Cell> = (0..joined.row_count())
        .map(|row| {
            let earlier = joined.cell(row, earlier_active).as_f64().unwrap_or(0.0);
            let later = joined.cell(row, later_active).as_f64().unwrap_or(0.0);
            Cell::Number(earlier * 2.0 + later)
        })
        .collect();
    joined.add_column(CHURN_COLUMN, churn)?;

    info!(
        component = "target",
        event = "target.label.finish",
        earlier_rows = earlier.row_count(),
        later_rows = later.row_count(),
        labeled_rows = joined.row_count(),
        label_only = label_only
    );

    if label_only {
        return Ok(joined.select(&[ID_COLUMN, CHURN_COLUMN])?);
    }

    joined.drop_column(&format!("{ACTIVE_COLUMN}{EARLIER_SUFFIX}"))?;
    joined.drop_column(&format!("{ACTIVE_COLUMN}{LATER_SUFFIX}"))?;

    let suffixed: Vec<String> = joined
        .columns()
        .iter()
        .filter(|c| c.ends_with(EARLIER_SUFFIX))
        .cloned()
        .collect();
    for name in suffixed {
        let stripped = name
            .strip_suffix(EARLIER_SUFFIX)
            .unwrap_or(name.as_str())
            .to_string();
        joined.rename_column(&name, &stripped)?;
    }

    Ok(joined)
}
