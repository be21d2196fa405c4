//! Per-column summary statistics for operator inspection.

use serde::{Deserialize, Serialize};

use crate::table::{Table, ID_COLUMN};

/// Descriptive statistics for one numeric column. `std` is the sample
/// standard deviation; it is 0 when fewer than two values are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub column: String,
    pub count: u64,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Summarizes every numeric column except the identifier. Columns with no
/// numeric values are omitted. Read-only; nothing downstream consumes this.
pub fn summary_statistics(table: &Table) -> Vec<ColumnSummary> {
    let mut summaries = Vec::new();

    for (col, name) in table.columns().iter().enumerate() {
        if name == ID_COLUMN {
            continue;
        }
        let values: Vec<f64> = table
            .rows()
            .iter()
            .filter_map(|row| row[col].as_f64())
            .collect();
        if values.is_empty() {
            continue;
        }

        let count = values.len() as f64;
        let mean = values.iter().sum::<f64>() / count;
        let std = if values.len() < 2 {
            0.0
        } else {
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1.0);
            variance.sqrt()
        };
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        summaries.push(ColumnSummary {
            column: name.clone(),
            count: values.len() as u64,
            mean,
            std,
            min,
            max,
        });
    }

    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Cell;

    #[test]
    fn summarizes_numeric_columns_and_skips_the_identifier() {
        let mut t = Table::new(vec![
            ID_COLUMN.to_string(),
            "balance".to_string(),
            "server".to_string(),
        ]);
        for (id, balance) in [("a", 1.0), ("b", 2.0), ("c", 3.0)] {
            t.push_row(vec![
                Cell::from(id),
                Cell::Number(balance),
                Cell::from("Spawn"),
            ])
            .expect("fixture row fits");
        }

        let summaries = summary_statistics(&t);
        assert_eq!(summaries.len(), 1);

        let balance = &summaries[0];
        assert_eq!(balance.column, "balance");
        assert_eq!(balance.count, 3);
        assert!((balance.mean - 2.0).abs() < 1e-12);
        assert!((balance.std - 1.0).abs() < 1e-12);
        assert_eq!(balance.min, 1.0);
        assert_eq!(balance.max, 3.0);
    }

    #[test]
    fn missing_cells_are_excluded_from_counts() {
        let mut t = Table::new(vec![ID_COLUMN.to_string(), "rank".to_string()]);
        t.push_row(vec![Cell::from("a"), Cell::Number(4.0)])
            .expect("fixture row fits");
        t.push_row(vec![Cell::from("b"), Cell::Missing])
            .expect("fixture row fits");

        let summaries = summary_statistics(&t);
        assert_eq!(summaries[0].count, 1);
        assert_eq!(summaries[0].std, 0.0);
    }
}
