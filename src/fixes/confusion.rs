//! 混同行列（現在分類 × 推定分類）

use crate::error::Result;
use crate::report::PredictionRow;
use anatomy_meta_common::Table;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// 現在分類が空の行の表示名
pub const UNSET_GROUP: &str = "(none)";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    counts: BTreeMap<(String, String), usize>,
    current: BTreeSet<String>,
    predicted: BTreeSet<String>,
}

impl ConfusionMatrix {
    /// 全行から集計する（一致行も含む）
    pub fn from_rows(rows: &[PredictionRow]) -> Self {
        let mut matrix = Self::default();
        for row in rows {
            let current = match row.current_group.trim() {
                "" => UNSET_GROUP.to_string(),
                g => g.to_string(),
            };
            let predicted = row.predicted_group.to_string();
            matrix.current.insert(current.clone());
            matrix.predicted.insert(predicted.clone());
            *matrix.counts.entry((current, predicted)).or_insert(0) += 1;
        }
        matrix
    }

    pub fn count(&self, current: &str, predicted: &str) -> usize {
        self.counts
            .get(&(current.to_string(), predicted.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// 行: current_group、列: predicted_group（0埋め）
    pub fn to_table(&self) -> Result<Table> {
        let mut headers = vec!["current_group"];
        headers.extend(self.predicted.iter().map(String::as_str));
        let mut table = Table::new(&headers);

        for current in &self.current {
            let mut row = vec![current.clone()];
            row.extend(
                self.predicted
                    .iter()
                    .map(|p| self.count(current, p).to_string()),
            );
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn write_file(&self, path: &Path) -> Result<()> {
        self.to_table()?.write_file(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anatomy_meta_common::Group;

    fn row(current: &str, predicted: Group) -> PredictionRow {
        PredictionRow {
            entry_uid: String::new(),
            current_group: current.into(),
            predicted_group: predicted,
            prob: 0.5,
            margin: 0.1,
            second_group: None,
            second_prob: 0.0,
            label_en: String::new(),
            file: String::new(),
            path: String::new(),
            reasons: String::new(),
        }
    }

    #[test]
    fn test_counts_include_diagonal() {
        let rows = vec![
            row("bones", Group::Bones),
            row("other", Group::Bones),
            row("other", Group::Bones),
            row("other", Group::Muscles),
            row("", Group::Nerves),
        ];
        let matrix = ConfusionMatrix::from_rows(&rows);
        assert_eq!(matrix.count("bones", "bones"), 1);
        assert_eq!(matrix.count("other", "bones"), 2);
        assert_eq!(matrix.count(UNSET_GROUP, "nerves"), 1);
        assert_eq!(matrix.count("bones", "muscles"), 0);
        assert_eq!(matrix.total(), rows.len());
    }

    #[test]
    fn test_table_is_zero_filled() {
        let matrix = ConfusionMatrix::from_rows(&[row("other", Group::Bones), row("bones", Group::Muscles)]);
        let csv = matrix.to_table().unwrap().to_csv_string();
        assert_eq!(csv, "current_group,bones,muscles\nbones,0,1\nother,1,0\n");
    }
}
