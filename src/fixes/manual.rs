//! 手動ラベル対応表からのFix表生成
//!
//! `label_en,corrected_group` の表を推定レポートと英語ラベル（前後空白除去）で突き合わせ、
//! 現在分類と異なる行だけを `entry_uid,current_group,new_group,label_en` で出力する。

use crate::error::Result;
use crate::report::PredictionRow;
use anatomy_meta_common::Table;
use std::collections::HashMap;

pub const MANUAL_FIX_COLUMNS: [&str; 4] = ["entry_uid", "current_group", "new_group", "label_en"];

#[derive(Debug, Clone)]
pub struct ManualFixes {
    pub table: Table,
    /// 対応表にラベルが載っていた行
    pub matched: usize,
    /// そのうち既に同じ分類だった行
    pub unchanged: usize,
}

/// 推定レポートと対応表を結合する
pub fn build_manual_fixes(rows: &[PredictionRow], label_map: &Table) -> Result<ManualFixes> {
    label_map.require("manual label map", &["label_en", "corrected_group"])?;

    // 同じラベルが複数回出たら最初の行を使う
    let mut corrections: HashMap<String, String> = HashMap::new();
    label_map.for_each_record(|r| {
        let label = r.get("label_en").trim();
        let group = r.get("corrected_group").trim();
        if !label.is_empty() && !group.is_empty() {
            corrections
                .entry(label.to_string())
                .or_insert_with(|| group.to_string());
        }
    });

    let mut table = Table::new(&MANUAL_FIX_COLUMNS);
    let mut matched = 0;
    let mut unchanged = 0;

    for row in rows {
        let Some(corrected) = corrections.get(row.label_en.trim()) else {
            continue;
        };
        matched += 1;
        if corrected == row.current_group.trim() {
            unchanged += 1;
            continue;
        }
        table.push_row(vec![
            row.entry_uid.clone(),
            row.current_group.clone(),
            corrected.clone(),
            row.label_en.clone(),
        ])?;
    }

    Ok(ManualFixes {
        table,
        matched,
        unchanged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anatomy_meta_common::Group;

    fn row(uid: &str, current: &str, label: &str) -> PredictionRow {
        PredictionRow {
            entry_uid: uid.into(),
            current_group: current.into(),
            predicted_group: Group::Bones,
            prob: 0.5,
            margin: 0.1,
            second_group: None,
            second_prob: 0.0,
            label_en: label.into(),
            file: String::new(),
            path: String::new(),
            reasons: String::new(),
        }
    }

    #[test]
    fn test_join_on_trimmed_label() {
        let rows = vec![
            row("FMA1__a", "other", " Hyoid bone "),
            row("FMA2__b", "bones", "Hyoid bone"),
            row("FMA3__c", "other", "Unmapped"),
        ];
        let map = Table::parse("label_en,corrected_group\nHyoid bone  ,bones\n");
        let fixes = build_manual_fixes(&rows, &map).unwrap();

        assert_eq!(fixes.matched, 2);
        assert_eq!(fixes.unchanged, 1);
        assert_eq!(fixes.table.len(), 1);
        assert_eq!(
            fixes.table.to_csv_string(),
            "entry_uid,current_group,new_group,label_en\nFMA1__a,other,bones, Hyoid bone \n"
        );
    }

    #[test]
    fn test_map_requires_columns() {
        let map = Table::parse("label,group\nx,bones\n");
        assert!(build_manual_fixes(&[], &map).is_err());
    }
}
