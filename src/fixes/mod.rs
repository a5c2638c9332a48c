//! 分類修正（Fix）
//!
//! ## 処理フロー
//! 1. builder: 推定レポートの不一致行から修正候補を作る
//! 2. confusion: 現在分類 × 推定分類の件数表
//! 3. applier: Fix表をカタログに適用（既定はドライラン）
//! 4. manual: 手動ラベル対応表からFix表を作る

pub mod applier;
pub mod builder;
pub mod confusion;
pub mod manual;

use crate::error::Result;
use crate::report::format_percent;
use anatomy_meta_common::{Group, Table};
use std::path::Path;

pub use applier::{apply_fix_file, plan_fixes, stage_and_persist, ApplyOptions, ApplyOutcome, FixPlan, StagedChange};
pub use builder::{build_fixes, quantile, FixBuild, FixThresholds, ResolvedThresholds, Threshold};
pub use confusion::ConfusionMatrix;
pub use manual::{build_manual_fixes, ManualFixes};

pub const CANDIDATES_FILE: &str = "group_fix_candidates.csv";
pub const AUTO_FILE: &str = "group_fix_auto.csv";
pub const CONFUSION_FILE: &str = "group_confusion.csv";
pub const MANUAL_FILE: &str = "group_fix_manual.csv";

/// Fix表の列
pub const FIX_COLUMNS: [&str; 12] = [
    "entry_uid",
    "current_group",
    "predicted_group",
    "new_group",
    "fix_reason",
    "prob",
    "margin",
    "label_en",
    "file",
    "path",
    "reasons",
    "auto_fix",
];

/// 修正の根拠
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixReason {
    /// 強制フレーズ
    Phrase,
    /// 確率・マージンが閾値以上
    Scores,
}

impl FixReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixReason::Phrase => "phrase",
            FixReason::Scores => "scores",
        }
    }
}

impl std::fmt::Display for FixReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 修正候補1行
#[derive(Debug, Clone, PartialEq)]
pub struct FixRow {
    pub entry_uid: String,
    pub current_group: String,
    pub predicted_group: Group,
    pub new_group: Group,
    pub fix_reason: FixReason,
    pub prob: f64,
    pub margin: f64,
    pub label_en: String,
    pub file: String,
    pub path: String,
    pub reasons: String,
    pub auto_fix: bool,
}

impl FixRow {
    fn to_fields(&self) -> Vec<String> {
        vec![
            self.entry_uid.clone(),
            self.current_group.clone(),
            self.predicted_group.to_string(),
            self.new_group.to_string(),
            self.fix_reason.to_string(),
            format_percent(self.prob),
            format_percent(self.margin),
            self.label_en.clone(),
            self.file.clone(),
            self.path.clone(),
            self.reasons.clone(),
            if self.auto_fix { "True" } else { "False" }.to_string(),
        ]
    }
}

pub fn fix_rows_to_table(rows: &[FixRow]) -> Result<Table> {
    let mut table = Table::new(&FIX_COLUMNS);
    for row in rows {
        table.push_row(row.to_fields())?;
    }
    Ok(table)
}

pub fn write_fix_rows(path: &Path, rows: &[FixRow]) -> Result<()> {
    fix_rows_to_table(rows)?.write_file(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anatomy_meta_common::table::parse_flag;

    #[test]
    fn test_fix_table_is_readable_by_applier() {
        let row = FixRow {
            entry_uid: "FMA1__a".into(),
            current_group: "other".into(),
            predicted_group: Group::Bones,
            new_group: Group::Bones,
            fix_reason: FixReason::Phrase,
            prob: 1.0,
            margin: 1.0,
            label_en: "Frontal bone".into(),
            file: "a.glb".into(),
            path: "bones".into(),
            reasons: "forced(x)".into(),
            auto_fix: true,
        };
        let table = fix_rows_to_table(&[row]).unwrap();
        assert_eq!(table.headers().len(), FIX_COLUMNS.len());

        let parsed = Table::parse(&table.to_csv_string());
        parsed.for_each_record(|r| {
            assert_eq!(r.get("new_group"), "bones");
            assert_eq!(r.get("fix_reason"), "phrase");
            assert_eq!(r.get("prob"), "100.0");
            assert!(parse_flag(r.get("auto_fix")));
        });
    }
}
