//! Fix表の適用
//!
//! 必須列: `entry_uid`, `new_group`
//! フラグ列 `apply_fix`（なければ `auto_fix`）があれば真の行だけを適用する。
//!
//! 書き込み時は キー検証 → バックアップ → 適用 → アトミック書き込み の順。

use crate::catalog::{backup_catalog, load_catalog, validate_keys, write_catalog_atomic};
use crate::error::Result;
use anatomy_meta_common::table::parse_flag;
use anatomy_meta_common::{Catalog, Group, Table};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// フラグ列の候補（先にあるものを使う）
const FLAG_COLUMNS: [&str; 2] = ["apply_fix", "auto_fix"];

/// 適用予定の変更
#[derive(Debug, Clone, PartialEq)]
pub struct StagedChange {
    /// カタログ配列内の位置
    pub position: usize,
    /// Fix表上のキー
    pub key: String,
    pub old_group: String,
    pub new_group: Group,
}

/// 適用計画と集計
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixPlan {
    pub changes: Vec<StagedChange>,
    /// Fix表の行数
    pub total_rows: usize,
    /// 使用したフラグ列
    pub flag_column: Option<String>,
    /// フラグが偽の行
    pub skipped_unflagged: usize,
    /// キーまたはグループが空
    pub skipped_blank: usize,
    pub skipped_invalid_group: usize,
    pub skipped_not_found: usize,
    pub skipped_same_group: usize,
}

impl FixPlan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn skipped_total(&self) -> usize {
        self.skipped_blank + self.skipped_invalid_group + self.skipped_not_found + self.skipped_same_group
    }
}

/// 適用オプション
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// 実際に書き込む（false ならドライラン）
    pub write: bool,
    /// classification.subgroup を null にする
    pub null_subgroup: bool,
}

/// 適用結果
#[derive(Debug, Clone, Default)]
pub struct ApplyOutcome {
    pub plan: FixPlan,
    pub entries: usize,
    pub backup: Option<PathBuf>,
    pub applied: usize,
}

impl ApplyOutcome {
    pub fn written(&self) -> bool {
        self.backup.is_some()
    }
}

/// Fix表を検証して適用計画を作る（カタログは変更しない）
pub fn plan_fixes(catalog: &Catalog, table: &Table, allowed: &[Group]) -> Result<FixPlan> {
    table.require("fixes", &["entry_uid", "new_group"])?;

    let flag_column = FLAG_COLUMNS
        .iter()
        .find(|c| table.has_column(c))
        .map(|c| c.to_string());
    let index = catalog.key_index();

    let mut plan = FixPlan {
        total_rows: table.len(),
        flag_column: flag_column.clone(),
        ..Default::default()
    };

    table.for_each_record(|record| {
        if let Some(column) = &flag_column {
            if !parse_flag(record.get(column)) {
                plan.skipped_unflagged += 1;
                return;
            }
        }

        let key = record.get("entry_uid").trim();
        let new_group = record.get("new_group").trim();
        if key.is_empty() || new_group.is_empty() {
            plan.skipped_blank += 1;
            return;
        }

        let group = match new_group.parse::<Group>() {
            Ok(g) if allowed.contains(&g) => g,
            _ => {
                debug!(key, new_group, "invalid target group");
                plan.skipped_invalid_group += 1;
                return;
            }
        };

        let Some(position) = index.resolve(key) else {
            debug!(key, "entry not found");
            plan.skipped_not_found += 1;
            return;
        };

        let old_group = catalog.entries[position].current_group();
        if old_group.trim() == group.as_str() {
            plan.skipped_same_group += 1;
            return;
        }

        plan.changes.push(StagedChange {
            position,
            key: key.to_string(),
            old_group: old_group.to_string(),
            new_group: group,
        });
    });

    Ok(plan)
}

/// 計画をメモリ上のカタログに反映する
pub fn apply_plan(catalog: &mut Catalog, plan: &FixPlan, null_subgroup: bool) -> usize {
    let mut applied = 0;
    for change in &plan.changes {
        if let Some(entry) = catalog.entries.get_mut(change.position) {
            entry.set_group(change.new_group, null_subgroup);
            applied += 1;
        }
    }
    applied
}

/// キー検証 → バックアップ → 適用 → 書き込み。戻り値はバックアップのパス
///
/// 検証・バックアップに失敗した場合、カタログ（メモリ・ファイルとも）は変更されない。
pub fn stage_and_persist(
    catalog_path: &Path,
    catalog: &mut Catalog,
    plan: &FixPlan,
    null_subgroup: bool,
) -> Result<(PathBuf, usize)> {
    validate_keys(catalog).into_result()?;
    let backup = backup_catalog(catalog_path)?;
    let applied = apply_plan(catalog, plan, null_subgroup);
    write_catalog_atomic(catalog_path, catalog)?;
    info!(applied, backup = %backup.display(), "fixes written");
    Ok((backup, applied))
}

/// カタログファイルにFix表を適用する
pub fn apply_fix_file(catalog_path: &Path, table: &Table, options: ApplyOptions) -> Result<ApplyOutcome> {
    let mut catalog = load_catalog(catalog_path)?;
    let plan = plan_fixes(&catalog, table, &Group::ALL)?;

    let mut outcome = ApplyOutcome {
        entries: catalog.len(),
        ..Default::default()
    };

    if options.write && !plan.is_empty() {
        let (backup, applied) = stage_and_persist(catalog_path, &mut catalog, &plan, options.null_subgroup)?;
        outcome.backup = Some(backup);
        outcome.applied = applied;
    }

    outcome.plan = plan;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anatomy_meta_common::CatalogEntry;
    use serde_json::Value;

    fn catalog() -> Catalog {
        serde_json::from_str(
            r#"[
                {"id": "FMA1", "entry_uid": "FMA1__a", "classification": {"group": "other", "subgroup": "skull"}},
                {"id": "FMA2", "classification": {"group": "muscles"}}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_plan_counts_each_skip_reason() {
        let table = Table::parse(
            "entry_uid,new_group\n\
             FMA1__a,bones\n\
             FMA999,bones\n\
             FMA2,muscles\n\
             FMA2,tendons\n\
             ,bones\n",
        );
        let plan = plan_fixes(&catalog(), &table, &Group::ALL).unwrap();
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].key, "FMA1__a");
        assert_eq!(plan.changes[0].old_group, "other");
        assert_eq!(plan.skipped_not_found, 1);
        assert_eq!(plan.skipped_same_group, 1);
        assert_eq!(plan.skipped_invalid_group, 1);
        assert_eq!(plan.skipped_blank, 1);
        assert_eq!(plan.skipped_total(), 4);
    }

    #[test]
    fn test_lookup_falls_back_to_id() {
        let table = Table::parse("entry_uid,new_group\nFMA1,bones\nFMA2,bones\n");
        let plan = plan_fixes(&catalog(), &table, &Group::ALL).unwrap();
        let positions: Vec<usize> = plan.changes.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 1]);
    }

    #[test]
    fn test_flag_columns() {
        let table = Table::parse("entry_uid,new_group,apply_fix,auto_fix\nFMA1__a,bones,wahr,False\nFMA2,bones,no,True\n");
        let plan = plan_fixes(&catalog(), &table, &Group::ALL).unwrap();
        assert_eq!(plan.flag_column.as_deref(), Some("apply_fix"));
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.skipped_unflagged, 1);

        let table = Table::parse("entry_uid,new_group,auto_fix\nFMA1__a,bones,False\nFMA2,bones,True\n");
        let plan = plan_fixes(&catalog(), &table, &Group::ALL).unwrap();
        assert_eq!(plan.flag_column.as_deref(), Some("auto_fix"));
        assert_eq!(plan.changes[0].key, "FMA2");
    }

    #[test]
    fn test_allowed_set_restricts_groups() {
        let table = Table::parse("entry_uid,new_group\nFMA1__a,bones\n");
        let plan = plan_fixes(&catalog(), &table, &[Group::Muscles]).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.skipped_invalid_group, 1);
    }

    #[test]
    fn test_missing_columns_are_fatal() {
        let table = Table::parse("entry_uid,group\nFMA1,bones\n");
        assert!(plan_fixes(&catalog(), &table, &Group::ALL).is_err());
    }

    #[test]
    fn test_apply_plan_sets_group_and_subgroup() {
        let mut catalog = catalog();
        let table = Table::parse("entry_uid,new_group\nFMA1__a,bones\n");
        let plan = plan_fixes(&catalog, &table, &Group::ALL).unwrap();
        assert_eq!(apply_plan(&mut catalog, &plan, true), 1);

        let entry: &CatalogEntry = &catalog.entries[0];
        assert_eq!(entry.current_group(), "bones");
        assert_eq!(entry.subgroup(), Some(&Value::Null));
        assert_eq!(catalog.entries[1].current_group(), "muscles");
    }
}
