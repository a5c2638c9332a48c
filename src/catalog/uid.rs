//! entry_uid の付与とキー検証
//!
//! - entry_uid 重複・ファイルキー重複 → エラー（書き込み不可）
//! - id 重複、uid/ファイルキー/path/url の欠落 → 警告

use crate::error::{MetaError, Result};
use anatomy_meta_common::Catalog;
use std::collections::HashMap;

/// 重複idの表示件数
const DUPLICATE_ID_TOP: usize = 10;

/// uid未設定のエントリに `{id}__{fileKey}` を付与する。付与した件数を返す
pub fn assign_uids(catalog: &mut Catalog) -> usize {
    let mut assigned = 0;
    for entry in &mut catalog.entries {
        if entry.uid().is_none() {
            let uid = entry.make_uid();
            entry.set_uid(&uid);
            assigned += 1;
        }
    }
    assigned
}

/// キー検証の結果
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// (id, 件数) 件数の多い順、上位のみ
    pub duplicate_ids: Vec<(String, usize)>,
    /// 重複しているidの種類数
    pub duplicate_id_count: usize,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// エラーがあれば `MetaError::Validation` に変換
    pub fn into_result(self) -> Result<Self> {
        if self.errors.is_empty() {
            Ok(self)
        } else {
            Err(MetaError::Validation(self.errors))
        }
    }
}

/// カタログのキー整合性を検証する
pub fn validate_keys(catalog: &Catalog) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut seen_uid: HashMap<&str, &str> = HashMap::new();
    let mut seen_file_key: HashMap<&str, &str> = HashMap::new();
    let mut id_counts: HashMap<&str, usize> = HashMap::new();

    for entry in &catalog.entries {
        let id = entry.id();
        *id_counts.entry(id).or_insert(0) += 1;

        match entry.asset() {
            Some(_) => {
                for field in ["path", "url"] {
                    if entry.asset_str(field).map(str::trim).unwrap_or("").is_empty() {
                        report.warnings.push(format!("{}: model.asset.{} がありません", id, field));
                    }
                }
            }
            None => report.warnings.push(format!("{}: model.asset がありません", id)),
        }

        match entry.file_key() {
            Some(key) => {
                if let Some(first) = seen_file_key.get(key) {
                    report.errors.push(format!(
                        "ファイルキー重複: {} (ids: {} & {})",
                        key, first, id
                    ));
                } else {
                    seen_file_key.insert(key, id);
                }
            }
            None => report.warnings.push(format!("{}: ファイルキーがありません", id)),
        }

        match entry.uid() {
            Some(uid) => {
                if let Some(first) = seen_uid.get(uid) {
                    report.errors.push(format!("entry_uid 重複: {} (ids: {} & {})", uid, first, id));
                } else {
                    seen_uid.insert(uid, id);
                }
            }
            None => report.warnings.push(format!("{}: entry_uid がありません", id)),
        }
    }

    let mut duplicates: Vec<(String, usize)> = id_counts
        .into_iter()
        .filter(|(id, count)| *count > 1 && !id.is_empty())
        .map(|(id, count)| (id.to_string(), count))
        .collect();
    duplicates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    report.duplicate_id_count = duplicates.len();
    if !duplicates.is_empty() {
        report.warnings.push(format!(
            "id 重複: {} 種類のidが複数レコードを持っています",
            duplicates.len()
        ));
    }
    duplicates.truncate(DUPLICATE_ID_TOP);
    report.duplicate_ids = duplicates;

    report
}
