//! カタログファイルの入出力
//!
//! 書き込みは必ず「バックアップ → 一時ファイル → rename」の順。
//! バックアップに失敗した場合は本体に触れない。

use crate::error::{MetaError, Result};
use anatomy_meta_common::Catalog;
use serde_json::Value;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// バックアップファイル名のタイムスタンプ形式
const BACKUP_STAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// カタログを読み込む
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    if !path.exists() {
        return Err(MetaError::FileNotFound(path.display().to_string()));
    }

    let content = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content)?;
    if !value.is_array() {
        return Err(MetaError::InvalidCatalog(format!(
            "{}: トップレベルがJSON配列ではありません",
            path.display()
        )));
    }

    let catalog: Catalog = serde_json::from_value(value)
        .map_err(|e| MetaError::InvalidCatalog(format!("{}: {}", path.display(), e)))?;
    debug!(path = %path.display(), entries = catalog.len(), "catalog loaded");
    Ok(catalog)
}

/// カタログのJSON表現（2スペース整形 + 末尾改行）
pub fn catalog_to_string(catalog: &Catalog) -> Result<String> {
    let mut json = serde_json::to_string_pretty(catalog)?;
    json.push('\n');
    Ok(json)
}

/// `<name>.<timestamp>.bak` 形式のバックアップパス（既存なら連番を付ける）
pub fn backup_path_for(path: &Path, stamp: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "meta.json".to_string());

    let candidate = path.with_file_name(format!("{}.{}.bak", name, stamp));
    if !candidate.exists() {
        return candidate;
    }

    let mut n = 1;
    loop {
        let candidate = path.with_file_name(format!("{}.{}-{}.bak", name, stamp, n));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// 現在のファイルをバイト単位でコピーしてバックアップを作る
pub fn backup_catalog(path: &Path) -> Result<PathBuf> {
    let stamp = chrono::Local::now().format(BACKUP_STAMP_FORMAT).to_string();
    let backup = backup_path_for(path, &stamp);

    fs::copy(path, &backup)
        .map_err(|e| MetaError::Backup(format!("{} → {}: {}", path.display(), backup.display(), e)))?;
    debug!(backup = %backup.display(), "backup created");
    Ok(backup)
}

/// 一時ファイルに書いてから rename で置き換える
pub fn write_catalog_atomic(path: &Path, catalog: &Catalog) -> Result<()> {
    let json = catalog_to_string(catalog)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "meta.json".to_string());
    let temp_path = path.with_file_name(format!(".{}.{}.tmp", name, std::process::id()));

    let written = (|| -> std::io::Result<()> {
        let mut file = File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(e) = written.and_then(|_| fs::rename(&temp_path, path)) {
        if temp_path.exists() {
            if let Err(cleanup) = fs::remove_file(&temp_path) {
                warn!(path = %temp_path.display(), error = %cleanup, "failed to remove temp file");
            }
        }
        return Err(e.into());
    }

    Ok(())
}

/// バックアップを作成してから書き込む。戻り値はバックアップのパス
pub fn save_with_backup(path: &Path, catalog: &Catalog) -> Result<PathBuf> {
    let backup = backup_catalog(path)?;
    write_catalog_atomic(path, catalog)?;
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"[
  {
    "id": "FMA1",
    "labels": {"en": "Frontal bone"},
    "classification": {"group": "other"}
  }
]
"#;

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = load_catalog(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, MetaError::FileNotFound(_)));
    }

    #[test]
    fn test_load_rejects_object() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.json");
        fs::write(&path, r#"{"id": "FMA1"}"#).unwrap();
        assert!(matches!(load_catalog(&path), Err(MetaError::InvalidCatalog(_))));
    }

    #[test]
    fn test_backup_path_gets_suffix_on_collision() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.json");
        let first = backup_path_for(&path, "2025-01-02T03-04-05");
        assert_eq!(first.file_name().unwrap(), "meta.json.2025-01-02T03-04-05.bak");

        fs::write(&first, "x").unwrap();
        let second = backup_path_for(&path, "2025-01-02T03-04-05");
        assert_eq!(second.file_name().unwrap(), "meta.json.2025-01-02T03-04-05-1.bak");
    }

    #[test]
    fn test_backup_of_missing_file_fails() {
        let dir = tempdir().unwrap();
        let err = backup_catalog(&dir.path().join("meta.json")).unwrap_err();
        assert!(matches!(err, MetaError::Backup(_)));
    }

    #[test]
    fn test_save_with_backup_keeps_original_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.json");
        fs::write(&path, SAMPLE).unwrap();

        let mut catalog = load_catalog(&path).unwrap();
        catalog.entries[0].set_group(anatomy_meta_common::Group::Bones, false);

        let backup = save_with_backup(&path, &catalog).unwrap();
        assert_eq!(fs::read_to_string(&backup).unwrap(), SAMPLE);

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.ends_with("]\n"));
        assert!(written.contains("\"group\": \"bones\""));
        // 一時ファイルは残らない
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_non_ascii_written_verbatim() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.json");
        let json = r#"[{"id": "FMA1", "labels": {"ja": "前頭骨"}, "attribution": "© 2008 DBCLS"}]"#;
        fs::write(&path, json).unwrap();

        let catalog = load_catalog(&path).unwrap();
        write_catalog_atomic(&path, &catalog).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("前頭骨"));
        assert!(written.contains("© 2008 DBCLS"));
    }
}
