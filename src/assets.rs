//! アセットファイルの存在チェック
//!
//! アセットフォルダ（再帰）にあるファイルと、カタログが参照するファイル名を突き合わせる。

use crate::error::{MetaError, Result};
use anatomy_meta_common::Catalog;
use std::collections::BTreeSet;
use std::path::Path;
use walkdir::WalkDir;

pub const DEFAULT_EXTENSION: &str = "glb";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetCheck {
    /// カタログが参照するファイル名
    pub expected: usize,
    /// フォルダにあるファイル名
    pub found: usize,
    /// フォルダにあるがカタログにない
    pub unreferenced: Vec<String>,
    /// カタログにあるがフォルダにない
    pub missing: Vec<String>,
}

impl AssetCheck {
    pub fn is_clean(&self) -> bool {
        self.unreferenced.is_empty() && self.missing.is_empty()
    }
}

fn has_extension(name: &str, extension: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

/// カタログが参照するファイル名（拡張子がなければ補う）
pub fn expected_files(catalog: &Catalog, extension: &str) -> BTreeSet<String> {
    catalog
        .entries
        .iter()
        .filter_map(|entry| {
            let file = entry.asset_file();
            let name = Path::new(file).file_name()?.to_string_lossy().to_string();
            if has_extension(&name, extension) {
                Some(name)
            } else {
                Some(format!("{}.{}", name, extension))
            }
        })
        .collect()
}

/// フォルダ以下のファイル名を集める
pub fn scan_assets(folder: &Path, extension: &str) -> Result<BTreeSet<String>> {
    if !folder.exists() {
        return Err(MetaError::FolderNotFound(folder.display().to_string()));
    }

    let files = WalkDir::new(folder)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| has_extension(name, extension))
        .collect();
    Ok(files)
}

pub fn check_assets(catalog: &Catalog, folder: &Path, extension: &str) -> Result<AssetCheck> {
    let expected = expected_files(catalog, extension);
    let actual = scan_assets(folder, extension)?;

    Ok(AssetCheck {
        expected: expected.len(),
        found: actual.len(),
        unreferenced: actual.difference(&expected).cloned().collect(),
        missing: expected.difference(&actual).cloned().collect(),
    })
}
