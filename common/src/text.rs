//! 検索テキストの抽出と正規化
//!
//! ラベル・同義語・キーワード・ファイル名・パスから、
//! スコアリング用の小文字・記号なしテキストを作る。

use crate::types::{localized_texts, CatalogEntry};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// テキストを正規化する
///
/// NFKD分解（結合文字は除去）→ 小文字化 → `-`/`_` を空白に →
/// 英数字以外を空白に → 連続空白を1つに
pub fn normalize_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;

    for c in s.nfkd().filter(|c| !is_combining_mark(*c)) {
        for lower in c.to_lowercase() {
            if lower.is_alphanumeric() {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push(lower);
            } else {
                pending_space = true;
            }
        }
    }

    out
}

/// 正規化済みテキスト `hay` に、`phrase` が単語単位で含まれるか
pub fn has_phrase(hay: &str, phrase: &str) -> bool {
    let p = normalize_text(phrase);
    if p.is_empty() {
        return false;
    }
    contains_words(hay, &p)
}

/// 正規化済み同士の単語境界付き包含判定
pub fn contains_words(hay: &str, normalized_phrase: &str) -> bool {
    if normalized_phrase.is_empty() {
        return false;
    }
    format!(" {} ", hay).contains(&format!(" {} ", normalized_phrase))
}

/// パスがグループを指しているか（パス区切りのセグメント一致 or 先頭一致）
pub fn path_matches_group(asset_path: &str, group: &str) -> bool {
    let g = normalize_text(group);
    if g.is_empty() {
        return false;
    }

    let segment_hit = asset_path
        .split(['/', '\\'])
        .map(normalize_text)
        .any(|segment| segment == g);
    if segment_hit {
        return true;
    }

    let p = normalize_text(asset_path);
    format!("{} ", p).starts_with(&format!("{} ", g))
}

/// 1エントリ分の検索テキスト
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchText {
    /// 全フィールドを連結・正規化したテキスト
    pub full: String,
    pub file: String,
    pub path: String,
    pub root: String,
    /// 正規化前のアセットパス（区切り文字の判定用）
    pub raw_path: String,
}

/// エントリから検索テキストを組み立てる
pub fn build_search_text(entry: &CatalogEntry) -> SearchText {
    let mut chunks: Vec<&str> = Vec::new();

    for map in [entry.labels(), entry.synonyms(), entry.keywords()].into_iter().flatten() {
        chunks.extend(localized_texts(map));
    }

    let file = entry.asset_file();
    let path = entry.asset_path();
    let root = entry.root_name();
    chunks.extend([file, path, root, entry.id(), entry.uid().unwrap_or("")]);

    let joined = chunks
        .into_iter()
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    SearchText {
        full: normalize_text(&joined),
        file: normalize_text(file),
        path: normalize_text(path),
        root: normalize_text(root),
        raw_path: path.to_string(),
    }
}
