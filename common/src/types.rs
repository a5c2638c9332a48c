//! カタログ（meta.json）の型定義
//!
//! - CatalogEntry: 1つの3Dアセットのメタデータ（JSONオブジェクトそのもの）
//! - Catalog: エントリの順序付き配列（JSON配列そのもの）
//!
//! エントリは読み込んだオブジェクトをそのまま保持し、値はアクセサで読む。
//! 書き換えは対象のキーだけをその場で行うため、キー順・未知のフィールド・数値表現は変わらない。

use crate::group::Group;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// カタログエントリ
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogEntry {
    fields: Map<String, Value>,
}

/// 言語マップの値（文字列 or 文字列配列）を平坦化
pub fn localized_texts(map: &Map<String, Value>) -> Vec<&str> {
    let mut out = Vec::new();
    for value in map.values() {
        match value {
            Value::String(s) => out.push(s.as_str()),
            Value::Array(items) => out.extend(items.iter().filter_map(Value::as_str)),
            _ => {}
        }
    }
    out
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

/// オブジェクト値のキーを取り出し、なければ空オブジェクトを置く
fn object_entry<'a>(map: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let slot = map.entry(key.to_string()).or_insert(Value::Null);
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(obj) => obj,
        _ => unreachable!("{} は直前にオブジェクトにしている", key),
    }
}

impl CatalogEntry {
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    fn object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.get(key).and_then(Value::as_object)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// トップレベルのオブジェクト値（なければ作る）
    pub fn object_mut(&mut self, key: &str) -> &mut Map<String, Value> {
        object_entry(&mut self.fields, key)
    }

    /// キーを設定する。既存のキーは位置を保ったまま値だけ置き換える
    pub fn set(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_string(), value);
    }

    /// FMA等の識別子（重複はあり得る）。なければ空文字
    pub fn id(&self) -> &str {
        self.str_field("id").unwrap_or("")
    }

    /// 言語 → ラベル
    pub fn labels(&self) -> Option<&Map<String, Value>> {
        self.object("labels")
    }

    /// 言語 → 同義語リスト
    pub fn synonyms(&self) -> Option<&Map<String, Value>> {
        self.object("synonyms")
    }

    /// `info.keywords`（言語 → キーワードリスト）
    pub fn keywords(&self) -> Option<&Map<String, Value>> {
        self.object("info")
            .and_then(|info| info.get("keywords"))
            .and_then(Value::as_object)
    }

    pub fn label(&self, lang: &str) -> Option<&str> {
        self.labels().and_then(|l| l.get(lang)).and_then(Value::as_str)
    }

    /// 英語ラベル（なければ空文字）
    pub fn label_en(&self) -> &str {
        self.label("en").unwrap_or("")
    }

    pub fn classification(&self) -> Option<&Map<String, Value>> {
        self.object("classification")
    }

    /// 現在のグループ（未分類なら空文字）
    pub fn current_group(&self) -> &str {
        self.classification()
            .and_then(|c| c.get("group"))
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// `classification.subgroup`（明示的な null も含む）
    pub fn subgroup(&self) -> Option<&Value> {
        self.classification().and_then(|c| c.get("subgroup"))
    }

    pub fn model(&self) -> Option<&Map<String, Value>> {
        self.object("model")
    }

    /// `model.asset`
    pub fn asset(&self) -> Option<&Map<String, Value>> {
        self.model()
            .and_then(|m| m.get("asset"))
            .and_then(Value::as_object)
    }

    /// `model.asset.<key>` の文字列値
    pub fn asset_str(&self, key: &str) -> Option<&str> {
        self.asset().and_then(|a| a.get(key)).and_then(Value::as_str)
    }

    /// ファイルキー（fileKey → file の順）
    pub fn file_key(&self) -> Option<&str> {
        non_empty(self.asset_str("fileKey")).or_else(|| non_empty(self.asset_str("file")))
    }

    /// アセットのファイル名（file → fileKey の順）
    pub fn asset_file(&self) -> &str {
        non_empty(self.asset_str("file"))
            .or_else(|| non_empty(self.asset_str("fileKey")))
            .unwrap_or("")
    }

    pub fn asset_path(&self) -> &str {
        self.asset_str("path").unwrap_or("")
    }

    pub fn root_name(&self) -> &str {
        self.model()
            .and_then(|m| m.get("root_name"))
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn uid(&self) -> Option<&str> {
        non_empty(self.str_field("entry_uid"))
    }

    pub fn set_uid(&mut self, uid: &str) {
        self.set("entry_uid", Value::String(uid.to_string()));
    }

    /// Fix表・レポートで使う参照キー（uid、未設定ならid）
    pub fn key(&self) -> &str {
        self.uid().unwrap_or(self.id())
    }

    /// `{id}__{fileKey}` 形式のuidを生成
    pub fn make_uid(&self) -> String {
        let id = if self.id().is_empty() { "unknown" } else { self.id() };
        format!("{}__{}", id, self.file_key().unwrap_or(""))
    }

    /// グループを書き換える（classification 以外には触れない）
    pub fn set_group(&mut self, group: Group, null_subgroup: bool) {
        let classification = self.object_mut("classification");
        classification.insert("group".to_string(), Value::String(group.as_str().to_string()));
        if null_subgroup {
            classification.insert("subgroup".to_string(), Value::Null);
        }
    }
}

/// カタログ全体
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    pub entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 参照キー → 配列位置。uidを優先し、次にid（最初の一致）で引く
    pub fn key_index(&self) -> KeyIndex {
        let mut by_uid = HashMap::new();
        let mut by_id = HashMap::new();
        for (pos, entry) in self.entries.iter().enumerate() {
            if let Some(uid) = entry.uid() {
                by_uid.entry(uid.to_string()).or_insert(pos);
            }
            if !entry.id().is_empty() {
                by_id.entry(entry.id().to_string()).or_insert(pos);
            }
        }
        KeyIndex { by_uid, by_id }
    }
}

/// エントリ検索用インデックス
#[derive(Debug, Clone, Default)]
pub struct KeyIndex {
    by_uid: HashMap<String, usize>,
    by_id: HashMap<String, usize>,
}

impl KeyIndex {
    pub fn resolve(&self, key: &str) -> Option<usize> {
        self.by_uid
            .get(key)
            .or_else(|| self.by_id.get(key))
            .copied()
    }
}
