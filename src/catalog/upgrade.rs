//! スキーマ 1.2 へのアップグレード
//!
//! 既存の値は上書きしない。表示属性・ライセンス・帰属表示を補い、
//! `meta_schema` を "1.2" にする。足りないキーだけを追加し、他のキーには触れない。

use anatomy_meta_common::{Catalog, CatalogEntry};
use serde_json::{json, Map, Value};

pub const META_SCHEMA_VERSION: &str = "1.2";
pub const DEFAULT_COLOR: &str = "#cccccc";
pub const DEFAULT_ATTRIBUTION: &str = "© 2008 DBCLS / BodyParts3D";

const LICENSE_ID: &str = "CC-BY-SA-2.1-JP";
const LICENSE_NAME: &str = "CC BY-SA 2.1 JP";
const LICENSE_URL: &str = "https://creativecommons.org/licenses/by-sa/2.1/jp/";

fn license_object(id: &str) -> Value {
    json!({
        "id": id,
        "name": LICENSE_NAME,
        "url": LICENSE_URL,
    })
}

/// キーがない（または null）ときだけ値を入れる
fn fill(map: &mut Map<String, Value>, key: &str, value: Value) {
    if map.get(key).map(Value::is_null).unwrap_or(true) {
        map.insert(key.to_string(), value);
    }
}

/// 旧形式の `meta` ブロックから値を取り出す
fn legacy_meta<'a>(entry: &'a CatalogEntry, key: &str) -> Option<&'a Value> {
    entry
        .get("meta")
        .and_then(|m| m.get(key))
        .filter(|v| !v.is_null())
}

fn model_value<'a>(entry: &'a CatalogEntry, key: &str) -> Option<&'a Value> {
    entry.model().and_then(|m| m.get(key))
}

/// 1エントリをアップグレードする。実際に変化したら true
pub fn upgrade_entry(entry: &mut CatalogEntry) -> bool {
    let before = entry.clone();

    // 表示属性
    let visible = model_value(entry, "visible_by_default").and_then(Value::as_bool);
    let color = model_value(entry, "default_color")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_COLOR)
        .to_string();

    let display = entry.object_mut("display");
    if let Some(visible) = visible {
        fill(display, "visible_by_default", Value::Bool(visible));
    }
    fill(display, "opacity", json!(1.0));
    fill(display, "default_color", Value::String(color));
    fill(display, "pickable", Value::Bool(true));
    fill(display, "preload", Value::Bool(false));

    // ライセンス
    let has_license = entry
        .get("license")
        .and_then(Value::as_object)
        .map(|l| !l.is_empty())
        .unwrap_or(false);
    if !has_license {
        let code = legacy_meta(entry, "license")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let license = match code {
            Some(code) if !code.contains("2.1") => license_object(code),
            _ => license_object(LICENSE_ID),
        };
        entry.set("license", license);
    }

    // 帰属表示
    if entry.get("attribution").is_none() {
        let attribution = legacy_meta(entry, "attribution")
            .cloned()
            .unwrap_or_else(|| Value::String(DEFAULT_ATTRIBUTION.to_string()));
        entry.set("attribution", attribution);
    }

    if entry.get("meta_schema").and_then(Value::as_str) != Some(META_SCHEMA_VERSION) {
        entry.set("meta_schema", Value::String(META_SCHEMA_VERSION.to_string()));
    }

    *entry != before
}

/// カタログ全体をアップグレードし、変化したエントリ数を返す
pub fn upgrade_catalog(catalog: &mut Catalog) -> usize {
    catalog
        .entries
        .iter_mut()
        .map(upgrade_entry)
        .filter(|changed| *changed)
        .count()
}
