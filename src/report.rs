//! 推定レポート（group_predictions.csv）
//!
//! 全エントリを採点し、1エントリ1行のCSVにする。
//! 確率はメモリ上は 0..1、CSV上は小数1桁のパーセント。

use crate::error::Result;
use crate::scorer::{Prediction, Scorer};
use anatomy_meta_common::table::parse_decimal;
use anatomy_meta_common::{Catalog, CatalogEntry, Error, Group, Record, Table};
use indicatif::{ProgressBar, ProgressStyle};
use std::cmp::Ordering;
use std::path::Path;
use tracing::debug;

pub const PREDICTIONS_FILE: &str = "group_predictions.csv";

/// レポートの列（この順で書き出す）
pub const PREDICTION_COLUMNS: [&str; 11] = [
    "entry_uid",
    "current_group",
    "predicted_group",
    "prob",
    "margin",
    "second_group",
    "second_prob",
    "label_en",
    "file",
    "path",
    "reasons",
];

/// 読み込み時に必須の列
const REQUIRED_COLUMNS: [&str; 5] = ["entry_uid", "current_group", "predicted_group", "prob", "margin"];

/// レポート1行
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRow {
    pub entry_uid: String,
    pub current_group: String,
    pub predicted_group: Group,
    pub prob: f64,
    pub margin: f64,
    pub second_group: Option<Group>,
    pub second_prob: f64,
    pub label_en: String,
    pub file: String,
    pub path: String,
    pub reasons: String,
}

/// 0..1 → "87.5"
pub fn format_percent(value: f64) -> String {
    format!("{:.1}", value * 100.0)
}

/// "87.5" → 0.875
pub fn parse_percent(value: &str) -> Option<f64> {
    parse_decimal(value).map(|v| v / 100.0)
}

/// パーセント列を読む。`optional` なら空欄は0、それ以外の不正値はエラー
fn percent_field(record: &Record<'_>, column: &str, optional: bool) -> Result<f64> {
    let raw = record.get(column).trim();
    if optional && raw.is_empty() {
        return Ok(0.0);
    }
    parse_percent(raw).ok_or_else(|| {
        Error::Table(format!(
            "{} の値が数値ではありません: {:?} (entry_uid: {})",
            column,
            raw,
            record.get("entry_uid").trim()
        ))
        .into()
    })
}

impl PredictionRow {
    pub fn from_prediction(entry: &CatalogEntry, prediction: &Prediction) -> Self {
        Self {
            entry_uid: entry.key().to_string(),
            current_group: entry.current_group().to_string(),
            predicted_group: prediction.predicted,
            prob: prediction.prob,
            margin: prediction.margin,
            second_group: prediction.second,
            second_prob: prediction.second_prob,
            label_en: entry.label_en().to_string(),
            file: entry.asset_file().to_string(),
            path: entry.asset_path().to_string(),
            reasons: prediction.reasons_joined(),
        }
    }

    /// 推定が現在の分類と異なる
    pub fn is_mismatch(&self) -> bool {
        self.predicted_group.as_str() != self.current_group.trim()
    }

    /// PREDICTION_COLUMNS 順の値
    pub fn to_fields(&self) -> Vec<String> {
        vec![
            self.entry_uid.clone(),
            self.current_group.clone(),
            self.predicted_group.to_string(),
            format_percent(self.prob),
            format_percent(self.margin),
            self.second_group.map(|g| g.to_string()).unwrap_or_default(),
            if self.second_group.is_some() {
                format_percent(self.second_prob)
            } else {
                String::new()
            },
            self.label_en.clone(),
            self.file.clone(),
            self.path.clone(),
            self.reasons.clone(),
        ]
    }

    pub fn from_record(record: &Record<'_>) -> Result<Self> {
        let second = record.get("second_group").trim();
        let second_group = if second.is_empty() {
            None
        } else {
            Some(second.parse::<Group>()?)
        };

        Ok(Self {
            entry_uid: record.get("entry_uid").trim().to_string(),
            current_group: record.get("current_group").trim().to_string(),
            predicted_group: record.get("predicted_group").parse::<Group>()?,
            prob: percent_field(record, "prob", false)?,
            margin: percent_field(record, "margin", false)?,
            second_group,
            second_prob: percent_field(record, "second_prob", true)?,
            label_en: record.get("label_en").to_string(),
            file: record.get("file").to_string(),
            path: record.get("path").to_string(),
            reasons: record.get("reasons").to_string(),
        })
    }
}

/// 絞り込み条件
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportFilter {
    pub min_prob: Option<f64>,
    pub min_margin: Option<f64>,
    pub mismatches_only: bool,
}

impl ReportFilter {
    pub fn accepts(&self, row: &PredictionRow) -> bool {
        if self.min_prob.is_some_and(|t| row.prob < t) {
            return false;
        }
        if self.min_margin.is_some_and(|t| row.margin < t) {
            return false;
        }
        !(self.mismatches_only && !row.is_mismatch())
    }

    pub fn apply(&self, rows: Vec<PredictionRow>) -> Vec<PredictionRow> {
        rows.into_iter().filter(|r| self.accepts(r)).collect()
    }
}

/// 確率降順 → マージン降順（同値は元の順序を保つ）
pub fn sort_rows(rows: &mut [PredictionRow]) {
    rows.sort_by(|a, b| {
        b.prob
            .partial_cmp(&a.prob)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.margin.partial_cmp(&a.margin).unwrap_or(Ordering::Equal))
    });
}

/// 全エントリを採点する（カタログ順）
pub fn predict_all(catalog: &Catalog, scorer: &Scorer<'_>, show_progress: bool) -> Vec<PredictionRow> {
    let pb = if show_progress {
        let pb = ProgressBar::new(catalog.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar().template("{msg} [{bar:40.cyan/blue}] {pos}/{len}") {
            pb.set_style(style);
        }
        pb.set_message("採点中");
        pb
    } else {
        ProgressBar::hidden()
    };

    let rows = catalog
        .entries
        .iter()
        .map(|entry| {
            pb.inc(1);
            PredictionRow::from_prediction(entry, &scorer.predict(entry))
        })
        .collect::<Vec<_>>();
    pb.finish_and_clear();

    debug!(rows = rows.len(), "entries scored");
    rows
}

/// 採点 → 絞り込み → 並べ替え
pub fn build_report(catalog: &Catalog, scorer: &Scorer<'_>, filter: &ReportFilter, show_progress: bool) -> Vec<PredictionRow> {
    let mut rows = filter.apply(predict_all(catalog, scorer, show_progress));
    sort_rows(&mut rows);
    rows
}

pub fn rows_to_table(rows: &[PredictionRow]) -> Result<Table> {
    let mut table = Table::new(&PREDICTION_COLUMNS);
    for row in rows {
        table.push_row(row.to_fields())?;
    }
    Ok(table)
}

pub fn rows_from_table(table: &Table) -> Result<Vec<PredictionRow>> {
    table.require("predictions", &REQUIRED_COLUMNS)?;
    let mut rows = Vec::with_capacity(table.len());
    for row in table.map_records(|r| PredictionRow::from_record(&r)) {
        rows.push(row?);
    }
    Ok(rows)
}

pub fn write_report(path: &Path, rows: &[PredictionRow]) -> Result<()> {
    rows_to_table(rows)?.write_file(path)?;
    Ok(())
}

pub fn read_report(path: &Path) -> Result<Vec<PredictionRow>> {
    let table = Table::from_file(path)?;
    rows_from_table(&table)
}
