//! 修正候補の生成
//!
//! 推定と現在分類が異なる行だけを対象に、
//! 1. 英語ラベルが強制フレーズに一致 → そのグループ（phrase）
//! 2. 確率・マージンが閾値以上 → 推定グループ（scores）
//! 3. それ以外 → 提案なし
//!
//! 閾値は絶対値（0..1）か、不一致行の分位点で指定する。

use super::{FixReason, FixRow};
use super::confusion::ConfusionMatrix;
use crate::report::PredictionRow;
use anatomy_meta_common::rules::match_forced;
use anatomy_meta_common::{normalize_text, ForcedPhrase, Group};
use std::cmp::Ordering;
use std::collections::HashMap;

/// 既定の分位点
pub const DEFAULT_PROB_QUANTILE: f64 = 0.80;
pub const DEFAULT_MARGIN_QUANTILE: f64 = 0.70;

/// 閾値の指定方法
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Threshold {
    /// 絶対値（0..1）
    Absolute(f64),
    /// 不一致行の分位点（0..1）
    Quantile(f64),
}

impl Threshold {
    /// 絶対値が指定されていればそれを、なければ分位点を使う
    pub fn from_args(absolute: Option<f64>, quantile: f64) -> Self {
        match absolute {
            Some(v) => Threshold::Absolute(v),
            None => Threshold::Quantile(quantile),
        }
    }

    fn resolve(&self, values: &[f64]) -> Option<f64> {
        match *self {
            Threshold::Absolute(v) => Some(v),
            Threshold::Quantile(q) => quantile(values, q),
        }
    }
}

impl std::fmt::Display for Threshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Threshold::Absolute(v) => write!(f, "≥{:.3}", v),
            Threshold::Quantile(q) => write!(f, "Q{:.2}", q),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixThresholds {
    pub prob: Threshold,
    pub margin: Threshold,
}

impl Default for FixThresholds {
    fn default() -> Self {
        Self {
            prob: Threshold::Quantile(DEFAULT_PROB_QUANTILE),
            margin: Threshold::Quantile(DEFAULT_MARGIN_QUANTILE),
        }
    }
}

/// 実際に使った閾値（不一致行がなければ None）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResolvedThresholds {
    pub min_prob: Option<f64>,
    pub min_margin: Option<f64>,
}

/// 線形補間の分位点（NaNは無視）
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// 候補生成の結果
#[derive(Debug, Clone, Default)]
pub struct FixBuild {
    /// 不一致行の数
    pub mismatches: usize,
    /// 提案できなかった不一致行の数
    pub unresolved: usize,
    pub thresholds: ResolvedThresholds,
    pub candidates: Vec<FixRow>,
    pub auto: Vec<FixRow>,
    pub confusion: ConfusionMatrix,
}

impl FixBuild {
    /// (現在 → 新) の組み合わせ上位
    pub fn top_pairs(&self, limit: usize) -> Vec<(String, Group, usize)> {
        let mut counts: HashMap<(&str, Group), usize> = HashMap::new();
        for row in &self.candidates {
            *counts.entry((row.current_group.as_str(), row.new_group)).or_insert(0) += 1;
        }

        let mut pairs: Vec<(String, Group, usize)> = counts
            .into_iter()
            .map(|((current, new), count)| (current.to_string(), new, count))
            .collect();
        pairs.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)).then_with(|| a.1.cmp(&b.1)));
        pairs.truncate(limit);
        pairs
    }
}

/// 英語ラベルから強制フレーズの対象グループを求める
pub fn phrase_target(forced: &[ForcedPhrase], label_en: &str) -> Option<Group> {
    match_forced(forced, &normalize_text(label_en)).map(|p| p.group)
}

/// 推定レポートから修正候補を作る
pub fn build_fixes(rows: &[PredictionRow], thresholds: &FixThresholds, forced: &[ForcedPhrase]) -> FixBuild {
    let mismatches: Vec<&PredictionRow> = rows.iter().filter(|r| r.is_mismatch()).collect();

    let probs: Vec<f64> = mismatches.iter().map(|r| r.prob).collect();
    let margins: Vec<f64> = mismatches.iter().map(|r| r.margin).collect();
    let resolved = if mismatches.is_empty() {
        ResolvedThresholds::default()
    } else {
        ResolvedThresholds {
            min_prob: thresholds.prob.resolve(&probs),
            min_margin: thresholds.margin.resolve(&margins),
        }
    };

    let mut candidates = Vec::new();
    let mut unresolved = 0;

    for row in &mismatches {
        let meets_scores = match (resolved.min_prob, resolved.min_margin) {
            (Some(p), Some(m)) => row.prob >= p && row.margin >= m,
            _ => false,
        };

        let proposal = match phrase_target(forced, &row.label_en) {
            Some(target) => Some((target, FixReason::Phrase)),
            None if meets_scores => Some((row.predicted_group, FixReason::Scores)),
            None => None,
        };

        let Some((new_group, fix_reason)) = proposal else {
            unresolved += 1;
            continue;
        };
        if new_group.as_str() == row.current_group.trim() {
            continue;
        }

        candidates.push(FixRow {
            entry_uid: row.entry_uid.clone(),
            current_group: row.current_group.clone(),
            predicted_group: row.predicted_group,
            new_group,
            fix_reason,
            prob: row.prob,
            margin: row.margin,
            label_en: row.label_en.clone(),
            file: row.file.clone(),
            path: row.path.clone(),
            reasons: row.reasons.clone(),
            auto_fix: true,
        });
    }

    // 自動適用 → 確率 → マージン → ラベル
    candidates.sort_by(|a, b| {
        b.auto_fix
            .cmp(&a.auto_fix)
            .then_with(|| b.prob.partial_cmp(&a.prob).unwrap_or(Ordering::Equal))
            .then_with(|| b.margin.partial_cmp(&a.margin).unwrap_or(Ordering::Equal))
            .then_with(|| a.label_en.cmp(&b.label_en))
    });

    let auto = candidates.iter().filter(|c| c.auto_fix).cloned().collect();

    FixBuild {
        mismatches: mismatches.len(),
        unresolved,
        thresholds: resolved,
        candidates,
        auto,
        confusion: ConfusionMatrix::from_rows(rows),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anatomy_meta_common::rules::builtin_forced_phrases;

    fn row(uid: &str, current: &str, predicted: Group, prob: f64, margin: f64, label: &str) -> PredictionRow {
        PredictionRow {
            entry_uid: uid.into(),
            current_group: current.into(),
            predicted_group: predicted,
            prob,
            margin,
            second_group: None,
            second_prob: 0.0,
            label_en: label.into(),
            file: String::new(),
            path: String::new(),
            reasons: String::new(),
        }
    }

    #[test]
    fn test_quantile_linear_interpolation() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&values, 0.0), Some(1.0));
        assert_eq!(quantile(&values, 1.0), Some(4.0));
        assert_eq!(quantile(&values, 0.5), Some(2.5));
        let q = quantile(&values, 0.8).unwrap();
        assert!((q - 3.4).abs() < 1e-9);
        assert_eq!(quantile(&[f64::NAN, 5.0], 0.5), Some(5.0));
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn test_phrase_fix_for_frontal_bone() {
        let rows = vec![row("FMA1", "other", Group::Bones, 0.3, 0.05, "Frontal bone")];
        let build = build_fixes(&rows, &FixThresholds::default(), builtin_forced_phrases());

        assert_eq!(build.mismatches, 1);
        assert_eq!(build.auto.len(), 1);
        let fix = &build.auto[0];
        assert_eq!(fix.new_group, Group::Bones);
        assert_eq!(fix.fix_reason, FixReason::Phrase);
        assert!(fix.auto_fix);
    }

    #[test]
    fn test_phrase_overrides_prediction() {
        // 推定は muscles だがラベルに "intervertebral disc"
        let rows = vec![row("x", "bones", Group::Muscles, 0.9, 0.9, "Lumbar intervertebral disc")];
        let build = build_fixes(&rows, &FixThresholds::default(), builtin_forced_phrases());
        assert_eq!(build.candidates[0].new_group, Group::Cartilage);
    }

    #[test]
    fn test_score_thresholds() {
        let rows = vec![
            row("a", "other", Group::Bones, 0.90, 0.60, "thing a"),
            row("b", "other", Group::Muscles, 0.50, 0.10, "thing b"),
            row("c", "other", Group::Nerves, 0.95, 0.05, "thing c"),
            row("ok", "bones", Group::Bones, 0.99, 0.99, "matching"),
        ];
        let thresholds = FixThresholds {
            prob: Threshold::Absolute(0.8),
            margin: Threshold::Absolute(0.5),
        };
        let build = build_fixes(&rows, &thresholds, &[]);
        assert_eq!(build.mismatches, 3);
        assert_eq!(build.unresolved, 2);
        assert_eq!(build.candidates.len(), 1);
        assert_eq!(build.candidates[0].entry_uid, "a");
        assert_eq!(build.candidates[0].fix_reason, FixReason::Scores);
        assert_eq!(build.thresholds.min_prob, Some(0.8));
        // 混同行列は一致行も含む
        assert_eq!(build.confusion.total(), 4);
    }

    #[test]
    fn test_quantile_thresholds_from_mismatches() {
        let rows: Vec<PredictionRow> = (0..5)
            .map(|i| row(&format!("r{}", i), "other", Group::Bones, 0.5 + 0.1 * i as f64, 0.1 * i as f64, "x"))
            .collect();
        let build = build_fixes(&rows, &FixThresholds::default(), &[]);
        let min_prob = build.thresholds.min_prob.unwrap();
        assert!((min_prob - 0.82).abs() < 1e-9);
        // prob ≥ 0.82 は r4 のみ
        assert_eq!(build.candidates.len(), 1);
        assert_eq!(build.candidates[0].entry_uid, "r4");
    }

    #[test]
    fn test_never_proposes_current_group() {
        // 強制フレーズの対象が現在分類と同じなら提案しない
        let rows = vec![row("x", "bones", Group::Muscles, 0.99, 0.99, "Frontal bone")];
        let build = build_fixes(&rows, &FixThresholds::default(), builtin_forced_phrases());
        assert!(build.candidates.is_empty());
        assert!(build
            .candidates
            .iter()
            .all(|c| c.new_group.as_str() != c.current_group));
    }

    #[test]
    fn test_no_mismatches() {
        let rows = vec![row("x", "bones", Group::Bones, 0.9, 0.9, "Rib")];
        let build = build_fixes(&rows, &FixThresholds::default(), builtin_forced_phrases());
        assert_eq!(build.mismatches, 0);
        assert!(build.candidates.is_empty());
        assert_eq!(build.thresholds, ResolvedThresholds::default());
        assert_eq!(build.confusion.count("bones", "bones"), 1);
    }

    #[test]
    fn test_sort_order_and_top_pairs() {
        let rows = vec![
            row("a", "other", Group::Bones, 0.9, 0.5, "b label"),
            row("b", "other", Group::Bones, 0.9, 0.5, "a label"),
            row("c", "muscles", Group::Bones, 0.95, 0.7, "c label"),
        ];
        let thresholds = FixThresholds {
            prob: Threshold::Absolute(0.0),
            margin: Threshold::Absolute(0.0),
        };
        let build = build_fixes(&rows, &thresholds, &[]);
        let uids: Vec<&str> = build.candidates.iter().map(|c| c.entry_uid.as_str()).collect();
        assert_eq!(uids, vec!["c", "b", "a"]);

        let pairs = build.top_pairs(10);
        assert_eq!(pairs[0], ("other".to_string(), Group::Bones, 2));
        assert_eq!(pairs[1], ("muscles".to_string(), Group::Bones, 1));
    }
}
