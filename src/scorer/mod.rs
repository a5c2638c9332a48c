//! グループ推定（Scorer）
//!
//! ## 採点
//! 1. パスがグループを指す → `path_prefix`
//! 2. トリガー語（長い順）: 複数語フレーズ → `phrase`、単語 → `keyword`
//!    一致したフレーズはそのグループの残りの判定から除外する
//! 3. ファイル名・ルート名にグループ名 → `file_hint`（それぞれ1回）
//! 4. 競合語1つごとに `conflict_penalty` を減点
//!
//! スコアをsoftmaxで確率にし、スコア降順 → 優先度昇順 → 列挙順で上位2つを選ぶ。
//! 強制フレーズに一致した場合は確率をそのグループに全振りする。

use crate::error::{MetaError, Result};
use anatomy_meta_common::text::{contains_words, path_matches_group};
use anatomy_meta_common::{build_search_text, normalize_text, CatalogEntry, Group, RuleSet, SearchText};
use std::cmp::Ordering;
use std::path::Path;

/// レポートに載せる理由の最大数
pub const MAX_REASONS: usize = 6;

/// グループごとの採点結果
#[derive(Debug, Clone, PartialEq)]
pub struct GroupScore {
    pub group: Group,
    pub score: f64,
    pub reasons: Vec<String>,
}

/// 1エントリの推定結果
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub predicted: Group,
    pub prob: f64,
    pub second: Option<Group>,
    pub second_prob: f64,
    /// prob - second_prob
    pub margin: f64,
    /// 上位グループの理由（先頭 MAX_REASONS 件）
    pub reasons: Vec<String>,
    /// 一致した強制フレーズのパターン
    pub forced: Option<String>,
    /// グループ → 確率（ルールセットの列挙順）
    pub probabilities: Vec<(Group, f64)>,
}

impl Prediction {
    pub fn reasons_joined(&self) -> String {
        self.reasons.join(";")
    }

    pub fn probability_of(&self, group: Group) -> f64 {
        self.probabilities
            .iter()
            .find(|(g, _)| *g == group)
            .map(|(_, p)| *p)
            .unwrap_or(0.0)
    }
}

/// ルールファイルを読み込む
pub fn load_rules(path: &Path) -> Result<RuleSet> {
    if !path.exists() {
        return Err(MetaError::FileNotFound(format!(
            "{}（anatomy-meta init-rules で作成できます）",
            path.display()
        )));
    }
    RuleSet::from_file(path).map_err(|e| match e {
        anatomy_meta_common::Error::Io(io) => MetaError::Io(io),
        other => MetaError::InvalidRules(format!("{}: {}", path.display(), other)),
    })
}

/// 最大値を引いてから計算するsoftmax
pub fn softmax(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// ルールセットを使った採点器
#[derive(Debug, Clone, Copy)]
pub struct Scorer<'a> {
    rules: &'a RuleSet,
}

impl<'a> Scorer<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &'a RuleSet {
        self.rules
    }

    /// 全グループを採点する（ルールセットの列挙順）
    pub fn score_text(&self, text: &SearchText) -> Vec<GroupScore> {
        let weights = self.rules.weights();
        let mut out = Vec::with_capacity(self.rules.group_count());

        for group in self.rules.groups() {
            let mut score = 0.0;
            let mut reasons = Vec::new();

            if path_matches_group(&text.raw_path, group.as_str()) {
                score += weights.path_prefix;
                reasons.push(format!("+path({})", group));
            }

            let mut remaining = format!(" {} ", text.full);
            for trigger in self.rules.triggers(group) {
                let needle = format!(" {} ", trigger.normalized);
                if !remaining.contains(&needle) {
                    continue;
                }
                if trigger.is_phrase {
                    score += weights.phrase;
                    reasons.push(format!("+phrase({})", trigger.raw));
                    while remaining.contains(&needle) {
                        remaining = remaining.replacen(&needle, " ", 1);
                    }
                } else {
                    score += weights.keyword;
                    reasons.push(format!("+kw({})", trigger.raw));
                }
            }

            let group_words = normalize_text(group.as_str());
            for hint in [&text.file, &text.root] {
                if contains_words(hint, &group_words) {
                    score += weights.file_hint;
                    reasons.push(format!("+filehint({})", group));
                }
            }

            for term in self.rules.conflicts(group) {
                if contains_words(&text.full, term) {
                    score -= weights.conflict_penalty;
                    reasons.push(format!("-conflict({})", term));
                }
            }

            out.push(GroupScore { group, score, reasons });
        }

        out
    }

    /// スコア降順 → 優先度昇順 → 列挙順
    fn rank(&self, a: &GroupScore, b: &GroupScore) -> Ordering {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.rules.priority(a.group).cmp(&self.rules.priority(b.group)))
            .then_with(|| a.group.cmp(&b.group))
    }

    /// 検索テキストから推定する
    pub fn predict_text(&self, text: &SearchText) -> Prediction {
        let scores = self.score_text(text);
        let mut ranked: Vec<&GroupScore> = scores.iter().collect();
        ranked.sort_by(|a, b| self.rank(a, b));

        if let Some(forced) = self.rules.forced_target(&text.full) {
            let target = forced.group;
            let second = ranked.iter().find(|s| s.group != target).map(|s| s.group);

            let mut probabilities: Vec<(Group, f64)> = scores
                .iter()
                .map(|s| (s.group, if s.group == target { 1.0 } else { 0.0 }))
                .collect();
            if !probabilities.iter().any(|(g, _)| *g == target) {
                probabilities.push((target, 1.0));
            }

            let mut reasons = vec![format!("forced({})", forced.pattern)];
            if let Some(own) = scores.iter().find(|s| s.group == target) {
                reasons.extend(own.reasons.iter().cloned());
            }
            reasons.truncate(MAX_REASONS);

            return Prediction {
                predicted: target,
                prob: 1.0,
                second,
                second_prob: 0.0,
                margin: 1.0,
                reasons,
                forced: Some(forced.pattern.clone()),
                probabilities,
            };
        }

        let raw: Vec<f64> = scores.iter().map(|s| s.score).collect();
        let probabilities: Vec<(Group, f64)> = scores
            .iter()
            .map(|s| s.group)
            .zip(softmax(&raw))
            .collect();
        let prob_of = |g: Group| {
            probabilities
                .iter()
                .find(|(pg, _)| *pg == g)
                .map(|(_, p)| *p)
                .unwrap_or(0.0)
        };

        // ルールセットは空にならない
        let top = ranked[0];
        let second = ranked.get(1).map(|s| s.group);
        let prob = prob_of(top.group);
        let second_prob = second.map(prob_of).unwrap_or(0.0);

        let mut reasons = top.reasons.clone();
        reasons.truncate(MAX_REASONS);

        Prediction {
            predicted: top.group,
            prob,
            second,
            second_prob,
            margin: prob - second_prob,
            reasons,
            forced: None,
            probabilities,
        }
    }

    /// カタログエントリから推定する
    pub fn predict(&self, entry: &CatalogEntry) -> Prediction {
        self.predict_text(&build_search_text(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(json: &str) -> CatalogEntry {
        serde_json::from_str(json).unwrap()
    }

    fn rules(json: &str) -> RuleSet {
        RuleSet::from_json(json).unwrap()
    }

    #[test]
    fn test_load_rules_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("rules.json");
        assert!(matches!(load_rules(&missing), Err(MetaError::FileNotFound(_))));

        std::fs::write(&missing, r#"{"groups": {"tendons": ["tendon"]}}"#).unwrap();
        assert!(matches!(load_rules(&missing), Err(MetaError::InvalidRules(_))));
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let p = softmax(&[0.6, 0.3, -0.4, 0.0]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(p[0] > p[1] && p[1] > p[3] && p[3] > p[2]);

        // 大きな値でもオーバーフローしない
        let big = softmax(&[1000.0, 999.0]);
        assert!(big.iter().all(|x| x.is_finite()));
        assert!(softmax(&[]).is_empty());
    }

    #[test]
    fn test_builtin_bronchial_forms_are_lungs() {
        let rules = RuleSet::builtin();
        let scorer = Scorer::new(&rules);
        for label in ["Right bronchiole", "Main bronchi", "Left bronchus"] {
            let e = entry(&format!(r#"{{"id": "FMA1", "labels": {{"en": "{}"}}}}"#, label));
            let p = scorer.predict(&e);
            assert_eq!(p.predicted, Group::Lungs, "{}", label);
            assert!(p.forced.is_none());
        }
    }

    #[test]
    fn test_keyword_and_phrase_weights() {
        let rules = rules(
            r#"{"groups": {"bones": ["bone", "frontal bone"], "muscles": ["muscle"]}, "forced_phrases": []}"#,
        );
        let scorer = Scorer::new(&rules);
        let scores = scorer.score_text(&build_search_text(&entry(
            r#"{"id": "FMA1", "labels": {"en": "Frontal bone"}}"#,
        )));

        let bones = scores.iter().find(|s| s.group == Group::Bones).unwrap();
        // フレーズに使われた "bone" はキーワードとして数えない
        assert!((bones.score - 0.5).abs() < 1e-9);
        assert_eq!(bones.reasons, vec!["+phrase(frontal bone)"]);

        let muscles = scores.iter().find(|s| s.group == Group::Muscles).unwrap();
        assert_eq!(muscles.score, 0.0);
    }

    #[test]
    fn test_keyword_outside_phrase_still_counts() {
        let rules = rules(r#"{"groups": {"bones": ["bone", "frontal bone"]}, "forced_phrases": []}"#);
        let scorer = Scorer::new(&rules);
        let scores = scorer.score_text(&build_search_text(&entry(
            r#"{"id": "x", "labels": {"en": "Frontal bone", "de": "bone"}}"#,
        )));
        assert!((scores[0].score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_path_file_hint_and_conflict() {
        let rules = rules(
            r#"{"groups": {"teeth": ["molar"], "bones": ["bone"]},
                "conflicting_terms": {"bones": ["molar"]}, "forced_phrases": []}"#,
        );
        let scorer = Scorer::new(&rules);
        let text = build_search_text(&entry(
            r#"{"id": "x", "labels": {"en": "Molar bone"},
                "model": {"asset": {"file": "teeth_01.glb", "path": "hifi/teeth"}, "root_name": "teeth"}}"#,
        ));
        let scores = scorer.score_text(&text);

        let teeth = scores.iter().find(|s| s.group == Group::Teeth).unwrap();
        // path 0.6 + kw 0.3 + filehint 0.1 x2
        assert!((teeth.score - 1.1).abs() < 1e-9);
        assert_eq!(teeth.reasons[0], "+path(teeth)");

        let bones = scores.iter().find(|s| s.group == Group::Bones).unwrap();
        assert!((bones.score - (0.3 - 0.4)).abs() < 1e-9);
        assert!(bones.reasons.contains(&"-conflict(molar)".to_string()));
    }

    #[test]
    fn test_prediction_probabilities_and_margin() {
        let rules = rules(r#"{"groups": {"bones": ["bone"], "muscles": ["muscle"], "nerves": ["nerve"]}, "forced_phrases": []}"#);
        let prediction = Scorer::new(&rules).predict(&entry(r#"{"id": "x", "labels": {"en": "bone"}}"#));

        assert_eq!(prediction.predicted, Group::Bones);
        let total: f64 = prediction.probabilities.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!((prediction.margin - (prediction.prob - prediction.second_prob)).abs() < 1e-12);
        assert!(prediction.margin > 0.0);
        assert!(prediction.forced.is_none());
    }

    #[test]
    fn test_tie_broken_by_priority_then_enum_order() {
        let rules = rules(
            r#"{"group_priority": {"muscles": 1, "bones": 2},
                "groups": {"bones": ["bone"], "muscles": ["muscle"], "nerves": ["nerve"]}, "forced_phrases": []}"#,
        );
        let prediction = Scorer::new(&rules).predict(&entry(r#"{"id": "x"}"#));
        // 全て0点 → 優先度の小さい muscles、次に bones
        assert_eq!(prediction.predicted, Group::Muscles);
        assert_eq!(prediction.second, Some(Group::Bones));
        assert_eq!(prediction.margin, 0.0);

        let no_priority = RuleSet::from_json(r#"{"groups": {"bones": ["bone"], "nerves": ["nerve"]}, "forced_phrases": []}"#).unwrap();
        let prediction = Scorer::new(&no_priority).predict(&entry(r#"{"id": "x"}"#));
        assert_eq!(prediction.predicted, Group::Nerves);
    }

    #[test]
    fn test_single_group_has_no_second() {
        let rules = rules(r#"{"groups": {"bones": ["bone"]}, "forced_phrases": []}"#);
        let prediction = Scorer::new(&rules).predict(&entry(r#"{"id": "x"}"#));
        assert_eq!(prediction.second, None);
        assert_eq!(prediction.prob, 1.0);
        assert_eq!(prediction.margin, 1.0);
    }

    #[test]
    fn test_forced_phrase_overrides_scores() {
        // キーワード上は muscles が圧勝するが、強制フレーズが勝つ
        let rules = rules(
            r#"{"groups": {"bones": ["bone"], "muscles": ["muscle", "intercostal", "levator", "frontal"]}}"#,
        );
        let prediction = Scorer::new(&rules).predict(&entry(
            r#"{"id": "x", "labels": {"en": "Frontal bone"}, "synonyms": {"en": ["levator intercostal muscle frontal"]}}"#,
        ));
        // "intercostal muscle" が先に並んでいる
        assert_eq!(prediction.predicted, Group::Muscles);

        let prediction = Scorer::new(&rules).predict(&entry(
            r#"{"id": "x", "labels": {"en": "Frontal bone"}, "synonyms": {"en": ["levator muscle frontal"]}}"#,
        ));
        assert_eq!(prediction.predicted, Group::Bones);
        assert_eq!(prediction.prob, 1.0);
        assert_eq!(prediction.second, Some(Group::Muscles));
        assert_eq!(prediction.second_prob, 0.0);
        assert_eq!(prediction.margin, 1.0);
        assert_eq!(prediction.reasons[0], r"forced(\bfrontal bone\b)");
        assert_eq!(prediction.probability_of(Group::Muscles), 0.0);
        let total: f64 = prediction.probabilities.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_forced_target_outside_rule_groups() {
        let rules = rules(r#"{"groups": {"muscles": ["muscle"]}}"#);
        let prediction = Scorer::new(&rules).predict(&entry(r#"{"id": "x", "labels": {"en": "Rib 3"}}"#));
        assert_eq!(prediction.predicted, Group::Bones);
        assert_eq!(prediction.second, Some(Group::Muscles));
        assert_eq!(prediction.probability_of(Group::Bones), 1.0);
    }

    #[test]
    fn test_deterministic() {
        let rules = RuleSet::builtin();
        let e = entry(r#"{"id": "FMA1", "labels": {"en": "Left lung"}, "model": {"asset": {"path": "lungs"}}}"#);
        let scorer = Scorer::new(&rules);
        assert_eq!(scorer.predict(&e), scorer.predict(&e));
        assert_eq!(scorer.predict(&e).predicted, Group::Lungs);
    }

    #[test]
    fn test_reasons_truncated() {
        let rules = rules(r#"{"groups": {"bones": ["a", "b", "c", "d", "e", "f", "g", "h"]}, "forced_phrases": []}"#);
        let prediction = Scorer::new(&rules).predict(&entry(r#"{"id": "x", "labels": {"en": "a b c d e f g h"}}"#));
        assert_eq!(prediction.reasons.len(), MAX_REASONS);
        assert_eq!(prediction.reasons_joined().matches(';').count(), MAX_REASONS - 1);
    }
}
