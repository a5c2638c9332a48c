//! 分類ルール（Rule Store）
//!
//! `group_rules.json` の読み込みと、スコアリング用に前処理したルールセット。
//!
//! ```json
//! {
//!   "group_priority": {"bones": 4, "muscles": 2},
//!   "groups": {"bones": ["bone", "frontal bone"]},
//!   "conflicting_terms": {"bones": ["ligament"]},
//!   "weights": {"phrase": 0.5},
//!   "forced_phrases": [{"pattern": "\\bfrontal bone\\b", "group": "bones"}]
//! }
//! ```
//!
//! `weights` と `forced_phrases` は省略可能。省略時は組み込み値を使う。

use crate::error::{Error, Result};
use crate::group::Group;
use crate::text::normalize_text;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// 優先度未設定のグループの値
pub const DEFAULT_PRIORITY: i32 = 999;

/// スコアの重み
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    /// パスがグループを指している
    pub path_prefix: f64,
    /// 複数語フレーズの一致
    pub phrase: f64,
    /// 単語キーワードの一致
    pub keyword: f64,
    /// ファイル名・ルート名にグループ名
    pub file_hint: f64,
    /// 競合語1つごとの減点（正の値で指定）
    pub conflict_penalty: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            path_prefix: 0.60,
            phrase: 0.50,
            keyword: 0.30,
            file_hint: 0.10,
            conflict_penalty: 0.40,
        }
    }
}

/// 強制フレーズ定義（ファイル上の形）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForcedPhraseSpec {
    pub pattern: String,
    pub group: Group,
}

/// コンパイル済み強制フレーズ
#[derive(Debug, Clone)]
pub struct ForcedPhrase {
    pub pattern: String,
    pub group: Group,
    regex: Regex,
}

impl ForcedPhrase {
    pub fn compile(spec: &ForcedPhraseSpec) -> Result<Self> {
        let regex = Regex::new(&format!("(?i){}", spec.pattern))
            .map_err(|e| Error::Rules(format!("invalid forced phrase `{}`: {}", spec.pattern, e)))?;
        Ok(Self {
            pattern: spec.pattern.clone(),
            group: spec.group,
            regex,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// 組み込みの強制フレーズ（上から順に評価、最初の一致が勝つ）
const BUILTIN_FORCED: &[(&str, Group)] = &[
    (r"\bcerebral artery\b", Group::Arteries),
    (r"\blacrimal gland\b", Group::Glands),
    (r"\boculomotor nerve\b", Group::Nerves),
    (r"\bnasociliary nerve\b", Group::Nerves),
    (r"\bciliary ganglion\b", Group::Nerves),
    (r"\bintercostal muscle\b", Group::Muscles),
    (r"\bpulmonary valve\b", Group::Heart),
    (r"\bpulmonary trunk\b", Group::Heart),
    // 椎間板は bones より先
    (r"\bintervertebral (disc|disk)\b", Group::Cartilage),
    (r"\bfrontal bone\b", Group::Bones),
    (r"\bparietal bone\b", Group::Bones),
    (r"\btemporal bone\b", Group::Bones),
    (r"\boccipital bone\b", Group::Bones),
    (r"\blacrimal bone\b", Group::Bones),
    (r"\bmetatarsal bone\b", Group::Bones),
    (r"\bmetacarpal bone\b", Group::Bones),
    (r"\brib\b", Group::Bones),
    (r"\bvertebra\b", Group::Bones),
];

lazy_static::lazy_static! {
    static ref BUILTIN_FORCED_PHRASES: Vec<ForcedPhrase> = BUILTIN_FORCED
        .iter()
        .map(|(pattern, group)| ForcedPhrase {
            pattern: pattern.to_string(),
            group: *group,
            regex: Regex::new(&format!("(?i){}", pattern)).expect("組み込み強制フレーズの正規表現が不正"),
        })
        .collect();
}

/// 組み込み強制フレーズの一覧
pub fn builtin_forced_phrases() -> &'static [ForcedPhrase] {
    &BUILTIN_FORCED_PHRASES
}

/// 最初に一致した強制フレーズ
pub fn match_forced<'a>(phrases: &'a [ForcedPhrase], text: &str) -> Option<&'a ForcedPhrase> {
    if text.is_empty() {
        return None;
    }
    phrases.iter().find(|p| p.is_match(text))
}

/// ルールファイルの形
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleFile {
    #[serde(default)]
    pub group_priority: BTreeMap<Group, i32>,
    pub groups: BTreeMap<Group, Vec<String>>,
    #[serde(default)]
    pub conflicting_terms: BTreeMap<Group, Vec<String>>,
    #[serde(default)]
    pub weights: Weights,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forced_phrases: Option<Vec<ForcedPhraseSpec>>,
}

/// 正規化済みトリガー語
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    /// ルールファイル上の表記（理由表示用）
    pub raw: String,
    pub normalized: String,
    /// 複数語ならフレーズ扱い
    pub is_phrase: bool,
}

/// スコアリング用ルールセット
#[derive(Debug, Clone)]
pub struct RuleSet {
    file: RuleFile,
    triggers: BTreeMap<Group, Vec<Trigger>>,
    conflicts: BTreeMap<Group, Vec<String>>,
    forced: Vec<ForcedPhrase>,
}

impl RuleSet {
    pub fn from_rule_file(file: RuleFile) -> Result<Self> {
        if file.groups.is_empty() {
            return Err(Error::Rules("`groups` is empty".into()));
        }

        let triggers = file
            .groups
            .iter()
            .map(|(group, words)| (*group, prepare_triggers(words)))
            .collect();

        let conflicts = file
            .conflicting_terms
            .iter()
            .map(|(group, terms)| {
                let normalized = terms
                    .iter()
                    .map(|t| normalize_text(t))
                    .filter(|t| !t.is_empty())
                    .collect();
                (*group, normalized)
            })
            .collect();

        let forced = match &file.forced_phrases {
            Some(specs) => specs.iter().map(ForcedPhrase::compile).collect::<Result<Vec<_>>>()?,
            None => builtin_forced_phrases().to_vec(),
        };

        Ok(Self {
            file,
            triggers,
            conflicts,
            forced,
        })
    }

    /// JSON文字列から読み込み
    pub fn from_json(json: &str) -> Result<Self> {
        let file: RuleFile = serde_json::from_str(json)
            .map_err(|e| Error::Rules(format!("invalid rule file: {}", e)))?;
        Self::from_rule_file(file)
    }

    /// JSONファイルから読み込み
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// 組み込みルールセット
    pub fn builtin() -> Self {
        let mut file = RuleFile {
            forced_phrases: Some(
                BUILTIN_FORCED
                    .iter()
                    .map(|(pattern, group)| ForcedPhraseSpec {
                        pattern: pattern.to_string(),
                        group: *group,
                    })
                    .collect(),
            ),
            ..Default::default()
        };

        for (i, group) in Group::ALL.iter().enumerate() {
            file.group_priority.insert(*group, i as i32 + 1);
        }

        let keywords: &[(Group, &[&str])] = &[
            (Group::Nerves, &["nerve", "ganglion", "plexus", "ramus", "branch"]),
            (Group::Muscles, &["muscle", "musculus", "intercostal", "biceps", "triceps", "gluteus", "levator"]),
            (Group::Ligaments, &["ligament", "lig.", "ligamentum", "tendon", "raphe", "iliotibial"]),
            (Group::Bones, &["bone", "vertebra", "rib", "mandible", "maxilla", "frontal", "parietal", "temporal", "occipital"]),
            (Group::Organs, &["liver", "kidney", "stomach", "spleen", "pancreas", "bladder", "prostate", "duct"]),
            (Group::Arteries, &["artery", "arterial", "aorta", "carotid", "trunk", "arch"]),
            (Group::Veins, &["vein", "venous", "vena", "sinus"]),
            (Group::Brain, &["gyrus", "ventricle", "thalamus", "cerebellum", "corpus callosum", "insula"]),
            (Group::Eyes, &["eye", "eyeball", "iris", "lens", "sclera", "retina", "lacrimal", "palpebrae", "tarsal"]),
            // 単語単位で照合するため "bronch" の語形を列挙する
            (Group::Lungs, &["lung", "bronchus", "bronchi", "bronchial", "bronchiole", "bronchioles", "trachea", "pulmonary"]),
            (Group::Teeth, &["tooth", "teeth", "incisor", "canine", "premolar", "molar", "gingiva"]),
            (Group::Cartilage, &["cartilage", "chondral", "epiglottic", "meniscus", "disk"]),
            (Group::Glands, &["gland", "pituitary", "pineal", "adrenal", "thyroid", "parathyroid", "lacrimal"]),
            (Group::Ear, &["ear", "auricle", "cochlea", "vestibule"]),
            (Group::Heart, &["atrium", "ventricle", "valve", "papillary", "septal", "coronary"]),
            (Group::SkinHair, &["skin", "hair", "eyelash", "eyebrow"]),
        ];
        for (group, words) in keywords {
            file.groups
                .insert(*group, words.iter().map(|w| w.to_string()).collect());
        }

        let conflicts: &[(Group, &[&str])] = &[
            (Group::Bones, &["ligament", "cartilage", "muscle"]),
            (Group::Muscles, &["tendon", "nerve"]),
            (Group::Arteries, &["vein"]),
            (Group::Veins, &["artery"]),
            (Group::Eyes, &["gland", "bone"]),
            (Group::Brain, &["heart"]),
        ];
        for (group, terms) in conflicts {
            file.conflicting_terms
                .insert(*group, terms.iter().map(|t| t.to_string()).collect());
        }

        Self::from_rule_file(file).expect("組み込みルールセットが不正")
    }

    /// 整形済みJSON（init-rules用）
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.file)?)
    }

    /// 採点対象のグループ（列挙順）
    pub fn groups(&self) -> impl Iterator<Item = Group> + '_ {
        self.triggers.keys().copied()
    }

    pub fn group_count(&self) -> usize {
        self.triggers.len()
    }

    /// 長いものから順に並んだトリガー語
    pub fn triggers(&self, group: Group) -> &[Trigger] {
        self.triggers.get(&group).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 正規化済み競合語
    pub fn conflicts(&self, group: Group) -> &[String] {
        self.conflicts.get(&group).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn priority(&self, group: Group) -> i32 {
        self.file
            .group_priority
            .get(&group)
            .copied()
            .unwrap_or(DEFAULT_PRIORITY)
    }

    pub fn weights(&self) -> &Weights {
        &self.file.weights
    }

    pub fn forced_phrases(&self) -> &[ForcedPhrase] {
        &self.forced
    }

    /// テキストに一致する最初の強制フレーズ
    pub fn forced_target(&self, text: &str) -> Option<&ForcedPhrase> {
        match_forced(&self.forced, text)
    }
}

fn prepare_triggers(words: &[String]) -> Vec<Trigger> {
    let mut triggers: Vec<Trigger> = words
        .iter()
        .filter_map(|raw| {
            let normalized = normalize_text(raw);
            if normalized.is_empty() {
                return None;
            }
            Some(Trigger {
                raw: raw.clone(),
                is_phrase: normalized.contains(' '),
                normalized,
            })
        })
        .collect();

    triggers.sort_by(|a, b| {
        b.normalized
            .len()
            .cmp(&a.normalized.len())
            .then_with(|| a.normalized.cmp(&b.normalized))
    });
    triggers.dedup_by(|a, b| a.normalized == b.normalized);
    triggers
}
