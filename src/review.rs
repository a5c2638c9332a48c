//! レビューループ
//!
//! ## 状態遷移
//! ```text
//! Build → Check → Apply → Suspect → Build | Stop
//!           └→ Stop(Converged)（自動Fixが0件）
//! ```
//! - Build: メモリ上のカタログから推定・候補・混同行列を作り、レポートに書き出す
//! - Check: 自動Fixがなければ収束
//! - Apply: 自動適用が有効なら書き込み（subgroup は null）。無効なら Suspect の後に停止
//! - Suspect: 強制フレーズの対象が現在分類とも推定とも違う行を書き出す
//!
//! 反復回数の上限に達したら Stop(IterationCap)。

use crate::error::Result;
use crate::fixes::{
    build_fixes, builder::phrase_target, fix_rows_to_table, plan_fixes, stage_and_persist, write_fix_rows,
    FixBuild, FixThresholds, AUTO_FILE, CANDIDATES_FILE, CONFUSION_FILE,
};
use crate::report::{predict_all, sort_rows, write_report, PredictionRow, PREDICTIONS_FILE, PREDICTION_COLUMNS};
use crate::scorer::Scorer;
use anatomy_meta_common::{Catalog, ForcedPhrase, Group, RuleSet, Table};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const SUSPECTS_FILE: &str = "group_suspects.csv";

/// 停止理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// 自動Fixが0件になった
    Converged,
    /// 自動適用が無効（1周で終了）
    DryRun,
    /// 反復回数の上限
    IterationCap,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Converged => write!(f, "収束（自動Fixなし）"),
            StopReason::DryRun => write!(f, "ドライラン"),
            StopReason::IterationCap => write!(f, "反復上限"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewState {
    Build,
    Check,
    Apply,
    Suspect,
    Stop(StopReason),
}

#[derive(Debug, Clone)]
pub struct ReviewOptions {
    pub max_iterations: usize,
    /// 自動Fixを書き込む
    pub apply: bool,
    pub thresholds: FixThresholds,
    pub reports_dir: PathBuf,
}

/// 1反復分の結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IterationSummary {
    pub iteration: usize,
    pub predictions: usize,
    pub mismatches: usize,
    pub candidates: usize,
    pub auto: usize,
    pub applied: usize,
    pub backup: Option<PathBuf>,
    pub suspects: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewSummary {
    pub iterations: Vec<IterationSummary>,
    pub stop: StopReason,
}

impl ReviewSummary {
    pub fn total_applied(&self) -> usize {
        self.iterations.iter().map(|i| i.applied).sum()
    }
}

/// 要確認行
#[derive(Debug, Clone, PartialEq)]
pub struct SuspectRow {
    pub prediction: PredictionRow,
    pub phrase_group: Group,
}

/// 強制フレーズの対象が現在分類・推定のどちらとも異なる行
///
/// マージン昇順 → 確率降順
pub fn find_suspects(rows: &[PredictionRow], forced: &[ForcedPhrase]) -> Vec<SuspectRow> {
    let mut suspects: Vec<SuspectRow> = rows
        .iter()
        .filter_map(|row| {
            let target = phrase_target(forced, &row.label_en)?;
            if target.as_str() == row.current_group.trim() || target == row.predicted_group {
                return None;
            }
            Some(SuspectRow {
                prediction: row.clone(),
                phrase_group: target,
            })
        })
        .collect();

    suspects.sort_by(|a, b| {
        a.prediction
            .margin
            .partial_cmp(&b.prediction.margin)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.prediction.prob.partial_cmp(&a.prediction.prob).unwrap_or(Ordering::Equal))
    });
    suspects
}

pub fn suspects_to_table(suspects: &[SuspectRow]) -> Result<Table> {
    let mut headers: Vec<&str> = PREDICTION_COLUMNS.to_vec();
    headers.push("phrase_group");
    let mut table = Table::new(&headers);
    for s in suspects {
        let mut fields = s.prediction.to_fields();
        fields.push(s.phrase_group.to_string());
        table.push_row(fields)?;
    }
    Ok(table)
}

fn write_build(dir: &Path, rows: &[PredictionRow], build: &FixBuild) -> Result<()> {
    write_report(&dir.join(PREDICTIONS_FILE), rows)?;
    write_fix_rows(&dir.join(CANDIDATES_FILE), &build.candidates)?;
    write_fix_rows(&dir.join(AUTO_FILE), &build.auto)?;
    build.confusion.write_file(&dir.join(CONFUSION_FILE))?;
    Ok(())
}

/// レビューループを実行する
///
/// `catalog` は `catalog_path` から読み込んだ内容であること。適用した変更はメモリ上にも反映される。
pub fn run_review(
    catalog_path: &Path,
    catalog: &mut Catalog,
    rules: &RuleSet,
    options: &ReviewOptions,
) -> Result<ReviewSummary> {
    let scorer = Scorer::new(rules);
    let mut iterations: Vec<IterationSummary> = Vec::new();
    let mut rows: Vec<PredictionRow> = Vec::new();
    let mut build = FixBuild::default();

    let mut state = if options.max_iterations == 0 {
        ReviewState::Stop(StopReason::IterationCap)
    } else {
        ReviewState::Build
    };

    loop {
        debug!(?state, iteration = iterations.len(), "review state");
        state = match state {
            ReviewState::Build => {
                rows = predict_all(catalog, &scorer, false);
                sort_rows(&mut rows);
                build = build_fixes(&rows, &options.thresholds, rules.forced_phrases());
                write_build(&options.reports_dir, &rows, &build)?;

                iterations.push(IterationSummary {
                    iteration: iterations.len() + 1,
                    predictions: rows.len(),
                    mismatches: build.mismatches,
                    candidates: build.candidates.len(),
                    auto: build.auto.len(),
                    ..Default::default()
                });
                ReviewState::Check
            }

            ReviewState::Check => {
                if build.auto.is_empty() {
                    ReviewState::Stop(StopReason::Converged)
                } else {
                    ReviewState::Apply
                }
            }

            ReviewState::Apply => {
                if options.apply {
                    let table = fix_rows_to_table(&build.auto)?;
                    let plan = plan_fixes(catalog, &table, &Group::ALL)?;
                    if !plan.is_empty() {
                        let (backup, applied) = stage_and_persist(catalog_path, catalog, &plan, true)?;
                        if let Some(current) = iterations.last_mut() {
                            current.applied = applied;
                            current.backup = Some(backup);
                        }
                    }
                }
                ReviewState::Suspect
            }

            ReviewState::Suspect => {
                let suspects = find_suspects(&rows, rules.forced_phrases());
                suspects_to_table(&suspects)?.write_file(&options.reports_dir.join(SUSPECTS_FILE))?;
                if let Some(current) = iterations.last_mut() {
                    current.suspects = Some(suspects.len());
                }

                if !options.apply {
                    ReviewState::Stop(StopReason::DryRun)
                } else if iterations.len() >= options.max_iterations {
                    ReviewState::Stop(StopReason::IterationCap)
                } else {
                    ReviewState::Build
                }
            }

            ReviewState::Stop(reason) => {
                info!(%reason, iterations = iterations.len(), "review finished");
                return Ok(ReviewSummary {
                    iterations,
                    stop: reason,
                });
            }
        };
    }
}
