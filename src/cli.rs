use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "anatomy-meta")]
#[command(about = "解剖3Dアセットカタログ（meta.json）の分類整備ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// カタログファイル（デフォルト: 設定ファイル / ANATOMY_META_CATALOG）
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,
}

/// 書き込み系コマンド共通
#[derive(Args, Debug, Clone, Copy)]
pub struct WriteArgs {
    /// 変更を書き込む（省略時はドライラン）
    #[arg(long)]
    pub write: bool,

    /// 確認なしで書き込む
    #[arg(short, long)]
    pub yes: bool,
}

/// 自動Fixの閾値（絶対値を指定すると分位点より優先）
#[derive(Args, Debug, Clone, Copy)]
pub struct ThresholdArgs {
    /// 確率の下限（0.0-1.0）
    #[arg(long)]
    pub min_prob: Option<f64>,

    /// マージンの下限（0.0-1.0）
    #[arg(long)]
    pub min_margin: Option<f64>,

    /// 確率の分位点（デフォルト: 設定値 0.80）
    #[arg(long)]
    pub prob_q: Option<f64>,

    /// マージンの分位点（デフォルト: 設定値 0.70）
    #[arg(long)]
    pub margin_q: Option<f64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// カタログを採点して推定レポート（CSV）を出力
    Report {
        /// ルールファイル（JSON）
        #[arg(short, long)]
        rules: Option<PathBuf>,

        /// 出力CSV（デフォルト: reports/group_predictions.csv）
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 推定と現在分類が異なる行のみ
        #[arg(long)]
        mismatches_only: bool,

        /// 確率の下限（0.0-1.0）
        #[arg(long)]
        min_prob: Option<f64>,

        /// マージンの下限（0.0-1.0）
        #[arg(long)]
        min_margin: Option<f64>,
    },

    /// 推定レポートから修正候補・自動Fix・混同行列を作成
    Fixes {
        /// 入力レポート（省略時はカタログから再採点）
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// ルールファイル（再採点・強制フレーズ用）
        #[arg(short, long)]
        rules: Option<PathBuf>,

        /// 出力ディレクトリ（デフォルト: reports）
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        #[command(flatten)]
        thresholds: ThresholdArgs,
    },

    /// Fix表をカタログに適用
    Apply {
        /// Fix表（デフォルト: reports/group_fix_auto.csv）
        #[arg(short, long)]
        fixes: Option<PathBuf>,

        /// classification.subgroup を null にする
        #[arg(long)]
        null_subgroup: bool,

        #[command(flatten)]
        write: WriteArgs,
    },

    /// 採点 → 候補 → 適用 を収束するまで繰り返す
    Review {
        /// ルールファイル（JSON）
        #[arg(short, long)]
        rules: Option<PathBuf>,

        /// レポート出力ディレクトリ
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// 反復回数の上限（デフォルト: 設定値 3）
        #[arg(long)]
        iterations: Option<usize>,

        /// 自動Fixを毎回書き込む（省略時は1周のみのドライラン）
        #[arg(long)]
        apply: bool,

        /// 確認なしで書き込む
        #[arg(short, long)]
        yes: bool,

        #[command(flatten)]
        thresholds: ThresholdArgs,
    },

    /// entry_uid を付与してキーを検証
    Uid {
        /// 先頭N件を表示
        #[arg(long, default_value = "0")]
        sample: usize,

        #[command(flatten)]
        write: WriteArgs,
    },

    /// スキーマ 1.2 へアップグレード（既存値は保持）
    Upgrade {
        #[command(flatten)]
        write: WriteArgs,
    },

    /// 手動ラベル対応表からFix表を作成
    ManualFixes {
        /// label_en,corrected_group の対応表
        #[arg(short, long, default_value = "reports/manual_label_map.csv")]
        map: PathBuf,

        /// 入力レポート（デフォルト: reports/group_predictions.csv）
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// 出力CSV（デフォルト: reports/group_fix_manual.csv）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// アセットフォルダとカタログの突き合わせ
    CheckAssets {
        /// アセットフォルダ（デフォルト: 設定値 all_glb）
        #[arg(short, long)]
        folder: Option<PathBuf>,

        /// 対象拡張子
        #[arg(long, default_value = "glb")]
        ext: String,
    },

    /// 組み込みルールをJSONに書き出す
    InitRules {
        /// 出力先（デフォルト: 設定値 data/group_rules.json）
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 既存ファイルを上書き
        #[arg(long)]
        force: bool,
    },

    /// 設定を表示/編集
    Config {
        /// 設定を表示
        #[arg(long)]
        show: bool,

        /// カタログパスを設定
        #[arg(long)]
        set_catalog: Option<PathBuf>,

        /// ルールファイルパスを設定
        #[arg(long)]
        set_rules: Option<PathBuf>,

        /// レポート出力ディレクトリを設定
        #[arg(long)]
        set_reports: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_defaults_to_dry_run() {
        let cli = Cli::parse_from(["anatomy-meta", "apply"]);
        match cli.command {
            Commands::Apply { write, fixes, null_subgroup } => {
                assert!(!write.write);
                assert!(!write.yes);
                assert!(fixes.is_none());
                assert!(!null_subgroup);
            }
            _ => panic!("apply が解析されない"),
        }
    }

    #[test]
    fn test_fixes_thresholds() {
        let cli = Cli::parse_from(["anatomy-meta", "fixes", "--min-prob", "0.75", "--margin-q", "0.5"]);
        match cli.command {
            Commands::Fixes { thresholds, .. } => {
                assert_eq!(thresholds.min_prob, Some(0.75));
                assert_eq!(thresholds.min_margin, None);
                assert_eq!(thresholds.margin_q, Some(0.5));
            }
            _ => panic!("fixes が解析されない"),
        }
    }

    #[test]
    fn test_global_catalog_flag() {
        let cli = Cli::parse_from(["anatomy-meta", "review", "--apply", "--catalog", "x/meta.json", "--iterations", "5"]);
        assert_eq!(cli.catalog, Some(PathBuf::from("x/meta.json")));
        match cli.command {
            Commands::Review { apply, iterations, .. } => {
                assert!(apply);
                assert_eq!(iterations, Some(5));
            }
            _ => panic!("review が解析されない"),
        }
    }
}
