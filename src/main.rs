use anatomy_meta::{assets, catalog, cli, config, error, fixes, report, review, scorer};
use anatomy_meta_common::{Catalog, Group, RuleSet, Table};
use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, ThresholdArgs, WriteArgs};
use config::Config;
use dialoguer::Confirm;
use error::MetaError;
use fixes::{FixThresholds, Threshold};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 変更プレビューの表示件数
const PREVIEW_LIMIT: usize = 20;
/// 組み合わせ上位の表示件数
const TOP_PAIRS: usize = 10;

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

/// 書き込み確認（--yes なら確認しない）
fn confirm_write(yes: bool, prompt: &str) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    let answer = Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .context("確認入力に失敗しました")?;
    Ok(answer)
}

fn thresholds(args: &ThresholdArgs, config: &Config) -> FixThresholds {
    FixThresholds {
        prob: Threshold::from_args(args.min_prob, args.prob_q.unwrap_or(config.prob_quantile)),
        margin: Threshold::from_args(args.min_margin, args.margin_q.unwrap_or(config.margin_quantile)),
    }
}

fn load_catalog(path: &Path) -> Result<Catalog> {
    let catalog = catalog::load_catalog(path)
        .with_context(|| format!("カタログを読み込めません: {}", path.display()))?;
    println!("✔ カタログ: {} ({} 件)", path.display(), catalog.len());
    Ok(catalog)
}

fn load_rules(path: &Path) -> Result<RuleSet> {
    let rules = scorer::load_rules(path)?;
    println!("✔ ルール: {} ({} グループ)", path.display(), rules.group_count());
    Ok(rules)
}

/// バックアップ付きでカタログを保存
fn save_catalog(path: &Path, catalog: &Catalog) -> Result<()> {
    let backup = catalog::save_with_backup(path, catalog)?;
    println!("🛟 バックアップ: {}", backup.display());
    println!("✔ 保存: {}", path.display());
    Ok(())
}

fn print_dry_run() {
    println!("\n💡 ドライラン: 変更は保存されていません（--write で書き込み、バックアップ付き）");
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load()?;
    config.validate()?;
    let catalog_path = config.catalog_path(cli.catalog.clone());

    match cli.command {
        Commands::Report { rules, output, mismatches_only, min_prob, min_margin } => {
            println!("📊 anatomy-meta - 推定レポート\n");

            let catalog = load_catalog(&catalog_path)?;
            let rules = load_rules(&config.rules_path(rules))?;
            let filter = report::ReportFilter { min_prob, min_margin, mismatches_only };

            let rows = report::build_report(&catalog, &scorer::Scorer::new(&rules), &filter, true);
            let output = output.unwrap_or_else(|| config.reports_dir(None).join(report::PREDICTIONS_FILE));
            report::write_report(&output, &rows)?;

            let mismatches = rows.iter().filter(|r| r.is_mismatch()).count();
            println!("✔ 行数: {} / {}（不一致: {}）", rows.len(), catalog.len(), mismatches);
            println!("\n✅ レポートを出力: {}", output.display());
        }

        Commands::Fixes { input, rules, output_dir, thresholds: args } => {
            println!("🩺 anatomy-meta - 修正候補の作成\n");

            let rules = load_rules(&config.rules_path(rules))?;
            let rows = match input {
                Some(path) => {
                    let rows = report::read_report(&path)
                        .with_context(|| format!("レポートを読み込めません: {}", path.display()))?;
                    println!("✔ レポート: {} ({} 行)", path.display(), rows.len());
                    rows
                }
                None => {
                    let catalog = load_catalog(&catalog_path)?;
                    let mut rows = report::predict_all(&catalog, &scorer::Scorer::new(&rules), true);
                    report::sort_rows(&mut rows);
                    rows
                }
            };

            let build = fixes::build_fixes(&rows, &thresholds(&args, &config), rules.forced_phrases());

            let dir = config.reports_dir(output_dir);
            let candidates_path = dir.join(fixes::CANDIDATES_FILE);
            let auto_path = dir.join(fixes::AUTO_FILE);
            let confusion_path = dir.join(fixes::CONFUSION_FILE);
            fixes::write_fix_rows(&candidates_path, &build.candidates)?;
            fixes::write_fix_rows(&auto_path, &build.auto)?;
            build.confusion.write_file(&confusion_path)?;

            println!("✔ 不一致: {}（提案なし: {}）", build.mismatches, build.unresolved);
            println!("✔ 修正候補: {}", build.candidates.len());
            println!("✔ 自動Fix: {}", build.auto.len());
            match (build.thresholds.min_prob, build.thresholds.min_margin) {
                (Some(p), Some(m)) => println!("ℹ️ 閾値: prob≥{:.3} | margin≥{:.3}", p, m),
                _ => println!("ℹ️ 閾値: 不一致なし"),
            }

            let pairs = build.top_pairs(TOP_PAIRS);
            if !pairs.is_empty() {
                println!("\n上位の組み合わせ（現在 → 新）:");
                for (current, new, count) in pairs {
                    println!("  {:>12}  →  {:<12}  x{}", current, new.as_str(), count);
                }
            }

            println!("\n📄 candidates: {}", candidates_path.display());
            println!("📄 auto      : {}", auto_path.display());
            println!("📄 confusion : {}", confusion_path.display());
        }

        Commands::Apply { fixes: fixes_path, null_subgroup, write: WriteArgs { write, yes } } => {
            println!("🔧 anatomy-meta - 修正の適用\n");

            let fixes_path = fixes_path.unwrap_or_else(|| config.reports_dir(None).join(fixes::AUTO_FILE));
            if !fixes_path.exists() {
                return Err(MetaError::FileNotFound(fixes_path.display().to_string()).into());
            }
            let table = Table::from_file(&fixes_path).map_err(MetaError::from)?;
            let mut catalog = load_catalog(&catalog_path)?;
            let plan = fixes::plan_fixes(&catalog, &table, &Group::ALL)?;

            println!("🔎 Fix表: {} ({} 行)", fixes_path.display(), plan.total_rows);
            if let Some(column) = &plan.flag_column {
                println!("ℹ️ フラグ列: {}（偽の行: {}）", column, plan.skipped_unflagged);
            }
            println!("✔ 変更対象: {}", plan.changes.len());
            if plan.skipped_not_found > 0 {
                println!("⚠️  スキップ（エントリなし）: {}", plan.skipped_not_found);
            }
            if plan.skipped_same_group > 0 {
                println!("ℹ️  スキップ（同じグループ）: {}", plan.skipped_same_group);
            }
            if plan.skipped_invalid_group > 0 {
                println!("⚠️  スキップ（不正なグループ）: {}", plan.skipped_invalid_group);
            }
            if plan.skipped_blank > 0 {
                println!("ℹ️  スキップ（空欄）: {}", plan.skipped_blank);
            }
            for change in plan.changes.iter().take(PREVIEW_LIMIT) {
                println!("  - {}: {} → {}", change.key, change.old_group, change.new_group);
            }
            if plan.changes.len() > PREVIEW_LIMIT {
                println!("  … 他 {} 件", plan.changes.len() - PREVIEW_LIMIT);
            }

            if !write {
                print_dry_run();
                return Ok(());
            }
            if plan.is_empty() {
                println!("\nℹ️ 変更がないため書き込みません");
                return Ok(());
            }
            if !confirm_write(yes, &format!("{} 件の変更を書き込みますか？", plan.changes.len()))? {
                println!("中止しました");
                return Ok(());
            }

            let (backup, applied) = fixes::stage_and_persist(&catalog_path, &mut catalog, &plan, null_subgroup)?;
            println!("🛟 バックアップ: {}", backup.display());
            println!("\n✅ {} 件を更新: {}", applied, catalog_path.display());
        }

        Commands::Review { rules, output_dir, iterations, apply, yes, thresholds: args } => {
            println!("🔁 anatomy-meta - レビューループ\n");

            let mut catalog = load_catalog(&catalog_path)?;
            let rules = load_rules(&config.rules_path(rules))?;
            let options = review::ReviewOptions {
                max_iterations: iterations.unwrap_or(config.review_iterations),
                apply,
                thresholds: thresholds(&args, &config),
                reports_dir: config.reports_dir(output_dir),
            };

            if apply && !confirm_write(yes, "自動Fixを毎回カタログに書き込みますか？")? {
                println!("中止しました");
                return Ok(());
            }

            let summary = review::run_review(&catalog_path, &mut catalog, &rules, &options)?;
            for it in &summary.iterations {
                println!("\n====== 反復 {}/{} ======", it.iteration, options.max_iterations);
                println!("  不一致: {} | 候補: {} | 自動Fix: {}", it.mismatches, it.candidates, it.auto);
                if let Some(backup) = &it.backup {
                    println!("  ✔ 適用: {}（バックアップ: {}）", it.applied, backup.display());
                }
                if let Some(n) = it.suspects {
                    println!("  🕵️ 要確認: {}", n);
                }
            }

            println!("\n🏁 終了: {}（適用合計: {}）", summary.stop, summary.total_applied());
            println!("📄 レポート: {}", options.reports_dir.display());
            if !apply {
                print_dry_run();
            }
        }

        Commands::Uid { sample, write: WriteArgs { write, yes } } => {
            println!("🔑 anatomy-meta - entry_uid の付与と検証\n");

            let mut catalog = load_catalog(&catalog_path)?;
            let assigned = catalog::assign_uids(&mut catalog);
            let validation = catalog::validate_keys(&catalog);

            for warning in &validation.warnings {
                tracing::warn!("{}", warning);
            }
            for (id, count) in &validation.duplicate_ids {
                println!("  ⚠️ {}: {} 件", id, count);
            }
            for err in &validation.errors {
                eprintln!("❌ {}", err);
            }
            println!(
                "\n📊 エントリ: {} | uid 付与: {} | エラー: {} | 警告: {}",
                catalog.len(),
                assigned,
                validation.errors.len(),
                validation.warnings.len()
            );
            validation.into_result()?;

            if sample > 0 {
                println!("\n🔎 サンプル:");
                for entry in catalog.entries.iter().take(sample) {
                    let url = entry.asset_str("url").unwrap_or("");
                    println!("  - {} | {} | {}", entry.key(), entry.id(), url);
                }
            }

            if !write {
                print_dry_run();
            } else if assigned == 0 {
                println!("\nℹ️ 変更がないため書き込みません");
            } else if confirm_write(yes, &format!("{} 件に entry_uid を書き込みますか？", assigned))? {
                save_catalog(&catalog_path, &catalog)?;
            }
        }

        Commands::Upgrade { write: WriteArgs { write, yes } } => {
            println!("⬆️  anatomy-meta - スキーマ {} へのアップグレード\n", catalog::upgrade::META_SCHEMA_VERSION);

            let mut catalog = load_catalog(&catalog_path)?;
            let changed = catalog::upgrade_catalog(&mut catalog);
            println!("✔ 変更されるエントリ: {} / {}", changed, catalog.len());

            if !write {
                print_dry_run();
            } else if changed == 0 {
                println!("\nℹ️ 変更がないため書き込みません");
            } else if confirm_write(yes, &format!("{} 件を更新しますか？", changed))? {
                save_catalog(&catalog_path, &catalog)?;
            }
        }

        Commands::ManualFixes { map, input, output } => {
            println!("📝 anatomy-meta - 手動ラベル対応表\n");

            let reports_dir = config.reports_dir(None);
            let input = input.unwrap_or_else(|| reports_dir.join(report::PREDICTIONS_FILE));
            let rows = report::read_report(&input)
                .with_context(|| format!("レポートを読み込めません: {}", input.display()))?;
            if !map.exists() {
                return Err(MetaError::FileNotFound(map.display().to_string()).into());
            }
            let label_map = Table::from_file(&map).map_err(MetaError::from)?;

            let manual = fixes::build_manual_fixes(&rows, &label_map)?;
            let output = output.unwrap_or_else(|| reports_dir.join(fixes::MANUAL_FILE));
            manual.table.write_file(&output).map_err(MetaError::from)?;

            println!("✔ 対応表に一致: {}（変更不要: {}）", manual.matched, manual.unchanged);
            println!("\n✅ 出力: {} ({} 行)", output.display(), manual.table.len());
        }

        Commands::CheckAssets { folder, ext } => {
            println!("📦 anatomy-meta - アセット確認\n");

            let catalog = load_catalog(&catalog_path)?;
            let folder = folder.unwrap_or_else(|| config.assets_dir.clone());
            let check = assets::check_assets(&catalog, &folder, ext.trim_start_matches('.'))?;

            println!("✔ 参照: {} | フォルダ: {}", check.expected, check.found);
            if check.unreferenced.is_empty() {
                println!("✅ 未参照のファイルはありません");
            } else {
                println!("\n🟡 カタログにないファイル:");
                for f in &check.unreferenced {
                    println!("  - {}", f);
                }
            }
            if check.missing.is_empty() {
                println!("✅ 参照ファイルはすべて存在します");
            } else {
                println!("\n🔴 見つからないファイル:");
                for f in &check.missing {
                    println!("  - {}", f);
                }
            }
        }

        Commands::InitRules { output, force } => {
            let output: PathBuf = config.rules_path(output);
            if output.exists() && !force {
                return Err(MetaError::AlreadyExists(output.display().to_string()).into());
            }
            if let Some(parent) = output.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let json = RuleSet::builtin().to_json_pretty().map_err(MetaError::from)?;
            std::fs::write(&output, json + "\n")?;
            println!("✔ 組み込みルールを出力: {}", output.display());
        }

        Commands::Config { show, set_catalog, set_rules, set_reports } => {
            let mut config = config;
            let mut changed = false;

            if let Some(path) = set_catalog {
                config.catalog_path = path;
                changed = true;
            }
            if let Some(path) = set_rules {
                config.rules_path = path;
                changed = true;
            }
            if let Some(path) = set_reports {
                config.reports_dir = path;
                changed = true;
            }
            if changed {
                config.save()?;
                println!("✔ 設定を保存しました: {}", Config::config_path()?.display());
            }

            if show || !changed {
                println!("設定:");
                println!("  カタログ: {}", config.catalog_path.display());
                println!("  （実際に使うパス: {}）", catalog_path.display());
                println!("  ルール: {}", config.rules_path.display());
                println!("  レポート: {}", config.reports_dir.display());
                println!("  アセット: {}", config.assets_dir.display());
                println!("  分位点: prob {:.2} | margin {:.2}", config.prob_quantile, config.margin_quantile);
                println!("  反復上限: {}", config.review_iterations);
            }
        }
    }

    Ok(())
}
