use crate::error::{MetaError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// カタログパスを上書きする環境変数
pub const ENV_CATALOG_PATH: &str = "ANATOMY_META_CATALOG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub catalog_path: PathBuf,
    pub rules_path: PathBuf,
    pub reports_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub prob_quantile: f64,
    pub margin_quantile: f64,
    pub review_iterations: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("data/meta.json"),
            rules_path: PathBuf::from("data/group_rules.json"),
            reports_dir: PathBuf::from("reports"),
            assets_dir: PathBuf::from("all_glb"),
            prob_quantile: 0.80,
            margin_quantile: 0.70,
            review_iterations: 3,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| MetaError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("anatomy-meta").join("config.json"))
    }

    /// カタログパス（CLI指定 > 環境変数 > 設定ファイル）
    pub fn catalog_path(&self, cli_override: Option<PathBuf>) -> PathBuf {
        if let Some(path) = cli_override {
            return path;
        }
        if let Ok(path) = std::env::var(ENV_CATALOG_PATH) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }
        self.catalog_path.clone()
    }

    pub fn rules_path(&self, cli_override: Option<PathBuf>) -> PathBuf {
        cli_override.unwrap_or_else(|| self.rules_path.clone())
    }

    pub fn reports_dir(&self, cli_override: Option<PathBuf>) -> PathBuf {
        cli_override.unwrap_or_else(|| self.reports_dir.clone())
    }

    /// 分位点の妥当性チェック
    pub fn validate(&self) -> Result<()> {
        for (name, q) in [("prob_quantile", self.prob_quantile), ("margin_quantile", self.margin_quantile)] {
            if !(0.0..=1.0).contains(&q) {
                return Err(MetaError::Config(format!("{} は 0.0-1.0 の範囲で指定してください: {}", name, q)));
            }
        }
        Ok(())
    }
}
