use crate::error::{Result, SceneSyncError};
use crate::features::ExtractParams;
use crate::scoring_mode::ScoringMode;
use scene_sync_common::scorer::{DEFAULT_GOOD_MATCH_PERCENT, DEFAULT_RATIO_THRESHOLD};
use scene_sync_common::ScoringPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub max_features: usize,
    pub good_match_percent: f64,
    pub ratio_threshold: f64,
    pub scoring: ScoringMode,
    pub reference_table: Option<PathBuf>,
    pub max_image_size: u32,
    /// 0 でタイムアウトなし
    pub timeout_seconds: u64,
    pub output: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_features: 500,
            good_match_percent: DEFAULT_GOOD_MATCH_PERCENT,
            ratio_threshold: DEFAULT_RATIO_THRESHOLD,
            scoring: ScoringMode::Legacy,
            reference_table: None,
            max_image_size: 1024,
            timeout_seconds: 30,
            output: PathBuf::from("output").join("results.csv"),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// 設定ファイルを読み込む（なければデフォルト）
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// デフォルト設定で上書きする（既存ファイルは読まない）
    pub fn init_at(path: &Path) -> Result<Self> {
        let config = Self::default();
        config.save_to(path)?;
        Ok(config)
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| SceneSyncError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("scene-sync").join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_features == 0 {
            return Err(SceneSyncError::Config("max_features は1以上にしてください".into()));
        }
        if !(self.good_match_percent > 0.0 && self.good_match_percent <= 1.0) {
            return Err(SceneSyncError::Config(format!(
                "good_match_percent は 0 より大きく 1 以下にしてください: {}",
                self.good_match_percent
            )));
        }
        if !(self.ratio_threshold > 0.0 && self.ratio_threshold <= 1.0) {
            return Err(SceneSyncError::Config(format!(
                "ratio_threshold は 0 より大きく 1 以下にしてください: {}",
                self.ratio_threshold
            )));
        }
        Ok(())
    }

    pub fn policy(&self) -> ScoringPolicy {
        self.scoring.policy(self.good_match_percent, self.ratio_threshold)
    }

    pub fn extract_params(&self) -> ExtractParams {
        ExtractParams {
            max_features: self.max_features,
            max_image_size: self.max_image_size,
            ..ExtractParams::default()
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_features, 500);
        assert_eq!(config.good_match_percent, 0.15);
        assert_eq!(config.ratio_threshold, 0.75);
        assert_eq!(config.scoring, ScoringMode::Legacy);
        assert!(config.reference_table.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"scoring": "ratio", "ratio_threshold": 0.8}"#).unwrap();
        assert_eq!(config.scoring, ScoringMode::Ratio);
        assert_eq!(config.policy(), ScoringPolicy::RatioTest { ratio_threshold: 0.8 });
        assert_eq!(config.max_features, 500);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let config = Config {
            good_match_percent: 0.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SceneSyncError::Config(_))));

        let config = Config {
            ratio_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            max_features: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_init_overwrites_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene-sync").join("config.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(Config::load_from(&path), Err(SceneSyncError::JsonParse(_))));

        let config = Config::init_at(&path).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("none.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_timeout_zero_disables() {
        let config = Config {
            timeout_seconds: 0,
            ..Default::default()
        };
        assert_eq!(config.timeout(), None);
        assert_eq!(Config::default().timeout(), Some(Duration::from_secs(30)));
    }
}
