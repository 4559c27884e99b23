use clap::ValueEnum;
use scene_sync_common::ScoringPolicy;
use serde::{Deserialize, Serialize};

/// スコア算出方式の選択
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    /// 距離の上位割合の平均（相互最近傍）
    #[default]
    Legacy,
    /// 比率テスト（k=2）
    Ratio,
}

impl ScoringMode {
    pub fn name(&self) -> &'static str {
        match self {
            ScoringMode::Legacy => "legacy",
            ScoringMode::Ratio => "ratio",
        }
    }

    pub fn policy(&self, good_match_percent: f64, ratio_threshold: f64) -> ScoringPolicy {
        match self {
            ScoringMode::Legacy => ScoringPolicy::Legacy { good_match_percent },
            ScoringMode::Ratio => ScoringPolicy::RatioTest { ratio_threshold },
        }
    }
}

impl std::fmt::Display for ScoringMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
