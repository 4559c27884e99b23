//! 類似度スコアラー
//!
//! 距離の観測値の集合を [0, 1] の信頼度スコア1つに縮約する。
//! 距離は0が完全一致、100付近がほぼ無関係というスケールを前提とし、
//! 100を固定の正規化基準として使う。

use crate::types::{KnnObservation, MatchKind, Observations, PairwiseObservation};
use serde::{Deserialize, Serialize};

/// 距離の正規化基準
pub const DISTANCE_BASELINE: f64 = 100.0;

/// 良好一致の割合（レガシー方式のデフォルト）
pub const DEFAULT_GOOD_MATCH_PERCENT: f64 = 0.15;

/// 比率テストの閾値（デフォルト）
pub const DEFAULT_RATIO_THRESHOLD: f64 = 0.75;

/// 比率テスト方式で件数スコアが1になる一致数
const RATIO_COUNT_SATURATION: f64 = 50.0;
const RATIO_DISTANCE_WEIGHT: f64 = 0.7;
const RATIO_COUNT_WEIGHT: f64 = 0.3;

/// スコア算出方式
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScoringPolicy {
    /// 距離昇順の先頭 `good_match_percent` の平均距離から算出
    Legacy { good_match_percent: f64 },
    /// 比率テストを通過した特徴の平均距離と件数から算出
    RatioTest { ratio_threshold: f64 },
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        ScoringPolicy::Legacy {
            good_match_percent: DEFAULT_GOOD_MATCH_PERCENT,
        }
    }
}

impl ScoringPolicy {
    pub fn ratio_test() -> Self {
        ScoringPolicy::RatioTest {
            ratio_threshold: DEFAULT_RATIO_THRESHOLD,
        }
    }

    /// この方式がマッチャーに要求する観測の形式
    pub fn match_kind(&self) -> MatchKind {
        match self {
            ScoringPolicy::Legacy { .. } => MatchKind::Best,
            ScoringPolicy::RatioTest { .. } => MatchKind::Knn2,
        }
    }

    /// 観測値からスコアを算出
    ///
    /// 方式と観測の形式が食い違う場合、レガシー方式は各特徴の最良距離を使い、
    /// 比率テスト方式は次点がないため0を返す。
    pub fn score(&self, observations: &Observations) -> f64 {
        match (self, observations) {
            (ScoringPolicy::Legacy { good_match_percent }, Observations::Best(obs)) => {
                legacy_score(obs, *good_match_percent)
            }
            (ScoringPolicy::Legacy { good_match_percent }, Observations::Knn(obs)) => {
                let best: Vec<PairwiseObservation> = obs
                    .iter()
                    .filter_map(|o| o.distances.first())
                    .map(|&distance| PairwiseObservation { distance })
                    .collect();
                legacy_score(&best, *good_match_percent)
            }
            (ScoringPolicy::RatioTest { ratio_threshold }, Observations::Knn(obs)) => {
                ratio_test_score(obs, *ratio_threshold)
            }
            (ScoringPolicy::RatioTest { .. }, Observations::Best(_)) => 0.0,
        }
    }
}

/// レガシー方式
///
/// 距離昇順に並べ、先頭 floor(件数 × fraction) 件の平均距離 d から
/// `max(0, 1 - d/100)` を返す。対象が空なら0。
pub fn legacy_score(observations: &[PairwiseObservation], good_match_percent: f64) -> f64 {
    let mut distances: Vec<f64> = observations
        .iter()
        .map(|o| f64::from(o.distance))
        .filter(|d| d.is_finite())
        .collect();
    if distances.is_empty() {
        return 0.0;
    }

    distances.sort_by(|a, b| a.total_cmp(b));

    let fraction = if good_match_percent.is_finite() {
        good_match_percent.max(0.0)
    } else {
        0.0
    };
    let take = ((distances.len() as f64 * fraction).floor() as usize).min(distances.len());
    if take == 0 {
        return 0.0;
    }

    distance_score(&distances[..take])
}

/// 比率テスト方式
///
/// `best < ratio_threshold * second` を満たす特徴だけを残し、
/// `min(1, 0.7 * 距離スコア + 0.3 * min(1, 件数/50))` を返す。
pub fn ratio_test_score(observations: &[KnnObservation], ratio_threshold: f64) -> f64 {
    let survivors: Vec<f64> = observations
        .iter()
        .filter_map(KnnObservation::best_two)
        .map(|(best, second)| (f64::from(best), f64::from(second)))
        .filter(|(best, second)| best.is_finite() && second.is_finite())
        .filter(|(best, second)| *best < ratio_threshold * *second)
        .map(|(best, _)| best)
        .collect();
    if survivors.is_empty() {
        return 0.0;
    }

    let count_score = (survivors.len() as f64 / RATIO_COUNT_SATURATION).min(1.0);
    let combined = RATIO_DISTANCE_WEIGHT * distance_score(&survivors)
        + RATIO_COUNT_WEIGHT * count_score;
    clamp_unit(combined)
}

/// 平均距離を [0, 1] のスコアへ変換
fn distance_score(distances: &[f64]) -> f64 {
    let mean = distances.iter().sum::<f64>() / distances.len() as f64;
    clamp_unit(1.0 - mean / DISTANCE_BASELINE)
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}
