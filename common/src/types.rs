//! 照合で扱う型の定義
//!
//! - Item: 照合対象の写真（ファイル名で識別）
//! - Observations: 特徴量マッチャーが返す距離の観測値
//! - MatchOutcome: 1クエリの探索結果
//! - MatchRecord: 信頼度ティア付きで永続化される単位

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 照合対象の写真
///
/// `id` はファイル名で、結果ファイルに書かれる安定した識別子。
/// `path` は特徴量抽出側が画像を読むための場所で、コアは解釈しない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub path: PathBuf,
}

impl Item {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }
}

/// クエリ特徴1つと候補特徴1つの距離（0が完全一致）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairwiseObservation {
    pub distance: f32,
}

/// クエリ特徴1つに対する上位k件の候補距離（昇順）
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KnnObservation {
    pub distances: Vec<f32>,
}

impl KnnObservation {
    /// 最良と次点の距離。候補が2件未満なら None
    pub fn best_two(&self) -> Option<(f32, f32)> {
        match self.distances.as_slice() {
            [best, second, ..] => Some((*best, *second)),
            _ => None,
        }
    }
}

/// マッチャーに要求する観測の形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// 特徴ごとに最良1件（相互最近傍）
    Best,
    /// 特徴ごとに上位2件（比率テスト用）
    Knn2,
}

/// 1組の画像間の観測値
#[derive(Debug, Clone, PartialEq)]
pub enum Observations {
    Best(Vec<PairwiseObservation>),
    Knn(Vec<KnnObservation>),
}

impl Observations {
    pub fn is_empty(&self) -> bool {
        match self {
            Observations::Best(obs) => obs.is_empty(),
            Observations::Knn(obs) => obs.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Observations::Best(obs) => obs.len(),
            Observations::Knn(obs) => obs.len(),
        }
    }
}

/// 1クエリの探索結果
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub query_id: String,
    pub candidate_id: Option<String>,
    pub score: f64,
}

impl MatchOutcome {
    /// 一致なし（スコア0）
    pub fn unmatched(query_id: impl Into<String>) -> Self {
        Self {
            query_id: query_id.into(),
            candidate_id: None,
            score: 0.0,
        }
    }
}

/// 信頼度ティア
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    /// セッションをまたいで信頼する一致（除外対象になる）
    Confident,
    /// 記録はするが再評価の対象
    Provisional,
    /// 一致なし
    Unresolved,
}

impl ConfidenceTier {
    /// 結果ファイルの `confident_match` 列の値
    pub fn flag(self) -> i8 {
        match self {
            ConfidenceTier::Confident => 1,
            ConfidenceTier::Provisional => 0,
            ConfidenceTier::Unresolved => -1,
        }
    }

    pub fn from_flag(flag: i8) -> Option<Self> {
        match flag {
            1 => Some(ConfidenceTier::Confident),
            0 => Some(ConfidenceTier::Provisional),
            -1 => Some(ConfidenceTier::Unresolved),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConfidenceTier::Confident => "CONFIDENT",
            ConfidenceTier::Provisional => "PROVISIONAL",
            ConfidenceTier::Unresolved => "UNRESOLVED",
        }
    }
}

/// 永続化される照合レコード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub query_id: String,
    pub candidate_id: Option<String>,
    pub score: f64,
    pub tier: ConfidenceTier,
}

impl MatchRecord {
    pub fn is_confident(&self) -> bool {
        self.tier == ConfidenceTier::Confident
    }
}
