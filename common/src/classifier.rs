//! 結果分類
//!
//! 探索結果をスコアに応じて3段階の信頼度ティアへ振り分ける。
//! 0.7 以上はセッションをまたいで信頼する一致、0.6 を超えれば記録に残す。

use crate::types::{ConfidenceTier, MatchOutcome, MatchRecord};

/// CONFIDENT の下限（この値を含む）
pub const CONFIDENT_THRESHOLD: f64 = 0.7;

/// PROVISIONAL の下限（この値を含まない）
pub const PROVISIONAL_THRESHOLD: f64 = 0.6;

/// 小数第3位に丸める
pub fn round_score(score: f64) -> f64 {
    (score * 1000.0).round() / 1000.0
}

/// 探索結果を分類してレコードを作る
///
/// ティアは丸める前のスコアで判定し、記録するスコアだけを小数第3位に丸める。
pub fn classify(outcome: &MatchOutcome) -> MatchRecord {
    let raw = outcome.score;
    let tier = match &outcome.candidate_id {
        Some(_) if raw >= CONFIDENT_THRESHOLD => ConfidenceTier::Confident,
        Some(_) if raw > PROVISIONAL_THRESHOLD => ConfidenceTier::Provisional,
        _ => return unresolved(&outcome.query_id),
    };

    MatchRecord {
        query_id: outcome.query_id.clone(),
        candidate_id: outcome.candidate_id.clone(),
        score: round_score(raw),
        tier,
    }
}

/// 一致なしのレコード
pub fn unresolved(query_id: &str) -> MatchRecord {
    MatchRecord {
        query_id: query_id.to_string(),
        candidate_id: None,
        score: 0.0,
        tier: ConfidenceTier::Unresolved,
    }
}
