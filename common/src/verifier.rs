//! 照合結果の検証
//!
//! 結果と正解をそれぞれ query_id → candidate_id の対応に縮約して比較し、
//! クエリごとの判定と集計指標を返す。

use crate::types::MatchRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// query_id → candidate_id の対応
pub type Mapping = BTreeMap<String, String>;

/// 組の列から対応を作る
///
/// 前後の空白を除き、どちらかが空の組は捨てる。同じ query_id は後勝ち。
pub fn reduce_pairs<'a, I>(pairs: I) -> Mapping
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut mapping = Mapping::new();
    for (query, candidate) in pairs {
        let query = query.trim();
        let candidate = candidate.trim();
        if query.is_empty() || candidate.is_empty() {
            continue;
        }
        mapping.insert(query.to_string(), candidate.to_string());
    }
    mapping
}

/// 照合レコードから対応を作る（UNRESOLVED は候補が空なので落ちる）
pub fn mapping_from_records<'a, I>(records: I) -> Mapping
where
    I: IntoIterator<Item = &'a MatchRecord>,
{
    reduce_pairs(records.into_iter().filter_map(|r| {
        r.candidate_id
            .as_deref()
            .map(|candidate| (r.query_id.as_str(), candidate))
    }))
}

/// 判定区分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Correct,
    Incorrect,
    Missed,
    Extra,
}

/// クエリごとの判定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub query_id: String,
    pub verdict: Verdict,
    /// 正解の候補（Extra では None）
    pub truth_candidate: Option<String>,
    /// 結果の候補（Missed では None）
    pub result_candidate: Option<String>,
}

/// 集計指標
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_results: usize,
    pub total_truth: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub missed: usize,
    pub extra: usize,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// 検証結果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub metrics: Metrics,
    /// query_id 昇順（正解側と結果にだけあるクエリを混ぜて並べる）
    pub records: Vec<VerificationRecord>,
}

impl Verification {
    pub fn by_verdict(&self, verdict: Verdict) -> impl Iterator<Item = &VerificationRecord> {
        self.records.iter().filter(move |r| r.verdict == verdict)
    }
}

/// 結果を正解と比較する
pub fn verify(results: &Mapping, truth: &Mapping) -> Verification {
    let mut records = Vec::with_capacity(truth.len());
    let mut metrics = Metrics {
        total_results: results.len(),
        total_truth: truth.len(),
        ..Default::default()
    };

    for (query, truth_candidate) in truth {
        let (verdict, result_candidate) = match results.get(query) {
            None => {
                metrics.missed += 1;
                (Verdict::Missed, None)
            }
            Some(found) if found == truth_candidate => {
                metrics.correct += 1;
                (Verdict::Correct, Some(found.clone()))
            }
            Some(found) => {
                metrics.incorrect += 1;
                (Verdict::Incorrect, Some(found.clone()))
            }
        };
        records.push(VerificationRecord {
            query_id: query.clone(),
            verdict,
            truth_candidate: Some(truth_candidate.clone()),
            result_candidate,
        });
    }

    for (query, result_candidate) in results {
        if truth.contains_key(query) {
            continue;
        }
        metrics.extra += 1;
        records.push(VerificationRecord {
            query_id: query.clone(),
            verdict: Verdict::Extra,
            truth_candidate: None,
            result_candidate: Some(result_candidate.clone()),
        });
    }

    records.sort_by(|a, b| a.query_id.cmp(&b.query_id));

    // accuracy は recall と同じ定義のまま残す
    metrics.accuracy = ratio(metrics.correct, metrics.total_truth);
    metrics.precision = ratio(metrics.correct, metrics.total_results);
    metrics.recall = ratio(metrics.correct, metrics.total_truth);
    let sum = metrics.precision + metrics.recall;
    metrics.f1 = if sum > 0.0 {
        2.0 * metrics.precision * metrics.recall / sum
    } else {
        0.0
    };

    Verification { metrics, records }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
