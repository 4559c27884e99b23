//! 候補探索
//!
//! 1枚のクエリ写真を候補プール全体と照合し、最もスコアの高い候補を選ぶ。
//! 特徴量の抽出と距離計算は [`FeatureMatcher`] 実装に委ねる。

use crate::error::Result;
use crate::scorer::ScoringPolicy;
use crate::types::{Item, MatchKind, MatchOutcome, Observations};
use std::path::PathBuf;
use tracing::{debug, warn};

/// 特徴量マッチャー
///
/// `extract` は抽出失敗を `Err`、特徴点なしを `Ok(None)` で返す。
pub trait FeatureMatcher {
    type Descriptors;

    fn extract(&self, item: &Item) -> Result<Option<Self::Descriptors>>;

    fn observe(
        &self,
        kind: MatchKind,
        query: &Self::Descriptors,
        candidate: &Self::Descriptors,
    ) -> Observations;
}

/// 探索中にスキップした項目
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    pub item_id: String,
    /// 同名のファイルがクエリ側と候補側にあり得るので、同一性はパスで見る
    pub path: PathBuf,
    pub reason: String,
}

/// 失敗をパスごとに1件にまとめる（パス順）
///
/// 候補の失敗はクエリごとに繰り返し報告される。
pub fn collect_failures<I>(failures: I) -> Vec<ItemFailure>
where
    I: IntoIterator<Item = ItemFailure>,
{
    let mut failures: Vec<ItemFailure> = failures.into_iter().collect();
    failures.sort_by(|a, b| a.path.cmp(&b.path));
    failures.dedup_by(|a, b| a.path == b.path);
    failures
}

/// 1クエリ分の探索結果
#[derive(Debug, Clone, PartialEq)]
pub struct SearchReport {
    pub outcome: MatchOutcome,
    /// 抽出に失敗したクエリ・候補（処理は継続済み）
    pub failures: Vec<ItemFailure>,
}

/// クエリを候補プールと照合して最良の候補を返す
///
/// 候補は与えられた順に評価し、それまでの最高値を厳密に上回った場合だけ
/// 置き換える（同点は先勝ち）。スコアが0より大きい候補がなければ一致なし。
pub fn find_best_match<M: FeatureMatcher>(
    matcher: &M,
    policy: &ScoringPolicy,
    query: &Item,
    candidates: &[Item],
) -> SearchReport {
    let mut failures = Vec::new();

    let query_desc = match matcher.extract(query) {
        Ok(Some(desc)) => desc,
        Ok(None) => {
            debug!(query = %query.id, "no descriptors in query");
            return SearchReport {
                outcome: MatchOutcome::unmatched(&query.id),
                failures,
            };
        }
        Err(e) => {
            warn!(query = %query.id, error = %e, "query extraction failed");
            failures.push(ItemFailure {
                item_id: query.id.clone(),
                path: query.path.clone(),
                reason: e.to_string(),
            });
            return SearchReport {
                outcome: MatchOutcome::unmatched(&query.id),
                failures,
            };
        }
    };

    let kind = policy.match_kind();
    let mut best: Option<&Item> = None;
    let mut best_score = 0.0;

    for candidate in candidates {
        let candidate_desc = match matcher.extract(candidate) {
            Ok(Some(desc)) => desc,
            Ok(None) => continue,
            Err(e) => {
                warn!(candidate = %candidate.id, error = %e, "skipping candidate");
                failures.push(ItemFailure {
                    item_id: candidate.id.clone(),
                    path: candidate.path.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let observations = matcher.observe(kind, &query_desc, &candidate_desc);
        if observations.is_empty() {
            continue;
        }

        let score = policy.score(&observations);
        debug!(query = %query.id, candidate = %candidate.id, score, "scored");
        if score > best_score {
            best_score = score;
            best = Some(candidate);
        }
    }

    let outcome = match best {
        Some(candidate) => MatchOutcome {
            query_id: query.id.clone(),
            candidate_id: Some(candidate.id.clone()),
            score: best_score,
        },
        None => MatchOutcome::unmatched(&query.id),
    };

    SearchReport { outcome, failures }
}
