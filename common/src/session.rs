//! セッション管理
//!
//! 前回の結果（参照テーブル）から CONFIDENT のレコードだけを引き継ぎ、
//! 確定済みのクエリと候補を今回の照合対象から除外する。
//! 新たに照合したレコードと引き継いだレコードを合わせて最終結果とする。

use crate::classifier::{classify, unresolved};
use crate::error::{Error, PoolKind, Result};
use crate::scorer::ScoringPolicy;
use crate::search::{collect_failures, find_best_match, FeatureMatcher, ItemFailure, SearchReport};
use crate::types::{Item, MatchRecord};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// 前回セッションの結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceTable {
    records: Vec<MatchRecord>,
}

impl ReferenceTable {
    pub fn new(records: Vec<MatchRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[MatchRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// 除外状態
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionState {
    pub excluded_queries: BTreeSet<String>,
    pub excluded_candidates: BTreeSet<String>,
}

impl ExclusionState {
    pub fn is_empty(&self) -> bool {
        self.excluded_queries.is_empty() && self.excluded_candidates.is_empty()
    }
}

/// 除外を適用した後の照合対象
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPlan {
    pub effective_queries: Vec<Item>,
    pub effective_candidates: Vec<Item>,
}

impl SessionPlan {
    /// 探索を実行するか（どちらかが空なら探索しない）
    pub fn needs_search(&self) -> bool {
        !self.effective_queries.is_empty() && !self.effective_candidates.is_empty()
    }

    /// 照合対象に対して探索を行い、新規レコードと失敗を返す
    ///
    /// `search` はクエリ順に1件ずつ `SearchReport` を返すこと。
    /// どちらかのプールが空なら `search` は呼ばず、全クエリを UNRESOLVED にする。
    pub fn search_with<F>(&self, search: F) -> (Vec<MatchRecord>, Vec<ItemFailure>)
    where
        F: FnOnce(&[Item], &[Item]) -> Vec<SearchReport>,
    {
        if !self.needs_search() {
            let records = self.effective_queries.iter().map(|q| unresolved(&q.id)).collect();
            return (records, Vec::new());
        }

        let reports = search(&self.effective_queries, &self.effective_candidates);
        let mut records = Vec::with_capacity(reports.len());
        let mut failures = Vec::new();
        for report in reports {
            records.push(classify(&report.outcome));
            failures.extend(report.failures);
        }
        (records, collect_failures(failures))
    }
}

/// 最終結果（query_id ごとに1レコード）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub retained: Vec<MatchRecord>,
    pub new_records: Vec<MatchRecord>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.retained.len() + self.new_records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 引き継ぎ分 → 新規分の順に全レコードを返す
    pub fn records(&self) -> impl Iterator<Item = &MatchRecord> {
        self.retained.iter().chain(self.new_records.iter())
    }

    pub fn into_records(self) -> Vec<MatchRecord> {
        let mut records = self.retained;
        records.extend(self.new_records);
        records
    }
}

/// 1回の照合セッション
///
/// 参照テーブルのスナップショットを保持し、それ以外の状態は持たない。
#[derive(Debug, Clone, Default)]
pub struct Session {
    retained: Vec<MatchRecord>,
    exclusions: ExclusionState,
}

impl Session {
    /// 参照テーブルからセッションを作る（None なら除外なし）
    pub fn new(reference: Option<&ReferenceTable>) -> Self {
        let retained: Vec<MatchRecord> = reference
            .map(|table| {
                table
                    .records()
                    .iter()
                    .filter(|r| r.is_confident())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let mut exclusions = ExclusionState::default();
        for record in &retained {
            exclusions.excluded_queries.insert(record.query_id.clone());
            if let Some(candidate) = &record.candidate_id {
                exclusions.excluded_candidates.insert(candidate.clone());
            }
        }

        if let Some(table) = reference {
            info!(
                total = table.len(),
                retained = retained.len(),
                "loaded reference table"
            );
        }

        Self { retained, exclusions }
    }

    pub fn retained(&self) -> &[MatchRecord] {
        &self.retained
    }

    pub fn exclusions(&self) -> &ExclusionState {
        &self.exclusions
    }

    /// 除外を適用した照合対象を求める
    ///
    /// 除外前のプールが空ならエラー。除外後に空になるのは正常。
    pub fn plan(&self, queries: &[Item], candidates: &[Item]) -> Result<SessionPlan> {
        if queries.is_empty() {
            return Err(Error::EmptyPool { pool: PoolKind::Query });
        }
        if candidates.is_empty() {
            return Err(Error::EmptyPool { pool: PoolKind::Candidate });
        }

        let effective_queries: Vec<Item> = queries
            .iter()
            .filter(|q| !self.exclusions.excluded_queries.contains(&q.id))
            .cloned()
            .collect();
        let effective_candidates: Vec<Item> = candidates
            .iter()
            .filter(|c| !self.exclusions.excluded_candidates.contains(&c.id))
            .cloned()
            .collect();

        debug!(
            queries = effective_queries.len(),
            candidates = effective_candidates.len(),
            excluded_queries = queries.len() - effective_queries.len(),
            excluded_candidates = candidates.len() - effective_candidates.len(),
            "session plan"
        );

        Ok(SessionPlan {
            effective_queries,
            effective_candidates,
        })
    }

    /// 引き継ぎレコードと新規レコードを合わせる
    ///
    /// 引き継ぎ済みのクエリに対する新規レコードは捨てる（クエリIDは常に一意）。
    pub fn finish(self, new_records: Vec<MatchRecord>) -> ResultSet {
        let new_records = new_records
            .into_iter()
            .filter(|r| !self.exclusions.excluded_queries.contains(&r.query_id))
            .collect();
        ResultSet {
            retained: self.retained,
            new_records,
        }
    }

    /// 計画から新規レコードを作る（逐次実行）
    pub fn search_plan<M: FeatureMatcher>(
        plan: &SessionPlan,
        matcher: &M,
        policy: &ScoringPolicy,
    ) -> (Vec<MatchRecord>, Vec<ItemFailure>) {
        plan.search_with(|queries, candidates| {
            queries
                .iter()
                .map(|query| find_best_match(matcher, policy, query, candidates))
                .collect()
        })
    }

    /// 計画・探索・統合をまとめて実行
    pub fn run<M: FeatureMatcher>(
        self,
        queries: &[Item],
        candidates: &[Item],
        matcher: &M,
        policy: &ScoringPolicy,
    ) -> Result<SessionRun> {
        let plan = self.plan(queries, candidates)?;
        let (new_records, failures) = Self::search_plan(&plan, matcher, policy);
        Ok(SessionRun {
            result: self.finish(new_records),
            failures,
        })
    }
}

/// [`Session::run`] の結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionRun {
    pub result: ResultSet,
    /// 抽出に失敗してスキップした画像（パスごとに1件）
    pub failures: Vec<ItemFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::testing::{items, FixedMatcher};
    use crate::types::ConfidenceTier;
    use std::collections::HashSet;

    fn record(query: &str, candidate: Option<&str>, score: f64, tier: ConfidenceTier) -> MatchRecord {
        MatchRecord {
            query_id: query.to_string(),
            candidate_id: candidate.map(str::to_string),
            score,
            tier,
        }
    }

    fn full_slice() -> ScoringPolicy {
        ScoringPolicy::Legacy { good_match_percent: 1.0 }
    }

    #[test]
    fn test_no_reference_means_no_exclusions() {
        let session = Session::new(None);
        assert!(session.exclusions().is_empty());
        assert!(session.retained().is_empty());

        let plan = session.plan(&items(&["A", "B"]), &items(&["X"])).unwrap();
        assert_eq!(plan.effective_queries.len(), 2);
        assert_eq!(plan.effective_candidates.len(), 1);
    }

    #[test]
    fn test_only_confident_records_are_retained() {
        let table = ReferenceTable::new(vec![
            record("A", Some("X"), 0.9, ConfidenceTier::Confident),
            record("B", Some("Y"), 0.65, ConfidenceTier::Provisional),
            record("C", None, 0.0, ConfidenceTier::Unresolved),
        ]);
        let session = Session::new(Some(&table));

        assert_eq!(session.retained().len(), 1);
        assert_eq!(session.retained()[0].query_id, "A");
        assert_eq!(
            session.exclusions().excluded_queries,
            BTreeSet::from(["A".to_string()])
        );
        assert_eq!(
            session.exclusions().excluded_candidates,
            BTreeSet::from(["X".to_string()])
        );
    }

    #[test]
    fn test_reference_exclusion_scenario() {
        // A→X が確定済み。B は Y とだけ照合される
        let table = ReferenceTable::new(vec![record("A", Some("X"), 0.9, ConfidenceTier::Confident)]);
        let matcher = FixedMatcher::default().with("X", &[0.0]).with("Y", &[20.0]);
        let session = Session::new(Some(&table));

        let plan = session.plan(&items(&["A", "B"]), &items(&["X", "Y"])).unwrap();
        assert_eq!(plan.effective_queries, items(&["B"]));
        assert_eq!(plan.effective_candidates, items(&["Y"]));

        let result = session
            .run(&items(&["A", "B"]), &items(&["X", "Y"]), &matcher, &full_slice())
            .unwrap()
            .result;
        assert_eq!(result.retained, vec![record("A", Some("X"), 0.9, ConfidenceTier::Confident)]);
        assert_eq!(result.new_records, vec![record("B", Some("Y"), 0.8, ConfidenceTier::Confident)]);
        assert!(!matcher.extracted.borrow().contains(&"X".to_string()));
    }

    #[test]
    fn test_second_session_keeps_exclusions() {
        let matcher = FixedMatcher::default().with("X", &[10.0]).with("Y", &[25.0]);
        let queries = items(&["A", "B"]);
        let candidates = items(&["X", "Y"]);

        let first = Session::new(None)
            .run(&queries, &candidates, &matcher, &full_slice())
            .unwrap()
            .result;
        // 両クエリとも X が最良
        assert!(first.records().all(|r| r.candidate_id.as_deref() == Some("X")));

        let table = ReferenceTable::new(first.into_records());
        let session = Session::new(Some(&table));
        let plan = session.plan(&queries, &candidates).unwrap();

        for record in table.records().iter().filter(|r| r.is_confident()) {
            assert!(!plan.effective_queries.iter().any(|q| q.id == record.query_id));
            let consumed = record.candidate_id.as_deref().unwrap();
            assert!(!plan.effective_candidates.iter().any(|c| c.id == consumed));
        }
    }

    #[test]
    fn test_empty_effective_candidates_yields_unresolved() {
        let table = ReferenceTable::new(vec![record("A", Some("X"), 0.95, ConfidenceTier::Confident)]);
        let matcher = FixedMatcher::default().with("X", &[0.0]);
        let session = Session::new(Some(&table));

        let result = session
            .run(&items(&["A", "B", "C"]), &items(&["X"]), &matcher, &full_slice())
            .unwrap()
            .result;

        assert_eq!(result.retained.len(), 1);
        assert_eq!(
            result.new_records,
            vec![unresolved("B"), unresolved("C")]
        );
        // 探索は一度も実行されない
        assert!(matcher.extracted.borrow().is_empty());
    }

    #[test]
    fn test_all_queries_excluded_returns_retained_only() {
        let table = ReferenceTable::new(vec![record("A", Some("X"), 0.95, ConfidenceTier::Confident)]);
        let matcher = FixedMatcher::default().with("Y", &[0.0]);
        let result = Session::new(Some(&table))
            .run(&items(&["A"]), &items(&["X", "Y"]), &matcher, &full_slice())
            .unwrap()
            .result;

        assert_eq!(result.len(), 1);
        assert!(result.new_records.is_empty());
    }

    #[test]
    fn test_empty_pools_fail_fast() {
        let session = Session::new(None);
        let err = session.plan(&[], &items(&["X"])).unwrap_err();
        assert!(matches!(err, Error::EmptyPool { pool: PoolKind::Query }));

        let err = session.plan(&items(&["A"]), &[]).unwrap_err();
        assert!(matches!(err, Error::EmptyPool { pool: PoolKind::Candidate }));
    }

    #[test]
    fn test_merge_is_disjoint_and_complete() {
        let table = ReferenceTable::new(vec![
            record("A", Some("X"), 0.9, ConfidenceTier::Confident),
            record("D", Some("W"), 0.61, ConfidenceTier::Provisional),
        ]);
        let matcher = FixedMatcher::default()
            .with("Y", &[35.0])
            .with("Z", &[90.0])
            .failing("Z");
        let queries = items(&["A", "B", "C", "D"]);
        let run = Session::new(Some(&table))
            .run(&queries, &items(&["X", "Y", "Z"]), &matcher, &full_slice())
            .unwrap();
        // Z は B, C の両方で失敗するが1件にまとまる
        assert_eq!(run.failures.len(), 1);
        assert_eq!(run.failures[0].item_id, "Z");
        let result = run.result;

        assert_eq!(result.len(), result.retained.len() + result.new_records.len());
        let retained: HashSet<_> = result.retained.iter().map(|r| &r.query_id).collect();
        let fresh: HashSet<_> = result.new_records.iter().map(|r| &r.query_id).collect();
        assert!(retained.is_disjoint(&fresh));

        // 全クエリがちょうど1レコードを持つ
        let mut ids: Vec<_> = result.records().map(|r| r.query_id.clone()).collect();
        ids.sort();
        assert_eq!(ids, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_finish_drops_records_for_retained_queries() {
        let table = ReferenceTable::new(vec![record("A", Some("X"), 0.9, ConfidenceTier::Confident)]);
        let session = Session::new(Some(&table));
        let result = session.finish(vec![
            record("A", Some("Y"), 0.8, ConfidenceTier::Confident),
            record("B", Some("Y"), 0.8, ConfidenceTier::Confident),
        ]);
        assert_eq!(result.len(), 2);
        assert_eq!(result.new_records[0].query_id, "B");
    }
}
