//! Scene Sync Common Library
//!
//! フィルム写真と現場写真の照合コア（CLIから独立した純粋なロジック）
//!
//! - scorer: 距離の観測値 → 信頼度スコア
//! - search: 候補プールから最良の候補を選ぶ
//! - classifier: スコア → 信頼度ティア
//! - session: 参照テーブルによる除外と結果の統合
//! - verifier: 正解との比較と指標

pub mod types;
pub mod error;
pub mod scorer;
pub mod search;
pub mod classifier;
pub mod session;
pub mod verifier;
pub mod table;

pub use types::{
    ConfidenceTier, Item, KnnObservation, MatchKind, MatchOutcome, MatchRecord, Observations,
    PairwiseObservation,
};
pub use error::{Error, PoolKind, Result};
pub use scorer::ScoringPolicy;
pub use search::{collect_failures, find_best_match, FeatureMatcher, ItemFailure, SearchReport};
pub use classifier::classify;
pub use session::{ExclusionState, ReferenceTable, ResultSet, Session, SessionPlan, SessionRun};
pub use verifier::{verify, Mapping, Metrics, Verdict, Verification, VerificationRecord};
