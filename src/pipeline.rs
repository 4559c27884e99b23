//! 照合処理の一括実行
//!
//! フォルダ走査 → 参照テーブルによる除外 → 並列探索 → 統合 → 結果ファイル出力

use crate::error::Result;
use crate::features::{ExtractParams, ImageMatcher};
use crate::scanner;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use scene_sync_common::table::write_records;
use scene_sync_common::{
    find_best_match, Item, ItemFailure, ReferenceTable, ResultSet, ScoringPolicy, SearchReport,
    Session,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// 照合の実行条件
#[derive(Debug, Clone)]
pub struct MatchOptions {
    pub film_folder: PathBuf,
    pub scene_folder: PathBuf,
    pub output: PathBuf,
    pub policy: ScoringPolicy,
    pub extract: ExtractParams,
    pub timeout: Option<Duration>,
    pub reference: Option<PathBuf>,
    pub show_progress: bool,
}

/// 照合の実行結果
#[derive(Debug, Clone)]
pub struct MatchSummary {
    pub query_count: usize,
    pub candidate_count: usize,
    pub effective_query_count: usize,
    pub effective_candidate_count: usize,
    pub result: ResultSet,
    pub failures: Vec<ItemFailure>,
}

/// フォルダ同士を照合して結果ファイルを書き出す
pub fn run_matching(options: &MatchOptions) -> Result<MatchSummary> {
    let queries = scanner::list_items(&options.film_folder);
    let candidates = scanner::list_items(&options.scene_folder);
    info!(queries = queries.len(), candidates = candidates.len(), "scanned folders");

    let reference = options
        .reference
        .as_deref()
        .map(ReferenceTable::from_csv)
        .transpose()?;

    let summary = match_items(&queries, &candidates, reference.as_ref(), options)?;
    write_records(summary.result.records(), &options.output)?;
    info!(records = summary.result.len(), output = %options.output.display(), "wrote results");

    Ok(summary)
}

/// 列挙済みのプール同士を照合する
pub fn match_items(
    queries: &[Item],
    candidates: &[Item],
    reference: Option<&ReferenceTable>,
    options: &MatchOptions,
) -> Result<MatchSummary> {
    let session = Session::new(reference);
    let plan = session.plan(queries, candidates)?;

    let matcher = ImageMatcher::new(options.extract, options.timeout);
    let (new_records, failures) = plan.search_with(|queries, candidates| {
        search_parallel(queries, candidates, &matcher, &options.policy, options.show_progress)
    });

    Ok(MatchSummary {
        query_count: queries.len(),
        candidate_count: candidates.len(),
        effective_query_count: plan.effective_queries.len(),
        effective_candidate_count: plan.effective_candidates.len(),
        result: session.finish(new_records),
        failures,
    })
}

/// クエリごとに並列で探索する（各クエリ内の候補走査は順番どおり）
fn search_parallel(
    queries: &[Item],
    candidates: &[Item],
    matcher: &ImageMatcher,
    policy: &ScoringPolicy,
    show_progress: bool,
) -> Vec<SearchReport> {
    let mut all_items = queries.to_vec();
    all_items.extend(candidates.iter().cloned());
    matcher.warm(&all_items);

    let progress = if show_progress {
        let pb = ProgressBar::new(queries.len() as u64);
        if let Ok(style) = ProgressStyle::with_template("  {bar:40} {pos}/{len} {msg}") {
            pb.set_style(style);
        }
        pb
    } else {
        ProgressBar::hidden()
    };

    let reports = queries
        .par_iter()
        .map(|query| {
            let report = find_best_match(matcher, policy, query, candidates);
            progress.inc(1);
            report
        })
        .collect();
    progress.finish_and_clear();
    reports
}
