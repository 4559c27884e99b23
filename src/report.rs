//! 照合結果・検証結果の表示と保存

use crate::error::Result;
use crate::pipeline::MatchSummary;
use scene_sync_common::{ConfidenceTier, MatchRecord, Verdict, Verification};
use serde::Serialize;
use std::path::{Path, PathBuf};

const RULE_WIDTH: usize = 60;

/// ティアごとの件数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierCounts {
    pub confident: usize,
    pub provisional: usize,
    pub unresolved: usize,
}

impl TierCounts {
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a MatchRecord>,
    {
        let mut counts = Self::default();
        for record in records {
            match record.tier {
                ConfidenceTier::Confident => counts.confident += 1,
                ConfidenceTier::Provisional => counts.provisional += 1,
                ConfidenceTier::Unresolved => counts.unresolved += 1,
            }
        }
        counts
    }
}

/// スコアの高い順に上位 n 件（一致のあるレコードのみ）
pub fn top_matches<'a, I>(records: I, n: usize) -> Vec<&'a MatchRecord>
where
    I: IntoIterator<Item = &'a MatchRecord>,
{
    let mut matched: Vec<&MatchRecord> = records
        .into_iter()
        .filter(|r| r.candidate_id.is_some())
        .collect();
    // 同点はファイル名順
    matched.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.query_id.cmp(&b.query_id))
    });
    matched.truncate(n);
    matched
}

pub fn print_match_summary(summary: &MatchSummary, output: &Path) {
    let counts = TierCounts::from_records(summary.result.records());

    println!("  フィルム写真: {}枚（照合対象 {}枚）", summary.query_count, summary.effective_query_count);
    println!("  現場写真:     {}枚（照合対象 {}枚）", summary.candidate_count, summary.effective_candidate_count);
    println!("  引き継ぎ:     {}件", summary.result.retained.len());
    println!();
    println!("  CONFIDENT:    {}", counts.confident);
    println!("  PROVISIONAL:  {}", counts.provisional);
    println!("  UNRESOLVED:   {}", counts.unresolved);

    if !summary.failures.is_empty() {
        println!();
        println!("  ⚠ 特徴量を抽出できなかった画像: {}枚", summary.failures.len());
        for failure in &summary.failures {
            println!("    - {}: {}", failure.path.display(), failure.reason);
        }
    }

    let top = top_matches(summary.result.records(), 5);
    if !top.is_empty() {
        println!();
        println!("上位の一致:");
        for (i, record) in top.iter().enumerate() {
            println!(
                "{}. {} -> {} (confidence: {:.3}, {})",
                i + 1,
                record.query_id,
                record.candidate_id.as_deref().unwrap_or(""),
                record.score,
                record.tier.label()
            );
        }
    }

    println!();
    println!("✔ 結果を保存: {}", output.display());
}

/// 検証レポートを表示
pub fn print_verification_report(verification: &Verification) {
    let m = &verification.metrics;
    let rule = "=".repeat(RULE_WIDTH);

    println!("{}", rule);
    println!("検証レポート");
    println!("{}", rule);

    println!("結果の件数: {}", m.total_results);
    println!("正解の件数: {}", m.total_truth);
    println!();

    println!("照合精度:");
    println!("  正解:     {}", m.correct);
    println!("  誤り:     {}", m.incorrect);
    println!("  未検出:   {}", m.missed);
    println!("  過剰:     {}", m.extra);
    println!();

    println!("指標:");
    println!("  Accuracy:  {:.3} ({:.1}%)", m.accuracy, m.accuracy * 100.0);
    println!("  Precision: {:.3} ({:.1}%)", m.precision, m.precision * 100.0);
    println!("  Recall:    {:.3} ({:.1}%)", m.recall, m.recall * 100.0);
    println!("  F1 Score:  {:.3}", m.f1);
    println!();

    let incorrect: Vec<_> = verification.by_verdict(Verdict::Incorrect).collect();
    if !incorrect.is_empty() {
        println!("INCORRECT（誤った一致）:");
        for r in incorrect {
            println!(
                "  {} -> {} (正解: {})",
                r.query_id,
                r.result_candidate.as_deref().unwrap_or(""),
                r.truth_candidate.as_deref().unwrap_or("")
            );
        }
        println!();
    }

    let missed: Vec<_> = verification.by_verdict(Verdict::Missed).collect();
    if !missed.is_empty() {
        println!("MISSED（未検出）:");
        for r in missed {
            println!(
                "  {} -> {} (結果にありません)",
                r.query_id,
                r.truth_candidate.as_deref().unwrap_or("")
            );
        }
        println!();
    }

    let extra: Vec<_> = verification.by_verdict(Verdict::Extra).collect();
    if !extra.is_empty() {
        println!("EXTRA（過剰な一致）:");
        for r in extra {
            println!(
                "  {} -> {} (正解にありません)",
                r.query_id,
                r.result_candidate.as_deref().unwrap_or("")
            );
        }
        println!();
    }

    println!("{}", rule);
}

/// JSONで保存する検証レポート
#[derive(Debug, Serialize)]
pub struct VerificationReport<'a> {
    pub generated_at: String,
    pub results_file: PathBuf,
    pub truth_file: PathBuf,
    #[serde(flatten)]
    pub verification: &'a Verification,
}

pub fn write_verification_json(
    verification: &Verification,
    results_file: &Path,
    truth_file: &Path,
    output: &Path,
) -> Result<()> {
    let report = VerificationReport {
        generated_at: chrono::Local::now().to_rfc3339(),
        results_file: results_file.to_path_buf(),
        truth_file: truth_file.to_path_buf(),
        verification,
    };

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(output, json)?;
    Ok(())
}
