//! 結果ファイル・正解ファイルの読み書き
//!
//! - 結果/参照ファイル: `film_photo,scene_photo,confidence_score,confident_match`
//! - 正解ファイル: `film_photo,scene_photo`
//!
//! どちらもヘッダー行が必須で、必要な列がなければ検証エラーになる。

use crate::error::{Error, Result};
use crate::session::ReferenceTable;
use crate::types::{ConfidenceTier, MatchRecord};
use crate::verifier::{reduce_pairs, Mapping};
use std::collections::HashSet;
use std::path::Path;

pub const COL_QUERY: &str = "film_photo";
pub const COL_CANDIDATE: &str = "scene_photo";
pub const COL_SCORE: &str = "confidence_score";
pub const COL_TIER: &str = "confident_match";

/// 結果ファイルの列
pub const RESULT_COLUMNS: [&str; 4] = [COL_QUERY, COL_CANDIDATE, COL_SCORE, COL_TIER];

/// 正解ファイルの列
pub const TRUTH_COLUMNS: [&str; 2] = [COL_QUERY, COL_CANDIDATE];

/// ヘッダー付きCSV
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvTable {
    headers: Vec<String>,
    /// (行番号, フィールド)。行番号はファイル上の1始まり
    rows: Vec<(usize, Vec<String>)>,
}

impl CsvTable {
    /// CSV文字列から読み込み（空行は無視）
    pub fn parse(content: &str) -> Result<Self> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let mut lines = split_records(content)
            .into_iter()
            .filter(|(_, line)| !line.trim().is_empty());

        let headers = match lines.next() {
            Some((_, line)) => parse_csv_line(line),
            None => return Err(Error::Validation("CSV has no header row".into())),
        };

        let rows = lines
            .map(|(line_no, line)| (line_no, parse_csv_line(line)))
            .collect();

        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 必要な列の位置を返す。足りなければ検証エラー
    pub fn require(&self, columns: &[&str]) -> Result<Vec<usize>> {
        let mut missing = Vec::new();
        let mut indices = Vec::with_capacity(columns.len());
        for column in columns {
            match self.headers.iter().position(|h| h == column) {
                Some(i) => indices.push(i),
                None => missing.push(*column),
            }
        }
        if !missing.is_empty() {
            return Err(Error::Validation(format!(
                "CSV must contain {} columns (missing {}). Found: {}",
                columns.join(", "),
                missing.join(", "),
                self.headers.join(", ")
            )));
        }
        Ok(indices)
    }

    /// 行を走査する。列が足りない行は空文字として扱う
    fn cells<'a>(&'a self, indices: &'a [usize]) -> impl Iterator<Item = (usize, Vec<&'a str>)> + 'a {
        self.rows.iter().map(move |(line, fields)| {
            let cells = indices
                .iter()
                .map(|&i| fields.get(i).map(String::as_str).unwrap_or(""))
                .collect();
            (*line, cells)
        })
    }
}

/// ファイルを読む。存在しなければ NotFound
fn read_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(Error::NotFound(path.display().to_string()));
    }
    Ok(std::fs::read_to_string(path)?)
}

impl ReferenceTable {
    /// 結果ファイルから読み込み
    pub fn from_csv(path: &Path) -> Result<Self> {
        let content = read_file(path)?;
        Self::from_csv_str(&content)
    }

    /// CSV文字列から読み込み
    pub fn from_csv_str(content: &str) -> Result<Self> {
        let table = CsvTable::parse(content)?;
        let indices = table.require(&RESULT_COLUMNS)?;

        let mut records = Vec::with_capacity(table.len());
        let mut seen = HashSet::new();

        for (line, cells) in table.cells(&indices) {
            let query = cells[0].trim();
            let candidate = cells[1].trim();
            let score_text = cells[2].trim();
            let tier_text = cells[3].trim();

            if query.is_empty() {
                continue;
            }
            if !seen.insert(query.to_string()) {
                return Err(Error::Validation(format!(
                    "line {}: duplicate {} '{}'",
                    line, COL_QUERY, query
                )));
            }

            let score: f64 = if score_text.is_empty() {
                0.0
            } else {
                score_text.parse().map_err(|_| {
                    Error::Validation(format!(
                        "line {}: invalid {} '{}'",
                        line, COL_SCORE, score_text
                    ))
                })?
            };
            if !(0.0..=1.0).contains(&score) {
                return Err(Error::Validation(format!(
                    "line {}: {} out of range: {}",
                    line, COL_SCORE, score
                )));
            }

            let tier = tier_text
                .parse::<i8>()
                .ok()
                .and_then(ConfidenceTier::from_flag)
                .ok_or_else(|| {
                    Error::Validation(format!(
                        "line {}: invalid {} '{}' (expected 1, 0 or -1)",
                        line, COL_TIER, tier_text
                    ))
                })?;

            let candidate_id = if candidate.is_empty() {
                None
            } else {
                Some(candidate.to_string())
            };
            if tier == ConfidenceTier::Confident && candidate_id.is_none() {
                return Err(Error::Validation(format!(
                    "line {}: confident match for '{}' has no {}",
                    line, query, COL_CANDIDATE
                )));
            }

            records.push(MatchRecord {
                query_id: query.to_string(),
                candidate_id,
                score,
                tier,
            });
        }

        Ok(ReferenceTable::new(records))
    }
}

/// 対応表ファイル（結果・正解どちらでも可）を読み込み
pub fn load_mapping(path: &Path) -> Result<Mapping> {
    let content = read_file(path)?;
    parse_mapping(&content)
}

/// CSV文字列から対応表を作る
pub fn parse_mapping(content: &str) -> Result<Mapping> {
    let table = CsvTable::parse(content)?;
    let indices = table.require(&TRUTH_COLUMNS)?;
    let cells: Vec<(usize, Vec<&str>)> = table.cells(&indices).collect();
    Ok(reduce_pairs(cells.iter().map(|(_, c)| (c[0], c[1]))))
}

/// レコードを結果ファイル形式の文字列にする
pub fn records_to_csv<'a, I>(records: I) -> String
where
    I: IntoIterator<Item = &'a MatchRecord>,
{
    let mut out = RESULT_COLUMNS.join(",");
    out.push('\n');
    for record in records {
        let fields = [
            escape_field(&record.query_id),
            escape_field(record.candidate_id.as_deref().unwrap_or("")),
            format!("{:.3}", record.score),
            record.tier.flag().to_string(),
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

/// レコードを結果ファイルに書き出す（親ディレクトリは作成する）
pub fn write_records<'a, I>(records: I, path: &Path) -> Result<()>
where
    I: IntoIterator<Item = &'a MatchRecord>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, records_to_csv(records))?;
    Ok(())
}

/// レコード単位に分割する（クォート内の改行はフィールドの一部）
///
/// 各レコードの開始行番号（1始まり）を添える。行末の CR は落とす。
fn split_records(content: &str) -> Vec<(usize, &str)> {
    let mut records = Vec::new();
    let mut start = 0;
    let mut start_line = 1;
    let mut line = 1;
    let mut in_quotes = false;

    for (i, c) in content.char_indices() {
        match c {
            // "" のエスケープは2回反転するので状態は変わらない
            '"' => in_quotes = !in_quotes,
            '\n' => {
                line += 1;
                if !in_quotes {
                    records.push((start_line, content[start..i].trim_end_matches('\r')));
                    start = i + 1;
                    start_line = line;
                }
            }
            _ => {}
        }
    }
    if start < content.len() {
        records.push((start_line, content[start..].trim_end_matches('\r')));
    }
    records
}

/// CSV行をパース（ダブルクォート対応、"" はクォート1つ）
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                // フィールド終了
                fields.push(field.trim().to_string());
                field.clear();
            }
            _ => field.push(c),
        }
    }

    // 最後のフィールド
    fields.push(field.trim().to_string());
    fields
}

fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULT_CSV: &str = "film_photo,scene_photo,confidence_score,confident_match
film_001.jpg,scene_010.jpg,0.912,1
film_002.jpg,scene_011.jpg,0.650,0
film_003.jpg,,0.000,-1
";

    #[test]
    fn test_parse_csv_line_quotes() {
        assert_eq!(parse_csv_line("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(parse_csv_line("\"a,1\",b"), vec!["a,1", "b"]);
        assert_eq!(parse_csv_line("\"say \"\"hi\"\"\",x"), vec!["say \"hi\"", "x"]);
        assert_eq!(parse_csv_line("a,,"), vec!["a", "", ""]);
    }

    #[test]
    fn test_load_reference_table() {
        let table = ReferenceTable::from_csv_str(RESULT_CSV).unwrap();
        assert_eq!(table.len(), 3);

        let records = table.records();
        assert_eq!(records[0].tier, ConfidenceTier::Confident);
        assert_eq!(records[0].candidate_id.as_deref(), Some("scene_010.jpg"));
        assert_eq!(records[0].score, 0.912);
        assert_eq!(records[1].tier, ConfidenceTier::Provisional);
        assert_eq!(records[2].tier, ConfidenceTier::Unresolved);
        assert_eq!(records[2].candidate_id, None);
    }

    #[test]
    fn test_reference_column_order_is_free() {
        let csv = "confident_match,scene_photo,film_photo,confidence_score\n1,s.jpg,f.jpg,0.8\n";
        let table = ReferenceTable::from_csv_str(csv).unwrap();
        assert_eq!(table.records()[0].query_id, "f.jpg");
        assert_eq!(table.records()[0].candidate_id.as_deref(), Some("s.jpg"));
    }

    #[test]
    fn test_reference_missing_column_is_validation_error() {
        let csv = "film_photo,scene_photo,confidence_score\nf.jpg,s.jpg,0.8\n";
        let err = ReferenceTable::from_csv_str(csv).unwrap_err();
        match err {
            Error::Validation(msg) => assert!(msg.contains("confident_match")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_reference_rejects_bad_rows() {
        let bad_tier = "film_photo,scene_photo,confidence_score,confident_match\nf.jpg,s.jpg,0.8,2\n";
        assert!(matches!(ReferenceTable::from_csv_str(bad_tier), Err(Error::Validation(_))));

        let bad_score = "film_photo,scene_photo,confidence_score,confident_match\nf.jpg,s.jpg,high,1\n";
        assert!(matches!(ReferenceTable::from_csv_str(bad_score), Err(Error::Validation(_))));

        let no_candidate = "film_photo,scene_photo,confidence_score,confident_match\nf.jpg,,0.8,1\n";
        assert!(matches!(ReferenceTable::from_csv_str(no_candidate), Err(Error::Validation(_))));

        let duplicate = "film_photo,scene_photo,confidence_score,confident_match\nf.jpg,a.jpg,0.8,1\nf.jpg,b.jpg,0.9,1\n";
        assert!(matches!(ReferenceTable::from_csv_str(duplicate), Err(Error::Validation(_))));
    }

    #[test]
    fn test_empty_content_is_validation_error() {
        assert!(matches!(CsvTable::parse(""), Err(Error::Validation(_))));
    }

    #[test]
    fn test_header_only_is_empty_table() {
        let table = ReferenceTable::from_csv_str("film_photo,scene_photo,confidence_score,confident_match\n").unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_parse_mapping_skips_blank_rows() {
        let csv = "film_photo,scene_photo\r\nA.jpg,X.jpg\r\nB.jpg,\r\n,Y.jpg\r\n\r\nC.jpg,Z.jpg\r\n";
        let mapping = parse_mapping(csv).unwrap();
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.get("A.jpg").map(String::as_str), Some("X.jpg"));
        assert_eq!(mapping.get("C.jpg").map(String::as_str), Some("Z.jpg"));
    }

    #[test]
    fn test_parse_mapping_accepts_result_files() {
        let mapping = parse_mapping(RESULT_CSV).unwrap();
        // UNRESOLVED 行は scene_photo が空なので落ちる
        assert_eq!(mapping.len(), 2);
    }

    #[test]
    fn test_parse_mapping_missing_columns() {
        let err = parse_mapping("film,scene\nA,B\n").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_bom_is_ignored() {
        let mapping = parse_mapping("\u{feff}film_photo,scene_photo\nA,B\n").unwrap();
        assert_eq!(mapping.len(), 1);
    }

    #[test]
    fn test_records_to_csv_format() {
        let table = ReferenceTable::from_csv_str(RESULT_CSV).unwrap();
        let csv = records_to_csv(table.records());
        assert_eq!(csv, RESULT_CSV);
    }

    #[test]
    fn test_escape_field_with_comma() {
        let record = MatchRecord {
            query_id: "a,b.jpg".into(),
            candidate_id: Some("c.jpg".into()),
            score: 0.75,
            tier: ConfidenceTier::Confident,
        };
        let csv = records_to_csv([&record]);
        assert!(csv.contains("\"a,b.jpg\",c.jpg,0.750,1"));

        let table = ReferenceTable::from_csv_str(&csv).unwrap();
        assert_eq!(table.records()[0].query_id, "a,b.jpg");
    }

    #[test]
    fn test_newline_in_file_name_survives() {
        let record = MatchRecord {
            query_id: "roll\n01.jpg".into(),
            candidate_id: Some("scene \"a\".jpg".into()),
            score: 0.9,
            tier: ConfidenceTier::Confident,
        };
        let other = MatchRecord {
            query_id: "roll_02.jpg".into(),
            candidate_id: None,
            score: 0.0,
            tier: ConfidenceTier::Unresolved,
        };
        let csv = records_to_csv([&record, &other]);

        let table = ReferenceTable::from_csv_str(&csv).unwrap();
        assert_eq!(table.records().to_vec(), vec![record, other]);

        let mapping = parse_mapping(&csv).unwrap();
        assert_eq!(mapping.get("roll\n01.jpg").map(String::as_str), Some("scene \"a\".jpg"));
    }

    #[test]
    fn test_split_records_line_numbers() {
        let records = split_records("h1,h2\r\n\"a\nb\",c\r\nd,e");
        assert_eq!(records, vec![(1, "h1,h2"), (2, "\"a\nb\",c"), (4, "d,e")]);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = ReferenceTable::from_csv(Path::new("/nonexistent/results.csv")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = load_mapping(Path::new("/nonexistent/truth.csv")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
