use clap::{Parser, Subcommand};
use crate::scoring_mode::ScoringMode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scene-sync")]
#[command(about = "フィルム写真と現場写真の照合ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// フィルム写真を現場写真と照合して結果CSVを出力
    Match {
        /// フィルム写真のフォルダ
        #[arg(long)]
        film_folder: PathBuf,

        /// 現場写真のフォルダ
        #[arg(long)]
        scene_folder: PathBuf,

        /// 出力CSVファイル（デフォルト: 設定の output）
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 1枚あたりの最大特徴点数
        #[arg(long)]
        max_features: Option<usize>,

        /// legacy 方式で平均に使う上位割合（0.0-1.0）
        #[arg(long)]
        good_match_percent: Option<f64>,

        /// ratio 方式の比率閾値（0.0-1.0）
        #[arg(long)]
        ratio_threshold: Option<f64>,

        /// スコア算出方式 (legacy/ratio)
        #[arg(long)]
        scoring: Option<ScoringMode>,

        /// 前回の結果CSV（CONFIDENT の行を引き継いで照合対象から除外）
        #[arg(short, long)]
        reference: Option<PathBuf>,
    },

    /// 照合結果を正解データと比較
    Verify {
        /// 照合結果CSV
        #[arg(long)]
        results: PathBuf,

        /// 正解CSV
        #[arg(long)]
        truth: PathBuf,

        /// 検証結果をJSONでも保存
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// 画像を含むサブフォルダを一覧表示
    ListFolders {
        /// フィルム写真の親フォルダ
        #[arg(long, default_value = "film-photos")]
        film_base: PathBuf,

        /// 現場写真の親フォルダ
        #[arg(long, default_value = "scene-info")]
        scene_base: PathBuf,
    },

    /// 作業用フォルダを作成
    SetupDirectories {
        /// フィルム写真の親フォルダ
        #[arg(long, default_value = "film-photos")]
        film_base: PathBuf,

        /// 現場写真の親フォルダ
        #[arg(long, default_value = "scene-info")]
        scene_base: PathBuf,

        /// 出力フォルダ
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
    },

    /// フォルダ内の画像を確認
    ValidateFolder {
        /// 確認するフォルダ
        #[arg(long)]
        folder: PathBuf,
    },

    /// 設定を表示/初期化
    Config {
        /// 設定を表示
        #[arg(long)]
        show: bool,

        /// デフォルト設定を書き出す
        #[arg(long)]
        init: bool,
    },
}
