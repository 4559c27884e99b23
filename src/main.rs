use anyhow::Context;
use clap::Parser;
use scene_sync::{cli, config, error, pipeline, report, scanner};
use scene_sync_common::table::load_mapping;
use scene_sync_common::verify;
use cli::{Cli, Commands};
use config::Config;
use error::SceneSyncError;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// validate-folder で表示するファイル名の件数
const PREVIEW_FILES: usize = 10;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Match {
            film_folder,
            scene_folder,
            output,
            max_features,
            good_match_percent,
            ratio_threshold,
            scoring,
            reference,
        } => {
            println!("🎞  scene-sync - 写真照合\n");

            ensure_folder(&film_folder)?;
            ensure_folder(&scene_folder)?;

            // コマンドライン指定で設定を上書き（今回の実行のみ）
            let mut config = load_config()?;
            if let Some(v) = max_features {
                config.max_features = v;
            }
            if let Some(v) = good_match_percent {
                config.good_match_percent = v;
            }
            if let Some(v) = ratio_threshold {
                config.ratio_threshold = v;
            }
            if let Some(v) = scoring {
                config.scoring = v;
            }
            if let Some(v) = output {
                config.output = v;
            }
            if reference.is_some() {
                config.reference_table = reference;
            }
            config.validate()?;

            let options = pipeline::MatchOptions {
                film_folder,
                scene_folder,
                output: config.output.clone(),
                policy: config.policy(),
                extract: config.extract_params(),
                timeout: config.timeout(),
                reference: config.reference_table.clone(),
                show_progress: !cli.verbose,
            };

            println!("[1/3] 写真をスキャン中...");
            if let Some(path) = &options.reference {
                println!("  参照テーブル: {}", path.display());
            }
            println!("  スコア方式: {}", config.scoring);

            println!("[2/3] 特徴量を照合中...");
            let summary = pipeline::run_matching(&options)?;
            println!("✔ 照合完了\n");

            println!("[3/3] 結果:");
            report::print_match_summary(&summary, &options.output);

            println!("\n✅ 完了");
        }

        Commands::Verify { results, truth, json } => {
            println!("🔍 scene-sync - 検証\n");

            let result_mapping = load_mapping(&results)
                .with_context(|| format!("結果ファイルを読み込めません: {}", results.display()))?;
            let truth_mapping = load_mapping(&truth)
                .with_context(|| format!("正解ファイルを読み込めません: {}", truth.display()))?;

            let verification = verify(&result_mapping, &truth_mapping);
            report::print_verification_report(&verification);

            if let Some(json_path) = json {
                report::write_verification_json(&verification, &results, &truth, &json_path)?;
                println!("✔ 検証結果を保存: {}", json_path.display());
            }
        }

        Commands::ListFolders { film_base, scene_base } => {
            print_folders("フィルム写真", &film_base);
            println!();
            print_folders("現場写真", &scene_base);
        }

        Commands::SetupDirectories {
            film_base,
            scene_base,
            output_dir,
        } => {
            for dir in [&film_base, &scene_base, &output_dir] {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("フォルダを作成できません: {}", dir.display()))?;
                println!("✔ {}", dir.display());
            }
            println!("\n✅ フォルダの準備ができました");
        }

        Commands::ValidateFolder { folder } => {
            ensure_folder(&folder)?;

            let images = scanner::list_images(&folder);
            if images.is_empty() {
                return Err(SceneSyncError::NoImagesFound(folder.display().to_string()).into());
            }

            println!("フォルダ: {}", folder.display());
            println!("  画像: {}枚", images.len());
            println!("  対応形式: {}", scanner::SUPPORTED_EXTENSIONS.join(", "));
            for image in images.iter().take(PREVIEW_FILES) {
                println!("    - {}", image.file_name);
            }
            if images.len() > PREVIEW_FILES {
                println!("    ... and {} more", images.len() - PREVIEW_FILES);
            }
        }

        Commands::Config { show, init } => {
            // --init は壊れた設定ファイルも読まずに上書きする
            let config = if init {
                let path = Config::config_path()?;
                let config = Config::init_at(&path)?;
                println!("✔ デフォルト設定を保存: {}", path.display());
                config
            } else {
                load_config()?
            };

            if show || !init {
                println!("設定:");
                println!("  最大特徴点数: {}", config.max_features);
                println!("  good_match_percent: {}", config.good_match_percent);
                println!("  ratio_threshold: {}", config.ratio_threshold);
                println!("  スコア方式: {}", config.scoring);
                println!(
                    "  参照テーブル: {}",
                    config
                        .reference_table
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "未設定".to_string())
                );
                println!("  最大画像サイズ: {}px", config.max_image_size);
                println!("  タイムアウト: {}秒", config.timeout_seconds);
                println!("  出力: {}", config.output.display());
            }
        }
    }

    Ok(())
}

/// RUST_LOG があればそれに従い、なければ --verbose で debug にする
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config() -> anyhow::Result<Config> {
    Config::load().context("設定ファイルを読み込めません（config --init で初期化できます）")
}

fn ensure_folder(folder: &Path) -> error::Result<()> {
    if folder.is_dir() {
        Ok(())
    } else {
        Err(SceneSyncError::FolderNotFound(folder.display().to_string()))
    }
}

fn print_folders(label: &str, base: &Path) {
    let folders = scanner::list_image_folders(base);
    println!("{} ({}):", label, base.display());
    if folders.is_empty() {
        println!("  （画像を含むフォルダはありません）");
    }
    for name in folders {
        println!("  - {}", name);
    }
}
