//! 肌色解析のコマンドラインツール
//!
//! 画像ファイルを解析してカテゴリ・信頼度・ケアの推奨を表示します。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use skin_tone_analyzer::model::{load_metadata, print_metadata_info, save_bundle};
use skin_tone_analyzer::registry::verify_classifier;
use skin_tone_analyzer::{
    AnalysisError, Analysis, AppConfig, BundleLoader, DeviceType, ImageSample, ModelFormat, ModelId,
    ModelLoader, ModelMetadata, ModelRegistry, ModelStatus, DISCLAIMER,
};

#[derive(Parser, Debug)]
#[command(name = "skin-analyzer")]
#[command(about = "学習済みモデルによる肌色解析", long_about = None)]
struct Cli {
    /// 設定ファイルのパス
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// 詳細ログを出力
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 画像を解析する
    Analyze {
        /// 画像ファイル（jpg / jpeg / png）
        image: PathBuf,
        /// 使用するモデル（MobileNet / MobileNetV2 / NASNetMobile）
        #[arg(short, long)]
        model: Option<String>,
        /// 結果をJSONで出力
        #[arg(long)]
        json: bool,
    },
    /// モデル一覧と読み込み可否を表示する
    Models,
    /// モデルバンドルのメタデータを表示する
    Inspect {
        bundle: PathBuf,
    },
    /// モデル本体（ONNXグラフまたはBurnの重み）をバンドルにまとめる
    Pack {
        /// ONNXファイル（*.onnx）またはBinBytesRecorder形式の重みファイル
        #[arg(long)]
        weights: PathBuf,
        /// モデル形式（onnx / burn、省略時は拡張子から判定）
        #[arg(long)]
        format: Option<String>,
        /// モデル名
        #[arg(short, long)]
        model: String,
        /// 出力先（省略時は設定のモデルディレクトリ）
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// 変換元の成果物名（例: MobileNet_best.h5）
        #[arg(long)]
        source: Option<String>,
    },
    /// 設定を表示する
    Config {
        /// 現在の設定をファイルに書き出す
        #[arg(long)]
        write: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = AppConfig::load_or_default(&cli.config);

    match cli.command {
        Command::Analyze { image, model, json } => {
            let model_name = model.unwrap_or_else(|| config.models.default_model.to_string());
            let registry = ModelRegistry::new(&config);

            let analysis = ImageSample::open(&image)
                .map_err(AnalysisError::from)
                .and_then(|sample| registry.analyze(&model_name, &sample));

            let analysis = match analysis {
                Ok(analysis) => analysis,
                Err(AnalysisError::ModelUnavailable(e)) => {
                    eprintln!("モデルを読み込めません。別のモデルを選択してください: {}", e);
                    return Err(AnalysisError::ModelUnavailable(e).into());
                }
                Err(AnalysisError::UnprocessableImage(e)) => {
                    eprintln!("この画像は処理できません: {}", e);
                    return Err(AnalysisError::UnprocessableImage(e).into());
                }
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
            } else {
                print_report(&analysis, &image);
            }

            config.update_last_image_path(&image);
            if let Err(e) = config.save(&cli.config) {
                tracing::warn!("設定ファイルを保存できません: {}", e);
            }
        }
        Command::Models => {
            let registry = ModelRegistry::new(&config);
            println!("=== モデル一覧 ===");
            for id in ModelId::ALL {
                let marker = if id == config.models.default_model { "*" } else { " " };
                let _ = registry.load(id);
                let status = match registry.status(id) {
                    ModelStatus::Ready => "利用可能".to_string(),
                    ModelStatus::Failed(e) => format!("利用不可 ({})", e),
                    ModelStatus::NotLoaded => "未読み込み".to_string(),
                };
                println!(
                    "{} {:<13} {} [{}]",
                    marker,
                    id,
                    registry.artifact_path(id).display(),
                    status
                );
            }
        }
        Command::Inspect { bundle } => {
            let metadata = load_metadata(&bundle)
                .with_context(|| format!("メタデータ読み込みエラー: {}", bundle.display()))?;
            print_metadata_info(&metadata);
        }
        Command::Pack { weights, format, model, out, source } => {
            let id: ModelId = model.parse()?;
            let format = match format {
                Some(name) => parse_format(&name)?,
                None => ModelFormat::from_path(&weights),
            };
            let out = out.unwrap_or_else(|| config.models.artifact_path(id));

            let metadata = ModelMetadata::new(id.as_str(), source).with_format(format);
            let path = pack_bundle(&weights, &out, &metadata, id, config.device_type)?;

            println!("バンドルを作成しました: {}", path.display());
            print_metadata_info(&metadata);
        }
        Command::Config { write } => {
            config.display();
            if write {
                config
                    .save(&cli.config)
                    .with_context(|| format!("設定ファイルを保存できません: {}", cli.config.display()))?;
                println!("設定ファイルを保存しました: {}", cli.config.display());
            }
        }
    }

    Ok(())
}

fn parse_format(name: &str) -> Result<ModelFormat> {
    match name.to_ascii_lowercase().as_str() {
        "onnx" => Ok(ModelFormat::Onnx),
        "burn" => Ok(ModelFormat::Burn),
        other => anyhow::bail!("未知のモデル形式です: {} (onnx / burn)", other),
    }
}

/// バンドルを作成し、実際に読み込めることを確認する
///
/// 確認に失敗した場合は作成したファイルを削除してエラーを返します。
fn pack_bundle(
    weights: &Path,
    out: &Path,
    metadata: &ModelMetadata,
    id: ModelId,
    device_type: DeviceType,
) -> Result<PathBuf> {
    let model_binary = std::fs::read(weights)
        .with_context(|| format!("重みファイルを読み込めません: {}", weights.display()))?;
    let path = save_bundle(out, metadata, &model_binary)?;

    let verified = BundleLoader::new(device_type)
        .load(id, &path)
        .and_then(|classifier| verify_classifier(classifier.as_ref(), &path));

    if let Err(e) = verified {
        if let Err(remove_err) = std::fs::remove_file(&path) {
            tracing::warn!("作成したバンドルを削除できません: {}", remove_err);
        }
        return Err(anyhow::Error::new(e).context("作成したバンドルを読み込めないため破棄しました"));
    }

    Ok(path)
}

fn print_report(analysis: &Analysis, image: &Path) {
    let resolution = &analysis.resolution;

    println!("\n=== 肌色解析レポート ===");
    println!("画像: {}", image.display());
    println!("モデル: {}", analysis.model);
    println!("結果: {}", resolution.info.display_name);
    println!(
        "信頼度: {} {}",
        confidence_bar(resolution.confidence_percent, 20),
        resolution.confidence_display()
    );

    println!("\n--- 説明 ---");
    println!("{}", resolution.info.description);
    println!("\n--- おすすめのケア ---");
    println!("{}", resolution.info.recommendation);

    println!("\n--- 各クラスの確率 ---");
    for (tone, probability) in analysis.prediction.iter() {
        let info = skin_tone_analyzer::CategoryInfo::of(tone);
        println!("{}: {:.2}%", info.display_name, probability * 100.0);
    }

    println!("\n注意: {}", DISCLAIMER);
}

fn confidence_bar(percent: f32, width: usize) -> String {
    let filled = ((percent / 100.0) * width as f32).round().clamp(0.0, width as f32) as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("skin_tone_analyzer=debug,skin_analyzer=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("skin_tone_analyzer=warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
