//! モデルバンドルの永続化
//!
//! Tar.gz形式でモデルの重みとメタデータを1ファイルに統合して保存・読み込みします。
//!
//! ファイル構成（tar.gz内部）:
//! - metadata.json   - メタデータ（ラベル順、入力形状、モデル形式など）
//! - model.onnx      - ONNXグラフ（`format: onnx`）
//! - model.bin       - Burnの重み（`format: burn`）

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};

use crate::model::model_metadata::ModelMetadata;

const METADATA_ENTRY: &str = "metadata.json";

/// メタデータと共にモデルをTar.gz形式で保存
///
/// 保存先のパスを返します（拡張子が.gzでなければ.tar.gzを付与）。
pub fn save_bundle(output_path: &Path, metadata: &ModelMetadata, model_binary: &[u8]) -> Result<PathBuf> {
    let tar_gz_path = if output_path.extension().and_then(|s| s.to_str()) == Some("gz") {
        output_path.to_path_buf()
    } else {
        output_path.with_extension("tar.gz")
    };

    if let Some(parent) = tar_gz_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create parent directory: {:?}", parent))?;
        }
    }

    let tar_gz_file = File::create(&tar_gz_path)
        .with_context(|| format!("Failed to create tar.gz file: {:?}", tar_gz_path))?;

    let encoder = GzEncoder::new(tar_gz_file, Compression::default());
    let mut tar_builder = Builder::new(encoder);

    let json_str = metadata.to_json_string()?;
    append_entry(&mut tar_builder, METADATA_ENTRY, json_str.as_bytes())?;
    append_entry(&mut tar_builder, metadata.format.entry_name(), model_binary)?;

    tar_builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .context("Failed to finalize tar.gz archive")?;

    Ok(tar_gz_path)
}

fn append_entry<W: std::io::Write>(builder: &mut Builder<W>, name: &str, bytes: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append(&header, bytes)
        .with_context(|| format!("Failed to add {} to tar", name))
}

fn open_archive(tar_gz_path: &Path) -> Result<Archive<GzDecoder<File>>> {
    let tar_gz_file = File::open(tar_gz_path)
        .with_context(|| format!("Failed to open tar.gz file: {:?}", tar_gz_path))?;
    Ok(Archive::new(GzDecoder::new(tar_gz_file)))
}

/// Tar.gzからモデルメタデータのみを読み込む
pub fn load_metadata(tar_gz_path: &Path) -> Result<ModelMetadata> {
    let mut archive = open_archive(tar_gz_path)?;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?;

        if path.to_str() == Some(METADATA_ENTRY) {
            let mut json_str = String::new();
            entry.read_to_string(&mut json_str)?;
            return ModelMetadata::from_json_string(&json_str);
        }
    }

    Err(anyhow::anyhow!("metadata.json not found in tar.gz archive"))
}

/// メタデータとモデルバイナリを共に読み込む
///
/// モデル本体は `metadata.format` に対応するエントリから取り出します。
pub fn load_bundle(tar_gz_path: &Path) -> Result<(ModelMetadata, Vec<u8>)> {
    let mut archive = open_archive(tar_gz_path)?;

    let mut metadata_opt: Option<ModelMetadata> = None;
    let mut payloads: Vec<(String, Vec<u8>)> = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().to_string();

        if name == METADATA_ENTRY {
            let mut json_str = String::new();
            entry.read_to_string(&mut json_str)?;
            metadata_opt = Some(ModelMetadata::from_json_string(&json_str)?);
        } else if name.starts_with("model.") {
            let mut buffer = Vec::new();
            entry.read_to_end(&mut buffer)?;
            payloads.push((name, buffer));
        }
    }

    let metadata =
        metadata_opt.ok_or_else(|| anyhow::anyhow!("metadata.json not found in tar.gz archive"))?;
    let entry_name = metadata.format.entry_name();
    let binary = payloads
        .into_iter()
        .find(|(name, _)| name == entry_name)
        .map(|(_, binary)| binary)
        .ok_or_else(|| anyhow::anyhow!("{} not found in tar.gz archive", entry_name))?;

    Ok((metadata, binary))
}

/// メタデータをコンソールに表示
pub fn print_metadata_info(metadata: &ModelMetadata) {
    println!("\n=== モデルメタデータ ===");
    println!("モデル名: {}", metadata.model_name);
    println!("クラスラベル: {}", metadata.class_labels.join(", "));
    println!(
        "入力サイズ: {}x{}x{}",
        metadata.input_width, metadata.input_height, metadata.input_channels
    );
    println!("形式: {}", metadata.format);
    if let Some(ref source) = metadata.source_artifact {
        println!("変換元: {}", source);
    }
    println!("作成日時: {}", metadata.created_at);
    println!("========================");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = ModelMetadata::new("MobileNetV2", Some("MobileNetV2_best.h5".into()));
        let weights = vec![1u8, 2, 3, 4, 5];

        let path = save_bundle(&dir.path().join("MobileNetV2_best"), &metadata, &weights).unwrap();
        assert!(path.to_string_lossy().ends_with("MobileNetV2_best.tar.gz"));

        let (loaded, binary) = load_bundle(&path).unwrap();
        assert_eq!(loaded, metadata);
        assert_eq!(binary, weights);
        assert_eq!(load_metadata(&path).unwrap(), metadata);
    }

    #[test]
    fn test_missing_weights_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.tar.gz");

        let file = File::create(&path).unwrap();
        let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
        let json = ModelMetadata::new("MobileNet", None).to_json_string().unwrap();
        append_entry(&mut builder, METADATA_ENTRY, json.as_bytes()).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let err = load_bundle(&path).unwrap_err();
        assert!(err.to_string().contains("model.onnx not found"));
    }

    #[test]
    fn test_payload_follows_declared_format() {
        use crate::model::ModelFormat;

        let dir = tempfile::tempdir().unwrap();
        let metadata = ModelMetadata::new("NASNetMobile", None).with_format(ModelFormat::Burn);
        let path = save_bundle(&dir.path().join("NASNetMobile_best.tar.gz"), &metadata, &[7u8; 4]).unwrap();

        let (loaded, binary) = load_bundle(&path).unwrap();
        assert_eq!(loaded.format, ModelFormat::Burn);
        assert_eq!(binary, vec![7u8; 4]);

        // ONNXと宣言しているのにmodel.binしか無い
        let path = dir.path().join("mismatch.tar.gz");
        let file = File::create(&path).unwrap();
        let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
        let json = ModelMetadata::new("NASNetMobile", None).to_json_string().unwrap();
        append_entry(&mut builder, METADATA_ENTRY, json.as_bytes()).unwrap();
        append_entry(&mut builder, "model.bin", &[7u8; 4]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        assert!(load_bundle(&path).unwrap_err().to_string().contains("model.onnx not found"));
    }

    #[test]
    fn test_not_a_gzip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("MobileNet_best.tar.gz");
        std::fs::write(&path, b"HDF5 is not a tarball").unwrap();

        assert!(load_bundle(&path).is_err());
    }
}
