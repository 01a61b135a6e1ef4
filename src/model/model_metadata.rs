//! モデルメタデータの定義と永続化
//!
//! tar.gz形式のモデルバンドルに含まれる `metadata.json` の内容です。
//!
//! ## 入出力の取り決め
//! - 入力: 1 x 128 x 128 x 3 (NHWC), 値域 0.0..=1.0
//! - 出力: 1 x 3 の確率分布、ラベル順は ["dark", "light", "mid-light"]
//!
//! モデル本体はONNXグラフかBurnの重みのどちらかで、`format` に記録します。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::{CHANNELS, CLASS_NAMES, IMAGE_SIZE};

/// バンドルに格納されたモデルの形式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    /// ONNXグラフ（Kerasモデルから書き出したもの）
    #[default]
    Onnx,
    /// Burnの重みレコード（BinBytesRecorder形式）
    Burn,
}

impl ModelFormat {
    /// tar.gz内のエントリ名
    pub fn entry_name(&self) -> &'static str {
        match self {
            ModelFormat::Onnx => "model.onnx",
            ModelFormat::Burn => "model.bin",
        }
    }

    /// ファイルの拡張子から形式を推定（`.onnx` 以外はBurnの重みとみなす）
    pub fn from_path(path: &std::path::Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("onnx") => ModelFormat::Onnx,
            _ => ModelFormat::Burn,
        }
    }
}

impl std::fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelFormat::Onnx => write!(f, "ONNX"),
            ModelFormat::Burn => write!(f, "Burn"),
        }
    }
}

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.onnx または model.bin: モデル本体（`format` による）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// モデル名（例: "MobileNetV2"）
    pub model_name: String,

    /// クラスラベル（モデル出力のインデックス順）
    pub class_labels: Vec<String>,

    /// モデル入力画像の幅（ピクセル）
    pub input_width: u32,

    /// モデル入力画像の高さ（ピクセル）
    pub input_height: u32,

    /// 入力チャネル数
    #[serde(default = "default_channels")]
    pub input_channels: u32,

    /// モデル本体の形式
    #[serde(default)]
    pub format: ModelFormat,

    /// 変換元の成果物名（例: "MobileNet_best.h5"）
    #[serde(default)]
    pub source_artifact: Option<String>,

    /// バンドル作成時刻（ISO8601形式）
    pub created_at: String,
}

fn default_channels() -> u32 {
    CHANNELS as u32
}

impl ModelMetadata {
    /// 標準の入出力形状でメタデータを作成
    pub fn new(model_name: impl Into<String>, source_artifact: Option<String>) -> Self {
        Self {
            model_name: model_name.into(),
            class_labels: CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
            input_width: IMAGE_SIZE,
            input_height: IMAGE_SIZE,
            input_channels: CHANNELS as u32,
            format: ModelFormat::default(),
            source_artifact,
            created_at: chrono::Local::now().to_rfc3339(),
        }
    }

    pub fn with_format(mut self, format: ModelFormat) -> Self {
        self.format = format;
        self
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_standard_contract() {
        let metadata = ModelMetadata::new("MobileNet", Some("MobileNet_best.h5".into()));
        assert_eq!(metadata.class_labels, vec!["dark", "light", "mid-light"]);
        assert_eq!((metadata.input_width, metadata.input_height), (128, 128));
        assert_eq!(metadata.input_channels, 3);
    }

    #[test]
    fn test_channels_default_when_missing() {
        let json = r#"{
            "model_name": "MobileNet",
            "class_labels": ["dark", "light", "mid-light"],
            "input_width": 128,
            "input_height": 128,
            "created_at": "2025-01-01T00:00:00+07:00"
        }"#;
        let metadata = ModelMetadata::from_json_string(json).unwrap();
        assert_eq!(metadata.input_channels, 3);
        assert_eq!(metadata.format, ModelFormat::Onnx);
        assert_eq!(metadata.source_artifact, None);
    }

    #[test]
    fn test_format_from_path() {
        use std::path::Path;
        assert_eq!(ModelFormat::from_path(Path::new("MobileNet_best.onnx")), ModelFormat::Onnx);
        assert_eq!(ModelFormat::from_path(Path::new("export/NASNet.ONNX")), ModelFormat::Onnx);
        assert_eq!(ModelFormat::from_path(Path::new("model.bin")), ModelFormat::Burn);

        let json = ModelMetadata::new("MobileNet", None)
            .with_format(ModelFormat::Burn)
            .to_json_string()
            .unwrap();
        assert!(json.contains("\"format\": \"burn\""));
        assert_eq!(ModelMetadata::from_json_string(&json).unwrap().format, ModelFormat::Burn);
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(ModelMetadata::from_json_string("{\"model_name\": 1}").is_err());
    }
}
