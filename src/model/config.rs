//! アプリケーション設定管理モジュール
//!
//! 計算デバイスやモデルファイルの配置などをJSON形式で保存・読み込みします。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::ModelId;

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeviceType {
    /// NdArray (CPU) バックエンド
    Cpu,
    /// WGPU (GPU) バックエンド
    Wgpu,
}

impl Default for DeviceType {
    fn default() -> Self {
        DeviceType::Cpu
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
        }
    }
}

/// モデル設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// モデルバンドルを置くディレクトリ
    #[serde(default = "default_model_dir")]
    pub model_dir: String,
    /// モデルごとのファイル名（未指定なら `<モデル名>_best.tar.gz`）
    #[serde(default)]
    pub files: BTreeMap<ModelId, String>,
    /// 既定で使うモデル
    #[serde(default)]
    pub default_model: ModelId,
    /// 読み込みの制限時間（秒）
    #[serde(default = "default_load_timeout_secs")]
    pub load_timeout_secs: u64,
}

fn default_model_dir() -> String {
    "models".to_string()
}

fn default_load_timeout_secs() -> u64 {
    60
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            files: ModelId::ALL
                .into_iter()
                .map(|id| (id, id.default_file_name()))
                .collect(),
            default_model: ModelId::default(),
            load_timeout_secs: default_load_timeout_secs(),
        }
    }
}

impl ModelSettings {
    /// モデル識別子からファイルパスを解決
    pub fn artifact_path(&self, id: ModelId) -> PathBuf {
        let file_name = self
            .files
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.default_file_name());
        Path::new(&self.model_dir).join(file_name)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 計算デバイスの種類
    #[serde(default)]
    pub device_type: DeviceType,
    /// モデル設定
    #[serde(default)]
    pub models: ModelSettings,
    /// 最後に解析した画像のパス
    #[serde(default)]
    pub last_image_path: Option<String>,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 設定を読み込む、存在しないか壊れている場合はデフォルト設定を返す
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if path.exists() {
            match Self::load(path) {
                Ok(config) => {
                    tracing::info!("設定ファイルを読み込みました: {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "設定ファイルの読み込みに失敗しました ({}): {}。デフォルト設定を使用します",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            }
        } else {
            tracing::info!("設定ファイルが存在しません。デフォルト設定を使用します");
            Self::default()
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 計算デバイスを設定
    pub fn set_device_type(&mut self, device_type: DeviceType) {
        self.device_type = device_type;
    }

    /// 最後に解析した画像のパスを更新
    pub fn update_last_image_path<P: AsRef<Path>>(&mut self, path: P) {
        self.last_image_path = Some(path.as_ref().to_string_lossy().to_string());
    }

    /// 設定情報を表示
    pub fn display(&self) {
        println!("=== アプリケーション設定 ===");
        println!("計算デバイス: {}", self.device_type);
        println!("モデルディレクトリ: {}", self.models.model_dir);
        println!("既定モデル: {}", self.models.default_model);
        println!("読み込み制限時間: {}秒", self.models.load_timeout_secs);
        for id in ModelId::ALL {
            println!("  {}: {}", id, self.models.artifact_path(id).display());
        }
        if let Some(ref image) = self.last_image_path {
            println!("\n最後に解析した画像: {}", image);
        }
        println!("========================\n");
    }
}
