//! モデルの読み込みとキャッシュ
//!
//! モデル識別子ごとに1度だけ読み込み、以降は同じハンドルを返します。
//! 読み込みに失敗した場合もその結果を保持し、再読み込みは行いません。

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use crate::category::{resolve_category, CategoryResolution};
use crate::error::{AnalysisError, LoadError};
use crate::model::{load_bundle, AppConfig, DeviceType, InferenceConfig, ModelFormat, ModelMetadata, ModelSettings};
use crate::pipeline::{predict, Classifier, ModelHandle};
use crate::preprocess::{ImageSample, InputTensor};
use crate::types::{ModelId, PredictionResult, CHANNELS, IMAGE_SIZE, NUM_CLASSES};

/// モデルファイルから推論可能な分類器を作る
pub trait ModelLoader: Send + Sync {
    fn load(&self, id: ModelId, path: &Path) -> Result<Arc<dyn Classifier>, LoadError>;
}

/// モデルファイルを読み込むローダー
///
/// - `*.onnx`: ONNXグラフ単体（入出力は標準の取り決めとみなす）
/// - それ以外: tar.gzバンドル（metadata.json + model.onnx / model.bin）
#[derive(Debug, Clone, Copy, Default)]
pub struct BundleLoader {
    device_type: DeviceType,
}

fn incompatible(path: &Path, message: impl Into<String>) -> LoadError {
    LoadError::Incompatible {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

impl BundleLoader {
    pub fn new(device_type: DeviceType) -> Self {
        Self { device_type }
    }

    fn read_artifact(&self, id: ModelId, path: &Path) -> Result<(ModelMetadata, Vec<u8>), LoadError> {
        let unreadable = |message: String| LoadError::Unreadable {
            path: path.to_path_buf(),
            message,
        };

        if ModelFormat::from_path(path) == ModelFormat::Onnx {
            let model_binary = std::fs::read(path).map_err(|e| unreadable(e.to_string()))?;
            let source = path.file_name().map(|name| name.to_string_lossy().to_string());
            let metadata = ModelMetadata::new(id.as_str(), source).with_format(ModelFormat::Onnx);
            return Ok((metadata, model_binary));
        }

        load_bundle(path).map_err(|e| unreadable(format!("{:#}", e)))
    }

    fn build(
        &self,
        metadata: &ModelMetadata,
        model_binary: Vec<u8>,
        path: &Path,
    ) -> Result<Arc<dyn Classifier>, LoadError> {
        match metadata.format {
            ModelFormat::Onnx => self.build_onnx(&model_binary, path),
            ModelFormat::Burn => {
                self.build_burn(model_binary, &InferenceConfig::from_metadata(metadata), path)
            }
        }
    }

    #[cfg(feature = "onnx")]
    fn build_onnx(&self, model_binary: &[u8], path: &Path) -> Result<Arc<dyn Classifier>, LoadError> {
        use crate::onnx::OnnxClassifier;

        if self.device_type != DeviceType::Cpu {
            tracing::debug!("ONNXモデルはCPUで実行します (設定: {})", self.device_type);
        }
        OnnxClassifier::load(model_binary)
            .map(|c| Arc::new(c) as Arc<dyn Classifier>)
            .map_err(|e| incompatible(path, format!("{:#}", e)))
    }

    #[cfg(not(feature = "onnx"))]
    fn build_onnx(&self, _model_binary: &[u8], _path: &Path) -> Result<Arc<dyn Classifier>, LoadError> {
        Err(LoadError::BackendUnavailable(
            "ONNX機能が有効化されていません".to_string(),
        ))
    }

    #[cfg(feature = "ml")]
    fn build_burn(
        &self,
        model_binary: Vec<u8>,
        config: &InferenceConfig,
        path: &Path,
    ) -> Result<Arc<dyn Classifier>, LoadError> {
        use crate::ml::BurnClassifier;

        let classifier: anyhow::Result<Arc<dyn Classifier>> = match self.device_type {
            DeviceType::Cpu => BurnClassifier::<burn_ndarray::NdArray>::load(
                model_binary,
                config,
                burn_ndarray::NdArrayDevice::default(),
            )
            .map(|c| Arc::new(c) as Arc<dyn Classifier>),
            DeviceType::Wgpu => BurnClassifier::<burn::backend::Wgpu>::load(
                model_binary,
                config,
                burn_wgpu::WgpuDevice::default(),
            )
            .map(|c| Arc::new(c) as Arc<dyn Classifier>),
        };

        classifier.map_err(|e| incompatible(path, format!("{:#}", e)))
    }

    #[cfg(not(feature = "ml"))]
    fn build_burn(
        &self,
        _model_binary: Vec<u8>,
        _config: &InferenceConfig,
        _path: &Path,
    ) -> Result<Arc<dyn Classifier>, LoadError> {
        Err(LoadError::BackendUnavailable(
            "機械学習機能が有効化されていません".to_string(),
        ))
    }
}

impl ModelLoader for BundleLoader {
    fn load(&self, id: ModelId, path: &Path) -> Result<Arc<dyn Classifier>, LoadError> {
        if !path.is_file() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }

        let (metadata, model_binary) = self.read_artifact(id, path)?;

        InferenceConfig::from_metadata(&metadata)
            .validate()
            .map_err(|message| incompatible(path, message))?;

        if metadata.model_name != id.as_str() {
            tracing::warn!(
                "モデル名がメタデータと一致しません: {} (メタデータ: {})",
                id,
                metadata.model_name
            );
        }

        self.build(&metadata, model_binary, path)
    }
}

/// 読み込んだ分類器が入出力の取り決めを満たすか確認する
///
/// 入力形状を確認したあと、0で埋めた入力で1度だけ推論して出力の要素数を確かめます。
/// 重みの形状はメタデータからは分からないため、実際に実行して判断します。
pub fn verify_classifier(classifier: &dyn Classifier, path: &Path) -> Result<(), LoadError> {
    let expected = [1, IMAGE_SIZE as usize, IMAGE_SIZE as usize, CHANNELS];
    let actual = classifier.input_shape();
    if actual != expected {
        return Err(incompatible(
            path,
            format!("入力形状が不正です: {:?} (期待: {:?})", actual, expected),
        ));
    }

    let input = InputTensor::zeros(expected);
    let output = panic::catch_unwind(AssertUnwindSafe(|| classifier.forward(&input)))
        .map_err(|_| incompatible(path, "試験推論中にパニックが発生しました"))?
        .map_err(|e| incompatible(path, format!("試験推論に失敗しました: {}", e)))?;

    if output.len() != NUM_CLASSES {
        return Err(incompatible(
            path,
            format!("出力の要素数が不正です: {} (期待: {})", output.len(), NUM_CLASSES),
        ));
    }
    Ok(())
}

/// キャッシュ上のモデルの状態
#[derive(Debug, Clone, PartialEq)]
pub enum ModelStatus {
    NotLoaded,
    Ready,
    Failed(LoadError),
}

/// 解析結果（推論結果とカテゴリ解決）
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub model: ModelId,
    pub prediction: PredictionResult,
    pub resolution: CategoryResolution,
}

type LoadSlot = Arc<OnceLock<Result<ModelHandle, LoadError>>>;

/// モデル識別子 -> ハンドルのキャッシュ
///
/// 同じ識別子への同時要求は1回の読み込みにまとめられます。
/// 異なる識別子の読み込みは互いにブロックしません。
pub struct ModelRegistry {
    settings: ModelSettings,
    load_timeout: Duration,
    loader: Arc<dyn ModelLoader>,
    slots: Mutex<HashMap<ModelId, LoadSlot>>,
}

impl ModelRegistry {
    /// 設定に従ってバンドルローダーでレジストリを作成
    pub fn new(config: &AppConfig) -> Self {
        Self::with_loader(
            config.models.clone(),
            Arc::new(BundleLoader::new(config.device_type)),
        )
    }

    pub fn with_loader(settings: ModelSettings, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            load_timeout: settings.load_timeout(),
            settings,
            loader,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn artifact_path(&self, id: ModelId) -> PathBuf {
        self.settings.artifact_path(id)
    }

    /// モデル名で読み込む（未知の名前は `LoadError::UnknownModel`）
    pub fn load_model(&self, name: &str) -> Result<ModelHandle, LoadError> {
        let id: ModelId = name.parse()?;
        self.load(id)
    }

    /// モデルを読み込む（読み込み済み・失敗済みならキャッシュを返す）
    pub fn load(&self, id: ModelId) -> Result<ModelHandle, LoadError> {
        let slot = self.slot(id);

        let mut loaded_now = false;
        let result = slot.get_or_init(|| {
            loaded_now = true;
            self.load_uncached(id)
        });

        if !loaded_now {
            if let Err(e) = result {
                tracing::warn!("{} は以前の読み込みに失敗しています: {}", id, e);
            }
        }

        result.clone()
    }

    pub fn status(&self, id: ModelId) -> ModelStatus {
        let slots = self.slots.lock();
        match slots.get(&id).and_then(|slot| slot.get()) {
            None => ModelStatus::NotLoaded,
            Some(Ok(_)) => ModelStatus::Ready,
            Some(Err(e)) => ModelStatus::Failed(e.clone()),
        }
    }

    /// モデル読み込み → 推論 → カテゴリ解決をまとめて行う
    ///
    /// モデルが利用できない場合は推論を行わずに `ModelUnavailable` を返します。
    pub fn analyze(&self, name: &str, sample: &ImageSample) -> Result<Analysis, AnalysisError> {
        let handle = self.load_model(name)?;
        let prediction = predict(sample, &handle)?;
        let resolution = resolve_category(&prediction);

        tracing::info!(
            model = %handle.id(),
            label = resolution.label,
            confidence = %resolution.confidence_display(),
            "解析完了"
        );

        Ok(Analysis {
            model: handle.id(),
            prediction,
            resolution,
        })
    }

    fn slot(&self, id: ModelId) -> LoadSlot {
        Arc::clone(self.slots.lock().entry(id).or_default())
    }

    fn load_uncached(&self, id: ModelId) -> Result<ModelHandle, LoadError> {
        let path = self.artifact_path(id);
        tracing::info!("モデルを読み込みます: {} ({})", id, path.display());
        let started = Instant::now();

        let result = self
            .load_with_timeout(id, path.clone())
            .map(|classifier| ModelHandle::new(id, path, classifier));

        match &result {
            Ok(_) => tracing::info!(
                "モデルを読み込みました: {} ({:.2?})",
                id,
                started.elapsed()
            ),
            Err(e) => tracing::warn!("モデルの読み込みに失敗しました: {}", e),
        }

        result
    }

    /// 別スレッドで読み込みと取り決めの確認を行い、制限時間を超えたら待つのをやめる
    fn load_with_timeout(&self, id: ModelId, path: PathBuf) -> Result<Arc<dyn Classifier>, LoadError> {
        let (tx, rx) = mpsc::channel();
        let loader = Arc::clone(&self.loader);

        thread::Builder::new()
            .name(format!("model-load-{}", id))
            .spawn(move || {
                let result = loader.load(id, &path).and_then(|classifier| {
                    verify_classifier(classifier.as_ref(), &path)?;
                    Ok(classifier)
                });
                let _ = tx.send(result);
            })
            .map_err(|e| {
                LoadError::BackendUnavailable(format!("読み込みスレッドを起動できません: {}", e))
            })?;

        match rx.recv_timeout(self.load_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(LoadError::Timeout {
                model: id.to_string(),
                timeout: self.load_timeout,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(LoadError::Aborted {
                model: id.to_string(),
            }),
        }
    }
}
