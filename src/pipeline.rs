//! 推論パイプライン
//!
//! 読み込み済みモデル（ModelHandle）と画像から3クラスの確率分布を求めます。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::InferenceError;
use crate::preprocess::{prepare_input, ImageSample, InputTensor};
use crate::types::{ModelId, PredictionResult};

/// 推論バックエンドの共通インターフェース
///
/// 入力は `[1, H, W, 3]` (NHWC, 0..1)、出力は `CLASS_NAMES` 順の確率1行。
pub trait Classifier: Send + Sync {
    /// 期待する入力形状 `[batch, height, width, channels]`
    fn input_shape(&self) -> [usize; 4];

    /// 順伝播（softmax適用済みの確率を返す）
    fn forward(&self, input: &InputTensor) -> Result<Vec<f32>, InferenceError>;
}

/// 読み込み済みの分類モデル
///
/// クローンしても同じモデル実体を共有します。
#[derive(Clone)]
pub struct ModelHandle {
    id: ModelId,
    path: PathBuf,
    classifier: Arc<dyn Classifier>,
}

impl ModelHandle {
    pub fn new(id: ModelId, path: PathBuf, classifier: Arc<dyn Classifier>) -> Self {
        Self { id, path, classifier }
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn input_shape(&self) -> [usize; 4] {
        self.classifier.input_shape()
    }

    /// 入力解像度（正方形の一辺）
    pub fn input_size(&self) -> u32 {
        self.input_shape()[1] as u32
    }

    /// 同じモデル実体を指しているか
    pub fn shares_model_with(&self, other: &ModelHandle) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.classifier), Arc::as_ptr(&other.classifier))
    }

    pub fn predict(&self, sample: &ImageSample) -> Result<PredictionResult, InferenceError> {
        predict(sample, self)
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("input_shape", &self.input_shape())
            .finish()
    }
}

/// 画像を前処理してモデルに渡し、確率分布を返す
pub fn predict(sample: &ImageSample, handle: &ModelHandle) -> Result<PredictionResult, InferenceError> {
    let expected = handle.input_shape();
    let input = prepare_input(sample, handle.input_size())?;
    if input.shape() != expected {
        return Err(InferenceError::ShapeMismatch {
            expected: expected.to_vec(),
            actual: input.shape().to_vec(),
        });
    }

    let output = handle.classifier.forward(&input)?;
    let prediction = PredictionResult::from_slice(&output)?;
    tracing::debug!(model = %handle.id, probabilities = ?prediction.probabilities(), "推論完了");

    Ok(prediction)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::category::resolve_category;
    use image::{DynamicImage, Rgb, RgbImage};
    use parking_lot::Mutex;

    /// 固定の出力を返し、受け取った入力を記録するスタブ
    pub(crate) struct StubClassifier {
        pub shape: [usize; 4],
        pub output: Vec<f32>,
        pub last_input: Mutex<Option<InputTensor>>,
        pub calls: Mutex<usize>,
    }

    impl StubClassifier {
        pub(crate) fn new(output: Vec<f32>) -> Self {
            Self {
                shape: [1, 128, 128, 3],
                output,
                last_input: Mutex::new(None),
                calls: Mutex::new(0),
            }
        }
    }

    impl Classifier for StubClassifier {
        fn input_shape(&self) -> [usize; 4] {
            self.shape
        }

        fn forward(&self, input: &InputTensor) -> Result<Vec<f32>, InferenceError> {
            *self.calls.lock() += 1;
            *self.last_input.lock() = Some(input.clone());
            Ok(self.output.clone())
        }
    }

    pub(crate) fn gray_image(width: u32, height: u32) -> ImageSample {
        ImageSample::from(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            Rgb([128, 128, 128]),
        )))
    }

    fn handle_for(stub: Arc<StubClassifier>) -> ModelHandle {
        ModelHandle::new(ModelId::MobileNet, PathBuf::from("stub.tar.gz"), stub)
    }

    #[test]
    fn test_gray_image_end_to_end() {
        let stub = Arc::new(StubClassifier::new(vec![0.1, 0.7, 0.2]));
        let handle = handle_for(stub.clone());

        let prediction = predict(&gray_image(64, 64), &handle).unwrap();

        let input = stub.last_input.lock().clone().unwrap();
        assert_eq!(input.shape(), [1, 128, 128, 3]);
        let expected = 128.0 / 255.0;
        assert!(input
            .data()
            .iter()
            .all(|v| (v - expected).abs() < 1.0 / 255.0 + 1e-6 && (0.0..=1.0).contains(v)));

        let resolution = resolve_category(&prediction);
        assert_eq!(resolution.label, "light");
        assert_eq!(resolution.confidence_display(), "70.00%");
    }

    #[test]
    fn test_predict_is_deterministic() {
        let stub = Arc::new(StubClassifier::new(vec![0.25, 0.25, 0.5]));
        let handle = handle_for(stub.clone());
        let sample = gray_image(31, 77);

        let a = handle.predict(&sample).unwrap();
        let b = handle.predict(&sample).unwrap();
        assert_eq!((*a.probabilities()).map(f32::to_bits), (*b.probabilities()).map(f32::to_bits));
        assert_eq!(*stub.calls.lock(), 2);
    }

    #[test]
    fn test_wrong_output_length_is_shape_mismatch() {
        let stub = Arc::new(StubClassifier::new(vec![0.5, 0.5]));
        let err = predict(&gray_image(8, 8), &handle_for(stub)).unwrap_err();
        assert!(matches!(err, InferenceError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_wrong_input_shape_is_rejected_before_forward() {
        let mut stub = StubClassifier::new(vec![0.1, 0.7, 0.2]);
        stub.shape = [1, 128, 128, 1];
        let stub = Arc::new(stub);

        let err = predict(&gray_image(8, 8), &handle_for(stub.clone())).unwrap_err();
        assert!(matches!(err, InferenceError::ShapeMismatch { .. }));
        assert_eq!(*stub.calls.lock(), 0);
    }

    #[test]
    fn test_handle_clone_shares_model() {
        let handle = handle_for(Arc::new(StubClassifier::new(vec![1.0, 0.0, 0.0])));
        let other = handle_for(Arc::new(StubClassifier::new(vec![1.0, 0.0, 0.0])));

        assert!(handle.shares_model_with(&handle.clone()));
        assert!(!handle.shares_model_with(&other));
        assert_eq!(handle.input_size(), 128);
    }
}
