//! Burnバックエンドでの推論

use anyhow::Result;
use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{backend::Backend, Tensor},
};
use parking_lot::Mutex;

use crate::error::InferenceError;
use crate::ml::{ModelConfig, SkinToneClassifier};
use crate::model::InferenceConfig;
use crate::pipeline::Classifier;
use crate::preprocess::InputTensor;
use crate::types::CHANNELS;

/// Burnモデルを `Classifier` として扱うラッパー
pub struct BurnClassifier<B: Backend> {
    model: Mutex<SkinToneClassifier<B>>,
    image_size: usize,
    device: B::Device,
}

impl<B: Backend> BurnClassifier<B> {
    /// モデルの重み（BinBytesRecorder形式）を読み込んで初期化
    pub fn load(model_binary: Vec<u8>, config: &InferenceConfig, device: B::Device) -> Result<Self> {
        let model_config = ModelConfig::new(config.num_classes())
            .with_image_size(config.input_width as usize);
        let model = model_config.init::<B>(&device);

        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let record = recorder
            .load(model_binary, &device)
            .map_err(|e| anyhow::anyhow!("モデル重みの読み込みエラー: {:?}", e))?;

        Ok(Self::from_model(model.load_record(record), model_config.image_size, device))
    }

    pub fn from_model(model: SkinToneClassifier<B>, image_size: usize, device: B::Device) -> Self {
        Self {
            model: Mutex::new(model),
            image_size,
            device,
        }
    }
}

/// モデルの重みをバイト列に書き出す（バンドル作成用）
pub fn record_bytes<B: Backend>(model: SkinToneClassifier<B>) -> Result<Vec<u8>> {
    BinBytesRecorder::<FullPrecisionSettings>::default()
        .record(model.into_record(), ())
        .map_err(|e| anyhow::anyhow!("モデル重みの書き出しエラー: {:?}", e))
}

impl<B: Backend> Classifier for BurnClassifier<B>
where
    SkinToneClassifier<B>: Send,
{
    fn input_shape(&self) -> [usize; 4] {
        [1, self.image_size, self.image_size, CHANNELS]
    }

    fn forward(&self, input: &InputTensor) -> Result<Vec<f32>, InferenceError> {
        let [batch, height, width, channels] = input.shape();

        // NHWC -> NCHW
        let tensor = Tensor::<B, 1>::from_floats(input.data(), &self.device)
            .reshape([batch, height, width, channels])
            .permute([0, 3, 1, 2]);

        let probabilities = self.model.lock().predict_proba(tensor);

        probabilities
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| InferenceError::Backend(format!("推論結果の取得エラー: {:?}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelMetadata;
    use burn_ndarray::{NdArray, NdArrayDevice};

    fn random_classifier() -> BurnClassifier<NdArray> {
        let device = NdArrayDevice::default();
        let model = ModelConfig::standard().init::<NdArray>(&device);
        BurnClassifier::from_model(model, 128, device)
    }

    fn uniform_input(value: f32) -> InputTensor {
        InputTensor::new(vec![value; 128 * 128 * 3], [1, 128, 128, 3]).unwrap()
    }

    #[test]
    fn test_output_is_probability_distribution() {
        let classifier = random_classifier();
        let output = classifier.forward(&uniform_input(0.5)).unwrap();

        assert_eq!(output.len(), 3);
        assert!(output.iter().all(|p| *p >= 0.0));
        let sum: f32 = output.iter().sum();
        assert!((sum - 1.0).abs() < 1e-3, "sum = {}", sum);
    }

    #[test]
    fn test_forward_is_deterministic() {
        let classifier = random_classifier();
        let input = uniform_input(0.25);

        let a = classifier.forward(&input).unwrap();
        let b = classifier.forward(&input).unwrap();
        let bits = |v: &[f32]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn test_record_round_trip_preserves_outputs() {
        let device = NdArrayDevice::default();
        let model = ModelConfig::standard().init::<NdArray>(&device);
        let original = BurnClassifier::from_model(model.clone(), 128, device.clone());
        let bytes = record_bytes(model).unwrap();

        let config = InferenceConfig::from_metadata(&ModelMetadata::new("MobileNet", None));
        let restored = BurnClassifier::<NdArray>::load(bytes, &config, device).unwrap();

        let input = uniform_input(0.75);
        assert_eq!(original.forward(&input).unwrap(), restored.forward(&input).unwrap());
    }

    #[test]
    fn test_garbage_weights_fail_to_load() {
        let config = InferenceConfig::from_metadata(&ModelMetadata::new("MobileNet", None));
        let result = BurnClassifier::<NdArray>::load(vec![0u8; 16], &config, NdArrayDevice::default());
        assert!(result.is_err());
    }
}
