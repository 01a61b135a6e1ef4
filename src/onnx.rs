//! ONNX Runtimeでの推論
//!
//! Kerasから書き出したグラフ（MobileNet / MobileNetV2 / NASNetMobile など）を
//! そのまま実行します。アーキテクチャはグラフ側が持つため、ここでは
//! 入出力形状のみを確認します。

use anyhow::Result;
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use parking_lot::Mutex;

use crate::error::InferenceError;
use crate::pipeline::Classifier;
use crate::preprocess::InputTensor;
use crate::types::NUM_CLASSES;

/// ONNXセッションを `Classifier` として扱うラッパー
pub struct OnnxClassifier {
    session: Mutex<Session>,
    output_name: String,
    input_shape: [usize; 4],
}

impl OnnxClassifier {
    /// メモリ上のONNXグラフを読み込む
    pub fn load(model_bytes: &[u8]) -> Result<Self> {
        tracing::info!("ONNXモデルを読み込みます ({} bytes)", model_bytes.len());

        let session = Session::builder()
            .map_err(|e| anyhow::anyhow!("セッションビルダーの作成に失敗しました: {}", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow::anyhow!("最適化レベルの設定に失敗しました: {}", e))?
            .commit_from_memory(model_bytes)
            .map_err(|e| anyhow::anyhow!("ONNXグラフの読み込みに失敗しました: {}", e))?;

        if session.inputs.len() != 1 {
            anyhow::bail!("入力が1つのグラフのみ対応しています (入力数: {})", session.inputs.len());
        }
        let input = &session.inputs[0];
        let input_dims: Vec<i64> = input
            .input_type
            .tensor_shape()
            .map(|shape| shape.iter().copied().collect())
            .ok_or_else(|| anyhow::anyhow!("入力 {} はテンソルではありません", input.name))?;
        let input_shape = resolve_input_shape(&input_dims).map_err(anyhow::Error::msg)?;

        let output = session
            .outputs
            .first()
            .ok_or_else(|| anyhow::anyhow!("グラフに出力が定義されていません"))?;
        if let Some(shape) = output.output_type.tensor_shape() {
            let output_dims: Vec<i64> = shape.iter().copied().collect();
            check_output_dims(&output_dims).map_err(anyhow::Error::msg)?;
        }
        let output_name = output.name.clone();

        tracing::debug!(input = ?input_dims, output = %output_name, "ONNXグラフの入出力");

        Ok(Self {
            session: Mutex::new(session),
            output_name,
            input_shape,
        })
    }
}

/// グラフの入力形状を `[1, H, W, C]` に解決する（可変次元のバッチは1とする）
fn resolve_input_shape(dims: &[i64]) -> Result<[usize; 4], String> {
    let [batch, height, width, channels]: [i64; 4] = dims
        .try_into()
        .map_err(|_| format!("入力は4次元(NHWC)である必要があります: {:?}", dims))?;

    if batch > 1 {
        return Err(format!("バッチサイズ1で実行できません: {:?}", dims));
    }
    if height <= 0 || width <= 0 || channels <= 0 {
        return Err(format!("入力の空間次元が固定されていません: {:?}", dims));
    }
    Ok([1, height as usize, width as usize, channels as usize])
}

/// 出力の最終次元がクラス数と一致するか（可変次元は実行時に確認）
fn check_output_dims(dims: &[i64]) -> Result<(), String> {
    match dims.last() {
        Some(&n) if n < 0 || n as usize == NUM_CLASSES => Ok(()),
        _ => Err(format!(
            "出力形状が不正です: {:?} (期待: [1, {}])",
            dims, NUM_CLASSES
        )),
    }
}

impl Classifier for OnnxClassifier {
    fn input_shape(&self) -> [usize; 4] {
        self.input_shape
    }

    fn forward(&self, input: &InputTensor) -> Result<Vec<f32>, InferenceError> {
        let [batch, height, width, channels] = input.shape();

        let array = Array4::<f32>::from_shape_vec((batch, height, width, channels), input.data().to_vec())
            .map_err(|e| InferenceError::Backend(format!("入力配列の作成エラー: {}", e)))?;
        let tensor = Tensor::from_array(array)
            .map_err(|e| InferenceError::Backend(format!("入力テンソルの作成エラー: {}", e)))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| InferenceError::Backend(format!("推論エラー: {}", e)))?;

        let output = outputs
            .get(&self.output_name)
            .ok_or_else(|| InferenceError::Backend(format!("出力 {} がありません", self.output_name)))?;
        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Backend(format!("出力の取得エラー: {}", e)))?;

        Ok(data.to_vec())
    }
}
