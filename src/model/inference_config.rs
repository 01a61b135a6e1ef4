//! モデルメタデータから推論に必要な情報を取り出し、入出力の取り決めを検証します。

use crate::model::model_metadata::ModelMetadata;
use crate::types::{CHANNELS, CLASS_NAMES, IMAGE_SIZE, NUM_CLASSES};

/// モデルメタデータから得た推論用情報
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    /// クラスラベル（モデル出力のインデックス順）
    pub class_labels: Vec<String>,

    /// モデル入力解像度
    pub input_width: u32,
    pub input_height: u32,
    pub input_channels: u32,
}

impl InferenceConfig {
    /// メタデータからInferenceConfigを作成
    pub fn from_metadata(metadata: &ModelMetadata) -> Self {
        Self {
            class_labels: metadata.class_labels.clone(),
            input_width: metadata.input_width,
            input_height: metadata.input_height,
            input_channels: metadata.input_channels,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.class_labels.len()
    }

    /// クラスインデックスからラベルを取得
    pub fn class_index_to_label(&self, index: usize) -> Option<&str> {
        self.class_labels.get(index).map(String::as_str)
    }

    /// 128x128x3入力・3クラス出力（ラベル順も一致）であることを検証
    ///
    /// ラベル順が異なるモデルは出力の解釈が変わるため、並べ替えずに拒否します。
    pub fn validate(&self) -> Result<(), String> {
        if self.input_width != IMAGE_SIZE || self.input_height != IMAGE_SIZE {
            return Err(format!(
                "入力サイズが不正です: {}x{} (期待: {}x{})",
                self.input_width, self.input_height, IMAGE_SIZE, IMAGE_SIZE
            ));
        }
        if self.input_channels as usize != CHANNELS {
            return Err(format!(
                "入力チャネル数が不正です: {} (期待: {})",
                self.input_channels, CHANNELS
            ));
        }
        let labels_match = self.num_classes() == NUM_CLASSES
            && CLASS_NAMES
                .iter()
                .enumerate()
                .all(|(i, name)| self.class_index_to_label(i) == Some(*name));
        if !labels_match {
            return Err(format!(
                "クラスラベルが一致しません: [{}] (期待: [{}])",
                self.class_labels.join(", "),
                CLASS_NAMES.join(", ")
            ));
        }
        Ok(())
    }
}
