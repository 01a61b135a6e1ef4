//! 共通の型と定数
//!
//! クラスラベル・モデル識別子・推論結果を定義します。

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{InferenceError, LoadError};

/// クラス名の定義（モデル出力のインデックス順）
pub const CLASS_NAMES: [&str; 3] = ["dark", "light", "mid-light"];

/// クラス数
pub const NUM_CLASSES: usize = CLASS_NAMES.len();

/// モデル入力サイズ（正方形）
pub const IMAGE_SIZE: u32 = 128;

/// 入力チャネル数（RGB）
pub const CHANNELS: usize = 3;

/// 選択可能なモデル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelId {
    MobileNet,
    MobileNetV2,
    NASNetMobile,
}

impl ModelId {
    pub const ALL: [ModelId; 3] = [ModelId::MobileNet, ModelId::MobileNetV2, ModelId::NASNetMobile];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::MobileNet => "MobileNet",
            ModelId::MobileNetV2 => "MobileNetV2",
            ModelId::NASNetMobile => "NASNetMobile",
        }
    }

    /// 慣例的なバンドルファイル名
    pub fn default_file_name(&self) -> String {
        format!("{}_best.tar.gz", self.as_str())
    }
}

impl Default for ModelId {
    fn default() -> Self {
        ModelId::MobileNet
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| LoadError::UnknownModel(s.to_string()))
    }
}

/// 肌色カテゴリ（CLASS_NAMESとインデックスが一致）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkinTone {
    Dark,
    Light,
    MidLight,
}

impl SkinTone {
    pub const ALL: [SkinTone; NUM_CLASSES] = [SkinTone::Dark, SkinTone::Light, SkinTone::MidLight];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn from_label(label: &str) -> Option<Self> {
        CLASS_NAMES.iter().position(|name| *name == label).and_then(Self::from_index)
    }

    pub fn index(&self) -> usize {
        match self {
            SkinTone::Dark => 0,
            SkinTone::Light => 1,
            SkinTone::MidLight => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        CLASS_NAMES[self.index()]
    }
}

impl std::fmt::Display for SkinTone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// 1枚の画像に対する推論結果
///
/// `probabilities[i]` は `CLASS_NAMES[i]` の確率。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionResult {
    probabilities: [f32; NUM_CLASSES],
}

impl PredictionResult {
    pub fn new(probabilities: [f32; NUM_CLASSES]) -> Self {
        Self { probabilities }
    }

    /// モデル出力の1行から生成（要素数が合わなければエラー）
    pub fn from_slice(values: &[f32]) -> Result<Self, InferenceError> {
        let probabilities: [f32; NUM_CLASSES] =
            values.try_into().map_err(|_| InferenceError::ShapeMismatch {
                expected: vec![1, NUM_CLASSES],
                actual: vec![1, values.len()],
            })?;
        Ok(Self { probabilities })
    }

    pub fn probabilities(&self) -> &[f32; NUM_CLASSES] {
        &self.probabilities
    }

    /// 最大確率のインデックス（同値の場合は小さいインデックスを優先）
    ///
    /// NaNは選ばれません。すべてNaNの場合は0を返します。
    pub fn argmax(&self) -> usize {
        let mut best: Option<usize> = None;
        for (i, p) in self.probabilities.iter().enumerate() {
            if p.is_nan() {
                continue;
            }
            match best {
                Some(b) if *p <= self.probabilities[b] => {}
                _ => best = Some(i),
            }
        }
        best.unwrap_or(0)
    }

    pub fn predicted(&self) -> SkinTone {
        SkinTone::ALL[self.argmax()]
    }

    /// 信頼度（%）
    pub fn confidence_percent(&self) -> f32 {
        self.probabilities[self.argmax()] * 100.0
    }

    /// (カテゴリ, 確率) をクラス順に列挙
    pub fn iter(&self) -> impl Iterator<Item = (SkinTone, f32)> + '_ {
        SkinTone::ALL.into_iter().zip(self.probabilities.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skin_tone_matches_class_names() {
        for (i, name) in CLASS_NAMES.iter().enumerate() {
            let tone = SkinTone::from_index(i).unwrap();
            assert_eq!(tone.index(), i);
            assert_eq!(tone.label(), *name);
            assert_eq!(SkinTone::from_label(name), Some(tone));
        }
        assert_eq!(SkinTone::from_index(3), None);
        assert_eq!(SkinTone::from_label("medium"), None);
    }

    #[test]
    fn test_model_id_parse() {
        for id in ModelId::ALL {
            assert_eq!(id.as_str().parse::<ModelId>().unwrap(), id);
        }
        assert!(matches!(
            "NonexistentModel".parse::<ModelId>(),
            Err(LoadError::UnknownModel(name)) if name == "NonexistentModel"
        ));
        assert_eq!(ModelId::NASNetMobile.default_file_name(), "NASNetMobile_best.tar.gz");
    }

    #[test]
    fn test_argmax_tie_prefers_lowest_index() {
        let result = PredictionResult::new([0.5, 0.5, 0.0]);
        assert_eq!(result.argmax(), 0);
        assert_eq!(result.predicted(), SkinTone::Dark);

        let result = PredictionResult::new([0.2, 0.4, 0.4]);
        assert_eq!(result.predicted(), SkinTone::Light);
    }

    #[test]
    fn test_argmax_ignores_nan() {
        let result = PredictionResult::new([0.3, f32::NAN, 0.6]);
        assert_eq!(result.predicted(), SkinTone::MidLight);

        let result = PredictionResult::new([f32::NAN, 0.9, 0.1]);
        assert_eq!(result.argmax(), 1);
        assert_eq!(result.predicted(), SkinTone::Light);
        assert!((result.confidence_percent() - 90.0).abs() < 1e-4);

        let result = PredictionResult::new([f32::NAN, 0.5, 0.5]);
        assert_eq!(result.argmax(), 1);

        assert_eq!(PredictionResult::new([f32::NAN; 3]).argmax(), 0);
    }

    #[test]
    fn test_from_slice_rejects_wrong_length() {
        let err = PredictionResult::from_slice(&[0.1, 0.9]).unwrap_err();
        assert!(matches!(err, InferenceError::ShapeMismatch { .. }));
        assert!(PredictionResult::from_slice(&[0.1, 0.7, 0.2]).is_ok());
    }
}
