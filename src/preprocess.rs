//! 画像の前処理
//!
//! RGB変換 → 128x128へのリサイズ（アスペクト比は保持しない） → 0..1への正規化
//! → バッチ次元の付加、の順で処理します。

use std::path::Path;

use image::{imageops::FilterType, DynamicImage, GenericImageView};

use crate::error::InferenceError;
use crate::types::CHANNELS;

/// 呼び出し側から渡される画像（形式・色モード・サイズは任意）
#[derive(Debug, Clone)]
pub struct ImageSample {
    image: DynamicImage,
}

impl ImageSample {
    /// エンコード済みバイト列（JPEG/PNGなど）からデコード
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InferenceError> {
        let image = image::load_from_memory(bytes)?;
        Ok(Self { image })
    }

    /// 画像ファイルを開く
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, InferenceError> {
        let image = image::open(path.as_ref())?;
        Ok(Self { image })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
}

impl From<DynamicImage> for ImageSample {
    fn from(image: DynamicImage) -> Self {
        Self { image }
    }
}

/// モデル入力テンソル（NHWC, f32）
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    data: Vec<f32>,
    shape: [usize; 4],
}

impl InputTensor {
    /// すべて0のテンソル
    pub fn zeros(shape: [usize; 4]) -> Self {
        Self {
            data: vec![0.0; shape.iter().product()],
            shape,
        }
    }

    pub fn new(data: Vec<f32>, shape: [usize; 4]) -> Result<Self, InferenceError> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(InferenceError::ShapeMismatch {
                expected: shape.to_vec(),
                actual: vec![data.len()],
            });
        }
        Ok(Self { data, shape })
    }

    /// [batch, height, width, channels]
    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// 画像をモデル入力テンソルに変換
///
/// 戻り値の形状は `[1, size, size, 3]`。
pub fn prepare_input(sample: &ImageSample, size: u32) -> Result<InputTensor, InferenceError> {
    let (width, height) = sample.dimensions();
    if width == 0 || height == 0 {
        return Err(InferenceError::Decode(format!(
            "画像サイズが不正です: {}x{}",
            width, height
        )));
    }

    let rgb = sample.image.to_rgb8();
    let resized = image::imageops::resize(&rgb, size, size, FilterType::CatmullRom);
    tracing::debug!(width, height, size, "画像をリサイズしました");

    let data: Vec<f32> = resized
        .as_raw()
        .iter()
        .map(|&value| value as f32 / 255.0)
        .collect();

    InputTensor::new(data, [1, size as usize, size as usize, CHANNELS])
}
