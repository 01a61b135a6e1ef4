//! 機械学習モデルの共通定義
//!
//! 肌色分類用のCNNモデルと関連する設定を提供します。

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Linear, LinearConfig, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Tensor},
};

use crate::types::{IMAGE_SIZE, NUM_CLASSES};

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 分類クラス数
    pub num_classes: usize,
    /// 入力画像サイズ（正方形）
    #[config(default = 128)]
    pub image_size: usize,
}

impl ModelConfig {
    /// 標準の入出力（128x128入力・3クラス）の設定
    pub fn standard() -> Self {
        ModelConfig::new(NUM_CLASSES).with_image_size(IMAGE_SIZE as usize)
    }

    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> SkinToneClassifier<B> {
        // stride 2, padding無しの3x3畳み込みで 128 -> 63 -> 31 -> 15
        // その後の平均プーリングで特徴次元は最終チャネル数(128)に固定される
        tracing::debug!(
            image_size = self.image_size,
            num_classes = self.num_classes,
            "[Model] 初期化"
        );

        SkinToneClassifier {
            conv1: Conv2dConfig::new([3, 32], [3, 3]).with_stride([2, 2]).init(device),
            conv2: Conv2dConfig::new([32, 64], [3, 3]).with_stride([2, 2]).init(device),
            conv3: Conv2dConfig::new([64, 128], [3, 3]).with_stride([2, 2]).init(device),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1: LinearConfig::new(128, 64).init(device),
            fc2: LinearConfig::new(64, self.num_classes).init(device),
            activation: Relu::new(),
        }
    }
}

/// 肌色分類用CNNモデル
///
/// # アーキテクチャ
/// - {Conv 3x3 (stride 2) + ReLU} x 3層
/// - Global Average Pooling
/// - FC: 128 -> 64 + ReLU
/// - FC: 64 -> num_classes
/// - Softmax (分類時)
#[derive(Module, Debug)]
pub struct SkinToneClassifier<B: Backend> {
    conv1: Conv2d<B>, // 3 -> 32
    conv2: Conv2d<B>, // 32 -> 64
    conv3: Conv2d<B>, // 64 -> 128
    pool: AdaptiveAvgPool2d,

    fc1: Linear<B>,
    fc2: Linear<B>,

    activation: Relu,
}

impl<B: Backend> SkinToneClassifier<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, 3, size, size]
    ///
    /// # 戻り値
    /// - クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = images.dims();

        let x = self.activation.forward(self.conv1.forward(images));
        let x = self.activation.forward(self.conv2.forward(x));
        let x = self.activation.forward(self.conv3.forward(x));

        let x = self.pool.forward(x);
        let [_, c, h, w] = x.dims();
        let x = x.reshape([batch_size, c * h * w]);

        let x = self.activation.forward(self.fc1.forward(x));
        self.fc2.forward(x)
    }

    /// クラスごとの確率 [batch_size, num_classes]
    pub fn predict_proba(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }
}
