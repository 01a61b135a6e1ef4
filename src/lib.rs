//! 肌色分類ライブラリ
//!
//! 学習済み分類モデル（MobileNet / MobileNetV2 / NASNetMobile）で肌画像を
//! "dark" / "light" / "mid-light" の3カテゴリに分類し、信頼度とスキンケア情報を返します。
//! モデルはONNXグラフ（`onnx` 機能）またはBurnの重み（`ml` 機能）として読み込みます。
//!
//! ```no_run
//! use skin_tone_analyzer::{AppConfig, ImageSample, ModelRegistry};
//!
//! let config = AppConfig::load_or_default(AppConfig::default_path());
//! let registry = ModelRegistry::new(&config);
//! let sample = ImageSample::open("arm.jpg")?;
//! let analysis = registry.analyze("MobileNet", &sample)?;
//! println!("{} ({})", analysis.resolution.label, analysis.resolution.confidence_display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![recursion_limit = "256"]
pub mod category;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod preprocess;
pub mod registry;
pub mod types;
#[cfg(feature = "ml")]
pub mod ml;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use category::{resolve_category, CategoryInfo, CategoryResolution, DISCLAIMER};
pub use error::{AnalysisError, InferenceError, LoadError};
pub use model::{AppConfig, DeviceType, ModelFormat, ModelMetadata, ModelSettings};
pub use pipeline::{predict, Classifier, ModelHandle};
pub use preprocess::{prepare_input, ImageSample, InputTensor};
pub use registry::{Analysis, BundleLoader, ModelLoader, ModelRegistry, ModelStatus};
pub use types::{ModelId, PredictionResult, SkinTone, CLASS_NAMES, IMAGE_SIZE, NUM_CLASSES};
