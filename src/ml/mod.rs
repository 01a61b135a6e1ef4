pub mod ml_model;
pub mod inference;

pub use ml_model::{ModelConfig, SkinToneClassifier};
pub use inference::{record_bytes, BurnClassifier};
