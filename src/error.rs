//! エラー型の定義
//!
//! モデル読み込み失敗（LoadError）と画像処理失敗（InferenceError）を区別します。

use std::path::PathBuf;
use std::time::Duration;

/// モデル読み込みエラー
///
/// 読み込み失敗はレジストリにキャッシュされるため `Clone` を実装します。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// 未知のモデル識別子
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// モデルファイルが存在しない
    #[error("model file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// ファイルの読み込み・展開に失敗
    #[error("failed to read model file {}: {message}", .path.display())]
    Unreadable { path: PathBuf, message: String },

    /// 入出力形状やラベル構成が期待と一致しない
    #[error("incompatible model {}: {message}", .path.display())]
    Incompatible { path: PathBuf, message: String },

    /// 読み込みが制限時間を超過
    #[error("loading {model} timed out after {timeout:?}")]
    Timeout { model: String, timeout: Duration },

    /// 読み込み処理が結果を返さずに終了した（パニックなど）
    #[error("loader for {model} terminated unexpectedly")]
    Aborted { model: String },

    /// 推論バックエンドが無効化されている
    #[error("inference backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// 推論エラー（リクエスト単位。キャッシュされたモデルには影響しない）
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// 画像をデコードできない
    #[error("could not decode image: {0}")]
    Decode(String),

    /// 入力または出力テンソルの形状不一致
    #[error("tensor shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// バックエンド実行時エラー
    #[error("model execution failed: {0}")]
    Backend(String),
}

impl From<image::ImageError> for InferenceError {
    fn from(err: image::ImageError) -> Self {
        InferenceError::Decode(err.to_string())
    }
}

/// 解析処理全体のエラー
///
/// 表示メッセージで「モデル利用不可」と「画像処理不可」を区別します。
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(#[from] LoadError),

    #[error("could not process this image: {0}")]
    UnprocessableImage(#[from] InferenceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_error_messages_are_distinct() {
        let unavailable = AnalysisError::from(LoadError::UnknownModel("Foo".into()));
        let unprocessable = AnalysisError::from(InferenceError::Decode("bad header".into()));

        assert!(unavailable.to_string().starts_with("model unavailable"));
        assert!(unprocessable.to_string().starts_with("could not process this image"));
    }

    #[test]
    fn test_load_error_display() {
        let err = LoadError::NotFound(PathBuf::from("models/MobileNet_best.tar.gz"));
        assert_eq!(
            err.to_string(),
            "model file not found: models/MobileNet_best.tar.gz"
        );
        let err = LoadError::Timeout {
            model: "MobileNet".into(),
            timeout: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "loading MobileNet timed out after 5s");
        let err = LoadError::Aborted { model: "NASNetMobile".into() };
        assert_eq!(err.to_string(), "loader for NASNetMobile terminated unexpectedly");
    }
}
