//! roster-proto エラー型

use thiserror::Error;

/// Envelope・タイムスタンプのエンコード/デコードのエラー
#[derive(Debug, Error)]
pub enum ProtoError {
    /// JSON デコード失敗
    #[error("Envelope decode failed: {0}")]
    DecodeFailed(#[source] serde_json::Error),
    /// JSON エンコード失敗
    #[error("Envelope encode failed: {0}")]
    EncodeFailed(#[source] serde_json::Error),
    /// response の data が期待した形をしていない
    #[error("Unexpected response data for {action}: {source}")]
    UnexpectedData {
        action: String,
        #[source]
        source: serde_json::Error,
    },
    /// タイムスタンプが RFC 3339 でも `YYYY-MM-DD HH:MM:SS` でもない
    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),
}
