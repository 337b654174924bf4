//! セッション設定

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::{
    DEFAULT_COMMIT_VERB, DEFAULT_CREDENTIAL_KEY, DEFAULT_ENDPOINT_PATH, DEFAULT_REFRESH_VERB,
};

/// セッション設定
///
/// すべてのフィールドは省略可能。ホストから JSON で渡す場合:
///
/// ```json
/// { "endpoint_path": "/api/attendance/ws", "request_timeout_ms": 30000 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// WebSocket エンドポイントのパス
    pub endpoint_path: String,
    /// 応答待ちタイムアウト（ミリ秒）。0 で無効
    pub request_timeout_ms: u64,
    /// リフレッシュ要求の action 接頭辞
    pub refresh_verb: String,
    /// コミット要求の action 接頭辞
    pub commit_verb: String,
    /// 認証情報を読む localStorage のキー
    pub credential_key: String,
}

impl SessionConfig {
    /// JSON 文字列から読み込む（欠けたフィールドはデフォルト値）
    pub fn from_json(text: &str) -> Result<Self, SessionError> {
        serde_json::from_str(text).map_err(SessionError::Config)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
            request_timeout_ms: roster_rpc::DEFAULT_REQUEST_TIMEOUT_MS,
            refresh_verb: DEFAULT_REFRESH_VERB.to_string(),
            commit_verb: DEFAULT_COMMIT_VERB.to_string(),
            credential_key: DEFAULT_CREDENTIAL_KEY.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SessionConfig::from_json(r#"{"request_timeout_ms": 500}"#).unwrap();
        assert_eq!(config.request_timeout_ms, 500);
        assert_eq!(config.endpoint_path, "/api/attendance/ws");
        assert_eq!(config.commit_verb, "update");
    }

    #[test]
    fn test_empty_object_is_default() {
        assert_eq!(SessionConfig::from_json("{}").unwrap(), SessionConfig::default());
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        assert!(matches!(
            SessionConfig::from_json("{"),
            Err(SessionError::Config(_))
        ));
    }
}
