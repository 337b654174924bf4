//! # roster-proto
//!
//! 出欠チャンネルの Envelope 定義と JSON エンコード/デコードユーティリティ。
//!
//! ## Envelope
//!
//! ```text
//! client → server: { action, key, payload? }
//! server → client: { action, status: "success" | "error", data?, error?, details? }
//! ```
//!
//! `action` は相関キー。応答は元のリクエストの `action` をそのまま返す。
//! 予約語 `"global"` は相関できないエラー（サーバー起因・クライアント合成の両方）に使う。

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod error;
pub mod record;
pub mod timestamp;

pub use error::ProtoError;
pub use record::{
    AttendanceEntry, CommitRow, ConfirmLevel, EventRef, ExecOption, RecordStatus, RefreshData,
    ShiftRef, UserInfo,
};

/// 相関できないエラー用の予約 action
pub const GLOBAL_ACTION: &str = "global";

/// 送信 Envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// 相関キー（応答待ちの間は一意であること）
    pub action: String,
    /// 不透明な認証情報
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Request {
    pub fn new(action: impl Into<String>, key: impl Into<String>, payload: Option<Value>) -> Self {
        Request {
            action: action.into(),
            key: key.into(),
            payload,
        }
    }

    /// テキストフレームにエンコードする
    pub fn encode(&self) -> Result<String, ProtoError> {
        serde_json::to_string(self).map_err(ProtoError::EncodeFailed)
    }

    /// テキストフレームからデコードする（サーバー側・テスト用）
    pub fn decode(text: &str) -> Result<Self, ProtoError> {
        serde_json::from_str(text).map_err(ProtoError::DecodeFailed)
    }
}

/// 応答ステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// 受信 Envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub action: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Response {
    /// 成功応答を組み立てる（サーバー側・テスト用）
    pub fn success(action: impl Into<String>, data: Value) -> Self {
        Response {
            action: action.into(),
            status: Status::Success,
            data: Some(data),
            error: None,
            details: None,
        }
    }

    /// エラー応答を組み立てる
    pub fn failure(
        action: impl Into<String>,
        error: impl Into<String>,
        details: Option<String>,
    ) -> Self {
        Response {
            action: action.into(),
            status: Status::Error,
            data: None,
            error: Some(error.into()),
            details,
        }
    }

    /// `"global"` のエラー Envelope を組み立てる
    pub fn global_error(error: impl Into<String>, details: Option<String>) -> Self {
        Self::failure(GLOBAL_ACTION, error, details)
    }

    pub fn is_global(&self) -> bool {
        self.action == GLOBAL_ACTION
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// エラーメッセージ（未設定なら汎用文言）
    pub fn error_text(&self) -> &str {
        self.error.as_deref().unwrap_or("Unknown error")
    }

    /// `data` を型付きで読み出す（`data` がなければ JSON `null` として扱う）
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, ProtoError> {
        let data = self.data.clone().unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(|source| ProtoError::UnexpectedData {
            action: self.action.clone(),
            source,
        })
    }

    /// テキストフレームからデコードする
    ///
    /// # エラー
    /// - `ProtoError::DecodeFailed`: JSON でない、または必須フィールド欠落
    pub fn decode(text: &str) -> Result<Self, ProtoError> {
        serde_json::from_str(text).map_err(ProtoError::DecodeFailed)
    }

    pub fn encode(&self) -> Result<String, ProtoError> {
        serde_json::to_string(self).map_err(ProtoError::EncodeFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_omits_absent_payload() {
        let req = Request::new("refresh|1", "tok", None);
        let text = req.encode().unwrap();
        assert_eq!(text, r#"{"action":"refresh|1","key":"tok"}"#);
    }

    #[test]
    fn test_request_carries_payload() {
        let req = Request::new("update|2", "tok", Some(json!([{ "user_shift_id": 42 }])));
        let decoded = Request::decode(&req.encode().unwrap()).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_response_decode_error_fields() {
        let resp = Response::decode(
            r#"{"action":"update|3","status":"error","error":"Denied","details":"no role"}"#,
        )
        .unwrap();
        assert!(!resp.is_success());
        assert_eq!(resp.error_text(), "Denied");
        assert_eq!(resp.details.as_deref(), Some("no role"));
    }

    #[test]
    fn test_response_rejects_unknown_status() {
        let err = Response::decode(r#"{"action":"a","status":"maybe"}"#).unwrap_err();
        assert!(matches!(err, ProtoError::DecodeFailed(_)));
    }

    #[test]
    fn test_global_error_envelope() {
        let resp = Response::global_error("boom", Some("raw".into()));
        assert!(resp.is_global());
        assert_eq!(resp.status, Status::Error);
    }

    #[test]
    fn test_data_as_reports_action() {
        let resp = Response::success("refresh|9", json!({ "attendance": 5 }));
        let err = resp.data_as::<RefreshData>().unwrap_err();
        match err {
            ProtoError::UnexpectedData { action, .. } => assert_eq!(action, "refresh|9"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_error_text_fallback() {
        let resp = Response::decode(r#"{"action":"a","status":"error"}"#).unwrap();
        assert_eq!(resp.error_text(), "Unknown error");
    }
}
