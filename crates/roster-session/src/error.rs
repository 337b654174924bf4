//! roster-session エラー型

use roster_channel::ChannelError;
use roster_edit::EditError;
use thiserror::Error;

/// セッション操作のエラー
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Edit(#[from] EditError),
    /// 設定 JSON が読めない
    #[error("Invalid session config: {0}")]
    Config(#[source] serde_json::Error),
    /// コミットペイロードのエンコード失敗
    #[error("Commit payload encode failed: {0}")]
    Payload(#[source] serde_json::Error),
}
