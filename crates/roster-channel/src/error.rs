//! roster-channel エラー型

use thiserror::Error;

use crate::ChannelState;

/// チャンネル層のエラー
#[derive(Debug, Error)]
pub enum ChannelError {
    /// 閉じたチャンネルへの送信
    #[error("Channel is not open")]
    NotOpen,
    /// 既に接続中/接続済みのチャンネルを再度開こうとした
    #[error("Channel already {0:?}")]
    AlreadyOpen(ChannelState),
    /// Envelope のエンコードに失敗
    #[error(transparent)]
    Encode(#[from] roster_proto::ProtoError),
    /// 受信フレームが Envelope として読めない
    #[error("Malformed frame: {reason}")]
    MalformedFrame {
        reason: String,
        /// 診断用に元のフレームを保持する
        raw: String,
    },
}
