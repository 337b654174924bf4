//! # roster-channel
//!
//! 1 本の永続的な双方向チャンネル（WebSocket）の抽象化レイヤー。
//!
//! ## 責任
//!
//! - 接続のライフサイクル管理（Closed / Connecting / Open）
//! - 送信 Envelope のシリアライズと送信キュー
//! - 受信フレームの Envelope へのデシリアライズ
//!
//! ソケット自体はホストが持つ。このクレートは I/O を行わない。
//!
//! ```text
//! 送信:
//!   1. correlator → channel.send(request)
//!   2. channel.take_outbound() → ホストが ws.send(frame)
//!
//! 受信:
//!   1. ws.onmessage → channel.recv_frame(text)
//!   2. Ok(response) → correlator.dispatch(response)
//!      Err(MalformedFrame) → global エラー経路
//! ```
//!
//! 再接続・ハートビートは扱わない。

pub mod error;
pub mod session;

pub use error::ChannelError;
pub use session::{ChannelSession, ChannelStats};

/// チャンネルの接続状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    Connecting,
    Open,
}

/// ページのプロトコルからエンドポイント URL を組み立てる
///
/// 暗号化されたページ（`https:`）なら `wss`、それ以外は `ws`。
/// `window.location.protocol` は末尾にコロンを含むが、含まない形も受け付ける。
pub fn endpoint_url(page_protocol: &str, host: &str, path: &str) -> String {
    let scheme = match page_protocol.trim_end_matches(':') {
        "https" => "wss",
        _ => "ws",
    };
    let sep = if path.starts_with('/') { "" } else { "/" };
    format!("{scheme}://{host}{sep}{path}")
}
