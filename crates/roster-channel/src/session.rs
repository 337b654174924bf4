//! チャンネルセッション実装

use std::collections::VecDeque;

use roster_proto::{Request, Response};
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::{endpoint_url, ChannelState};

/// 1 本の永続チャンネルを表すセッション
///
/// 実際のソケットは持たない。ホスト（`roster-wasm` の WebSocket ラッパー）が
/// `take_outbound()` で取り出したフレームを送信し、受信したフレームを
/// `recv_frame()` に渡す。
///
/// ## 状態遷移
///
/// ```text
/// Closed --open()--> Connecting --on_open()--> Open
///   ^                    |                       |
///   +----close()/on_close()----------------------+
/// ```
pub struct ChannelSession {
    /// WebSocket エンドポイントのパス（例: `/api/attendance/ws`）
    path: String,
    state: ChannelState,
    /// 送信待ちテキストフレーム
    /// Connecting 中に積まれたものは Open になってから取り出される
    outbound: VecDeque<String>,
    frames_sent: u64,
    frames_received: u64,
    frames_malformed: u64,
}

impl ChannelSession {
    pub fn new(path: impl Into<String>) -> Self {
        ChannelSession {
            path: path.into(),
            state: ChannelState::Closed,
            outbound: VecDeque::new(),
            frames_sent: 0,
            frames_received: 0,
            frames_malformed: 0,
        }
    }

    /// 接続を開始し、ホストが接続すべき URL を返す
    ///
    /// # 引数
    /// - `page_protocol`: `window.location.protocol`（`"https:"` なら `wss`）
    /// - `host`: `window.location.host`
    ///
    /// # エラー
    /// - `ChannelError::AlreadyOpen`: Closed 以外の状態で呼ばれた
    pub fn open(&mut self, page_protocol: &str, host: &str) -> Result<String, ChannelError> {
        if self.state != ChannelState::Closed {
            return Err(ChannelError::AlreadyOpen(self.state));
        }
        let url = endpoint_url(page_protocol, host, &self.path);
        debug!(%url, "channel connecting");
        self.state = ChannelState::Connecting;
        Ok(url)
    }

    /// ソケットの open イベント
    pub fn on_open(&mut self) {
        debug!(queued = self.outbound.len(), "channel open");
        self.state = ChannelState::Open;
    }

    /// こちらから閉じる。送信待ちフレームは破棄する
    pub fn close(&mut self) {
        if !self.outbound.is_empty() {
            warn!(dropped = self.outbound.len(), "closing channel with unsent frames");
        }
        self.outbound.clear();
        self.state = ChannelState::Closed;
    }

    /// ソケットの close イベント（相手側・ネットワーク起因）
    ///
    /// 再接続はしない。
    pub fn on_close(&mut self) {
        if self.state != ChannelState::Closed {
            warn!("channel closed by peer");
        }
        self.close();
    }

    /// Envelope をシリアライズして送信キューに積む
    ///
    /// 送信完了の確認はしない（fire-and-forget）。
    ///
    /// # エラー
    /// - `ChannelError::NotOpen`: Closed 状態
    /// - `ChannelError::Encode`: JSON エンコード失敗
    pub fn send(&mut self, request: &Request) -> Result<(), ChannelError> {
        if self.state == ChannelState::Closed {
            return Err(ChannelError::NotOpen);
        }
        let frame = request.encode()?;
        debug!(action = %request.action, bytes = frame.len(), "queue frame");
        self.outbound.push_back(frame);
        Ok(())
    }

    /// ホストが送信すべきフレームをすべて取り出す
    ///
    /// Open 以外の状態では空を返す（Connecting 中のフレームは保持される）。
    pub fn take_outbound(&mut self) -> Vec<String> {
        if self.state != ChannelState::Open {
            return Vec::new();
        }
        let frames: Vec<String> = self.outbound.drain(..).collect();
        self.frames_sent += frames.len() as u64;
        frames
    }

    /// 受信したテキストフレームを Envelope にデコードする
    ///
    /// # エラー
    /// - `ChannelError::MalformedFrame`: JSON でない・Envelope の形をしていない。
    ///   呼び出し側は global エラーとして扱う
    pub fn recv_frame(&mut self, text: &str) -> Result<Response, ChannelError> {
        self.frames_received += 1;
        match Response::decode(text) {
            Ok(response) => {
                debug!(action = %response.action, status = ?response.status, "frame received");
                Ok(response)
            }
            Err(e) => {
                self.frames_malformed += 1;
                warn!(error = %e, "malformed frame");
                Err(ChannelError::MalformedFrame {
                    reason: e.to_string(),
                    raw: text.to_string(),
                })
            }
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ChannelState::Open
    }

    /// 送信待ちフレームがあるか
    pub fn has_pending_write(&self) -> bool {
        !self.outbound.is_empty()
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            state: self.state,
            frames_sent: self.frames_sent,
            frames_received: self.frames_received,
            frames_malformed: self.frames_malformed,
            queued: self.outbound.len(),
        }
    }
}

/// チャンネル統計情報
#[derive(Debug, Clone)]
pub struct ChannelStats {
    pub state: ChannelState,
    /// ホストに引き渡したフレーム数
    pub frames_sent: u64,
    pub frames_received: u64,
    /// Envelope として読めなかったフレーム数
    pub frames_malformed: u64,
    /// 送信待ちフレーム数
    pub queued: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_channel() -> ChannelSession {
        let mut ch = ChannelSession::new("/api/attendance/ws");
        ch.open("https:", "example.org").unwrap();
        ch.on_open();
        ch
    }

    #[test]
    fn test_open_returns_secure_url() {
        let mut ch = ChannelSession::new("/api/attendance/ws");
        let url = ch.open("https:", "example.org").unwrap();
        assert_eq!(url, "wss://example.org/api/attendance/ws");
        assert_eq!(ch.state(), ChannelState::Connecting);
    }

    #[test]
    fn test_double_open_rejected() {
        let mut ch = ChannelSession::new("/ws");
        ch.open("http:", "localhost:3000").unwrap();
        let err = ch.open("http:", "localhost:3000").unwrap_err();
        assert!(matches!(err, ChannelError::AlreadyOpen(ChannelState::Connecting)));
    }

    #[test]
    fn test_send_on_closed_channel_fails() {
        let mut ch = ChannelSession::new("/ws");
        let err = ch.send(&Request::new("refresh|1", "tok", None)).unwrap_err();
        assert!(matches!(err, ChannelError::NotOpen));
    }

    #[test]
    fn test_frames_held_until_open() {
        let mut ch = ChannelSession::new("/ws");
        ch.open("http:", "localhost").unwrap();
        ch.send(&Request::new("refresh|1", "tok", None)).unwrap();

        // Connecting 中は取り出せない
        assert!(ch.take_outbound().is_empty());
        assert!(ch.has_pending_write());

        ch.on_open();
        let frames = ch.take_outbound();
        assert_eq!(frames, vec![r#"{"action":"refresh|1","key":"tok"}"#.to_string()]);
        assert!(!ch.has_pending_write());
        assert_eq!(ch.stats().frames_sent, 1);
    }

    #[test]
    fn test_outbound_is_fifo() {
        let mut ch = open_channel();
        ch.send(&Request::new("a|1", "k", None)).unwrap();
        ch.send(&Request::new("b|2", "k", None)).unwrap();
        let frames = ch.take_outbound();
        assert!(frames[0].contains("a|1"));
        assert!(frames[1].contains("b|2"));
    }

    #[test]
    fn test_recv_valid_frame() {
        let mut ch = open_channel();
        let resp = ch
            .recv_frame(r#"{"action":"refresh|1","status":"success","data":{}}"#)
            .unwrap();
        assert_eq!(resp.action, "refresh|1");
        assert_eq!(ch.stats().frames_received, 1);
        assert_eq!(ch.stats().frames_malformed, 0);
    }

    #[test]
    fn test_recv_malformed_frame_keeps_raw() {
        let mut ch = open_channel();
        let err = ch.recv_frame("not json").unwrap_err();
        match err {
            ChannelError::MalformedFrame { raw, .. } => assert_eq!(raw, "not json"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ch.stats().frames_malformed, 1);
    }

    #[test]
    fn test_close_discards_queue() {
        let mut ch = open_channel();
        ch.send(&Request::new("a|1", "k", None)).unwrap();
        ch.on_close();
        assert_eq!(ch.state(), ChannelState::Closed);
        assert!(!ch.has_pending_write());

        // 閉じた後に再度開ける
        assert!(ch.open("http:", "localhost").is_ok());
    }
}
