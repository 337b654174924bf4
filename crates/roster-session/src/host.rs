//! ホストアプリケーションとの境界

use serde::Serialize;

/// メッセージの重要度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Positive,
    Negative,
}

/// ホストのメッセージ表示に渡す 1 件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub more: Option<String>,
    pub severity: Severity,
}

impl Message {
    pub fn positive(message: impl Into<String>) -> Self {
        Message {
            message: message.into(),
            more: None,
            severity: Severity::Positive,
        }
    }

    pub fn negative(message: impl Into<String>, more: Option<String>) -> Self {
        Message {
            message: message.into(),
            more,
            severity: Severity::Negative,
        }
    }
}

/// `addMessage({message, more?, severity})`
pub trait MessageSink {
    fn add_message(&mut self, message: Message);
}

/// `setLoading(boolean)`
///
/// ネットワーク交換の前に true、決着後に false で呼ばれる。
pub trait BusyIndicator {
    fn set_loading(&mut self, busy: bool);
}

/// 送信時点で読む不透明な認証情報
pub trait CredentialSource {
    fn credential(&self) -> Option<String>;
}

/// セッションがホストに依頼する副作用
///
/// セッションは自分の状態を変更している最中にホストを呼ばない。
/// 副作用は発生順に溜めておき、ホストが `take_effects()` で取り出して
/// セッションの借用を解いてから届ける。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// `addMessage`
    Message(Message),
    /// `setLoading`
    Loading(bool),
}

impl Effect {
    pub fn deliver<S: MessageSink + BusyIndicator + ?Sized>(self, sink: &mut S) {
        match self {
            Effect::Message(message) => sink.add_message(message),
            Effect::Loading(busy) => sink.set_loading(busy),
        }
    }
}
