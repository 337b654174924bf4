//! # roster-session
//!
//! 出欠画面 1 つ分のセッション。チャンネル・相関器・編集追跡器を束ねて、
//! ホスト（ブラウザ側）に対する操作を提供する。
//!
//! ## データフロー
//!
//! ```text
//! ws.onmessage → handle_frame → channel.recv_frame → correlator.dispatch
//!   ├── Refresh 完了 → tracker.replace_all（ローカル編集はすべて破棄）
//!   ├── Commit 完了  → addMessage → setLoading(false) → refresh
//!   └── Global       → addMessage(negative)
//!
//! commit → setLoading(true) → tracker.dirty_rows → correlator.request → channel.send
//! ```
//!
//! 認証情報は `CredentialSource` で送信時に読む。`addMessage` / `setLoading` は
//! `Effect` として溜め、ホストが `take_effects()` で取り出して
//! `MessageSink` / `BusyIndicator` に届ける。

pub mod config;
pub mod error;
pub mod host;
pub mod session;

pub use config::SessionConfig;
pub use error::SessionError;
pub use host::{BusyIndicator, CredentialSource, Effect, Message, MessageSink, Severity};
pub use session::{AttendanceSession, Pending, SessionStats};

pub use roster_edit::{FieldEdit, RowFilter};

/// 出欠チャンネルのエンドポイント
pub const DEFAULT_ENDPOINT_PATH: &str = "/api/attendance/ws";

/// リフレッシュ要求の action 接頭辞
pub const DEFAULT_REFRESH_VERB: &str = "refresh";

/// コミット要求の action 接頭辞
pub const DEFAULT_COMMIT_VERB: &str = "update";

/// 認証トークンを保存している localStorage のキー
pub const DEFAULT_CREDENTIAL_KEY: &str = "id_token";

/// 応答待ちタイムアウト時のメッセージ
pub const REQUEST_TIMED_OUT_MESSAGE: &str = "Request timed out";

/// コミット成功応答に本文がないときのメッセージ
pub const COMMIT_SAVED_MESSAGE: &str = "Saved";
