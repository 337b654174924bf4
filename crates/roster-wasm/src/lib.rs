//! # roster-wasm
//!
//! wasm-bindgen エクスポート：出欠画面（ブラウザ）から呼び出す公開 API。
//!
//! ## 使用方法（TypeScript）
//!
//! ```typescript
//! import init, { AttendanceClient, init_panic_hook, init_logging } from './roster_wasm';
//!
//! await init();
//! init_panic_hook();
//! init_logging("debug");
//!
//! const client = new AttendanceClient(
//!     (msg) => addMessage(msg),          // {message, more?, severity}
//!     (busy) => setLoading(busy),
//!     JSON.stringify({ request_timeout_ms: 30000 }),
//! );
//!
//! // 接続（完了時に初回リフレッシュが送られる）
//! client.open();
//!
//! // 定期タイマー（応答待ちのタイムアウト回収）
//! setInterval(() => client.tick(Date.now()), 1000);
//!
//! // シフトを選んで編集
//! const groups = JSON.parse(client.groupOptions());
//! client.selectGroup(groups[0].key);
//! client.editField(42, "hours_override", "-1:30");
//!
//! // 変更をまとめて保存
//! client.commit();
//!
//! const rows = JSON.parse(client.workingSet("unconfirmed"));
//! ```

use wasm_bindgen::prelude::*;

pub mod client;
pub mod logging;

pub use client::AttendanceClient;

/// パニック時にブラウザコンソールにスタックトレースを出力する
///
/// 開発時に必ず呼び出すこと。本番ビルドでは feature flag で無効化可能。
#[wasm_bindgen]
pub fn init_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// tracing のログをブラウザコンソールに出力する
///
/// # 引数
/// - `level`: `"error"` / `"warn"` / `"info"` / `"debug"` / `"trace"`。省略時は `"info"`
///
/// # 戻り値
/// 今回の呼び出しで設定されたら true（2 回目以降は false）
///
/// # エラー
/// - 不明なレベル名
#[wasm_bindgen]
pub fn init_logging(level: Option<String>) -> Result<bool, JsError> {
    let level = match level.as_deref() {
        Some(name) => name
            .parse::<tracing::Level>()
            .map_err(|e| JsError::new(&format!("Invalid log level {name:?}: {e}")))?,
        None => tracing::Level::INFO,
    };
    Ok(logging::init(level))
}
