//! # roster-rpc
//!
//! リクエスト相関器（Request Correlator）。
//!
//! 送信したリクエストの `action` をキーに完了ハンドル（completion）を登録し、
//! 同じ `action` の応答が届いたらハンドルを一度だけ取り出して返す。
//!
//! ### キーコンセプト
//!
//! - **action キー**: `<verb>|<n>`。`n` はセッション内で単調増加するカウンタ
//! - **one-shot**: 応答 1 件につき完了ハンドルは 1 回だけ返り、表から消える
//! - **global**: `action == "global"` の応答と、どのリクエストにも一致しない応答は
//!   global エラーとして呼び出し側に返す
//! - **タイムアウト掃除**: 応答が来ないまま `timeout_ms` を過ぎたエントリを回収する
//!
//! ## リクエストの状態遷移
//!
//! ```text
//! created → sent → matched-success
//!                → matched-error
//!                → unmatched（別の登録に上書きされた場合）
//!                → expired（sweep_expired で回収）
//! ```
//!
//! どの終端状態からも再送はしない。

pub mod correlator;

pub use correlator::{Correlator, CorrelatorStats, Dispatch, Expired};

/// 応答待ちタイムアウトのデフォルト値（ミリ秒）
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// どのリクエストにも一致しない応答を受けたときの global エラー文言
pub const UNMATCHED_RESPONSE_ERROR: &str = "Received response with no known request";

/// action キーの verb と連番の区切り文字
pub const ACTION_SEPARATOR: char = '|';

/// action キー生成器
///
/// 同一ミリ秒に同じ verb を 2 回送っても衝突しないよう、
/// 時刻ではなく単調増加カウンタを使う。
#[derive(Debug, Clone)]
pub struct ActionIdGen {
    next: u64,
}

impl ActionIdGen {
    /// 1 始まりの生成器を作る
    pub fn new() -> Self {
        ActionIdGen { next: 1 }
    }

    /// `<verb>|<n>` 形式の新しい action キーを返す
    pub fn next_action(&mut self, verb: &str) -> String {
        let n = self.next;
        self.next += 1;
        format!("{verb}{ACTION_SEPARATOR}{n}")
    }
}

impl Default for ActionIdGen {
    fn default() -> Self {
        Self::new()
    }
}

/// action キーから verb 部分を取り出す（ログ用）
pub fn action_verb(action: &str) -> &str {
    action.split(ACTION_SEPARATOR).next().unwrap_or(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_ids_are_unique_per_verb() {
        let mut ids = ActionIdGen::new();
        let a = ids.next_action("refresh");
        let b = ids.next_action("refresh");
        assert_eq!(a, "refresh|1");
        assert_eq!(b, "refresh|2");
    }

    #[test]
    fn test_counter_shared_across_verbs() {
        let mut ids = ActionIdGen::new();
        assert_eq!(ids.next_action("refresh"), "refresh|1");
        assert_eq!(ids.next_action("update"), "update|2");
    }

    #[test]
    fn test_action_verb() {
        assert_eq!(action_verb("update|17"), "update");
        assert_eq!(action_verb("global"), "global");
    }
}
