//! 編集エラー型

use thiserror::Error;

/// 入力検証のエラー
///
/// どのエラーの場合も編集は適用されず、ダーティマーカーも立たない。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    /// 時間補正が `±H[:MM[:SS]]` の形をしていない
    #[error("Please type a duration hh:mm (got {0:?})")]
    InvalidDuration(String),
    /// 時刻として読めない
    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),
    /// フィールドの値の型が違う
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    /// 編集できないフィールド名
    #[error("Unknown field: {0}")]
    UnknownField(String),
}
