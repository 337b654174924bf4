//! # roster-edit
//!
//! 出欠レコードの楽観的編集追跡とコミット差分の抽出。
//!
//! ## 設計の背景
//!
//! ローカル編集は永続状態として扱わない。コミットの成否にかかわらず直後に
//! リフレッシュして、サーバーの値で作業コピーを置き換える。
//! このクレートはその間の「未コミット編集」だけを管理する。
//!
//! ```text
//! refresh 応答 → tracker.replace_all(data)      （全編集・マーカー破棄）
//! グループ選択 → tracker.select_group(shift_id) （作業セット再構築）
//! セル編集     → tracker.edit_field(id, edit)   （1 フィールド + changed = true）
//! コミット     → tracker.dirty_rows()           （changed のものだけ射影）
//! ```

pub mod error;
pub mod hours;
pub mod tracker;

pub use error::EditError;
pub use hours::{effective_hours, format_duration, HoursOverride, MAX_OVERRIDE_HOURS};
pub use tracker::{EditTracker, FieldEdit, GroupOption, RowFilter};
