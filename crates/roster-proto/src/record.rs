//! 出欠レコードとリフレッシュ/コミットのペイロード型

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

/// レコードの表示用ステータス
///
/// サーバーからは送られてこない。リフレッシュのたびに `None` に戻る。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    None,
    Success,
    Loading,
    Error,
}

/// レコードが属するシフト（作業セットのグループキー）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftRef {
    pub shift_id: i64,
    pub shift_num: i64,
}

/// シフトの親イベント
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRef {
    pub event_id: i64,
    pub name: String,
}

/// 参加者の連絡先
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone_1: Option<String>,
    #[serde(default)]
    pub phone_2: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// 出欠レコード（1 ユーザー × 1 シフト）
///
/// `user_shift_id` は不変の識別子。確認レベル・開始/終了時刻・時間補正・
/// 担当者はそれぞれ独立に編集できる。`status` と `changed` はローカル専用で、
/// デシリアライズ時は常に初期値になる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    pub user_shift_id: u64,
    pub confirm_level_id: i64,
    #[serde(with = "crate::timestamp::lenient")]
    pub start_time: NaiveDateTime,
    #[serde(with = "crate::timestamp::lenient")]
    pub end_time: NaiveDateTime,
    /// 符号付き `H[:MM[:SS]]`。空文字列は補正なし
    #[serde(default, deserialize_with = "null_as_empty")]
    pub hours_override: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub other_shifts: String,
    #[serde(default)]
    pub assigned_exec: Option<i64>,
    pub shift: ShiftRef,
    #[serde(rename = "parentEvent")]
    pub parent_event: EventRef,
    pub user: UserInfo,
    #[serde(default, skip_deserializing)]
    pub status: RecordStatus,
    /// ダーティマーカー。編集で true になり、次のリフレッシュまで戻らない
    #[serde(default, skip_deserializing)]
    pub changed: bool,
}

/// 確認レベル（ドロップダウンの選択肢）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmLevel {
    pub id: i64,
    pub name: String,
}

/// 担当者として割り当て可能なユーザー
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOption {
    #[serde(default)]
    pub user_id: Option<i64>,
    pub value: i64,
    pub text: String,
}

/// リフレッシュ応答の `data`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshData {
    pub attendance: Vec<AttendanceEntry>,
    #[serde(default)]
    pub levels: Vec<ConfirmLevel>,
    #[serde(default, rename = "execList")]
    pub exec_list: Vec<ExecOption>,
}

/// コミットペイロードの 1 行
///
/// サーバーが受け付けるフィールドだけを持つ。時刻は MySQL 形式。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRow {
    pub user_shift_id: u64,
    pub confirm_level_id: i64,
    pub start_override: String,
    pub end_override: String,
    pub hours_override: String,
    pub assigned_exec: Option<i64>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> serde_json::Value {
        json!({
            "user_shift_id": 42,
            "confirm_level_id": 1,
            "start_time": "2024-05-01T09:00:00.000Z",
            "end_time": "2024-05-01T13:00:00.000Z",
            "hours_override": null,
            "other_shifts": "Shift 2",
            "assigned_exec": 7,
            "shift": { "shift_id": 3, "shift_num": 1 },
            "parentEvent": { "event_id": 9, "name": "Spring Fair" },
            "user": {
                "user_id": 100,
                "first_name": "Ada",
                "last_name": "Lovelace",
                "phone_1": "555-0100",
                "phone_2": null,
                "email": "ada@example.com"
            },
            "status": "error",
            "changed": true
        })
    }

    #[test]
    fn test_entry_decodes_with_local_fields_reset() {
        let entry: AttendanceEntry = serde_json::from_value(sample()).unwrap();
        assert_eq!(entry.user_shift_id, 42);
        assert_eq!(entry.hours_override, "");
        assert_eq!(entry.parent_event.name, "Spring Fair");
        assert_eq!(entry.user.phone_2, None);
        // ローカル専用フィールドはサーバーの値を信用しない
        assert_eq!(entry.status, RecordStatus::None);
        assert!(!entry.changed);
    }

    #[test]
    fn test_refresh_data_defaults() {
        let data: RefreshData =
            serde_json::from_value(json!({ "attendance": [sample()] })).unwrap();
        assert_eq!(data.attendance.len(), 1);
        assert!(data.levels.is_empty());
        assert!(data.exec_list.is_empty());
    }

    #[test]
    fn test_exec_list_wire_name() {
        let data: RefreshData = serde_json::from_value(json!({
            "attendance": [],
            "levels": [{ "id": 1, "name": "Confirmed" }],
            "execList": [{ "user_id": 7, "value": 7, "text": "Grace" }]
        }))
        .unwrap();
        assert_eq!(data.levels[0].name, "Confirmed");
        assert_eq!(data.exec_list[0].user_id, Some(7));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let v = serde_json::to_value(RecordStatus::Loading).unwrap();
        assert_eq!(v, json!("loading"));
        let v = serde_json::to_value(RecordStatus::None).unwrap();
        assert_eq!(v, json!("none"));
    }
}
