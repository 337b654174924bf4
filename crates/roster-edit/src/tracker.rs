//! 作業セットの編集追跡とコミット用の差分抽出

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use roster_proto::timestamp::{format_mysql, parse_timestamp};
use roster_proto::{AttendanceEntry, CommitRow, ConfirmLevel, ExecOption, RefreshData};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::EditError;
use crate::hours::HoursOverride;

/// 1 フィールドの編集
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldEdit {
    ConfirmLevel(i64),
    StartTime(NaiveDateTime),
    EndTime(NaiveDateTime),
    /// `[+-]H[:MM[:SS]]` または空文字列
    HoursOverride(String),
    AssignedExec(Option<i64>),
}

impl FieldEdit {
    /// ワイヤ上のフィールド名と JSON 値から編集を組み立てる
    ///
    /// # エラー
    /// - `EditError::UnknownField`: 編集対象外のフィールド
    /// - `EditError::InvalidValue` / `InvalidTimestamp` / `InvalidDuration`: 値が不正
    pub fn from_name(field: &str, value: &Value) -> Result<Self, EditError> {
        match field {
            "confirm_level_id" => {
                Ok(FieldEdit::ConfirmLevel(int_value("confirm_level_id", value)?))
            }
            "start_time" => Ok(FieldEdit::StartTime(time_value("start_time", value)?)),
            "end_time" => Ok(FieldEdit::EndTime(time_value("end_time", value)?)),
            "hours_override" => {
                let raw = match value {
                    Value::Null => String::new(),
                    Value::String(s) => s.clone(),
                    other => {
                        return Err(EditError::InvalidValue {
                            field: "hours_override",
                            reason: format!("expected string, got {other}"),
                        })
                    }
                };
                HoursOverride::parse(&raw)?;
                Ok(FieldEdit::HoursOverride(raw))
            }
            "assigned_exec" => match value {
                Value::Null => Ok(FieldEdit::AssignedExec(None)),
                v => Ok(FieldEdit::AssignedExec(Some(int_value("assigned_exec", v)?))),
            },
            other => Err(EditError::UnknownField(other.to_string())),
        }
    }

    /// 値を検証する（作業セットに触れる前に呼ぶ）
    pub fn validate(&self) -> Result<(), EditError> {
        match self {
            FieldEdit::HoursOverride(raw) => HoursOverride::parse(raw).map(|_| ()),
            _ => Ok(()),
        }
    }

    fn apply(self, entry: &mut AttendanceEntry) {
        match self {
            FieldEdit::ConfirmLevel(v) => entry.confirm_level_id = v,
            FieldEdit::StartTime(v) => entry.start_time = v,
            FieldEdit::EndTime(v) => entry.end_time = v,
            FieldEdit::HoursOverride(v) => entry.hours_override = v.trim().to_string(),
            FieldEdit::AssignedExec(v) => entry.assigned_exec = v,
        }
    }
}

fn int_value(field: &'static str, value: &Value) -> Result<i64, EditError> {
    value.as_i64().ok_or_else(|| EditError::InvalidValue {
        field,
        reason: format!("expected integer, got {value}"),
    })
}

fn time_value(field: &'static str, value: &Value) -> Result<NaiveDateTime, EditError> {
    let raw = value.as_str().ok_or_else(|| EditError::InvalidValue {
        field,
        reason: format!("expected timestamp string, got {value}"),
    })?;
    parse_timestamp(raw).map_err(|_| EditError::InvalidTimestamp(raw.to_string()))
}

/// 作業セットの行フィルタ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFilter {
    /// 指定ユーザーが担当のもの（「自分の担当」）
    AssignedTo(i64),
    /// 未確認（`confirm_level_id <= 0`）
    Unconfirmed,
}

impl RowFilter {
    pub fn matches(&self, entry: &AttendanceEntry) -> bool {
        match self {
            RowFilter::AssignedTo(user_id) => entry.assigned_exec == Some(*user_id),
            RowFilter::Unconfirmed => entry.confirm_level_id <= 0,
        }
    }
}

/// グループ（シフト）選択肢
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupOption {
    pub key: i64,
    pub value: i64,
    /// `"<イベント名> | Shift <番号>"`
    pub text: String,
}

/// 出欠レコードの編集追跡器
///
/// ## 責任
/// - レコード全体の保持（リフレッシュのたびに丸ごと置き換え）
/// - 選択中グループの作業セット（識別子のリスト）の管理
/// - フィールド編集の適用とダーティマーカーの設定
/// - コミット用に変更レコードだけを射影する
///
/// 作業セットはコピーではなくビュー。編集は識別子で全体コレクションに直接適用する。
pub struct EditTracker {
    /// 現在の作業コピー（ローカル編集を含む）
    records: IndexMap<u64, AttendanceEntry>,
    /// 最後のリフレッシュ時点の値（グループ切替で編集を破棄するときに使う）
    baseline: IndexMap<u64, AttendanceEntry>,
    levels: Vec<ConfirmLevel>,
    execs: Vec<ExecOption>,
    active_group: Option<i64>,
    /// 作業セットの識別子（サーバーの並び順）
    working_set: Vec<u64>,
}

impl EditTracker {
    pub fn new() -> Self {
        EditTracker {
            records: IndexMap::new(),
            baseline: IndexMap::new(),
            levels: Vec::new(),
            execs: Vec::new(),
            active_group: None,
            working_set: Vec::new(),
        }
    }

    /// リフレッシュ結果でコレクションを丸ごと置き換える
    ///
    /// すべてのローカル編集・ダーティマーカー・表示ステータスは破棄される。
    /// グループ選択中なら作業セットを作り直す。
    pub fn replace_all(&mut self, data: RefreshData) {
        let mut records = IndexMap::with_capacity(data.attendance.len());
        for entry in data.attendance {
            let id = entry.user_shift_id;
            if records.insert(id, entry).is_some() {
                warn!(user_shift_id = id, "duplicate record in refresh, keeping the last one");
            }
        }
        debug!(records = records.len(), "record collection replaced");

        self.baseline = records.clone();
        self.records = records;
        self.levels = data.levels;
        self.execs = data.exec_list;
        self.rebuild_working_set();
    }

    /// 作業セットを `shift_id == group_key` のレコードに絞る
    ///
    /// 直前の作業セットの未保存編集は破棄する。
    pub fn select_group(&mut self, group_key: i64) {
        let abandoned = self.abandon_edits();
        if abandoned > 0 {
            debug!(abandoned, "unsaved edits abandoned on group switch");
        }
        self.active_group = Some(group_key);
        self.rebuild_working_set();
    }

    /// 作業セット内のレコードの 1 フィールドを編集する
    ///
    /// # 戻り値
    /// - `Ok(true)`: 適用してダーティマーカーを立てた
    /// - `Ok(false)`: 作業セットに該当レコードがない（何もしない）
    ///
    /// # エラー
    /// 値が不正なら適用しない。ダーティマーカーも立たない。
    pub fn edit_field(&mut self, record_id: u64, edit: FieldEdit) -> Result<bool, EditError> {
        edit.validate()?;

        if !self.working_set.contains(&record_id) {
            debug!(record_id, "edit for a record outside the working set ignored");
            return Ok(false);
        }
        let Some(entry) = self.records.get_mut(&record_id) else {
            return Ok(false);
        };
        edit.apply(entry);
        entry.changed = true;
        Ok(true)
    }

    /// フィールド名と JSON 値で編集する（ホストからの入力用）
    pub fn edit_named(
        &mut self,
        record_id: u64,
        field: &str,
        value: &Value,
    ) -> Result<bool, EditError> {
        let edit = FieldEdit::from_name(field, value)?;
        self.edit_field(record_id, edit)
    }

    /// 作業セット内の変更レコードをコミット行に射影する
    ///
    /// ローカル状態は変更しない。
    pub fn dirty_rows(&self) -> Vec<CommitRow> {
        self.working_entries()
            .filter(|e| e.changed)
            .map(|e| CommitRow {
                user_shift_id: e.user_shift_id,
                confirm_level_id: e.confirm_level_id,
                start_override: format_mysql(&e.start_time),
                end_override: format_mysql(&e.end_time),
                hours_override: e.hours_override.clone(),
                assigned_exec: e.assigned_exec,
            })
            .collect()
    }

    pub fn dirty_ids(&self) -> Vec<u64> {
        self.working_entries()
            .filter(|e| e.changed)
            .map(|e| e.user_shift_id)
            .collect()
    }

    pub fn has_changes(&self) -> bool {
        self.working_entries().any(|e| e.changed)
    }

    /// 作業セットのスナップショット
    pub fn working_set(&self) -> Vec<&AttendanceEntry> {
        self.working_entries().collect()
    }

    /// フィルタを適用した作業セットのスナップショット
    pub fn filtered(&self, filter: RowFilter) -> Vec<&AttendanceEntry> {
        self.working_entries().filter(|e| filter.matches(e)).collect()
    }

    pub fn record(&self, record_id: u64) -> Option<&AttendanceEntry> {
        self.records.get(&record_id)
    }

    /// 全レコード（サーバーの並び順）
    pub fn records(&self) -> impl Iterator<Item = &AttendanceEntry> {
        self.records.values()
    }

    pub fn active_group(&self) -> Option<i64> {
        self.active_group
    }

    /// シフトごとの選択肢（コレクション内で最初に出現した順）
    pub fn group_options(&self) -> Vec<GroupOption> {
        let mut seen = IndexMap::new();
        for entry in self.records.values() {
            seen.entry(entry.shift.shift_id).or_insert_with(|| {
                format!("{} | Shift {}", entry.parent_event.name, entry.shift.shift_num)
            });
        }
        seen.into_iter()
            .map(|(key, text)| GroupOption { key, value: key, text })
            .collect()
    }

    pub fn confirm_levels(&self) -> &[ConfirmLevel] {
        &self.levels
    }

    pub fn exec_options(&self) -> &[ExecOption] {
        &self.execs
    }

    /// レコードの担当者の選択肢を引く
    pub fn exec_for(&self, entry: &AttendanceEntry) -> Option<&ExecOption> {
        let id = entry.assigned_exec?;
        self.execs
            .iter()
            .find(|x| x.user_id.unwrap_or(x.value) == id)
    }

    // ===== Private メソッド =====

    fn working_entries(&self) -> impl Iterator<Item = &AttendanceEntry> {
        self.working_set.iter().filter_map(|id| self.records.get(id))
    }

    fn rebuild_working_set(&mut self) {
        self.working_set = match self.active_group {
            Some(group) => self
                .records
                .values()
                .filter(|e| e.shift.shift_id == group)
                .map(|e| e.user_shift_id)
                .collect(),
            None => Vec::new(),
        };
    }

    /// 作業セットの変更レコードをリフレッシュ時点の値に戻す
    fn abandon_edits(&mut self) -> usize {
        let mut count = 0;
        for id in &self.working_set {
            let Some(entry) = self.records.get_mut(id) else {
                continue;
            };
            if !entry.changed {
                continue;
            }
            if let Some(original) = self.baseline.get(id) {
                *entry = original.clone();
                count += 1;
            }
        }
        count
    }
}

impl Default for EditTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hours::{effective_hours, format_duration};
    use roster_proto::RecordStatus;
    use serde_json::json;

    fn entry(id: u64, shift_id: i64, confirm: i64, exec: Option<i64>) -> Value {
        json!({
            "user_shift_id": id,
            "confirm_level_id": confirm,
            "start_time": "2024-05-01T09:00:00.000Z",
            "end_time": "2024-05-01T13:00:00.000Z",
            "hours_override": null,
            "other_shifts": "",
            "assigned_exec": exec,
            "shift": { "shift_id": shift_id, "shift_num": shift_id * 10 },
            "parentEvent": { "event_id": 1, "name": "Spring Fair" },
            "user": { "user_id": id + 1000, "first_name": "U", "last_name": "L" }
        })
    }

    fn refresh_data() -> RefreshData {
        serde_json::from_value(json!({
            "attendance": [
                entry(41, 3, 0, Some(7)),
                entry(42, 3, 1, None),
                entry(43, 4, 0, Some(8)),
            ],
            "levels": [{ "id": 0, "name": "Pending" }, { "id": 1, "name": "Confirmed" }],
            "execList": [
                { "user_id": 7, "value": 7, "text": "Grace" },
                { "user_id": 8, "value": 8, "text": "Alan" }
            ]
        }))
        .unwrap()
    }

    fn tracker_on_group_3() -> EditTracker {
        let mut t = EditTracker::new();
        t.replace_all(refresh_data());
        t.select_group(3);
        t
    }

    #[test]
    fn test_no_working_set_until_group_selected() {
        let mut t = EditTracker::new();
        t.replace_all(refresh_data());
        assert!(t.working_set().is_empty());
        assert_eq!(t.edit_field(41, FieldEdit::ConfirmLevel(1)), Ok(false));
    }

    #[test]
    fn test_select_group_filters_by_shift() {
        let t = tracker_on_group_3();
        let ids: Vec<u64> = t.working_set().iter().map(|e| e.user_shift_id).collect();
        assert_eq!(ids, vec![41, 42]);
    }

    #[test]
    fn test_edit_marks_only_addressed_record() {
        let mut t = tracker_on_group_3();
        assert_eq!(t.edit_field(42, FieldEdit::ConfirmLevel(2)), Ok(true));

        assert!(t.record(42).unwrap().changed);
        assert_eq!(t.record(42).unwrap().confirm_level_id, 2);
        assert!(!t.record(41).unwrap().changed);
        assert!(!t.record(43).unwrap().changed);
    }

    #[test]
    fn test_edit_outside_working_set_is_noop() {
        let mut t = tracker_on_group_3();
        assert_eq!(t.edit_field(43, FieldEdit::ConfirmLevel(5)), Ok(false));
        assert_eq!(t.edit_field(999, FieldEdit::ConfirmLevel(5)), Ok(false));
        assert!(!t.record(43).unwrap().changed);
        assert_eq!(t.record(43).unwrap().confirm_level_id, 0);
    }

    #[test]
    fn test_changed_is_monotonic() {
        let mut t = tracker_on_group_3();
        t.edit_field(41, FieldEdit::ConfirmLevel(1)).unwrap();
        // 元の値に戻してもマーカーは消えない
        t.edit_field(41, FieldEdit::ConfirmLevel(0)).unwrap();
        assert!(t.record(41).unwrap().changed);
        // 不正な編集でも消えない
        assert!(t.edit_field(41, FieldEdit::HoursOverride("abc".into())).is_err());
        assert!(t.record(41).unwrap().changed);
    }

    #[test]
    fn test_hours_override_edit_and_effective_hours() {
        let mut t = tracker_on_group_3();
        let edit = FieldEdit::from_name("hours_override", &json!("-1:30")).unwrap();
        assert_eq!(t.edit_field(42, edit), Ok(true));

        let e = t.record(42).unwrap();
        assert!(e.changed);
        assert_eq!(format_duration(effective_hours(e).unwrap()), "2:30");

        let rows = t.dirty_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_shift_id, 42);
        assert_eq!(rows[0].hours_override, "-1:30");
    }

    #[test]
    fn test_invalid_hours_override_rejected() {
        let mut t = tracker_on_group_3();
        let err = t.edit_named(42, "hours_override", &json!("abc")).unwrap_err();
        assert_eq!(err, EditError::InvalidDuration("abc".into()));
        assert!(!t.record(42).unwrap().changed);
        assert_eq!(t.record(42).unwrap().hours_override, "");
    }

    #[test]
    fn test_out_of_range_hours_override_rejected() {
        let mut t = tracker_on_group_3();
        let err = t
            .edit_named(41, "hours_override", &json!("2562047788015"))
            .unwrap_err();
        assert_eq!(err, EditError::InvalidDuration("2562047788015".into()));

        let e = t.record(41).unwrap();
        assert!(!e.changed);
        assert_eq!(format_duration(effective_hours(e).unwrap()), "4:00");
    }

    #[test]
    fn test_effective_hours_of_out_of_range_server_value_is_error() {
        let mut e: AttendanceEntry = serde_json::from_value(entry(1, 3, 0, None)).unwrap();
        e.hours_override = "2562047788015".into();
        assert!(effective_hours(&e).is_err(), "パニックせずエラーになる");
    }

    #[test]
    fn test_dirty_rows_are_exactly_the_edited_records_in_working_set_order() {
        let mut t = EditTracker::new();
        t.replace_all(
            serde_json::from_value(json!({
                "attendance": [
                    entry(51, 9, 0, None),
                    entry(52, 9, 0, None),
                    entry(60, 8, 0, None),
                    entry(53, 9, 0, None),
                    entry(54, 9, 0, None),
                    entry(55, 9, 0, None),
                ]
            }))
            .unwrap(),
        );
        t.select_group(9);

        // 作業セットの並びとは逆順に編集する
        t.edit_named(54, "assigned_exec", &json!(7)).unwrap();
        t.edit_named(52, "confirm_level_id", &json!(1)).unwrap();
        t.edit_named(54, "hours_override", &json!("0:15")).unwrap();

        assert_eq!(t.dirty_ids(), vec![52, 54]);
        let rows = t.dirty_rows();
        let ids: Vec<u64> = rows.iter().map(|r| r.user_shift_id).collect();
        assert_eq!(ids, vec![52, 54], "変更したレコードだけを作業セットの順で");
        assert_eq!(rows[0].confirm_level_id, 1);
        assert_eq!(rows[0].assigned_exec, None);
        assert_eq!(rows[1].assigned_exec, Some(7));
        assert_eq!(rows[1].hours_override, "0:15");
        for clean in [51, 53, 55, 60] {
            assert!(!t.record(clean).unwrap().changed);
        }
    }

    #[test]
    fn test_invalid_hours_rejected_even_for_unknown_record() {
        let mut t = tracker_on_group_3();
        assert!(t.edit_field(999, FieldEdit::HoursOverride("x".into())).is_err());
    }

    #[test]
    fn test_clearing_hours_override_with_null() {
        let mut t = tracker_on_group_3();
        t.edit_named(41, "hours_override", &json!("1")).unwrap();
        t.edit_named(41, "hours_override", &Value::Null).unwrap();
        assert_eq!(t.record(41).unwrap().hours_override, "");
    }

    #[test]
    fn test_dirty_rows_project_server_fields() {
        let mut t = tracker_on_group_3();
        t.edit_named(41, "start_time", &json!("2024-05-01T08:30:00.000Z")).unwrap();
        t.edit_named(41, "assigned_exec", &json!(8)).unwrap();

        let rows = t.dirty_rows();
        assert_eq!(
            rows,
            vec![CommitRow {
                user_shift_id: 41,
                confirm_level_id: 0,
                start_override: "2024-05-01 08:30:00".into(),
                end_override: "2024-05-01 13:00:00".into(),
                hours_override: String::new(),
                assigned_exec: Some(8),
            }]
        );
        // 射影はローカル状態を変えない
        assert!(t.record(41).unwrap().changed);
        assert_eq!(t.dirty_ids(), vec![41]);
    }

    #[test]
    fn test_from_name_rejects_unknown_and_mistyped() {
        assert_eq!(
            FieldEdit::from_name("status", &json!("success")),
            Err(EditError::UnknownField("status".into()))
        );
        assert!(matches!(
            FieldEdit::from_name("confirm_level_id", &json!("two")),
            Err(EditError::InvalidValue { field: "confirm_level_id", .. })
        ));
        assert!(matches!(
            FieldEdit::from_name("end_time", &json!("soon")),
            Err(EditError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_refresh_clears_edits_and_status() {
        let mut t = tracker_on_group_3();
        t.edit_field(41, FieldEdit::ConfirmLevel(1)).unwrap();
        t.replace_all(refresh_data());

        assert_eq!(t.active_group(), Some(3));
        assert_eq!(t.working_set().len(), 2);
        assert!(t.working_set().iter().all(|e| !e.changed));
        assert!(t.working_set().iter().all(|e| e.status == RecordStatus::None));
        assert!(t.dirty_rows().is_empty());
    }

    #[test]
    fn test_switching_group_abandons_edits() {
        let mut t = tracker_on_group_3();
        t.edit_field(41, FieldEdit::ConfirmLevel(1)).unwrap();

        t.select_group(4);
        assert_eq!(t.record(41).unwrap().confirm_level_id, 0);
        assert!(!t.record(41).unwrap().changed);

        t.select_group(3);
        assert!(!t.has_changes());
    }

    #[test]
    fn test_group_options() {
        let t = tracker_on_group_3();
        let options = t.group_options();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].key, 3);
        assert_eq!(options[0].text, "Spring Fair | Shift 30");
        assert_eq!(options[1].key, 4);
    }

    #[test]
    fn test_filters() {
        let t = tracker_on_group_3();
        let mine: Vec<u64> = t
            .filtered(RowFilter::AssignedTo(7))
            .iter()
            .map(|e| e.user_shift_id)
            .collect();
        assert_eq!(mine, vec![41]);

        let unconfirmed: Vec<u64> = t
            .filtered(RowFilter::Unconfirmed)
            .iter()
            .map(|e| e.user_shift_id)
            .collect();
        assert_eq!(unconfirmed, vec![41]);
    }

    #[test]
    fn test_exec_lookup() {
        let t = tracker_on_group_3();
        let e = t.record(41).unwrap();
        assert_eq!(t.exec_for(e).unwrap().text, "Grace");
        assert!(t.exec_for(t.record(42).unwrap()).is_none());
        assert_eq!(t.confirm_levels().len(), 2);
        assert_eq!(t.exec_options().len(), 2);
    }
}
