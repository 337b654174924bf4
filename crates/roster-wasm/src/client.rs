//! AttendanceClient wasm-bindgen エクスポート
//!
//! 出欠画面から呼び出すクライアントの主エントリポイント。
//! WebSocket の生成とイベント配線だけを担い、状態はすべて `AttendanceSession` が持つ。

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::Function;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CloseEvent, Event, MessageEvent, WebSocket};

use roster_edit::{effective_hours, format_duration, RowFilter};
use roster_proto::AttendanceEntry;
use roster_session::{
    AttendanceSession, BusyIndicator, CredentialSource, Message, MessageSink, SessionConfig,
};

/// ホストの `addMessage` / `setLoading` コールバック
///
/// セッションの借用を解いてから呼ぶ。JS 側はこの中から同期的に
/// クライアントを呼び出してよい。
#[derive(Clone)]
struct JsSink {
    add_message: Function,
    set_loading: Function,
}

impl MessageSink for JsSink {
    fn add_message(&mut self, message: Message) {
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "message not serializable");
                return;
            }
        };
        let value = match js_sys::JSON::parse(&text) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = ?e, "message not parseable by JSON.parse");
                return;
            }
        };
        if let Err(e) = self.add_message.call1(&JsValue::NULL, &value) {
            warn!(error = ?e, "addMessage threw");
        }
    }
}

impl BusyIndicator for JsSink {
    fn set_loading(&mut self, busy: bool) {
        if let Err(e) = self.set_loading.call1(&JsValue::NULL, &JsValue::from_bool(busy)) {
            warn!(error = ?e, "setLoading threw");
        }
    }
}

/// localStorage から送信時に認証情報を読む
struct LocalStorageCredential {
    key: String,
}

impl CredentialSource for LocalStorageCredential {
    fn credential(&self) -> Option<String> {
        web_sys::window()?
            .local_storage()
            .ok()??
            .get_item(&self.key)
            .ok()?
    }
}

/// ソケットのイベントハンドラとクライアントが共有する状態
struct Shared {
    session: RefCell<AttendanceSession<LocalStorageCredential>>,
    sink: JsSink,
}

impl Shared {
    /// 送信キューをソケットに書き出し、溜まった副作用をホストに届ける
    ///
    /// セッションの借用はそれぞれの取り出しの間だけ持つ。
    fn pump(&self, ws: Option<&WebSocket>) {
        if let Some(ws) = ws {
            let frames = self.session.borrow_mut().take_outbound();
            for frame in frames {
                if let Err(e) = ws.send_with_str(&frame) {
                    warn!(error = ?e, "frame not sent");
                }
            }
        }

        let effects = self.session.borrow_mut().take_effects();
        let mut sink = self.sink.clone();
        for effect in effects {
            effect.deliver(&mut sink);
        }
    }
}

/// 開いている WebSocket とそのイベントハンドラ
///
/// Closure は JS 側から参照されるので、ソケットと同じ寿命で保持する。
struct Socket {
    ws: WebSocket,
    _on_open: Closure<dyn FnMut(Event)>,
    _on_message: Closure<dyn FnMut(MessageEvent)>,
    _on_close: Closure<dyn FnMut(CloseEvent)>,
}

impl Socket {
    fn detach(&self) {
        self.ws.set_onopen(None);
        self.ws.set_onmessage(None);
        self.ws.set_onclose(None);
    }
}

/// 出欠画面クライアント
///
/// ## 内部アーキテクチャ
///
/// ```text
/// AttendanceClient
///   ├── Rc<Shared>
///   │     ├── RefCell<AttendanceSession> (roster-session) - セッション状態
///   │     └── JsSink                                      - addMessage / setLoading
///   └── RefCell<Option<Socket>>                            - WebSocket + イベントハンドラ
/// ```
///
/// ## 再入について
///
/// セッションは `addMessage` / `setLoading` を直接呼ばず副作用として溜める。
/// クライアントは借用を解いてから届けるので、コールバック内で同期的に
/// `workingSet()` などを呼んでもよい。公開メソッドはすべて `&self` で受ける。
#[wasm_bindgen]
pub struct AttendanceClient {
    shared: Rc<Shared>,
    socket: RefCell<Option<Socket>>,
}

#[wasm_bindgen]
impl AttendanceClient {
    /// クライアントを初期化する（まだ接続しない）
    ///
    /// # 引数
    /// - `add_message`: `({message, more?, severity}) => void`
    /// - `set_loading`: `(busy: boolean) => void`
    /// - `config_json`: `SessionConfig` の JSON。省略時はデフォルト
    ///
    /// # エラー
    /// - 設定 JSON の解析失敗
    #[wasm_bindgen(constructor)]
    pub fn new(
        add_message: Function,
        set_loading: Function,
        config_json: Option<String>,
    ) -> Result<AttendanceClient, JsError> {
        let config = match config_json {
            Some(text) => SessionConfig::from_json(&text)?,
            None => SessionConfig::default(),
        };
        let credential = LocalStorageCredential {
            key: config.credential_key.clone(),
        };
        let shared = Shared {
            session: RefCell::new(AttendanceSession::new(config, credential)),
            sink: JsSink {
                add_message,
                set_loading,
            },
        };
        Ok(AttendanceClient {
            shared: Rc::new(shared),
            socket: RefCell::new(None),
        })
    }

    /// 現在のページと同じホストの WebSocket エンドポイントに接続する
    ///
    /// ページが https なら wss、それ以外は ws。
    /// 接続完了時に初回リフレッシュが送られる。
    ///
    /// # エラー
    /// - 既に接続中・接続済み
    /// - `window` / `location` が取得できない
    /// - WebSocket の生成失敗
    #[wasm_bindgen]
    pub fn open(&self) -> Result<(), JsError> {
        let window = web_sys::window().ok_or_else(|| JsError::new("No window available"))?;
        let location = window.location();
        let protocol = location.protocol().map_err(js_error)?;
        let host = location.host().map_err(js_error)?;

        let url = self.shared.session.borrow_mut().open(&protocol, &host)?;
        debug!(%url, "connecting");

        let ws = match WebSocket::new(&url) {
            Ok(ws) => ws,
            Err(e) => {
                // セッションを Closed に戻す
                let mut session = self.shared.session.borrow_mut();
                session.close();
                session.on_close();
                return Err(js_error(e));
            }
        };

        let on_open = {
            let shared = Rc::clone(&self.shared);
            let ws = ws.clone();
            Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
                let opened = shared.session.borrow_mut().on_open(now_ms());
                if let Err(e) = opened {
                    warn!(error = %e, "initial refresh not sent");
                }
                shared.pump(Some(&ws));
            })
        };

        let on_message = {
            let shared = Rc::clone(&self.shared);
            let ws = ws.clone();
            Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
                let text = event
                    .data()
                    .as_string()
                    .unwrap_or_else(|| String::from("<non-text frame>"));
                shared.session.borrow_mut().handle_frame(&text, now_ms());
                shared.pump(Some(&ws));
            })
        };

        let on_close = {
            let shared = Rc::clone(&self.shared);
            Closure::<dyn FnMut(CloseEvent)>::new(move |event: CloseEvent| {
                debug!(code = event.code(), "socket closed");
                shared.session.borrow_mut().on_close();
                shared.pump(None);
            })
        };

        ws.set_onopen(Some(on_open.as_ref().unchecked_ref()));
        ws.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
        ws.set_onclose(Some(on_close.as_ref().unchecked_ref()));

        *self.socket.borrow_mut() = Some(Socket {
            ws,
            _on_open: on_open,
            _on_message: on_message,
            _on_close: on_close,
        });
        Ok(())
    }

    /// 定期タイマー（setInterval から 1 秒程度ごとに呼ぶ）
    ///
    /// タイムアウトした応答待ちを回収し、必要なら再リフレッシュを送る。
    #[wasm_bindgen]
    pub fn tick(&self, now_ms: f64) {
        self.shared.session.borrow_mut().tick(now_ms as u64);
        self.pump();
    }

    /// 全状態の再取得を要求する
    #[wasm_bindgen]
    pub fn refresh(&self) -> Result<(), JsError> {
        let result = self.shared.session.borrow_mut().refresh(now_ms());
        self.pump();
        Ok(result?)
    }

    /// 作業セットを切り替える（未保存の編集は破棄される）
    #[wasm_bindgen(js_name = "selectGroup")]
    pub fn select_group(&self, group_key: f64) {
        self.shared.session.borrow_mut().select_group(group_key as i64);
    }

    /// 作業セット内のレコードのフィールドを 1 つ編集する
    ///
    /// # 引数
    /// - `record_id`: `user_shift_id`
    /// - `field`: `confirm_level_id` / `start_time` / `end_time` / `hours_override` / `assigned_exec`
    /// - `value`: 新しい値（JS の値そのまま）
    ///
    /// # 戻り値
    /// 作業セット内のレコードに適用されたら true
    ///
    /// # エラー
    /// - 未知のフィールド名、値の型や書式が不正
    #[wasm_bindgen(js_name = "editField")]
    pub fn edit_field(&self, record_id: f64, field: &str, value: JsValue) -> Result<bool, JsError> {
        let value = js_to_json(&value)?;
        let applied = self
            .shared
            .session
            .borrow_mut()
            .edit_named(record_id as u64, field, &value)?;
        Ok(applied)
    }

    /// 作業セットの変更レコードをまとめてコミットする
    ///
    /// 結果は `addMessage` で通知され、その後自動でリフレッシュされる。
    #[wasm_bindgen]
    pub fn commit(&self) -> Result<(), JsError> {
        let result = self.shared.session.borrow_mut().commit(now_ms());
        // 送信に失敗しても通知とビジー解除は届ける
        self.pump();
        Ok(result?)
    }

    /// 作業セットのスナップショット（JSON 配列）
    ///
    /// 各行には `effective_hours`（`H:MM` 表記）と担当者の表示名が付く。
    ///
    /// # 引数
    /// - `filter`: `"mine"`（`user_id` が担当）/ `"unconfirmed"` / 省略で全件
    /// - `user_id`: `"mine"` のときの利用者 ID
    #[wasm_bindgen(js_name = "workingSet")]
    pub fn working_set(
        &self,
        filter: Option<String>,
        user_id: Option<f64>,
    ) -> Result<String, JsError> {
        let filter = match (filter.as_deref(), user_id) {
            (None, _) => None,
            (Some("mine"), Some(id)) => Some(RowFilter::AssignedTo(id as i64)),
            (Some("mine"), None) => return Err(JsError::new("Filter \"mine\" needs a user id")),
            (Some("unconfirmed"), _) => Some(RowFilter::Unconfirmed),
            (Some(other), _) => return Err(JsError::new(&format!("Unknown filter: {other}"))),
        };

        let session = self.shared.session.borrow();
        let tracker = session.tracker();
        let entries = match filter {
            Some(f) => tracker.filtered(f),
            None => tracker.working_set(),
        };
        let rows: Vec<RowView<'_>> = entries
            .into_iter()
            .map(|entry| RowView {
                effective_hours: effective_hours(entry).ok().map(format_duration),
                assigned_exec_name: tracker.exec_for(entry).map(|x| x.text.as_str()),
                entry,
            })
            .collect();
        Ok(serde_json::to_string(&rows)?)
    }

    /// グループ（シフト）選択肢（JSON 配列 `[{key, value, text}]`）
    #[wasm_bindgen(js_name = "groupOptions")]
    pub fn group_options(&self) -> Result<String, JsError> {
        let session = self.shared.session.borrow();
        Ok(serde_json::to_string(&session.tracker().group_options())?)
    }

    /// 確認レベル一覧（JSON 配列 `[{id, name}]`）
    #[wasm_bindgen(js_name = "confirmLevels")]
    pub fn confirm_levels(&self) -> Result<String, JsError> {
        let session = self.shared.session.borrow();
        Ok(serde_json::to_string(session.tracker().confirm_levels())?)
    }

    /// 担当者候補一覧（JSON 配列 `[{user_id, value, text}]`）
    #[wasm_bindgen(js_name = "execOptions")]
    pub fn exec_options(&self) -> Result<String, JsError> {
        let session = self.shared.session.borrow();
        Ok(serde_json::to_string(session.tracker().exec_options())?)
    }

    /// レコードの実労働時間（`H:MM` 表記）
    ///
    /// レコードがない、または上書き値が解釈できないときは `undefined`。
    #[wasm_bindgen(js_name = "effectiveHours")]
    pub fn effective_hours(&self, record_id: f64) -> Option<String> {
        let session = self.shared.session.borrow();
        let entry = session.tracker().record(record_id as u64)?;
        effective_hours(entry).ok().map(format_duration)
    }

    /// 作業セットに未コミットの変更があるか
    #[wasm_bindgen(js_name = "hasChanges")]
    pub fn has_changes(&self) -> bool {
        self.shared.session.borrow().tracker().has_changes()
    }

    /// 統計情報を JSON 文字列で返す（デバッグ用）
    ///
    /// ```json
    /// {
    ///   "state": "Open",
    ///   "frames_sent": 4,
    ///   "frames_received": 3,
    ///   "frames_malformed": 0,
    ///   "pending": 1,
    ///   "completed": 3,
    ///   "unmatched": 0,
    ///   "expired": 0,
    ///   "records": 120,
    ///   "working_set": 18,
    ///   "dirty": 2
    /// }
    /// ```
    #[wasm_bindgen(js_name = "getStats")]
    pub fn get_stats(&self) -> String {
        let stats = self.shared.session.borrow().stats();
        serde_json::json!({
            "state": format!("{:?}", stats.channel.state),
            "frames_sent": stats.channel.frames_sent,
            "frames_received": stats.channel.frames_received,
            "frames_malformed": stats.channel.frames_malformed,
            "pending": stats.correlator.pending,
            "completed": stats.correlator.completed,
            "unmatched": stats.correlator.unmatched,
            "expired": stats.correlator.expired,
            "records": stats.records,
            "working_set": stats.working_set,
            "dirty": stats.dirty,
        })
        .to_string()
    }

    /// 接続を閉じる
    ///
    /// 以降に届いた応答は処理されない。応答待ちは `tick` で回収される。
    #[wasm_bindgen]
    pub fn close(&self) {
        let socket = self.socket.borrow_mut().take();
        if let Some(socket) = socket {
            socket.detach();
            if let Err(e) = socket.ws.close() {
                warn!(error = ?e, "socket close failed");
            }
        }
        let mut session = self.shared.session.borrow_mut();
        session.close();
        session.on_close();
    }
}

impl AttendanceClient {
    /// 開いているソケットがあれば送信キューを書き出し、副作用を届ける
    fn pump(&self) {
        let ws = self.socket.borrow().as_ref().map(|socket| socket.ws.clone());
        self.shared.pump(ws.as_ref());
    }
}

impl Drop for AttendanceClient {
    fn drop(&mut self) {
        if self.socket.get_mut().is_some() {
            self.close();
        }
    }
}

/// 作業セットの 1 行と表示用の派生値
#[derive(Serialize)]
struct RowView<'a> {
    #[serde(flatten)]
    entry: &'a AttendanceEntry,
    effective_hours: Option<String>,
    assigned_exec_name: Option<&'a str>,
}

fn now_ms() -> u64 {
    js_sys::Date::now() as u64
}

fn js_to_json(value: &JsValue) -> Result<Value, JsError> {
    if value.is_undefined() || value.is_null() {
        return Ok(Value::Null);
    }
    let text: String = js_sys::JSON::stringify(value).map_err(js_error)?.into();
    Ok(serde_json::from_str(&text)?)
}

fn js_error(value: JsValue) -> JsError {
    JsError::new(&value.as_string().unwrap_or_else(|| format!("{value:?}")))
}
