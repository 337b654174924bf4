//! 出欠画面セッション
//!
//! チャンネル・相関器・編集追跡器を束ね、リフレッシュとコミットの流れを管理する。

use roster_channel::{ChannelError, ChannelSession, ChannelState, ChannelStats};
use roster_edit::{EditTracker, FieldEdit};
use roster_proto::{RefreshData, Response};
use roster_rpc::{Correlator, CorrelatorStats, Dispatch};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::host::{BusyIndicator, CredentialSource, Effect, Message, MessageSink};
use crate::{COMMIT_SAVED_MESSAGE, REQUEST_TIMED_OUT_MESSAGE};

/// 応答待ちリクエストの後続処理
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    /// 応答でコレクションを置き換える
    Refresh,
    /// 結果を通知し、ビジー解除とリフレッシュを行う
    Commit,
}

/// 出欠画面セッション
///
/// 画面を開くたびに 1 つ作り、閉じるときに `close()` して破棄する。
///
/// ## 内部アーキテクチャ
///
/// ```text
/// AttendanceSession
///   ├── ChannelSession      (roster-channel) - 接続状態・送信キュー・受信デコード
///   ├── Correlator<Pending> (roster-rpc)     - action → 後続処理
///   └── EditTracker         (roster-edit)    - コレクション・作業セット・ダーティマーカー
/// ```
///
/// すべての操作は単一スレッドのイベントループ上で `&mut self` 経由で行う。
/// メッセージ表示とビジー表示は直接呼ばず `Effect` として溜め、
/// ホストが `take_effects()` で取り出して届ける。
pub struct AttendanceSession<H> {
    config: SessionConfig,
    host: H,
    channel: ChannelSession,
    correlator: Correlator<Pending>,
    tracker: EditTracker,
    /// ホストに未配送の副作用（発生順）
    effects: Vec<Effect>,
}

impl<H: CredentialSource> AttendanceSession<H> {
    pub fn new(config: SessionConfig, host: H) -> Self {
        let channel = ChannelSession::new(config.endpoint_path.clone());
        let correlator = Correlator::new(config.request_timeout_ms);
        AttendanceSession {
            config,
            host,
            channel,
            correlator,
            tracker: EditTracker::new(),
            effects: Vec::new(),
        }
    }

    /// 接続を開始し、ホストが接続すべき URL を返す
    pub fn open(&mut self, page_protocol: &str, host_name: &str) -> Result<String, SessionError> {
        Ok(self.channel.open(page_protocol, host_name)?)
    }

    /// ソケットの open イベント。初回リフレッシュを送る
    pub fn on_open(&mut self, now_ms: u64) -> Result<(), SessionError> {
        self.channel.on_open();
        self.refresh(now_ms)
    }

    /// セッションを閉じる
    ///
    /// 応答待ちのリクエストはタイムアウト掃除で回収される。
    pub fn close(&mut self) {
        self.channel.close();
    }

    /// ソケットの close イベント
    pub fn on_close(&mut self) {
        self.channel.on_close();
    }

    /// 全状態の再取得を要求する
    pub fn refresh(&mut self, now_ms: u64) -> Result<(), SessionError> {
        self.send_request(Pending::Refresh, None, now_ms)
    }

    /// 作業セットの変更レコードを 1 リクエストでコミットする
    ///
    /// 1. `set_loading(true)`
    /// 2. 変更レコードだけをサーバーが受け付けるフィールドに射影
    /// 3. 1 件のリクエストとして送信
    /// 4. 応答で成否を通知（`handle_frame` 内）
    /// 5. 成否にかかわらず `set_loading(false)` とリフレッシュ
    ///
    /// 送信できなかった場合もその場で 4, 5 を行ってからエラーを返す。
    pub fn commit(&mut self, now_ms: u64) -> Result<(), SessionError> {
        self.effects.push(Effect::Loading(true));

        let rows = self.tracker.dirty_rows();
        debug!(rows = rows.len(), "commit");

        let sent = serde_json::to_value(&rows)
            .map_err(SessionError::Payload)
            .and_then(|payload| self.send_request(Pending::Commit, Some(payload), now_ms));

        if let Err(e) = sent {
            self.notify(Message::negative(e.to_string(), None));
            self.settle_commit(now_ms);
            return Err(e);
        }
        Ok(())
    }

    /// 受信したテキストフレームを処理する
    ///
    /// デコードできないフレームは global エラーとして通知する。
    pub fn handle_frame(&mut self, text: &str, now_ms: u64) {
        match self.channel.recv_frame(text) {
            Ok(response) => self.handle_response(response, now_ms),
            Err(ChannelError::MalformedFrame { reason, raw }) => {
                self.report_global(Response::global_error(
                    format!("Malformed frame: {reason}"),
                    Some(raw),
                ));
            }
            Err(e) => self.report_global(Response::global_error(e.to_string(), None)),
        }
    }

    /// タイマー tick。タイムアウトした応答待ちを回収する
    ///
    /// ホストの setInterval から定期的に呼び出す。
    pub fn tick(&mut self, now_ms: u64) {
        for expired in self.correlator.sweep_expired(now_ms) {
            self.notify(Message::negative(
                REQUEST_TIMED_OUT_MESSAGE,
                Some(expired.action),
            ));
            if expired.completion == Pending::Commit {
                self.settle_commit(now_ms);
            }
        }
    }

    /// 作業セットを切り替える（未保存の編集は破棄される）
    pub fn select_group(&mut self, group_key: i64) {
        self.tracker.select_group(group_key);
    }

    pub fn edit_field(&mut self, record_id: u64, edit: FieldEdit) -> Result<bool, SessionError> {
        Ok(self.tracker.edit_field(record_id, edit)?)
    }

    pub fn edit_named(
        &mut self,
        record_id: u64,
        field: &str,
        value: &Value,
    ) -> Result<bool, SessionError> {
        Ok(self.tracker.edit_named(record_id, field, value)?)
    }

    /// ホストが送信すべきフレームを取り出す
    pub fn take_outbound(&mut self) -> Vec<String> {
        self.channel.take_outbound()
    }

    /// ホストに届けるべき副作用を発生順に取り出す
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// 溜まった副作用をセッションが持つホストに届ける
    ///
    /// ホストのコールバックがセッションに触れない native 環境向け。
    pub fn deliver_effects(&mut self)
    where
        H: MessageSink + BusyIndicator,
    {
        for effect in std::mem::take(&mut self.effects) {
            effect.deliver(&mut self.host);
        }
    }

    /// 読み取り専用のレコードビュー
    pub fn tracker(&self) -> &EditTracker {
        &self.tracker
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    pub fn is_pending(&self, action: &str) -> bool {
        self.correlator.is_pending(action)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            channel: self.channel.stats(),
            correlator: self.correlator.stats(),
            records: self.tracker.records().count(),
            working_set: self.tracker.working_set().len(),
            dirty: self.tracker.dirty_ids().len(),
        }
    }

    // ===== Private メソッド =====

    /// 完了ハンドルを登録して Envelope を送信キューに積む
    ///
    /// 送信に失敗したら登録を取り消す。
    fn send_request(
        &mut self,
        kind: Pending,
        payload: Option<Value>,
        now_ms: u64,
    ) -> Result<(), SessionError> {
        let credential = self.credential();
        let verb = match kind {
            Pending::Refresh => &self.config.refresh_verb,
            Pending::Commit => &self.config.commit_verb,
        };
        let request = self
            .correlator
            .request(verb, &credential, payload, kind, now_ms);

        if let Err(e) = self.channel.send(&request) {
            self.correlator.remove(&request.action);
            warn!(action = %request.action, error = %e, "request not sent");
            return Err(e.into());
        }
        Ok(())
    }

    fn handle_response(&mut self, response: Response, now_ms: u64) {
        match self.correlator.dispatch(response) {
            Dispatch::Global(global) => self.report_global(global),
            Dispatch::Complete {
                completion: Pending::Refresh,
                response,
            } => self.complete_refresh(response),
            Dispatch::Complete {
                completion: Pending::Commit,
                response,
            } => self.complete_commit(response, now_ms),
        }
    }

    fn complete_refresh(&mut self, response: Response) {
        if !response.is_success() {
            self.notify(Message::negative(
                response.error_text(),
                response.details.clone(),
            ));
            return;
        }
        match response.data_as::<RefreshData>() {
            Ok(data) => self.tracker.replace_all(data),
            Err(e) => {
                warn!(error = %e, "refresh data rejected");
                self.notify(Message::negative(e.to_string(), None));
            }
        }
    }

    fn complete_commit(&mut self, response: Response, now_ms: u64) {
        let message = if response.is_success() {
            Message::positive(success_text(response.data.as_ref()))
        } else {
            Message::negative(response.error_text(), response.details.clone())
        };
        self.notify(message);
        self.settle_commit(now_ms);
    }

    /// コミットの決着後処理
    ///
    /// ビジー解除とリフレッシュは成否に関係なく必ず行う。
    fn settle_commit(&mut self, now_ms: u64) {
        self.effects.push(Effect::Loading(false));
        if let Err(e) = self.refresh(now_ms) {
            warn!(error = %e, "post-commit refresh not sent");
        }
    }

    fn report_global(&mut self, global: Response) {
        warn!(error = global.error_text(), "global error");
        self.notify(Message::negative(
            global.error_text(),
            global.details.clone(),
        ));
    }

    fn notify(&mut self, message: Message) {
        self.effects.push(Effect::Message(message));
    }

    fn credential(&self) -> String {
        self.host.credential().unwrap_or_else(|| {
            warn!("no credential available, sending empty key");
            String::new()
        })
    }
}

/// 成功応答の `data` を表示用テキストにする
fn success_text(data: Option<&Value>) -> String {
    match data {
        Some(Value::String(s)) => s.clone(),
        None | Some(Value::Null) => COMMIT_SAVED_MESSAGE.to_string(),
        Some(other) => other.to_string(),
    }
}

/// セッション統計情報
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub channel: ChannelStats,
    pub correlator: CorrelatorStats,
    /// コレクション内のレコード数
    pub records: usize,
    pub working_set: usize,
    /// 作業セット内の変更レコード数
    pub dirty: usize,
}
