//! 応答待ちテーブルと dispatch

use indexmap::IndexMap;
use roster_proto::{Request, Response};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{action_verb, ActionIdGen, DEFAULT_REQUEST_TIMEOUT_MS, UNMATCHED_RESPONSE_ERROR};

/// 応答待ちのエントリ
#[derive(Debug)]
struct PendingEntry<C> {
    /// 応答到着時に呼び出し側へ返す完了ハンドル
    completion: C,
    /// 登録時刻（ミリ秒）
    created_at_ms: u64,
}

/// dispatch の結果
#[derive(Debug)]
pub enum Dispatch<C> {
    /// 登録済みリクエストへの応答。エントリは既に表から消えている
    Complete { completion: C, response: Response },
    /// global エラー（サーバーからの `"global"` か、相関できなかった応答の合成）
    Global(Response),
}

/// タイムアウトで回収されたエントリ
#[derive(Debug)]
pub struct Expired<C> {
    pub action: String,
    pub completion: C,
    /// 登録からの経過時間（ミリ秒）
    pub age_ms: u64,
}

/// リクエスト相関器
///
/// `C` は完了ハンドルの型。呼び出し側は `Dispatch::Complete` で返ってきた
/// ハンドルを一度だけ実行する。コールバック（`Box<dyn FnOnce(Response)>`）でも、
/// 後続処理を表す enum でもよい。
///
/// 同じ action で二重登録すると前の登録は黙って置き換わる（ログのみ）。
/// action の一意性は `request()` の連番で担保する。
pub struct Correlator<C> {
    /// 応答待ちテーブル（登録順を保持）
    pending: IndexMap<String, PendingEntry<C>>,
    ids: ActionIdGen,
    /// 応答待ちタイムアウト（ミリ秒）。0 なら回収しない
    timeout_ms: u64,
    completed: u64,
    unmatched: u64,
    expired: u64,
    displaced: u64,
}

impl<C> Correlator<C> {
    pub fn new(timeout_ms: u64) -> Self {
        Correlator {
            pending: IndexMap::new(),
            ids: ActionIdGen::new(),
            timeout_ms,
            completed: 0,
            unmatched: 0,
            expired: 0,
            displaced: 0,
        }
    }

    /// Envelope を組み立て、完了ハンドルを登録して返す
    ///
    /// 返した Envelope の送信は呼び出し側（チャンネル）が行う。
    ///
    /// # 引数
    /// - `verb`: action キーの接頭辞（`refresh`, `update` など）
    /// - `credential`: Envelope の `key` に入れる認証情報
    /// - `payload`: リクエスト固有のペイロード
    /// - `completion`: 応答到着時に返す完了ハンドル
    /// - `now_ms`: 現在時刻（タイムアウト計算用）
    pub fn request(
        &mut self,
        verb: &str,
        credential: &str,
        payload: Option<Value>,
        completion: C,
        now_ms: u64,
    ) -> Request {
        let action = self.ids.next_action(verb);
        self.register(action.clone(), completion, now_ms);
        Request::new(action, credential, payload)
    }

    /// 明示した action で完了ハンドルを登録する
    ///
    /// 既存の登録があれば置き換え、置き換えられたハンドルを返す。
    pub fn register(&mut self, action: impl Into<String>, completion: C, now_ms: u64) -> Option<C> {
        let action = action.into();
        let displaced = self.pending.shift_remove(&action).map(|entry| entry.completion);
        if displaced.is_some() {
            self.displaced += 1;
            warn!(%action, "pending request replaced by a newer one with the same action");
        }
        self.pending.insert(
            action,
            PendingEntry {
                completion,
                created_at_ms: now_ms,
            },
        );
        displaced
    }

    /// 未送信のまま破棄するリクエストの登録を取り消す
    ///
    /// 送信に失敗したときだけ使う。送信済みリクエストは取り消せない。
    pub fn remove(&mut self, action: &str) -> Option<C> {
        self.pending.shift_remove(action).map(|entry| entry.completion)
    }

    /// 受信した Envelope を振り分ける
    ///
    /// - `"global"` → `Dispatch::Global`（テーブルは変更しない）
    /// - 一致するエントリあり → エントリを削除して `Dispatch::Complete`
    /// - 一致なし → 元の Envelope を details に入れた global エラーを合成
    pub fn dispatch(&mut self, response: Response) -> Dispatch<C> {
        if response.is_global() {
            debug!(error = ?response.error, "global envelope");
            return Dispatch::Global(response);
        }

        match self.pending.shift_remove(&response.action) {
            Some(entry) => {
                self.completed += 1;
                debug!(
                    action = %response.action,
                    verb = action_verb(&response.action),
                    status = ?response.status,
                    "request completed"
                );
                Dispatch::Complete {
                    completion: entry.completion,
                    response,
                }
            }
            None => {
                self.unmatched += 1;
                warn!(action = %response.action, "response with no known request");
                let details = response
                    .encode()
                    .unwrap_or_else(|_| format!("{response:?}"));
                Dispatch::Global(Response::global_error(UNMATCHED_RESPONSE_ERROR, Some(details)))
            }
        }
    }

    /// タイムアウトしたエントリを登録順に回収する
    pub fn sweep_expired(&mut self, now_ms: u64) -> Vec<Expired<C>> {
        if self.timeout_ms == 0 || self.pending.is_empty() {
            return Vec::new();
        }

        let timeout = self.timeout_ms;
        let stale: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, entry)| now_ms.saturating_sub(entry.created_at_ms) >= timeout)
            .map(|(action, _)| action.clone())
            .collect();

        let mut expired = Vec::with_capacity(stale.len());
        for action in stale {
            if let Some(entry) = self.pending.shift_remove(&action) {
                let age_ms = now_ms.saturating_sub(entry.created_at_ms);
                warn!(%action, age_ms, "request expired without response");
                expired.push(Expired {
                    action,
                    completion: entry.completion,
                    age_ms,
                });
            }
        }
        self.expired += expired.len() as u64;
        expired
    }

    pub fn is_pending(&self, action: &str) -> bool {
        self.pending.contains_key(action)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn stats(&self) -> CorrelatorStats {
        CorrelatorStats {
            pending: self.pending.len(),
            completed: self.completed,
            unmatched: self.unmatched,
            expired: self.expired,
            displaced: self.displaced,
        }
    }
}

impl<C> Default for Correlator<C> {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT_MS)
    }
}

/// 相関器の統計情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelatorStats {
    /// 応答待ちの数
    pub pending: usize,
    pub completed: u64,
    /// 相関できなかった応答の数
    pub unmatched: u64,
    pub expired: u64,
    /// 同じ action の再登録で置き換えられた数
    pub displaced: u64,
}
