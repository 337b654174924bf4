//! 時間補正（hours override）と実効時間の計算

use std::sync::OnceLock;

use chrono::TimeDelta;
use regex::Regex;
use roster_proto::AttendanceEntry;

use crate::error::EditError;

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([+-])?([0-9]+)(?::([0-9]{2}))?(?::([0-9]{2}))?$")
            .expect("hours override pattern is valid")
    })
}

/// 補正できる時間の上限（絶対値）
pub const MAX_OVERRIDE_HOURS: i64 = 24 * 366;

/// 符号付きの時間補正
///
/// 文字列形式は `[+-]H[:MM[:SS]]`。`"-1:30"` は −1 時間 30 分（符号は全体にかかる）。
/// 空文字列は補正なし。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoursOverride(TimeDelta);

impl HoursOverride {
    pub const ZERO: Self = HoursOverride(TimeDelta::zero());

    /// 時間補正文字列を読み取る
    ///
    /// # エラー
    /// - `EditError::InvalidDuration`: 形式不一致、分・秒が 60 以上、
    ///   `MAX_OVERRIDE_HOURS` 時間を超える
    pub fn parse(s: &str) -> Result<Self, EditError> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::ZERO);
        }
        let invalid = || EditError::InvalidDuration(s.to_string());
        let caps = pattern().captures(s).ok_or_else(invalid)?;

        let negative = caps.get(1).is_some_and(|m| m.as_str() == "-");
        let field = |i: usize| -> Result<i64, EditError> {
            caps.get(i)
                .map_or(Ok(0), |m| m.as_str().parse::<i64>())
                .map_err(|_| invalid())
        };
        let (hours, minutes, seconds) = (field(2)?, field(3)?, field(4)?);
        if minutes >= 60 || seconds >= 60 || hours > MAX_OVERRIDE_HOURS {
            return Err(invalid());
        }

        let total = hours * 3600 + minutes * 60 + seconds;
        let delta = TimeDelta::try_seconds(total).ok_or_else(invalid)?;
        Ok(HoursOverride(if negative { -delta } else { delta }))
    }

    pub fn as_delta(&self) -> TimeDelta {
        self.0
    }
}

/// 表示用の実効時間 `(end − start) + hours_override`
///
/// 保存はせず、毎回計算する。
///
/// # エラー
/// - `EditError::InvalidDuration`: レコードの補正文字列が不正（サーバー由来の値など）、
///   または合計が表現できない
pub fn effective_hours(entry: &AttendanceEntry) -> Result<TimeDelta, EditError> {
    let worked = entry.end_time.signed_duration_since(entry.start_time);
    let adjust = HoursOverride::parse(&entry.hours_override)?;
    worked
        .checked_add(&adjust.as_delta())
        .ok_or_else(|| EditError::InvalidDuration(entry.hours_override.clone()))
}

/// 時間を `[-]H:MM` で整形する（秒があれば `[-]H:MM:SS`）
pub fn format_duration(d: TimeDelta) -> String {
    let total = d.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let abs = total.unsigned_abs();
    let (h, m, s) = (abs / 3600, (abs % 3600) / 60, abs % 60);
    if s == 0 {
        format!("{sign}{h}:{m:02}")
    } else {
        format!("{sign}{h}:{m:02}:{s:02}")
    }
}
