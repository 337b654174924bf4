//! シフト開始/終了時刻の表現
//!
//! サーバーは RFC 3339（`toISOString()` 形式）か MySQL の `DATETIME` 形式で
//! 時刻を返す。内部ではどちらも UTC の壁時計時刻（`NaiveDateTime`）に揃える。
//! コミット時は MySQL 形式（`YYYY-MM-DD HH:MM:SS`）に正規化して送る。

use chrono::{DateTime, NaiveDateTime};

use crate::error::ProtoError;

/// コミットペイロードで使う MySQL `DATETIME` 形式
pub const MYSQL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// スナップショット出力用の ISO 8601 形式（JS の `toISOString()` と同じ）
pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// 文字列から時刻を読み取る
///
/// 受け付ける形式:
/// - RFC 3339（オフセット付きなら UTC に換算する）
/// - `YYYY-MM-DD HH:MM:SS`
/// - `YYYY-MM-DDTHH:MM:SS[.fff]`（オフセットなし）
///
/// # エラー
/// - `ProtoError::InvalidTimestamp`: どの形式にも一致しない
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, ProtoError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(s, MYSQL_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|_| ProtoError::InvalidTimestamp(s.to_string()))
}

/// MySQL `DATETIME` 形式に整形する
pub fn format_mysql(t: &NaiveDateTime) -> String {
    t.format(MYSQL_FORMAT).to_string()
}

/// `parse_timestamp` で読み、ISO 8601 で書く serde アダプタ
pub mod lenient {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&t.format(super::ISO_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_iso_with_zone() {
        let t = parse_timestamp("2024-05-01T10:00:00.000Z").unwrap();
        assert_eq!(format_mysql(&t), "2024-05-01 10:00:00");
    }

    #[test]
    fn test_parse_offset_is_converted_to_utc() {
        let t = parse_timestamp("2024-05-01T12:30:00+02:00").unwrap();
        assert_eq!(format_mysql(&t), "2024-05-01 10:30:00");
    }

    #[test]
    fn test_parse_mysql_format() {
        let t = parse_timestamp("2024-05-01 08:15:30").unwrap();
        assert_eq!(format_mysql(&t), "2024-05-01 08:15:30");
    }

    #[test]
    fn test_parse_naive_iso() {
        let t = parse_timestamp("2024-05-01T08:15:30").unwrap();
        assert_eq!(format_mysql(&t), "2024-05-01 08:15:30");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(ProtoError::InvalidTimestamp(_))
        ));
    }
}
