use std::fmt;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use super::one_or_many;

/// 单次请求的结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RequestStatus {
    Success,
    NetworkError,
    Timeout,
    ConnectionFailed,
    Error,
}

impl RequestStatus {
    pub fn is_success(self) -> bool {
        self == RequestStatus::Success
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Success => "Success",
            RequestStatus::NetworkError => "NetworkError",
            RequestStatus::Timeout => "Timeout",
            RequestStatus::ConnectionFailed => "ConnectionFailed",
            RequestStatus::Error => "Error",
        }
    }

    /// 解析状态字符串，不认识的非空值一律归为 `Error`
    pub fn parse_lenient(value: &str) -> Self {
        match value {
            "Success" => RequestStatus::Success,
            "NetworkError" => RequestStatus::NetworkError,
            "Timeout" => RequestStatus::Timeout,
            "ConnectionFailed" => RequestStatus::ConnectionFailed,
            _ => RequestStatus::Error,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RequestStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        if value.trim().is_empty() {
            return Err(serde::de::Error::custom("status 不能为空"));
        }
        Ok(RequestStatus::parse_lenient(value.trim()))
    }
}

/// 历史记录中的一条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub timestamp: String,
    pub status: RequestStatus,
    pub response_code: i64,
    pub response_data: JsonValue,
}

impl HistoryEntry {
    /// 以当前时间创建一条记录
    pub fn now(status: RequestStatus, response_code: i64, response_data: JsonValue) -> Self {
        Self {
            timestamp: format_timestamp(Local::now()),
            status,
            response_code,
            response_data,
        }
    }

    pub fn parsed_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        parse_timestamp(&self.timestamp)
    }
}

/// 历史文件 `{ "requestHistory": [...] }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryFile {
    #[serde(default, deserialize_with = "one_or_many")]
    pub request_history: Vec<HistoryEntry>,
}

/// 写入历史时使用的时间格式（微秒精度）
pub fn format_timestamp<Tz: TimeZone>(at: DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    at.to_rfc3339_opts(chrono::SecondsFormat::Micros, false)
}

/// 解析历史记录中的时间戳
///
/// 除 RFC 3339 外，也接受不带时区的 `yyyy-MM-dd HH:mm:ss` 与 `yyyy-MM-ddTHH:mm:ss`（按本地时区）
pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt);
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).single())
        .map(|dt| dt.fixed_offset())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("2024-05-01T08:30:00+08:00")]
    #[case("2024-05-01T08:30:00.123Z")]
    #[case("2024-05-01 08:30:00")]
    #[case("2024-05-01T08:30:00")]
    fn parses_known_timestamp_formats(#[case] value: &str) {
        assert!(parse_timestamp(value).is_some());
    }

    #[rstest]
    #[case("")]
    #[case("yesterday")]
    #[case("2024-13-45 99:00:00")]
    fn rejects_bad_timestamps(#[case] value: &str) {
        assert!(parse_timestamp(value).is_none());
    }

    #[test]
    fn unknown_status_reads_as_error() {
        let entry: HistoryEntry = serde_json::from_value(json!({
            "timestamp": "2024-05-01T08:30:00Z",
            "status": "Failed",
            "responseCode": 500,
            "responseData": {}
        }))
        .unwrap();
        assert_eq!(entry.status, RequestStatus::Error);
    }

    #[test]
    fn empty_status_is_rejected() {
        let parsed = serde_json::from_value::<HistoryEntry>(json!({
            "timestamp": "2024-05-01T08:30:00Z",
            "status": "",
            "responseCode": 500,
            "responseData": {}
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn timestamps_keep_microseconds() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T08:30:00.123456+08:00").unwrap();
        assert_eq!(format_timestamp(at), "2024-05-01T08:30:00.123456+08:00");
    }

    #[test]
    fn new_entry_timestamp_round_trips() {
        let entry = HistoryEntry::now(RequestStatus::Success, 200, json!({"ok": true}));
        assert!(entry.parsed_timestamp().is_some());
    }
}
