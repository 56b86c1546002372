use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::one_or_many;

/// 某一天的请求计数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyCounterRecord {
    pub request_date: NaiveDate,
    #[serde(default)]
    pub total_requests: u64,
    #[serde(default)]
    pub successful_requests: u64,
}

impl DailyCounterRecord {
    /// 创建某天的空记录
    pub fn new(request_date: NaiveDate) -> Self {
        Self {
            request_date,
            total_requests: 0,
            successful_requests: 0,
        }
    }
}

/// 计数文件 `{ "dailyRequestStatus": [...] }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterFile {
    #[serde(default, deserialize_with = "one_or_many")]
    pub daily_request_status: Vec<DailyCounterRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_camel_case_keys() {
        let file = CounterFile {
            daily_request_status: vec![DailyCounterRecord {
                request_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                total_requests: 4,
                successful_requests: 3,
            }],
        };
        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["dailyRequestStatus"][0]["requestDate"], "2024-03-01");
        assert_eq!(json["dailyRequestStatus"][0]["totalRequests"], 4);
        assert_eq!(json["dailyRequestStatus"][0]["successfulRequests"], 3);
    }

    #[test]
    fn single_object_is_read_as_list() {
        let file: CounterFile = serde_json::from_str(
            r#"{"dailyRequestStatus": {"requestDate": "2024-03-01", "totalRequests": 1, "successfulRequests": 0}}"#,
        )
        .unwrap();
        assert_eq!(file.daily_request_status.len(), 1);
    }
}
