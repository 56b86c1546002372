use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use super::{HistoryEntry, RequestStatus};
use crate::error::RequestError;

/// 一次执行（一个区域或一整批）归一化后的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedResult {
    pub status: RequestStatus,
    pub status_code: i64,
    /// 原始响应文本
    pub raw_response: String,
    pub data: Map<String, JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl NormalizedResult {
    pub fn success(status_code: i64, raw_response: String, data: Map<String, JsonValue>) -> Self {
        Self {
            status: RequestStatus::Success,
            status_code,
            raw_response,
            data,
            error_message: None,
        }
    }

    /// 从请求错误构造失败结果
    pub fn failure(err: &RequestError, status_code: i64) -> Self {
        let mut data = Map::new();
        data.insert("error".to_string(), JsonValue::String(err.to_string()));
        Self {
            status: err.status(),
            status_code,
            raw_response: String::new(),
            data,
            error_message: Some(err.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// 校验：状态为成功且数据非空
    pub fn validate(&self) -> Result<(), RequestError> {
        if !self.is_success() {
            return Err(RequestError::Validation(format!("状态为 {}", self.status)));
        }
        if self.data.is_empty() {
            return Err(RequestError::Validation("响应数据为空".to_string()));
        }
        Ok(())
    }

    /// 转换为一条历史记录
    pub fn to_history_entry(&self) -> HistoryEntry {
        let mut response_data = self.data.clone();
        if let Some(msg) = &self.error_message {
            response_data
                .entry("error".to_string())
                .or_insert_with(|| JsonValue::String(msg.clone()));
        }
        HistoryEntry::now(self.status, self.status_code, JsonValue::Object(response_data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_with_empty_data_fails_validation() {
        let result = NormalizedResult::success(200, "{}".into(), Map::new());
        assert!(matches!(result.validate(), Err(RequestError::Validation(_))));
    }

    #[test]
    fn failure_keeps_error_in_history_entry() {
        let err = RequestError::Timeout {
            endpoint: "viewSub".into(),
        };
        let entry = NormalizedResult::failure(&err, 0).to_history_entry();
        assert_eq!(entry.status, RequestStatus::Timeout);
        assert_eq!(entry.response_code, 0);
        assert!(entry.response_data["error"].as_str().unwrap().contains("viewSub"));
    }

    #[test]
    fn valid_success_passes() {
        let mut data = Map::new();
        data.insert("code".into(), json!(200));
        let result = NormalizedResult::success(200, "{\"code\":200}".into(), data);
        assert!(result.validate().is_ok());
    }
}
