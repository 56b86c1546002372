pub mod quiz_client;

pub use quiz_client::QuizClient;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::RequestError;

/// `viewSub` 返回的会话
#[derive(Debug, Clone)]
pub struct SessionResponse {
    pub log_id: i64,
    pub status_code: i64,
    pub raw: String,
}

/// `questionSub` 的响应
#[derive(Debug, Clone)]
pub struct SubmitResponse {
    pub status_code: i64,
    pub raw: String,
    pub body: JsonValue,
}

impl SubmitResponse {
    /// 响应是否为空
    pub fn is_empty(&self) -> bool {
        match &self.body {
            JsonValue::Null => true,
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Array(items) => items.is_empty(),
            JsonValue::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

/// 答题接口能力
///
/// 只暴露两个接口调用，不关心重试与流程
#[async_trait]
pub trait QuizApi: Send + Sync {
    /// 获取会话 ID
    async fn view_sub(&self, area: &str) -> Result<SessionResponse, RequestError>;

    /// 提交某道题的答案
    async fn question_sub(
        &self,
        log_id: i64,
        question_id: u32,
        answer: &str,
    ) -> Result<SubmitResponse, RequestError>;
}
