/// 答题接口客户端
///
/// 封装 `viewSub` / `questionSub` 两个接口的 HTTP 调用
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use super::{QuizApi, SessionResponse, SubmitResponse};
use crate::config::Config;
use crate::error::RequestError;

/// 答题接口客户端
pub struct QuizClient {
    base_url: String,
    client: Client,
    body: JsonValue,
}

impl QuizClient {
    /// 创建新的客户端
    pub fn new(config: &Config) -> Result<Self, RequestError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(build_headers(config))
            .build()
            .map_err(|e| RequestError::Network {
                endpoint: config.api_url.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            base_url: config.api_url.clone(),
            client,
            body: config.request_body.clone(),
        })
    }

    /// 发送 POST，返回 (状态码, 响应文本)
    async fn post(&self, endpoint: &'static str, url: &str) -> Result<(i64, String), RequestError> {
        debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .json(&self.body)
            .send()
            .await
            .map_err(|e| RequestError::from_reqwest(endpoint, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RequestError::from_reqwest(endpoint, e))?;

        if !status.is_success() {
            return Err(RequestError::Protocol {
                endpoint: endpoint.to_string(),
                status_code: Some(i64::from(status.as_u16())),
                message: format!("HTTP {}: {}", status.as_u16(), text),
            });
        }

        debug!("{} 响应: {}", endpoint, text);
        Ok((i64::from(status.as_u16()), text))
    }
}

#[async_trait]
impl QuizApi for QuizClient {
    async fn view_sub(&self, area: &str) -> Result<SessionResponse, RequestError> {
        let url = format!(
            "{}/viewSub?area_title={}",
            self.base_url,
            urlencoding::encode(area)
        );
        let (status_code, raw) = self.post("viewSub", &url).await?;
        parse_session(status_code, raw)
    }

    async fn question_sub(
        &self,
        log_id: i64,
        question_id: u32,
        answer: &str,
    ) -> Result<SubmitResponse, RequestError> {
        let url = format!(
            "{}/questionSub?log_id={}&question_id={}&answer={}",
            self.base_url,
            log_id,
            question_id,
            urlencoding::encode(answer)
        );
        let (status_code, raw) = self.post("questionSub", &url).await?;
        let body = if raw.trim().is_empty() {
            JsonValue::Null
        } else {
            serde_json::from_str(&raw).unwrap_or_else(|_| JsonValue::String(raw.clone()))
        };
        Ok(SubmitResponse {
            status_code,
            raw,
            body,
        })
    }
}

/// 解析 `viewSub` 的响应，取出 `log_id`
pub fn parse_session(status_code: i64, raw: String) -> Result<SessionResponse, RequestError> {
    let protocol = |message: String| RequestError::Protocol {
        endpoint: "viewSub".to_string(),
        status_code: Some(status_code),
        message,
    };

    let json: JsonValue =
        serde_json::from_str(&raw).map_err(|e| protocol(format!("响应不是 JSON: {}", e)))?;

    let log_id = json
        .pointer("/data/log_id")
        .or_else(|| json.get("log_id"))
        .and_then(|v| match v {
            JsonValue::Number(n) => n.as_i64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .ok_or_else(|| protocol("响应中缺少 log_id".to_string()))?;

    Ok(SessionResponse {
        log_id,
        status_code,
        raw,
    })
}

fn build_headers(config: &Config) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!("⚠️ 忽略无效的请求头: {}", name),
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(r#"{"data": {"log_id": 123456}}"#, 123456)]
    #[case(r#"{"data": {"log_id": "20001"}}"#, 20001)]
    #[case(r#"{"log_id": 1000}"#, 1000)]
    fn extracts_log_id(#[case] raw: &str, #[case] expected: i64) {
        let session = parse_session(200, raw.to_string()).unwrap();
        assert_eq!(session.log_id, expected);
    }

    #[rstest]
    #[case(r#"{"data": {}}"#)]
    #[case(r#"{"data": {"log_id": "abc"}}"#)]
    #[case(r#"{"data": {"log_id": null}}"#)]
    #[case("<html>502</html>")]
    fn rejects_bad_sessions(#[case] raw: &str) {
        assert!(matches!(
            parse_session(200, raw.to_string()),
            Err(RequestError::Protocol { .. })
        ));
    }

    #[test]
    fn skips_invalid_headers() {
        let config = Config::from_json_str(
            r#"{
                "apiUrl": "http://localhost",
                "maxDailyRequests": 1,
                "receiveEMailList": ["a@b.cn"],
                "headers": {"X-Token": "abc", "bad header": "x"}
            }"#,
        )
        .unwrap();
        let headers = build_headers(&config);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["x-token"], "abc");
    }
}
