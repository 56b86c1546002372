//! 请求执行服务 - 业务能力层
//!
//! 负责一次完整的答题交换（获取会话 → 提交三道题）以及失败重试，不关心配额和持久化

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value as JsonValue};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::clients::QuizApi;
use crate::error::RequestError;
use crate::models::{NormalizedResult, RequestStatus};

/// 批量模式依次使用的区域
pub const AREA_IDENTIFIERS: [&str; 5] = ["东区", "西区", "南区", "北区", "中区"];

/// 每个会话需要提交的题目
pub const QUESTION_IDS: [u32; 3] = [1, 2, 3];

/// 会话 ID 的下限，低于该值视为无效
pub const MIN_LOG_ID: i64 = 1000;

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// 每次迭代依次处理全部区域
    #[default]
    Batch,
    /// 每次迭代只处理第一个区域
    Single,
}

/// 本次会话的答案组合
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerChoice {
    Primary,
    Alternate,
}

impl AnswerChoice {
    /// `Primary` 的抽中概率
    pub const PRIMARY_WEIGHT: f64 = 0.6;

    /// 按 60/40 加权抽取
    pub fn draw<R: Rng + ?Sized>(rng: &mut R) -> Self {
        if rng.random_bool(Self::PRIMARY_WEIGHT) {
            AnswerChoice::Primary
        } else {
            AnswerChoice::Alternate
        }
    }

    /// 第一题的答案
    pub fn first_answer(self) -> &'static str {
        match self {
            AnswerChoice::Primary => "非常满意",
            AnswerChoice::Alternate => "满意",
        }
    }

    /// 其余题目的答案
    pub fn follow_up_answer(self) -> &'static str {
        match self {
            AnswerChoice::Primary => "是",
            AnswerChoice::Alternate => "否",
        }
    }

    /// 第 `index` 题（从 0 开始）的答案
    pub fn answer_for(self, index: usize) -> &'static str {
        if index == 0 {
            self.first_answer()
        } else {
            self.follow_up_answer()
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnswerChoice::Primary => "primary",
            AnswerChoice::Alternate => "alternate",
        }
    }
}

/// 请求执行器
pub struct RequestExecutor<A> {
    api: A,
    rng: StdRng,
}

impl<A: QuizApi> RequestExecutor<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            rng: StdRng::from_os_rng(),
        }
    }

    /// 使用固定种子（答案抽取可复现）
    pub fn with_seed(api: A, seed: u64) -> Self {
        Self {
            api,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// 对一个区域执行完整的答题交换
    pub async fn execute(&mut self, area: &str) -> NormalizedResult {
        match self.try_execute(area).await {
            Ok(result) => result,
            Err(e) => {
                debug!("[{}] 执行失败: {}", area, e);
                NormalizedResult::failure(&e, e.status_code().unwrap_or(0))
            }
        }
    }

    async fn try_execute(&mut self, area: &str) -> Result<NormalizedResult, RequestError> {
        let session = self.api.view_sub(area).await?;
        if session.log_id < MIN_LOG_ID {
            return Err(RequestError::Protocol {
                endpoint: "viewSub".to_string(),
                status_code: Some(session.status_code),
                message: format!("log_id {} 无效（小于 {}）", session.log_id, MIN_LOG_ID),
            });
        }
        debug!("[{}] 获取会话成功 log_id={}", area, session.log_id);

        let choice = AnswerChoice::draw(&mut self.rng);
        let mut submissions = Vec::with_capacity(QUESTION_IDS.len());
        let mut raws = vec![session.raw];
        let mut status_code = session.status_code;

        for (index, question_id) in QUESTION_IDS.iter().enumerate() {
            let response = self
                .api
                .question_sub(session.log_id, *question_id, choice.answer_for(index))
                .await?;

            if response.is_empty() {
                return Err(RequestError::Protocol {
                    endpoint: "questionSub".to_string(),
                    status_code: Some(response.status_code),
                    message: format!("第 {} 题的提交响应为空", question_id),
                });
            }

            status_code = response.status_code;
            raws.push(response.raw);
            submissions.push(json!({
                "questionId": question_id,
                "response": response.body,
            }));
        }

        let mut data = Map::new();
        data.insert("area".to_string(), json!(area));
        data.insert("logId".to_string(), json!(session.log_id));
        data.insert("answerChoice".to_string(), json!(choice.as_str()));
        data.insert("submissions".to_string(), JsonValue::Array(submissions));

        Ok(NormalizedResult::success(status_code, raws.join("\n"), data))
    }

    /// 失败时按固定间隔重试，最多额外重试 `max_retries` 次，返回最后一次结果
    pub async fn execute_with_retry(
        &mut self,
        area: &str,
        max_retries: u32,
        delay: Duration,
    ) -> NormalizedResult {
        let mut result = self.execute(area).await;
        let mut attempt = 0;

        while !result.is_success() && attempt < max_retries {
            attempt += 1;
            warn!(
                "[{}] ⚠️ 请求失败 ({})，{} 秒后重试 ({}/{})",
                area,
                result.status,
                delay.as_secs(),
                attempt,
                max_retries
            );
            sleep(delay).await;
            result = self.execute(area).await;
        }

        result
    }

    /// 按运行模式执行一次迭代
    pub async fn execute_mode(
        &mut self,
        mode: RunMode,
        max_retries: u32,
        delay: Duration,
    ) -> NormalizedResult {
        match mode {
            RunMode::Single => {
                self.execute_with_retry(AREA_IDENTIFIERS[0], max_retries, delay)
                    .await
            }
            RunMode::Batch => self.execute_batch(&AREA_IDENTIFIERS, max_retries, delay).await,
        }
    }

    /// 依次处理多个区域并汇总；至少一个区域成功即视为成功
    pub async fn execute_batch(
        &mut self,
        areas: &[&str],
        max_retries: u32,
        delay: Duration,
    ) -> NormalizedResult {
        let mut per_area = Vec::with_capacity(areas.len());
        let mut raws = Vec::with_capacity(areas.len());
        let mut successful = 0usize;
        let mut last_success_code = None;
        let mut last_failure: Option<NormalizedResult> = None;

        for area in areas {
            let result = self.execute_with_retry(area, max_retries, delay).await;

            if result.is_success() {
                successful += 1;
                last_success_code = Some(result.status_code);
                info!("[{}] ✓ 答题完成", area);
            } else {
                warn!("[{}] ❌ 答题失败: {}", area, result.status);
            }

            per_area.push(json!({
                "area": area,
                "status": result.status,
                "statusCode": result.status_code,
                "data": result.data.clone(),
            }));
            raws.push(result.raw_response.clone());
            if !result.is_success() {
                last_failure = Some(result);
            }
        }

        let mut data = Map::new();
        data.insert("areas".to_string(), JsonValue::Array(per_area));
        data.insert("successfulAreas".to_string(), json!(successful));
        data.insert("totalAreas".to_string(), json!(areas.len()));

        match (last_success_code, last_failure) {
            (Some(code), _) => NormalizedResult::success(code, raws.join("\n"), data),
            (None, Some(failure)) => NormalizedResult {
                status: failure.status,
                status_code: failure.status_code,
                raw_response: raws.join("\n"),
                data,
                error_message: failure.error_message,
            },
            (None, None) => NormalizedResult {
                status: RequestStatus::Error,
                status_code: 0,
                raw_response: String::new(),
                data,
                error_message: Some("没有可处理的区域".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{SessionResponse, SubmitResponse};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// 按顺序返回预设 view_sub 结果的假接口
    struct ScriptedApi {
        sessions: Mutex<Vec<Result<i64, RequestError>>>,
        empty_submit_for: Option<u32>,
        view_calls: AtomicUsize,
        answers: Mutex<Vec<(u32, String)>>,
    }

    impl ScriptedApi {
        fn new(sessions: Vec<Result<i64, RequestError>>) -> Self {
            Self {
                sessions: Mutex::new(sessions),
                empty_submit_for: None,
                view_calls: AtomicUsize::new(0),
                answers: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl QuizApi for ScriptedApi {
        async fn view_sub(&self, _area: &str) -> Result<SessionResponse, RequestError> {
            self.view_calls.fetch_add(1, Ordering::SeqCst);
            let next = {
                let mut sessions = self.sessions.lock().unwrap();
                if sessions.is_empty() {
                    Ok(5000)
                } else {
                    sessions.remove(0)
                }
            };
            next.map(|log_id| SessionResponse {
                log_id,
                status_code: 200,
                raw: format!("{{\"data\":{{\"log_id\":{}}}}}", log_id),
            })
        }

        async fn question_sub(
            &self,
            _log_id: i64,
            question_id: u32,
            answer: &str,
        ) -> Result<SubmitResponse, RequestError> {
            self.answers
                .lock()
                .unwrap()
                .push((question_id, answer.to_string()));
            let body = if self.empty_submit_for == Some(question_id) {
                JsonValue::Null
            } else {
                json!({"code": 200, "msg": "ok"})
            };
            Ok(SubmitResponse {
                status_code: 200,
                raw: body.to_string(),
                body,
            })
        }
    }

    fn timeout() -> RequestError {
        RequestError::Timeout {
            endpoint: "viewSub".into(),
        }
    }

    #[tokio::test]
    async fn successful_exchange_is_normalized() {
        let mut executor = RequestExecutor::with_seed(ScriptedApi::new(vec![]), 42);
        let result = executor.execute("东区").await;

        assert_eq!(result.status, RequestStatus::Success);
        assert_eq!(result.status_code, 200);
        assert_eq!(result.data["logId"], 5000);
        assert_eq!(result.data["submissions"].as_array().unwrap().len(), 3);
        assert!(result.validate().is_ok());
    }

    #[tokio::test]
    async fn follow_up_answers_reuse_the_same_draw() {
        let mut executor = RequestExecutor::with_seed(ScriptedApi::new(vec![]), 9);
        for _ in 0..20 {
            executor.execute("东区").await;
        }
        let answers = executor.api().answers.lock().unwrap().clone();
        for chunk in answers.chunks(3) {
            let choice = if chunk[0].1 == AnswerChoice::Primary.first_answer() {
                AnswerChoice::Primary
            } else {
                AnswerChoice::Alternate
            };
            assert_eq!(chunk[1].1, choice.follow_up_answer());
            assert_eq!(chunk[2].1, choice.follow_up_answer());
        }
    }

    #[tokio::test]
    async fn empty_submission_fails_whole_call() {
        let mut api = ScriptedApi::new(vec![]);
        api.empty_submit_for = Some(2);
        let mut executor = RequestExecutor::with_seed(api, 1);

        let result = executor.execute("东区").await;
        assert_eq!(result.status, RequestStatus::Error);
        assert!(result.error_message.unwrap().contains("questionSub"));
    }

    #[tokio::test]
    async fn rejects_implausible_log_id() {
        let mut executor = RequestExecutor::with_seed(ScriptedApi::new(vec![Ok(999)]), 1);
        let result = executor.execute("东区").await;
        assert_eq!(result.status, RequestStatus::Error);
        assert!(executor.api().answers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upstream_http_status_is_kept() {
        let api = ScriptedApi::new(vec![Err(RequestError::Protocol {
            endpoint: "viewSub".into(),
            status_code: Some(503),
            message: "HTTP 503: busy".into(),
        })]);
        let mut executor = RequestExecutor::with_seed(api, 1);

        let result = executor.execute("东区").await;
        assert_eq!(result.status, RequestStatus::Error);
        assert_eq!(result.status_code, 503);
        assert_eq!(result.to_history_entry().response_code, 503);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let api = ScriptedApi::new(vec![Err(timeout()), Err(timeout()), Ok(8000)]);
        let mut executor = RequestExecutor::with_seed(api, 1);

        let result = executor
            .execute_with_retry("东区", 3, Duration::ZERO)
            .await;
        assert!(result.is_success());
        assert_eq!(executor.api().view_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_last_failure_after_exhausting_retries() {
        let api = ScriptedApi::new(vec![Err(timeout()), Err(timeout()), Err(timeout())]);
        let mut executor = RequestExecutor::with_seed(api, 1);

        let result = executor
            .execute_with_retry("东区", 2, Duration::ZERO)
            .await;
        assert_eq!(result.status, RequestStatus::Timeout);
        assert_eq!(executor.api().view_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn batch_succeeds_when_any_area_succeeds() {
        let api = ScriptedApi::new(vec![
            Err(timeout()),
            Ok(1500),
            Err(RequestError::ConnectionFailed {
                endpoint: "viewSub".into(),
                message: "refused".into(),
            }),
        ]);
        let mut executor = RequestExecutor::with_seed(api, 1);

        let result = executor
            .execute_batch(&AREA_IDENTIFIERS[..3], 0, Duration::ZERO)
            .await;
        assert!(result.is_success());
        assert_eq!(result.data["successfulAreas"], 1);
        assert_eq!(result.data["totalAreas"], 3);
        assert_eq!(result.data["areas"][0]["status"], "Timeout");
    }

    #[tokio::test]
    async fn batch_with_no_success_reports_last_failure() {
        let api = ScriptedApi::new(vec![Err(timeout()), Ok(10)]);
        let mut executor = RequestExecutor::with_seed(api, 1);

        let result = executor
            .execute_batch(&AREA_IDENTIFIERS[..2], 0, Duration::ZERO)
            .await;
        assert_eq!(result.status, RequestStatus::Error);
    }

    #[test]
    fn single_mode_only_touches_first_area() {
        let mut executor = RequestExecutor::with_seed(ScriptedApi::new(vec![]), 1);
        let result = tokio_test::block_on(executor.execute_mode(RunMode::Single, 0, Duration::ZERO));
        assert_eq!(result.data["area"], AREA_IDENTIFIERS[0]);
        assert_eq!(executor.api().view_calls.load(Ordering::SeqCst), 1);
    }
}
