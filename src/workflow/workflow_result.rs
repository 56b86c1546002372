//! 单次运行的结果汇总
//!
//! 只在本次进程内存在，用于日志和邮件报告

use chrono::{DateTime, Local};

use crate::models::NormalizedResult;
use crate::services::request_executor::{RunMode, QUESTION_IDS};

/// 每次成功迭代对应的 HTTP POST 数（一次 viewSub + 三次 questionSub），仅用于展示
pub const POSTS_PER_ITERATION: u64 = 1 + QUESTION_IDS.len() as u64;

/// 工作流结果
#[derive(Debug, Clone)]
pub struct WorkflowResult {
    /// 配额检查是否通过
    pub limit_check_passed: bool,
    /// 今天已达到硬上限，本次运行不做任何请求
    pub limit_reached: bool,
    /// 本次运行计划的迭代次数
    pub planned_iterations: u64,
    /// 实际发送的迭代次数
    pub requests_sent: u64,
    /// 通过校验的迭代次数
    pub successful_requests: u64,
    /// 所有迭代的持久化是否都成功
    pub persistence_ok: bool,
    /// 本次的有效上限
    pub effective_ceiling: u64,
    pub max_daily_requests: u64,
    /// 运行前 / 运行后今天的总数
    pub today_total_before: u64,
    pub today_total_after: u64,
    pub today_successful_after: u64,
    pub mode: RunMode,
    pub errors: Vec<String>,
    pub last_response: Option<NormalizedResult>,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
}

impl WorkflowResult {
    pub fn new(mode: RunMode, max_daily_requests: u64) -> Self {
        Self {
            limit_check_passed: false,
            limit_reached: false,
            planned_iterations: 0,
            requests_sent: 0,
            successful_requests: 0,
            persistence_ok: true,
            effective_ceiling: 0,
            max_daily_requests,
            today_total_before: 0,
            today_total_after: 0,
            today_successful_after: 0,
            mode,
            errors: Vec::new(),
            last_response: None,
            started_at: Local::now(),
            finished_at: None,
        }
    }

    /// 本次运行是否成功
    ///
    /// 没有需要做的请求（已达上限或有效上限已用完）时视为成功；
    /// 否则要求至少发送并校验通过一次，且持久化从未出错
    pub fn is_success(&self) -> bool {
        if self.requests_sent == 0 {
            return self.persistence_ok
                && (self.limit_reached || (self.limit_check_passed && self.planned_iterations == 0));
        }
        self.limit_check_passed && self.successful_requests > 0 && self.persistence_ok
    }

    /// 失败的迭代数
    pub fn failed_requests(&self) -> u64 {
        self.requests_sent - self.successful_requests
    }

    /// 估算的累计 HTTP POST 数，仅用于报告展示
    pub fn cumulative_post_count(&self) -> u64 {
        self.successful_requests * POSTS_PER_ITERATION
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// 运行耗时（秒）
    pub fn elapsed_secs(&self) -> i64 {
        self.finished_at
            .map(|end| (end - self.started_at).num_seconds())
            .unwrap_or(0)
    }
}
