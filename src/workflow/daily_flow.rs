//! 每日请求流程 - 流程层
//!
//! 流程顺序：
//! 1. 配额检查（硬上限 + 本次随机扣减后的有效上限）
//! 2. 循环：执行 → 校验 → 写计数 / 写历史
//! 3. 汇总为 `WorkflowResult`，报告由编排层负责

use std::time::Duration;

use chrono::{Local, NaiveDate};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::clients::QuizApi;
use crate::config::Config;
use crate::models::DailyCounterRecord;
use crate::services::quota_gate;
use crate::services::request_executor::{RequestExecutor, RunMode};
use crate::storage::counter_store::{self, CounterStore};
use crate::storage::HistoryStore;
use crate::utils::logging::truncate_text;
use crate::workflow::WorkflowResult;

/// 流程开关
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowOptions {
    pub mode: RunMode,
    /// 跳过配额检查（至少执行一次）
    pub skip_limit_check: bool,
}

/// 每日请求流程
///
/// - 决定本次发多少请求
/// - 每次迭代后立刻落盘，失败的迭代同样占用配额并写入历史
/// - 不负责初始化与报告
pub struct DailyFlow<'a, A> {
    config: &'a Config,
    counter_store: &'a CounterStore,
    history_store: &'a HistoryStore,
    executor: RequestExecutor<A>,
    options: FlowOptions,
    rng: StdRng,
}

impl<'a, A: QuizApi> DailyFlow<'a, A> {
    pub fn new(
        config: &'a Config,
        counter_store: &'a CounterStore,
        history_store: &'a HistoryStore,
        executor: RequestExecutor<A>,
        options: FlowOptions,
    ) -> Self {
        Self {
            config,
            counter_store,
            history_store,
            executor,
            options,
            rng: StdRng::from_os_rng(),
        }
    }

    /// 固定有效上限的随机种子
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// 运行流程
    pub async fn run(
        &mut self,
        mut records: Vec<DailyCounterRecord>,
        today: NaiveDate,
    ) -> WorkflowResult {
        let mut result = WorkflowResult::new(self.options.mode, self.config.max_daily_requests);

        // ========== 配额检查 ==========
        let today_record = counter_store::record_for(&records, today);
        result.today_total_before = today_record.total_requests;
        result.today_total_after = today_record.total_requests;
        result.today_successful_after = today_record.successful_requests;
        result.effective_ceiling = quota_gate::effective_ceiling(
            self.config.max_daily_requests,
            self.config.random_number,
            &mut self.rng,
        );

        let allowed = quota_gate::check_limit(self.config, &today_record);
        if !allowed && !self.options.skip_limit_check {
            info!(
                "🛑 今日请求已达上限 ({}/{})，本次不发送请求",
                today_record.total_requests, self.config.max_daily_requests
            );
            result.limit_reached = true;
            result.finished_at = Some(Local::now());
            return result;
        }
        result.limit_check_passed = true;

        let mut iterations =
            quota_gate::remaining_iterations(result.effective_ceiling, today_record.total_requests);
        if self.options.skip_limit_check {
            warn!("⚠️ 已跳过配额检查");
            iterations = iterations.max(1);
        }
        result.planned_iterations = iterations;

        info!(
            "📊 今日已请求 {} 次，上限 {}，本次有效上限 {}，计划执行 {} 次",
            today_record.total_requests,
            self.config.max_daily_requests,
            result.effective_ceiling,
            iterations
        );

        // ========== 循环执行 ==========
        let retry_delay = Duration::from_secs(self.config.retry_delay_secs);
        let request_delay = Duration::from_secs(self.config.request_delay_secs);

        for i in 0..iterations {
            info!("▶️ 第 {}/{} 次请求", i + 1, iterations);

            let outcome = self
                .executor
                .execute_mode(self.options.mode, self.config.max_retries, retry_delay)
                .await;
            result.requests_sent += 1;

            let valid = match outcome.validate() {
                Ok(()) => {
                    result.successful_requests += 1;
                    info!("✓ 第 {} 次请求成功", i + 1);
                    true
                }
                Err(e) => {
                    warn!(
                        "⚠️ 第 {} 次请求未通过校验: {} | 响应: {}",
                        i + 1,
                        e,
                        truncate_text(&outcome.raw_response, 120)
                    );
                    result.add_error(format!("第 {} 次请求: {}", i + 1, e));
                    false
                }
            };

            records = counter_store::increment(records, today, true, valid);
            if let Err(e) = self.counter_store.save(&records) {
                error!("❌ 计数文件写入失败: {}", e);
                result.persistence_ok = false;
                result.add_error(format!("第 {} 次计数写入失败: {}", i + 1, e));
            }

            match self.history_store.append(outcome.to_history_entry()) {
                Ok(append) => {
                    if let Some(archive) = append.archived_to {
                        info!("📦 历史文件已轮转: {}", archive.display());
                    }
                }
                Err(e) => {
                    error!("❌ 历史记录写入失败: {}", e);
                    result.persistence_ok = false;
                    result.add_error(format!("第 {} 次历史写入失败: {}", i + 1, e));
                }
            }

            result.last_response = Some(outcome);

            if i + 1 < iterations && !request_delay.is_zero() {
                sleep(request_delay).await;
            }
        }

        let after = counter_store::record_for(&records, today);
        result.today_total_after = after.total_requests;
        result.today_successful_after = after.successful_requests;
        result.finished_at = Some(Local::now());
        result
    }
}
