//! 应用编排 - 编排层
//!
//! ## 职责
//!
//! 1. **初始化**：加载配置、初始化计数文件、检查并修复历史文件（唯一会致命失败的阶段）
//! 2. **运行**：创建 HTTP 客户端，委托 `DailyFlow` 完成配额检查和请求循环
//! 3. **报告**：汇总统计并发送邮件，失败不影响本次结果

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};

use crate::clients::{QuizApi, QuizClient};
use crate::config::Config;
use crate::models::DailyCounterRecord;
use crate::services::{ReportService, RequestExecutor, RunMode};
use crate::storage::counter_store::record_for;
use crate::storage::history_store::{statistics, HealthRecommendation};
use crate::storage::{CounterStore, HistoryStore};
use crate::utils::logging::{log_startup, print_final_stats};
use crate::workflow::{DailyFlow, FlowOptions, WorkflowResult};

/// 运行参数（来自命令行）
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config_path: PathBuf,
    pub data_path: PathBuf,
    pub history_path: PathBuf,
    /// 覆盖配置中的请求体（JSON 文本）
    pub request_body: Option<String>,
    /// 测试模式：不发送邮件
    pub test_mode: bool,
    pub skip_limit_check: bool,
    pub mode: RunMode,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config.json"),
            data_path: PathBuf::from("data.json"),
            history_path: PathBuf::from("history.json"),
            request_body: None,
            test_mode: false,
            skip_limit_check: false,
            mode: RunMode::Batch,
        }
    }
}

/// 应用主结构
pub struct App {
    config: Config,
    options: RunOptions,
    counter_store: CounterStore,
    history_store: HistoryStore,
    records: Vec<DailyCounterRecord>,
    today: NaiveDate,
}

impl App {
    /// 初始化应用
    pub fn initialize(options: RunOptions) -> Result<Self> {
        Self::initialize_on(options, Local::now().date_naive())
    }

    /// 以指定日期初始化
    pub fn initialize_on(options: RunOptions, today: NaiveDate) -> Result<Self> {
        let mut config = Config::load(&options.config_path)
            .with_context(|| format!("无法加载配置文件: {}", options.config_path.display()))?;

        if let Some(body) = &options.request_body {
            let body: JsonValue =
                serde_json::from_str(body).context("--request-body 不是合法的 JSON")?;
            config = config.with_request_body(body);
        }

        let counter_store = CounterStore::new(&options.data_path);
        let records = counter_store
            .load_or_initialize(today)
            .with_context(|| format!("无法初始化计数文件: {}", options.data_path.display()))?;

        let history_store =
            HistoryStore::new(&options.history_path, config.max_history_file_size_bytes());
        prepare_history(&history_store)
            .with_context(|| format!("无法初始化历史文件: {}", options.history_path.display()))?;

        log_startup(
            config.max_daily_requests,
            record_for(&records, today).total_requests,
        );

        Ok(Self {
            config,
            options,
            counter_store,
            history_store,
            records,
            today,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 运行应用主逻辑
    pub async fn run(self) -> Result<WorkflowResult> {
        let client = QuizClient::new(&self.config).context("无法创建 HTTP 客户端")?;
        Ok(self.run_with(RequestExecutor::new(client)).await)
    }

    /// 使用指定的执行器运行
    pub async fn run_with<A: QuizApi>(self, executor: RequestExecutor<A>) -> WorkflowResult {
        let options = FlowOptions {
            mode: self.options.mode,
            skip_limit_check: self.options.skip_limit_check,
        };

        let result = {
            let mut flow = DailyFlow::new(
                &self.config,
                &self.counter_store,
                &self.history_store,
                executor,
                options,
            );
            flow.run(self.records.clone(), self.today).await
        };

        print_final_stats(&result);
        self.report(&result).await;

        result
    }

    /// 发送报告（尽力而为）
    async fn report(&self, result: &WorkflowResult) {
        if self.options.test_mode {
            info!("🧪 测试模式，跳过邮件报告");
            return;
        }

        let service = ReportService::new(&self.config);
        if !service.can_send() {
            warn!("⚠️ 邮件未配置，跳过报告");
            return;
        }

        let entries = match self.history_store.load() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("⚠️ 读取历史失败，报告中不含历史统计: {}", e);
                Vec::new()
            }
        };
        let html = service.compose(result, &statistics(&entries), &entries);

        if let Err(e) = service.send(&service.subject(result), html).await {
            error!("❌ 报告发送失败: {}", e);
        }
    }
}

/// 历史文件：按健康检查结果初始化或修复
fn prepare_history(store: &HistoryStore) -> Result<()> {
    let health = store.health_status();
    debug!(
        "历史文件 {}: {} 字节, 有效 {} 条, 无效 {} 条, 建议: {}",
        health.path.display(),
        health.size_bytes,
        health.valid_entries,
        health.invalid_entries,
        health.recommendation
    );

    match health.recommendation {
        HealthRecommendation::Initialize => {
            info!("📁 历史文件不存在，正在初始化: {}", store.path().display());
            store.initialize()?;
        }
        HealthRecommendation::Repair => {
            for issue in health.issues.iter().take(10) {
                warn!("⚠️ 历史文件问题: {}", issue);
            }
            let outcome = store.repair()?;
            if outcome.reset {
                warn!("⚠️ 历史文件无法恢复，已重置为空");
            } else {
                info!(
                    "🔧 历史文件已修复: 保留 {} 条, 丢弃 {} 条",
                    outcome.kept, outcome.discarded
                );
            }
        }
        HealthRecommendation::Archive => {
            info!("📦 历史文件已超过阈值，下次写入前轮转");
        }
        HealthRecommendation::Healthy => {
            if health.corrupted {
                warn!("⚠️ 历史文件存在重复时间戳");
            }
        }
    }

    Ok(())
}
