//! # Daily Answer Submit
//!
//! 按每日配额自动提交答题请求的 Rust 应用程序
//!
//! ## 架构设计
//!
//! ### ① 基础设施层
//! - `clients/` - 答题接口 HTTP 客户端（`QuizApi` / `QuizClient`）
//! - `storage/` - 计数文件与历史文件（修复、轮转、健康检查）
//!
//! ### ② 业务能力层（Services）
//! - `QuotaGate` - 每日配额判断
//! - `RequestExecutor` - 一次完整的答题交换与重试
//! - `ReportService` - HTML 报告与邮件发送
//!
//! ### ③ 流程层（Workflow）
//! - `DailyFlow` - 配额检查 → 请求循环 → 落盘
//!
//! ### ④ 编排层（Orchestration）
//! - `App` - 初始化、运行、报告
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod storage;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{DailyCounterRecord, HistoryEntry, NormalizedResult, RequestStatus};
pub use orchestrator::{App, RunOptions};
pub use services::{RequestExecutor, RunMode};
pub use workflow::{DailyFlow, WorkflowResult};
