//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责应用生命周期，是整个系统的"指挥中心"。
//!
//! ## 层次关系
//!
//! ```text
//! orchestrator::App (初始化 / 运行 / 报告)
//!     ↓
//! workflow::DailyFlow (配额检查 → 请求循环 → 落盘)
//!     ↓
//! services (能力层：quota_gate / request_executor / report_service)
//!     ↓
//! clients + storage (基础设施：HTTP 接口、JSON 文件)
//! ```
//!
//! ## 设计原则
//!
//! 1. **初始化失败才致命**：其余阶段的错误都汇总到 `WorkflowResult`
//! 2. **向下依赖**：编排层 → workflow → services → clients / storage
//! 3. **无业务逻辑**：只做调度和统计

pub mod app;

pub use app::{App, RunOptions};
