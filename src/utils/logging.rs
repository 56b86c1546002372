/// 日志工具模块
///
/// 提供日志初始化、控制台消息格式化和输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::workflow::WorkflowResult;

/// 初始化日志
///
/// 优先使用 `RUST_LOG`，否则 verbose 时为 debug，平时为 info
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .try_init();
}

/// 控制台消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Success,
    Failure,
    Warning,
    Info,
    Step,
}

impl MessageKind {
    fn symbol(self) -> &'static str {
        match self {
            MessageKind::Success => "✅",
            MessageKind::Failure => "❌",
            MessageKind::Warning => "⚠️",
            MessageKind::Info => "ℹ️",
            MessageKind::Step => "▶️",
        }
    }
}

/// 给消息加上对应的符号前缀
pub fn format_message(kind: MessageKind, message: &str) -> String {
    format!("{} {}", kind.symbol(), message)
}

/// 记录程序启动信息
///
/// # 参数
/// - `max_daily`: 每日上限
/// - `today_total`: 今日已请求次数
pub fn log_startup(max_daily: u64, today_total: u64) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 每日答题请求");
    info!("📊 每日上限: {} | 今日已请求: {}", max_daily, today_total);
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(result: &WorkflowResult) {
    info!("\n{}", "=".repeat(60));
    info!("📊 本次运行统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    if result.limit_reached {
        info!("{}", format_message(MessageKind::Info, "今日已达上限，未发送请求"));
    }
    info!("✅ 成功: {}/{}", result.successful_requests, result.requests_sent);
    info!("❌ 失败: {}", result.failed_requests());
    info!(
        "📈 今日累计: {}/{}",
        result.today_total_after, result.max_daily_requests
    );
    let verdict = if result.is_success() {
        format_message(MessageKind::Success, "工作流执行成功")
    } else {
        format_message(MessageKind::Failure, "工作流执行失败")
    };
    info!("{}", verdict);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
