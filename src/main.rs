use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use daily_answer_submit::utils::logging;
use daily_answer_submit::{App, RunMode, RunOptions};
use tracing::error;

/// 每日答题请求：配额检查、批量提交、历史记录与邮件报告
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// 每日计数文件路径
    #[arg(short, long, default_value = "data.json")]
    data: PathBuf,

    /// 请求历史文件路径
    #[arg(long, default_value = "history.json")]
    history: PathBuf,

    /// 自定义请求体（JSON），覆盖配置文件中的 requestBody
    #[arg(long)]
    request_body: Option<String>,

    /// 测试模式：不发送邮件报告
    #[arg(short, long)]
    test: bool,

    /// 跳过每日配额检查
    #[arg(long)]
    skip_limit_check: bool,

    /// 输出详细日志
    #[arg(short, long)]
    verbose: bool,

    /// 单区域模式（默认批量处理全部区域）
    #[arg(long)]
    single: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // 初始化日志
    logging::init(cli.verbose);

    let options = RunOptions {
        config_path: cli.config,
        data_path: cli.data,
        history_path: cli.history,
        request_body: cli.request_body,
        test_mode: cli.test,
        skip_limit_check: cli.skip_limit_check,
        mode: if cli.single {
            RunMode::Single
        } else {
            RunMode::Batch
        },
    };

    // 初始化并运行应用
    let app = match App::initialize(options) {
        Ok(app) => app,
        Err(e) => {
            error!("❌ 初始化失败: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match app.run().await {
        Ok(result) if result.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!("❌ 运行失败: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
