//! 报告服务 - 业务能力层
//!
//! 把本次运行结果和历史统计渲染为 HTML，并通过 SMTP 发送

use std::fmt::Write as _;
use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use crate::config::{Config, EmailSettings};
use crate::error::ReportError;
use crate::models::HistoryEntry;
use crate::storage::HistoryStatistics;
use crate::workflow::WorkflowResult;

/// 报告中展示的最近历史条数
pub const RECENT_ENTRIES: usize = 10;

/// 报告服务
pub struct ReportService {
    settings: EmailSettings,
    recipients: Vec<String>,
    timeout: Duration,
}

impl ReportService {
    pub fn new(config: &Config) -> Self {
        Self {
            settings: config.email_settings.clone(),
            recipients: config.receive_email_list.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// 是否具备发送条件
    pub fn can_send(&self) -> bool {
        self.settings.is_configured() && !self.recipients.is_empty()
    }

    /// 邮件标题
    pub fn subject(&self, result: &WorkflowResult) -> String {
        let verdict = if result.is_success() { "成功" } else { "失败" };
        format!(
            "{} - {} - {}",
            self.settings.subject,
            result.started_at.format("%Y-%m-%d"),
            verdict
        )
    }

    /// 渲染 HTML 报告
    pub fn compose(
        &self,
        result: &WorkflowResult,
        stats: &HistoryStatistics,
        recent: &[HistoryEntry],
    ) -> String {
        let verdict = if result.is_success() {
            r#"<span style="color:#2e7d32">✅ 成功</span>"#
        } else {
            r#"<span style="color:#c62828">❌ 失败</span>"#
        };

        let mut html = String::new();
        html.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\">");
        let _ = write!(html, "<title>{}</title>", escape(&self.settings.subject));
        html.push_str(
            "<style>body{font-family:sans-serif}table{border-collapse:collapse}\
             td,th{border:1px solid #ccc;padding:4px 8px}</style></head><body>",
        );

        let _ = write!(html, "<h2>{}</h2>", escape(&self.settings.subject));
        let _ = write!(html, "<p>执行结果: {}</p>", verdict);

        html.push_str("<h3>本次运行</h3><table>");
        row(&mut html, "开始时间", &result.started_at.format("%Y-%m-%d %H:%M:%S").to_string());
        row(
            &mut html,
            "耗时",
            &format!("{} 秒", result.elapsed_secs()),
        );
        row(&mut html, "运行模式", &format!("{:?}", result.mode));
        row(
            &mut html,
            "配额检查",
            if result.limit_reached {
                "已达上限，本次未发送"
            } else if result.limit_check_passed {
                "通过"
            } else {
                "未通过"
            },
        );
        row(&mut html, "每日上限", &result.max_daily_requests.to_string());
        row(&mut html, "本次有效上限", &result.effective_ceiling.to_string());
        row(&mut html, "计划次数", &result.planned_iterations.to_string());
        row(&mut html, "发送次数", &result.requests_sent.to_string());
        row(&mut html, "成功次数", &result.successful_requests.to_string());
        row(&mut html, "失败次数", &result.failed_requests().to_string());
        row(
            &mut html,
            "今日累计",
            &format!(
                "{} → {}（成功 {}）",
                result.today_total_before, result.today_total_after, result.today_successful_after
            ),
        );
        row(
            &mut html,
            "累计 HTTP POST（估算）",
            &result.cumulative_post_count().to_string(),
        );
        row(
            &mut html,
            "持久化",
            if result.persistence_ok { "正常" } else { "出错" },
        );
        html.push_str("</table>");

        if !result.errors.is_empty() {
            html.push_str("<h3>错误</h3><ul>");
            for err in &result.errors {
                let _ = write!(html, "<li>{}</li>", escape(err));
            }
            html.push_str("</ul>");
        }

        if let Some(last) = &result.last_response {
            html.push_str("<h3>最后一次响应</h3><table>");
            row(&mut html, "状态", last.status.as_str());
            row(&mut html, "状态码", &last.status_code.to_string());
            html.push_str("</table>");
            let _ = write!(
                html,
                "<pre>{}</pre>",
                escape(&crate::utils::logging::truncate_text(&last.raw_response, 2000))
            );
        }

        html.push_str("<h3>历史统计</h3><table>");
        row(&mut html, "总记录", &stats.total.to_string());
        row(&mut html, "成功", &stats.successful.to_string());
        row(&mut html, "失败", &stats.failed.to_string());
        row(&mut html, "成功率", &format!("{:.1}%", stats.success_rate));
        for (status, count) in &stats.by_status {
            row(&mut html, &format!("状态 {}", status), &count.to_string());
        }
        if let (Some(first), Some(last)) = (stats.first, stats.last) {
            row(
                &mut html,
                "时间范围",
                &format!(
                    "{} ~ {}",
                    first.format("%Y-%m-%d %H:%M:%S"),
                    last.format("%Y-%m-%d %H:%M:%S")
                ),
            );
        }
        html.push_str("</table>");

        if !recent.is_empty() {
            html.push_str("<h3>最近记录</h3><table><tr><th>时间</th><th>状态</th><th>状态码</th></tr>");
            for entry in recent.iter().rev().take(RECENT_ENTRIES) {
                let _ = write!(
                    html,
                    "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                    escape(&entry.timestamp),
                    entry.status,
                    entry.response_code
                );
            }
            html.push_str("</table>");
        }

        html.push_str("</body></html>");
        html
    }

    /// 发送 HTML 邮件
    pub async fn send(&self, subject: &str, html: String) -> Result<(), ReportError> {
        if !self.settings.is_configured() {
            return Err(ReportError::Build("SMTP 未配置".to_string()));
        }

        let from: Mailbox = self
            .settings
            .sender_email
            .parse()
            .map_err(|_| ReportError::InvalidAddress(self.settings.sender_email.clone()))?;

        let mut builder = Message::builder().from(from).subject(subject);
        for recipient in &self.recipients {
            let to: Mailbox = recipient
                .parse()
                .map_err(|_| ReportError::InvalidAddress(recipient.clone()))?;
            builder = builder.to(to);
        }
        let message = builder
            .header(ContentType::TEXT_HTML)
            .body(html)
            .map_err(|e| ReportError::Build(e.to_string()))?;

        let server = self.settings.smtp_server.as_str();
        let builder = if !self.settings.enable_ssl {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(server)
        } else if self.settings.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(server)
                .map_err(|e| ReportError::Smtp(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(server)
                .map_err(|e| ReportError::Smtp(e.to_string()))?
        };
        let transport = builder
            .port(self.settings.smtp_port)
            .credentials(Credentials::new(
                self.settings.sender_email.clone(),
                self.settings.sender_password.clone(),
            ))
            .timeout(Some(self.timeout))
            .build();

        debug!(
            "通过 {}:{} 发送报告给 {} 位收件人",
            server,
            self.settings.smtp_port,
            self.recipients.len()
        );
        transport
            .send(message)
            .await
            .map_err(|e| ReportError::Smtp(e.to_string()))?;

        info!("📧 报告已发送: {}", self.recipients.join(", "));
        Ok(())
    }
}

fn row(html: &mut String, label: &str, value: &str) {
    let _ = write!(
        html,
        "<tr><th align=\"left\">{}</th><td>{}</td></tr>",
        escape(label),
        escape(value)
    );
}

/// HTML 转义
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
