use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::error::ConfigError;
use crate::models::one_or_many;

/// 配置文件的原始结构
///
/// 只做一次反序列化，必填字段用 Option 表示，校验在 `Config::from_file` 中完成
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    api_url: Option<String>,
    max_daily_requests: Option<i64>,
    #[serde(rename = "receiveEMailList", default, deserialize_with = "one_or_many")]
    receive_email_list: Vec<String>,
    /// 旧版单个收件人字段
    #[serde(rename = "receiveEMail")]
    receive_email: Option<String>,
    #[serde(default = "default_timeout")]
    timeout: u64,
    #[serde(default)]
    random_number: u64,
    #[serde(rename = "maxHistoryFileSizeMB", default = "default_history_size_mb")]
    max_history_file_size_mb: f64,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default = "default_request_body")]
    request_body: JsonValue,
    #[serde(default)]
    email_settings: EmailSettings,
    #[serde(default = "default_request_delay")]
    request_delay: u64,
    #[serde(default = "default_max_retries")]
    max_retries: u32,
    #[serde(default = "default_retry_delay")]
    retry_delay: u64,
}

/// SMTP 配置
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSettings {
    #[serde(default)]
    pub smtp_server: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default = "default_enable_ssl")]
    pub enable_ssl: bool,
    #[serde(default)]
    pub sender_email: String,
    #[serde(default)]
    pub sender_password: String,
    #[serde(default = "default_subject")]
    pub subject: String,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            smtp_server: String::new(),
            smtp_port: default_smtp_port(),
            enable_ssl: default_enable_ssl(),
            sender_email: String::new(),
            sender_password: String::new(),
            subject: default_subject(),
        }
    }
}

impl EmailSettings {
    /// SMTP 是否已配置到可以发送的程度
    pub fn is_configured(&self) -> bool {
        !self.smtp_server.trim().is_empty() && !self.sender_email.trim().is_empty()
    }
}

/// 程序配置（每次运行加载一次，之后只读）
#[derive(Clone, Debug)]
pub struct Config {
    /// 接口根地址（不含结尾的 `/`）
    pub api_url: String,
    /// 每日请求上限
    pub max_daily_requests: u64,
    /// 通知收件人
    pub receive_email_list: Vec<String>,
    /// 单次 HTTP 超时（秒）
    pub timeout_secs: u64,
    /// 每次运行随机扣减的上限
    pub random_number: u64,
    /// 历史文件轮转阈值（MB）
    pub max_history_file_size_mb: f64,
    /// 附加请求头
    pub headers: BTreeMap<String, String>,
    /// POST 请求体
    pub request_body: JsonValue,
    pub email_settings: EmailSettings,
    /// 两次迭代之间的间隔（秒）
    pub request_delay_secs: u64,
    /// 失败后的额外重试次数
    pub max_retries: u32,
    /// 重试间隔（秒）
    pub retry_delay_secs: u64,
}

impl Config {
    /// 从 JSON 文件加载并校验配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();

        if !path.exists() {
            return Err(ConfigError::NotFound { path: display });
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: display.clone(),
            source,
        })?;

        Self::from_json_str(&content).map_err(|e| match e {
            ConfigError::ParseFailed { source, .. } => ConfigError::ParseFailed {
                path: display,
                source,
            },
            other => other,
        })
    }

    /// 从 JSON 文本解析配置
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        // 兼容带 BOM 的文件
        let content = content.trim_start_matches('\u{feff}');
        let file: ConfigFile =
            serde_json::from_str(content).map_err(|source| ConfigError::ParseFailed {
                path: String::new(),
                source,
            })?;
        Self::from_file(file)
    }

    fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let api_url = file
            .api_url
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| missing("apiUrl"))?;
        validate_api_url(&api_url)?;

        let max_daily_requests = file.max_daily_requests.ok_or_else(|| missing("maxDailyRequests"))?;
        if max_daily_requests <= 0 {
            return Err(invalid("maxDailyRequests", "必须为正整数"));
        }

        let mut receive_email_list: Vec<String> = file
            .receive_email_list
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if let Some(legacy) = file.receive_email.map(|s| s.trim().to_string()) {
            if !legacy.is_empty() && !receive_email_list.contains(&legacy) {
                receive_email_list.push(legacy);
            }
        }
        if receive_email_list.is_empty() {
            return Err(missing("receiveEMailList"));
        }
        if let Some(bad) = receive_email_list.iter().find(|e| !is_valid_email(e)) {
            return Err(invalid("receiveEMailList", &format!("邮箱格式错误: {}", bad)));
        }

        if file.timeout == 0 {
            return Err(invalid("timeout", "必须大于 0"));
        }
        if !(file.max_history_file_size_mb > 0.0) {
            return Err(invalid("maxHistoryFileSizeMB", "必须大于 0"));
        }

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            max_daily_requests: max_daily_requests as u64,
            receive_email_list,
            timeout_secs: file.timeout,
            random_number: file.random_number,
            max_history_file_size_mb: file.max_history_file_size_mb,
            headers: file.headers,
            request_body: file.request_body,
            email_settings: file.email_settings,
            request_delay_secs: file.request_delay,
            max_retries: file.max_retries,
            retry_delay_secs: file.retry_delay,
        })
    }

    /// 使用命令行传入的请求体覆盖配置
    pub fn with_request_body(mut self, body: JsonValue) -> Self {
        self.request_body = body;
        self
    }

    /// 历史文件轮转阈值（字节）
    pub fn max_history_file_size_bytes(&self) -> u64 {
        (self.max_history_file_size_mb * 1024.0 * 1024.0) as u64
    }
}

fn validate_api_url(api_url: &str) -> Result<(), ConfigError> {
    let url = Url::parse(api_url).map_err(|e| invalid("apiUrl", &e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid("apiUrl", &format!("不支持的协议: {}", other))),
    }
}

const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

fn is_valid_email(email: &str) -> bool {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| Regex::new(EMAIL_PATTERN).expect("邮箱正则是常量，必须能编译"))
        .is_match(email)
}

fn missing(field: &str) -> ConfigError {
    ConfigError::MissingField {
        field: field.to_string(),
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidField {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_history_size_mb() -> f64 {
    10.0
}

fn default_request_body() -> JsonValue {
    json!({})
}

fn default_request_delay() -> u64 {
    1
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5
}

fn default_smtp_port() -> u16 {
    465
}

fn default_enable_ssl() -> bool {
    true
}

fn default_subject() -> String {
    "每日答题执行报告".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const MINIMAL: &str = r#"{
        "apiUrl": "https://quiz.example.com/api/",
        "maxDailyRequests": 5,
        "receiveEMailList": ["ops@example.com"]
    }"#;

    #[test]
    fn applies_defaults_once() {
        let config = Config::from_json_str(MINIMAL).unwrap();
        assert_eq!(config.api_url, "https://quiz.example.com/api");
        assert_eq!(config.max_daily_requests, 5);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.random_number, 0);
        assert_eq!(config.request_delay_secs, 1);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.email_settings.smtp_port, 465);
        assert!(config.email_settings.enable_ssl);
        assert_eq!(config.request_body, json!({}));
        assert_eq!(config.max_history_file_size_bytes(), 10 * 1024 * 1024);
    }

    #[test]
    fn accepts_legacy_single_recipient() {
        let config = Config::from_json_str(
            r#"{"apiUrl": "http://localhost:8080", "maxDailyRequests": 1, "receiveEMail": "a@b.cn"}"#,
        )
        .unwrap();
        assert_eq!(config.receive_email_list, vec!["a@b.cn".to_string()]);
    }

    #[test]
    fn accepts_single_string_in_list_field() {
        let config = Config::from_json_str(
            r#"{"apiUrl": "http://localhost", "maxDailyRequests": 1, "receiveEMailList": "x@y.com"}"#,
        )
        .unwrap();
        assert_eq!(config.receive_email_list, vec!["x@y.com".to_string()]);
    }

    #[rstest]
    #[case(r#"{"maxDailyRequests": 1, "receiveEMailList": ["a@b.cn"]}"#, "apiUrl")]
    #[case(r#"{"apiUrl": "http://h", "receiveEMailList": ["a@b.cn"]}"#, "maxDailyRequests")]
    #[case(r#"{"apiUrl": "http://h", "maxDailyRequests": 1}"#, "receiveEMailList")]
    fn rejects_missing_required_fields(#[case] json: &str, #[case] field: &str) {
        match Config::from_json_str(json) {
            Err(ConfigError::MissingField { field: f }) => assert_eq!(f, field),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[rstest]
    #[case(r#"{"apiUrl": "ftp://h", "maxDailyRequests": 1, "receiveEMailList": ["a@b.cn"]}"#)]
    #[case(r#"{"apiUrl": "not a url", "maxDailyRequests": 1, "receiveEMailList": ["a@b.cn"]}"#)]
    #[case(r#"{"apiUrl": "http://h", "maxDailyRequests": 0, "receiveEMailList": ["a@b.cn"]}"#)]
    #[case(r#"{"apiUrl": "http://h", "maxDailyRequests": 1, "receiveEMailList": ["nope"]}"#)]
    fn rejects_invalid_fields(#[case] json: &str) {
        assert!(matches!(
            Config::from_json_str(json),
            Err(ConfigError::InvalidField { .. })
        ));
    }

    #[rstest]
    #[case("ops@example.com", true)]
    #[case("张三@例子.中国", true)]
    #[case("a@b", false)]
    #[case("two words@example.com", false)]
    fn email_pattern(#[case] email: &str, #[case] valid: bool) {
        assert!(Regex::new(EMAIL_PATTERN).is_ok());
        assert_eq!(is_valid_email(email), valid);
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(dir.path().join("config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.receive_email_list.len(), 1);
    }
}
