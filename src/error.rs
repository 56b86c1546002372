use thiserror::Error;

use crate::models::RequestStatus;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误（阻止启动）
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 数据文件错误（计数文件 / 历史文件，可修复）
    #[error("数据文件错误: {0}")]
    DataFile(#[from] DataFileError),
    /// 请求错误
    #[error("请求错误: {0}")]
    Request(#[from] RequestError),
    /// 报告发送错误
    #[error("报告错误: {0}")]
    Report(#[from] ReportError),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    NotFound { path: String },
    /// 读取失败
    #[error("读取配置文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// JSON 解析失败
    #[error("配置文件 JSON 解析失败 ({path}): {source}")]
    ParseFailed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// 缺少必填字段
    #[error("缺少必填字段: {field}")]
    MissingField { field: String },
    /// 字段值不合法
    #[error("字段 {field} 不合法: {reason}")]
    InvalidField { field: String, reason: String },
}

/// 数据文件错误
#[derive(Debug, Error)]
pub enum DataFileError {
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 文件内容损坏
    #[error("文件已损坏 ({path}): {reason}")]
    Corrupted { path: String, reason: String },
    /// 序列化失败（不会写入任何内容）
    #[error("序列化失败 ({path}): {source}")]
    SerializeFailed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// 历史文件轮转失败
    #[error("历史文件轮转失败 ({path}): {source}")]
    RotateFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 单次请求错误
#[derive(Debug, Error)]
pub enum RequestError {
    /// 传输层错误
    #[error("网络错误 ({endpoint}): {message}")]
    Network { endpoint: String, message: String },
    /// 请求超时
    #[error("请求超时 ({endpoint})")]
    Timeout { endpoint: String },
    /// 无法建立连接
    #[error("连接失败 ({endpoint}): {message}")]
    ConnectionFailed { endpoint: String, message: String },
    /// 上游返回非 2xx 或数据格式不符合预期
    #[error("协议错误 ({endpoint}): {message}")]
    Protocol {
        endpoint: String,
        /// 上游 HTTP 状态码（已知时）
        status_code: Option<i64>,
        message: String,
    },
    /// 响应未通过校验
    #[error("响应校验失败: {0}")]
    Validation(String),
}

impl RequestError {
    /// 映射为历史记录中的状态
    pub fn status(&self) -> RequestStatus {
        match self {
            RequestError::Network { .. } => RequestStatus::NetworkError,
            RequestError::Timeout { .. } => RequestStatus::Timeout,
            RequestError::ConnectionFailed { .. } => RequestStatus::ConnectionFailed,
            RequestError::Protocol { .. } | RequestError::Validation(_) => RequestStatus::Error,
        }
    }

    /// 上游返回的 HTTP 状态码
    pub fn status_code(&self) -> Option<i64> {
        match self {
            RequestError::Protocol { status_code, .. } => *status_code,
            _ => None,
        }
    }

    /// 从 reqwest 错误归类
    pub fn from_reqwest(endpoint: &str, err: reqwest::Error) -> Self {
        let endpoint = endpoint.to_string();
        if err.is_timeout() {
            RequestError::Timeout { endpoint }
        } else if err.is_connect() {
            RequestError::ConnectionFailed {
                endpoint,
                message: err.to_string(),
            }
        } else if err.is_decode() || err.is_status() {
            RequestError::Protocol {
                endpoint,
                status_code: err.status().map(|s| i64::from(s.as_u16())),
                message: err.to_string(),
            }
        } else {
            RequestError::Network {
                endpoint,
                message: err.to_string(),
            }
        }
    }
}

/// 报告错误
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("邮件地址不合法: {0}")]
    InvalidAddress(String),
    #[error("邮件构建失败: {0}")]
    Build(String),
    #[error("SMTP 发送失败: {0}")]
    Smtp(String),
}

// ========== 便捷构造函数 ==========

impl DataFileError {
    pub fn read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        DataFileError::ReadFailed {
            path: path.into(),
            source,
        }
    }

    pub fn write_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        DataFileError::WriteFailed {
            path: path.into(),
            source,
        }
    }

    pub fn corrupted(path: impl Into<String>, reason: impl Into<String>) -> Self {
        DataFileError::Corrupted {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_errors_map_to_history_status() {
        let timeout = RequestError::Timeout {
            endpoint: "viewSub".into(),
        };
        assert_eq!(timeout.status(), RequestStatus::Timeout);

        let protocol = RequestError::Protocol {
            endpoint: "viewSub".into(),
            status_code: Some(502),
            message: "log_id 缺失".into(),
        };
        assert_eq!(protocol.status(), RequestStatus::Error);
        assert_eq!(protocol.status_code(), Some(502));
        assert_eq!(timeout.status_code(), None);

        let conn = RequestError::ConnectionFailed {
            endpoint: "questionSub".into(),
            message: "refused".into(),
        };
        assert_eq!(conn.status(), RequestStatus::ConnectionFailed);
    }

    #[test]
    fn config_error_wraps_into_app_error() {
        let err: AppError = ConfigError::MissingField {
            field: "apiUrl".into(),
        }
        .into();
        assert_eq!(err.to_string(), "配置错误: 缺少必填字段: apiUrl");
    }
}
