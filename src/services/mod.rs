pub mod quota_gate;
pub mod report_service;
pub mod request_executor;

pub use report_service::ReportService;
pub use request_executor::{AnswerChoice, RequestExecutor, RunMode, AREA_IDENTIFIERS};
