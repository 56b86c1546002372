pub mod daily_flow;
pub mod workflow_result;

pub use daily_flow::{DailyFlow, FlowOptions};
pub use workflow_result::WorkflowResult;
