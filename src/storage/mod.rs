//! 持久化层
//!
//! 负责计数文件与历史文件的读写，不关心流程

pub mod counter_store;
pub mod history_store;

pub use counter_store::CounterStore;
pub use history_store::{
    AppendOutcome, CorruptionReport, HealthRecommendation, HealthReport, HistoryStatistics,
    HistoryStore, RepairOutcome,
};

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::DataFileError;

/// 先完整序列化，再写入临时文件并 rename 覆盖目标
///
/// 序列化失败时不会产生任何写入
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), DataFileError> {
    let display = path.display().to_string();
    let content = serde_json::to_string_pretty(value).map_err(|source| {
        DataFileError::SerializeFailed {
            path: display.clone(),
            source,
        }
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| DataFileError::write_failed(&display, e))?;
    }

    let tmp = tmp_path(path);
    fs::write(&tmp, content.as_bytes()).map_err(|e| DataFileError::write_failed(&display, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        DataFileError::write_failed(&display, e)
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// 去掉 UTF-8 BOM
pub(crate) fn strip_bom(content: &str) -> &str {
    content.trim_start_matches('\u{feff}')
}
