//! 每日计数存储
//!
//! 文件格式：`{ "dailyRequestStatus": [ {requestDate, totalRequests, successfulRequests} ] }`

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use super::{strip_bom, write_json_atomic};
use crate::error::DataFileError;
use crate::models::{CounterFile, DailyCounterRecord};

/// 每日计数存储
pub struct CounterStore {
    path: PathBuf,
}

impl CounterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取全部记录
    ///
    /// 文件不存在时返回 `Ok(None)`，由调用方决定是否初始化
    pub fn load(&self) -> Result<Option<Vec<DailyCounterRecord>>, DataFileError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let display = self.path.display().to_string();
        let content =
            fs::read_to_string(&self.path).map_err(|e| DataFileError::read_failed(&display, e))?;
        let content = strip_bom(&content);

        if content.trim().is_empty() {
            return Err(DataFileError::corrupted(&display, "文件为空"));
        }

        let file: CounterFile = serde_json::from_str(content)
            .map_err(|e| DataFileError::corrupted(&display, e.to_string()))?;

        let mut seen = HashSet::new();
        for record in &file.daily_request_status {
            if !seen.insert(record.request_date) {
                return Err(DataFileError::corrupted(
                    &display,
                    format!("日期重复: {}", record.request_date),
                ));
            }
            if record.successful_requests > record.total_requests {
                return Err(DataFileError::corrupted(
                    &display,
                    format!("{} 的成功数大于总数", record.request_date),
                ));
            }
        }

        Ok(Some(file.daily_request_status))
    }

    /// 覆盖写入全部记录
    pub fn save(&self, records: &[DailyCounterRecord]) -> Result<(), DataFileError> {
        let file = CounterFile {
            daily_request_status: records.to_vec(),
        };
        write_json_atomic(&self.path, &file)?;
        debug!("计数文件已保存: {} 条记录", records.len());
        Ok(())
    }

    /// 修复损坏的计数文件
    ///
    /// 保留所有能解析的记录（同一天只保留第一条），丢弃其余内容，
    /// 并保证文件中至少有 `today` 的空记录
    pub fn repair(&self, today: NaiveDate) -> Result<Vec<DailyCounterRecord>, DataFileError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(content) => Some(content),
            Err(e) => {
                warn!("⚠️ 无法读取计数文件 {}: {}", self.path.display(), e);
                None
            }
        };

        let candidates = raw
            .as_deref()
            .and_then(|content| serde_json::from_str::<JsonValue>(strip_bom(content)).ok())
            .map(record_candidates)
            .unwrap_or_default();

        let total = candidates.len();
        let mut seen = HashSet::new();
        let mut records: Vec<DailyCounterRecord> = candidates
            .into_iter()
            .filter_map(|v| serde_json::from_value::<DailyCounterRecord>(v).ok())
            .filter(|r| seen.insert(r.request_date))
            .map(|mut r| {
                r.successful_requests = r.successful_requests.min(r.total_requests);
                r
            })
            .collect();

        if find_by_date(&records, today).is_none() {
            records.push(DailyCounterRecord::new(today));
        }

        self.save(&records)?;
        info!(
            "🔧 计数文件已修复: 保留 {} 条，丢弃 {} 条",
            records.len(),
            total.saturating_sub(records.len())
        );

        Ok(records)
    }

    /// 读取记录；文件不存在时初始化，损坏时修复
    pub fn load_or_initialize(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<DailyCounterRecord>, DataFileError> {
        match self.load() {
            Ok(Some(records)) => Ok(records),
            Ok(None) => {
                info!("📁 计数文件不存在，正在初始化: {}", self.path.display());
                let records = vec![DailyCounterRecord::new(today)];
                self.save(&records)?;
                Ok(records)
            }
            Err(e) => {
                warn!("⚠️ {}，尝试修复", e);
                self.repair(today)
            }
        }
    }
}

/// 从任意 JSON 中取出可能是计数记录的元素
fn record_candidates(value: JsonValue) -> Vec<JsonValue> {
    let list = match value {
        JsonValue::Object(mut map) => map.remove("dailyRequestStatus").unwrap_or(JsonValue::Null),
        other => other,
    };
    match list {
        JsonValue::Array(items) => items,
        JsonValue::Object(_) => vec![list],
        _ => Vec::new(),
    }
}

/// 查找某天的记录
pub fn find_by_date(records: &[DailyCounterRecord], date: NaiveDate) -> Option<&DailyCounterRecord> {
    records.iter().find(|r| r.request_date == date)
}

/// 某天的记录，不存在时返回空记录
pub fn record_for(records: &[DailyCounterRecord], date: NaiveDate) -> DailyCounterRecord {
    find_by_date(records, date)
        .cloned()
        .unwrap_or_else(|| DailyCounterRecord::new(date))
}

/// 对某天的计数加一，返回更新后的全部记录
///
/// 成功数永远不会超过总数：只计成功时总数会同步补齐
pub fn increment(
    mut records: Vec<DailyCounterRecord>,
    date: NaiveDate,
    increment_total: bool,
    increment_successful: bool,
) -> Vec<DailyCounterRecord> {
    let index = match records.iter().position(|r| r.request_date == date) {
        Some(index) => index,
        None => {
            records.push(DailyCounterRecord::new(date));
            records.len() - 1
        }
    };

    let record = &mut records[index];
    if increment_total {
        record.total_requests += 1;
    }
    if increment_successful {
        record.successful_requests += 1;
        record.total_requests = record.total_requests.max(record.successful_requests);
    }

    records
}
