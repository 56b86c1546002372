//! 请求历史存储
//!
//! 文件格式：`{ "requestHistory": [ {timestamp, status, responseCode, responseData} ] }`
//!
//! 历史文件会被上一次崩溃的运行写坏，这里按条目校验而不是整文件校验，
//! 修复时尽量保留能用的记录

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, FixedOffset, Local};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use super::{strip_bom, write_json_atomic};
use crate::error::DataFileError;
use crate::models::history::{format_timestamp, parse_timestamp};
use crate::models::{HistoryEntry, HistoryFile};

/// 条目数超过该值时建议归档
pub const MAX_HEALTHY_ENTRIES: usize = 10_000;

const REQUIRED_FIELDS: [&str; 4] = ["timestamp", "status", "responseCode", "responseData"];

/// 一次追加的结果
#[derive(Debug, Default)]
pub struct AppendOutcome {
    /// 发生轮转时的归档文件
    pub archived_to: Option<PathBuf>,
    /// 追加前是否修复过文件
    pub repaired: bool,
    /// 追加后的条目数
    pub entry_count: usize,
}

/// 损坏检测报告
#[derive(Debug, Clone, Default)]
pub struct CorruptionReport {
    pub corrupted: bool,
    pub issues: Vec<String>,
    pub recoverable: bool,
    pub recoverable_entry_count: usize,
    pub invalid_entry_count: usize,
    pub duplicate_timestamp_count: usize,
    /// 文件层面的问题（不存在、为空、无法解析、缺少 requestHistory 等）
    pub structural: bool,
}

impl CorruptionReport {
    /// 是否需要修复；只有重复时间戳时不需要
    pub fn needs_repair(&self) -> bool {
        self.structural || self.invalid_entry_count > 0
    }

    fn issue(&mut self, structural: bool, msg: impl Into<String>) {
        self.corrupted = true;
        self.structural |= structural;
        self.issues.push(msg.into());
    }
}

/// 修复结果
#[derive(Debug, Default)]
pub struct RepairOutcome {
    pub kept: usize,
    pub discarded: usize,
    /// 整个文件无法挽救，已重置为空历史
    pub reset: bool,
    pub backup: Option<PathBuf>,
}

/// 健康检查建议
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthRecommendation {
    Healthy,
    Initialize,
    Repair,
    Archive,
}

impl fmt::Display for HealthRecommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            HealthRecommendation::Healthy => "healthy",
            HealthRecommendation::Initialize => "initialize",
            HealthRecommendation::Repair => "repair",
            HealthRecommendation::Archive => "archive (too many entries)",
        };
        f.write_str(text)
    }
}

/// 健康检查报告
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub path: PathBuf,
    pub exists: bool,
    pub size_bytes: u64,
    pub readable: bool,
    pub writable: bool,
    pub corrupted: bool,
    pub valid_entries: usize,
    pub invalid_entries: usize,
    pub issues: Vec<String>,
    pub recommendation: HealthRecommendation,
}

/// 历史统计（用于报告）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryStatistics {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// 成功率（百分比）
    pub success_rate: f64,
    pub by_status: BTreeMap<String, usize>,
    pub first: Option<DateTime<FixedOffset>>,
    pub last: Option<DateTime<FixedOffset>>,
}

/// 请求历史存储
pub struct HistoryStore {
    path: PathBuf,
    max_size_bytes: u64,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>, max_size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            max_size_bytes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取全部历史；文件不存在时返回空列表
    pub fn load(&self) -> Result<Vec<HistoryEntry>, DataFileError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let display = self.path.display().to_string();
        let content =
            fs::read_to_string(&self.path).map_err(|e| DataFileError::read_failed(&display, e))?;
        let content = strip_bom(&content);
        if content.trim().is_empty() {
            return Err(DataFileError::corrupted(&display, "文件为空"));
        }

        let file: HistoryFile = serde_json::from_str(content)
            .map_err(|e| DataFileError::corrupted(&display, e.to_string()))?;
        Ok(file.request_history)
    }

    /// 创建空的历史文件
    pub fn initialize(&self) -> Result<(), DataFileError> {
        self.save(&[])
    }

    fn save(&self, entries: &[HistoryEntry]) -> Result<(), DataFileError> {
        let file = HistoryFile {
            request_history: entries.to_vec(),
        };
        write_json_atomic(&self.path, &file)
    }

    /// 追加一条记录
    ///
    /// 写入前先检查大小，超过阈值时归档旧文件并重新开始；文件损坏时先修复
    pub fn append(&self, entry: HistoryEntry) -> Result<AppendOutcome, DataFileError> {
        let mut outcome = AppendOutcome {
            archived_to: self.rotate_if_needed()?,
            ..Default::default()
        };

        let loaded = match self.load() {
            Ok(_) if self.path.exists() && self.detect_corruption().needs_repair() => {
                Err("存在未通过校验的条目".to_string())
            }
            Ok(entries) => Ok(entries),
            Err(DataFileError::Corrupted { reason, .. }) => Err(reason),
            Err(e) => return Err(e),
        };

        let mut entries = match loaded {
            Ok(entries) => entries,
            Err(reason) => {
                warn!("⚠️ 历史文件损坏 ({})，追加前先修复", reason);
                self.repair()?;
                outcome.repaired = true;
                self.load()?
            }
        };

        let entry = with_unique_timestamp(&entries, entry);
        entries.push(entry);
        self.save(&entries)?;
        outcome.entry_count = entries.len();

        debug!("历史记录已追加，共 {} 条", entries.len());
        Ok(outcome)
    }

    /// 文件超过阈值时归档，返回归档路径
    fn rotate_if_needed(&self) -> Result<Option<PathBuf>, DataFileError> {
        let size = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(_) => return Ok(None),
        };
        if size <= self.max_size_bytes {
            return Ok(None);
        }

        let archive = self.archive_path(Local::now());
        fs::rename(&self.path, &archive).map_err(|source| DataFileError::RotateFailed {
            path: self.path.display().to_string(),
            source,
        })?;
        self.initialize()?;

        info!(
            "📦 历史文件超过 {} 字节，已归档为 {}",
            self.max_size_bytes,
            archive.display()
        );
        Ok(Some(archive))
    }

    /// 归档文件名 `<name>-<yyyy-MM-dd-HH>[-NNN].json`
    pub fn archive_path(&self, at: DateTime<Local>) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "history".to_string());
        let base = format!("{}-{}", stem, at.format("%Y-%m-%d-%H"));

        let candidate = self.path.with_file_name(format!("{}.json", base));
        if !candidate.exists() {
            return candidate;
        }

        (1u32..)
            .map(|n| self.path.with_file_name(format!("{}-{:03}.json", base, n)))
            .find(|p| !p.exists())
            .unwrap_or(candidate)
    }

    /// 检测文件是否损坏
    pub fn detect_corruption(&self) -> CorruptionReport {
        let mut report = CorruptionReport::default();

        let meta = match fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(_) => {
                report.issue(true, "文件不存在");
                report.recoverable = true;
                return report;
            }
        };

        if meta.len() == 0 {
            report.issue(true, "文件大小为 0");
            report.recoverable = true;
            return report;
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                report.issue(true, format!("无法读取文件: {}", e));
                return report;
            }
        };

        let root: JsonValue = match serde_json::from_str(strip_bom(&content)) {
            Ok(root) => root,
            Err(e) => {
                report.issue(true, format!("JSON 格式错误: {}", e));
                return report;
            }
        };

        // JSON 可以解析，至少能写回一个合法文件
        report.recoverable = true;

        let items = match root.get("requestHistory") {
            None => {
                report.issue(true, "缺少 requestHistory 字段");
                return report;
            }
            Some(JsonValue::Array(items)) => items.iter().collect::<Vec<_>>(),
            Some(single @ JsonValue::Object(_)) => vec![single],
            Some(_) => {
                report.issue(true, "requestHistory 不是数组");
                return report;
            }
        };

        let mut seen = HashSet::new();
        for (index, item) in items.iter().enumerate() {
            match validate_entry(item) {
                Ok(()) => {
                    report.recoverable_entry_count += 1;
                    let ts = item["timestamp"].as_str().unwrap_or_default().trim();
                    if !seen.insert(ts.to_string()) {
                        report.duplicate_timestamp_count += 1;
                        report.issue(false, format!("第 {} 条时间戳重复: {}", index + 1, ts));
                    }
                }
                Err(reason) => {
                    report.invalid_entry_count += 1;
                    report.issue(false, format!("第 {} 条无效: {}", index + 1, reason));
                }
            }
        }

        report
    }

    /// 修复历史文件
    ///
    /// 逐条校验并保留有效条目；JSON 无法解析或没有权限读取时重置为空历史。
    /// 覆盖前会尽量备份原文件
    pub fn repair(&self) -> Result<RepairOutcome, DataFileError> {
        let mut outcome = RepairOutcome {
            backup: self.backup(),
            ..Default::default()
        };

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                if e.kind() == ErrorKind::PermissionDenied {
                    warn!("⚠️ 没有读取权限，历史文件将被重置: {}", e);
                } else {
                    warn!("⚠️ 无法读取历史文件，将被重置: {}", e);
                }
                return self.reset(outcome);
            }
        };

        let root: JsonValue = match serde_json::from_str(strip_bom(&content)) {
            Ok(root) => root,
            Err(e) => {
                warn!("⚠️ 历史文件 JSON 无法解析，将被重置: {}", e);
                return self.reset(outcome);
            }
        };

        let items = match root {
            JsonValue::Object(mut map) => match map.remove("requestHistory") {
                Some(JsonValue::Array(items)) => items,
                Some(single @ JsonValue::Object(_)) => vec![single],
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };

        let total = items.len();
        let kept: Vec<HistoryEntry> = items
            .into_iter()
            .filter(|item| validate_entry(item).is_ok())
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect();

        self.save(&kept)?;

        outcome.kept = kept.len();
        outcome.discarded = total - kept.len();
        info!(
            "🔧 历史文件已修复: 保留 {} 条，丢弃 {} 条",
            outcome.kept, outcome.discarded
        );
        Ok(outcome)
    }

    fn reset(&self, mut outcome: RepairOutcome) -> Result<RepairOutcome, DataFileError> {
        self.initialize()?;
        outcome.reset = true;
        info!("🔧 历史文件已重置为空: {}", self.path.display());
        Ok(outcome)
    }

    /// 修复前的备份，失败只记录日志
    fn backup(&self) -> Option<PathBuf> {
        if !self.path.exists() {
            return None;
        }
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "history.json".to_string());
        let backup = self.path.with_file_name(format!(
            "{}.backup-{}",
            name,
            Local::now().format("%Y%m%d-%H%M%S")
        ));

        match fs::copy(&self.path, &backup) {
            Ok(_) => {
                debug!("已备份历史文件到 {}", backup.display());
                Some(backup)
            }
            Err(e) => {
                warn!("⚠️ 备份历史文件失败: {}", e);
                None
            }
        }
    }

    /// 健康检查
    pub fn health_status(&self) -> HealthReport {
        let meta = fs::metadata(&self.path).ok();
        let exists = meta.is_some();
        let size_bytes = meta.as_ref().map(|m| m.len()).unwrap_or(0);
        let readable = exists && File::open(&self.path).is_ok();
        let writable = exists && OpenOptions::new().append(true).open(&self.path).is_ok();

        let corruption = self.detect_corruption();
        let valid_entries = corruption.recoverable_entry_count;
        let invalid_entries = corruption.invalid_entry_count;

        let recommendation = if !exists {
            HealthRecommendation::Initialize
        } else if corruption.needs_repair() {
            HealthRecommendation::Repair
        } else if valid_entries > MAX_HEALTHY_ENTRIES || size_bytes > self.max_size_bytes {
            HealthRecommendation::Archive
        } else {
            HealthRecommendation::Healthy
        };

        HealthReport {
            path: self.path.clone(),
            exists,
            size_bytes,
            readable,
            writable,
            corrupted: corruption.corrupted,
            valid_entries,
            invalid_entries,
            issues: corruption.issues,
            recommendation,
        }
    }
}

/// 时间戳与已有记录重复时按微秒顺延
fn with_unique_timestamp(entries: &[HistoryEntry], mut entry: HistoryEntry) -> HistoryEntry {
    let taken: HashSet<&str> = entries.iter().map(|e| e.timestamp.trim()).collect();
    if !taken.contains(entry.timestamp.trim()) {
        return entry;
    }

    let Some(mut at) = entry.parsed_timestamp() else {
        return entry;
    };
    loop {
        at += Duration::microseconds(1);
        let candidate = format_timestamp(at);
        if !taken.contains(candidate.as_str()) {
            debug!("时间戳重复，顺延为 {}", candidate);
            entry.timestamp = candidate;
            return entry;
        }
    }
}

/// 校验单条历史记录的结构
pub fn validate_entry(item: &JsonValue) -> Result<(), String> {
    let obj = item.as_object().ok_or_else(|| "不是对象".to_string())?;

    if let Some(field) = REQUIRED_FIELDS.iter().find(|f| !obj.contains_key(**f)) {
        return Err(format!("缺少字段 {}", field));
    }

    match obj["timestamp"].as_str() {
        Some(ts) if parse_timestamp(ts).is_some() => {}
        _ => return Err("timestamp 无法解析".to_string()),
    }

    match obj["status"].as_str() {
        Some(status) if !status.trim().is_empty() => {}
        _ => return Err("status 为空".to_string()),
    }

    if obj["responseCode"].as_i64().is_none() {
        return Err("responseCode 不是数字".to_string());
    }

    Ok(())
}

/// 统计历史记录
pub fn statistics(entries: &[HistoryEntry]) -> HistoryStatistics {
    let mut stats = HistoryStatistics {
        total: entries.len(),
        ..Default::default()
    };

    for entry in entries {
        if entry.status.is_success() {
            stats.successful += 1;
        } else {
            stats.failed += 1;
        }
        *stats.by_status.entry(entry.status.to_string()).or_default() += 1;

        if let Some(ts) = entry.parsed_timestamp() {
            stats.first = Some(stats.first.map_or(ts, |f| f.min(ts)));
            stats.last = Some(stats.last.map_or(ts, |l| l.max(ts)));
        }
    }

    if stats.total > 0 {
        stats.success_rate = stats.successful as f64 * 100.0 / stats.total as f64;
    }
    stats
}
