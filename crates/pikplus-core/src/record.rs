use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const UNKNOWN_TASK_NAME: &str = "Unknown task";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(untagged)]
pub enum TaskId {
    Num(u64),
    Text(String),
}

impl TaskId {
    /// Parses a user-supplied id, preferring the numeric form.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<u64>() {
            Ok(num) => Self::Num(num),
            Err(_) => Self::Text(trimmed.to_string()),
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(num) => write!(f, "{num}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<u64> for TaskId {
    fn from(value: u64) -> Self {
        Self::Num(value)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskPhase {
    Pending,
    Running,
    Complete,
    Error,
    Unknown(String),
}

impl TaskPhase {
    pub fn parse(raw: &str) -> Self {
        let upper = raw.trim().to_ascii_uppercase();
        let bare = upper.strip_prefix("PHASE_TYPE_").unwrap_or(&upper);
        match bare {
            "PENDING" => Self::Pending,
            "RUNNING" => Self::Running,
            "COMPLETE" | "COMPLETED" => Self::Complete,
            "ERROR" => Self::Error,
            _ => Self::Unknown(raw.trim().to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Unknown(raw) => raw.as_str(),
        }
    }
}

/// Task record exactly as the backend reports it. Provider fields are loose
/// and only read by [`TaskRecord::from_raw`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTaskRecord {
    pub id: Option<TaskId>,

    #[serde(default, alias = "createdAt", alias = "created_time")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub data: Option<RawProviderTask>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProviderTask {
    #[serde(default)]
    pub task: Option<RawProviderFields>,

    #[serde(flatten)]
    pub top: RawProviderFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProviderFields {
    #[serde(default)]
    pub file_name: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub file_size: Option<Value>,

    #[serde(default)]
    pub phase: Option<String>,

    #[serde(default)]
    pub progress: Option<Value>,

    #[serde(default)]
    pub file_id: Option<String>,

    #[serde(default)]
    pub params: Option<RawParams>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawParams {
    #[serde(default)]
    pub title: Option<String>,
}

/// Normalized server task. `is_local` is derived on the client and never
/// read from the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    pub id: TaskId,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    pub url: String,

    #[serde(default)]
    pub file_name: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub size: Option<u64>,

    #[serde(default)]
    pub phase: Option<TaskPhase>,

    #[serde(default)]
    pub progress: Option<u8>,

    #[serde(default)]
    pub file_id: Option<String>,

    #[serde(default, skip_deserializing)]
    pub is_local: bool,
}

impl TaskRecord {
    pub fn new(id: impl Into<TaskId>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: None,
            url: url.into(),
            file_name: None,
            name: None,
            title: None,
            size: None,
            phase: None,
            progress: None,
            file_id: None,
            is_local: false,
        }
    }

    /// Runs once at ingestion; every later read goes through the typed fields.
    pub fn from_raw(raw: RawTaskRecord, fallback_id: u64) -> Self {
        let data = raw.data.unwrap_or_default();
        let nested = data.task.unwrap_or_default();
        let top = data.top;

        let pick = |a: Option<String>, b: Option<String>| non_blank(a).or_else(|| non_blank(b));

        let title = pick(
            nested.params.and_then(|p| p.title),
            top.params.and_then(|p| p.title),
        );

        Self {
            id: raw.id.unwrap_or(TaskId::Num(fallback_id)),
            created_at: raw.created_at,
            url: raw.url.unwrap_or_default(),
            file_name: pick(nested.file_name, top.file_name),
            name: pick(nested.name, top.name),
            title,
            size: parse_size(nested.file_size.as_ref()).or_else(|| parse_size(top.file_size.as_ref())),
            phase: pick(nested.phase, top.phase).map(|p| TaskPhase::parse(&p)),
            progress: parse_progress(nested.progress.as_ref())
                .or_else(|| parse_progress(top.progress.as_ref())),
            file_id: pick(nested.file_id, top.file_id),
            is_local: false,
        }
    }

    pub fn display_name(&self) -> String {
        display_name(self)
    }
}

/// Provider file name, then generic name, then metadata title.
pub fn display_name(task: &TaskRecord) -> String {
    [&task.file_name, &task.name, &task.title]
        .into_iter()
        .find_map(|candidate| {
            candidate
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
        })
        .unwrap_or(UNKNOWN_TASK_NAME)
        .to_string()
}

/// Normalizes a page of raw backend records in arrival order.
pub fn ingest(raw: Vec<RawTaskRecord>) -> Vec<TaskRecord> {
    raw.into_iter()
        .enumerate()
        .map(|(idx, record)| TaskRecord::from_raw(record, idx as u64 + 1))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalTask {
    pub id: TaskId,

    pub url: String,

    #[serde(default)]
    pub status: String,

    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
}

impl LocalTask {
    pub fn new(id: impl Into<TaskId>, url: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            status: "pending".to_string(),
            timestamp: now,
            name: None,
            file_size: None,
            file_type: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalShare {
    pub id: TaskId,

    pub file_name: String,

    pub share_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_code: Option<String>,

    pub timestamp: DateTime<Utc>,

    pub file_id: String,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_size(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(num) => num.as_u64(),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn parse_progress(value: Option<&Value>) -> Option<u8> {
    let pct = match value? {
        Value::Number(num) => num.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if pct.is_nan() {
        return None;
    }
    Some(pct.clamp(0.0, 100.0).round() as u8)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn raw_record_is_normalized_once() {
        let raw: RawTaskRecord = serde_json::from_value(json!({
            "id": 42,
            "url": "magnet:?xt=urn:btih:abc",
            "data": {
                "task": {
                    "file_name": "  ",
                    "name": "ubuntu.iso",
                    "file_size": "1024",
                    "phase": "PHASE_TYPE_RUNNING",
                    "progress": 57.6,
                    "file_id": "f-1"
                }
            }
        }))
        .unwrap();

        let task = TaskRecord::from_raw(raw, 1);
        assert_eq!(task.id, TaskId::Num(42));
        assert_eq!(task.file_name, None);
        assert_eq!(task.name.as_deref(), Some("ubuntu.iso"));
        assert_eq!(task.size, Some(1024));
        assert_eq!(task.phase, Some(TaskPhase::Running));
        assert_eq!(task.progress, Some(58));
        assert_eq!(task.file_id.as_deref(), Some("f-1"));
        assert!(!task.is_local);
    }

    #[test]
    fn display_name_prefers_file_name_then_name_then_title() {
        let mut task = TaskRecord::new(1, "u");
        assert_eq!(display_name(&task), UNKNOWN_TASK_NAME);

        task.title = Some("Title".to_string());
        assert_eq!(display_name(&task), "Title");

        task.name = Some("Name".to_string());
        assert_eq!(display_name(&task), "Name");

        task.file_name = Some("file.mkv".to_string());
        assert_eq!(display_name(&task), "file.mkv");
    }

    #[test]
    fn title_comes_from_params() {
        let raw: RawTaskRecord = serde_json::from_value(json!({
            "id": "t-9",
            "url": "magnet:?xt=urn:btih:def",
            "data": { "params": { "title": "Some Movie" } }
        }))
        .unwrap();

        let task = TaskRecord::from_raw(raw, 1);
        assert_eq!(task.id, TaskId::Text("t-9".to_string()));
        assert_eq!(task.display_name(), "Some Movie");
    }

    #[test]
    fn missing_id_falls_back_to_position() {
        let records = ingest(vec![RawTaskRecord::default(), RawTaskRecord::default()]);
        assert_eq!(records[1].id, TaskId::Num(2));
        assert_eq!(records[1].url, "");
    }

    #[test]
    fn task_id_parse_prefers_numbers() {
        assert_eq!(TaskId::parse(" 17 "), TaskId::Num(17));
        assert_eq!(TaskId::parse("VNabc"), TaskId::Text("VNabc".to_string()));
        assert_eq!(TaskId::Num(3).to_string(), "3");
    }

    #[test]
    fn phase_parsing_is_lenient() {
        assert_eq!(TaskPhase::parse("phase_type_complete"), TaskPhase::Complete);
        assert_eq!(TaskPhase::parse("ERROR"), TaskPhase::Error);
        assert_eq!(
            TaskPhase::parse("PHASE_TYPE_PAUSED"),
            TaskPhase::Unknown("PHASE_TYPE_PAUSED".to_string())
        );
    }
}
