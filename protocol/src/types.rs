use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a log entry came from: the peer's console stream or the editor's
/// own log file tailed by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Console,
    Editor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Log,
    Warning,
    Error,
    Exception,
    Assert,
}

impl LogLevel {
    /// Error-class levels are what compound flows attach as "existing
    /// compilation errors" when a refresh reports them.
    pub fn is_error(self) -> bool {
        matches!(self, Self::Error | Self::Exception | Self::Assert)
    }
}

/// A single unified log entry. Sequence numbers are assigned by the bridge
/// on acceptance and never decrease within a process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub sequence_number: u64,
    pub timestamp: DateTime<Utc>,
    pub source: LogSource,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Contents of `.unityctl/bridge.json` — how the CLI and the editor plugin
/// discover a running bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDescriptor {
    pub project_id: String,
    pub port: u16,
    pub pid: u32,
}
