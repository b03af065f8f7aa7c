use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use unityctl_protocol::{LogEntry, LogLevel, LogSource};

/// Bounded ring: entries leave by age.
pub const LOG_BUFFER_CAPACITY: usize = 1000;

/// Per-subscriber queue depth. A subscriber that falls this far behind is
/// dropped from the fan-out rather than blocking the producer.
const SUBSCRIBER_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFilter {
    All,
    Console,
    Editor,
}

impl SourceFilter {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "all" => Some(Self::All),
            "console" => Some(Self::Console),
            "editor" => Some(Self::Editor),
            _ => None,
        }
    }

    pub fn matches(self, source: LogSource) -> bool {
        match self {
            Self::All => true,
            Self::Console => source == LogSource::Console,
            Self::Editor => source == LogSource::Editor,
        }
    }
}

/// Snapshot returned by a tail query.
#[derive(Debug)]
pub struct TailResult {
    pub entries: Vec<LogEntry>,
    pub watermark: u64,
    pub cleared_at: Option<DateTime<Utc>>,
    pub clear_reason: Option<String>,
}

struct Subscriber {
    filter: SourceFilter,
    tx: mpsc::Sender<LogEntry>,
}

struct Inner {
    entries: VecDeque<LogEntry>,
    next_seq: u64,
    watermark: u64,
    cleared_at: Option<DateTime<Utc>>,
    clear_reason: Option<String>,
    subscribers: Vec<Subscriber>,
}

/// The unified log pipeline: a monotonically numbered ring plus a
/// watermark, feeding tail queries and push subscribers. One mutex guards
/// everything; it is only ever held for map/buffer mutation, never I/O.
pub struct LogBuffer {
    inner: Mutex<Inner>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::with_capacity(LOG_BUFFER_CAPACITY),
                next_seq: 1,
                watermark: 0,
                cleared_at: None,
                clear_reason: None,
                subscribers: Vec::new(),
            }),
        }
    }

    /// Accept a log line: assign the next sequence number, append (evicting
    /// the oldest entry past capacity), and fan out to live subscribers.
    /// Subscribers that cannot keep up are dropped; their receiver ends.
    pub fn push(
        &self,
        source: LogSource,
        level: LogLevel,
        message: String,
        stack_trace: Option<String>,
        color: Option<String>,
    ) -> u64 {
        let mut inner = self.inner.lock();
        let sequence_number = inner.next_seq;
        inner.next_seq += 1;

        let entry = LogEntry {
            sequence_number,
            timestamp: Utc::now(),
            source,
            level,
            message,
            stack_trace,
            color,
        };

        inner.entries.push_back(entry.clone());
        if inner.entries.len() > LOG_BUFFER_CAPACITY {
            inner.entries.pop_front();
        }

        inner.subscribers.retain(|sub| {
            if !sub.filter.matches(entry.source) {
                return true;
            }
            sub.tx.try_send(entry.clone()).is_ok()
        });

        sequence_number
    }

    /// Last `lines` entries matching `filter` (0 = all). Without `full`,
    /// entries at or below the watermark are excluded.
    pub fn tail(&self, lines: usize, filter: SourceFilter, full: bool) -> TailResult {
        let inner = self.inner.lock();
        let mut entries: Vec<LogEntry> = inner
            .entries
            .iter()
            .filter(|e| filter.matches(e.source))
            .filter(|e| full || e.sequence_number > inner.watermark)
            .cloned()
            .collect();
        if lines > 0 && entries.len() > lines {
            entries.drain(..entries.len() - lines);
        }
        TailResult {
            entries,
            watermark: inner.watermark,
            cleared_at: inner.cleared_at,
            clear_reason: inner.clear_reason.clone(),
        }
    }

    /// Advance the watermark to the newest accepted sequence number.
    /// Watermarks never move backwards, so clearing an empty buffer twice
    /// is a no-op.
    pub fn clear(&self, reason: Option<String>) -> u64 {
        let mut inner = self.inner.lock();
        inner.watermark = inner.next_seq - 1;
        inner.cleared_at = Some(Utc::now());
        inner.clear_reason = reason;
        inner.watermark
    }

    /// Register a push subscriber. It only observes entries accepted after
    /// this call — no replay.
    pub fn subscribe(&self, filter: SourceFilter) -> mpsc::Receiver<LogEntry> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.inner.lock().subscribers.push(Subscriber { filter, tx });
        rx
    }

    /// Unwatermarked console entries with error-class levels, newest last.
    /// Used to attach "existing compilation errors" to a failed refresh.
    pub fn recent_errors(&self, limit: usize) -> Vec<LogEntry> {
        let inner = self.inner.lock();
        let mut errors: Vec<LogEntry> = inner
            .entries
            .iter()
            .filter(|e| e.source == LogSource::Console && e.level.is_error())
            .filter(|e| e.sequence_number > inner.watermark)
            .cloned()
            .collect();
        if errors.len() > limit {
            errors.drain(..errors.len() - limit);
        }
        errors
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}
