use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use unityctl_protocol::{LogLevel, LogSource};

use crate::logs::LogBuffer;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Follow the editor's log file, feeding appended lines into the unified
/// pipeline as `source=editor` entries. The file may not exist yet (the
/// editor creates it on first launch) and may rotate at any time; both are
/// handled by re-checking on every tick.
pub fn spawn(path: PathBuf, logs: Arc<LogBuffer>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tailer = Tailer::new(path, logs);
        loop {
            tailer.poll_once();
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
}

struct Tailer {
    path: PathBuf,
    logs: Arc<LogBuffer>,
    offset: u64,
    /// Trailing bytes of an incomplete line, held until its newline lands.
    partial: String,
    #[cfg(unix)]
    inode: Option<u64>,
}

impl Tailer {
    fn new(path: PathBuf, logs: Arc<LogBuffer>) -> Self {
        Self {
            path,
            logs,
            offset: 0,
            partial: String::new(),
            #[cfg(unix)]
            inode: None,
        }
    }

    fn poll_once(&mut self) {
        let Ok(metadata) = std::fs::metadata(&self.path) else {
            // Not created yet, or mid-rotation; try again next tick
            return;
        };

        if self.detect_rotation(&metadata) {
            self.offset = 0;
            self.partial.clear();
        }

        let len = metadata.len();
        if len <= self.offset {
            return;
        }

        let mut chunk = Vec::with_capacity((len - self.offset) as usize);
        let read = File::open(&self.path).and_then(|mut file| {
            file.seek(SeekFrom::Start(self.offset))?;
            file.read_to_end(&mut chunk)
        });
        let Ok(read) = read else { return };
        self.offset += read as u64;

        self.partial.push_str(&String::from_utf8_lossy(&chunk));
        while let Some(newline) = self.partial.find('\n') {
            let line = self.partial[..newline].trim_end_matches('\r').to_string();
            self.partial.drain(..=newline);
            self.logs
                .push(LogSource::Editor, LogLevel::Log, line, None, None);
        }
    }

    /// Truncation (size below our offset) or an inode change means the
    /// file was rotated and must be re-read from the start.
    #[cfg(unix)]
    fn detect_rotation(&mut self, metadata: &std::fs::Metadata) -> bool {
        use std::os::unix::fs::MetadataExt;
        let inode = metadata.ino();
        let rotated = metadata.len() < self.offset || self.inode.is_some_and(|i| i != inode);
        self.inode = Some(inode);
        rotated
    }

    #[cfg(not(unix))]
    fn detect_rotation(&mut self, metadata: &std::fs::Metadata) -> bool {
        metadata.len() < self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::logs::SourceFilter;

    fn setup() -> (tempfile::TempDir, Tailer, Arc<LogBuffer>) {
        let dir = tempfile::tempdir().unwrap();
        let logs = Arc::new(LogBuffer::new());
        let tailer = Tailer::new(dir.path().join("editor.log"), logs.clone());
        (dir, tailer, logs)
    }

    fn editor_messages(logs: &LogBuffer) -> Vec<String> {
        logs.tail(0, SourceFilter::Editor, true)
            .entries
            .into_iter()
            .map(|e| e.message)
            .collect()
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let (_dir, mut tailer, logs) = setup();
        tailer.poll_once();
        assert!(editor_messages(&logs).is_empty());
    }

    #[test]
    fn appended_lines_become_entries() {
        let (_dir, mut tailer, logs) = setup();
        std::fs::write(&tailer.path, "first line\nsecond line\n").unwrap();
        tailer.poll_once();
        assert_eq!(editor_messages(&logs), vec!["first line", "second line"]);

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&tailer.path)
            .unwrap();
        writeln!(file, "third line").unwrap();
        tailer.poll_once();
        assert_eq!(
            editor_messages(&logs),
            vec!["first line", "second line", "third line"]
        );
    }

    #[test]
    fn partial_line_is_held_until_newline() {
        let (_dir, mut tailer, logs) = setup();
        std::fs::write(&tailer.path, "incomplete").unwrap();
        tailer.poll_once();
        assert!(editor_messages(&logs).is_empty());

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&tailer.path)
            .unwrap();
        write!(file, " but finished now\n").unwrap();
        tailer.poll_once();
        assert_eq!(editor_messages(&logs), vec!["incomplete but finished now"]);
    }

    #[test]
    fn crlf_endings_are_stripped() {
        let (_dir, mut tailer, logs) = setup();
        std::fs::write(&tailer.path, "windows line\r\n").unwrap();
        tailer.poll_once();
        assert_eq!(editor_messages(&logs), vec!["windows line"]);
    }

    #[test]
    fn truncation_restarts_from_the_top() {
        let (_dir, mut tailer, logs) = setup();
        std::fs::write(&tailer.path, "old contents line\n").unwrap();
        tailer.poll_once();

        // Rotation by truncate-and-rewrite
        std::fs::write(&tailer.path, "fresh\n").unwrap();
        tailer.poll_once();
        assert_eq!(editor_messages(&logs), vec!["old contents line", "fresh"]);
    }

    #[cfg(unix)]
    #[test]
    fn replacement_file_is_detected_by_inode() {
        let (dir, mut tailer, logs) = setup();
        std::fs::write(&tailer.path, "before rotate\n").unwrap();
        tailer.poll_once();

        // Replace with a different file of the SAME length — only the
        // inode gives the rotation away.
        let staging = dir.path().join("editor.log.new");
        std::fs::write(&staging, "after rotated\n").unwrap();
        std::fs::rename(&staging, &tailer.path).unwrap();
        tailer.poll_once();
        assert_eq!(editor_messages(&logs), vec!["before rotate", "after rotated"]);
    }
}
