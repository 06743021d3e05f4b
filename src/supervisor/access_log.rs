//! Streaming the core's access log line by line

use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, trace};

use crate::common::shutdown_signalled;

/// How often the log is re-checked
pub const FOLLOW_INTERVAL: Duration = Duration::from_millis(500);

/// Tails a file that the core keeps appending to.
///
/// Only complete lines are emitted; a trailing fragment waits for its
/// newline. A file that shrank is read again from the start.
#[derive(Debug)]
pub struct AccessLogFollower {
    path: PathBuf,
    offset: u64,
    pending: Vec<u8>,
}

impl AccessLogFollower {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            pending: Vec::new(),
        }
    }

    /// Lines appended since the last call. A missing file yields nothing.
    pub async fn poll_new_lines(&mut self) -> Vec<String> {
        let Ok(mut file) = File::open(&self.path).await else {
            return Vec::new();
        };
        let Ok(len) = file.metadata().await.map(|m| m.len()) else {
            return Vec::new();
        };

        if len < self.offset {
            trace!("{} shrank, rereading", self.path.display());
            self.offset = 0;
            self.pending.clear();
        }
        if len == self.offset {
            return Vec::new();
        }

        if file.seek(SeekFrom::Start(self.offset)).await.is_err() {
            return Vec::new();
        }
        let mut chunk = Vec::with_capacity((len - self.offset) as usize);
        let Ok(read) = file.read_to_end(&mut chunk).await else {
            return Vec::new();
        };
        self.offset += read as u64;
        self.pending.extend_from_slice(&chunk);
        self.drain_lines()
    }

    fn drain_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\r', '\n']);
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Emit new lines every [`FOLLOW_INTERVAL`] until `shutdown` flips.
    pub fn spawn(mut self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(FOLLOW_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for line in self.poll_new_lines().await {
                            info!("[core] {}", line);
                        }
                    }
                    _ = shutdown_signalled(&mut shutdown) => break,
                }
            }
        })
    }
}
