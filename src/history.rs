use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::RwLock;

use crate::constants::DEFAULT_EMOTION;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Process-wide mood log plus the most recently observed label.
///
/// Entries are only ever appended; the log is shared by every session for the
/// lifetime of the process.
#[derive(Debug)]
pub struct MoodHistory {
    state: RwLock<HistoryState>,
}

/// 日志与当前情绪放在同一把锁下，读者不会看到新条目配旧情绪
#[derive(Debug)]
struct HistoryState {
    entries: Vec<String>,
    current: String,
}

impl Default for MoodHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl MoodHistory {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HistoryState {
                entries: Vec::new(),
                current: DEFAULT_EMOTION.to_string(),
            }),
        }
    }

    pub async fn record(&self, label: &str) {
        let mut state = self.state.write().await;
        state.entries.push(label.to_string());
        state.current = label.to_string();
    }

    pub async fn current_emotion(&self) -> String {
        self.state.read().await.current.clone()
    }

    pub async fn snapshot(&self) -> Vec<String> {
        self.state.read().await.entries.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    /// Writes the full log as a JSON array, replacing any previous file.
    pub async fn persist(&self, path: &Path) -> Result<usize, HistoryError> {
        let snapshot = self.snapshot().await;
        write_log(path, &snapshot).await?;
        Ok(snapshot.len())
    }
}

pub async fn write_log(path: &Path, entries: &[String]) -> Result<(), HistoryError> {
    let payload = serde_json::to_vec(entries)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, &payload).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

pub async fn read_log(path: &Path) -> Result<Vec<String>, HistoryError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "mood_log.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}
