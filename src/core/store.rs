use crate::core::models::PersistedState;
use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(PersistedState),
    /// No state has ever been written.
    Absent,
    /// State exists but could not be read or parsed.
    Corrupted,
}

impl LoadOutcome {
    pub fn into_state(self) -> PersistedState {
        match self {
            LoadOutcome::Loaded(state) => state,
            LoadOutcome::Absent | LoadOutcome::Corrupted => PersistedState::default(),
        }
    }
}

pub trait StateStore: Send + Sync {
    fn load(&self) -> LoadOutcome;

    /// Best-effort: the write is initiated and failures are never reported
    /// back. The next successful write reconciles the stored state.
    fn store(&self, state: PersistedState);
}

enum WriterCommand {
    Write(PersistedState),
    Flush(oneshot::Sender<()>),
}

/// JSON file store whose writes are drained in order by a background task.
pub struct FileStateStore {
    path: PathBuf,
    writer: mpsc::UnboundedSender<WriterCommand>,
}

impl FileStateStore {
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join("paced-poller").join("state.json"))
    }

    /// Spawns the writer task, so this must run inside a tokio runtime.
    pub fn open(path: PathBuf) -> Self {
        let (writer, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(path.clone(), rx));
        Self { path, writer }
    }

    pub fn read(path: &Path) -> LoadOutcome {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return LoadOutcome::Absent,
            Err(e) => {
                tracing::warn!(?path, error = %e, "Failed to read persisted state");
                return LoadOutcome::Corrupted;
            }
        };

        match serde_json::from_str(&content) {
            Ok(state) => LoadOutcome::Loaded(state),
            Err(e) => {
                tracing::warn!(?path, error = %e, "Persisted state is malformed");
                LoadOutcome::Corrupted
            }
        }
    }

    /// Waits until every write queued so far has been attempted.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.writer.send(WriterCommand::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> LoadOutcome {
        Self::read(&self.path)
    }

    fn store(&self, state: PersistedState) {
        if self.writer.send(WriterCommand::Write(state)).is_err() {
            tracing::warn!(path = ?self.path, "State writer has stopped, dropping write");
        }
    }
}

async fn run_writer(path: PathBuf, mut rx: mpsc::UnboundedReceiver<WriterCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Write(mut state) => {
                let mut pending_flush = Vec::new();
                // Only the newest queued state matters.
                while let Ok(next) = rx.try_recv() {
                    match next {
                        WriterCommand::Write(newer) => state = newer,
                        WriterCommand::Flush(done) => pending_flush.push(done),
                    }
                }

                if let Err(e) = write_state(&path, &state).await {
                    tracing::warn!(?path, error = %e, "Failed to persist state");
                }

                for done in pending_flush {
                    let _ = done.send(());
                }
            }
            WriterCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

async fn write_state(path: &Path, state: &PersistedState) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let content = serde_json::to_string_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, content)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move state into {}", path.display()))?;

    tracing::debug!(?path, "Saved state");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn scratch_path(name: &str) -> PathBuf {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        std::env::temp_dir()
            .join(format!("paced-poller-{name}-{}-{nanos}", std::process::id()))
            .join("state.json")
    }

    fn sample_state() -> PersistedState {
        PersistedState {
            last_query_time: Some(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()),
            last_response_time: Some(Utc.timestamp_millis_opt(1_700_000_000_750).unwrap()),
        }
    }

    #[test]
    fn test_missing_file_is_absent() {
        let path = scratch_path("absent");
        assert_eq!(FileStateStore::read(&path), LoadOutcome::Absent);
    }

    #[test]
    fn test_garbage_file_is_corrupted() {
        let path = scratch_path("garbage");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{\"lastAPIQueryTime\": 17").unwrap();

        assert_eq!(FileStateStore::read(&path), LoadOutcome::Corrupted);
    }

    #[test]
    fn test_directory_in_place_of_file_is_corrupted() {
        let path = scratch_path("directory");
        std::fs::create_dir_all(&path).unwrap();

        assert_eq!(FileStateStore::read(&path), LoadOutcome::Corrupted);
    }

    #[test]
    fn test_load_outcome_into_state() {
        assert!(LoadOutcome::Absent.into_state().is_empty());
        assert!(LoadOutcome::Corrupted.into_state().is_empty());
        assert_eq!(
            LoadOutcome::Loaded(sample_state()).into_state(),
            sample_state()
        );
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let path = scratch_path("roundtrip");
        let store = FileStateStore::open(path.clone());

        store.store(PersistedState::default());
        store.store(sample_state());
        store.flush().await;

        assert_eq!(store.load(), LoadOutcome::Loaded(sample_state()));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_write_failure_does_not_stop_writer() {
        let path = scratch_path("blocked");
        // A regular file where the parent directory should be makes every write fail.
        let parent = path.parent().unwrap();
        std::fs::create_dir_all(parent.parent().unwrap()).unwrap();
        std::fs::write(parent, "not a directory").unwrap();

        let store = FileStateStore::open(path.clone());
        store.store(sample_state());
        store.flush().await;
        assert_eq!(store.load(), LoadOutcome::Corrupted);

        std::fs::remove_file(parent).unwrap();
        store.store(sample_state());
        store.flush().await;
        assert_eq!(store.load(), LoadOutcome::Loaded(sample_state()));
    }
}
