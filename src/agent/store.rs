//! Persistence for suspended and finished sessions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::agent::state::SessionState;
use crate::error::SessionError;

/// Where session states live between invocations.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, state: &SessionState) -> Result<(), SessionError>;

    /// Load a session, `None` if it was never saved.
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, SessionError>;

    /// Remove a session. Removing an unknown id is not an error.
    async fn remove(&self, session_id: &str) -> Result<(), SessionError>;

    /// Ids of every stored session, sorted.
    async fn list(&self) -> Result<Vec<String>, SessionError>;
}

/// One pretty-printed JSON file per session under a directory.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf, SessionError> {
        let valid = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(SessionError::InvalidState(format!(
                "session id '{session_id}' may only contain letters, digits, '_' and '-'"
            )));
        }
        Ok(self.dir.join(format!("{session_id}.json")))
    }
}

fn store_err(path: &Path) -> impl FnOnce(std::io::Error) -> SessionError + '_ {
    move |source| SessionError::Store {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, state: &SessionState) -> Result<(), SessionError> {
        let path = self.path_for(&state.session_id)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(store_err(&self.dir))?;

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| SessionError::InvalidState(format!("failed to serialize session: {e}")))?;

        // Write beside the target and rename so readers never see a torn file.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(store_err(&tmp))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(store_err(&path))?;

        tracing::debug!(
            session = %state.session_id,
            phase = %state.phase,
            "Session saved to {}",
            path.display()
        );
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, SessionError> {
        let path = self.path_for(session_id)?;
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(store_err(&path)(e)),
        };
        let state = serde_json::from_str(&data).map_err(|source| SessionError::Decode {
            id: session_id.to_string(),
            source,
        })?;
        Ok(Some(state))
    }

    async fn remove(&self, session_id: &str) -> Result<(), SessionError> {
        let path = self.path_for(session_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(store_err(&path)(e)),
        }
    }

    async fn list(&self) -> Result<Vec<String>, SessionError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(store_err(&self.dir)(e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(store_err(&self.dir))? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Process-local store, for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, state: &SessionState) -> Result<(), SessionError> {
        self.sessions
            .write()
            .await
            .insert(state.session_id.clone(), state.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, SessionError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn remove(&self, session_id: &str) -> Result<(), SessionError> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, SessionError> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
