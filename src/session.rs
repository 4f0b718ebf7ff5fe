//! Per-user upload sessions backed by a directory under the uploads root.
//!
//! Each caller gets one session, created lazily on first access. A session owns a timestamped
//! directory (`<uploads_root>/<YYYYMMDD_HHMMSS>`) holding the uploaded PDFs and, after an
//! analysis, the generated summary. The in-memory state sits behind a `tokio::sync::Mutex` that
//! is only held for short reads and writes; file IO and the analysis run happen outside it.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::{OffsetDateTime, macros::format_description};
use tokio::sync::Mutex;

use crate::extraction::count_pages;
use crate::processing::{AnalysisOutcome, SourceDocument};

/// Key under which a caller's assistant state is stored.
pub const STATE_KEY: &str = "assistant_state_v1";

/// Caller identifier used when a request carries none.
pub const DEFAULT_USER: &str = "default";

/// Name substituted when sanitizing leaves nothing behind.
const FALLBACK_FILENAME: &str = "file.pdf";

/// Errors raised by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Upload name does not end in `.pdf`.
    #[error("Seuls les PDF sont acceptés")]
    NotPdf(String),
    /// Deleted file is not part of the session.
    #[error("Fichier déjà supprimé / introuvable")]
    NotFound(String),
    /// Analysis requested with an empty upload list.
    #[error("Aucun PDF uploadé")]
    NoUploads,
    /// Another analysis is still running for this session.
    #[error("Analyse déjà en cours")]
    AnalysisInProgress,
    /// Filesystem failure inside the session directory.
    #[error("IO error on {path}: {source}")]
    Io {
        /// Path being touched.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SessionError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A PDF stored in a session directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedDocument {
    /// Sanitized file name, unique within the session.
    pub filename: String,
    /// Absolute location on disk.
    #[serde(skip)]
    pub path: PathBuf,
    /// Page count, `None` when the PDF could not be parsed.
    #[serde(serialize_with = "serialize_pages")]
    pub pages: Option<usize>,
    /// Size of the stored file in bytes.
    pub size: u64,
    /// Hex SHA-256 of the stored bytes.
    pub sha256: String,
}

impl UploadedDocument {
    /// Page count as displayed to users (`"n/a"` when unknown).
    pub fn pages_label(&self) -> String {
        self.pages
            .map(|count| count.to_string())
            .unwrap_or_else(|| "n/a".to_string())
    }
}

fn serialize_pages<S: Serializer>(pages: &Option<usize>, serializer: S) -> Result<S::Ok, S::Error> {
    match pages {
        Some(count) => serializer.serialize_u64(*count as u64),
        None => serializer.serialize_str("n/a"),
    }
}

/// Identity of a session directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    /// Timestamp identifier, also the directory name.
    pub id: String,
    /// Absolute session directory.
    #[serde(skip)]
    pub dir: PathBuf,
}

/// Snapshot handed to the analysis run once the in-flight flag is set.
#[derive(Debug, Clone)]
pub struct AnalysisTicket {
    /// Session the run belongs to.
    pub session: SessionInfo,
    /// Documents in upload order.
    pub documents: Vec<SourceDocument>,
}

#[derive(Debug)]
struct SessionState {
    info: SessionInfo,
    uploads: Vec<UploadedDocument>,
    analyzing: bool,
    last_outcome: Option<AnalysisOutcome>,
}

/// In-memory registry of caller sessions rooted at one uploads directory.
#[derive(Debug)]
pub struct SessionStore {
    root: PathBuf,
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl SessionStore {
    /// Create a store whose session directories live under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Uploads root served under `/_uploads`.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the caller's session, creating it and its directory on first access.
    pub async fn session(&self, user: &str) -> Result<SessionInfo, SessionError> {
        let info = {
            let mut sessions = self.sessions.lock().await;
            if let Some(state) = sessions.get(&state_key(user)) {
                state.info.clone()
            } else {
                let id = unique_session_id(&sessions);
                let info = SessionInfo {
                    dir: self.root.join(&id),
                    id,
                };
                tracing::info!(user, session = %info.id, "Session created");
                sessions.insert(
                    state_key(user),
                    SessionState {
                        info: info.clone(),
                        uploads: Vec::new(),
                        analyzing: false,
                        last_outcome: None,
                    },
                );
                info
            }
        };
        tokio::fs::create_dir_all(&info.dir)
            .await
            .map_err(|err| SessionError::io(&info.dir, err))?;
        Ok(info)
    }

    /// Uploads of the caller's session, in upload order.
    pub async fn uploads(&self, user: &str) -> Vec<UploadedDocument> {
        self.sessions
            .lock()
            .await
            .get(&state_key(user))
            .map(|state| state.uploads.clone())
            .unwrap_or_default()
    }

    /// Outcome of the caller's most recent successful analysis.
    pub async fn last_outcome(&self, user: &str) -> Option<AnalysisOutcome> {
        self.sessions
            .lock()
            .await
            .get(&state_key(user))
            .and_then(|state| state.last_outcome.clone())
    }

    /// Store an uploaded PDF, replacing any previous upload with the same sanitized name.
    ///
    /// Returns the stored entry and whether an earlier upload was overwritten.
    pub async fn save_upload(
        &self,
        user: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<(UploadedDocument, bool), SessionError> {
        let filename = safe_filename(filename);
        if !filename.to_ascii_lowercase().ends_with(".pdf") {
            return Err(SessionError::NotPdf(filename));
        }

        let session = self.session(user).await?;
        let path = session.dir.join(&filename);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|err| SessionError::io(&path, err))?;

        let count_path = path.clone();
        let pages = tokio::task::spawn_blocking(move || count_pages(&count_path)).await?;
        let entry = UploadedDocument {
            filename,
            path,
            pages,
            size: bytes.len() as u64,
            sha256: hex::encode(Sha256::digest(bytes)),
        };

        let mut sessions = self.sessions.lock().await;
        let uploads = &mut sessions
            .get_mut(&state_key(user))
            .ok_or_else(|| SessionError::NotFound(entry.filename.clone()))?
            .uploads;
        let replaced = match uploads.iter_mut().find(|it| it.filename == entry.filename) {
            Some(existing) => {
                *existing = entry.clone();
                true
            }
            None => {
                uploads.push(entry.clone());
                false
            }
        };
        tracing::info!(
            user,
            filename = %entry.filename,
            pages = %entry.pages_label(),
            replaced,
            "Upload stored"
        );
        Ok((entry, replaced))
    }

    /// Remove an upload from the session and from disk.
    pub async fn delete_upload(&self, user: &str, filename: &str) -> Result<(), SessionError> {
        let filename = safe_filename(filename);
        let removed = {
            let mut sessions = self.sessions.lock().await;
            let uploads = sessions
                .get_mut(&state_key(user))
                .map(|state| &mut state.uploads)
                .ok_or_else(|| SessionError::NotFound(filename.clone()))?;
            let idx = uploads
                .iter()
                .position(|it| it.filename == filename)
                .ok_or_else(|| SessionError::NotFound(filename.clone()))?;
            uploads.remove(idx)
        };

        match tokio::fs::remove_file(&removed.path).await {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(SessionError::io(&removed.path, err)),
        }
        tracing::info!(user, filename = %removed.filename, "Upload deleted");
        Ok(())
    }

    /// Mark the caller's session as analyzing and return its documents.
    ///
    /// Fails without touching the flag when nothing is uploaded or a run is already active.
    pub async fn begin_analysis(&self, user: &str) -> Result<AnalysisTicket, SessionError> {
        let session = self.session(user).await?;
        let mut sessions = self.sessions.lock().await;
        let state = sessions
            .get_mut(&state_key(user))
            .ok_or(SessionError::NoUploads)?;
        if state.uploads.is_empty() {
            return Err(SessionError::NoUploads);
        }
        if state.analyzing {
            return Err(SessionError::AnalysisInProgress);
        }
        state.analyzing = true;
        let documents = state
            .uploads
            .iter()
            .map(|upload| SourceDocument {
                name: upload.filename.clone(),
                path: upload.path.clone(),
            })
            .collect();
        Ok(AnalysisTicket { session, documents })
    }

    /// Clear the in-flight flag, remembering the outcome when the run succeeded.
    pub async fn end_analysis(&self, user: &str, outcome: Option<AnalysisOutcome>) {
        let mut sessions = self.sessions.lock().await;
        if let Some(state) = sessions.get_mut(&state_key(user)) {
            state.analyzing = false;
            if outcome.is_some() {
                state.last_outcome = outcome;
            }
        }
    }

    /// Drop every session and recreate an empty uploads root.
    pub async fn cleanup(&self) -> io::Result<()> {
        self.sessions.lock().await.clear();
        cleanup_uploads_root(&self.root)
    }
}

/// Remove the uploads root recursively and recreate it empty.
pub fn cleanup_uploads_root(root: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(root) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    std::fs::create_dir_all(root)
}

/// Reduce an upload name to a safe final path component.
pub fn safe_filename(name: &str) -> String {
    let normalized = name.trim().replace('\\', "/");
    let last = normalized.rsplit('/').next().unwrap_or_default();
    let cleaned = unsafe_chars().replace_all(last, "_");
    if cleaned.is_empty() || cleaned.chars().all(|ch| ch == '.') {
        FALLBACK_FILENAME.to_string()
    } else {
        cleaned.into_owned()
    }
}

fn unsafe_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[^a-zA-Z0-9._-]+").expect("filename pattern is a valid regex")
    })
}

fn state_key(user: &str) -> String {
    format!("{user}:{STATE_KEY}")
}

fn unique_session_id(sessions: &HashMap<String, SessionState>) -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let base = now
        .format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))
        .unwrap_or_else(|_| "session".to_string());
    let taken = |id: &str| sessions.values().any(|state| state.info.id == id);
    if !taken(&base) {
        return base;
    }
    (2..)
        .map(|n| format!("{base}_{n}"))
        .find(|id| !taken(id))
        .unwrap_or(base)
}
