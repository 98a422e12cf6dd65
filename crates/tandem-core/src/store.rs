//! Document stores.
//!
//! A [`DocumentStore`] is how a session reads a file's current content when
//! it first touches it, and how a reject writes the restored text back to
//! the user's document.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::fs;
use url::Url;

use crate::error::{Result, SessionError};

/// Read/write access to the documents a session edits.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Current text of `uri`, or `None` when the document does not exist yet.
    async fn read(&self, uri: &Url) -> Result<Option<String>>;

    /// Replaces the full text of `uri`.
    async fn write(&self, uri: &Url, text: &str) -> Result<()>;
}

/// In-memory store keyed by URI.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    docs: RwLock<HashMap<Url, String>>,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_document(self, uri: Url, text: impl Into<String>) -> Self {
        self.insert(uri, text);
        self
    }

    pub fn insert(&self, uri: Url, text: impl Into<String>) {
        self.docs.write().insert(uri, text.into());
    }

    #[must_use]
    pub fn get(&self, uri: &Url) -> Option<String> {
        self.docs.read().get(uri).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn read(&self, uri: &Url) -> Result<Option<String>> {
        Ok(self.get(uri))
    }

    async fn write(&self, uri: &Url, text: &str) -> Result<()> {
        self.insert(uri.clone(), text);
        Ok(())
    }
}

/// Store for `file://` URIs on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    temp_folder: PathBuf,
}

impl FsDocumentStore {
    /// `temp_folder` holds in-flight writes before they are renamed into place.
    /// It should live on the same filesystem as the documents.
    pub fn new(temp_folder: impl Into<PathBuf>) -> Self {
        Self {
            temp_folder: temp_folder.into(),
        }
    }

    fn path_for(uri: &Url) -> Result<PathBuf> {
        if uri.scheme() != "file" {
            return Err(SessionError::UnsupportedUri(uri.to_string()));
        }
        uri.to_file_path()
            .map_err(|_| SessionError::UnsupportedUri(uri.to_string()))
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn read(&self, uri: &Url) -> Result<Option<String>> {
        let path = Self::path_for(uri)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(String::from_utf8(bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SessionError::Io(e)),
        }
    }

    async fn write(&self, uri: &Url, text: &str) -> Result<()> {
        let path = Self::path_for(uri)?;
        atomic_write(&path, text.as_bytes(), &self.temp_folder).await
    }
}

/// Writes `data` to a temp file and renames it over `dest`.
pub async fn atomic_write(dest: &Path, data: &[u8], temp_folder: &Path) -> Result<()> {
    fs::create_dir_all(temp_folder).await?;

    let temp_name = format!("tmp_{}", uuid::Uuid::new_v4());
    let temp_path = temp_folder.join(temp_name);

    fs::write(&temp_path, data).await?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }

    if let Err(e) = fs::rename(&temp_path, dest).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(SessionError::Io(e));
    }
    Ok(())
}
