//! Editing sessions.
//!
//! An [`EditingSession`] owns the [`FileEntry`]s one conversation touches,
//! routes streamed edit batches and host-editor edits to them, and publishes
//! whether any response is still streaming.

pub mod activity;
pub mod entry;
pub mod mirror;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tandem_text::{DiffOracle, EditBatch, TextEdit};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{Result, SessionError};
use crate::observable::{Observable, ObservableReader};
use crate::store::DocumentStore;

pub use activity::{ActivityTracker, DiffGuard};
pub use entry::{DiffSummary, EntryState, FileEntry};
pub use mirror::{MirrorOutcome, MirrorPlan};

use entry::EntryContext;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// A fresh random id.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

string_id!(
    /// Identity of one assistant response.
    ResponseId
);

string_id!(
    /// Identity of a conversation; at most one session exists per conversation.
    ConversationId
);

/// Session-wide activity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    StreamingEdits,
}

/// The set of file entries for one conversation.
pub struct EditingSession {
    id: Uuid,
    conversation: ConversationId,
    global: bool,
    ctx: EntryContext,
    entries: Observable<Vec<Arc<FileEntry>>>,
    creating: tokio::sync::Mutex<()>,
    disposed: AtomicBool,
}

impl EditingSession {
    pub(crate) fn new(
        conversation: ConversationId,
        global: bool,
        config: &EngineConfig,
        oracle: Arc<dyn DiffOracle>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            conversation,
            global,
            ctx: EntryContext {
                session_id: id,
                baseline_scheme: config.baseline_scheme.clone(),
                oracle,
                store,
                tracker: ActivityTracker::new(),
                completed: Arc::default(),
            },
            entries: Observable::new(Vec::new()),
            creating: tokio::sync::Mutex::new(()),
            disposed: AtomicBool::new(false),
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn conversation(&self) -> &ConversationId {
        &self.conversation
    }

    /// Whether the session spans the whole conversation rather than one turn.
    #[inline]
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.global
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// `StreamingEdits` while any entry is attributed, `Idle` once all are
    /// released and pending diff recomputation has settled.
    pub fn state(&self) -> ObservableReader<SessionState> {
        self.ctx.tracker.state()
    }

    #[must_use]
    pub fn current_state(&self) -> SessionState {
        self.ctx.tracker.current()
    }

    pub fn entries(&self) -> ObservableReader<Vec<Arc<FileEntry>>> {
        self.entries.reader()
    }

    #[must_use]
    pub fn entry(&self, uri: &Url) -> Option<Arc<FileEntry>> {
        self.entries
            .with(|entries| entries.iter().find(|e| e.working_uri() == uri).cloned())
    }

    /// Resolves once an entry for `uri` exists. There is no built-in timeout.
    pub async fn wait_for_entry(&self, uri: &Url) -> Result<Arc<FileEntry>> {
        let entries = self
            .entries
            .reader()
            .wait_for(|entries| entries.iter().any(|e| e.working_uri() == uri))
            .await?;
        entries
            .into_iter()
            .find(|e| e.working_uri() == uri)
            .ok_or_else(|| SessionError::UnknownEntry(uri.clone()))
    }

    /// Entries currently attributed to `response`.
    #[must_use]
    pub fn entries_modified_by(&self, response: &ResponseId) -> Vec<Arc<FileEntry>> {
        self.entries.with(|entries| {
            entries
                .iter()
                .filter(|e| e.current_writer().as_ref() == Some(response))
                .cloned()
                .collect()
        })
    }

    /// Applies a streamed edit batch from `response` to the entry for `uri`,
    /// creating the entry from the document's current content on first
    /// contact. A missing document starts out empty.
    pub async fn apply_edit_batch(
        &self,
        response: &ResponseId,
        uri: &Url,
        batch: &EditBatch,
    ) -> Result<Arc<FileEntry>> {
        self.ensure_live()?;
        let completed = self.ctx.completed.lock().contains(response);
        if completed {
            return Err(SessionError::ResponseCompleted(response.clone()));
        }

        if let Some(entry) = self.entry(uri) {
            entry.apply_batch(response, batch).await?;
            return Ok(entry);
        }

        let creating = self.creating.lock().await;
        if let Some(entry) = self.entry(uri) {
            drop(creating);
            entry.apply_batch(response, batch).await?;
            return Ok(entry);
        }

        let initial = self.ctx.store.read(uri).await?.unwrap_or_default();
        self.ensure_live()?;

        let entry = Arc::new(FileEntry::new(uri.clone(), initial, self.ctx.clone())?);
        // The entry is only published once its first batch has applied.
        entry.apply_batch(response, batch).await?;
        self.entries.update(|entries| {
            entries.push(Arc::clone(&entry));
            true
        });
        info!(
            "[Session] {} now tracks {} ({} entries)",
            self.id,
            uri,
            self.entries.with(Vec::len)
        );
        Ok(entry)
    }

    /// Routes an edit the host editor made to `uri` through mirroring.
    pub async fn user_edit(&self, uri: &Url, edit: &TextEdit) -> Result<MirrorOutcome> {
        self.ensure_live()?;
        let entry = self
            .entry(uri)
            .ok_or_else(|| SessionError::UnknownEntry(uri.clone()))?;
        entry.apply_user_edit(edit).await
    }

    /// Releases every entry attributed to `response`. Later batches from it
    /// are refused. Returns how many entries were released.
    pub async fn on_response_complete(&self, response: &ResponseId) -> usize {
        self.ctx.completed.lock().insert(response.clone());
        // An entry being created for this response is published before the
        // lock is released, or its first batch sees the response as completed.
        drop(self.creating.lock().await);

        let entries = self.entries.get();
        let mut released = 0;
        for entry in &entries {
            if entry.clear_attribution(response).await {
                released += 1;
            }
        }
        info!(
            "[Session] Response {} complete, released {} entries",
            response, released
        );
        released
    }

    /// Accepts every entry still `Modified`. Entries are settled
    /// independently; the first failure is returned once all have finished.
    pub async fn accept_all(&self) -> Result<usize> {
        self.settle_all(true).await
    }

    /// Rejects every entry still `Modified`. See [`accept_all`](Self::accept_all).
    pub async fn reject_all(&self) -> Result<usize> {
        self.settle_all(false).await
    }

    async fn settle_all(&self, accept: bool) -> Result<usize> {
        self.ensure_live()?;
        let pending: Vec<Arc<FileEntry>> = self.entries.with(|entries| {
            entries
                .iter()
                .filter(|e| e.current_state() == EntryState::Modified)
                .cloned()
                .collect()
        });

        let results = join_all(pending.iter().map(|entry| async move {
            if accept {
                entry.accept().await
            } else {
                entry.reject().await
            }
        }))
        .await;

        let mut settled = 0;
        let mut first_error = None;
        for (entry, result) in pending.iter().zip(results) {
            match result {
                Ok(()) => settled += 1,
                Err(e) => {
                    warn!("[Session] Failed to settle {}: {}", entry.working_uri(), e);
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                debug!("[Session] Settled {} entries (accept={})", settled, accept);
                Ok(settled)
            }
        }
    }

    /// Drops all entries and settles to `Idle`. Further batches and user
    /// edits fail with [`SessionError::Disposed`].
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.entries.update(|entries| {
            let had = !entries.is_empty();
            entries.clear();
            had
        });
        self.ctx.completed.lock().clear();
        self.ctx.tracker.reset();
        info!(
            "[Session] Disposed session {} for conversation {}",
            self.id, self.conversation
        );
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(SessionError::Disposed);
        }
        Ok(())
    }
}

impl fmt::Debug for EditingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditingSession")
            .field("id", &self.id)
            .field("conversation", &self.conversation)
            .field("global", &self.global)
            .field("entries", &self.entries.with(Vec::len))
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
