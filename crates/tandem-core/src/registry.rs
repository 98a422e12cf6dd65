//! One editing session per conversation.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tandem_text::DiffOracle;
use tracing::info;

use crate::config::EngineConfig;
use crate::error::{Result, SessionError};
use crate::session::{ConversationId, EditingSession};
use crate::store::DocumentStore;

/// Maps conversations to their live editing session.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ConversationId, Arc<EditingSession>>>,
    store: Arc<dyn DocumentStore>,
    oracle: Arc<dyn DiffOracle>,
    config: EngineConfig,
}

impl SessionRegistry {
    /// Uses the oracle selected by `config.diff_granularity`.
    pub fn new(store: Arc<dyn DocumentStore>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            sessions: Mutex::new(HashMap::new()),
            store,
            oracle: config.diff_granularity.oracle(),
            config,
        })
    }

    /// Replaces the diff oracle used by sessions created from now on.
    #[must_use]
    pub fn with_oracle(mut self, oracle: Arc<dyn DiffOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Creates the session for `conversation`.
    ///
    /// Fails with [`SessionError::DuplicateSession`] while a session for the
    /// same conversation is registered; that session is left untouched.
    pub fn create_editing_session(
        &self,
        conversation: ConversationId,
        global: bool,
    ) -> Result<Arc<EditingSession>> {
        let mut sessions = self.sessions.lock();
        match sessions.entry(conversation) {
            Entry::Occupied(existing) => {
                Err(SessionError::DuplicateSession(existing.key().clone()))
            }
            Entry::Vacant(slot) => {
                let session = Arc::new(EditingSession::new(
                    slot.key().clone(),
                    global,
                    &self.config,
                    Arc::clone(&self.oracle),
                    Arc::clone(&self.store),
                ));
                info!(
                    "[Registry] Created session {} for conversation {} (global={}, oracle={})",
                    session.id(),
                    slot.key(),
                    global,
                    self.oracle.name()
                );
                slot.insert(Arc::clone(&session));
                Ok(session)
            }
        }
    }

    #[must_use]
    pub fn get(&self, conversation: &ConversationId) -> Option<Arc<EditingSession>> {
        self.sessions.lock().get(conversation).cloned()
    }

    /// Disposes and unregisters the session for `conversation`. Returns
    /// whether one existed.
    pub fn dispose(&self, conversation: &ConversationId) -> bool {
        let removed = self.sessions.lock().remove(conversation);
        match removed {
            Some(session) => {
                session.dispose();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
