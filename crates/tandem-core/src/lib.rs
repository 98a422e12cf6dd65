//! tandem-core: editing-session reconciliation engine.
//!
//! Lets an assistant stream edits into files while the user keeps typing in
//! them, and settles each file by accepting or rejecting the assistant's
//! changes without losing the user's own edits.
//!
//! - **session**: editing sessions, file entries, mirroring and activity tracking.
//! - **registry**: one session per conversation.
//! - **observable**: reactive cells that state transitions are published through.
//! - **store**: where documents are read from and written back to.
//! - **config**: engine settings.

pub mod config;
pub mod error;
pub mod observable;
pub mod registry;
pub mod session;
pub mod store;

// Top-level re-exports for common usage
pub use crate::config::EngineConfig;
pub use crate::error::{Result, SessionError};
pub use crate::observable::{Derived, Observable, ObservableReader};
pub use crate::registry::SessionRegistry;
pub use crate::session::{
    ConversationId, DiffSummary, EditingSession, EntryState, FileEntry, MirrorOutcome,
    ResponseId, SessionState,
};
pub use crate::store::{DocumentStore, FsDocumentStore, MemoryDocumentStore};
pub use tandem_text as text;
