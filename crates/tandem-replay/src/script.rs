//! Replay scripts.
//!
//! A script seeds an in-memory document store, opens one editing session and
//! feeds it a sequence of steps, the way an assistant transport and a host
//! editor would. The result is a [`Report`] of every step and every entry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tandem_core::text::{EditBatch, TextEdit};
use tandem_core::{
    ConversationId, DiffSummary, EditingSession, EngineConfig, EntryState, MemoryDocumentStore,
    MirrorOutcome, ResponseId, SessionRegistry, SessionState,
};
use tracing::{info, warn};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    /// Initial document contents keyed by URI.
    #[serde(default)]
    pub documents: BTreeMap<Url, String>,
    #[serde(default = "default_conversation")]
    pub conversation: ConversationId,
    #[serde(default)]
    pub global: bool,
    pub steps: Vec<Step>,
}

fn default_conversation() -> ConversationId {
    ConversationId::generate()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Batch {
        response: ResponseId,
        uri: Url,
        #[serde(flatten)]
        batch: EditBatch,
    },
    Complete {
        response: ResponseId,
    },
    UserEdit {
        uri: Url,
        edit: TextEdit,
    },
    Accept {
        uri: Url,
    },
    Reject {
        uri: Url,
    },
    AcceptAll,
    RejectAll,
}

impl Step {
    fn label(&self) -> &'static str {
        match self {
            Step::Batch { .. } => "batch",
            Step::Complete { .. } => "complete",
            Step::UserEdit { .. } => "user_edit",
            Step::Accept { .. } => "accept",
            Step::Reject { .. } => "reject",
            Step::AcceptAll => "accept_all",
            Step::RejectAll => "reject_all",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReplayOptions {
    /// Record failing steps in the report instead of aborting.
    pub keep_going: bool,
    /// How long to wait for the session to settle to `Idle` at the end.
    pub settle: Duration,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            keep_going: false,
            settle: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror: Option<MirrorOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryReport {
    pub uri: Url,
    pub baseline_uri: Url,
    pub state: EntryState,
    pub modified_by: Option<ResponseId>,
    pub baseline: String,
    pub working: String,
    pub summary: Option<DiffSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub conversation: ConversationId,
    pub state: SessionState,
    pub steps: Vec<StepReport>,
    pub entries: Vec<EntryReport>,
    /// Final document contents in the store.
    pub documents: BTreeMap<Url, String>,
}

/// Runs `script` against a fresh registry built from `config`.
pub async fn replay(
    script: Script,
    config: EngineConfig,
    options: ReplayOptions,
) -> anyhow::Result<Report> {
    let store = Arc::new(MemoryDocumentStore::new());
    for (uri, text) in &script.documents {
        store.insert(uri.clone(), text.clone());
    }

    let registry =
        SessionRegistry::new(store.clone(), config).context("Invalid engine config")?;
    let session = registry
        .create_editing_session(script.conversation.clone(), script.global)
        .context("Failed to create editing session")?;

    info!(
        "[Replay] Running {} steps in session {}",
        script.steps.len(),
        session.id()
    );

    let mut steps = Vec::with_capacity(script.steps.len());
    for (index, step) in script.steps.iter().enumerate() {
        let mut report = StepReport {
            index,
            op: step.label(),
            mirror: None,
            error: None,
        };
        match run_step(&session, step).await {
            Ok(mirror) => report.mirror = mirror,
            Err(e) if options.keep_going => {
                warn!("[Replay] Step {} ({}) failed: {}", index, step.label(), e);
                report.error = Some(e.to_string());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Step {} ({}) failed", index, step.label()));
            }
        }
        steps.push(report);
    }

    let settled = tokio::time::timeout(
        options.settle,
        session.state().wait_for(|s| *s == SessionState::Idle),
    )
    .await;
    if settled.is_err() {
        warn!("[Replay] Session still streaming after {:?}", options.settle);
    }

    let entries = collect_entries(&session).await;
    let documents = script
        .documents
        .keys()
        .chain(entries.iter().map(|e| &e.uri))
        .filter_map(|uri| store.get(uri).map(|text| (uri.clone(), text)))
        .collect();

    let report = Report {
        conversation: script.conversation,
        state: session.current_state(),
        steps,
        entries,
        documents,
    };
    registry.dispose(&report.conversation);
    Ok(report)
}

async fn run_step(
    session: &EditingSession,
    step: &Step,
) -> anyhow::Result<Option<MirrorOutcome>> {
    match step {
        Step::Batch {
            response,
            uri,
            batch,
        } => {
            session.apply_edit_batch(response, uri, batch).await?;
        }
        Step::Complete { response } => {
            session.on_response_complete(response).await;
        }
        Step::UserEdit { uri, edit } => {
            return Ok(Some(session.user_edit(uri, edit).await?));
        }
        Step::Accept { uri } | Step::Reject { uri } => {
            let Some(entry) = session.entry(uri) else {
                bail!("No entry for {}", uri);
            };
            if matches!(step, Step::Accept { .. }) {
                entry.accept().await?;
            } else {
                entry.reject().await?;
            }
        }
        Step::AcceptAll => {
            session.accept_all().await?;
        }
        Step::RejectAll => {
            session.reject_all().await?;
        }
    }
    Ok(None)
}

async fn collect_entries(session: &EditingSession) -> Vec<EntryReport> {
    let mut reports = Vec::new();
    for entry in session.entries().get() {
        let summary = match entry.diff_summary().await {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(
                    "[Replay] No diff summary for {}: {}",
                    entry.working_uri(),
                    e
                );
                None
            }
        };
        reports.push(EntryReport {
            uri: entry.working_uri().clone(),
            baseline_uri: entry.baseline_uri().clone(),
            state: entry.current_state(),
            modified_by: entry.current_writer(),
            baseline: entry.baseline_text().await,
            working: entry.working_text().await,
            summary,
        });
    }
    reports.sort_by(|a, b| a.uri.cmp(&b.uri));
    reports
}
