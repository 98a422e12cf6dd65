//! Per-file reconciliation state.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tandem_text::{apply_edits, char_len, slice, DiffOracle, DiffSpan, EditBatch, TextEdit, TextError};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::activity::ActivityTracker;
use super::mirror::{self, MirrorOutcome};
use super::ResponseId;
use crate::error::{Result, SessionError};
use crate::observable::{Observable, ObservableReader};
use crate::store::DocumentStore;

/// Lifecycle of a file entry. `Accepted` and `Rejected` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    Modified,
    Accepted,
    Rejected,
}

impl EntryState {
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, EntryState::Modified)
    }
}

/// Size of the pending change set, for UI collaborators.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub regions: usize,
    pub added_lines: usize,
    pub removed_lines: usize,
}

impl DiffSummary {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions == 0
    }
}

/// Baseline and working text of one file plus the cached diff between them.
/// `diff` is `None` whenever it is stale.
struct Snapshots {
    baseline: String,
    working: String,
    diff: Option<Vec<DiffSpan>>,
    done_by: Option<ResponseId>,
}

/// Collaborators an entry needs from its session.
#[derive(Clone)]
pub(crate) struct EntryContext {
    pub session_id: Uuid,
    pub baseline_scheme: String,
    pub oracle: Arc<dyn DiffOracle>,
    pub store: Arc<dyn DocumentStore>,
    pub tracker: ActivityTracker,
    /// Responses that have finished and may no longer write.
    pub completed: Arc<parking_lot::Mutex<HashSet<ResponseId>>>,
}

/// One file being edited within a session.
///
/// The baseline is the file as it would look if every assistant change were
/// rejected, with the user's own edits to pre-existing text mirrored in. The
/// working copy is exactly what the user sees. All mutation goes through
/// [`apply_batch`](Self::apply_batch) for attributed writers and
/// [`apply_user_edit`](Self::apply_user_edit) for the host editor.
pub struct FileEntry {
    working_uri: Url,
    baseline_uri: Url,
    state: Observable<EntryState>,
    modified_by: Observable<Option<ResponseId>>,
    texts: Mutex<Snapshots>,
    oracle: Arc<dyn DiffOracle>,
    store: Arc<dyn DocumentStore>,
    tracker: ActivityTracker,
    completed: Arc<parking_lot::Mutex<HashSet<ResponseId>>>,
}

impl FileEntry {
    pub(crate) fn new(working_uri: Url, initial: String, ctx: EntryContext) -> Result<Self> {
        let baseline_uri = baseline_uri_for(&working_uri, &ctx.baseline_scheme, ctx.session_id)?;
        Ok(Self {
            working_uri,
            baseline_uri,
            state: Observable::new(EntryState::Modified),
            modified_by: Observable::new(None),
            texts: Mutex::new(Snapshots {
                baseline: initial.clone(),
                working: initial,
                diff: Some(Vec::new()),
                done_by: None,
            }),
            oracle: ctx.oracle,
            store: ctx.store,
            tracker: ctx.tracker,
            completed: ctx.completed,
        })
    }

    #[inline]
    #[must_use]
    pub fn working_uri(&self) -> &Url {
        &self.working_uri
    }

    #[inline]
    #[must_use]
    pub fn baseline_uri(&self) -> &Url {
        &self.baseline_uri
    }

    pub fn state(&self) -> ObservableReader<EntryState> {
        self.state.reader()
    }

    #[must_use]
    pub fn current_state(&self) -> EntryState {
        self.state.get()
    }

    /// The response currently streaming edits into this entry, if any.
    pub fn modified_by(&self) -> ObservableReader<Option<ResponseId>> {
        self.modified_by.reader()
    }

    #[must_use]
    pub fn current_writer(&self) -> Option<ResponseId> {
        self.modified_by.get()
    }

    pub async fn baseline_text(&self) -> String {
        self.texts.lock().await.baseline.clone()
    }

    pub async fn working_text(&self) -> String {
        self.texts.lock().await.working.clone()
    }

    /// `diff(baseline, working)`, recomputed first if stale.
    pub async fn diff(&self) -> Result<Vec<DiffSpan>> {
        let mut texts = self.texts.lock().await;
        self.fresh_diff(&mut texts).await
    }

    pub async fn diff_summary(&self) -> Result<DiffSummary> {
        let mut texts = self.texts.lock().await;
        let spans = self.fresh_diff(&mut texts).await?;

        let mut summary = DiffSummary {
            regions: spans.len(),
            ..DiffSummary::default()
        };
        for span in &spans {
            summary.removed_lines += slice(&texts.baseline, span.original)?.lines().count();
            summary.added_lines += slice(&texts.working, span.modified)?.lines().count();
        }
        Ok(summary)
    }

    /// Applies one edit batch from `response` to the working copy.
    ///
    /// Nothing changes unless the edits apply cleanly and the oracle produces
    /// the new diff.
    pub async fn apply_batch(&self, response: &ResponseId, batch: &EditBatch) -> Result<()> {
        let mut texts = self.texts.lock().await;

        // Checked under the texts lock so completion cannot slip in between
        // this batch and the attribution it sets.
        let completed = self.completed.lock().contains(response);
        if completed {
            return Err(SessionError::ResponseCompleted(response.clone()));
        }
        if let Some(current) = self.modified_by.get() {
            if current != *response {
                return Err(SessionError::AttributionConflict {
                    uri: self.working_uri.clone(),
                    current,
                    incoming: response.clone(),
                });
            }
        }
        if texts.done_by.as_ref() == Some(response) {
            warn!(
                "[Entry] {} received a batch from {} after its final batch",
                self.working_uri, response
            );
        }
        if self.state.get().is_terminal() {
            warn!(
                "[Entry] {} is {:?}; applying late batch from {}",
                self.working_uri,
                self.state.get(),
                response
            );
        }

        let candidate = apply_edits(&texts.working, &batch.edits)?;
        let diff = {
            let _guard = self.tracker.begin_diff();
            self.oracle.compute_diff(&texts.baseline, &candidate).await?
        };

        texts.working = candidate;
        texts.diff = Some(diff);
        if batch.done {
            texts.done_by = Some(response.clone());
        }

        self.modified_by.set(Some(response.clone()));
        self.tracker.set_attributed(&self.working_uri, true);

        debug!(
            "[Entry] {} applied {} edit(s) from {} (done={})",
            self.working_uri,
            batch.edits.len(),
            response,
            batch.done
        );
        Ok(())
    }

    /// Applies an edit the host editor made to the working copy and mirrors
    /// it into the baseline where it touches baseline-equivalent text.
    pub async fn apply_user_edit(&self, edit: &TextEdit) -> Result<MirrorOutcome> {
        let mut texts = self.texts.lock().await;

        if self.modified_by.with(Option::is_some) {
            texts.working = apply_edits(&texts.working, std::slice::from_ref(edit))?;
            texts.diff = None;
            debug!(
                "[Mirror] {} is attributed, user edit {} not mirrored",
                self.working_uri, edit.range
            );
            return Ok(MirrorOutcome::Attributed);
        }

        let spans = self.fresh_diff(&mut texts).await?;
        let plan = mirror::plan(
            &spans,
            char_len(&texts.baseline),
            char_len(&texts.working),
            edit,
        )?;

        let working = apply_edits(&texts.working, std::slice::from_ref(edit))?;
        let baseline = if plan.baseline_edits.is_empty() {
            None
        } else {
            Some(apply_edits(&texts.baseline, &plan.baseline_edits)?)
        };

        texts.working = working;
        if let Some(baseline) = baseline {
            texts.baseline = baseline;
        }
        texts.diff = None;

        debug!(
            "[Mirror] {} user edit {} -> {:?}",
            self.working_uri, edit.range, plan.outcome
        );

        if let Err(e) = self.fresh_diff(&mut texts).await {
            warn!(
                "[Entry] Failed to recompute diff for {}: {}",
                self.working_uri, e
            );
        }
        Ok(plan.outcome)
    }

    /// Copies working into baseline and persists the working text.
    ///
    /// On failure both snapshots are untouched and the entry stays `Modified`.
    pub async fn accept(&self) -> Result<()> {
        let mut texts = self.texts.lock().await;
        if self.state.get().is_terminal() {
            debug!("[Entry] {} already settled", self.working_uri);
            return Ok(());
        }

        self.verify_settled(&texts.working).await?;
        self.store.write(&self.working_uri, &texts.working).await?;

        texts.baseline = texts.working.clone();
        texts.diff = Some(Vec::new());
        self.state.set(EntryState::Accepted);
        info!("[Entry] Accepted {}", self.working_uri);
        Ok(())
    }

    /// Restores baseline into working and persists it.
    ///
    /// User edits already mirrored into the baseline survive. On failure both
    /// snapshots are untouched and the entry stays `Modified`.
    pub async fn reject(&self) -> Result<()> {
        let mut texts = self.texts.lock().await;
        if self.state.get().is_terminal() {
            debug!("[Entry] {} already settled", self.working_uri);
            return Ok(());
        }

        self.verify_settled(&texts.baseline).await?;
        self.store.write(&self.working_uri, &texts.baseline).await?;

        texts.working = texts.baseline.clone();
        texts.diff = Some(Vec::new());
        self.state.set(EntryState::Rejected);
        info!("[Entry] Rejected {}", self.working_uri);
        Ok(())
    }

    /// Clears attribution if `response` holds it. A stale diff is then
    /// recomputed in the background; the session stays out of `Idle` until
    /// that finishes.
    pub(crate) async fn clear_attribution(self: &Arc<Self>, response: &ResponseId) -> bool {
        let texts = self.texts.lock().await;
        if self.modified_by.get().as_ref() != Some(response) {
            return false;
        }

        if texts.diff.is_none() {
            let guard = self.tracker.begin_diff();
            let entry = Arc::clone(self);
            tokio::spawn(async move {
                let _guard = guard;
                if let Err(e) = entry.diff().await {
                    warn!(
                        "[Entry] Background diff for {} failed: {}",
                        entry.working_uri, e
                    );
                }
            });
        }

        self.modified_by.set(None);
        self.tracker.set_attributed(&self.working_uri, false);
        debug!("[Entry] {} released by {}", self.working_uri, response);
        true
    }

    async fn fresh_diff(&self, texts: &mut Snapshots) -> Result<Vec<DiffSpan>> {
        if let Some(diff) = &texts.diff {
            return Ok(diff.clone());
        }
        let diff = {
            let _guard = self.tracker.begin_diff();
            self.oracle
                .compute_diff(&texts.baseline, &texts.working)
                .await?
        };
        texts.diff = Some(diff.clone());
        Ok(diff)
    }

    /// Checks with the oracle that the post-transition snapshots agree.
    async fn verify_settled(&self, text: &str) -> Result<()> {
        let _guard = self.tracker.begin_diff();
        let spans = self.oracle.compute_diff(text, text).await?;
        if !spans.is_empty() {
            return Err(TextError::Oracle(format!(
                "{} reported {} change(s) between identical texts",
                self.oracle.name(),
                spans.len()
            ))
            .into());
        }
        Ok(())
    }
}

impl std::fmt::Debug for FileEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileEntry")
            .field("working_uri", &self.working_uri)
            .field("baseline_uri", &self.baseline_uri)
            .field("state", &self.state.get())
            .field("modified_by", &self.modified_by.get())
            .finish()
    }
}

/// `file:///src/a.rs` becomes `tandem-baseline:/src/a.rs?scheme=file&session=<id>`.
fn baseline_uri_for(uri: &Url, scheme: &str, session: Uuid) -> Result<Url> {
    let mut baseline = Url::parse(&format!("{}:{}", scheme, uri.path()))
        .map_err(|e| SessionError::UnsupportedUri(format!("{} ({})", uri, e)))?;
    baseline
        .query_pairs_mut()
        .append_pair("scheme", uri.scheme())
        .append_pair("session", &session.to_string());
    Ok(baseline)
}
