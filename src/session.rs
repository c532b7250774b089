use crate::db::RecordStore;
use crate::proposal::{self, ReadyProposal};
use log::{debug, warn};
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Default)]
struct SessionState {
    waiting: Option<String>,
    last_proposal: Option<String>,
    // A completion that arrived before anyone registered interest.
    pending_saved: Option<String>,
}

/// Per-process generation tracking: which filename the client is waiting
/// on, which file's proposal completed most recently, and a single
/// pending-match slot for completions that land early. All three are
/// last-write-wins; at most one generation is truly in flight per session.
pub struct ProposalSession {
    state: Mutex<SessionState>,
    poll_interval: Duration,
}

impl ProposalSession {
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            state: Mutex::new(SessionState::default()),
            poll_interval,
        }
    }

    // ── Waiting slot ──

    pub fn set_waiting(&self, filename: &str) {
        self.state.lock().unwrap().waiting = Some(filename.to_string());
    }

    pub fn waiting(&self) -> Option<String> {
        self.state.lock().unwrap().waiting.clone()
    }

    pub fn clear_waiting(&self) {
        self.state.lock().unwrap().waiting = None;
    }

    fn clear_waiting_if(&self, filename: &str) {
        let mut state = self.state.lock().unwrap();
        if state.waiting.as_deref() == Some(filename) {
            state.waiting = None;
        }
    }

    // ── Last completed proposal ──

    pub fn set_last_proposal_file(&self, filename: &str) {
        self.state.lock().unwrap().last_proposal = Some(filename.to_string());
    }

    pub fn last_proposal_file(&self) -> Option<String> {
        self.state.lock().unwrap().last_proposal.clone()
    }

    // ── Pending match slot ──

    /// Remember a completion nobody was waiting on yet. Last write wins.
    pub fn note_saved(&self, filename: &str) {
        debug!("remembering early completion for {filename}");
        self.state.lock().unwrap().pending_saved = Some(filename.to_string());
    }

    /// Consume the pending slot if it matches `filename`.
    pub fn consume_pending(&self, filename: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.pending_saved.as_deref() == Some(filename) {
            state.pending_saved = None;
            true
        } else {
            false
        }
    }

    // ── Readiness ──

    /// Resolve the current generation request exactly once. Checks the
    /// pending slot and the store first (a completion may have landed
    /// before interest was registered), then waits on the bus with a
    /// fixed-interval poll of the store as the fallback path. Returns
    /// None immediately when nothing is being waited on, or later if the
    /// waiting slot is cleared or superseded without a match.
    pub async fn await_ready(&self, store: &RecordStore) -> Option<ReadyProposal> {
        let waited = self.waiting()?;
        if self.consume_pending(&waited) {
            debug!("completion for {waited} was already recorded");
        }
        if let Some(ready) = self.try_resolve(store, &waited) {
            return Some(ready);
        }

        let mut rx = store.proposal_events().subscribe();
        let mut tick = tokio::time::interval(self.poll_interval);
        tick.tick().await; // immediate first tick already covered above
        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Ok(name) if name == waited => {
                        if let Some(ready) = self.try_resolve(store, &waited) {
                            return Some(ready);
                        }
                    }
                    Ok(name) => self.note_saved(&name),
                    Err(RecvError::Lagged(n)) => {
                        warn!("proposal events lagged by {n}; polling covers the gap");
                    }
                    Err(RecvError::Closed) => {
                        warn!("proposal event channel closed; polling only");
                        return self.poll_until_ready(store, &waited).await;
                    }
                },
                _ = tick.tick() => {
                    if self.waiting().as_deref() != Some(waited.as_str()) {
                        debug!("stopped waiting on {waited}");
                        return None;
                    }
                    if let Some(ready) = self.try_resolve(store, &waited) {
                        return Some(ready);
                    }
                }
            }
        }
    }

    async fn poll_until_ready(&self, store: &RecordStore, waited: &str) -> Option<ReadyProposal> {
        let mut tick = tokio::time::interval(self.poll_interval);
        loop {
            tick.tick().await;
            if self.waiting().as_deref() != Some(waited) {
                return None;
            }
            if let Some(ready) = self.try_resolve(store, waited) {
                return Some(ready);
            }
        }
    }

    // Surfaces a stored proposal at most once: on success the waiting
    // slot is cleared, so no later notification or poll tick can
    // re-resolve the same request.
    fn try_resolve(&self, store: &RecordStore, filename: &str) -> Option<ReadyProposal> {
        let proposal_json = match store.get_proposal_for_file(filename) {
            Ok(Some(json)) if !json.trim().is_empty() => json,
            Ok(_) => return None,
            Err(e) => {
                warn!("record lookup failed for {filename}: {e}");
                return None;
            }
        };
        let parsed: Option<Value> = serde_json::from_str(&proposal_json).ok();
        let report_html = parsed.as_ref().and_then(proposal::extract_html);
        let feasibility = parsed
            .as_ref()
            .map(proposal::extract_feasibility)
            .unwrap_or_default();
        self.clear_waiting_if(filename);
        debug!("proposal ready for {filename}");
        Some(ReadyProposal {
            filename: filename.to_string(),
            proposal_json,
            report_html,
            feasibility,
        })
    }
}

impl Default for ProposalSession {
    fn default() -> Self {
        Self::new()
    }
}
