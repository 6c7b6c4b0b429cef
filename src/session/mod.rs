//! Voting session coordinator.
//!
//! Owns the single active subject and the voting window. Every state change
//! goes through one async mutex; each committed change is published as an
//! immutable [`SessionSnapshot`] on a watch channel so that readers never wait
//! on the mutation path.
//!
//! ```text
//! Idle ──activate──► Active/closed ◄──open/close──► Active/open
//!   ▲                    │                               │
//!   └───close_current────┴───────────────────────────────┘
//!
//! any ──end_event──► Ended (terminal)
//! ```

pub mod policy;
pub mod state;
pub mod timer;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::models::{Ballot, Decision, Subject, SubjectKind, VoterId};
use crate::db::store::{
    BallotStore, ProxySettingsStore, ShareholderStore, SubjectStore, VotingStore,
};
use crate::error::{StoreError, VotingError};
use crate::proxy::{ProxyOverlay, ProxyOverlayStore};
use crate::sse::{AuditVoteUpdate, BroadcastHub, HubEvent};
use crate::tally::{Tally, compute_tally};

pub use policy::{BallotPolicy, DEFAULT_ELECTION_BUDGET};
pub use state::{Phase, SessionSnapshot, SessionState, VotingWindow};
pub use timer::{DEFAULT_WINDOW_SECS, WindowTimer};

pub const AGM_FINISHED_MESSAGE: &str =
    "The AGM has now ended. Thank you for taking part in today's vote.";

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub window_secs: u32,
    pub election_budget: i64,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        CoordinatorSettings {
            window_secs: DEFAULT_WINDOW_SECS,
            election_budget: DEFAULT_ELECTION_BUDGET,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteReceipt {
    pub ballot_id: Uuid,
    pub subject_id: Uuid,
    pub decision: Decision,
    /// Only present for election ballots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_audit_votes: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectResult {
    pub subject: Subject,
    pub is_active: bool,
    pub tally: Tally,
}

pub struct Coordinator {
    store: Arc<dyn VotingStore>,
    hub: BroadcastHub,
    proxy: ProxyOverlayStore,
    settings: CoordinatorSettings,
    state: Mutex<SessionState>,
    snapshots: Arc<watch::Sender<SessionSnapshot>>,
}

impl Coordinator {
    /// Builds a coordinator, resuming the round counter and proxy overlay
    /// from the store.
    pub async fn new(
        store: Arc<dyn VotingStore>,
        hub: BroadcastHub,
        settings: CoordinatorSettings,
    ) -> Result<Self, VotingError> {
        let round = store.latest_round().await?;
        let overlay = store.load_proxy_overlay().await?.unwrap_or_default();

        let state = SessionState::new(round, WindowTimer::new(settings.window_secs));
        let (snapshots, _) = watch::channel(state.snapshot(0));

        info!(
            round,
            proxy_votes = overlay.proxy_votes,
            proxy_holdings = overlay.proxy_holdings,
            "coordinator ready"
        );

        Ok(Coordinator {
            store,
            hub,
            proxy: ProxyOverlayStore::new(overlay),
            settings,
            state: Mutex::new(state),
            snapshots: Arc::new(snapshots),
        })
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    pub fn store(&self) -> &dyn VotingStore {
        self.store.as_ref()
    }

    // ------------------------------------------------------------------
    // Snapshot queries. None of these take the mutation lock.
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn voting_state(&self) -> VotingWindow {
        self.snapshots.borrow().window.clone()
    }

    pub fn active_subject(&self) -> Result<Subject, VotingError> {
        self.snapshots
            .borrow()
            .active_subject
            .clone()
            .ok_or_else(|| VotingError::NotFound("no active subject".into()))
    }

    pub fn proxy_overlay(&self) -> ProxyOverlay {
        self.proxy.current()
    }

    pub async fn get_tally(&self, subject_id: Uuid) -> Result<Tally, VotingError> {
        let subject = self.resolve_subject(subject_id).await?;
        self.tally_for(&subject).await
    }

    /// Tallies for every subject of `kind`, in store order.
    pub async fn results(&self, kind: SubjectKind) -> Result<Vec<SubjectResult>, VotingError> {
        let active_id = self.snapshot().active_subject.map(|s| s.id());
        let subjects = self.store.list_subjects(kind).await?;

        let mut results = Vec::with_capacity(subjects.len());
        for subject in subjects {
            let tally = self.tally_for(&subject).await?;
            results.push(SubjectResult {
                is_active: active_id == Some(subject.id()),
                subject,
                tally,
            });
        }
        Ok(results)
    }

    /// For the active candidate this answers "voted in the current round";
    /// everywhere else it answers "ever voted on this subject".
    pub async fn has_voted(
        &self,
        voter_id: VoterId,
        subject_id: Uuid,
    ) -> Result<bool, VotingError> {
        let snapshot = self.snapshot();
        let voted = match snapshot.active_subject {
            Some(active)
                if active.id() == subject_id && active.kind() == SubjectKind::Candidate =>
            {
                self.store
                    .has_ballot_in_round(voter_id, subject_id, snapshot.round)
                    .await?
            }
            _ => self.store.has_ballot(voter_id, subject_id).await?,
        };
        Ok(voted)
    }

    pub async fn audit_votes_cast(&self, voter_id: VoterId) -> Result<i64, VotingError> {
        Ok(self.store.count_election_ballots(voter_id).await?)
    }

    pub async fn remaining_audit_votes(&self, voter_id: VoterId) -> Result<i64, VotingError> {
        let cast = self.audit_votes_cast(voter_id).await?;
        Ok((self.settings.election_budget - cast).max(0))
    }

    pub async fn list_subjects(&self, kind: SubjectKind) -> Result<Vec<Subject>, VotingError> {
        Ok(self.store.list_subjects(kind).await?)
    }

    // ------------------------------------------------------------------
    // Administrator commands.
    // ------------------------------------------------------------------

    pub async fn activate_subject(
        &self,
        id: Uuid,
        kind: SubjectKind,
    ) -> Result<SessionSnapshot, VotingError> {
        let mut state = self.state.lock().await;

        match &state.phase {
            Phase::Ended => {
                warn!(subject_id = %id, "activation rejected after AGM ended");
                return Err(VotingError::Conflict(
                    "the AGM has ended; the coordinator must be restarted".into(),
                ));
            }
            Phase::Active {
                subject,
                window_open: true,
            } => {
                warn!(
                    subject_id = %id,
                    active_id = %subject.id(),
                    "activation rejected while voting is open"
                );
                return Err(VotingError::Conflict(
                    "close voting before switching subjects".into(),
                ));
            }
            _ => {}
        }

        let subject = self
            .store
            .get_subject(id)
            .await?
            .filter(|s| s.kind() == kind)
            .ok_or_else(|| VotingError::NotFound(format!("{} {id}", kind.as_str())))?;

        let previous = state.active_subject().cloned();
        state.timer.cancel();
        state.round += 1;
        state.phase = Phase::Active {
            subject: subject.clone(),
            window_open: false,
        };
        let snapshot = self.commit(&state, 0);

        info!(subject_id = %id, kind = kind.as_str(), round = state.round, "subject activated");

        if let Some(previous) = previous.filter(|p| p.kind() != kind) {
            self.hub.publish(cleared_event(&previous));
        }
        self.hub.publish(match subject {
            Subject::Resolution(resolution) => HubEvent::ResolutionActivated(resolution),
            Subject::Candidate(candidate) => HubEvent::AuditMemberActivated(candidate),
        });
        self.hub.publish(HubEvent::VotingState(snapshot.window.clone()));

        Ok(snapshot)
    }

    pub async fn open_window(&self) -> Result<SessionSnapshot, VotingError> {
        let mut state = self.state.lock().await;
        self.set_window(&mut state, true)
    }

    pub async fn close_window(&self) -> Result<SessionSnapshot, VotingError> {
        let mut state = self.state.lock().await;
        self.set_window(&mut state, false)
    }

    pub async fn toggle_window(&self) -> Result<SessionSnapshot, VotingError> {
        let mut state = self.state.lock().await;
        let open = !state.window_open();
        self.set_window(&mut state, open)
    }

    pub async fn close_current(&self) -> Result<SessionSnapshot, VotingError> {
        let mut state = self.state.lock().await;

        let Some(subject) = state.active_subject().cloned() else {
            debug!("close requested with no active subject");
            return Ok(self.snapshot());
        };

        state.timer.cancel();
        state.phase = Phase::Idle;
        let snapshot = self.commit(&state, 0);

        info!(subject_id = %subject.id(), "active subject closed");

        self.hub.publish(cleared_event(&subject));
        self.hub.publish(HubEvent::VotingState(snapshot.window.clone()));

        Ok(snapshot)
    }

    pub async fn end_event(&self) -> Result<SessionSnapshot, VotingError> {
        let mut state = self.state.lock().await;

        if state.phase == Phase::Ended {
            return Ok(self.snapshot());
        }

        let previous = state.active_subject().cloned();
        state.timer.cancel();
        state.phase = Phase::Ended;
        let snapshot = self.commit(&state, 0);

        info!(subscribers = self.hub.subscriber_count(), "AGM ended");

        if let Some(previous) = previous {
            self.hub.publish(cleared_event(&previous));
        }
        self.hub.publish(HubEvent::AgmFinished {
            message: AGM_FINISHED_MESSAGE.to_string(),
        });
        self.hub.publish(HubEvent::VotingState(snapshot.window.clone()));

        Ok(snapshot)
    }

    pub async fn set_proxy_overlay(
        &self,
        overlay: ProxyOverlay,
    ) -> Result<ProxyOverlay, VotingError> {
        let overlay = ProxyOverlay::new(overlay.proxy_votes, overlay.proxy_holdings)?;
        let state = self.state.lock().await;

        self.store.save_proxy_overlay(&overlay).await?;
        let previous = self.proxy.set(overlay);

        info!(
            proxy_votes = overlay.proxy_votes,
            proxy_holdings = overlay.proxy_holdings,
            previous_votes = previous.proxy_votes,
            "proxy overlay updated"
        );

        self.hub.publish(HubEvent::ProxyUpdated(overlay));
        if let Some(subject) = state
            .active_subject()
            .filter(|s| s.kind() == SubjectKind::Resolution)
        {
            self.refresh_tally(subject).await;
        }

        Ok(overlay)
    }

    /// Creates or edits a subject. The active subject cannot be edited.
    pub async fn upsert_subject(&self, subject: Subject) -> Result<Subject, VotingError> {
        let state = self.state.lock().await;
        if state.active_subject().is_some_and(|a| a.id() == subject.id()) {
            return Err(VotingError::Conflict(
                "the active subject cannot be edited".into(),
            ));
        }
        self.store.upsert_subject(&subject).await?;
        debug!(subject_id = %subject.id(), kind = subject.kind().as_str(), "subject saved");
        Ok(subject)
    }

    pub async fn delete_subject(&self, id: Uuid) -> Result<(), VotingError> {
        let state = self.state.lock().await;
        if state.active_subject().is_some_and(|a| a.id() == id) {
            return Err(VotingError::Conflict(
                "the active subject cannot be deleted".into(),
            ));
        }
        if !self.store.delete_subject(id).await? {
            return Err(VotingError::NotFound(format!("subject {id}")));
        }
        info!(subject_id = %id, "subject deleted");
        Ok(())
    }

    /// Stops the countdown. Called on process shutdown.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if state.timer.is_running() {
            debug!("stopping countdown");
        }
        state.timer.cancel();
    }

    // ------------------------------------------------------------------
    // Voter commands.
    // ------------------------------------------------------------------

    /// Records a ballot for the active subject. Election ballots are always
    /// counted in favour of the active candidate.
    pub async fn record_vote(
        &self,
        voter_id: VoterId,
        subject_id: Uuid,
        decision: Decision,
    ) -> Result<VoteReceipt, VotingError> {
        let state = self.state.lock().await;

        let subject = match &state.phase {
            Phase::Active {
                subject,
                window_open: true,
            } if subject.id() == subject_id => subject.clone(),
            _ => {
                debug!(%voter_id, %subject_id, "ballot outside an open window");
                return Err(VotingError::WindowClosed);
            }
        };

        let kind = subject.kind();
        let decision = match kind {
            SubjectKind::Resolution => decision,
            SubjectKind::Candidate => Decision::For,
        };

        BallotPolicy::for_kind(kind, self.settings.election_budget)
            .admit(self.store.as_ref(), voter_id, subject_id, state.round)
            .await
            .inspect_err(|e| warn!(%voter_id, %subject_id, error = %e, "ballot rejected"))?;

        let ballot = Ballot::new(voter_id, &subject, decision, state.round);
        self.store
            .insert_ballot(&ballot)
            .await
            .map_err(|e| match e {
                StoreError::Duplicate => VotingError::AlreadyVoted,
                other => other.into(),
            })?;

        info!(
            %voter_id,
            %subject_id,
            round = state.round,
            decision = decision.as_str(),
            "ballot recorded"
        );

        let remaining_audit_votes = match kind {
            SubjectKind::Candidate => self.remaining_audit_votes(voter_id).await.ok(),
            SubjectKind::Resolution => None,
        };

        self.refresh_tally(&subject).await;

        Ok(VoteReceipt {
            ballot_id: ballot.id,
            subject_id,
            decision,
            remaining_audit_votes,
        })
    }

    // ------------------------------------------------------------------

    fn set_window(
        &self,
        state: &mut SessionState,
        open: bool,
    ) -> Result<SessionSnapshot, VotingError> {
        let Phase::Active {
            subject,
            window_open,
        } = &mut state.phase
        else {
            warn!(open, "window change requested with no active subject");
            return Err(VotingError::Conflict("no subject is active".into()));
        };

        // Re-opening an open window restarts the countdown.
        if !open && !*window_open {
            return Ok(self.snapshot());
        }
        *window_open = open;
        let subject_id = subject.id();

        state.timer.cancel();
        let snapshot = if open {
            let duration = state.timer.duration_secs();
            let snapshot = self.commit(state, duration);
            state
                .timer
                .start(Arc::clone(&self.snapshots), self.hub.clone());
            snapshot
        } else {
            self.commit(state, 0)
        };

        info!(%subject_id, open, "voting window changed");
        self.hub.publish(HubEvent::VotingState(snapshot.window.clone()));

        Ok(snapshot)
    }

    fn commit(&self, state: &SessionState, remaining_seconds: u32) -> SessionSnapshot {
        let snapshot = state.snapshot(remaining_seconds);
        self.snapshots.send_replace(snapshot.clone());
        snapshot
    }

    async fn resolve_subject(&self, subject_id: Uuid) -> Result<Subject, VotingError> {
        if let Some(active) = self
            .snapshot()
            .active_subject
            .filter(|s| s.id() == subject_id)
        {
            return Ok(active);
        }
        self.store
            .get_subject(subject_id)
            .await?
            .ok_or_else(|| VotingError::NotFound(format!("subject {subject_id}")))
    }

    async fn tally_for(&self, subject: &Subject) -> Result<Tally, VotingError> {
        let ballots = self.store.ballots_for_subject(subject.id()).await?;
        let voters: Vec<VoterId> = ballots.iter().map(|b| b.voter_id).collect();
        let holdings = self.store.holdings_for(&voters).await?;
        let overlay = match subject.kind() {
            SubjectKind::Resolution => self.proxy.current(),
            SubjectKind::Candidate => ProxyOverlay::disabled(),
        };

        Ok(compute_tally(subject.id(), &ballots, &overlay, |voter| {
            holdings.get(voter).copied().unwrap_or(0)
        }))
    }

    async fn refresh_tally(&self, subject: &Subject) {
        match self.tally_for(subject).await {
            Ok(tally) => {
                self.hub.publish(match subject {
                    Subject::Resolution(_) => HubEvent::VoteUpdated(tally),
                    Subject::Candidate(candidate) => HubEvent::AuditVoteUpdated(AuditVoteUpdate {
                        committee_id: candidate.id,
                        votes_for: tally.for_count,
                    }),
                });
            }
            Err(e) => {
                warn!(subject_id = %subject.id(), error = %e, "tally refresh failed");
            }
        }
    }
}

fn cleared_event(subject: &Subject) -> HubEvent {
    match subject {
        Subject::Resolution(_) => HubEvent::ResolutionUpdate(None),
        Subject::Candidate(_) => HubEvent::AuditMemberUpdated(None),
    }
}
