use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::models::{Ballot, Shareholder, Subject, SubjectKind, VoterId};
use crate::db::store::{
    BallotStore, ProxySettingsStore, ShareholderStore, StoreResult, SubjectStore,
};
use crate::error::StoreError;
use crate::proxy::ProxyOverlay;

#[derive(Default)]
struct Tables {
    subjects: Vec<Subject>,
    ballots: Vec<Ballot>,
    shareholders: Vec<Shareholder>,
    proxy: Option<ProxyOverlay>,
}

/// In-process store with the same uniqueness rules as the PostgreSQL schema.
/// Used when no `DATABASE_URL` is configured and throughout the tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shareholders(shareholders: Vec<Shareholder>) -> Self {
        MemoryStore {
            tables: RwLock::new(Tables {
                shareholders,
                ..Tables::default()
            }),
            unavailable: AtomicBool::new(false),
        }
    }

    #[cfg(test)]
    pub async fn add_shareholder(&self, shareholder: Shareholder) {
        self.tables.write().await.shareholders.push(shareholder);
    }

    /// Makes every call fail as if the backing database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SubjectStore for MemoryStore {
    async fn get_subject(&self, id: Uuid) -> StoreResult<Option<Subject>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables.subjects.iter().find(|s| s.id() == id).cloned())
    }

    async fn list_subjects(&self, kind: SubjectKind) -> StoreResult<Vec<Subject>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .subjects
            .iter()
            .filter(|s| s.kind() == kind)
            .cloned()
            .collect())
    }

    async fn upsert_subject(&self, subject: &Subject) -> StoreResult<()> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        match tables.subjects.iter_mut().find(|s| s.id() == subject.id()) {
            Some(existing) if existing.kind() != subject.kind() => {
                return Err(StoreError::Duplicate);
            }
            Some(existing) => *existing = subject.clone(),
            None => tables.subjects.push(subject.clone()),
        }
        Ok(())
    }

    async fn delete_subject(&self, id: Uuid) -> StoreResult<bool> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let before = tables.subjects.len();
        tables.subjects.retain(|s| s.id() != id);
        Ok(tables.subjects.len() != before)
    }
}

#[async_trait]
impl BallotStore for MemoryStore {
    async fn insert_ballot(&self, ballot: &Ballot) -> StoreResult<()> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let clash = tables.ballots.iter().any(|b| {
            b.voter_id == ballot.voter_id
                && b.subject_id == ballot.subject_id
                && (ballot.kind == SubjectKind::Resolution || b.round == ballot.round)
        });
        if clash {
            return Err(StoreError::Duplicate);
        }
        tables.ballots.push(ballot.clone());
        Ok(())
    }

    async fn ballots_for_subject(&self, subject_id: Uuid) -> StoreResult<Vec<Ballot>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .ballots
            .iter()
            .filter(|b| b.subject_id == subject_id)
            .cloned()
            .collect())
    }

    async fn has_ballot(&self, voter_id: VoterId, subject_id: Uuid) -> StoreResult<bool> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .ballots
            .iter()
            .any(|b| b.voter_id == voter_id && b.subject_id == subject_id))
    }

    async fn has_ballot_in_round(
        &self,
        voter_id: VoterId,
        subject_id: Uuid,
        round: i64,
    ) -> StoreResult<bool> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .ballots
            .iter()
            .any(|b| b.voter_id == voter_id && b.subject_id == subject_id && b.round == round))
    }

    async fn count_election_ballots(&self, voter_id: VoterId) -> StoreResult<i64> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .ballots
            .iter()
            .filter(|b| b.voter_id == voter_id && b.kind == SubjectKind::Candidate)
            .count() as i64)
    }

    async fn latest_round(&self) -> StoreResult<i64> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables.ballots.iter().map(|b| b.round).max().unwrap_or(0))
    }
}

#[async_trait]
impl ShareholderStore for MemoryStore {
    async fn find_by_identifier(&self, identifier: &str) -> StoreResult<Option<Shareholder>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .shareholders
            .iter()
            .find(|s| s.identifier.eq_ignore_ascii_case(identifier))
            .cloned())
    }

    async fn holdings_for(&self, voter_ids: &[VoterId]) -> StoreResult<HashMap<VoterId, i64>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .shareholders
            .iter()
            .filter(|s| voter_ids.contains(&s.id))
            .map(|s| (s.id, s.holdings))
            .collect())
    }
}

#[async_trait]
impl ProxySettingsStore for MemoryStore {
    async fn load_proxy_overlay(&self) -> StoreResult<Option<ProxyOverlay>> {
        self.check_available()?;
        Ok(self.tables.read().await.proxy)
    }

    async fn save_proxy_overlay(&self, overlay: &ProxyOverlay) -> StoreResult<()> {
        self.check_available()?;
        self.tables.write().await.proxy = Some(*overlay);
        Ok(())
    }
}
