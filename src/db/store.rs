//! Collaborator contracts the coordinator depends on.
//!
//! The coordinator never owns subject content, ballots or holdings; it talks
//! to a `VotingStore`. `PgStore` backs it with PostgreSQL and `MemoryStore`
//! keeps everything in process.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::models::{Ballot, Shareholder, Subject, SubjectKind, VoterId};
use crate::error::StoreError;
use crate::proxy::ProxyOverlay;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait SubjectStore: Send + Sync {
    /// Looks a subject up by id across both kinds.
    async fn get_subject(&self, id: Uuid) -> StoreResult<Option<Subject>>;

    async fn list_subjects(&self, kind: SubjectKind) -> StoreResult<Vec<Subject>>;

    async fn upsert_subject(&self, subject: &Subject) -> StoreResult<()>;

    /// Returns `false` when nothing was deleted.
    async fn delete_subject(&self, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait BallotStore: Send + Sync {
    /// Fails with `StoreError::Duplicate` when the ballot violates a
    /// uniqueness constraint.
    async fn insert_ballot(&self, ballot: &Ballot) -> StoreResult<()>;

    async fn ballots_for_subject(&self, subject_id: Uuid) -> StoreResult<Vec<Ballot>>;

    async fn has_ballot(&self, voter_id: VoterId, subject_id: Uuid) -> StoreResult<bool>;

    async fn has_ballot_in_round(
        &self,
        voter_id: VoterId,
        subject_id: Uuid,
        round: i64,
    ) -> StoreResult<bool>;

    /// Number of election ballots the voter has cast across the event.
    async fn count_election_ballots(&self, voter_id: VoterId) -> StoreResult<i64>;

    /// Highest round recorded on any ballot, 0 when there are none.
    async fn latest_round(&self) -> StoreResult<i64>;
}

#[async_trait]
pub trait ShareholderStore: Send + Sync {
    async fn find_by_identifier(&self, identifier: &str) -> StoreResult<Option<Shareholder>>;

    /// Holdings per voter. Unknown voters are absent from the map.
    async fn holdings_for(&self, voter_ids: &[VoterId]) -> StoreResult<HashMap<VoterId, i64>>;
}

#[async_trait]
pub trait ProxySettingsStore: Send + Sync {
    async fn load_proxy_overlay(&self) -> StoreResult<Option<ProxyOverlay>>;

    async fn save_proxy_overlay(&self, overlay: &ProxyOverlay) -> StoreResult<()>;
}

pub trait VotingStore: SubjectStore + BallotStore + ShareholderStore + ProxySettingsStore {}

impl<T> VotingStore for T where
    T: SubjectStore + BallotStore + ShareholderStore + ProxySettingsStore
{
}
