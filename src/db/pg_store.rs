//! PostgreSQL-backed `VotingStore`.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::connection::DbPool;
use crate::db::models::{Ballot, Shareholder, Subject, SubjectKind, VoterId};
use crate::db::repositories as repo;
use crate::db::store::{
    BallotStore, ProxySettingsStore, ShareholderStore, StoreResult, SubjectStore,
};
use crate::error::StoreError;
use crate::proxy::ProxyOverlay;

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        PgStore { pool }
    }
}

#[async_trait]
impl SubjectStore for PgStore {
    async fn get_subject(&self, id: Uuid) -> StoreResult<Option<Subject>> {
        if let Some(resolution) = repo::get_resolution(&self.pool, id).await? {
            return Ok(Some(Subject::Resolution(resolution)));
        }
        Ok(repo::get_candidate(&self.pool, id)
            .await?
            .map(Subject::Candidate))
    }

    async fn list_subjects(&self, kind: SubjectKind) -> StoreResult<Vec<Subject>> {
        let subjects = match kind {
            SubjectKind::Resolution => repo::get_all_resolutions(&self.pool)
                .await?
                .into_iter()
                .map(Subject::Resolution)
                .collect(),
            SubjectKind::Candidate => repo::get_all_candidates(&self.pool)
                .await?
                .into_iter()
                .map(Subject::Candidate)
                .collect(),
        };
        Ok(subjects)
    }

    async fn upsert_subject(&self, subject: &Subject) -> StoreResult<()> {
        // Ids are unique across both tables.
        if let Some(existing) = self.get_subject(subject.id()).await? {
            if existing.kind() != subject.kind() {
                return Err(StoreError::Duplicate);
            }
        }
        match subject {
            Subject::Resolution(resolution) => {
                repo::upsert_resolution(&self.pool, resolution).await?
            }
            Subject::Candidate(candidate) => repo::upsert_candidate(&self.pool, candidate).await?,
        }
        Ok(())
    }

    async fn delete_subject(&self, id: Uuid) -> StoreResult<bool> {
        if repo::delete_resolution(&self.pool, id).await? {
            return Ok(true);
        }
        Ok(repo::delete_candidate(&self.pool, id).await?)
    }
}

#[async_trait]
impl BallotStore for PgStore {
    async fn insert_ballot(&self, ballot: &Ballot) -> StoreResult<()> {
        Ok(repo::insert_ballot(&self.pool, ballot).await?)
    }

    async fn ballots_for_subject(&self, subject_id: Uuid) -> StoreResult<Vec<Ballot>> {
        Ok(repo::get_ballots_for_subject(&self.pool, subject_id).await?)
    }

    async fn has_ballot(&self, voter_id: VoterId, subject_id: Uuid) -> StoreResult<bool> {
        Ok(repo::voter_has_ballot(&self.pool, voter_id, subject_id).await?)
    }

    async fn has_ballot_in_round(
        &self,
        voter_id: VoterId,
        subject_id: Uuid,
        round: i64,
    ) -> StoreResult<bool> {
        Ok(repo::voter_has_ballot_in_round(&self.pool, voter_id, subject_id, round).await?)
    }

    async fn count_election_ballots(&self, voter_id: VoterId) -> StoreResult<i64> {
        Ok(repo::count_election_ballots(&self.pool, voter_id).await?)
    }

    async fn latest_round(&self) -> StoreResult<i64> {
        Ok(repo::get_latest_round(&self.pool).await?)
    }
}

#[async_trait]
impl ShareholderStore for PgStore {
    async fn find_by_identifier(&self, identifier: &str) -> StoreResult<Option<Shareholder>> {
        Ok(repo::get_shareholder_by_identifier(&self.pool, identifier).await?)
    }

    async fn holdings_for(&self, voter_ids: &[VoterId]) -> StoreResult<HashMap<VoterId, i64>> {
        Ok(repo::get_holdings(&self.pool, voter_ids)
            .await?
            .into_iter()
            .collect())
    }
}

#[async_trait]
impl ProxySettingsStore for PgStore {
    async fn load_proxy_overlay(&self) -> StoreResult<Option<ProxyOverlay>> {
        Ok(repo::get_proxy_settings(&self.pool).await?)
    }

    async fn save_proxy_overlay(&self, overlay: &ProxyOverlay) -> StoreResult<()> {
        Ok(repo::save_proxy_settings(&self.pool, overlay).await?)
    }
}
