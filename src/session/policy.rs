use uuid::Uuid;

use crate::db::models::{SubjectKind, VoterId};
use crate::db::store::{BallotStore, VotingStore};
use crate::error::VotingError;

pub const DEFAULT_ELECTION_BUDGET: i64 = 3;

/// Uniqueness rule applied before a ballot is stored.
///
/// Resolutions allow one ballot per voter per resolution, ever. Elections
/// give each voter a fixed number of ballots for the whole event, with at
/// most one per candidate per activation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BallotPolicy {
    OncePerSubject,
    Budgeted { budget: i64 },
}

impl BallotPolicy {
    pub fn for_kind(kind: SubjectKind, election_budget: i64) -> Self {
        match kind {
            SubjectKind::Resolution => BallotPolicy::OncePerSubject,
            SubjectKind::Candidate => BallotPolicy::Budgeted {
                budget: election_budget,
            },
        }
    }

    pub async fn admit(
        &self,
        store: &dyn VotingStore,
        voter_id: VoterId,
        subject_id: Uuid,
        round: i64,
    ) -> Result<(), VotingError> {
        match *self {
            BallotPolicy::OncePerSubject => {
                if store.has_ballot(voter_id, subject_id).await? {
                    return Err(VotingError::AlreadyVoted);
                }
            }
            BallotPolicy::Budgeted { budget } => {
                if store.has_ballot_in_round(voter_id, subject_id, round).await? {
                    return Err(VotingError::AlreadyVoted);
                }
                if store.count_election_ballots(voter_id).await? >= budget {
                    return Err(VotingError::VoteBudgetExhausted);
                }
            }
        }
        Ok(())
    }
}
