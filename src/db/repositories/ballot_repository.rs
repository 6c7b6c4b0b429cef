use crate::db::connection::DbPool;
use crate::db::models::{Ballot, Decision, SubjectKind};
use chrono::{DateTime, Utc};
use sqlx::Error;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct BallotRow {
    id: Uuid,
    voter_id: Uuid,
    subject_id: Uuid,
    kind: String,
    decision: String,
    round: i64,
    cast_at: DateTime<Utc>,
}

impl TryFrom<BallotRow> for Ballot {
    type Error = Error;

    fn try_from(row: BallotRow) -> Result<Self, Self::Error> {
        let kind = SubjectKind::parse(&row.kind)
            .ok_or_else(|| Error::Protocol(format!("unknown ballot kind {:?}", row.kind)))?;
        let decision = Decision::parse(&row.decision)
            .ok_or_else(|| Error::Protocol(format!("unknown decision {:?}", row.decision)))?;

        Ok(Ballot {
            id: row.id,
            voter_id: row.voter_id,
            subject_id: row.subject_id,
            kind,
            decision,
            round: row.round,
            cast_at: row.cast_at,
        })
    }
}

/// Relies on the partial unique indexes to reject duplicates, so concurrent
/// inserts of the same ballot cannot both succeed.
pub async fn insert_ballot(pool: &DbPool, ballot: &Ballot) -> Result<(), Error> {
    sqlx::query(
        r#"
        INSERT INTO ballots (id, voter_id, subject_id, kind, decision, round, cast_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(ballot.id)
    .bind(ballot.voter_id)
    .bind(ballot.subject_id)
    .bind(ballot.kind.as_str())
    .bind(ballot.decision.as_str())
    .bind(ballot.round)
    .bind(ballot.cast_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_ballots_for_subject(
    pool: &DbPool,
    subject_id: Uuid,
) -> Result<Vec<Ballot>, Error> {
    let rows = sqlx::query_as::<_, BallotRow>(
        r#"
        SELECT id, voter_id, subject_id, kind, decision, round, cast_at
        FROM ballots WHERE subject_id = $1 ORDER BY cast_at ASC
        "#,
    )
    .bind(subject_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Ballot::try_from).collect()
}

pub async fn voter_has_ballot(
    pool: &DbPool,
    voter_id: Uuid,
    subject_id: Uuid,
) -> Result<bool, Error> {
    let row = sqlx::query("SELECT id FROM ballots WHERE voter_id = $1 AND subject_id = $2 LIMIT 1")
        .bind(voter_id)
        .bind(subject_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.is_some())
}

pub async fn voter_has_ballot_in_round(
    pool: &DbPool,
    voter_id: Uuid,
    subject_id: Uuid,
    round: i64,
) -> Result<bool, Error> {
    let row = sqlx::query(
        "SELECT id FROM ballots WHERE voter_id = $1 AND subject_id = $2 AND round = $3 LIMIT 1",
    )
    .bind(voter_id)
    .bind(subject_id)
    .bind(round)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

pub async fn count_election_ballots(pool: &DbPool, voter_id: Uuid) -> Result<i64, Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM ballots WHERE voter_id = $1 AND kind = 'audit'",
    )
    .bind(voter_id)
    .fetch_one(pool)
    .await
}

pub async fn get_latest_round(pool: &DbPool) -> Result<i64, Error> {
    sqlx::query_scalar::<_, i64>("SELECT COALESCE(MAX(round), 0) FROM ballots")
        .fetch_one(pool)
        .await
}
