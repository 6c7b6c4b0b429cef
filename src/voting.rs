use crate::auth::voter_from_session;
use crate::db::models::{Decision, Subject, SubjectKind};
use crate::error::VotingError;
use crate::startup::AppState;
use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Deserializer, Serialize};
use tower_sessions::Session;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    pub resolution_id: Uuid,
    #[serde(alias = "decision", deserialize_with = "ballot_decision")]
    pub vote: Decision,
}

/// Accepts `"for"`/`"against"` as well as the voting page's `true`/`false`.
fn ballot_decision<'de, D>(deserializer: D) -> Result<Decision, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Approve(bool),
        Named(Decision),
    }

    Ok(match Wire::deserialize(deserializer)? {
        Wire::Approve(true) => Decision::For,
        Wire::Approve(false) => Decision::Against,
        Wire::Named(decision) => decision,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastAuditVoteRequest {
    pub committee_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckVoteQuery {
    pub subject_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckAuditVoteQuery {
    pub committee_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckVoteResponse {
    pub subject_id: Uuid,
    pub has_voted: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckAuditVoteResponse {
    pub committee_id: Option<Uuid>,
    pub has_voted: bool,
    pub total_votes: i64,
    pub remaining_votes: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResult {
    pub id: Uuid,
    pub name: String,
    pub bio: Option<String>,
    pub votes: i64,
    pub is_active: bool,
}

pub async fn voting_state(Extension(app_state): Extension<AppState>) -> impl IntoResponse {
    Json(app_state.coordinator.voting_state())
}

pub async fn active_subject(
    Extension(app_state): Extension<AppState>,
) -> Result<impl IntoResponse, VotingError> {
    Ok(Json(app_state.coordinator.active_subject()?))
}

/// The active subject when it is a resolution, for clients that poll by kind.
pub async fn active_resolution(
    Extension(app_state): Extension<AppState>,
) -> Result<impl IntoResponse, VotingError> {
    active_of_kind(&app_state, SubjectKind::Resolution)
}

pub async fn active_candidate(
    Extension(app_state): Extension<AppState>,
) -> Result<impl IntoResponse, VotingError> {
    active_of_kind(&app_state, SubjectKind::Candidate)
}

fn active_of_kind(app_state: &AppState, kind: SubjectKind) -> Result<Json<Subject>, VotingError> {
    app_state
        .coordinator
        .active_subject()
        .ok()
        .filter(|subject| subject.kind() == kind)
        .map(Json)
        .ok_or_else(|| VotingError::NotFound(format!("no active {}", kind.as_str())))
}

pub async fn subject_tally(
    Extension(app_state): Extension<AppState>,
    Path(subject_id): Path<Uuid>,
) -> Result<impl IntoResponse, VotingError> {
    Ok(Json(app_state.coordinator.get_tally(subject_id).await?))
}

/// Tallies for every resolution, for the results display.
pub async fn resolution_results(
    Extension(app_state): Extension<AppState>,
) -> Result<impl IntoResponse, VotingError> {
    let results = app_state
        .coordinator
        .results(SubjectKind::Resolution)
        .await?;
    Ok(Json(results))
}

pub async fn audit_results(
    Extension(app_state): Extension<AppState>,
) -> Result<impl IntoResponse, VotingError> {
    let results = app_state
        .coordinator
        .results(SubjectKind::Candidate)
        .await?
        .into_iter()
        .filter_map(|result| match result.subject {
            Subject::Candidate(candidate) => Some(AuditResult {
                id: candidate.id,
                name: candidate.name,
                bio: candidate.bio,
                votes: result.tally.for_count,
                is_active: result.is_active,
            }),
            Subject::Resolution(_) => None,
        })
        .collect::<Vec<_>>();

    Ok(Json(results))
}

/// Whether the logged-in voter has voted on `subjectId`, defaulting to the
/// active subject.
pub async fn check_vote(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Query(query): Query<CheckVoteQuery>,
) -> Result<impl IntoResponse, VotingError> {
    let voter_id = voter_from_session(&session).await?;
    let subject_id = match query.subject_id {
        Some(id) => id,
        None => app_state.coordinator.active_subject()?.id(),
    };

    let has_voted = app_state.coordinator.has_voted(voter_id, subject_id).await?;

    Ok(Json(CheckVoteResponse {
        subject_id,
        has_voted,
    }))
}

pub async fn check_audit_vote(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Query(query): Query<CheckAuditVoteQuery>,
) -> Result<impl IntoResponse, VotingError> {
    let voter_id = voter_from_session(&session).await?;
    let coordinator = &app_state.coordinator;

    let committee_id = query.committee_id.or_else(|| {
        coordinator
            .active_subject()
            .ok()
            .filter(|s| s.kind() == SubjectKind::Candidate)
            .map(|s| s.id())
    });
    let has_voted = match committee_id {
        Some(id) => coordinator.has_voted(voter_id, id).await?,
        None => false,
    };
    let total_votes = coordinator.audit_votes_cast(voter_id).await?;
    let remaining_votes = coordinator.remaining_audit_votes(voter_id).await?;

    Ok(Json(CheckAuditVoteResponse {
        committee_id,
        has_voted,
        total_votes,
        remaining_votes,
    }))
}

pub async fn cast_vote(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Json(payload): Json<CastVoteRequest>,
) -> Result<impl IntoResponse, VotingError> {
    let voter_id = voter_from_session(&session).await?;

    let receipt = app_state
        .coordinator
        .record_vote(voter_id, payload.resolution_id, payload.vote)
        .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn cast_audit_vote(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Json(payload): Json<CastAuditVoteRequest>,
) -> Result<impl IntoResponse, VotingError> {
    let voter_id = voter_from_session(&session).await?;

    let receipt = app_state
        .coordinator
        .record_vote(voter_id, payload.committee_id, Decision::For)
        .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn proxy_settings(Extension(app_state): Extension<AppState>) -> impl IntoResponse {
    Json(app_state.coordinator.proxy_overlay())
}
