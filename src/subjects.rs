//! Resolution and audit committee catalogue. Reads are public, writes need
//! the admin token.

use crate::auth::require_admin;
use crate::db::models::{Candidate, Resolution, Subject, SubjectKind};
use crate::db::store::SubjectStore;
use crate::error::VotingError;
use crate::startup::AppState;
use axum::{
    extract::{Extension, Json, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MIN_CANDIDATE_NAME_LEN: usize = 3;

#[derive(Debug, Deserialize)]
pub struct ResolutionRequest {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct CandidateRequest {
    pub name: String,
    pub bio: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing<T> {
    #[serde(flatten)]
    pub item: T,
    pub is_active: bool,
}

impl ResolutionRequest {
    fn into_resolution(self, id: Uuid) -> Result<Resolution, VotingError> {
        let title = self.title.trim();
        let description = self.description.trim();
        if title.is_empty() || description.is_empty() {
            return Err(VotingError::InvalidRequest(
                "title and description are required".into(),
            ));
        }
        Ok(Resolution {
            id,
            title: title.to_string(),
            description: description.to_string(),
        })
    }
}

impl CandidateRequest {
    fn into_candidate(self, id: Uuid) -> Result<Candidate, VotingError> {
        let name = self.name.trim();
        if name.chars().count() < MIN_CANDIDATE_NAME_LEN {
            return Err(VotingError::InvalidRequest(format!(
                "name must be at least {MIN_CANDIDATE_NAME_LEN} characters"
            )));
        }
        Ok(Candidate {
            id,
            name: name.to_string(),
            bio: self
                .bio
                .map(|bio| bio.trim().to_string())
                .filter(|bio| !bio.is_empty()),
        })
    }
}

pub async fn list_resolutions(
    Extension(app_state): Extension<AppState>,
) -> Result<impl IntoResponse, VotingError> {
    let active_id = active_id(&app_state);
    let listings = app_state
        .coordinator
        .list_subjects(SubjectKind::Resolution)
        .await?
        .into_iter()
        .filter_map(|subject| match subject {
            Subject::Resolution(item) => Some(Listing {
                is_active: active_id == Some(item.id),
                item,
            }),
            Subject::Candidate(_) => None,
        })
        .collect::<Vec<_>>();

    Ok(Json(listings))
}

pub async fn create_resolution(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ResolutionRequest>,
) -> Result<impl IntoResponse, VotingError> {
    require_admin(&headers, &app_state.config)?;
    let resolution = payload.into_resolution(Uuid::new_v4())?;

    app_state
        .coordinator
        .upsert_subject(Subject::Resolution(resolution.clone()))
        .await?;

    Ok((StatusCode::CREATED, Json(resolution)))
}

pub async fn update_resolution(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<ResolutionRequest>,
) -> Result<impl IntoResponse, VotingError> {
    require_admin(&headers, &app_state.config)?;
    ensure_exists(&app_state, id, SubjectKind::Resolution).await?;
    let resolution = payload.into_resolution(id)?;

    app_state
        .coordinator
        .upsert_subject(Subject::Resolution(resolution.clone()))
        .await?;

    Ok(Json(resolution))
}

pub async fn delete_resolution(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, VotingError> {
    require_admin(&headers, &app_state.config)?;
    ensure_exists(&app_state, id, SubjectKind::Resolution).await?;
    app_state.coordinator.delete_subject(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_candidates(
    Extension(app_state): Extension<AppState>,
) -> Result<impl IntoResponse, VotingError> {
    let active_id = active_id(&app_state);
    let listings = app_state
        .coordinator
        .list_subjects(SubjectKind::Candidate)
        .await?
        .into_iter()
        .filter_map(|subject| match subject {
            Subject::Candidate(item) => Some(Listing {
                is_active: active_id == Some(item.id),
                item,
            }),
            Subject::Resolution(_) => None,
        })
        .collect::<Vec<_>>();

    Ok(Json(listings))
}

pub async fn create_candidate(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CandidateRequest>,
) -> Result<impl IntoResponse, VotingError> {
    require_admin(&headers, &app_state.config)?;
    let candidate = payload.into_candidate(Uuid::new_v4())?;

    app_state
        .coordinator
        .upsert_subject(Subject::Candidate(candidate.clone()))
        .await?;

    Ok((StatusCode::CREATED, Json(candidate)))
}

pub async fn update_candidate(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<CandidateRequest>,
) -> Result<impl IntoResponse, VotingError> {
    require_admin(&headers, &app_state.config)?;
    ensure_exists(&app_state, id, SubjectKind::Candidate).await?;
    let candidate = payload.into_candidate(id)?;

    app_state
        .coordinator
        .upsert_subject(Subject::Candidate(candidate.clone()))
        .await?;

    Ok(Json(candidate))
}

pub async fn delete_candidate(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, VotingError> {
    require_admin(&headers, &app_state.config)?;
    ensure_exists(&app_state, id, SubjectKind::Candidate).await?;
    app_state.coordinator.delete_subject(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn active_id(app_state: &AppState) -> Option<Uuid> {
    app_state.coordinator.snapshot().active_subject.map(|s| s.id())
}

async fn ensure_exists(
    app_state: &AppState,
    id: Uuid,
    kind: SubjectKind,
) -> Result<(), VotingError> {
    let found = app_state
        .coordinator
        .store()
        .get_subject(id)
        .await?
        .is_some_and(|subject| subject.kind() == kind);

    if !found {
        return Err(VotingError::NotFound(format!("{} {id}", kind.as_str())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_requires_title_and_description() {
        let blank = ResolutionRequest {
            title: "  ".into(),
            description: "Re-appoint the auditors".into(),
        };
        assert!(matches!(
            blank.into_resolution(Uuid::new_v4()),
            Err(VotingError::InvalidRequest(_))
        ));

        let ok = ResolutionRequest {
            title: " Auditors ".into(),
            description: "Re-appoint the auditors".into(),
        }
        .into_resolution(Uuid::nil())
        .unwrap();
        assert_eq!(ok.title, "Auditors");
    }

    #[test]
    fn candidate_name_needs_three_characters() {
        let short = CandidateRequest {
            name: "Al".into(),
            bio: None,
        };
        assert!(short.into_candidate(Uuid::new_v4()).is_err());

        let candidate = CandidateRequest {
            name: "Ada Obi".into(),
            bio: Some("   ".into()),
        }
        .into_candidate(Uuid::nil())
        .unwrap();
        assert_eq!(candidate.bio, None);
    }
}
