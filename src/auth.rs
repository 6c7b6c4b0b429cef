use crate::config::Config;
use crate::db::models::VoterId;
use crate::db::store::ShareholderStore;
use crate::error::VotingError;
use crate::startup::AppState;
use axum::{
    extract::{Extension, Json},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tower_sessions::Session;
use tracing::{info, warn};
use uuid::Uuid;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

const VOTER_ID_KEY: &str = "voter_id";
const VOTER_NAME_KEY: &str = "voter_name";
const LOGIN_CLAIM_KEY: &str = "login_claim";

pub const ALREADY_LOGGED_IN: &str =
    "User is already logged in elsewhere. Please sign out from the other device/browser first.";

/// Which browser session currently holds each voter. A claim lapses after the
/// session inactivity period so an abandoned browser cannot lock a voter out.
pub struct LoginRegistry {
    ttl: Duration,
    claims: Mutex<HashMap<VoterId, Claim>>,
}

struct Claim {
    token: Uuid,
    claimed_at: Instant,
}

impl LoginRegistry {
    pub fn new(ttl: Duration) -> Self {
        LoginRegistry {
            ttl,
            claims: Mutex::new(HashMap::new()),
        }
    }

    /// Claims `voter_id` and returns the new claim token. `held` is the token
    /// the requesting session already carries for this voter, if any.
    pub async fn claim(&self, voter_id: VoterId, held: Option<Uuid>) -> Result<Uuid, VotingError> {
        let mut claims = self.claims.lock().await;

        if let Some(claim) = claims.get(&voter_id) {
            let ours = held == Some(claim.token);
            if !ours && claim.claimed_at.elapsed() < self.ttl {
                return Err(VotingError::Conflict(ALREADY_LOGGED_IN.into()));
            }
        }

        let token = Uuid::new_v4();
        claims.insert(
            voter_id,
            Claim {
                token,
                claimed_at: Instant::now(),
            },
        );
        Ok(token)
    }

    /// Drops the claim if `token` still holds it.
    pub async fn release(&self, voter_id: VoterId, token: Uuid) -> bool {
        let mut claims = self.claims.lock().await;
        match claims.get(&voter_id) {
            Some(claim) if claim.token == token => {
                claims.remove(&voter_id);
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Email or shareholder account number.
    pub identifier: String,
}

/// Binds the shareholder matching `identifier` to the session.
pub async fn login(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, VotingError> {
    let identifier = payload.identifier.trim();
    if identifier.is_empty() {
        return Err(VotingError::InvalidRequest("identifier is required".into()));
    }

    let shareholder = app_state
        .coordinator
        .store()
        .find_by_identifier(identifier)
        .await?
        .ok_or_else(|| {
            warn!(identifier, "login for unknown shareholder");
            VotingError::Unauthorized
        })?;

    let previous_voter = session.get::<VoterId>(VOTER_ID_KEY).await?;
    let previous_claim = session.get::<Uuid>(LOGIN_CLAIM_KEY).await?;
    let held = previous_claim.filter(|_| previous_voter == Some(shareholder.id));

    let token = app_state
        .logins
        .claim(shareholder.id, held)
        .await
        .inspect_err(|_| {
            warn!(voter_id = %shareholder.id, "login refused, voter holds another session")
        })?;

    if let (Some(voter), Some(claim)) = (previous_voter, previous_claim) {
        if voter != shareholder.id {
            app_state.logins.release(voter, claim).await;
        }
    }

    session.cycle_id().await?;
    session.insert(VOTER_ID_KEY, shareholder.id).await?;
    session.insert(VOTER_NAME_KEY, &shareholder.name).await?;
    session.insert(LOGIN_CLAIM_KEY, token).await?;

    info!(voter_id = %shareholder.id, "voter logged in");

    Ok(Json(json!({
        "success": true,
        "message": format!("Welcome {}", shareholder.name),
        "voterId": shareholder.id,
        "name": shareholder.name,
        "holdings": shareholder.holdings,
    })))
}

pub async fn logout(
    Extension(app_state): Extension<AppState>,
    session: Session,
) -> Result<impl IntoResponse, VotingError> {
    if let Ok(Some(voter_id)) = session.get::<VoterId>(VOTER_ID_KEY).await {
        if let Ok(Some(claim)) = session.get::<Uuid>(LOGIN_CLAIM_KEY).await {
            app_state.logins.release(voter_id, claim).await;
        }
        info!(%voter_id, "voter logged out");
    }
    session.flush().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn voter_from_session(session: &Session) -> Result<VoterId, VotingError> {
    session
        .get::<VoterId>(VOTER_ID_KEY)
        .await
        .map_err(|_| VotingError::Unauthorized)?
        .ok_or(VotingError::Unauthorized)
}

pub fn require_admin(headers: &HeaderMap, config: &Config) -> Result<(), VotingError> {
    let presented = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());

    match presented {
        Some(token) if tokens_match(token, &config.admin_token) => Ok(()),
        Some(_) => {
            warn!("admin request with a wrong token");
            Err(VotingError::Unauthorized)
        }
        None => Err(VotingError::Unauthorized),
    }
}

fn tokens_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}
