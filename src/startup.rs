use crate::admin;
use crate::auth::{self, LoginRegistry};
use crate::config::Config;
use crate::db::connection::{DbPool, get_pool_stats, init_db};
use crate::db::models::{Candidate, Resolution, Shareholder, Subject};
use crate::db::store::{SubjectStore, VotingStore};
use crate::db::{MemoryStore, PgStore};
use crate::error::VotingError;
use crate::session::{Coordinator, CoordinatorSettings};
use crate::sse::{self, BroadcastHub};
use crate::subjects;
use crate::voting;
use axum::{
    Router,
    extract::Extension,
    http::{
        HeaderName, Method, StatusCode,
        header::{ACCEPT, CONTENT_TYPE},
    },
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{Duration, interval};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_sessions::{
    Expiry, SessionManagerLayer, SessionStore,
    cookie::{SameSite, time::Duration as CookieDuration},
};
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("database initialisation failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("could not load seed file {path}: {reason}")]
    Seed { path: String, reason: String },
    #[error("coordinator could not start: {0}")]
    Coordinator(#[from] VotingError),
}

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub config: Arc<Config>,
    pub logins: Arc<LoginRegistry>,
    pub db: Option<DbPool>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, StartupError> {
        let (store, db): (Arc<dyn VotingStore>, Option<DbPool>) = match &config.database_url {
            Some(database_url) => {
                let pool = init_db(database_url).await?;
                if let Ok(stats) = get_pool_stats(&pool).await {
                    info!("{stats}");
                }
                spawn_health_check(pool.clone());
                if config.seed_file.is_some() {
                    warn!("SEED_FILE is ignored when DATABASE_URL is set");
                }
                (Arc::new(PgStore::new(pool.clone())), Some(pool))
            }
            None => {
                warn!("DATABASE_URL not set, ballots will not survive a restart");
                let store = match &config.seed_file {
                    Some(path) => seeded_memory_store(path).await?,
                    None => MemoryStore::new(),
                };
                (Arc::new(store), None)
            }
        };

        Ok(Self::with_store(store, config, db).await?)
    }

    pub async fn with_store(
        store: Arc<dyn VotingStore>,
        config: Config,
        db: Option<DbPool>,
    ) -> Result<Self, VotingError> {
        let hub = BroadcastHub::new(config.broadcast_capacity);
        let settings = CoordinatorSettings {
            window_secs: config.voting_window_secs,
            election_budget: config.election_vote_budget,
        };
        let coordinator = Coordinator::new(store, hub, settings).await?;
        let login_ttl = u64::try_from(config.session_inactivity_secs).unwrap_or(0);

        Ok(AppState {
            coordinator: Arc::new(coordinator),
            logins: Arc::new(LoginRegistry::new(Duration::from_secs(login_ttl))),
            config: Arc::new(config),
            db,
        })
    }
}

fn spawn_health_check(pool: DbPool) {
    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            match pool.acquire().await {
                Ok(conn) => {
                    drop(conn);
                }
                Err(e) => {
                    error!("Database connection health check failed: {}", e);
                }
            }
        }
    });
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Seed {
    shareholders: Vec<Shareholder>,
    resolutions: Vec<Resolution>,
    audit_committee: Vec<Candidate>,
}

async fn seeded_memory_store(path: &Path) -> Result<MemoryStore, StartupError> {
    let seed_error = |reason: String| StartupError::Seed {
        path: path.display().to_string(),
        reason,
    };

    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| seed_error(e.to_string()))?;
    let seed: Seed = serde_json::from_str(&raw).map_err(|e| seed_error(e.to_string()))?;

    info!(
        shareholders = seed.shareholders.len(),
        resolutions = seed.resolutions.len(),
        candidates = seed.audit_committee.len(),
        "loading seed data"
    );

    let store = MemoryStore::with_shareholders(seed.shareholders);
    let subjects = seed
        .resolutions
        .into_iter()
        .map(Subject::Resolution)
        .chain(seed.audit_committee.into_iter().map(Subject::Candidate));
    for subject in subjects {
        store
            .upsert_subject(&subject)
            .await
            .map_err(|e| seed_error(e.to_string()))?;
    }

    Ok(store)
}

pub const SESSION_COOKIE_NAME: &str = "agm_voting";

pub fn session_layer<S: SessionStore>(store: S, inactivity_secs: i64) -> SessionManagerLayer<S> {
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_same_site(SameSite::Lax)
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(CookieDuration::seconds(inactivity_secs)))
}

/// All routes, without the session layer: the session store differs between
/// PostgreSQL and in-memory mode so `main` adds it.
pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/login", post(auth::login))
        .route("/api/logout", post(auth::logout))
        .route("/api/voting/state", get(voting::voting_state))
        .route("/api/active-subject", get(voting::active_subject))
        .route("/api/active-resolution", get(voting::active_resolution))
        .route("/api/audit-committee/active", get(voting::active_candidate))
        .route("/api/results", get(voting::resolution_results))
        .route("/api/results/:subject_id", get(voting::subject_tally))
        .route("/api/audit-committee/results", get(voting::audit_results))
        .route("/api/check-vote", get(voting::check_vote))
        .route("/api/check-audit-vote", get(voting::check_audit_vote))
        .route("/api/vote", post(voting::cast_vote))
        .route("/api/audit-vote", post(voting::cast_audit_vote))
        .route(
            "/api/proxy-settings",
            get(voting::proxy_settings).post(admin::set_proxy_settings),
        )
        .route("/api/events", get(sse::events_sse))
        .route("/api/admin/proxy-settings", post(admin::set_proxy_settings))
        .route("/api/admin/proxy/enable", post(admin::enable_proxy))
        .route("/api/admin/proxy/disable", post(admin::disable_proxy))
        .route(
            "/api/admin/resolutions/:id/activate",
            put(admin::activate_resolution),
        )
        .route(
            "/api/admin/audit-committee/:id/activate",
            put(admin::activate_candidate),
        )
        .route("/api/admin/voting/open", post(admin::open_voting))
        .route("/api/admin/voting/close", post(admin::close_voting))
        .route("/api/admin/voting/toggle", post(admin::toggle_voting))
        .route("/api/admin/close-current", post(admin::close_current))
        .route("/api/admin/agm/end", post(admin::end_agm))
        .route(
            "/api/resolutions",
            get(subjects::list_resolutions).post(subjects::create_resolution),
        )
        .route(
            "/api/resolutions/:id",
            put(subjects::update_resolution).delete(subjects::delete_resolution),
        )
        .route(
            "/api/audit-committee",
            get(subjects::list_candidates).post(subjects::create_candidate),
        )
        .route(
            "/api/audit-committee/:id",
            put(subjects::update_candidate).delete(subjects::delete_candidate),
        )
        .layer(Extension(app_state))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::mirror_request())
                .allow_credentials(true)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    CONTENT_TYPE,
                    ACCEPT,
                    HeaderName::from_static(auth::ADMIN_TOKEN_HEADER),
                ]),
        )
        .fallback(handler_404)
}

async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "nothing to see here")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::ProxySettingsStore;
    use crate::proxy::ProxyOverlay;
    use axum::body::{Body, to_bytes};
    use axum::http::{HeaderMap, Request, header};
    use futures::StreamExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    const ADMIN: &str = "chair-token";

    struct TestApp {
        app: Router,
        resolution: Resolution,
        candidate: Candidate,
    }

    async fn test_app() -> TestApp {
        let resolution = Resolution {
            id: Uuid::new_v4(),
            title: "Approve accounts".into(),
            description: "Receive the audited accounts for the year".into(),
        };
        let candidate = Candidate {
            id: Uuid::new_v4(),
            name: "Ngozi Eze".into(),
            bio: None,
        };
        let store = Arc::new(MemoryStore::with_shareholders(vec![Shareholder {
            id: Uuid::new_v4(),
            name: "Tunde Bakare".into(),
            identifier: "tunde@example.com".into(),
            holdings: 5_000,
        }]));
        store
            .upsert_subject(&Subject::Resolution(resolution.clone()))
            .await
            .unwrap();
        store
            .upsert_subject(&Subject::Candidate(candidate.clone()))
            .await
            .unwrap();
        store
            .save_proxy_overlay(&ProxyOverlay::disabled())
            .await
            .unwrap();

        let config = Config::from_lookup(|name| (name == "ADMIN_TOKEN").then(|| ADMIN.to_string()))
            .unwrap();
        let state = AppState::with_store(store, config, None).await.unwrap();
        let app = router(state).layer(session_layer(tower_sessions::MemoryStore::default(), 3600));

        TestApp {
            app,
            resolution,
            candidate,
        }
    }

    fn request(method: &str, uri: &str, body: Option<Value>) -> axum::http::request::Builder {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(_) => builder.header(header::CONTENT_TYPE, "application/json"),
            None => builder,
        }
    }

    async fn send(
        app: &Router,
        builder: axum::http::request::Builder,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Value) {
        let body = body.map_or_else(Body::empty, |b| Body::from(b.to_string()));
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, json)
    }

    async fn admin(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let (status, _, json) = send(
            app,
            request(method, uri, None).header(crate::auth::ADMIN_TOKEN_HEADER, ADMIN),
            None,
        )
        .await;
        (status, json)
    }

    async fn login(app: &Router) -> String {
        let body = json!({ "identifier": "TUNDE@example.com" });
        let (status, headers, json) =
            send(app, request("POST", "/api/login", Some(body.clone())), Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "Welcome Tunde Bakare");
        assert_eq!(json["name"], "Tunde Bakare");

        let set_cookie = headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .expect("session cookie");
        set_cookie.split(';').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn voter_casts_one_resolution_ballot() {
        let TestApp {
            app, resolution, ..
        } = test_app().await;
        let cookie = login(&app).await;

        let activate = format!("/api/admin/resolutions/{}/activate", resolution.id);
        assert_eq!(admin(&app, "PUT", &activate).await.0, StatusCode::OK);
        let (status, snapshot) = admin(&app, "POST", "/api/admin/voting/open").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["window"]["isOpen"], true);
        assert_eq!(snapshot["window"]["type"], "resolution");

        let ballot = json!({ "resolutionId": resolution.id, "vote": "for" });
        let (status, _, receipt) = send(
            &app,
            request("POST", "/api/vote", Some(ballot.clone())).header(header::COOKIE, &cookie),
            Some(ballot.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(receipt["decision"], "for");

        let (status, _, error) = send(
            &app,
            request("POST", "/api/vote", Some(ballot.clone())).header(header::COOKIE, &cookie),
            Some(ballot),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error["error"], "AlreadyVoted");

        let (_, _, check) = send(
            &app,
            request("GET", "/api/check-vote", None).header(header::COOKIE, &cookie),
            None,
        )
        .await;
        assert_eq!(check["hasVoted"], true);

        let (_, _, tally) = send(
            &app,
            request("GET", &format!("/api/results/{}", resolution.id), None),
            None,
        )
        .await;
        assert_eq!(tally["forCount"], 1);
        assert_eq!(tally["forHoldings"], 5_000);
        assert_eq!(tally["forPercent"], 100);
    }

    #[tokio::test]
    async fn voting_page_ballot_with_boolean_decision_is_recorded() {
        let TestApp {
            app, resolution, ..
        } = test_app().await;
        let cookie = login(&app).await;
        let activate = format!("/api/admin/resolutions/{}/activate", resolution.id);
        admin(&app, "PUT", &activate).await;
        admin(&app, "POST", "/api/admin/voting/open").await;

        let ballot = json!({ "resolutionId": resolution.id, "decision": false });
        let (status, _, receipt) = send(
            &app,
            request("POST", "/api/vote", Some(ballot.clone())).header(header::COOKIE, &cookie),
            Some(ballot),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(receipt["decision"], "against");
        let (_, _, tally) = send(
            &app,
            request("GET", &format!("/api/results/{}", resolution.id), None),
            None,
        )
        .await;
        assert_eq!(tally["againstCount"], 1);
    }

    #[tokio::test]
    async fn second_browser_cannot_log_in_as_the_same_voter() {
        let TestApp { app, .. } = test_app().await;
        let first = login(&app).await;
        let body = json!({ "identifier": "tunde@example.com" });

        let (status, _, error) =
            send(&app, request("POST", "/api/login", Some(body.clone())), Some(body.clone())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error["error"], "Conflict");
        assert!(
            error["details"]
                .as_str()
                .unwrap()
                .contains(crate::auth::ALREADY_LOGGED_IN)
        );

        let (status, headers, _) = send(
            &app,
            request("POST", "/api/login", Some(body.clone())).header(header::COOKIE, &first),
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let renewed = headers[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();

        let (status, _, _) = send(
            &app,
            request("POST", "/api/logout", None).header(header::COOKIE, &renewed),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        login(&app).await;
    }

    #[tokio::test]
    async fn active_subject_is_served_by_kind() {
        let TestApp {
            app, candidate, ..
        } = test_app().await;
        let activate = format!("/api/admin/audit-committee/{}/activate", candidate.id);
        admin(&app, "PUT", &activate).await;

        let (status, _, _) = send(&app, request("GET", "/api/active-resolution", None), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, active) =
            send(&app, request("GET", "/api/audit-committee/active", None), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(active["id"], candidate.id.to_string());
        assert_eq!(active["kind"], "audit");
    }

    #[tokio::test]
    async fn election_ballot_reports_remaining_votes() {
        let TestApp { app, candidate, .. } = test_app().await;
        let cookie = login(&app).await;

        let activate = format!("/api/admin/audit-committee/{}/activate", candidate.id);
        admin(&app, "PUT", &activate).await;
        admin(&app, "POST", "/api/admin/voting/toggle").await;

        let ballot = json!({ "committeeId": candidate.id });
        let (status, _, receipt) = send(
            &app,
            request("POST", "/api/audit-vote", Some(ballot.clone()))
                .header(header::COOKIE, &cookie),
            Some(ballot),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(receipt["remainingAuditVotes"], 2);

        let (_, _, check) = send(
            &app,
            request("GET", "/api/check-audit-vote", None).header(header::COOKIE, &cookie),
            None,
        )
        .await;
        assert_eq!(check["hasVoted"], true);
        assert_eq!(check["totalVotes"], 1);
        assert_eq!(check["remainingVotes"], 2);

        let (_, _, results) = send(
            &app,
            request("GET", "/api/audit-committee/results", None),
            None,
        )
        .await;
        assert_eq!(results[0]["votes"], 1);
        assert_eq!(results[0]["isActive"], true);
    }

    #[tokio::test]
    async fn admin_routes_require_the_token() {
        let TestApp { app, .. } = test_app().await;

        let (status, _, error) =
            send(&app, request("POST", "/api/admin/agm/end", None), None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn ballots_need_a_logged_in_voter() {
        let TestApp {
            app, resolution, ..
        } = test_app().await;
        let ballot = json!({ "resolutionId": resolution.id, "vote": "against" });

        let (status, _, _) =
            send(&app, request("POST", "/api/vote", Some(ballot.clone())), Some(ballot)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_shareholder_cannot_log_in() {
        let TestApp { app, .. } = test_app().await;
        let body = json!({ "identifier": "nobody@example.com" });

        let (status, _, _) =
            send(&app, request("POST", "/api/login", Some(body.clone())), Some(body)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn window_commands_without_subject_conflict() {
        let TestApp { app, .. } = test_app().await;

        let (status, error) = admin(&app, "POST", "/api/admin/voting/open").await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error["error"], "Conflict");
        let (_, _, state) = send(&app, request("GET", "/api/voting/state", None), None).await;
        assert_eq!(state, json!({ "isOpen": false, "type": null, "remainingSeconds": 0 }));
    }

    #[tokio::test]
    async fn active_subject_is_not_found_when_idle() {
        let TestApp { app, .. } = test_app().await;

        let (status, _, _) = send(&app, request("GET", "/api/active-subject", None), None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn resolutions_can_be_created_and_listed() {
        let TestApp { app, .. } = test_app().await;
        let body = json!({ "title": "Re-appoint auditors", "description": "Appoint Adeyemi & Co" });

        let (status, _, created) = send(
            &app,
            request("POST", "/api/resolutions", Some(body.clone()))
                .header(crate::auth::ADMIN_TOKEN_HEADER, ADMIN),
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["title"], "Re-appoint auditors");

        let (_, _, listed) = send(&app, request("GET", "/api/resolutions", None), None).await;
        let listed = listed.as_array().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|r| r["isActive"] == false));

        let invalid = json!({ "title": "", "description": "" });
        let (status, _, _) = send(
            &app,
            request("POST", "/api/resolutions", Some(invalid.clone()))
                .header(crate::auth::ADMIN_TOKEN_HEADER, ADMIN),
            Some(invalid),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn proxy_can_be_disabled_and_restored() {
        let TestApp { app, .. } = test_app().await;

        let (_, overlay) = admin(&app, "POST", "/api/admin/proxy/enable").await;
        assert_eq!(overlay, json!({ "proxyVotes": 120, "proxyHoldings": 136_789_566 }));

        admin(&app, "POST", "/api/admin/proxy/disable").await;
        let (_, _, current) = send(&app, request("GET", "/api/proxy-settings", None), None).await;
        assert_eq!(current, json!({ "proxyVotes": 0, "proxyHoldings": 0 }));

        let custom = json!({ "proxyVotes": 80, "proxyHoldings": 1_000 });
        let (status, _, _) = send(
            &app,
            request("POST", "/api/proxy-settings", Some(custom.clone())),
            Some(custom.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _, saved) = send(
            &app,
            request("POST", "/api/proxy-settings", Some(custom.clone()))
                .header(crate::auth::ADMIN_TOKEN_HEADER, ADMIN),
            Some(custom.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved, custom);
    }

    #[tokio::test]
    async fn event_stream_opens_with_a_snapshot() {
        let TestApp { app, .. } = test_app().await;

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/events?topics=voting-state,agm-finished")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );

        let mut frames = response.into_body().into_data_stream();
        let first = tokio::time::timeout(Duration::from_secs(1), frames.next())
            .await
            .expect("timeout")
            .expect("stream ended")
            .unwrap();
        let text = String::from_utf8(first.to_vec()).unwrap();
        assert!(text.starts_with("event: init"));
        assert!(text.contains("\"votingState\""));
    }

    #[tokio::test]
    async fn event_stream_rejects_unknown_topics() {
        let TestApp { app, .. } = test_app().await;

        let (status, _, error) =
            send(&app, request("GET", "/api/events?topics=gossip", None), None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"], "InvalidRequest");
    }

    #[tokio::test]
    async fn unknown_routes_fall_through_to_404() {
        let TestApp { app, .. } = test_app().await;

        let (status, _, _) = send(&app, request("GET", "/api/nope", None), None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
