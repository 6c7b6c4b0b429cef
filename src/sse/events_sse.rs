use crate::error::VotingError;
use crate::sse::models::TopicSet;
use crate::startup::AppState;
use axum::{
    extract::{Extension, Query},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::json;
use std::{convert::Infallible, time::Duration};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Comma separated topic names. Absent or empty subscribes to everything.
    #[serde(default)]
    pub topics: Option<String>,
}

/// `GET /api/events`
///
/// Opens with an `init` event carrying the current session snapshot and proxy
/// overlay, then relays every hub event on the requested topics. The SSE
/// event name is the topic name.
pub async fn events_sse(
    Extension(app_state): Extension<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, VotingError> {
    let topics = TopicSet::parse_list(query.topics.as_deref().unwrap_or(""))
        .map_err(VotingError::InvalidRequest)?;

    let coordinator = app_state.coordinator.clone();
    let mut subscription = coordinator.hub().subscribe(topics);
    info!(
        subscribers = coordinator.hub().subscriber_count(),
        "event stream opened"
    );

    let stream = async_stream::stream! {
        let snapshot = coordinator.snapshot();
        yield Ok(Event::default()
            .event("init")
            .data(json!({
                "votingState": snapshot.window,
                "activeSubject": snapshot.active_subject,
                "agmFinished": snapshot.ended,
                "proxy": coordinator.proxy_overlay(),
            }).to_string()));

        while let Some(event) = subscription.next().await {
            yield Ok(Event::default()
                .event(event.topic().as_str())
                .data(event.payload().to_string()));
        }

        debug!("event stream ended");
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(app_state.config.sse_keepalive_secs))
            .text("keep-alive"),
    ))
}
