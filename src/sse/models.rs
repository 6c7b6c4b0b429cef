use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::db::models::{Candidate, Resolution};
use crate::proxy::ProxyOverlay;
use crate::session::VotingWindow;
use crate::tally::Tally;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    VotingState,
    VotingTimer,
    ResolutionActivated,
    AuditMemberActivated,
    ResolutionUpdate,
    AuditMemberUpdated,
    VoteUpdated,
    AuditVoteUpdated,
    ProxyUpdated,
    AgmFinished,
}

impl Topic {
    pub const ALL: [Topic; 10] = [
        Topic::VotingState,
        Topic::VotingTimer,
        Topic::ResolutionActivated,
        Topic::AuditMemberActivated,
        Topic::ResolutionUpdate,
        Topic::AuditMemberUpdated,
        Topic::VoteUpdated,
        Topic::AuditVoteUpdated,
        Topic::ProxyUpdated,
        Topic::AgmFinished,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::VotingState => "voting-state",
            Topic::VotingTimer => "voting-timer",
            Topic::ResolutionActivated => "resolution-activated",
            Topic::AuditMemberActivated => "audit-member-activated",
            Topic::ResolutionUpdate => "resolution-update",
            Topic::AuditMemberUpdated => "audit-member-updated",
            Topic::VoteUpdated => "vote-updated",
            Topic::AuditVoteUpdated => "audit-vote-updated",
            Topic::ProxyUpdated => "proxy-updated",
            Topic::AgmFinished => "agm-finished",
        }
    }

    pub fn parse(name: &str) -> Option<Topic> {
        Topic::ALL.into_iter().find(|t| t.as_str() == name)
    }

    fn bit(&self) -> u16 {
        1 << (*self as u16)
    }
}

/// Set of topics a subscriber listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TopicSet(u16);

impl TopicSet {
    pub fn all() -> Self {
        Topic::ALL.into_iter().collect()
    }

    /// Parses a comma separated list such as `voting-state,vote-updated`.
    /// An empty list means every topic.
    pub fn parse_list(list: &str) -> Result<Self, String> {
        let mut set = TopicSet::default();
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let topic = Topic::parse(name).ok_or_else(|| format!("unknown topic '{name}'"))?;
            set.insert(topic);
        }
        if set.is_empty() {
            return Ok(TopicSet::all());
        }
        Ok(set)
    }

    pub fn insert(&mut self, topic: Topic) {
        self.0 |= topic.bit();
    }

    pub fn contains(&self, topic: Topic) -> bool {
        self.0 & topic.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<Topic> for TopicSet {
    fn from_iter<I: IntoIterator<Item = Topic>>(iter: I) -> Self {
        let mut set = TopicSet::default();
        for topic in iter {
            set.insert(topic);
        }
        set
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditVoteUpdate {
    pub committee_id: Uuid,
    pub votes_for: i64,
}

/// Everything the coordinator pushes to connected clients.
#[derive(Debug, Clone)]
pub enum HubEvent {
    VotingState(VotingWindow),
    Timer { remaining_seconds: u32 },
    ResolutionActivated(Resolution),
    AuditMemberActivated(Candidate),
    /// `None` when the active resolution was closed.
    ResolutionUpdate(Option<Resolution>),
    /// `None` when the active candidate was closed.
    AuditMemberUpdated(Option<Candidate>),
    VoteUpdated(Tally),
    AuditVoteUpdated(AuditVoteUpdate),
    ProxyUpdated(ProxyOverlay),
    AgmFinished { message: String },
}

impl HubEvent {
    pub fn topic(&self) -> Topic {
        match self {
            HubEvent::VotingState(_) => Topic::VotingState,
            HubEvent::Timer { .. } => Topic::VotingTimer,
            HubEvent::ResolutionActivated(_) => Topic::ResolutionActivated,
            HubEvent::AuditMemberActivated(_) => Topic::AuditMemberActivated,
            HubEvent::ResolutionUpdate(_) => Topic::ResolutionUpdate,
            HubEvent::AuditMemberUpdated(_) => Topic::AuditMemberUpdated,
            HubEvent::VoteUpdated(_) => Topic::VoteUpdated,
            HubEvent::AuditVoteUpdated(_) => Topic::AuditVoteUpdated,
            HubEvent::ProxyUpdated(_) => Topic::ProxyUpdated,
            HubEvent::AgmFinished { .. } => Topic::AgmFinished,
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            HubEvent::VotingState(window) => json!(window),
            HubEvent::Timer { remaining_seconds } => {
                json!({ "remainingSeconds": remaining_seconds })
            }
            HubEvent::ResolutionActivated(resolution) => json!(resolution),
            HubEvent::AuditMemberActivated(candidate) => json!(candidate),
            HubEvent::ResolutionUpdate(resolution) => json!(resolution),
            HubEvent::AuditMemberUpdated(candidate) => json!(candidate),
            HubEvent::VoteUpdated(tally) => json!(tally),
            HubEvent::AuditVoteUpdated(update) => json!(update),
            HubEvent::ProxyUpdated(overlay) => json!(overlay),
            HubEvent::AgmFinished { message } => json!({ "message": message }),
        }
    }
}
