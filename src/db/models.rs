use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque voter identity issued by the identity provider.
pub type VoterId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubjectKind {
    #[serde(rename = "resolution")]
    Resolution,
    #[serde(rename = "audit")]
    Candidate,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::Resolution => "resolution",
            SubjectKind::Candidate => "audit",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "resolution" => Some(SubjectKind::Resolution),
            "audit" => Some(SubjectKind::Candidate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Resolution {
    pub id: Uuid,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Candidate {
    pub id: Uuid,
    pub name: String,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Subject {
    #[serde(rename = "resolution")]
    Resolution(Resolution),
    #[serde(rename = "audit")]
    Candidate(Candidate),
}

impl Subject {
    pub fn id(&self) -> Uuid {
        match self {
            Subject::Resolution(r) => r.id,
            Subject::Candidate(c) => c.id,
        }
    }

    pub fn kind(&self) -> SubjectKind {
        match self {
            Subject::Resolution(_) => SubjectKind::Resolution,
            Subject::Candidate(_) => SubjectKind::Candidate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    For,
    Against,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::For => "for",
            Decision::Against => "against",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "for" => Some(Decision::For),
            "against" => Some(Decision::Against),
            _ => None,
        }
    }
}

/// One recorded decision. `round` is the activation epoch the ballot was
/// cast in; election uniqueness is scoped to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    pub id: Uuid,
    pub voter_id: VoterId,
    pub subject_id: Uuid,
    pub kind: SubjectKind,
    pub decision: Decision,
    pub round: i64,
    pub cast_at: DateTime<Utc>,
}

impl Ballot {
    pub fn new(voter_id: VoterId, subject: &Subject, decision: Decision, round: i64) -> Self {
        Ballot {
            id: Uuid::new_v4(),
            voter_id,
            subject_id: subject.id(),
            kind: subject.kind(),
            decision,
            round,
            cast_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Shareholder {
    pub id: VoterId,
    pub name: String,
    pub identifier: String,
    pub holdings: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_serializes_with_kind_tag() {
        let subject = Subject::Candidate(Candidate {
            id: Uuid::nil(),
            name: "Ada Obi".into(),
            bio: None,
        });
        let json = serde_json::to_value(&subject).unwrap();
        assert_eq!(json["kind"], "audit");
        assert_eq!(json["name"], "Ada Obi");
    }

    #[test]
    fn kind_names_round_trip_through_storage_text() {
        for kind in [SubjectKind::Resolution, SubjectKind::Candidate] {
            assert_eq!(SubjectKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SubjectKind::parse("committee"), None);
    }
}
