use serde::Serialize;

use crate::db::models::{Subject, SubjectKind};
use crate::session::timer::WindowTimer;

/// Advertised window state. `remaining_seconds` is display state only;
/// closing is always an explicit administrator action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingWindow {
    pub is_open: bool,
    #[serde(rename = "type")]
    pub subject_kind: Option<SubjectKind>,
    pub remaining_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Active { subject: Subject, window_open: bool },
    /// Terminal until the process is restarted.
    Ended,
}

/// Mutable session state. Only ever touched while holding the coordinator's
/// mutation lock.
pub struct SessionState {
    pub phase: Phase,
    pub round: i64,
    pub timer: WindowTimer,
}

impl SessionState {
    pub fn new(round: i64, timer: WindowTimer) -> Self {
        SessionState {
            phase: Phase::Idle,
            round,
            timer,
        }
    }

    pub fn active_subject(&self) -> Option<&Subject> {
        match &self.phase {
            Phase::Active { subject, .. } => Some(subject),
            _ => None,
        }
    }

    pub fn window_open(&self) -> bool {
        matches!(self.phase, Phase::Active { window_open: true, .. })
    }

    pub fn snapshot(&self, remaining_seconds: u32) -> SessionSnapshot {
        let active_subject = self.active_subject().cloned();
        let is_open = self.window_open();
        SessionSnapshot {
            window: VotingWindow {
                is_open,
                subject_kind: active_subject.as_ref().map(Subject::kind),
                remaining_seconds: if is_open { remaining_seconds } else { 0 },
            },
            active_subject,
            round: self.round,
            ended: matches!(self.phase, Phase::Ended),
            timer_generation: self.timer.generation(),
        }
    }
}

/// Immutable view of the last committed state, served to readers without
/// taking the mutation lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub active_subject: Option<Subject>,
    pub window: VotingWindow,
    pub round: i64,
    pub ended: bool,
    #[serde(skip)]
    pub(crate) timer_generation: u64,
}
