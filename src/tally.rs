//! Tally engine.
//!
//! Pure computation over recorded ballots. Nothing here touches shared state,
//! so it can be called from any number of readers at once.

use serde::Serialize;
use uuid::Uuid;

use crate::db::models::{Ballot, Decision, VoterId};
use crate::proxy::ProxyOverlay;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub subject_id: Uuid,
    pub for_count: i64,
    pub against_count: i64,
    pub total_count: i64,
    pub for_holdings: i64,
    pub against_holdings: i64,
    pub total_holdings: i64,
    pub for_percent: i64,
    pub against_percent: i64,
    pub for_holdings_percent: i64,
    pub against_holdings_percent: i64,
    pub proxy_votes: i64,
    pub proxy_holdings: i64,
}

/// Builds the tally for `subject_id`.
///
/// Ballots for other subjects are ignored. The overlay is added to the "for"
/// side only. Percentages are rounded half-up to whole percent and are 0 when
/// the matching total is 0.
pub fn compute_tally<F>(
    subject_id: Uuid,
    ballots: &[Ballot],
    overlay: &ProxyOverlay,
    holdings_for: F,
) -> Tally
where
    F: Fn(&VoterId) -> i64,
{
    let mut for_count = overlay.proxy_votes;
    let mut against_count = 0;
    let mut for_holdings = overlay.proxy_holdings;
    let mut against_holdings = 0;

    for ballot in ballots.iter().filter(|b| b.subject_id == subject_id) {
        let holdings = holdings_for(&ballot.voter_id).max(0);
        match ballot.decision {
            Decision::For => {
                for_count += 1;
                for_holdings += holdings;
            }
            Decision::Against => {
                against_count += 1;
                against_holdings += holdings;
            }
        }
    }

    let total_count = for_count + against_count;
    let total_holdings = for_holdings + against_holdings;

    Tally {
        subject_id,
        for_count,
        against_count,
        total_count,
        for_holdings,
        against_holdings,
        total_holdings,
        for_percent: percent(for_count, total_count),
        against_percent: percent(against_count, total_count),
        for_holdings_percent: percent(for_holdings, total_holdings),
        against_holdings_percent: percent(against_holdings, total_holdings),
        proxy_votes: overlay.proxy_votes,
        proxy_holdings: overlay.proxy_holdings,
    }
}

fn percent(part: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    let (part, total) = (part as i128, total as i128);
    ((200 * part + total) / (2 * total)) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Resolution, Subject};
    use std::collections::HashMap;

    fn subject() -> Subject {
        Subject::Resolution(Resolution {
            id: Uuid::new_v4(),
            title: "Re-appoint auditors".into(),
            description: "Re-appoint the external auditors for 2025".into(),
        })
    }

    fn ballot(subject: &Subject, decision: Decision) -> Ballot {
        Ballot::new(Uuid::new_v4(), subject, decision, 1)
    }

    #[test]
    fn one_for_one_against_splits_evenly() {
        let subject = subject();
        let ballots = vec![ballot(&subject, Decision::For), ballot(&subject, Decision::Against)];

        let tally = compute_tally(subject.id(), &ballots, &ProxyOverlay::disabled(), |_| 0);

        assert_eq!(tally.for_count, 1);
        assert_eq!(tally.against_count, 1);
        assert_eq!(tally.total_count, 2);
        assert_eq!((tally.for_percent, tally.against_percent), (50, 50));
    }

    #[test]
    fn proxy_overlay_lands_on_the_for_side_only() {
        let subject = subject();
        let ballots = vec![ballot(&subject, Decision::For)];
        let overlay = ProxyOverlay::new(120, 136_789_566).unwrap();

        let tally = compute_tally(subject.id(), &ballots, &overlay, |_| 0);

        assert_eq!(tally.for_count, 121);
        assert_eq!(tally.against_count, 0);
        assert_eq!(tally.for_holdings, 136_789_566);
        assert_eq!(tally.against_holdings, 0);
        assert_eq!(tally.for_percent, 100);
    }

    #[test]
    fn empty_tally_reports_zero_percent() {
        let subject = subject();
        let tally = compute_tally(subject.id(), &[], &ProxyOverlay::disabled(), |_| 0);

        assert_eq!(tally.total_count, 0);
        assert_eq!(tally.for_percent, 0);
        assert_eq!(tally.against_percent, 0);
        assert_eq!(tally.for_holdings_percent, 0);
    }

    #[test]
    fn holdings_are_summed_from_lookup() {
        let subject = subject();
        let yes = ballot(&subject, Decision::For);
        let no = ballot(&subject, Decision::Against);
        let holdings: HashMap<VoterId, i64> = [(yes.voter_id, 3_000), (no.voter_id, 1_000)].into();

        let tally = compute_tally(
            subject.id(),
            &[yes, no],
            &ProxyOverlay::disabled(),
            |v| holdings.get(v).copied().unwrap_or(0),
        );

        assert_eq!(tally.for_holdings, 3_000);
        assert_eq!(tally.against_holdings, 1_000);
        assert_eq!(tally.total_holdings, 4_000);
        assert_eq!(tally.for_holdings_percent, 75);
    }

    #[test]
    fn ballots_for_other_subjects_are_ignored() {
        let subject = subject();
        let other = self::subject();
        let ballots = vec![ballot(&subject, Decision::For), ballot(&other, Decision::Against)];

        let tally = compute_tally(subject.id(), &ballots, &ProxyOverlay::disabled(), |_| 0);

        assert_eq!(tally.total_count, 1);
    }

    #[test]
    fn percentages_sum_to_one_hundred_within_rounding() {
        for for_count in 0..=12 {
            for against_count in 0..=12 {
                if for_count + against_count == 0 {
                    continue;
                }
                let p_for = percent(for_count, for_count + against_count);
                let p_against = percent(against_count, for_count + against_count);
                let sum = p_for + p_against;
                assert!((99..=101).contains(&sum), "{for_count}/{against_count} -> {sum}");
            }
        }
    }
}
