use std::collections::HashMap;

use log::debug;

use super::traversal::{BallotTraversal, Progress};
use crate::error::ValidationError;
use crate::models::{AttendeeId, Ballot, BallotId, OptionId, Shareholder};

/// Attendee ids allowed to vote: recorded attendance other than absent and a
/// positive share count.
pub fn eligible_attendees(shareholders: &[Shareholder]) -> Vec<AttendeeId> {
    shareholders
        .iter()
        .filter(|s| s.is_eligible_voter())
        .filter_map(|s| s.attendee_id)
        .collect()
}

/// Per-browser voting state: where the registrar is in the ballot list and
/// which option they marked for each attendee on the current ballot.
///
/// The votes map is a rendering hint only. It is never reconciled with the
/// server tally and is reset whenever the current ballot changes.
#[derive(Debug, Default)]
pub struct VotingSession {
    traversal: BallotTraversal,
    votes: HashMap<AttendeeId, OptionId>,
    votes_for: Option<BallotId>,
}

impl VotingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn traversal(&self) -> &BallotTraversal {
        &self.traversal
    }

    pub fn current(&self) -> Option<&Ballot> {
        self.traversal.current()
    }

    pub fn current_ballot_id(&self) -> Option<BallotId> {
        self.traversal.current_ballot_id()
    }

    pub fn is_done(&self) -> bool {
        self.traversal.is_done()
    }

    pub fn is_syncing(&self) -> bool {
        self.traversal.is_syncing()
    }

    pub fn progress(&self) -> Progress {
        self.traversal.progress()
    }

    pub fn votes(&self) -> &HashMap<AttendeeId, OptionId> {
        &self.votes
    }

    pub fn vote_of(&self, attendee_id: AttendeeId) -> Option<OptionId> {
        self.votes.get(&attendee_id).copied()
    }

    pub fn reconcile(&mut self, ballots: Vec<Ballot>) -> bool {
        let changed = self.traversal.reconcile(ballots);
        self.follow_current();
        changed
    }

    pub fn options_resolved(&mut self, ballot_id: BallotId, option_count: usize) -> bool {
        let skipped = self.traversal.options_resolved(ballot_id, option_count);
        self.follow_current();
        skipped
    }

    pub fn record_vote(&mut self, attendee_id: AttendeeId, option_id: OptionId) {
        self.votes.insert(attendee_id, option_id);
    }

    pub fn record_vote_all(&mut self, attendees: &[AttendeeId], option_id: OptionId) {
        // replaces any individual marks
        self.votes = attendees.iter().map(|&id| (id, option_id)).collect();
    }

    pub fn clear_votes(&mut self) {
        self.votes.clear();
    }

    pub fn missing_votes(&self, eligible: &[AttendeeId]) -> Vec<AttendeeId> {
        eligible
            .iter()
            .copied()
            .filter(|id| !self.votes.contains_key(id))
            .collect()
    }

    pub fn ensure_complete(&self, eligible: &[AttendeeId]) -> Result<(), ValidationError> {
        let missing = self.missing_votes(eligible);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::MissingVotes(missing))
        }
    }

    pub fn close_current(&mut self, eligible: &[AttendeeId]) -> Result<BallotId, ValidationError> {
        self.ensure_complete(eligible)?;
        let id = self
            .traversal
            .close_current()
            .ok_or(ValidationError::NoCurrentBallot)?;
        self.follow_current();
        Ok(id)
    }

    pub fn close_failed(&mut self, ballot_id: BallotId) {
        self.traversal.close_failed(ballot_id);
    }

    pub fn previous(&mut self) -> bool {
        let moved = self.traversal.previous();
        self.follow_current();
        moved
    }

    fn follow_current(&mut self) {
        let current = self.traversal.current_ballot_id();
        if current != self.votes_for {
            debug!("Clearing {} vote mark(s) for new ballot {:?}", self.votes.len(), current);
            self.votes.clear();
            self.votes_for = current;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttendanceMode, BallotStatus};

    fn open(id: BallotId) -> Ballot {
        Ballot {
            id,
            election_id: 1,
            title: format!("Question {}", id),
            order: id,
            status: BallotStatus::Open,
        }
    }

    fn shareholder(attendee_id: Option<AttendeeId>, mode: Option<AttendanceMode>, actions: f64) -> Shareholder {
        Shareholder {
            id: attendee_id.unwrap_or(0),
            code: format!("S{:?}", attendee_id),
            name: "Holder".to_string(),
            actions,
            attendee_id,
            attendance_mode: mode,
            proxy: None,
        }
    }

    #[test]
    fn test_eligible_attendees() {
        let list = vec![
            shareholder(Some(1), Some(AttendanceMode::Presencial), 10.0),
            shareholder(Some(2), Some(AttendanceMode::Ausente), 10.0),
            shareholder(Some(3), Some(AttendanceMode::Virtual), 0.0),
            shareholder(None, Some(AttendanceMode::Virtual), 5.0),
            shareholder(Some(5), Some(AttendanceMode::Virtual), 5.0),
        ];
        assert_eq!(eligible_attendees(&list), vec![1, 5]);
    }

    #[test]
    fn test_close_requires_every_eligible_vote() {
        let mut session = VotingSession::new();
        session.reconcile(vec![open(1), open(2)]);
        session.record_vote(5, 10);

        let err = session.close_current(&[5, 6]).unwrap_err();
        assert_eq!(err, ValidationError::MissingVotes(vec![6]));
        assert_eq!(session.current_ballot_id(), Some(1));

        session.record_vote(6, 11);
        assert_eq!(session.close_current(&[5, 6]), Ok(1));
        assert_eq!(session.current_ballot_id(), Some(2));
    }

    #[test]
    fn test_votes_reset_when_ballot_changes() {
        let mut session = VotingSession::new();
        session.reconcile(vec![open(1), open(2)]);
        session.record_vote_all(&[5, 6], 10);
        assert_eq!(session.vote_of(6), Some(10));

        session.close_current(&[5, 6]).unwrap();
        assert!(session.votes().is_empty());
    }

    #[test]
    fn test_votes_survive_refresh_of_same_ballot() {
        let mut session = VotingSession::new();
        session.reconcile(vec![open(1), open(2)]);
        session.record_vote(5, 10);
        session.reconcile(vec![open(1), open(2)]);
        assert_eq!(session.vote_of(5), Some(10));
    }

    #[test]
    fn test_vote_all_replaces_marks() {
        let mut session = VotingSession::new();
        session.reconcile(vec![open(1)]);
        session.record_vote(9, 1);
        session.record_vote_all(&[5, 6], 2);
        assert_eq!(session.vote_of(9), None);
        assert_eq!(session.missing_votes(&[5, 6]), Vec::<AttendeeId>::new());

        session.clear_votes();
        assert_eq!(session.missing_votes(&[5, 6]), vec![5, 6]);
    }

    #[test]
    fn test_close_with_no_eligible_attendees() {
        let mut session = VotingSession::new();
        session.reconcile(vec![open(1)]);
        assert_eq!(session.close_current(&[]), Ok(1));
        assert!(session.is_done());
        assert_eq!(session.close_current(&[]), Err(ValidationError::NoCurrentBallot));
    }
}
