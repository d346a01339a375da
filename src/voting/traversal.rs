use crate::models::{Ballot, BallotId, BallotStatus};
use log::{debug, info};
use std::collections::HashSet;

// "question n of m"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub answered: usize,
    pub position: usize,
    pub total: usize,
}

/// Sequential walk over an election's ballots.
///
/// Only OPEN ballots are ever current. Ballots closed by this client stay
/// closed locally until the server confirms; ballots found to have no answer
/// options are closed locally for the rest of the session.
#[derive(Debug, Default)]
pub struct BallotTraversal {
    ballots: Vec<Ballot>,
    current_step: usize,
    loaded: bool,
    syncing: bool,
    pending_close: HashSet<BallotId>,
    skipped: HashSet<BallotId>,
    options_checked: HashSet<BallotId>,
}

impl BallotTraversal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ballots(&self) -> &[Ballot] {
        &self.ballots
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn current(&self) -> Option<&Ballot> {
        self.ballots.get(self.current_step)
    }

    pub fn current_ballot_id(&self) -> Option<BallotId> {
        self.current().map(|b| b.id)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Every ballot has been walked past. Never true before the first list arrives.
    pub fn is_done(&self) -> bool {
        self.loaded && self.current_step >= self.ballots.len()
    }

    /// Raised for the one reconcile in which the server reported the current
    /// ballot closed before this client closed it.
    pub fn is_syncing(&self) -> bool {
        self.syncing
    }

    pub fn is_pending_close(&self, ballot_id: BallotId) -> bool {
        self.pending_close.contains(&ballot_id)
    }

    /// Makes the first OPEN ballot at or after `from` current; past the end
    /// means done.
    pub fn advance(&mut self, from: usize) {
        let mut next = from;
        while next < self.ballots.len() && !self.ballots[next].is_open() {
            next += 1;
        }
        self.current_step = next;

        match self.current() {
            Some(ballot) => info!("Current ballot is {} ({:?})", ballot.id, ballot.title),
            None => info!("All {} ballot(s) answered", self.ballots.len()),
        }
    }

    /// Merges a fresh server list into the local one and repositions.
    ///
    /// Returns true when the current ballot changed.
    pub fn reconcile(&mut self, server_ballots: Vec<Ballot>) -> bool {
        let previous_id = self.current_ballot_id();
        let previous_step = self.current_step;
        let was_done = self.is_done();
        self.syncing = false;

        let mut ballots = server_ballots;
        ballots.sort_by_key(|b| b.order);

        // A close is pending until the server reports it.
        self.pending_close
            .retain(|id| ballots.iter().any(|b| b.id == *id && b.is_open()));
        for ballot in &mut ballots {
            if self.pending_close.contains(&ballot.id) || self.skipped.contains(&ballot.id) {
                ballot.status = BallotStatus::Closed;
            }
        }
        self.ballots = ballots;

        if !self.loaded || was_done {
            self.loaded = true;
            self.advance(0);
            return self.current_ballot_id() != previous_id;
        }

        // nothing to anchor on
        let Some(previous_id) = previous_id else {
            self.advance(previous_step);
            return self.current_ballot_id().is_some();
        };

        match self.ballots.iter().position(|b| b.id == previous_id) {
            Some(index) if self.ballots[index].is_open() => {
                self.current_step = index;
                false
            }
            Some(index) => {
                info!("Ballot {} was closed elsewhere; resynchronizing", previous_id);
                self.syncing = true;
                self.advance(index);
                true
            }
            None => {
                debug!("Ballot {} disappeared from the list", previous_id);
                self.advance(previous_step.min(self.ballots.len()));
                true
            }
        }
    }

    /// Records the option count of a ballot once its options finished loading.
    /// A ballot without options is closed locally and, if current, skipped.
    /// Each ballot is evaluated once; returns true when it was skipped now.
    pub fn options_resolved(&mut self, ballot_id: BallotId, option_count: usize) -> bool {
        if !self.options_checked.insert(ballot_id) {
            return false;
        }
        if option_count > 0 {
            return false;
        }

        info!("Ballot {} has no answer options; skipping it", ballot_id);
        self.skipped.insert(ballot_id);
        if let Some(ballot) = self.ballots.iter_mut().find(|b| b.id == ballot_id) {
            ballot.status = BallotStatus::Closed;
        }
        if self.current_ballot_id() == Some(ballot_id) {
            self.advance(self.current_step + 1);
        }
        true
    }

    pub fn close_current(&mut self) -> Option<BallotId> {
        // optimistic; stays closed locally until the server agrees or rejects it
        let step = self.current_step;
        let ballot = self.ballots.get_mut(step)?;
        ballot.status = BallotStatus::Closed;
        let id = ballot.id;
        self.pending_close.insert(id);
        self.advance(step + 1);
        Some(id)
    }

    /// The server rejected a close; the next reconcile reports its real status.
    pub fn close_failed(&mut self, ballot_id: BallotId) {
        self.pending_close.remove(&ballot_id);
    }

    pub fn previous(&mut self) -> bool {
        // nearest earlier OPEN ballot
        let start = self.current_step.min(self.ballots.len());
        match (0..start).rev().find(|&i| self.ballots[i].is_open()) {
            Some(index) => {
                self.current_step = index;
                true
            }
            None => false,
        }
    }

    pub fn progress(&self) -> Progress {
        let total = self.ballots.len();
        let answered = self.ballots.iter().filter(|b| !b.is_open()).count();
        let current = usize::from(self.current().is_some());
        Progress {
            answered,
            position: (answered + current).min(total),
            total,
        }
    }
}
