use chrono::{DateTime, Utc};

use crate::models::{DashboardStats, Election};

/// Whether the "open voting" action is available.
///
/// Demo elections bypass both the quorum and the registration-start check.
pub fn can_start_voting(voting_open: bool, demo: bool, quorum_met: bool, after_start: bool) -> bool {
    !voting_open && (demo || (quorum_met && after_start))
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuorumGate {
    pub voting_open: bool,
    pub demo: bool,
    pub quorum: f64,
    pub min_quorum: f64,
    pub registration_start: Option<DateTime<Utc>>,
}

impl QuorumGate {
    pub fn new(election: &Election, stats: Option<&DashboardStats>) -> Self {
        // missing stats or minimum count as zero
        Self {
            voting_open: election.voting_open,
            demo: election.demo,
            quorum: stats.map_or(0.0, |s| s.porcentaje_quorum),
            min_quorum: election.min_quorum.unwrap_or(0.0),
            registration_start: election.registration_start,
        }
    }

    pub fn quorum_met(&self) -> bool {
        self.quorum >= self.min_quorum
    }

    pub fn registration_started(&self, now: DateTime<Utc>) -> bool {
        // no registration start means it has always started
        self.registration_start.is_none_or(|start| start <= now)
    }

    pub fn can_start_voting(&self, now: DateTime<Utc>) -> bool {
        can_start_voting(
            self.voting_open,
            self.demo,
            self.quorum_met(),
            self.registration_started(now),
        )
    }
}
