//! In-memory backend for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::api::MeetingApi;
use crate::error::ApiError;
use crate::hooks::SharedApi;
use crate::models::{
    AttendanceMode, Ballot, BallotId, BallotStatus, BulkMarkAttendance, DashboardStats, Election,
    ElectionId, ElectionStatus, MarkAttendance, ObserverRow, OptionResult, Shareholder,
    VoteAllRequest, VoteRequest,
};

#[derive(Default)]
pub struct FakeState {
    pub election: Option<Election>,
    pub ballots: Vec<Ballot>,
    pub results: HashMap<BallotId, Vec<OptionResult>>,
    pub stats: DashboardStats,
    pub shareholders: Vec<Shareholder>,
    pub observer: Vec<ObserverRow>,
    pub calls: Vec<String>,
    pub failures: HashMap<&'static str, ApiError>,
}

#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn new(state: FakeState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn fail(&self, method: &'static str, error: ApiError) {
        self.state().failures.insert(method, error);
    }

    pub fn calls(&self, method: &str) -> usize {
        self.state().calls.iter().filter(|c| c.as_str() == method).count()
    }

    pub fn shared(self: &Arc<Self>) -> SharedApi {
        Arc::clone(self) as SharedApi
    }

    fn enter(&self, method: &'static str) -> Result<MutexGuard<'_, FakeState>, ApiError> {
        let mut state = self.state();
        state.calls.push(method.to_string());
        if let Some(e) = state.failures.get(method).cloned() {
            return Err(e);
        }
        Ok(state)
    }
}

pub fn status(status: u16, message: &str) -> ApiError {
    ApiError::Status {
        status,
        message: message.to_string(),
    }
}

pub fn election(id: ElectionId) -> Election {
    Election {
        id,
        name: "Junta general".to_string(),
        date: "2026-10-19".to_string(),
        status: ElectionStatus::Open,
        registration_start: None,
        registration_end: None,
        can_manage_attendance: true,
        can_manage_votes: true,
        min_quorum: Some(50.0),
        voting_open: false,
        voting_opened_at: None,
        demo: false,
    }
}

pub fn ballot(id: BallotId, order: i64, status: BallotStatus) -> Ballot {
    Ballot {
        id,
        election_id: 1,
        title: format!("Question {}", id),
        order,
        status,
    }
}

pub fn options(ballot_id: BallotId, ids: &[i64]) -> Vec<OptionResult> {
    ids.iter()
        .map(|&id| OptionResult {
            id,
            ballot_id,
            text: format!("Option {}", id),
            votes: 0,
        })
        .collect()
}

pub fn shareholder(code: &str, attendee_id: Option<i64>, mode: Option<AttendanceMode>) -> Shareholder {
    Shareholder {
        id: attendee_id.unwrap_or(0),
        code: code.to_string(),
        name: format!("Holder {}", code),
        actions: 100.0,
        attendee_id,
        attendance_mode: mode,
        proxy: None,
    }
}

#[async_trait]
impl MeetingApi for FakeApi {
    async fn elections(&self) -> Result<Vec<Election>, ApiError> {
        let state = self.enter("elections")?;
        Ok(state.election.iter().cloned().collect())
    }

    async fn election(&self, election_id: ElectionId) -> Result<Election, ApiError> {
        let state = self.enter("election")?;
        state
            .election
            .clone()
            .filter(|e| e.id == election_id)
            .ok_or_else(|| status(404, "Election not found"))
    }

    async fn ballots(&self, _election_id: ElectionId) -> Result<Vec<Ballot>, ApiError> {
        Ok(self.enter("ballots")?.ballots.clone())
    }

    async fn pending_ballots(&self, _election_id: ElectionId) -> Result<Vec<Ballot>, ApiError> {
        let state = self.enter("pending_ballots")?;
        Ok(state.ballots.iter().filter(|b| b.is_open()).cloned().collect())
    }

    async fn ballot_results(&self, ballot_id: BallotId) -> Result<Vec<OptionResult>, ApiError> {
        let state = self.enter("ballot_results")?;
        Ok(state.results.get(&ballot_id).cloned().unwrap_or_default())
    }

    async fn cast_vote(&self, ballot_id: BallotId, vote: VoteRequest) -> Result<(), ApiError> {
        let mut state = self.enter("cast_vote")?;
        if let Some(option) = state
            .results
            .get_mut(&ballot_id)
            .and_then(|opts| opts.iter_mut().find(|o| o.id == vote.option_id))
        {
            option.votes += 1;
        }
        Ok(())
    }

    async fn vote_all(&self, ballot_id: BallotId, vote: VoteAllRequest) -> Result<(), ApiError> {
        let mut state = self.enter("vote_all")?;
        let voters = state
            .shareholders
            .iter()
            .filter(|s| s.is_eligible_voter())
            .count() as u64;
        if let Some(option) = state
            .results
            .get_mut(&ballot_id)
            .and_then(|opts| opts.iter_mut().find(|o| o.id == vote.option_id))
        {
            option.votes += voters;
        }
        Ok(())
    }

    async fn close_ballot(&self, ballot_id: BallotId) -> Result<(), ApiError> {
        let mut state = self.enter("close_ballot")?;
        for b in state.ballots.iter_mut().filter(|b| b.id == ballot_id) {
            b.status = BallotStatus::Closed;
        }
        Ok(())
    }

    async fn reopen_ballot(&self, ballot_id: BallotId) -> Result<(), ApiError> {
        let mut state = self.enter("reopen_ballot")?;
        for b in state.ballots.iter_mut().filter(|b| b.id == ballot_id) {
            b.status = BallotStatus::Open;
        }
        Ok(())
    }

    async fn attendance_summary(&self, _election_id: ElectionId) -> Result<DashboardStats, ApiError> {
        Ok(self.enter("attendance_summary")?.stats.clone())
    }

    async fn start_voting(&self, _election_id: ElectionId) -> Result<(), ApiError> {
        let mut state = self.enter("start_voting")?;
        if let Some(e) = state.election.as_mut() {
            e.voting_open = true;
        }
        Ok(())
    }

    async fn close_voting(&self, _election_id: ElectionId) -> Result<(), ApiError> {
        let mut state = self.enter("close_voting")?;
        if let Some(e) = state.election.as_mut() {
            e.voting_open = false;
        }
        Ok(())
    }

    async fn close_election(&self, _election_id: ElectionId) -> Result<(), ApiError> {
        let mut state = self.enter("close_election")?;
        if let Some(e) = state.election.as_mut() {
            e.status = ElectionStatus::Closed;
        }
        Ok(())
    }

    async fn shareholders(&self, _election_id: ElectionId, search: &str) -> Result<Vec<Shareholder>, ApiError> {
        let state = self.enter("shareholders")?;
        let needle = search.to_lowercase();
        Ok(state
            .shareholders
            .iter()
            .filter(|s| {
                needle.is_empty()
                    || s.code.to_lowercase().contains(&needle)
                    || s.name.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }

    async fn mark_attendance(
        &self,
        _election_id: ElectionId,
        code: &str,
        payload: MarkAttendance,
    ) -> Result<(), ApiError> {
        let mut state = self.enter("mark_attendance")?;
        for s in state.shareholders.iter_mut().filter(|s| s.code == code) {
            s.attendance_mode = Some(payload.mode);
        }
        Ok(())
    }

    async fn bulk_mark_attendance(
        &self,
        _election_id: ElectionId,
        payload: BulkMarkAttendance,
    ) -> Result<(), ApiError> {
        let mut state = self.enter("bulk_mark_attendance")?;
        for s in state.shareholders.iter_mut().filter(|s| payload.codes.contains(&s.code)) {
            s.attendance_mode = Some(payload.mode);
        }
        Ok(())
    }

    async fn observer_rows(&self, _election_id: ElectionId) -> Result<Vec<ObserverRow>, ApiError> {
        Ok(self.enter("observer_rows")?.observer.clone())
    }
}
