use chrono::{DateTime, Utc};
use log::{info, warn};

use super::quorum::QuorumGate;
use super::session::{VotingSession, eligible_attendees};
use super::tally::{BallotTally, tally};
use crate::cache::QueryClient;
use crate::error::{ApiError, DeskError, ValidationError};
use crate::hooks::SharedApi;
use crate::hooks::ballots::{self, ballot_results_query, ballots_query, results_key};
use crate::hooks::elections::{self, dashboard_query, election_query};
use crate::hooks::shareholders::shareholders_query;
use crate::models::{
    AttendeeId, Ballot, BallotId, DashboardStats, Election, ElectionId, OptionId, OptionResult,
    Shareholder, VoteAllRequest, VoteRequest,
};
use crate::query::UseQuery;

/// The vote registrar's workspace for one election.
///
/// Owns the mounted queries the registrar screen needs and a
/// [`VotingSession`]. Cache invalidations only mark these queries stale;
/// [`VotingDesk::sync`] refetches them and realigns the traversal.
pub struct VotingDesk {
    election_id: ElectionId,
    api: SharedApi,
    client: QueryClient,
    election: UseQuery<Election>,
    ballots: UseQuery<Vec<Ballot>>,
    stats: UseQuery<DashboardStats>,
    shareholders: UseQuery<Vec<Shareholder>>,
    results: Option<UseQuery<Vec<OptionResult>>>,
    session: VotingSession,
}

impl VotingDesk {
    pub async fn mount(api: SharedApi, client: &QueryClient, election_id: ElectionId) -> Self {
        let election = UseQuery::mount(client, election_query(&api, election_id).auto_refetch(false)).await;
        let ballots = UseQuery::mount(client, ballots_query(&api, election_id).auto_refetch(false)).await;
        let stats = UseQuery::mount(client, dashboard_query(&api, election_id).auto_refetch(false)).await;
        let shareholders =
            UseQuery::mount(client, shareholders_query(&api, election_id, "").auto_refetch(false)).await;

        let mut desk = Self {
            election_id,
            api,
            client: client.clone(),
            election,
            ballots,
            stats,
            shareholders,
            results: None,
            session: VotingSession::new(),
        };
        desk.apply_ballots().await;
        desk
    }

    pub fn election_id(&self) -> ElectionId {
        self.election_id
    }

    pub fn session(&self) -> &VotingSession {
        &self.session
    }

    pub fn election(&self) -> Option<Election> {
        self.election.data()
    }

    pub fn election_error(&self) -> Option<ApiError> {
        self.election.error()
    }

    pub fn stats(&self) -> Option<DashboardStats> {
        self.stats.data()
    }

    pub fn shareholders(&self) -> Option<Vec<Shareholder>> {
        self.shareholders.data()
    }

    pub fn shareholders_error(&self) -> Option<ApiError> {
        self.shareholders.error()
    }

    pub fn current(&self) -> Option<&Ballot> {
        self.session.current()
    }

    pub fn options(&self) -> Option<Vec<OptionResult>> {
        let ballot_id = self.session.current_ballot_id()?;
        self.results
            .as_ref()
            .filter(|r| *r.key() == results_key(ballot_id))
            .and_then(|r| r.data())
    }

    pub fn tally(&self) -> Option<BallotTally> {
        self.options().map(|options| tally(&options))
    }

    pub fn eligible(&self) -> Vec<AttendeeId> {
        self.shareholders
            .data()
            .map(|list| eligible_attendees(&list))
            .unwrap_or_default()
    }

    pub fn is_syncing(&self) -> bool {
        self.session.is_syncing()
    }

    pub fn voting_open(&self) -> bool {
        self.election.data().is_some_and(|e| e.voting_open)
    }

    pub fn gate(&self) -> Option<QuorumGate> {
        let election = self.election.data()?;
        Some(QuorumGate::new(&election, self.stats.data().as_ref()))
    }

    pub fn can_start_voting(&self, now: DateTime<Utc>) -> bool {
        self.gate().is_some_and(|gate| gate.can_start_voting(now))
    }

    /// Refetches every query invalidated since the last sync, then merges the
    /// ballot list into the session. Returns the first fetch failure, after
    /// applying whatever did load.
    pub async fn sync(&mut self) -> Result<(), ApiError> {
        let mut outcomes = vec![
            self.election.refetch_if_stale().await,
            self.ballots.refetch_if_stale().await,
            self.stats.refetch_if_stale().await,
            self.shareholders.refetch_if_stale().await,
        ];
        if let Some(results) = &self.results {
            outcomes.push(results.refetch_if_stale().await);
        }

        self.apply_ballots().await;
        match outcomes.into_iter().find_map(Result::err) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn apply_ballots(&mut self) {
        if let Some(list) = self.ballots.data() {
            self.session.reconcile(list);
        }
        self.settle_current().await;
    }

    async fn settle_current(&mut self) {
        // Each pass either stops or skips a ballot without options.
        loop {
            let Some(ballot_id) = self.session.current_ballot_id() else {
                self.results = None;
                return;
            };

            let key = results_key(ballot_id);
            if self.results.as_ref().map(|r| r.key()) != Some(&key) {
                let options = ballot_results_query(&self.api, ballot_id, true).auto_refetch(false);
                self.results = Some(UseQuery::mount(&self.client, options).await);
            }

            // still loading, or failed; the next sync retries
            let Some(options) = self.results.as_ref().and_then(|r| r.data()) else {
                return;
            };
            if !self.session.options_resolved(ballot_id, options.len()) {
                return;
            }
        }
    }

    fn current_options_contain(&self, option_id: OptionId) -> Result<(), ValidationError> {
        match self.options() {
            Some(options) if !options.iter().any(|o| o.id == option_id) => {
                Err(ValidationError::UnknownOption(option_id))
            }
            _ => Ok(()),
        }
    }

    pub async fn start_voting(&mut self, now: DateTime<Utc>) -> Result<(), DeskError> {
        let Some(gate) = self.gate() else {
            return Err(match self.election.error() {
                Some(e) => e.into(),
                None => ValidationError::QuorumNotReached.into(),
            });
        };
        if gate.voting_open {
            return Err(ValidationError::VotingAlreadyOpen.into());
        }
        if !gate.can_start_voting(now) {
            return Err(ValidationError::QuorumNotReached.into());
        }

        elections::start_voting(&self.api, &self.client, self.election_id)
            .mutate(())
            .await?;
        info!("Voting opened for election {}", self.election_id);
        self.sync().await?;
        Ok(())
    }

    /// Marks `option_id` for one attendee and submits it. The local mark is
    /// kept even if the request fails.
    pub async fn cast_vote(&mut self, attendee_id: AttendeeId, option_id: OptionId) -> Result<(), DeskError> {
        let ballot_id = self
            .session
            .current_ballot_id()
            .ok_or(ValidationError::NoCurrentBallot)?;
        self.current_options_contain(option_id)?;

        self.session.record_vote(attendee_id, option_id);
        ballots::cast_vote(&self.api, &self.client, ballot_id)
            .mutate(VoteRequest {
                option_id,
                attendee_id,
            })
            .await?;
        Ok(())
    }

    pub async fn vote_all(&mut self, option_id: OptionId) -> Result<(), DeskError> {
        let ballot_id = self
            .session
            .current_ballot_id()
            .ok_or(ValidationError::NoCurrentBallot)?;
        self.current_options_contain(option_id)?;

        let eligible = self.eligible();
        self.session.record_vote_all(&eligible, option_id);
        ballots::vote_all(&self.api, &self.client, ballot_id)
            .mutate(VoteAllRequest { option_id })
            .await?;
        Ok(())
    }

    pub fn clear_votes(&mut self) {
        self.session.clear_votes();
    }

    /// Closes the current ballot once every eligible attendee has a mark,
    /// and moves to the next open ballot.
    pub async fn next_question(&mut self) -> Result<BallotId, DeskError> {
        let eligible = self.eligible();
        let ballot_id = self.session.close_current(&eligible)?;

        let closed = ballots::close_ballot(&self.api, &self.client, ballot_id, self.election_id)
            .mutate(())
            .await;
        if let Err(e) = closed {
            // Put the ballot back in play; the cached list still shows it open.
            warn!("Closing ballot {} failed: {}", ballot_id, e);
            self.session.close_failed(ballot_id);
            self.apply_ballots().await;
            return Err(e.into());
        }

        // The close went through even if this refresh does not.
        if let Err(e) = self.sync().await {
            warn!("Refresh after closing ballot {} failed: {}", ballot_id, e);
        }
        Ok(ballot_id)
    }

    pub async fn previous_question(&mut self) -> bool {
        let moved = self.session.previous();
        self.settle_current().await;
        moved
    }

    pub async fn reopen_ballot(&mut self, ballot_id: BallotId) -> Result<(), DeskError> {
        ballots::reopen_ballot(&self.api, &self.client, ballot_id, self.election_id)
            .mutate(())
            .await?;
        self.sync().await?;
        Ok(())
    }

    /// Finalizes voting once every ballot has been walked, then closes the
    /// election.
    pub async fn close_voting(&mut self) -> Result<(), DeskError> {
        if !self.session.is_done() {
            let open = self
                .session
                .traversal()
                .ballots()
                .iter()
                .filter(|b| b.is_open())
                .count();
            return Err(ValidationError::BallotsPending(open).into());
        }

        elections::close_voting(&self.api, &self.client, self.election_id)
            .mutate(())
            .await?;
        elections::close_election(&self.api, &self.client, self.election_id)
            .mutate(())
            .await?;
        info!("Voting closed for election {}", self.election_id);
        self.sync().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::ballots::ballots_key;
    use crate::hooks::shareholders::shareholders_key;
    use crate::models::{AttendanceMode, BallotStatus};
    use crate::testing::{FakeApi, FakeState, ballot, election, options, shareholder, status};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn meeting() -> FakeState {
        let mut results = HashMap::new();
        results.insert(1, options(1, &[11, 12]));
        results.insert(2, options(2, &[21, 22]));
        FakeState {
            election: Some(election(1)),
            ballots: vec![
                ballot(2, 2, BallotStatus::Open),
                ballot(1, 1, BallotStatus::Open),
            ],
            results,
            stats: DashboardStats {
                porcentaje_quorum: 60.0,
                ..Default::default()
            },
            shareholders: vec![
                shareholder("A1", Some(5), Some(AttendanceMode::Presencial)),
                shareholder("A2", Some(6), Some(AttendanceMode::Virtual)),
                shareholder("A3", Some(7), Some(AttendanceMode::Ausente)),
            ],
            ..Default::default()
        }
    }

    async fn desk_for(api: &Arc<FakeApi>) -> (VotingDesk, QueryClient) {
        let client = QueryClient::new();
        let desk = VotingDesk::mount(api.shared(), &client, 1).await;
        (desk, client)
    }

    #[tokio::test]
    async fn test_walks_and_closes_every_ballot() {
        let api = FakeApi::new(meeting());
        let (mut desk, _client) = desk_for(&api).await;

        assert_eq!(desk.current().map(|b| b.id), Some(1));
        assert_eq!(desk.eligible(), vec![5, 6]);

        desk.cast_vote(5, 11).await.unwrap();
        desk.cast_vote(6, 12).await.unwrap();
        assert_eq!(desk.next_question().await.unwrap(), 1);
        assert_eq!(desk.current().map(|b| b.id), Some(2));
        assert!(desk.session().votes().is_empty());
        assert!(!api.state().ballots.iter().find(|b| b.id == 1).unwrap().is_open());

        desk.vote_all(21).await.unwrap();
        assert_eq!(desk.next_question().await.unwrap(), 2);
        assert!(desk.session().is_done());
        assert!(!desk.is_syncing());

        desk.close_voting().await.unwrap();
        assert_eq!(api.calls("close_voting"), 1);
        assert_eq!(api.calls("close_election"), 1);
        assert_eq!(desk.election().map(|e| e.status), Some(crate::models::ElectionStatus::Closed));
    }

    #[tokio::test]
    async fn test_ballot_without_options_is_skipped_once() {
        let mut state = meeting();
        state.results.insert(1, Vec::new());
        let api = FakeApi::new(state);
        let (mut desk, _client) = desk_for(&api).await;

        assert_eq!(desk.current().map(|b| b.id), Some(2));
        assert_eq!(api.calls("ballot_results"), 2);
        assert_eq!(api.calls("close_ballot"), 0);

        desk.sync().await.unwrap();
        assert_eq!(desk.current().map(|b| b.id), Some(2));
        assert_eq!(api.calls("ballot_results"), 2);
    }

    #[tokio::test]
    async fn test_next_question_requires_every_vote() {
        let api = FakeApi::new(meeting());
        let (mut desk, _client) = desk_for(&api).await;

        desk.cast_vote(5, 11).await.unwrap();
        let err = desk.next_question().await.unwrap_err();
        assert!(matches!(
            err,
            DeskError::Validation(ValidationError::MissingVotes(ref missing)) if missing == &vec![6]
        ));
        assert_eq!(api.calls("close_ballot"), 0);
        assert_eq!(desk.current().map(|b| b.id), Some(1));
    }

    #[tokio::test]
    async fn test_failed_vote_keeps_local_mark() {
        let api = FakeApi::new(meeting());
        let (mut desk, _client) = desk_for(&api).await;
        api.fail("cast_vote", status(500, "boom"));

        let err = desk.cast_vote(5, 12).await.unwrap_err();
        assert!(matches!(err, DeskError::Api(_)));
        assert_eq!(desk.session().vote_of(5), Some(12));
    }

    #[tokio::test]
    async fn test_unknown_option_never_reaches_backend() {
        let api = FakeApi::new(meeting());
        let (mut desk, _client) = desk_for(&api).await;

        let err = desk.cast_vote(5, 99).await.unwrap_err();
        assert!(matches!(err, DeskError::Validation(ValidationError::UnknownOption(99))));
        assert_eq!(api.calls("cast_vote"), 0);
        assert_eq!(desk.session().vote_of(5), None);
    }

    #[tokio::test]
    async fn test_failed_close_restores_ballot() {
        let api = FakeApi::new(meeting());
        let (mut desk, _client) = desk_for(&api).await;
        api.fail("close_ballot", status(500, "boom"));

        desk.vote_all(11).await.unwrap();
        assert!(desk.next_question().await.is_err());
        assert!(desk.session().traversal().ballots()[0].is_open());
        assert!(!desk.session().traversal().is_pending_close(1));

        assert!(desk.previous_question().await);
        assert_eq!(desk.current().map(|b| b.id), Some(1));
    }

    #[tokio::test]
    async fn test_ballot_closed_elsewhere_raises_syncing() {
        let api = FakeApi::new(meeting());
        let (mut desk, client) = desk_for(&api).await;

        api.state().ballots.iter_mut().for_each(|b| {
            if b.id == 1 {
                b.status = BallotStatus::Closed;
            }
        });
        client.invalidate_queries(&ballots_key(1));
        desk.sync().await.unwrap();

        assert!(desk.is_syncing());
        assert_eq!(desk.current().map(|b| b.id), Some(2));

        desk.sync().await.unwrap();
        assert!(!desk.is_syncing());
    }

    #[tokio::test]
    async fn test_reopened_ballot_resumes_after_done() {
        let api = FakeApi::new(meeting());
        let (mut desk, _client) = desk_for(&api).await;
        desk.vote_all(11).await.unwrap();
        desk.next_question().await.unwrap();
        desk.vote_all(21).await.unwrap();
        desk.next_question().await.unwrap();
        assert!(desk.session().is_done());
        assert!(desk.tally().is_none());

        desk.reopen_ballot(2).await.unwrap();
        assert_eq!(desk.current().map(|b| b.id), Some(2));
        assert!(desk.options().is_some());
    }

    #[tokio::test]
    async fn test_close_voting_waits_for_pending_ballots() {
        let api = FakeApi::new(meeting());
        let (mut desk, _client) = desk_for(&api).await;

        let err = desk.close_voting().await.unwrap_err();
        assert!(matches!(err, DeskError::Validation(ValidationError::BallotsPending(2))));
        assert_eq!(api.calls("close_voting"), 0);
    }

    #[tokio::test]
    async fn test_quorum_gate_blocks_start() {
        let mut state = meeting();
        state.stats.porcentaje_quorum = 40.0;
        let api = FakeApi::new(state);
        let (mut desk, client) = desk_for(&api).await;
        let now = Utc::now();

        assert!(!desk.can_start_voting(now));
        let err = desk.start_voting(now).await.unwrap_err();
        assert!(matches!(err, DeskError::Validation(ValidationError::QuorumNotReached)));
        assert_eq!(api.calls("start_voting"), 0);

        api.state().stats.porcentaje_quorum = 55.0;
        client.invalidate_queries(&crate::hooks::elections::dashboard_key(1));
        desk.sync().await.unwrap();
        desk.start_voting(now).await.unwrap();
        assert!(desk.voting_open());

        let err = desk.start_voting(now).await.unwrap_err();
        assert!(matches!(err, DeskError::Validation(ValidationError::VotingAlreadyOpen)));
    }

    #[tokio::test]
    async fn test_demo_election_ignores_quorum() {
        let mut state = meeting();
        state.stats.porcentaje_quorum = 0.0;
        if let Some(e) = state.election.as_mut() {
            e.demo = true;
        }
        let api = FakeApi::new(state);
        let (mut desk, _client) = desk_for(&api).await;

        desk.start_voting(Utc::now()).await.unwrap();
        assert_eq!(api.calls("start_voting"), 1);
    }

    #[tokio::test]
    async fn test_forbidden_registry_leaves_cache_empty() {
        let api = FakeApi::new(meeting());
        api.fail("shareholders", status(403, "Forbidden"));
        let (desk, client) = desk_for(&api).await;

        let err = desk.shareholders_error().unwrap();
        assert!(err.is_forbidden());
        assert_eq!(err.status(), Some(403));
        assert!(client.get_raw(&shareholders_key(1, "")).is_none());
        assert!(desk.eligible().is_empty());
    }

    #[tokio::test]
    async fn test_tally_follows_votes() {
        let api = FakeApi::new(meeting());
        let (mut desk, _client) = desk_for(&api).await;

        desk.cast_vote(5, 12).await.unwrap();
        desk.cast_vote(6, 12).await.unwrap();
        desk.sync().await.unwrap();

        let tally = desk.tally().unwrap();
        assert_eq!(tally.leader_id, Some(12));
        assert_eq!(tally.total_votes, 2);
    }

    #[tokio::test]
    async fn test_failed_options_load_recovers_on_sync() {
        let api = FakeApi::new(meeting());
        api.fail("ballot_results", status(500, "boom"));
        let (mut desk, _client) = desk_for(&api).await;
        assert_eq!(desk.current().map(|b| b.id), Some(1));
        assert!(desk.options().is_none());

        api.state().failures.remove("ballot_results");
        desk.sync().await.unwrap();
        assert_eq!(desk.options().map(|o| o.len()), Some(2));
        assert_eq!(api.calls("ballot_results"), 2);

        let err = desk.cast_vote(5, 99).await.unwrap_err();
        assert!(matches!(err, DeskError::Validation(ValidationError::UnknownOption(99))));
    }

    #[tokio::test]
    async fn test_refresh_picks_up_remote_votes_and_attendance() {
        let api = FakeApi::new(meeting());
        let (mut desk, client) = desk_for(&api).await;
        assert_eq!(desk.eligible(), vec![5, 6]);

        {
            let mut state = api.state();
            if let Some(opts) = state.results.get_mut(&1) {
                opts[0].votes = 3;
            }
            state.shareholders[2].attendance_mode = Some(AttendanceMode::Presencial);
        }
        crate::tasks::refresher::refresh_keys(&client, 1);
        desk.sync().await.unwrap();

        assert_eq!(desk.tally().map(|t| t.total_votes), Some(3));
        assert_eq!(desk.eligible(), vec![5, 6, 7]);

        desk.cast_vote(5, 11).await.unwrap();
        desk.cast_vote(6, 11).await.unwrap();
        let err = desk.next_question().await.unwrap_err();
        assert!(matches!(
            err,
            DeskError::Validation(ValidationError::MissingVotes(ref missing)) if missing == &vec![7]
        ));
    }
}
