use futures::FutureExt;

use super::SharedApi;
use crate::cache::{QueryClient, QueryKey};
use crate::models::{Ballot, BallotId, ElectionId, OptionResult, VoteAllRequest, VoteRequest};
use crate::query::{Mutation, QueryOptions, RefetchOnMount};
use crate::query_key;

pub fn ballots_key(election_id: ElectionId) -> QueryKey {
    query_key!["ballots", election_id]
}

pub fn pending_ballots_key(election_id: ElectionId) -> QueryKey {
    query_key!["pending-ballots", election_id]
}

pub fn results_prefix() -> QueryKey {
    query_key!["ballot-results"]
}

pub fn results_key(ballot_id: BallotId) -> QueryKey {
    query_key!["ballot-results", ballot_id]
}

/// The ballot list is refetched on every mount so a registrar never starts
/// from another registrar's stale view.
pub fn ballots_query(api: &SharedApi, election_id: ElectionId) -> QueryOptions<Vec<Ballot>> {
    let api = SharedApi::clone(api);
    QueryOptions::new(ballots_key(election_id), move || {
        let api = SharedApi::clone(&api);
        async move { api.ballots(election_id).await }.boxed()
    })
    .refetch_on_mount(RefetchOnMount::Always)
}

pub fn pending_ballots_query(api: &SharedApi, election_id: ElectionId) -> QueryOptions<Vec<Ballot>> {
    let api = SharedApi::clone(api);
    QueryOptions::new(pending_ballots_key(election_id), move || {
        let api = SharedApi::clone(&api);
        async move { api.pending_ballots(election_id).await }.boxed()
    })
}

pub fn ballot_results_query(
    api: &SharedApi,
    ballot_id: BallotId,
    enabled: bool,
) -> QueryOptions<Vec<OptionResult>> {
    let api = SharedApi::clone(api);
    QueryOptions::new(results_key(ballot_id), move || {
        let api = SharedApi::clone(&api);
        async move { api.ballot_results(ballot_id).await }.boxed()
    })
    .enabled(enabled)
}

pub fn cast_vote(api: &SharedApi, client: &QueryClient, ballot_id: BallotId) -> Mutation<VoteRequest, ()> {
    let api = SharedApi::clone(api);
    Mutation::new(move |vote: VoteRequest| {
        let api = SharedApi::clone(&api);
        async move { api.cast_vote(ballot_id, vote).await }.boxed()
    })
    .invalidates(client, results_key(ballot_id))
}

pub fn vote_all(api: &SharedApi, client: &QueryClient, ballot_id: BallotId) -> Mutation<VoteAllRequest, ()> {
    let api = SharedApi::clone(api);
    Mutation::new(move |vote: VoteAllRequest| {
        let api = SharedApi::clone(&api);
        async move { api.vote_all(ballot_id, vote).await }.boxed()
    })
    .invalidates(client, results_key(ballot_id))
}

pub fn close_ballot(
    api: &SharedApi,
    client: &QueryClient,
    ballot_id: BallotId,
    election_id: ElectionId,
) -> Mutation<(), ()> {
    let api = SharedApi::clone(api);
    Mutation::new(move |_: ()| {
        let api = SharedApi::clone(&api);
        async move { api.close_ballot(ballot_id).await }.boxed()
    })
    .invalidates(client, ballots_key(election_id))
    .invalidates(client, pending_ballots_key(election_id))
}

pub fn reopen_ballot(
    api: &SharedApi,
    client: &QueryClient,
    ballot_id: BallotId,
    election_id: ElectionId,
) -> Mutation<(), ()> {
    let api = SharedApi::clone(api);
    Mutation::new(move |_: ()| {
        let api = SharedApi::clone(&api);
        async move { api.reopen_ballot(ballot_id).await }.boxed()
    })
    .invalidates(client, ballots_key(election_id))
    .invalidates(client, pending_ballots_key(election_id))
}
