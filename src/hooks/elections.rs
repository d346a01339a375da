use futures::FutureExt;

use super::SharedApi;
use crate::cache::{QueryClient, QueryKey};
use crate::models::{DashboardStats, Election, ElectionId};
use crate::query::{Mutation, QueryOptions};
use crate::query_key;

pub fn elections_key() -> QueryKey {
    query_key!["elections"]
}

pub fn election_key(election_id: ElectionId) -> QueryKey {
    query_key!["election", election_id]
}

pub fn dashboard_key(election_id: ElectionId) -> QueryKey {
    query_key!["dashboard", election_id]
}

pub fn elections_query(api: &SharedApi) -> QueryOptions<Vec<Election>> {
    let api = SharedApi::clone(api);
    QueryOptions::new(elections_key(), move || {
        let api = SharedApi::clone(&api);
        async move { api.elections().await }.boxed()
    })
}

pub fn election_query(api: &SharedApi, election_id: ElectionId) -> QueryOptions<Election> {
    let api = SharedApi::clone(api);
    QueryOptions::new(election_key(election_id), move || {
        let api = SharedApi::clone(&api);
        async move { api.election(election_id).await }.boxed()
    })
}

/// Attendance summary, including the current quorum percentage.
pub fn dashboard_query(api: &SharedApi, election_id: ElectionId) -> QueryOptions<DashboardStats> {
    let api = SharedApi::clone(api);
    QueryOptions::new(dashboard_key(election_id), move || {
        let api = SharedApi::clone(&api);
        async move { api.attendance_summary(election_id).await }.boxed()
    })
}

pub fn start_voting(api: &SharedApi, client: &QueryClient, election_id: ElectionId) -> Mutation<(), ()> {
    let api = SharedApi::clone(api);
    Mutation::new(move |_: ()| {
        let api = SharedApi::clone(&api);
        async move { api.start_voting(election_id).await }.boxed()
    })
    .invalidates(client, election_key(election_id))
}

pub fn close_voting(api: &SharedApi, client: &QueryClient, election_id: ElectionId) -> Mutation<(), ()> {
    let api = SharedApi::clone(api);
    Mutation::new(move |_: ()| {
        let api = SharedApi::clone(&api);
        async move { api.close_voting(election_id).await }.boxed()
    })
    .invalidates(client, election_key(election_id))
}

pub fn close_election(api: &SharedApi, client: &QueryClient, election_id: ElectionId) -> Mutation<(), ()> {
    let api = SharedApi::clone(api);
    Mutation::new(move |_: ()| {
        let api = SharedApi::clone(&api);
        async move { api.close_election(election_id).await }.boxed()
    })
    .invalidates(client, elections_key())
    .invalidates(client, election_key(election_id))
}
