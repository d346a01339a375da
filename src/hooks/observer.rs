use futures::FutureExt;

use super::SharedApi;
use crate::cache::QueryKey;
use crate::models::{ElectionId, ObserverRow};
use crate::query::QueryOptions;
use crate::query_key;

pub fn observer_key(election_id: ElectionId) -> QueryKey {
    query_key!["observer", election_id]
}

pub fn observer_query(api: &SharedApi, election_id: ElectionId) -> QueryOptions<Vec<ObserverRow>> {
    let api = SharedApi::clone(api);
    QueryOptions::new(observer_key(election_id), move || {
        let api = SharedApi::clone(&api);
        async move { api.observer_rows(election_id).await }.boxed()
    })
}
