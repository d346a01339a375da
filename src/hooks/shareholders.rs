use futures::FutureExt;

use super::SharedApi;
use crate::cache::QueryKey;
use crate::models::{ElectionId, Shareholder};
use crate::query::QueryOptions;
use crate::query_key;

/// Prefix shared by every search variant of an election's registry.
pub fn shareholders_prefix(election_id: ElectionId) -> QueryKey {
    query_key!["shareholders", election_id]
}

pub fn shareholders_key(election_id: ElectionId, search: &str) -> QueryKey {
    query_key!["shareholders", election_id, search]
}

pub fn shareholders_query(
    api: &SharedApi,
    election_id: ElectionId,
    search: &str,
) -> QueryOptions<Vec<Shareholder>> {
    let api = SharedApi::clone(api);
    let term = search.to_string();
    QueryOptions::new(shareholders_key(election_id, search), move || {
        let api = SharedApi::clone(&api);
        let term = term.clone();
        async move { api.shareholders(election_id, &term).await }.boxed()
    })
}
