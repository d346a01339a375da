use futures::FutureExt;

use super::SharedApi;
use super::elections::dashboard_key;
use super::observer::observer_key;
use super::shareholders::shareholders_prefix;
use crate::cache::QueryClient;
use crate::models::{AttendanceMode, BulkMarkAttendance, ElectionId, MarkAttendance, Shareholder};
use crate::query::Mutation;

const FORBIDDEN_MESSAGE: &str = "attendance registration is not enabled";

/// Optimistically sets `mode` on every cached registry row whose code is in
/// `codes`, across all search variants of the election.
pub fn apply_attendance(client: &QueryClient, election_id: ElectionId, codes: &[String], mode: AttendanceMode) {
    client.update_queries_data(&shareholders_prefix(election_id), |rows: Vec<Shareholder>| {
        rows.into_iter()
            .map(|mut row| {
                if codes.contains(&row.code) {
                    row.attendance_mode = Some(mode);
                }
                row
            })
            .collect()
    });
}

fn with_attendance_hooks<V>(
    mutation: Mutation<V, ()>,
    client: &QueryClient,
    election_id: ElectionId,
) -> Mutation<V, ()> {
    let refresh = client.clone();
    mutation
        .map_error(|e| e.with_forbidden_message(FORBIDDEN_MESSAGE))
        .invalidates(client, shareholders_prefix(election_id))
        .invalidates(client, dashboard_key(election_id))
        .invalidates(client, observer_key(election_id))
        // the optimistic patch must not outlive a rejected request
        .on_error(move |_| refresh.invalidate_queries(&shareholders_prefix(election_id)))
}

pub fn mark_attendance(
    api: &SharedApi,
    client: &QueryClient,
    election_id: ElectionId,
) -> Mutation<(String, MarkAttendance), ()> {
    let api = SharedApi::clone(api);
    let patch = client.clone();
    let mutation = Mutation::new(move |(code, payload): (String, MarkAttendance)| {
        let api = SharedApi::clone(&api);
        async move { api.mark_attendance(election_id, &code, payload).await }.boxed()
    })
    .on_mutate(move |(code, payload)| {
        apply_attendance(&patch, election_id, std::slice::from_ref(code), payload.mode)
    });
    with_attendance_hooks(mutation, client, election_id)
}

pub fn bulk_mark_attendance(
    api: &SharedApi,
    client: &QueryClient,
    election_id: ElectionId,
) -> Mutation<BulkMarkAttendance, ()> {
    let api = SharedApi::clone(api);
    let patch = client.clone();
    let mutation = Mutation::new(move |payload: BulkMarkAttendance| {
        let api = SharedApi::clone(&api);
        async move { api.bulk_mark_attendance(election_id, payload).await }.boxed()
    })
    .on_mutate(move |payload| apply_attendance(&patch, election_id, &payload.codes, payload.mode));
    with_attendance_hooks(mutation, client, election_id)
}
