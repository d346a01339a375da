use std::time::Duration;

use log::{debug, info};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};

use crate::cache::QueryClient;
use crate::hooks::ballots::{ballots_key, pending_ballots_key, results_prefix};
use crate::hooks::elections::{dashboard_key, election_key};
use crate::hooks::observer::observer_key;
use crate::hooks::shareholders::shareholders_prefix;
use crate::models::ElectionId;

/// Keys that go stale on their own while a meeting runs: other registrars
/// close ballots, cast votes and mark attendance.
pub fn refresh_keys(client: &QueryClient, election_id: ElectionId) {
    client.invalidate_queries(&election_key(election_id));
    client.invalidate_queries(&ballots_key(election_id));
    client.invalidate_queries(&pending_ballots_key(election_id));
    client.invalidate_queries(&dashboard_key(election_id));
    client.invalidate_queries(&observer_key(election_id));
    client.invalidate_queries(&shareholders_prefix(election_id));
    // results are keyed by ballot, not election; only mounted tallies refetch
    client.invalidate_queries(&results_prefix());
}

/// Invalidates the live keys every `period` and pings `ticks` so the owner
/// of the mounted queries can sync. Ends when the receiver is dropped.
pub async fn refresh_task(
    client: QueryClient,
    election_id: ElectionId,
    period: Duration,
    ticks: mpsc::Sender<()>,
) {
    info!(
        "Refreshing election {} every {}s",
        election_id,
        period.as_secs()
    );
    let mut interval = interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        debug!("Refresh tick for election {}", election_id);
        refresh_keys(&client, election_id);

        if ticks.send(()).await.is_err() {
            info!("Refresh receiver closed; stopping");
            break;
        }
    }
}
