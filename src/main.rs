use std::sync::Arc;

use chrono::Utc;
use log::{error, info, warn};
use tokio::sync::mpsc;

use meeting_vote::api::ApiClient;
use meeting_vote::cache::QueryClient;
use meeting_vote::config::Config;
use meeting_vote::hooks::SharedApi;
use meeting_vote::tasks::observer_feed::{ObserverFeed, ws_url};
use meeting_vote::tasks::refresher::refresh_task;
use meeting_vote::voting::VotingDesk;

// Registrar console: follows one election and reports where voting stands.
fn report(desk: &VotingDesk) {
    let now = Utc::now();
    match desk.gate() {
        Some(gate) => info!(
            "Quorum {:.2}% (minimum {:.2}%), voting {}, can start: {}",
            gate.quorum,
            gate.min_quorum,
            if gate.voting_open { "open" } else { "closed" },
            desk.can_start_voting(now)
        ),
        None => warn!("Election {} not loaded yet", desk.election_id()),
    }
    if let Some(election) = desk.election() {
        info!(
            "{}: registration {}",
            election.name,
            if election.is_registration_open(now) { "open" } else { "closed" }
        );
    }

    let progress = desk.session().progress();
    match desk.current() {
        Some(ballot) => info!(
            "Question {} of {}: {} ({} answered)",
            progress.position, progress.total, ballot.title, progress.answered
        ),
        None if desk.session().is_done() => info!("All {} question(s) answered", progress.total),
        None => info!("No ballots yet"),
    }
    if desk.is_syncing() {
        warn!("Current ballot was closed by another registrar");
    }

    if let Some(tally) = desk.tally() {
        for line in tally.summary.lines().filter(|l| !l.is_empty()) {
            info!("  {}", line);
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };

    let api = match ApiClient::new(&config.api_url, config.api_token.clone(), config.request_timeout) {
        Ok(api) => api,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            return;
        }
    };
    let feed_url = ws_url(api.base(), config.election_id, api.token()).to_string();
    let api: SharedApi = Arc::new(api);
    let client = QueryClient::new();

    info!("Following election {} at {}", config.election_id, config.api_url);
    let mut desk = VotingDesk::mount(Arc::clone(&api), &client, config.election_id).await;
    if let Some(e) = desk.election_error() {
        error!("Could not load election {}: {}", config.election_id, e);
    }
    if let Some(e) = desk.shareholders_error() {
        if e.is_forbidden() {
            warn!("Not permitted to read the shareholder registry");
        }
    }
    report(&desk);

    let (tick_tx, mut ticks) = mpsc::channel(1);
    let refresher = tokio::spawn(refresh_task(
        client.clone(),
        config.election_id,
        config.refresh_interval,
        tick_tx,
    ));
    let feed = config
        .observer_feed
        .then(|| ObserverFeed::new(feed_url, client.clone(), config.election_id).spawn());

    loop {
        tokio::select! {
            tick = ticks.recv() => {
                if tick.is_none() {
                    break;
                }
                if let Err(e) = desk.sync().await {
                    warn!("Refresh failed: {}", e);
                }
                report(&desk);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    refresher.abort();
    if let Some(feed) = feed {
        feed.abort();
    }
}
