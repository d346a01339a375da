//! Live observer channel: pushes quorum summaries, observer rows and ballot
//! status changes straight into the cache.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use reqwest::Url;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::cache::QueryClient;
use crate::hooks::ballots::ballots_key;
use crate::hooks::elections::dashboard_key;
use crate::hooks::observer::observer_key;
use crate::models::{Ballot, DashboardStats, ElectionId, ObserverRow};

/// Maximum consecutive failed connections before the feed gives up.
const MAX_RECONNECT_ATTEMPTS: u32 = 10;

const RECONNECT_BASE_DELAY_SECS: u64 = 2;

const MAX_RECONNECT_DELAY_SECS: u64 = 60;

/// One push frame. Every field is optional; unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct ObserverMessage {
    #[serde(default)]
    pub summary: Option<DashboardStats>,
    #[serde(default)]
    pub rows: Option<Vec<ObserverRow>>,
    #[serde(default)]
    pub ballot: Option<Ballot>,
}

/// `http(s)://host/api` becomes `ws(s)://host/api/elections/{id}/observer/ws`.
pub fn ws_url(base: &Url, election_id: ElectionId, token: Option<&str>) -> Url {
    let mut url = base.clone();
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
    if url.set_scheme(scheme).is_err() {
        warn!("Keeping scheme {} for the observer feed", base.scheme());
    }

    let election = election_id.to_string();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments
            .pop_if_empty()
            .extend(["elections", election.as_str(), "observer", "ws"]);
    }
    // the feed endpoint reads the token from the query string
    if let Some(token) = token {
        url.query_pairs_mut().append_pair("token", token);
    }
    url
}

/// Writes one frame into the cache. Returns false for frames that are not
/// observer messages.
pub fn apply_frame(client: &QueryClient, election_id: ElectionId, text: &str) -> bool {
    let message: ObserverMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            debug!("Ignoring observer frame: {}", e);
            return false;
        }
    };

    if let Some(summary) = message.summary {
        if let Err(e) = client.set_query_data(&dashboard_key(election_id), &summary) {
            error!("Could not store pushed summary: {}", e);
        }
    }
    if let Some(rows) = message.rows {
        if let Err(e) = client.set_query_data(&observer_key(election_id), &rows) {
            error!("Could not store pushed observer rows: {}", e);
        }
    }
    if let Some(ballot) = message.ballot {
        client.update_queries_data(&ballots_key(election_id), |ballots: Vec<Ballot>| {
            ballots
                .into_iter()
                .map(|b| if b.id == ballot.id { ballot.clone() } else { b })
                .collect()
        });
    }
    true
}

fn backoff_delay(attempts: u32) -> Duration {
    let secs = std::cmp::min(
        RECONNECT_BASE_DELAY_SECS.saturating_mul(1 << attempts.min(6)),
        MAX_RECONNECT_DELAY_SECS,
    );
    Duration::from_secs(secs)
}

pub struct ObserverFeed {
    url: String,
    client: QueryClient,
    election_id: ElectionId,
}

impl ObserverFeed {
    pub fn new(url: String, client: QueryClient, election_id: ElectionId) -> Self {
        Self {
            url,
            client,
            election_id,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Reconnects with exponential backoff until too many attempts fail in a
    /// row. A connection that delivered frames resets the count.
    pub async fn run(self) {
        let mut attempts = 0u32;

        loop {
            match self.connect_once().await {
                Ok(frames) => {
                    info!("Observer feed closed after {} frame(s)", frames);
                    if frames > 0 {
                        attempts = 0;
                    }
                }
                Err(e) => warn!("Observer feed error: {}", e),
            }

            attempts += 1;
            if attempts >= MAX_RECONNECT_ATTEMPTS {
                error!(
                    "Observer feed reconnection failed after {} attempts",
                    MAX_RECONNECT_ATTEMPTS
                );
                break;
            }
            tokio::time::sleep(backoff_delay(attempts)).await;
        }
    }

    async fn connect_once(&self) -> Result<usize, tokio_tungstenite::tungstenite::Error> {
        let (stream, _) = connect_async(self.url.as_str()).await?;
        info!("Observer feed connected for election {}", self.election_id);

        let (mut write, mut read) = stream.split();
        let mut frames = 0;
        while let Some(message) = read.next().await {
            match message? {
                Message::Text(text) => {
                    if apply_frame(&self.client, self.election_id, &text) {
                        frames += 1;
                    }
                }
                Message::Ping(data) => write.send(Message::Pong(data)).await?,
                Message::Close(_) => break,
                _ => {}
            }
        }
        Ok(frames)
    }
}
