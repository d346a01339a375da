//! REST client for the meeting backend.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::models::{
    Ballot, BallotId, BulkMarkAttendance, DashboardStats, Election, ElectionId, MarkAttendance,
    ObserverRow, OptionResult, Shareholder, VoteAllRequest, VoteRequest,
};

/// The slice of the backend contract the cache and the voting desk rely on.
#[async_trait]
pub trait MeetingApi: Send + Sync {
    async fn elections(&self) -> Result<Vec<Election>, ApiError>;
    async fn election(&self, election_id: ElectionId) -> Result<Election, ApiError>;
    async fn ballots(&self, election_id: ElectionId) -> Result<Vec<Ballot>, ApiError>;
    async fn pending_ballots(&self, election_id: ElectionId) -> Result<Vec<Ballot>, ApiError>;
    async fn ballot_results(&self, ballot_id: BallotId) -> Result<Vec<OptionResult>, ApiError>;
    async fn cast_vote(&self, ballot_id: BallotId, vote: VoteRequest) -> Result<(), ApiError>;
    async fn vote_all(&self, ballot_id: BallotId, vote: VoteAllRequest) -> Result<(), ApiError>;
    async fn close_ballot(&self, ballot_id: BallotId) -> Result<(), ApiError>;
    async fn reopen_ballot(&self, ballot_id: BallotId) -> Result<(), ApiError>;
    async fn attendance_summary(&self, election_id: ElectionId) -> Result<DashboardStats, ApiError>;
    async fn start_voting(&self, election_id: ElectionId) -> Result<(), ApiError>;
    async fn close_voting(&self, election_id: ElectionId) -> Result<(), ApiError>;
    async fn close_election(&self, election_id: ElectionId) -> Result<(), ApiError>;
    async fn shareholders(
        &self,
        election_id: ElectionId,
        search: &str,
    ) -> Result<Vec<Shareholder>, ApiError>;
    async fn mark_attendance(
        &self,
        election_id: ElectionId,
        code: &str,
        payload: MarkAttendance,
    ) -> Result<(), ApiError>;
    async fn bulk_mark_attendance(
        &self,
        election_id: ElectionId,
        payload: BulkMarkAttendance,
    ) -> Result<(), ApiError>;
    async fn observer_rows(&self, election_id: ElectionId) -> Result<Vec<ObserverRow>, ApiError>;
}

/// HTTP implementation of [`MeetingApi`]. Every request carries the bearer
/// token when one is configured.
pub struct ApiClient {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base_url = base_url.into();
        let base = Url::parse(&base_url)
            .map_err(|e| ApiError::Transport(format!("Invalid API URL {}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::Transport(format!("Invalid API URL {}", base_url)));
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(2))
            .build()?;

        Ok(Self { client, base, token })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    // `path` is joined onto the base URL one segment at a time, so callers
    // only format ids into it. Free text goes through endpoint + push.
    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(path.split('/').filter(|s| !s.is_empty()));
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!("{} {}", method, url);
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends the request and turns non-2xx responses into [`ApiError::Status`],
    /// using the body's `detail` or `message` field when present.
    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let fallback = status.canonical_reason().unwrap_or("Request failed").to_string();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            message: error_message(&body).unwrap_or(fallback),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.get_url(self.endpoint(path)).await
    }

    async fn get_url<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let response = self.send(self.request(Method::GET, url)).await?;
        response.json::<T>().await.map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// POST whose response body, if any, is ignored (204 included).
    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: Option<&B>) -> Result<(), ApiError> {
        self.post_url(self.endpoint(path), body).await
    }

    async fn post_url<B: Serialize + ?Sized>(&self, url: Url, body: Option<&B>) -> Result<(), ApiError> {
        let mut builder = self.request(Method::POST, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = self.send(builder).await?;
        if response.status() != StatusCode::NO_CONTENT {
            debug!("{} answered {}", response.url().path(), response.status());
        }
        Ok(())
    }

    fn shareholders_url(&self, election_id: ElectionId, search: &str) -> Url {
        let mut url = self.endpoint(&format!("/elections/{}/shareholders", election_id));
        if !search.is_empty() {
            url.query_pairs_mut().append_pair("search", search);
        }
        url
    }

    fn mark_attendance_url(&self, election_id: ElectionId, code: &str) -> Url {
        let mut url = self.endpoint(&format!("/elections/{}/attendance", election_id));
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(code).push("mark");
        }
        url
    }
}

fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    for field in ["detail", "message"] {
        match value.get(field) {
            Some(serde_json::Value::String(s)) => return Some(s.clone()),
            Some(other) if !other.is_null() => return Some(other.to_string()),
            _ => {}
        }
    }
    Some(value.to_string())
}

#[async_trait]
impl MeetingApi for ApiClient {
    async fn elections(&self) -> Result<Vec<Election>, ApiError> {
        self.get("/elections").await
    }

    async fn election(&self, election_id: ElectionId) -> Result<Election, ApiError> {
        self.get(&format!("/elections/{}", election_id)).await
    }

    async fn ballots(&self, election_id: ElectionId) -> Result<Vec<Ballot>, ApiError> {
        self.get(&format!("/elections/{}/ballots", election_id)).await
    }

    async fn pending_ballots(&self, election_id: ElectionId) -> Result<Vec<Ballot>, ApiError> {
        self.get(&format!("/elections/{}/ballots/pending", election_id)).await
    }

    async fn ballot_results(&self, ballot_id: BallotId) -> Result<Vec<OptionResult>, ApiError> {
        self.get(&format!("/ballots/{}/results", ballot_id)).await
    }

    async fn cast_vote(&self, ballot_id: BallotId, vote: VoteRequest) -> Result<(), ApiError> {
        self.post(&format!("/ballots/{}/vote", ballot_id), Some(&vote)).await
    }

    async fn vote_all(&self, ballot_id: BallotId, vote: VoteAllRequest) -> Result<(), ApiError> {
        self.post(&format!("/ballots/{}/vote-all", ballot_id), Some(&vote)).await
    }

    async fn close_ballot(&self, ballot_id: BallotId) -> Result<(), ApiError> {
        self.post::<()>(&format!("/ballots/{}/close", ballot_id), None).await
    }

    async fn reopen_ballot(&self, ballot_id: BallotId) -> Result<(), ApiError> {
        self.post::<()>(&format!("/ballots/{}/reopen", ballot_id), None).await
    }

    async fn attendance_summary(&self, election_id: ElectionId) -> Result<DashboardStats, ApiError> {
        self.get(&format!("/elections/{}/attendance/summary", election_id)).await
    }

    async fn start_voting(&self, election_id: ElectionId) -> Result<(), ApiError> {
        self.post::<()>(&format!("/elections/{}/start-voting", election_id), None).await
    }

    async fn close_voting(&self, election_id: ElectionId) -> Result<(), ApiError> {
        self.post::<()>(&format!("/elections/{}/close-voting", election_id), None).await
    }

    async fn close_election(&self, election_id: ElectionId) -> Result<(), ApiError> {
        self.post::<()>(&format!("/elections/{}/close", election_id), None).await
    }

    async fn shareholders(
        &self,
        election_id: ElectionId,
        search: &str,
    ) -> Result<Vec<Shareholder>, ApiError> {
        self.get_url(self.shareholders_url(election_id, search)).await
    }

    async fn mark_attendance(
        &self,
        election_id: ElectionId,
        code: &str,
        payload: MarkAttendance,
    ) -> Result<(), ApiError> {
        self.post_url(self.mark_attendance_url(election_id, code), Some(&payload))
            .await
    }

    async fn bulk_mark_attendance(
        &self,
        election_id: ElectionId,
        payload: BulkMarkAttendance,
    ) -> Result<(), ApiError> {
        let path = format!("/elections/{}/attendance/bulk_mark", election_id);
        self.post(&path, Some(&payload)).await
    }

    async fn observer_rows(&self, election_id: ElectionId) -> Result<Vec<ObserverRow>, ApiError> {
        self.get(&format!("/elections/{}/observer", election_id)).await
    }
}
