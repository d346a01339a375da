//! Cache keys and query/mutation builders for each backend resource.
//!
//! Keys follow one scheme so that mutations can invalidate by prefix:
//! `["elections"]`, `["election", id]`, `["ballots", id]`,
//! `["pending-ballots", id]`, `["ballot-results", ballot]`,
//! `["shareholders", id, search]`, `["dashboard", id]`, `["observer", id]`.

pub mod attendance;
pub mod ballots;
pub mod elections;
pub mod observer;
pub mod shareholders;

use std::sync::Arc;

use crate::api::MeetingApi;

pub type SharedApi = Arc<dyn MeetingApi>;
