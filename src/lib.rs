//! Client core for running shareholder-meeting votes against the meeting
//! backend: a keyed query cache, query/mutation adapters, and the ballot
//! traversal used by the vote registrar.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod hooks;
pub mod models;
pub mod query;
pub mod tasks;
pub mod voting;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{QueryClient, QueryKey};
pub use error::{ApiError, DeskError, ValidationError};
