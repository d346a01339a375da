pub mod observer_feed;
pub mod refresher;
