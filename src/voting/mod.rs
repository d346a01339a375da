pub mod desk;
pub mod quorum;
pub mod session;
pub mod tally;
pub mod traversal;

pub use desk::VotingDesk;
pub use quorum::{QuorumGate, can_start_voting};
pub use session::{VotingSession, eligible_attendees};
pub use tally::{BallotTally, OptionCount, tally};
pub use traversal::{BallotTraversal, Progress};
