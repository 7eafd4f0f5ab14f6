//! Replay of logged records against live mailboxes.
//!
//! Records are applied per mailbox in transaction-id order. A record that
//! the mailbox already reflects is absorbed according to
//! [`IdempotencyPolicy`]; any other failure aborts that mailbox only.
//! Replay is not transactional across records: a pass stopped by
//! cancellation can simply be rerun from [`ReplayReport::resume_from`].

mod cancel;
mod engine;
mod policy;
mod report;

pub use cancel::CancellationToken;
pub use engine::{replay, replay_parallel, replay_with, ReplayEngine};
pub use policy::{Disposition, IdempotencyPolicy};
pub use report::{
    AbortedMailbox, ReplayReport, ReplayState, SegmentFailure, SkipReason, SkippedRecord,
};
