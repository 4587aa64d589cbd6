//! Spaced-repetition scheduling for a Japanese-learning tracker.
//!
//! The pure rules live in [`scheduler`]; [`storage`] provides swappable
//! persistence backends (in-memory and diesel/SQLite); [`engine`] ties the
//! two into the operations an HTTP layer calls: unlock, submit review, due
//! queue, due counts, reset and history.

pub mod engine;
pub mod model;
pub mod scheduler;
pub mod schema;
pub mod storage;

pub use engine::{ReviewResult, SrsEngine, SrsError};
pub use model::{
    DueSummary, ItemType, NewReviewSession, NewSrsItem, ReviewSession, ReviewType, SrsItem,
    SubmitReviewRequest, UnlockRequest,
};
pub use scheduler::{ReviewOutcome, ReviewTransition, SchedulerError, SrsStage};
pub use storage::{DatabaseStorage, DbPool, MemStorage, SrsStorage, StorageError};
