//! Orchestration over a storage backend: look the item up, run the pure
//! transition, persist the result. All timestamps are caller-supplied so
//! every operation is reproducible.

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::model::{
    DueSummary, ItemType, ReviewSession, SrsItem, SubmitReviewRequest, UnlockRequest,
};
use crate::scheduler::{self, SchedulerError, SrsStage};
use crate::storage::{SrsStorage, StorageError};

#[derive(Error, Debug)]
pub enum SrsError {
    #[error("srs item not found")]
    NotFound,
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn stage_label(level: i32) -> &'static str {
    SrsStage::from_level(level).map_or("unknown", |stage| stage.name())
}

/// Updated item state plus the persisted log row for one review.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewResult {
    pub item: SrsItem,
    pub log: ReviewSession,
}

/// The SRS engine over a swappable storage backend.
pub struct SrsEngine<S> {
    storage: S,
}

impl<S: SrsStorage> SrsEngine<S> {
    pub fn new(storage: S) -> Self {
        SrsEngine { storage }
    }

    pub fn storage(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Unlocks a batch of items for a user. Already-unlocked items are
    /// returned as-is.
    pub fn unlock_items(
        &mut self,
        user_id: i32,
        requests: &[UnlockRequest],
    ) -> Result<Vec<SrsItem>, SrsError> {
        let new_items: Vec<_> = requests
            .iter()
            .map(|request| scheduler::unlock_item(user_id, request.item_type, request.item_id))
            .collect();
        let unlocked = self.storage.unlock_items(&new_items)?;
        log::debug!("user {user_id}: {} item(s) unlocked", unlocked.len());
        Ok(unlocked)
    }

    /// Submits one review: validates the payload, applies the transition and
    /// persists the updated item together with the log entry. Nothing is
    /// written when any step fails.
    pub fn submit_review(
        &mut self,
        user_id: i32,
        request: &SubmitReviewRequest,
        now: NaiveDateTime,
    ) -> Result<ReviewResult, SrsError> {
        let item = self
            .storage
            .find_item(user_id, request.srs_item_id)?
            .ok_or(SrsError::NotFound)?;

        let transition = scheduler::submit_review(&item, request, now)?;
        let log = self.storage.save_review(&transition.updated, &transition.log)?;
        log::debug!(
            "user {user_id}: srs item {} {} -> {}",
            item.id,
            stage_label(item.srs_level),
            stage_label(transition.updated.srs_level)
        );
        Ok(ReviewResult {
            item: transition.updated,
            log,
        })
    }

    /// The review queue at `now`, oldest-due first, optionally narrowed to
    /// one item type.
    pub fn due_queue(
        &mut self,
        user_id: i32,
        now: NaiveDateTime,
        filter: Option<ItemType>,
    ) -> Result<Vec<SrsItem>, SrsError> {
        let candidates = self.storage.due_candidates(user_id, now)?;
        Ok(scheduler::due_items(candidates, now, filter))
    }

    /// Per-category due counts for the dashboard.
    pub fn due_counts(&mut self, user_id: i32, now: NaiveDateTime) -> Result<DueSummary, SrsError> {
        let due = self.due_queue(user_id, now, None)?;
        Ok(scheduler::due_summary(&due))
    }

    /// User-initiated reset back to the lesson stage. Review history and
    /// lifetime counters are kept.
    pub fn reset_item(&mut self, user_id: i32, srs_item_id: i32) -> Result<SrsItem, SrsError> {
        let item = self
            .storage
            .find_item(user_id, srs_item_id)?
            .ok_or(SrsError::NotFound)?;
        let reset = scheduler::reset_item(&item);
        self.storage.save_item(&reset)?;
        log::debug!(
            "user {user_id}: srs item {srs_item_id} reset from {} to lesson",
            stage_label(item.srs_level)
        );
        Ok(reset)
    }

    /// Append-only review log for one of the user's items, oldest first.
    pub fn review_history(
        &mut self,
        user_id: i32,
        srs_item_id: i32,
    ) -> Result<Vec<ReviewSession>, SrsError> {
        self.storage
            .find_item(user_id, srs_item_id)?
            .ok_or(SrsError::NotFound)?;
        Ok(self.storage.review_history(srs_item_id)?)
    }
}
