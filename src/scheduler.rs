//! Pure SRS scheduling: the stage/interval table, the review transition rule
//! and due-queue selection. No I/O, no persistence, deterministic for a given
//! `now`.

use chrono::{Duration, NaiveDateTime};
use lazy_static::lazy_static;
use thiserror::Error;
use validator::{Validate, ValidationErrors};

use crate::model::{
    DueSummary, ItemType, NewReviewSession, NewSrsItem, SrsItem, SubmitReviewRequest,
};

/// Pre-study stage an item is created in at unlock.
pub const LESSON_LEVEL: i32 = 0;
/// Terminal stage; burned items are never queued again.
pub const BURNED_LEVEL: i32 = 9;
/// An incorrect review never drops an item below apprentice_1. Level 0 is
/// reserved for not-yet-started items and is not a valid post-review state.
const INCORRECT_FLOOR: i32 = 1;

lazy_static! {
    /// Interval to wait after *reaching* a level, indexed by destination
    /// level. Fixed design constants, not tunable per item.
    static ref SRS_INTERVALS: [Option<Duration>; 10] = [
        None,                      // 0 lesson
        Some(Duration::hours(4)),  // 1 apprentice_1
        Some(Duration::hours(8)),  // 2 apprentice_2
        Some(Duration::days(1)),   // 3 apprentice_3
        Some(Duration::days(3)),   // 4 apprentice_4
        Some(Duration::weeks(1)),  // 5 guru_1
        Some(Duration::weeks(2)),  // 6 guru_2
        Some(Duration::days(30)),  // 7 master
        Some(Duration::days(120)), // 8 enlightened
        None,                      // 9 burned
    ];
}

/// The ten ordered SRS stages, keyed 0-9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SrsStage {
    Lesson,
    Apprentice1,
    Apprentice2,
    Apprentice3,
    Apprentice4,
    Guru1,
    Guru2,
    Master,
    Enlightened,
    Burned,
}

impl SrsStage {
    pub fn from_level(level: i32) -> Option<SrsStage> {
        match level {
            0 => Some(SrsStage::Lesson),
            1 => Some(SrsStage::Apprentice1),
            2 => Some(SrsStage::Apprentice2),
            3 => Some(SrsStage::Apprentice3),
            4 => Some(SrsStage::Apprentice4),
            5 => Some(SrsStage::Guru1),
            6 => Some(SrsStage::Guru2),
            7 => Some(SrsStage::Master),
            8 => Some(SrsStage::Enlightened),
            9 => Some(SrsStage::Burned),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SrsStage::Lesson => "lesson",
            SrsStage::Apprentice1 => "apprentice_1",
            SrsStage::Apprentice2 => "apprentice_2",
            SrsStage::Apprentice3 => "apprentice_3",
            SrsStage::Apprentice4 => "apprentice_4",
            SrsStage::Guru1 => "guru_1",
            SrsStage::Guru2 => "guru_2",
            SrsStage::Master => "master",
            SrsStage::Enlightened => "enlightened",
            SrsStage::Burned => "burned",
        }
    }
}

/// Interval to the next review after reaching `level`, or `None` for the
/// lesson and burned stages.
pub fn interval_after(level: i32) -> Option<Duration> {
    usize::try_from(level)
        .ok()
        .and_then(|idx| SRS_INTERVALS.get(idx).copied())
        .flatten()
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("srs item is already burned")]
    AlreadyBurned,
    #[error("invalid review input: {0}")]
    InvalidInput(String),
}

impl From<ValidationErrors> for SchedulerError {
    fn from(err: ValidationErrors) -> Self {
        SchedulerError::InvalidInput(err.to_string())
    }
}

/// Result of a single review: how the stage moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    Correct,
    Incorrect,
}

impl From<bool> for ReviewOutcome {
    fn from(is_correct: bool) -> Self {
        if is_correct {
            ReviewOutcome::Correct
        } else {
            ReviewOutcome::Incorrect
        }
    }
}

/// The full output of a review submission: the new item state and the
/// append-only log entry. Produced together or not at all.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewTransition {
    pub updated: SrsItem,
    pub log: NewReviewSession,
}

/// Builds the level-0 record for a freshly unlocked item.
pub fn unlock_item(user_id: i32, item_type: ItemType, item_id: i32) -> NewSrsItem {
    NewSrsItem {
        user_id,
        item_type,
        item_id,
        srs_level: LESSON_LEVEL,
        next_review_at: None,
        last_reviewed_at: None,
        correct_streak: 0,
        total_reviews: 0,
        correct_reviews: 0,
    }
}

/// Applies one review to an item.
///
/// Correct moves the item up one stage (capped at burned, which retires it
/// from the queue); incorrect moves it down one stage with a floor of
/// apprentice_1. First reviews exit the lesson stage either way. Rejects
/// burned items and malformed payloads before computing any state.
pub fn submit_review(
    item: &SrsItem,
    request: &SubmitReviewRequest,
    now: NaiveDateTime,
) -> Result<ReviewTransition, SchedulerError> {
    request.validate()?;
    if item.srs_level >= BURNED_LEVEL {
        return Err(SchedulerError::AlreadyBurned);
    }

    let outcome = ReviewOutcome::from(request.is_correct);
    let (new_level, new_streak) = match outcome {
        ReviewOutcome::Correct => (
            (item.srs_level + 1).min(BURNED_LEVEL),
            item.correct_streak + 1,
        ),
        ReviewOutcome::Incorrect => ((item.srs_level - 1).max(INCORRECT_FLOOR), 0),
    };

    let updated = SrsItem {
        srs_level: new_level,
        next_review_at: interval_after(new_level).map(|interval| now + interval),
        last_reviewed_at: Some(now),
        correct_streak: new_streak,
        total_reviews: item.total_reviews + 1,
        correct_reviews: item.correct_reviews + i32::from(request.is_correct),
        ..item.clone()
    };

    let log = NewReviewSession {
        srs_item_id: item.id,
        is_correct: request.is_correct,
        response_time_ms: request.response_time_ms,
        review_type: request.review_type,
        user_answer: request.user_answer.clone(),
        correct_answer: request.correct_answer.clone(),
        reviewed_at: now,
    };

    Ok(ReviewTransition { updated, log })
}

/// Puts an item back to the lesson stage. Lifetime counters and the review
/// log are retained; this is the only way a burned item re-enters the queue.
pub fn reset_item(item: &SrsItem) -> SrsItem {
    SrsItem {
        srs_level: LESSON_LEVEL,
        next_review_at: None,
        correct_streak: 0,
        ..item.clone()
    }
}

/// True when the item may appear in a review queue at `now`: a review has
/// been scheduled, the moment has passed, and the item is neither still in
/// the lesson stage nor burned.
pub fn is_due(item: &SrsItem, now: NaiveDateTime) -> bool {
    item.srs_level > LESSON_LEVEL
        && item.srs_level < BURNED_LEVEL
        && item.next_review_at.is_some_and(|at| at <= now)
}

/// Selects the due subset, optionally narrowed to one item type, ordered
/// ascending by `next_review_at` with ties broken by id.
pub fn due_items(
    mut items: Vec<SrsItem>,
    now: NaiveDateTime,
    filter: Option<ItemType>,
) -> Vec<SrsItem> {
    items.retain(|item| is_due(item, now) && filter.is_none_or(|t| item.item_type == t));
    items.sort_by_key(|item| (item.next_review_at, item.id));
    items
}

/// Per-category counts over an already-selected due set.
pub fn due_summary(due: &[SrsItem]) -> DueSummary {
    let mut summary = DueSummary::default();
    for item in due {
        match item.item_type {
            ItemType::Vocabulary => summary.vocabulary += 1,
            ItemType::Kanji => summary.kanji += 1,
            ItemType::Grammar => summary.grammar += 1,
        }
        summary.total += 1;
    }
    summary
}
