//! Persistence backends for SRS state: an in-memory store for tests and
//! lightweight callers, and a diesel/SQLite store for production. The
//! scheduler itself stays storage-agnostic; both backends implement the same
//! `SrsStorage` contract, including the optimistic-concurrency guard on
//! review writes.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_types::Integer;
use thiserror::Error;

use crate::model::{NewReviewSession, NewSrsItem, ReviewSession, SrsItem};
use crate::scheduler::{BURNED_LEVEL, LESSON_LEVEL};
use crate::schema::{review_sessions, srs_items};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error")]
    Database(#[from] diesel::result::Error),
    #[error("connection pool error")]
    Pool(#[from] r2d2::Error),
    #[error("concurrent update on srs item {0}")]
    ConcurrentUpdate(i32),
}

/// Durable operations the engine needs. Two concurrent `save_review` calls
/// for the same item must not both succeed against the same prior state;
/// backends enforce that with a compare-and-swap on `total_reviews`.
pub trait SrsStorage {
    /// Idempotent batch insert: existing rows for a requested
    /// (user, item_type, item_id) triple are returned untouched.
    fn unlock_items(&mut self, new_items: &[NewSrsItem]) -> Result<Vec<SrsItem>, StorageError>;

    /// Looks up one item, scoped to the owning user.
    fn find_item(&mut self, user_id: i32, srs_item_id: i32)
    -> Result<Option<SrsItem>, StorageError>;

    fn items_for_user(&mut self, user_id: i32) -> Result<Vec<SrsItem>, StorageError>;

    /// Pre-filtered due candidates (levels 1-8, review moment passed). The
    /// pure scheduler still applies the authoritative predicate and ordering.
    fn due_candidates(
        &mut self,
        user_id: i32,
        now: NaiveDateTime,
    ) -> Result<Vec<SrsItem>, StorageError>;

    /// Persists one review transition atomically: the item update (guarded
    /// against lost updates) and the appended log row, or neither.
    fn save_review(
        &mut self,
        updated: &SrsItem,
        log: &NewReviewSession,
    ) -> Result<ReviewSession, StorageError>;

    /// Unguarded item write, used by reset.
    fn save_item(&mut self, item: &SrsItem) -> Result<(), StorageError>;

    /// Append-only review log for one item, oldest first.
    fn review_history(&mut self, srs_item_id: i32) -> Result<Vec<ReviewSession>, StorageError>;
}

/// HashMap-backed storage with the same semantics as the database backend.
#[derive(Debug, Default)]
pub struct MemStorage {
    items: HashMap<i32, SrsItem>,
    sessions: Vec<ReviewSession>,
    next_item_id: i32,
    next_session_id: i32,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn existing(&self, new_item: &NewSrsItem) -> Option<SrsItem> {
        self.items
            .values()
            .find(|item| {
                item.user_id == new_item.user_id
                    && item.item_type == new_item.item_type
                    && item.item_id == new_item.item_id
            })
            .cloned()
    }
}

impl SrsStorage for MemStorage {
    fn unlock_items(&mut self, new_items: &[NewSrsItem]) -> Result<Vec<SrsItem>, StorageError> {
        let mut unlocked = Vec::with_capacity(new_items.len());
        for new_item in new_items {
            if let Some(existing) = self.existing(new_item) {
                unlocked.push(existing);
                continue;
            }
            self.next_item_id += 1;
            let item = SrsItem {
                id: self.next_item_id,
                user_id: new_item.user_id,
                item_type: new_item.item_type,
                item_id: new_item.item_id,
                srs_level: new_item.srs_level,
                next_review_at: new_item.next_review_at,
                last_reviewed_at: new_item.last_reviewed_at,
                correct_streak: new_item.correct_streak,
                total_reviews: new_item.total_reviews,
                correct_reviews: new_item.correct_reviews,
            };
            self.items.insert(item.id, item.clone());
            unlocked.push(item);
        }
        Ok(unlocked)
    }

    fn find_item(
        &mut self,
        user_id: i32,
        srs_item_id: i32,
    ) -> Result<Option<SrsItem>, StorageError> {
        Ok(self
            .items
            .get(&srs_item_id)
            .filter(|item| item.user_id == user_id)
            .cloned())
    }

    fn items_for_user(&mut self, user_id: i32) -> Result<Vec<SrsItem>, StorageError> {
        let mut items: Vec<SrsItem> = self
            .items
            .values()
            .filter(|item| item.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.id);
        Ok(items)
    }

    fn due_candidates(
        &mut self,
        user_id: i32,
        now: NaiveDateTime,
    ) -> Result<Vec<SrsItem>, StorageError> {
        let mut items: Vec<SrsItem> = self
            .items
            .values()
            .filter(|item| {
                item.user_id == user_id
                    && item.srs_level > LESSON_LEVEL
                    && item.srs_level < BURNED_LEVEL
                    && item.next_review_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();
        items.sort_by_key(|item| (item.next_review_at, item.id));
        Ok(items)
    }

    fn save_review(
        &mut self,
        updated: &SrsItem,
        log: &NewReviewSession,
    ) -> Result<ReviewSession, StorageError> {
        let matches_prior = self
            .items
            .get(&updated.id)
            .is_some_and(|current| current.total_reviews == updated.total_reviews - 1);
        if !matches_prior {
            return Err(StorageError::ConcurrentUpdate(updated.id));
        }

        self.items.insert(updated.id, updated.clone());
        self.next_session_id += 1;
        let session = ReviewSession {
            id: self.next_session_id,
            srs_item_id: log.srs_item_id,
            is_correct: log.is_correct,
            response_time_ms: log.response_time_ms,
            review_type: log.review_type,
            user_answer: log.user_answer.clone(),
            correct_answer: log.correct_answer.clone(),
            reviewed_at: log.reviewed_at,
        };
        self.sessions.push(session.clone());
        Ok(session)
    }

    fn save_item(&mut self, item: &SrsItem) -> Result<(), StorageError> {
        self.items.insert(item.id, item.clone());
        Ok(())
    }

    fn review_history(&mut self, srs_item_id: i32) -> Result<Vec<ReviewSession>, StorageError> {
        let mut sessions: Vec<ReviewSession> = self
            .sessions
            .iter()
            .filter(|session| session.srs_item_id == srs_item_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|session| (session.reviewed_at, session.id));
        Ok(sessions)
    }
}

/// Reads the connection URL from the environment, `.env`-aware.
pub fn database_url() -> String {
    dotenv::dotenv().ok();
    std::env::var("DATABASE_URL").unwrap_or_else(|_| "srs.db".into())
}

pub fn establish_pool(database_url: &str) -> Result<DbPool, r2d2::Error> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    Pool::builder().build(manager)
}

/// Diesel/SQLite-backed storage.
pub struct DatabaseStorage {
    pool: DbPool,
}

impl DatabaseStorage {
    pub fn new(pool: DbPool) -> Self {
        DatabaseStorage { pool }
    }

    pub fn from_env() -> Result<Self, r2d2::Error> {
        Ok(DatabaseStorage::new(establish_pool(&database_url())?))
    }
}

impl SrsStorage for DatabaseStorage {
    fn unlock_items(&mut self, new_items: &[NewSrsItem]) -> Result<Vec<SrsItem>, StorageError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, StorageError, _>(|conn| {
            let mut unlocked = Vec::with_capacity(new_items.len());
            for new_item in new_items {
                diesel::insert_into(srs_items::table)
                    .values(new_item)
                    .on_conflict((
                        srs_items::user_id,
                        srs_items::item_type,
                        srs_items::item_id,
                    ))
                    .do_nothing()
                    .execute(conn)?;

                let item = srs_items::table
                    .filter(srs_items::user_id.eq(new_item.user_id))
                    .filter(srs_items::item_type.eq(new_item.item_type))
                    .filter(srs_items::item_id.eq(new_item.item_id))
                    .first::<SrsItem>(conn)?;
                unlocked.push(item);
            }
            Ok(unlocked)
        })
    }

    fn find_item(
        &mut self,
        user_id: i32,
        srs_item_id: i32,
    ) -> Result<Option<SrsItem>, StorageError> {
        let mut conn = self.pool.get()?;
        Ok(srs_items::table
            .filter(srs_items::id.eq(srs_item_id))
            .filter(srs_items::user_id.eq(user_id))
            .first::<SrsItem>(&mut conn)
            .optional()?)
    }

    fn items_for_user(&mut self, user_id: i32) -> Result<Vec<SrsItem>, StorageError> {
        let mut conn = self.pool.get()?;
        Ok(srs_items::table
            .filter(srs_items::user_id.eq(user_id))
            .order(srs_items::id.asc())
            .load(&mut conn)?)
    }

    fn due_candidates(
        &mut self,
        user_id: i32,
        now: NaiveDateTime,
    ) -> Result<Vec<SrsItem>, StorageError> {
        let mut conn = self.pool.get()?;
        Ok(srs_items::table
            .filter(srs_items::user_id.eq(user_id))
            .filter(srs_items::srs_level.gt(LESSON_LEVEL))
            .filter(srs_items::srs_level.lt(BURNED_LEVEL))
            .filter(srs_items::next_review_at.le(now))
            .order((srs_items::next_review_at.asc(), srs_items::id.asc()))
            .load(&mut conn)?)
    }

    fn save_review(
        &mut self,
        updated: &SrsItem,
        log: &NewReviewSession,
    ) -> Result<ReviewSession, StorageError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, StorageError, _>(|conn| {
            // Compare-and-swap on the pre-transition counter so two parallel
            // submissions against the same prior state cannot both land.
            let changed = diesel::update(
                srs_items::table
                    .filter(srs_items::id.eq(updated.id))
                    .filter(srs_items::total_reviews.eq(updated.total_reviews - 1)),
            )
            .set(updated)
            .execute(conn)?;
            if changed == 0 {
                return Err(StorageError::ConcurrentUpdate(updated.id));
            }

            diesel::insert_into(review_sessions::table)
                .values(log)
                .execute(conn)?;
            let session_id = diesel::select(diesel::dsl::sql::<Integer>("last_insert_rowid()"))
                .get_result::<i32>(conn)?;
            Ok(review_sessions::table.find(session_id).first(conn)?)
        })
    }

    fn save_item(&mut self, item: &SrsItem) -> Result<(), StorageError> {
        let mut conn = self.pool.get()?;
        let changed = diesel::update(srs_items::table.filter(srs_items::id.eq(item.id)))
            .set(item)
            .execute(&mut conn)?;
        if changed == 0 {
            log::warn!("save_item touched no rows for srs item {}", item.id);
        }
        Ok(())
    }

    fn review_history(&mut self, srs_item_id: i32) -> Result<Vec<ReviewSession>, StorageError> {
        let mut conn = self.pool.get()?;
        Ok(review_sessions::table
            .filter(review_sessions::srs_item_id.eq(srs_item_id))
            .order((review_sessions::reviewed_at.asc(), review_sessions::id.asc()))
            .load(&mut conn)?)
    }
}
