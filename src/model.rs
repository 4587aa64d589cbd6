use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use diesel::{AsChangeset, Identifiable, Insertable, Queryable, Selectable};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::schema::{review_sessions, srs_items};

/// Content category an SRS item belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Vocabulary,
    Kanji,
    Grammar,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Vocabulary => "vocabulary",
            ItemType::Kanji => "kanji",
            ItemType::Grammar => "grammar",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vocabulary" => Ok(ItemType::Vocabulary),
            "kanji" => Ok(ItemType::Kanji),
            "grammar" => Ok(ItemType::Grammar),
            other => Err(format!("unknown item type: {other}")),
        }
    }
}

impl ToSql<Text, Sqlite> for ItemType {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str());
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Sqlite> for ItemType {
    fn from_sql(bytes: <Sqlite as diesel::backend::Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        s.parse().map_err(Into::into)
    }
}

/// What was being quizzed in a single review attempt.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum ReviewType {
    Meaning,
    Reading,
    Audio,
}

impl ReviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewType::Meaning => "meaning",
            ReviewType::Reading => "reading",
            ReviewType::Audio => "audio",
        }
    }
}

impl fmt::Display for ReviewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meaning" => Ok(ReviewType::Meaning),
            "reading" => Ok(ReviewType::Reading),
            "audio" => Ok(ReviewType::Audio),
            other => Err(format!("unknown review type: {other}")),
        }
    }
}

impl ToSql<Text, Sqlite> for ReviewType {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str());
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Sqlite> for ReviewType {
    fn from_sql(bytes: <Sqlite as diesel::backend::Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        s.parse().map_err(Into::into)
    }
}

/// Per-user scheduling state for one learning item.
///
/// One row per (user_id, item_type, item_id). Created at unlock, mutated only
/// by review submission or reset, never deleted.
#[derive(
    Debug, Clone, PartialEq, Serialize, Queryable, Selectable, Identifiable, AsChangeset,
)]
#[diesel(table_name = srs_items)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SrsItem {
    pub id: i32,
    pub user_id: i32,
    pub item_type: ItemType,
    pub item_id: i32,
    pub srs_level: i32,
    pub next_review_at: Option<NaiveDateTime>,
    pub last_reviewed_at: Option<NaiveDateTime>,
    pub correct_streak: i32,
    pub total_reviews: i32,
    pub correct_reviews: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Insertable)]
#[diesel(table_name = srs_items)]
pub struct NewSrsItem {
    pub user_id: i32,
    pub item_type: ItemType,
    pub item_id: i32,
    pub srs_level: i32,
    pub next_review_at: Option<NaiveDateTime>,
    pub last_reviewed_at: Option<NaiveDateTime>,
    pub correct_streak: i32,
    pub total_reviews: i32,
    pub correct_reviews: i32,
}

/// Append-only log row for a single review attempt. Never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = review_sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReviewSession {
    pub id: i32,
    pub srs_item_id: i32,
    pub is_correct: bool,
    pub response_time_ms: Option<i32>,
    pub review_type: ReviewType,
    pub user_answer: String,
    pub correct_answer: String,
    pub reviewed_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Insertable)]
#[diesel(table_name = review_sessions)]
pub struct NewReviewSession {
    pub srs_item_id: i32,
    pub is_correct: bool,
    pub response_time_ms: Option<i32>,
    pub review_type: ReviewType,
    pub user_answer: String,
    pub correct_answer: String,
    pub reviewed_at: NaiveDateTime,
}

/// Review submission payload. All fields required except `response_time_ms`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitReviewRequest {
    pub srs_item_id: i32,
    pub is_correct: bool,
    pub response_time_ms: Option<i32>,
    pub review_type: ReviewType,
    #[validate(length(min = 1, message = "user answer must not be empty"))]
    pub user_answer: String,
    #[validate(length(min = 1, message = "correct answer must not be empty"))]
    pub correct_answer: String,
}

/// One element of a batched unlock request.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct UnlockRequest {
    pub item_type: ItemType,
    pub item_id: i32,
}

/// Per-category due counts for the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DueSummary {
    pub vocabulary: usize,
    pub kanji: usize,
    pub grammar: usize,
    pub total: usize,
}
