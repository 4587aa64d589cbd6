use chrono::{Duration, NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};

use nihongo_srs::{
    DatabaseStorage, ItemType, ReviewType, SchedulerError, SrsEngine, SrsError, SrsStorage,
    StorageError, SubmitReviewRequest, UnlockRequest,
};

const SRS_ITEMS_DDL: &str = "
    CREATE TABLE srs_items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        item_type TEXT NOT NULL,
        item_id INTEGER NOT NULL,
        srs_level INTEGER NOT NULL DEFAULT 0,
        next_review_at TIMESTAMP,
        last_reviewed_at TIMESTAMP,
        correct_streak INTEGER NOT NULL DEFAULT 0,
        total_reviews INTEGER NOT NULL DEFAULT 0,
        correct_reviews INTEGER NOT NULL DEFAULT 0,
        UNIQUE (user_id, item_type, item_id)
    )";

const REVIEW_SESSIONS_DDL: &str = "
    CREATE TABLE review_sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        srs_item_id INTEGER NOT NULL REFERENCES srs_items (id),
        is_correct BOOLEAN NOT NULL,
        response_time_ms INTEGER,
        review_type TEXT NOT NULL,
        user_answer TEXT NOT NULL,
        correct_answer TEXT NOT NULL,
        reviewed_at TIMESTAMP NOT NULL
    )";

// A single-connection pool keeps every call on the same in-memory database.
fn storage() -> DatabaseStorage {
    let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    {
        let mut conn = pool.get().unwrap();
        diesel::sql_query(SRS_ITEMS_DDL).execute(&mut conn).unwrap();
        diesel::sql_query(REVIEW_SESSIONS_DDL)
            .execute(&mut conn)
            .unwrap();
    }
    DatabaseStorage::new(pool)
}

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 1)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
}

fn review(srs_item_id: i32, is_correct: bool) -> SubmitReviewRequest {
    SubmitReviewRequest {
        srs_item_id,
        is_correct,
        response_time_ms: Some(3100),
        review_type: ReviewType::Reading,
        user_answer: "かんじ".to_string(),
        correct_answer: "かんじ".to_string(),
    }
}

#[test]
fn database_full_review_cycle() {
    let mut engine = SrsEngine::new(storage());

    let requests = [
        UnlockRequest {
            item_type: ItemType::Vocabulary,
            item_id: 500,
        },
        UnlockRequest {
            item_type: ItemType::Kanji,
            item_id: 7,
        },
    ];
    let unlocked = engine.unlock_items(1, &requests).unwrap();
    assert_eq!(unlocked.len(), 2);
    assert!(unlocked.iter().all(|item| item.srs_level == 0));
    assert!(unlocked.iter().all(|item| item.next_review_at.is_none()));

    // Re-unlocking is a no-op that returns the existing rows.
    let again = engine.unlock_items(1, &requests).unwrap();
    assert_eq!(unlocked, again);

    // First exposure: kanji missed, vocabulary answered correctly.
    let vocab_id = unlocked[0].id;
    let kanji_id = unlocked[1].id;
    let missed = engine
        .submit_review(1, &review(kanji_id, false), t0())
        .unwrap();
    assert_eq!(missed.item.srs_level, 1);
    assert_eq!(missed.item.next_review_at, Some(t0() + Duration::hours(4)));
    let passed = engine
        .submit_review(1, &review(vocab_id, true), t0() + Duration::minutes(5))
        .unwrap();
    assert_eq!(passed.item.srs_level, 1);

    // Both come due 4 hours after their respective reviews, kanji first.
    let due = engine
        .due_queue(1, t0() + Duration::hours(5), None)
        .unwrap();
    let ids: Vec<i32> = due.iter().map(|item| item.id).collect();
    assert_eq!(ids, vec![kanji_id, vocab_id]);

    let summary = engine.due_counts(1, t0() + Duration::hours(5)).unwrap();
    assert_eq!(summary.vocabulary, 1);
    assert_eq!(summary.kanji, 1);
    assert_eq!(summary.grammar, 0);
    assert_eq!(summary.total, 2);

    // Enum columns survive the round trip through the Text mapping.
    let reloaded = engine.storage().find_item(1, kanji_id).unwrap().unwrap();
    assert_eq!(reloaded.item_type, ItemType::Kanji);

    let history = engine.review_history(1, kanji_id).unwrap();
    assert_eq!(history.len(), 1);
    assert!(!history[0].is_correct);
    assert_eq!(history[0].review_type, ReviewType::Reading);
    assert_eq!(history[0].user_answer, "かんじ");
}

#[test]
fn database_drives_item_to_burned() {
    let mut engine = SrsEngine::new(storage());
    let unlocked = engine
        .unlock_items(
            1,
            &[UnlockRequest {
                item_type: ItemType::Grammar,
                item_id: 42,
            }],
        )
        .unwrap();
    let id = unlocked[0].id;

    let mut clock = t0();
    for _ in 0..9 {
        clock += Duration::days(200);
        engine.submit_review(1, &review(id, true), clock).unwrap();
    }

    let burned = engine.storage().find_item(1, id).unwrap().unwrap();
    assert_eq!(burned.srs_level, 9);
    assert_eq!(burned.next_review_at, None);
    assert_eq!(burned.total_reviews, 9);
    assert_eq!(burned.correct_reviews, 9);

    match engine.submit_review(1, &review(id, true), clock) {
        Err(SrsError::Scheduler(SchedulerError::AlreadyBurned)) => {}
        other => panic!("expected AlreadyBurned, got {other:?}"),
    }
    assert!(
        engine
            .due_queue(1, clock + Duration::days(5000), None)
            .unwrap()
            .is_empty()
    );
    assert_eq!(engine.review_history(1, id).unwrap().len(), 9);

    let reset = engine.reset_item(1, id).unwrap();
    assert_eq!(reset.srs_level, 0);
    assert_eq!(reset.next_review_at, None);
    assert_eq!(reset.total_reviews, 9);
}

#[test]
fn database_rejects_stale_review_writes() {
    let mut storage = storage();
    let unlocked = storage
        .unlock_items(&[nihongo_srs::scheduler::unlock_item(
            1,
            ItemType::Vocabulary,
            500,
        )])
        .unwrap();
    let item = unlocked[0].clone();

    let transition =
        nihongo_srs::scheduler::submit_review(&item, &review(item.id, true), t0()).unwrap();
    storage
        .save_review(&transition.updated, &transition.log)
        .unwrap();

    // Replaying the same transition means the guard on the prior counter
    // misses; nothing is appended for the losing write.
    match storage.save_review(&transition.updated, &transition.log) {
        Err(StorageError::ConcurrentUpdate(id)) => assert_eq!(id, item.id),
        other => panic!("expected ConcurrentUpdate, got {other:?}"),
    }
    assert_eq!(storage.review_history(item.id).unwrap().len(), 1);
}

#[test]
fn submit_payload_contract() {
    // All fields required except response_time_ms.
    let full: SubmitReviewRequest = serde_json::from_value(serde_json::json!({
        "srs_item_id": 3,
        "is_correct": true,
        "response_time_ms": null,
        "review_type": "audio",
        "user_answer": "すし",
        "correct_answer": "すし"
    }))
    .unwrap();
    assert_eq!(full.review_type, ReviewType::Audio);
    assert_eq!(full.response_time_ms, None);

    let missing_type = serde_json::from_value::<SubmitReviewRequest>(serde_json::json!({
        "srs_item_id": 3,
        "is_correct": true,
        "user_answer": "すし",
        "correct_answer": "すし"
    }));
    assert!(missing_type.is_err());

    let bad_type = serde_json::from_value::<SubmitReviewRequest>(serde_json::json!({
        "srs_item_id": 3,
        "is_correct": "yes",
        "review_type": "meaning",
        "user_answer": "すし",
        "correct_answer": "すし"
    }));
    assert!(bad_type.is_err());
}
