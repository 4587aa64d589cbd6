diesel::table! {
    srs_items (id) {
        id -> Integer,
        user_id -> Integer,
        item_type -> Text,
        item_id -> Integer,
        srs_level -> Integer,
        next_review_at -> Nullable<Timestamp>,
        last_reviewed_at -> Nullable<Timestamp>,
        correct_streak -> Integer,
        total_reviews -> Integer,
        correct_reviews -> Integer,
    }
}

diesel::table! {
    review_sessions (id) {
        id -> Integer,
        srs_item_id -> Integer,
        is_correct -> Bool,
        response_time_ms -> Nullable<Integer>,
        review_type -> Text,
        user_answer -> Text,
        correct_answer -> Text,
        reviewed_at -> Timestamp,
    }
}

diesel::joinable!(review_sessions -> srs_items (srs_item_id));

diesel::allow_tables_to_appear_in_same_query!(srs_items, review_sessions,);
