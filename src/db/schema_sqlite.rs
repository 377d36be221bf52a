// SQLite schema definitions
// This file mirrors schema.rs but uses SQLite-compatible types

diesel::table! {
    props (id) {
        id -> Integer,
        connection_key -> Text,
        connection_id -> BigInt,
        source_author -> Text,
        source_timestamp -> Text,
        source_message -> Text,
        source_channel -> Text,
        target_channel -> Text,
        theme -> Integer,
        target_timestamp -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    reactions (id) {
        id -> Integer,
        channel -> Text,
        message_timestamp -> Text,
        reaction_user -> Text,
        reaction -> Text,
        removed -> Bool,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(props, reactions);
