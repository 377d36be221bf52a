diesel::table! {
    props (id) {
        id -> BigInt,
        connection_key -> Text,
        connection_id -> BigInt,
        source_author -> Text,
        source_timestamp -> Text,
        source_message -> Text,
        source_channel -> Text,
        target_channel -> Text,
        theme -> Integer,
        target_timestamp -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    reactions (id) {
        id -> BigInt,
        channel -> Text,
        message_timestamp -> Text,
        reaction_user -> Text,
        reaction -> Text,
        removed -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(props, reactions);
