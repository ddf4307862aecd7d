diesel::table! {
    raffles (id) {
        id -> Text,
        owner_id -> Text,
        name -> Text,
        description -> Text,
        terms -> Text,
        slot_price -> Int8,
        status -> Text,
        winner_slot_number -> Nullable<Int2>,
        finalized_at -> Nullable<Timestamptz>,
        finalization_date -> Nullable<Date>,
        created_at -> Timestamptz,
        image_urls -> Array<Text>,
    }
}

diesel::table! {
    raffle_slots (raffle_id, slot_number) {
        raffle_id -> Text,
        slot_number -> Int2,
        participant_name -> Text,
        status -> Text,
    }
}

diesel::table! {
    raffle_activity (seq) {
        seq -> Int8,
        id -> Text,
        raffle_id -> Text,
        actor -> Text,
        at -> Timestamptz,
        kind -> Text,
        details -> Jsonb,
    }
}

diesel::joinable!(raffle_slots -> raffles (raffle_id));
diesel::joinable!(raffle_activity -> raffles (raffle_id));

diesel::allow_tables_to_appear_in_same_query!(raffles, raffle_slots, raffle_activity);
