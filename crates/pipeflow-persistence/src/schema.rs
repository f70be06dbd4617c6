//! Esquema Diesel. Reemplazable con `diesel print-schema`.

diesel::table! {
    run_records (pipeline_id) {
        pipeline_id -> Text,
        record -> Jsonb,
        invocation -> BigInt,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    run_step_events (seq) {
        seq -> BigInt,
        pipeline_id -> Text,
        run_id -> Nullable<Uuid>,
        step -> Text,
        status -> Text,
        payload -> Jsonb,
        ts -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(run_records, run_step_events,);
