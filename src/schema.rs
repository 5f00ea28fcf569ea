// Only the side documents table has a fixed shape; request tables are introspected at runtime.

diesel::table! {
    request_documents (id) {
        id -> Int8,
        protocol -> Text,
        filename -> Nullable<Text>,
        stored_name -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}
