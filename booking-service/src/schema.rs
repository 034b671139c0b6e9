diesel::table! {
    appointments (customer_id, slot) {
        customer_id -> Varchar,
        slot -> Varchar,
        customer_name -> Varchar,
        customer_email -> Varchar,
        service -> Varchar,
        created_at -> Timestamptz,
    }
}
