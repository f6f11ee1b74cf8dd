//! Diesel schema for the webhook event stream.

diesel::table! {
    /// Events waiting to be processed.
    webhook_events (id) {
        /// Stream identifier.
        id -> Uuid,
        /// Append order.
        stream_position -> Int8,
        /// Sending provider.
        #[max_length = 64]
        provider -> Varchar,
        /// Provider delivery identifier.
        delivery_id -> Nullable<Text>,
        /// Provider event type.
        event_type -> Nullable<Text>,
        /// Verbatim payload.
        payload -> Jsonb,
        /// Receipt timestamp.
        received_at -> Timestamptz,
        /// Failure history as JSONB.
        failures -> Jsonb,
        /// Earliest time the entry may be claimed.
        available_at -> Timestamptz,
        /// Consumer holding the lease.
        claimed_by -> Nullable<Text>,
        /// When the lease lapses.
        lease_expires_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Events that exhausted their retry budget.
    webhook_dead_letters (event_id) {
        /// Stream identifier of the event.
        event_id -> Uuid,
        /// Sending provider.
        #[max_length = 64]
        provider -> Varchar,
        /// The event with its failure history as JSONB.
        event -> Jsonb,
        /// When the event was moved aside.
        dead_lettered_at -> Timestamptz,
    }
}
