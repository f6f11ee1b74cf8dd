//! Diesel schema for tool registry persistence.

diesel::table! {
    /// Tool configuration records.
    tools (id) {
        /// Internal tool identifier.
        id -> Uuid,
        /// Owning tenant.
        #[max_length = 64]
        tenant_id -> Varchar,
        /// Tenant-unique tool name.
        #[max_length = 100]
        name -> Varchar,
        /// Provider type.
        #[max_length = 64]
        provider -> Varchar,
        /// Provider API base URL.
        base_url -> Text,
        /// Authentication kind (`none`, `bearer`, `basic`, `api_key`).
        #[max_length = 20]
        auth_kind -> Varchar,
        /// Reference to secret material; never the secret itself.
        secret_ref -> Nullable<Text>,
        /// Explicit API specification URL.
        spec_url -> Nullable<Text>,
        /// Extra specification paths or URLs for discovery.
        discovery_hints -> Array<Text>,
        /// Soft-deactivation flag.
        active -> Bool,
        /// Health status (`unknown`, `healthy`, `degraded`, `unhealthy`).
        #[max_length = 20]
        health_status -> Varchar,
        /// Optional health message.
        health_message -> Nullable<Text>,
        /// Timestamp of the last health check.
        health_checked_at -> Timestamptz,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Append-only catalog versions.
    operation_catalogs (tool_id, version) {
        /// Owning tool.
        tool_id -> Uuid,
        /// Catalog version, starting at 1.
        version -> Int4,
        /// Published operations as JSONB.
        operations -> Jsonb,
        /// Expansion table for `$expand` placeholders as JSONB.
        expansions -> Jsonb,
        /// Publication timestamp.
        published_at -> Timestamptz,
    }
}
