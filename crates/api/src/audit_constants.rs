//! Audit logging constants
//!
//! Strongly-typed values for the `action` and `resource_type` columns of
//! `audit_logs`, so filters and reports never drift on a typo.

/// Resource types recorded in audit entries
pub mod resource_type {
    pub const API_KEY: &str = "api_key";
    pub const TEAM: &str = "team";
    pub const TEAM_MEMBER: &str = "team_member";
    pub const SUBSCRIPTION: &str = "subscription";
    pub const MODEL: &str = "model";
    pub const USER: &str = "user";
    pub const USAGE_CACHE: &str = "usage_cache";
}

/// Actions recorded in audit entries
pub mod action {
    // API keys
    pub const API_KEY_CREATED: &str = "api_key_created";
    pub const API_KEY_REVOKED: &str = "api_key_revoked";

    // Teams
    pub const TEAM_CREATED: &str = "team_created";
    pub const TEAM_DELETED: &str = "team_deleted";
    pub const TEAM_MEMBER_ADDED: &str = "team_member_added";
    pub const TEAM_MEMBER_REMOVED: &str = "team_member_removed";

    // Subscriptions
    pub const SUBSCRIPTION_CREATED: &str = "subscription_created";
    pub const SUBSCRIPTION_REACTIVATED: &str = "subscription_reactivated";
    pub const SUBSCRIPTION_CANCELLED: &str = "subscription_cancelled";

    // Users (admin)
    pub const USER_UPDATED: &str = "user_updated";
    /// Deactivation revokes keys and suspends subscriptions
    pub const USER_DEACTIVATED: &str = "user_deactivated";

    // Models
    pub const MODELS_SYNCED: &str = "models_synced";

    // Admin usage
    pub const USAGE_TODAY_REFRESHED: &str = "usage_today_refreshed";
    pub const USAGE_CACHE_CLEANED: &str = "usage_cache_cleaned";
    pub const USAGE_EXPORTED: &str = "usage_exported";
}
