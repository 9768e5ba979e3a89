//! Resource services
//!
//! Each service owns the SQL for one resource and writes an audit entry for
//! every mutation. Handlers stay thin and only do access checks.

pub mod api_keys;
pub mod audit;
pub mod model_sync;
pub mod subscriptions;
pub mod teams;
pub mod users;

pub use api_keys::{ApiKeyService, CreateApiKeyRequest, CreatedApiKey};
pub use audit::AuditLogger;
pub use model_sync::{ModelSyncService, SyncSummary};
pub use subscriptions::{CreateSubscriptionRequest, SubscriptionService};
pub use teams::{AddMemberRequest, CreateTeamRequest, TeamMember, TeamService, TeamWithMembers};
pub use users::{UpdateUserRequest, UserListQuery, UserService};
