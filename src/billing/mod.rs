pub mod api;
pub mod memory;
pub mod models;
pub mod quota_sync;
pub mod resolver;
pub mod service;
pub mod store;

pub use memory::InMemoryEntitlementStore;
pub use models::{Plan, PlanAssignment, Subscription, SubscriptionDetails, SubscriptionStatus};
pub use quota_sync::{
    start_quota_sync_worker, QuotaSyncHandle, QuotaSyncJob, QuotaSyncOutcome, QuotaSyncTicket,
    QuotaSynchronizer,
};
pub use resolver::PlanResolver;
pub use service::{PlanChange, SubscriptionService};
pub use store::{EntitlementStore, PgEntitlementStore};
