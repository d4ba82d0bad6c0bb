//! Authorization module for proxyauth
//!
//! This module holds the authorization data model, the decision engine, the
//! remote source client, the synchronizer that keeps the published snapshot
//! current, and the verdict cache used for per-request decisions.

pub mod authorizer;
pub mod decision;
pub mod query;
pub mod snapshot;
pub mod source;
pub mod sync;
pub mod ttl_cache;

#[cfg(test)]
pub mod test_helpers;

pub use authorizer::{Authorizer, CachedRemoteAuthorizer, SnapshotAuthorizer};
pub use decision::{can_login, decide, Verdict, IP_ONLY_SENTINEL};
pub use query::PendingQuery;
pub use snapshot::{Snapshot, SnapshotBuilder};
pub use source::{gunzip, AuthSource, HttpAuthSource, LoginChecker, API_USERNAME};
pub use sync::{SnapshotHandle, SyncOutcome, SyncStatus, Synchronizer};
pub use ttl_cache::{CacheKey, CacheStats, VerdictCache};
