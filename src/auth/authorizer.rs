//! Decision providers used by the query server

use crate::auth::decision::{decide, Verdict};
use crate::auth::query::PendingQuery;
use crate::auth::source::LoginChecker;
use crate::auth::sync::SnapshotHandle;
use crate::auth::ttl_cache::{CacheKey, VerdictCache};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Anything that can turn a login attempt into a verdict
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, query: &PendingQuery) -> Verdict;
}

/// Decides locally against the latest published snapshot
#[derive(Clone)]
pub struct SnapshotAuthorizer {
    snapshots: SnapshotHandle,
}

impl SnapshotAuthorizer {
    pub fn new(snapshots: SnapshotHandle) -> Self {
        Self { snapshots }
    }
}

#[async_trait]
impl Authorizer for SnapshotAuthorizer {
    async fn authorize(&self, query: &PendingQuery) -> Verdict {
        let snapshot = self.snapshots.load();
        let verdict = decide(query, &snapshot);
        debug!(
            "{} on {} from {}: {:?} (snapshot {})",
            query.login,
            query.proxy_ip,
            query.remote_ip,
            verdict,
            snapshot.version()
        );
        verdict
    }
}

/// Asks the management API per attempt, with a verdict cache in front
///
/// Failed checks are denied and not cached, so the next attempt asks again.
pub struct CachedRemoteAuthorizer {
    checker: Arc<dyn LoginChecker>,
    cache: VerdictCache,
}

impl CachedRemoteAuthorizer {
    pub fn new(checker: Arc<dyn LoginChecker>, cache: VerdictCache) -> Self {
        Self { checker, cache }
    }

    pub fn cache(&self) -> &VerdictCache {
        &self.cache
    }
}

#[async_trait]
impl Authorizer for CachedRemoteAuthorizer {
    async fn authorize(&self, query: &PendingQuery) -> Verdict {
        let key = CacheKey::new(
            query.proxy_ip.clone(),
            query.credentials(),
            query.remote_ip.clone(),
        );

        if let Some(verdict) = self.cache.get(&key) {
            debug!("Cache hit for {} on {}: {:?}", query.login, query.proxy_ip, verdict);
            return verdict;
        }

        match self
            .checker
            .check_login(&key.proxy_ip, &key.credentials, &key.remote_ip)
            .await
        {
            Ok(verdict) => {
                self.cache.set(key, verdict);
                verdict
            }
            Err(e) => {
                warn!(
                    "Remote login check for {} on {} failed, denying: {}",
                    query.login, query.proxy_ip, e
                );
                Verdict::Deny
            }
        }
    }
}
