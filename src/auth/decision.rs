//! Login decision engine
//!
//! Pure functions over an immutable [`Snapshot`]: no I/O, no locking, so any
//! number of workers can evaluate concurrently with a running synchronization.

use crate::auth::query::PendingQuery;
use crate::auth::snapshot::Snapshot;

/// Credential value meaning "authenticate by source IP only"
pub const IP_ONLY_SENTINEL: &str = "ipauth:ipauth";

/// Outcome of a login check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Allow,
    Deny,
}

impl Verdict {
    pub fn is_allowed(self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

impl From<bool> for Verdict {
    fn from(allowed: bool) -> Self {
        if allowed {
            Verdict::Allow
        } else {
            Verdict::Deny
        }
    }
}

/// Decide whether `credentials` coming from `remote_ip` may use the proxy at `proxy_ip`
///
/// First match wins:
/// 1. master password
/// 2. backconnect server as remote IP
/// 3. remote IP on the proxy's allowlist
/// 4. IP-only sentinel that did not match step 3 is denied
/// 5. credentials listed for the proxy
pub fn can_login(proxy_ip: &str, credentials: &str, remote_ip: &str, snapshot: &Snapshot) -> bool {
    let master = snapshot.master_password();
    if !master.is_empty() && credentials == master {
        return true;
    }

    if snapshot.is_backconnect(remote_ip) {
        return true;
    }

    if snapshot.is_ip_allowed(proxy_ip, remote_ip) {
        return true;
    }

    if credentials == IP_ONLY_SENTINEL {
        return false;
    }

    snapshot.has_credentials(proxy_ip, credentials)
}

/// Evaluate a parsed query against a snapshot
pub fn decide(query: &PendingQuery, snapshot: &Snapshot) -> Verdict {
    can_login(&query.proxy_ip, &query.credentials(), &query.remote_ip, snapshot).into()
}
