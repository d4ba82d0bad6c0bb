//! Immutable, versioned view of the authorization data
//!
//! A [`Snapshot`] is built once from a management API payload and never
//! mutated afterwards. Updates replace the whole snapshot.

use crate::error::{AuthError, Result};
use ahash::{AHashMap, AHashSet};
use serde::Deserialize;
use std::collections::HashMap;

/// Authorization facts valid until superseded by a newer snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Opaque version hash reported by the source; empty before the first sync
    version: String,
    /// Proxy IP to accepted `login:password` credentials
    credentials: AHashMap<String, AHashSet<String>>,
    /// Proxy IP to remote IPs allowed without credentials
    allowed_ips: AHashMap<String, AHashSet<String>>,
    /// Shared override credential
    master_password: String,
    /// Trusted infrastructure IPs
    backconnect_servers: Vec<String>,
}

/// Set of strings as sent by the API: either `{"value": true}` objects or plain arrays
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringSet {
    Flags(HashMap<String, bool>),
    List(Vec<String>),
}

impl StringSet {
    fn into_set(self) -> AHashSet<String> {
        match self {
            // Presence of the key is what counts, matching how the API has always been read
            StringSet::Flags(flags) => flags.into_keys().collect(),
            StringSet::List(items) => items.into_iter().collect(),
        }
    }
}

/// Wire shape of the JSON auth payload
#[derive(Debug, Deserialize)]
struct AuthPayload {
    #[serde(default)]
    ips_to_credentials: HashMap<String, StringSet>,
    #[serde(default)]
    ips_to_authorized_ips: HashMap<String, StringSet>,
    #[serde(default)]
    master_password: String,
    #[serde(default)]
    backconnect_servers: Vec<String>,
}

fn collect_sets(raw: HashMap<String, StringSet>) -> AHashMap<String, AHashSet<String>> {
    raw.into_iter().map(|(ip, set)| (ip, set.into_set())).collect()
}

impl Snapshot {
    /// Empty snapshot: nothing is allowed
    pub fn empty() -> Self {
        Self::default()
    }

    /// Start building a snapshot by hand
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::default()
    }

    /// Decode a (decompressed) JSON payload
    pub fn from_json(version: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        let payload: AuthPayload = serde_json::from_slice(bytes)
            .map_err(|e| AuthError::decode(format!("Invalid auth payload: {}", e)))?;

        Ok(Self {
            version: version.into(),
            credentials: collect_sets(payload.ips_to_credentials),
            allowed_ips: collect_sets(payload.ips_to_authorized_ips),
            master_password: payload.master_password,
            backconnect_servers: payload.backconnect_servers,
        })
    }

    /// Decode the legacy block format
    ///
    /// ```text
    /// IP=10.0.0.1
    /// login1
    /// password1
    /// IP=10.0.0.2
    /// login2
    /// password2
    /// ```
    ///
    /// The legacy format carries no allowlist, backconnect list or master password.
    pub fn from_legacy_blocks(version: impl Into<String>, text: &str) -> Result<Self> {
        let mut credentials: AHashMap<String, AHashSet<String>> = AHashMap::new();
        let mut current_ip: Option<String> = None;
        let mut pending_login: Option<String> = None;

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(ip) = line.strip_prefix("IP=") {
                if pending_login.is_some() {
                    return Err(AuthError::decode(format!(
                        "Line {}: login without password before next IP block",
                        index + 1
                    )));
                }
                let ip = ip.trim().to_string();
                credentials.entry(ip.clone()).or_default();
                current_ip = Some(ip);
                continue;
            }

            let ip = current_ip.as_ref().ok_or_else(|| {
                AuthError::decode(format!("Line {}: credentials before any IP= header", index + 1))
            })?;

            match pending_login.take() {
                None => pending_login = Some(line.to_string()),
                Some(login) => {
                    credentials
                        .entry(ip.clone())
                        .or_default()
                        .insert(format!("{}:{}", login, line));
                }
            }
        }

        if pending_login.is_some() {
            return Err(AuthError::decode("Trailing login without password"));
        }

        Ok(Self {
            version: version.into(),
            credentials,
            ..Self::default()
        })
    }

    /// Same snapshot under a different version hash
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Same snapshot with a different master password
    pub fn with_master_password(mut self, master_password: impl Into<String>) -> Self {
        self.master_password = master_password.into();
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn master_password(&self) -> &str {
        &self.master_password
    }

    pub fn backconnect_servers(&self) -> &[String] {
        &self.backconnect_servers
    }

    /// Whether `remote_ip` is one of the trusted backconnect servers
    pub fn is_backconnect(&self, remote_ip: &str) -> bool {
        self.backconnect_servers.iter().any(|ip| ip == remote_ip)
    }

    /// Whether `remote_ip` is on the allowlist of `proxy_ip`
    pub fn is_ip_allowed(&self, proxy_ip: &str, remote_ip: &str) -> bool {
        self.allowed_ips
            .get(proxy_ip)
            .map_or(false, |ips| ips.contains(remote_ip))
    }

    /// Whether `credentials` are accepted on `proxy_ip`
    pub fn has_credentials(&self, proxy_ip: &str, credentials: &str) -> bool {
        self.credentials
            .get(proxy_ip)
            .map_or(false, |set| set.contains(credentials))
    }

    /// Number of proxy IPs with credentials
    pub fn proxy_count(&self) -> usize {
        self.credentials.len()
    }

    /// Total number of credential entries across all proxy IPs
    pub fn credential_count(&self) -> usize {
        self.credentials.values().map(|set| set.len()).sum()
    }

    /// Total number of allowlisted remote IPs across all proxy IPs
    pub fn allowed_ip_count(&self) -> usize {
        self.allowed_ips.values().map(|set| set.len()).sum()
    }
}

/// Builder for hand-made snapshots
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    inner: Snapshot,
}

impl SnapshotBuilder {
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.inner.version = version.into();
        self
    }

    pub fn credential(mut self, proxy_ip: impl Into<String>, credentials: impl Into<String>) -> Self {
        self.inner
            .credentials
            .entry(proxy_ip.into())
            .or_default()
            .insert(credentials.into());
        self
    }

    pub fn allowed_ip(mut self, proxy_ip: impl Into<String>, remote_ip: impl Into<String>) -> Self {
        self.inner
            .allowed_ips
            .entry(proxy_ip.into())
            .or_default()
            .insert(remote_ip.into());
        self
    }

    pub fn master_password(mut self, master_password: impl Into<String>) -> Self {
        self.inner.master_password = master_password.into();
        self
    }

    pub fn backconnect(mut self, remote_ip: impl Into<String>) -> Self {
        self.inner.backconnect_servers.push(remote_ip.into());
        self
    }

    pub fn build(self) -> Snapshot {
        self.inner
    }
}
