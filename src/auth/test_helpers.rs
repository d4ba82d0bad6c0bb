//! Test helpers for the auth module

use crate::auth::decision::Verdict;
use crate::auth::snapshot::Snapshot;
use crate::auth::source::{AuthSource, LoginChecker};
use crate::error::{AuthError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Scriptable in-memory authorization source
#[derive(Default)]
pub struct MockSource {
    /// `None` makes the hash endpoint fail
    pub version: Mutex<Option<String>>,
    /// `None` makes the data endpoint fail to decode
    pub snapshot: Mutex<Option<Snapshot>>,
    /// Outer `None`: source has no master password endpoint; inner `None`: endpoint fails
    pub master_password: Mutex<Option<Option<String>>>,
    pub snapshot_fetches: AtomicUsize,
}

impl MockSource {
    pub fn serving(version: &str, snapshot: Snapshot) -> Self {
        Self {
            version: Mutex::new(Some(version.to_string())),
            snapshot: Mutex::new(Some(snapshot)),
            ..Self::default()
        }
    }

    pub fn set_version(&self, version: Option<&str>) {
        *self.version.lock().unwrap() = version.map(str::to_string);
    }

    pub fn set_snapshot(&self, snapshot: Option<Snapshot>) {
        *self.snapshot.lock().unwrap() = snapshot;
    }

    pub fn set_master_password(&self, password: Option<Option<&str>>) {
        *self.master_password.lock().unwrap() = password.map(|p| p.map(str::to_string));
    }

    pub fn fetches(&self) -> usize {
        self.snapshot_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthSource for MockSource {
    async fn fetch_version(&self) -> Result<String> {
        self.version
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AuthError::source_unavailable("mock hash endpoint down"))
    }

    async fn fetch_snapshot(&self, version: &str) -> Result<Snapshot> {
        self.snapshot_fetches.fetch_add(1, Ordering::SeqCst);
        let snapshot = self
            .snapshot
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AuthError::decode("mock payload corrupt"))?;

        Ok(snapshot.with_version(version))
    }

    async fn fetch_master_password(&self) -> Result<Option<String>> {
        match self.master_password.lock().unwrap().clone() {
            None => Ok(None),
            Some(Some(password)) => Ok(Some(password)),
            Some(None) => Err(AuthError::source_unavailable("mock master password endpoint down")),
        }
    }
}

/// Login checker that answers from a fixed table and counts calls
#[derive(Default)]
pub struct MockChecker {
    pub allowed: Mutex<Vec<(String, String, String)>>,
    pub failing: Mutex<bool>,
    pub calls: AtomicUsize,
}

impl MockChecker {
    pub fn allowing(proxy_ip: &str, credentials: &str, remote_ip: &str) -> Self {
        let checker = Self::default();
        checker.allowed.lock().unwrap().push((
            proxy_ip.to_string(),
            credentials.to_string(),
            remote_ip.to_string(),
        ));
        checker
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LoginChecker for MockChecker {
    async fn check_login(
        &self,
        proxy_ip: &str,
        credentials: &str,
        remote_ip: &str,
    ) -> Result<Verdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock().unwrap() {
            return Err(AuthError::source_unavailable("mock check_login down"));
        }
        let allowed = self
            .allowed
            .lock()
            .unwrap()
            .iter()
            .any(|(p, c, r)| p == proxy_ip && c == credentials && r == remote_ip);
        Ok(Verdict::from(allowed))
    }
}
