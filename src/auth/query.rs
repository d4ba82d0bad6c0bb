//! Login attempts waiting for a decision

/// One parsed login attempt
///
/// Created by the line protocol adapter and consumed exactly once by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuery {
    /// Channel token echoed back with the result; absent in non-concurrent mode
    pub token: Option<String>,
    pub login: String,
    pub password: String,
    pub proxy_ip: String,
    pub remote_ip: String,
}

impl PendingQuery {
    pub fn new(
        token: Option<String>,
        login: impl Into<String>,
        password: impl Into<String>,
        proxy_ip: impl Into<String>,
        remote_ip: impl Into<String>,
    ) -> Self {
        Self {
            token,
            login: login.into(),
            password: password.into(),
            proxy_ip: proxy_ip.into(),
            remote_ip: remote_ip.into(),
        }
    }

    /// Credentials in the `login:password` form used by the authorization data
    pub fn credentials(&self) -> String {
        format!("{}:{}", self.login, self.password)
    }
}
