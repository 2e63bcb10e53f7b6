//! Account (session) for a synchronization domain

use serde::{Deserialize, Serialize};

/// An established account for one synchronization domain
///
/// The engine refuses every operation with `NotAuthenticated` while no
/// account is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Login name on the backend
    pub user: String,
    /// Backend base address
    pub server: String,
    /// Synchronization domain identifier owned by this account
    pub domain: String,
}

impl Account {
    pub fn new(
        user: impl Into<String>,
        server: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            server: server.into(),
            domain: domain.into(),
        }
    }

    /// Display form `user@server`
    pub fn display_name(&self) -> String {
        format!("{}@{}", self.user, self.server)
    }
}
