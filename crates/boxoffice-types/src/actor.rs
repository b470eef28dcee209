//! The staff member performing an operation, plus request provenance.

use serde::{Deserialize, Serialize};

use crate::{Role, UserId};

/// Who is acting, with which role, from where. Carried into every audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl Actor {
    #[must_use]
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self {
            user_id,
            role,
            ip_address: None,
            user_agent: None,
        }
    }

    #[must_use]
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }
}
