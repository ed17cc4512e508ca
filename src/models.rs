use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::Serialize;

// A gateway account. Only active users may authenticate.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub username: String,
    pub password: String,
    pub created: DateTime<Utc>,
    pub active: bool,
}

// One authenticated SSH transport. `disconnected_at` is written exactly once,
// when the transport closes; `session_id` is unique among live sessions and
// never reused after close.
#[derive(Debug, Clone, Serialize)]
pub struct Connection {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub remote_addr: String,
    pub connected_at: DateTime<Utc>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub session_id: String,
}

// One direct-tcpip forward belonging to a Connection. Counters grow
// monotonically while the forward lives and are reconciled to the store by
// the flusher and at close.
#[derive(Debug, Clone, Serialize)]
pub struct TargetConnection {
    pub id: i64,
    pub connection_id: i64,
    pub target: String,
    pub connected_at: DateTime<Utc>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub bytes_up: i64,
    pub bytes_down: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Allow,
    Deny,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Allow => "allow",
            RuleKind::Deny => "deny",
        }
    }

    // Stores written before the allow/deny rename used whitelist/blacklist.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "allow" | "whitelist" => Some(RuleKind::Allow),
            "deny" | "blacklist" => Some(RuleKind::Deny),
            _ => None,
        }
    }
}

impl Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FirewallRule {
    pub id: i64,
    pub kind: RuleKind,
    pub pattern: String,
    pub active: bool,
}

// Aggregate numbers for the stats page and /api/stats.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Statistics {
    pub total_connections: i64,
    pub active_users: i64,
    pub total_traffic_up: i64,
    pub total_traffic_down: i64,
}
