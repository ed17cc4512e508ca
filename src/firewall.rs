//! Regex firewall deciding which outbound destinations may be dialed.

use log::warn;
use regex::Regex;

use crate::database::Database;
use crate::models::{FirewallRule, RuleKind};

#[derive(Clone)]
pub struct Firewall {
    db: Database,
}

impl Firewall {
    pub fn new(db: Database) -> Self {
        Firewall { db }
    }

    /// Decide whether `destination` ("host:port") may be dialed. Rules are
    /// fetched fresh for each call, so every evaluation sees a consistent
    /// snapshot of the active set.
    pub async fn is_allowed(&self, destination: &str) -> bool {
        let rules = match self.db.active_firewall_rules().await {
            Ok(rules) => rules,
            Err(error) => {
                warn!("Failed to load firewall rules: {error:#}");
                return true;
            }
        };
        evaluate(&rules, destination)
    }
}

// Allow rules dominate: as soon as any allow rule is active, only matching
// destinations pass. Without allow rules, deny rules knock out matches and
// everything else passes. No rules at all means everything passes.
fn evaluate(rules: &[FirewallRule], destination: &str) -> bool {
    if rules.is_empty() {
        return true;
    }
    let mut has_allow_rules = false;
    for rule in rules.iter().filter(|rule| rule.kind == RuleKind::Allow) {
        has_allow_rules = true;
        if matches(rule, destination) {
            return true;
        }
    }
    if has_allow_rules {
        return false;
    }
    for rule in rules.iter().filter(|rule| rule.kind == RuleKind::Deny) {
        if matches(rule, destination) {
            return false;
        }
    }
    true
}

// A pattern that fails to compile never matches; the remaining rules still
// apply.
fn matches(rule: &FirewallRule, destination: &str) -> bool {
    match Regex::new(&rule.pattern) {
        Ok(pattern) => pattern.is_match(destination),
        Err(error) => {
            warn!("Invalid {} pattern '{}': {error}", rule.kind, rule.pattern);
            false
        }
    }
}
