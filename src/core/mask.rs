//! Visibility mask: connections the operator chose to hide from listings.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::core::connection::ConnectionRecord;

/// Rule set hiding connections regardless of the active filter.
pub trait VisibilityMask: Send + Sync {
    fn is_empty(&self) -> bool;
    fn matches(&self, conn: &ConnectionRecord) -> bool;
}

/// A single hide rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MaskRule {
    App(i32),
    Ip(IpAddr),
    /// Matches the host and any of its subdomains.
    Host(String),
    Proto(String),
}

impl MaskRule {
    fn matches(&self, conn: &ConnectionRecord) -> bool {
        match self {
            MaskRule::App(uid) => conn.uid == *uid,
            MaskRule::Ip(ip) => conn.dst_ip == *ip || conn.src_ip == *ip,
            MaskRule::Host(host) => conn.info.as_deref().is_some_and(|info| {
                let info = info.to_ascii_lowercase();
                let host = host.to_ascii_lowercase();
                info == host || info.ends_with(&format!(".{host}"))
            }),
            MaskRule::Proto(proto) => conn.proto.eq_ignore_ascii_case(proto),
        }
    }
}

/// Ordered list of hide rules; a connection is masked when any rule matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchList {
    rules: Vec<MaskRule>,
}

impl MatchList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule, ignoring duplicates. Returns whether it was added.
    pub fn add(&mut self, rule: MaskRule) -> bool {
        if self.rules.contains(&rule) {
            return false;
        }
        self.rules.push(rule);
        true
    }

    pub fn remove(&mut self, rule: &MaskRule) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r != rule);
        self.rules.len() != before
    }

    pub fn rules(&self) -> &[MaskRule] {
        &self.rules
    }
}

impl FromIterator<MaskRule> for MatchList {
    fn from_iter<T: IntoIterator<Item = MaskRule>>(iter: T) -> Self {
        let mut list = MatchList::new();
        for rule in iter {
            list.add(rule);
        }
        list
    }
}

impl VisibilityMask for MatchList {
    fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn matches(&self, conn: &ConnectionRecord) -> bool {
        self.rules.iter().any(|r| r.matches(conn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::tests::make_conn;

    #[test]
    fn test_empty_list_matches_nothing() {
        let list = MatchList::new();
        assert!(list.is_empty());
        assert!(!list.matches(&make_conn(1)));
    }

    #[test]
    fn test_host_rule_matches_subdomains_only() {
        let list: MatchList = [MaskRule::Host("Example.com".into())].into_iter().collect();

        let mut conn = make_conn(1);
        assert!(list.matches(&conn));

        conn.info = Some("cdn.example.com".into());
        assert!(list.matches(&conn));

        conn.info = Some("notexample.com".into());
        assert!(!list.matches(&conn));

        conn.info = None;
        assert!(!list.matches(&conn));
    }

    #[test]
    fn test_app_ip_and_proto_rules() {
        let conn = make_conn(1);
        assert!(MatchList::from_iter([MaskRule::App(10001)]).matches(&conn));
        assert!(!MatchList::from_iter([MaskRule::App(10002)]).matches(&conn));
        assert!(MatchList::from_iter([MaskRule::Ip(conn.dst_ip)]).matches(&conn));
        assert!(MatchList::from_iter([MaskRule::Proto("tcp".into())]).matches(&conn));
        assert!(!MatchList::from_iter([MaskRule::Proto("udp".into())]).matches(&conn));
    }

    #[test]
    fn test_add_ignores_duplicates_and_remove() {
        let mut list = MatchList::new();
        assert!(list.add(MaskRule::App(1)));
        assert!(!list.add(MaskRule::App(1)));
        assert_eq!(list.rules().len(), 1);
        assert!(list.remove(&MaskRule::App(1)));
        assert!(!list.remove(&MaskRule::App(1)));
        assert!(list.is_empty());
    }
}
