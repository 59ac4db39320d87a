//! Topic membership tracking
//!
//! Maps topics to the connections subscribed to them, plus the reverse
//! index used to drop a connection from everything on disconnect. Every
//! operation is a synchronous critical section on the affected `DashMap`
//! shard, so callers never hold a registry lock across an await point.

use dashmap::DashMap;
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

/// Fan-out channel keyed by a recipient address without whitespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(String);

impl Topic {
    /// Normalize raw input by removing all whitespace; `None` if nothing remains
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    /// Topic for a user-facing address such as `NQ07 0000 ...`
    pub fn from_address(user_friendly: &str) -> Self {
        Self(user_friendly.chars().filter(|c| !c.is_whitespace()).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-unique subscriber connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Topic → members, and connection → topics
#[derive(Debug, Default)]
pub struct TopicRegistry {
    topics: DashMap<Topic, HashSet<ConnectionId>>,
    memberships: DashMap<ConnectionId, HashSet<Topic>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `connection` to `topic`. Returns false if it was already a member.
    pub fn subscribe(&self, connection: ConnectionId, topic: &Topic) -> bool {
        let added = self
            .topics
            .entry(topic.clone())
            .or_default()
            .insert(connection);

        self.memberships
            .entry(connection)
            .or_default()
            .insert(topic.clone());

        added
    }

    /// Remove `connection` from `topic`. Returns false if it was not a member.
    pub fn unsubscribe(&self, connection: ConnectionId, topic: &Topic) -> bool {
        let removed = self
            .topics
            .get_mut(topic)
            .map(|mut members| members.remove(&connection))
            .unwrap_or(false);
        self.topics.remove_if(topic, |_, members| members.is_empty());

        if let Some(mut topics) = self.memberships.get_mut(&connection) {
            topics.remove(topic);
        }
        self.memberships
            .remove_if(&connection, |_, topics| topics.is_empty());

        removed
    }

    /// Remove `connection` from every topic; returns the topics it left
    pub fn remove_connection(&self, connection: ConnectionId) -> Vec<Topic> {
        let Some((_, topics)) = self.memberships.remove(&connection) else {
            return Vec::new();
        };

        for topic in &topics {
            if let Some(mut members) = self.topics.get_mut(topic) {
                members.remove(&connection);
            }
            self.topics.remove_if(topic, |_, members| members.is_empty());
        }

        topics.into_iter().collect()
    }

    /// Snapshot of a topic's members at this instant
    pub fn members(&self, topic: &Topic) -> Vec<ConnectionId> {
        self.topics
            .get(topic)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, connection: ConnectionId, topic: &Topic) -> bool {
        self.topics
            .get(topic)
            .map(|members| members.contains(&connection))
            .unwrap_or(false)
    }

    pub fn topics_of(&self, connection: ConnectionId) -> Vec<Topic> {
        self.memberships
            .get(&connection)
            .map(|topics| topics.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Topics with at least one member
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Total (connection, topic) pairs
    pub fn subscription_count(&self) -> usize {
        self.topics.iter().map(|members| members.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(s: &str) -> Topic {
        Topic::parse(s).unwrap()
    }

    #[test]
    fn topic_strips_all_whitespace() {
        let spaced = Topic::from_address("NQ07 0000 0000 0000 0000 0000 0000 0000 0000");
        let compact = Topic::from_address("NQ0700000000000000000000000000000000");
        assert_eq!(spaced, compact);
        assert_eq!(spaced.as_str(), "NQ0700000000000000000000000000000000");

        assert_eq!(Topic::parse(" NQ07\t0000\n").unwrap().as_str(), "NQ070000");
        assert!(Topic::parse("   ").is_none());
    }

    #[test]
    fn subscribe_is_idempotent() {
        let registry = TopicRegistry::new();
        let conn = ConnectionId::new();
        let t = topic("NQ01");

        assert!(registry.subscribe(conn, &t));
        assert!(!registry.subscribe(conn, &t));
        assert_eq!(registry.members(&t), vec![conn]);
        assert_eq!(registry.subscription_count(), 1);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let registry = TopicRegistry::new();
        let conn = ConnectionId::new();
        let t = topic("NQ01");

        assert!(!registry.unsubscribe(conn, &t));
        registry.subscribe(conn, &t);
        assert!(registry.unsubscribe(conn, &t));
        assert!(!registry.unsubscribe(conn, &t));
        assert!(registry.members(&t).is_empty());
        assert_eq!(registry.topic_count(), 0);
    }

    #[test]
    fn last_operation_wins_per_pair() {
        let registry = TopicRegistry::new();
        let conn = ConnectionId::new();
        let t = topic("NQ01");

        let sequences: &[&[bool]] = &[
            &[true],
            &[false],
            &[true, true, false],
            &[false, true],
            &[true, false, false, true],
            &[true, false, true, false],
        ];

        for ops in sequences {
            registry.remove_connection(conn);
            for &subscribe in *ops {
                if subscribe {
                    registry.subscribe(conn, &t);
                } else {
                    registry.unsubscribe(conn, &t);
                }
            }
            let expected = *ops.last().unwrap();
            assert_eq!(registry.is_member(conn, &t), expected, "sequence {ops:?}");
            assert_eq!(registry.topics_of(conn).contains(&t), expected);
        }
    }

    #[test]
    fn remove_connection_leaves_every_topic() {
        let registry = TopicRegistry::new();
        let gone = ConnectionId::new();
        let stays = ConnectionId::new();
        let a = topic("A");
        let b = topic("B");

        registry.subscribe(gone, &a);
        registry.subscribe(gone, &b);
        registry.subscribe(stays, &a);

        let mut left = registry.remove_connection(gone);
        left.sort();
        assert_eq!(left, vec![a.clone(), b.clone()]);

        assert_eq!(registry.members(&a), vec![stays]);
        assert!(registry.members(&b).is_empty());
        assert!(registry.topics_of(gone).is_empty());
        assert_eq!(registry.topic_count(), 1);
    }

    #[test]
    fn members_is_a_snapshot() {
        let registry = TopicRegistry::new();
        let first = ConnectionId::new();
        let t = topic("A");
        registry.subscribe(first, &t);

        let snapshot = registry.members(&t);
        registry.subscribe(ConnectionId::new(), &t);

        assert_eq!(snapshot, vec![first]);
        assert_eq!(registry.members(&t).len(), 2);
    }
}
