use std::collections::{HashMap, VecDeque};
use tracing::debug;

use crate::models::ServerMessage;

/// Bounded, best-effort holding area for non-critical messages addressed to a
/// user whose session briefly dropped. One queue per user within a workspace
/// hub; when full, the oldest entry is discarded to admit the newest. This is
/// never a delivery guarantee.
#[derive(Debug)]
pub struct OfflineQueue {
    capacity: usize,
    queues: HashMap<String, VecDeque<ServerMessage>>,
}

impl Default for OfflineQueue {
    fn default() -> Self {
        Self::new(100)
    }
}

impl OfflineQueue {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, queues: HashMap::new() }
    }

    pub fn enqueue(&mut self, user_id: &str, message: ServerMessage) {
        let queue = self.queues.entry(user_id.to_string()).or_default();
        if queue.len() >= self.capacity {
            queue.pop_front();
            debug!("Offline queue full for user {}; dropped oldest entry", user_id);
        }
        queue.push_back(message);
    }

    /// Take everything queued for a user, in original arrival order
    pub fn drain(&mut self, user_id: &str) -> Vec<ServerMessage> {
        self.queues
            .remove(user_id)
            .map(|queue| queue.into_iter().collect())
            .unwrap_or_default()
    }

    /// Drop a user's queue without delivering it (presence entry expired)
    pub fn remove(&mut self, user_id: &str) {
        self.queues.remove(user_id);
    }

    pub fn queued_total(&self) -> usize {
        self.queues.values().map(|q| q.len()).sum()
    }

    #[cfg(test)]
    fn queued_for(&self, user_id: &str) -> usize {
        self.queues.get(user_id).map_or(0, |q| q.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(n: u64) -> ServerMessage {
        ServerMessage::ActivityUpdate {
            user_id: "sender".to_string(),
            username: "sender".to_string(),
            activity: format!("activity-{}", n),
            details: None,
        }
    }

    #[test]
    fn drain_returns_messages_in_arrival_order_and_empties_queue() {
        let mut queue = OfflineQueue::new(10);
        queue.enqueue("u1", activity(1));
        queue.enqueue("u1", activity(2));
        queue.enqueue("u1", activity(3));

        let drained = queue.drain("u1");
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0], activity(1));
        assert_eq!(drained[2], activity(3));
        assert!(queue.drain("u1").is_empty());
    }

    #[test]
    fn overflow_evicts_oldest_first() {
        let mut queue = OfflineQueue::new(3);
        for n in 1..=4 {
            queue.enqueue("u1", activity(n));
        }

        assert_eq!(queue.queued_for("u1"), 3);
        let drained = queue.drain("u1");
        assert_eq!(drained[0], activity(2));
        assert_eq!(drained[2], activity(4));
    }

    #[test]
    fn queues_are_independent_per_user() {
        let mut queue = OfflineQueue::new(2);
        queue.enqueue("u1", activity(1));
        queue.enqueue("u2", activity(2));
        queue.remove("u1");

        assert!(queue.drain("u1").is_empty());
        assert_eq!(queue.drain("u2").len(), 1);
    }
}
