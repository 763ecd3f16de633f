//! Time-windowed duplicate suppression.
//!
//! In ad-hoc mode several responders (or several discovery proxies) can answer
//! the same multicast request, and SOAP-over-UDP retransmits every datagram.
//! [`MulticastSuppressor`] remembers each key for a fixed window so repeats
//! can be discarded. Entries are evicted once their window has elapsed.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::sequence::DiscoveryMessageSequence;

/// Identity of a response: who said it (sequence) about which endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResponseKey {
    /// Sequence of the responding message.
    pub sequence: DiscoveryMessageSequence,
    /// Address of the endpoint the response describes.
    pub address: String,
}

impl ResponseKey {
    /// Build a key from a message sequence and an endpoint address.
    pub fn new(sequence: DiscoveryMessageSequence, address: impl Into<String>) -> Self {
        Self {
            sequence,
            address: address.into(),
        }
    }
}

#[derive(Debug)]
struct Window<K> {
    expires: HashMap<K, Instant>,
    order: VecDeque<(Instant, K)>,
}

impl<K: Hash + Eq + Clone> Window<K> {
    fn evict(&mut self, now: Instant) {
        while let Some((at, _)) = self.order.front() {
            if *at > now {
                break;
            }
            if let Some((at, key)) = self.order.pop_front() {
                if self.expires.get(&key) == Some(&at) {
                    self.expires.remove(&key);
                }
            }
        }
    }
}

/// Suppresses keys observed more than once within a time window.
#[derive(Debug)]
pub struct MulticastSuppressor<K = ResponseKey> {
    window: Duration,
    entries: Mutex<Window<K>>,
}

impl<K: Hash + Eq + Clone> MulticastSuppressor<K> {
    /// Create a suppressor with the given window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(Window {
                expires: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// The configured window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record an observation of `key`.
    ///
    /// Returns `false` the first time a key is seen, which opens its window,
    /// and `true` for every repeat until the window elapses.
    pub fn should_suppress(&self, key: K) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.evict(now);

        if entries.expires.contains_key(&key) {
            return true;
        }

        let expires_at = now + self.window;
        entries.expires.insert(key.clone(), expires_at);
        entries.order.push_back((expires_at, key));
        false
    }

    /// Number of keys currently inside their window.
    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock();
        entries.evict(Instant::now());
        entries.expires.len()
    }

    /// Whether no key is currently tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(instance: u64, number: u64, address: &str) -> ResponseKey {
        ResponseKey::new(DiscoveryMessageSequence::new(instance, number), address)
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_inside_window_is_suppressed() {
        let suppressor = MulticastSuppressor::new(Duration::from_secs(5));
        assert!(!suppressor.should_suppress(key(1, 1, "urn:a")));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(suppressor.should_suppress(key(1, 1, "urn:a")));
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_after_window_is_delivered() {
        let suppressor = MulticastSuppressor::new(Duration::from_secs(5));
        assert!(!suppressor.should_suppress(key(1, 1, "urn:a")));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!suppressor.should_suppress(key(1, 1, "urn:a")));
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_keys_do_not_interfere() {
        let suppressor = MulticastSuppressor::new(Duration::from_secs(5));
        assert!(!suppressor.should_suppress(key(1, 1, "urn:a")));
        assert!(!suppressor.should_suppress(key(1, 1, "urn:b")));
        assert!(!suppressor.should_suppress(key(1, 2, "urn:a")));
        assert!(!suppressor.should_suppress(key(2, 1, "urn:a")));
        assert_eq!(suppressor.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_evicted() {
        let suppressor = MulticastSuppressor::new(Duration::from_millis(100));
        for n in 0..50 {
            suppressor.should_suppress(key(1, n, "urn:a"));
        }
        assert_eq!(suppressor.len(), 50);

        tokio::time::advance(Duration::from_millis(150)).await;
        assert!(suppressor.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn works_with_message_ids() {
        let suppressor: MulticastSuppressor<String> =
            MulticastSuppressor::new(Duration::from_secs(1));
        assert!(!suppressor.should_suppress("urn:uuid:1".to_string()));
        assert!(suppressor.should_suppress("urn:uuid:1".to_string()));
    }
}
