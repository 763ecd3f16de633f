//! Application message sequencing (`AppSequence`).
//!
//! Every announcement and response carries an instance id and a message
//! number. Receivers use them to order messages from the same sender and to
//! detect duplicates.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{Error, Result};

/// The sequencing information of a single message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiscoveryMessageSequence {
    /// Identifies the sending instance. Increases on every restart.
    pub instance_id: u64,
    /// Optional URI naming a sequence within the instance.
    pub sequence_id: Option<String>,
    /// Increases with every message sent by the instance.
    pub message_number: u64,
}

impl DiscoveryMessageSequence {
    /// Create a sequence without a sequence id.
    pub fn new(instance_id: u64, message_number: u64) -> Self {
        Self {
            instance_id,
            sequence_id: None,
            message_number,
        }
    }

    /// Whether the two sequences belong to the same ordering domain.
    pub fn can_compare_to(&self, other: &Self) -> bool {
        self.sequence_id == other.sequence_id
    }

    /// Whether this message was sent after `other`.
    ///
    /// Returns `false` when the two sequences cannot be compared.
    pub fn is_newer_than(&self, other: &Self) -> bool {
        matches!(self.partial_cmp(other), Some(Ordering::Greater))
    }
}

impl PartialOrd for DiscoveryMessageSequence {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if !self.can_compare_to(other) {
            return None;
        }
        Some(
            self.instance_id
                .cmp(&other.instance_id)
                .then(self.message_number.cmp(&other.message_number)),
        )
    }
}

/// Produces the outbound sequence for one sending instance.
///
/// Safe to share between tasks. Each call to [`next`](Self::next) returns a
/// message number strictly greater than every number returned before.
#[derive(Debug)]
pub struct MessageSequenceGenerator {
    instance_id: u64,
    sequence_id: Option<String>,
    counter: AtomicU64,
}

impl MessageSequenceGenerator {
    /// Create a generator whose instance id is the current unix time in seconds.
    pub fn new() -> Self {
        let instance_id = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self::with_instance_id(instance_id)
    }

    /// Create a generator with an explicit instance id.
    pub fn with_instance_id(instance_id: u64) -> Self {
        Self {
            instance_id,
            sequence_id: None,
            counter: AtomicU64::new(0),
        }
    }

    /// Set the sequence id stamped on every generated sequence.
    pub fn sequence_id(mut self, sequence_id: impl Into<String>) -> Self {
        self.sequence_id = Some(sequence_id.into());
        self
    }

    /// The instance id of this generator.
    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// Allocate the next message sequence.
    ///
    /// Fails with [`Error::SequenceExhausted`] once the counter reaches
    /// `u64::MAX` instead of wrapping.
    pub fn next(&self) -> Result<DiscoveryMessageSequence> {
        let previous = self
            .counter
            .fetch_update(AtomicOrdering::AcqRel, AtomicOrdering::Acquire, |n| {
                n.checked_add(1)
            })
            .map_err(|_| Error::SequenceExhausted(self.instance_id))?;
        Ok(DiscoveryMessageSequence {
            instance_id: self.instance_id,
            sequence_id: self.sequence_id.clone(),
            message_number: previous + 1,
        })
    }

    #[cfg(test)]
    fn starting_at(instance_id: u64, last: u64) -> Self {
        Self {
            instance_id,
            sequence_id: None,
            counter: AtomicU64::new(last),
        }
    }
}

impl Default for MessageSequenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}
