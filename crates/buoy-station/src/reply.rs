//! Reply stagger after a coordinator broadcast.
//!
//! Every peer hears the broadcast at about the same moment and waits
//! `BASE_DELAY + ordinal * PER_IDENTIFIER_DELAY` before answering. Slots are
//! distinct as long as one frame's air time is below the per-id step.

use std::collections::VecDeque;
use std::time::Duration;

use buoy_proto::{Identifier, Packet};
use tokio::time::Instant;

pub const BASE_DELAY: Duration = Duration::from_millis(100);
pub const PER_IDENTIFIER_DELAY: Duration = Duration::from_millis(50);

pub fn reply_delay(id: Identifier) -> Duration {
    BASE_DELAY + PER_IDENTIFIER_DELAY * id.ordinal() as u32
}

/// Replies waiting for this node's slot. The control loop keeps running
/// while they wait and sends each one once its deadline passes.
#[derive(Debug)]
pub struct ReplyQueue {
    delay: Duration,
    pending: VecDeque<(Instant, Packet)>,
}

impl ReplyQueue {
    pub fn new(id: Identifier) -> Self {
        Self { delay: reply_delay(id), pending: VecDeque::new() }
    }

    pub fn push(&mut self, packet: Packet, now: Instant) {
        // Same delay for every entry, so deadlines stay in order.
        self.pending.push_back((now + self.delay, packet));
    }

    /// Deadline of the oldest pending reply.
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.front().map(|(at, _)| *at)
    }

    pub fn pop_due(&mut self, now: Instant) -> Option<Packet> {
        if self.next_due()? <= now {
            self.pending.pop_front().map(|(_, p)| p)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_follow_the_ordinal() {
        for id in Identifier::ALL {
            let expected = 100 + 50 * id.ordinal() as u64;
            assert_eq!(reply_delay(id), Duration::from_millis(expected));
        }
    }

    #[test]
    fn slots_are_strictly_increasing() {
        let delays: Vec<_> = Identifier::ALL.iter().map(|id| reply_delay(*id)).collect();
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
        for (i, a) in delays.iter().enumerate() {
            for b in &delays[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn queue_releases_on_the_slot_boundary() {
        let t0 = Instant::now();
        let reply = Packet::RcStart { sender: Identifier::Windward };
        let mut q = ReplyQueue::new(Identifier::Windward);
        assert_eq!(q.next_due(), None);

        q.push(reply, t0);
        q.push(reply, t0 + Duration::from_millis(100));
        assert_eq!(q.next_due(), Some(t0 + Duration::from_millis(250)));
        assert_eq!(q.pop_due(t0 + Duration::from_millis(249)), None);
        assert_eq!(q.pop_due(t0 + Duration::from_millis(250)), Some(reply));
        assert_eq!(q.pop_due(t0 + Duration::from_millis(300)), None);
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop_due(t0 + Duration::from_millis(350)), Some(reply));
        assert!(q.is_empty());
    }
}
