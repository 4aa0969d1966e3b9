use buoy_proto::Identifier;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Keeps the coordinator from flooding the channel with Assigns to a mark
/// that has not acknowledged yet.
#[derive(Debug)]
pub struct AssignRateLimit {
    last_sent: BTreeMap<Identifier, Instant>,
    min_interval: Duration,
}

impl AssignRateLimit {
    pub fn new(min_interval: Duration) -> Self {
        Self { last_sent: BTreeMap::new(), min_interval }
    }

    pub fn allow(&mut self, id: Identifier, now: Instant) -> bool {
        if let Some(t) = self.last_sent.get(&id) {
            if now.saturating_duration_since(*t) < self.min_interval { return false; }
        }
        self.last_sent.insert(id, now);
        true
    }

    pub fn forget(&mut self, id: Identifier) {
        self.last_sent.remove(&id);
    }

    pub fn clear(&mut self) {
        self.last_sent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_per_peer() {
        let t0 = Instant::now();
        let mut l = AssignRateLimit::new(Duration::from_secs(3));
        assert!(l.allow(Identifier::MarkA, t0));
        assert!(l.allow(Identifier::MarkB, t0));
        assert!(!l.allow(Identifier::MarkA, t0 + Duration::from_secs(2)));
        assert!(l.allow(Identifier::MarkA, t0 + Duration::from_secs(3)));
        l.forget(Identifier::MarkB);
        assert!(l.allow(Identifier::MarkB, t0 + Duration::from_millis(10)));
    }
}
