use crate::session::EditTarget;
use loadouts_schema::UserId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Pending "run it again to confirm" prompts, one per user.
///
/// Time is passed in so expiry is deterministic under test.
#[derive(Debug)]
pub struct PendingConfirmations {
    timeout: Duration,
    pending: HashMap<UserId, (EditTarget, Instant)>,
}

impl PendingConfirmations {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: HashMap::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Record a prompt for `target`, replacing any earlier one.
    pub fn request(&mut self, user: UserId, target: EditTarget, now: Instant) {
        self.pending.insert(user, (target, now + self.timeout));
    }

    /// Consume a live prompt matching `target`. A stale or different prompt
    /// is discarded and `false` returned.
    pub fn confirm(&mut self, user: UserId, target: EditTarget, now: Instant) -> bool {
        match self.pending.remove(&user) {
            Some((pending, deadline)) => pending == target && now <= deadline,
            None => false,
        }
    }

    pub fn forget(&mut self, user: UserId) {
        self.pending.remove(&user);
    }

    /// Drop expired prompts. Returns how many were removed.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, (_, deadline)| now <= *deadline);
        before - self.pending.len()
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
    use loadouts_schema::{Scope, SlotNumber};

    fn target(n: u8) -> EditTarget {
        EditTarget::new(SlotNumber::new(n).unwrap(), Scope::Personal)
    }

    #[test]
    fn confirm_within_timeout() {
        let mut pending = PendingConfirmations::new(Duration::from_secs(10));
        let user = UserId::random();
        let t0 = Instant::now();
        pending.request(user, target(3), t0);
        assert!(pending.confirm(user, target(3), t0 + Duration::from_secs(9)));
        assert!(pending.is_empty());
    }

    #[test]
    fn expired_prompt_does_not_confirm() {
        let mut pending = PendingConfirmations::new(Duration::from_secs(10));
        let user = UserId::random();
        let t0 = Instant::now();
        pending.request(user, target(3), t0);
        assert!(!pending.confirm(user, target(3), t0 + Duration::from_secs(11)));
    }

    #[test]
    fn different_target_does_not_confirm() {
        let mut pending = PendingConfirmations::new(Duration::from_secs(10));
        let user = UserId::random();
        let t0 = Instant::now();
        pending.request(user, target(3), t0);
        assert!(!pending.confirm(user, target(4), t0));
        assert!(pending.is_empty());
    }

    #[test]
    fn purge_removes_only_expired() {
        let mut pending = PendingConfirmations::new(Duration::from_secs(10));
        let t0 = Instant::now();
        pending.request(UserId::random(), target(1), t0);
        pending.request(UserId::random(), target(2), t0 + Duration::from_secs(5));
        assert_eq!(pending.purge_expired(t0 + Duration::from_secs(12)), 1);
        assert_eq!(pending.len(), 1);
    }
}
