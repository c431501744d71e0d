//! Per-user sliding-window throttling.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::domain::UserId;

/// Sliding-window rate limiter: at most `max_events` accepted events per
/// identity within the trailing `window`.
///
/// Entries older than the window are pruned lazily on each check. State is
/// process-local and lost on restart; with several instances the effective
/// quota multiplies accordingly.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    max_events: u32,
    window: Duration,
    windows: HashMap<UserId, Vec<Instant>>,
}

impl RateLimiter {
    pub fn new(max_events: u32, window: Duration) -> Self {
        Self {
            max_events,
            window,
            windows: HashMap::new(),
        }
    }

    /// Check and record one event for `user_id`. Returns `false` (deny, no
    /// side effect) when the window is already full.
    pub fn check(&mut self, user_id: UserId) -> bool {
        self.check_at(user_id, Instant::now())
    }

    pub fn check_at(&mut self, user_id: UserId, now: Instant) -> bool {
        let events = self.windows.entry(user_id).or_default();
        prune(events, self.window, now);

        if events.len() >= self.max_events as usize {
            return false;
        }

        events.push(now);
        true
    }

    /// Drop identities whose entire window has expired. Called from the
    /// periodic maintenance sweep so the map does not grow without bound.
    pub fn purge_idle(&mut self) {
        self.purge_idle_at(Instant::now());
    }

    pub fn purge_idle_at(&mut self, now: Instant) {
        let window = self.window;
        self.windows.retain(|_, events| {
            prune(events, window, now);
            !events.is_empty()
        });
    }

    pub fn tracked_users(&self) -> usize {
        self.windows.len()
    }
}

fn prune(events: &mut Vec<Instant>, window: Duration, now: Instant) {
    events.retain(|&t| now.duration_since(t) < window);
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn allows_up_to_cap_within_window() {
        let mut rl = RateLimiter::new(10, WINDOW);
        let now = Instant::now();

        for _ in 0..10 {
            assert!(rl.check_at(UserId(1), now));
        }
        assert!(!rl.check_at(UserId(1), now));
    }

    #[test]
    fn denied_call_leaves_no_trace() {
        let mut rl = RateLimiter::new(2, WINDOW);
        let now = Instant::now();

        assert!(rl.check_at(UserId(1), now));
        assert!(rl.check_at(UserId(1), now));
        assert!(!rl.check_at(UserId(1), now));

        // The denial recorded nothing, so one slot frees up as soon as the
        // first event ages out.
        let later = now + Duration::from_secs(61);
        assert!(rl.check_at(UserId(1), later));
    }

    #[test]
    fn window_slides() {
        let mut rl = RateLimiter::new(10, WINDOW);
        let now = Instant::now();

        for _ in 0..10 {
            assert!(rl.check_at(UserId(7), now));
        }
        assert!(!rl.check_at(UserId(7), now + Duration::from_secs(30)));
        assert!(rl.check_at(UserId(7), now + Duration::from_secs(61)));
    }

    #[test]
    fn identities_are_independent() {
        let mut rl = RateLimiter::new(1, WINDOW);
        let now = Instant::now();

        assert!(rl.check_at(UserId(1), now));
        assert!(!rl.check_at(UserId(1), now));
        assert!(rl.check_at(UserId(2), now));
    }

    #[test]
    fn purge_drops_expired_identities() {
        let mut rl = RateLimiter::new(5, WINDOW);
        let now = Instant::now();

        rl.check_at(UserId(1), now);
        rl.check_at(UserId(2), now + Duration::from_secs(50));
        assert_eq!(rl.tracked_users(), 2);

        rl.purge_idle_at(now + Duration::from_secs(70));
        assert_eq!(rl.tracked_users(), 1);
    }
}
