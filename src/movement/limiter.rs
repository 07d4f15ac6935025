use chrono::{DateTime, Duration, Utc};

pub fn default_cooldown() -> Duration {
    Duration::minutes(5)
}

/// Cooldown gate in front of the notifier.
#[derive(Debug, Clone)]
pub struct AlertRateLimiter {
    cooldown: Duration,
    last_fired_at: Option<DateTime<Utc>>,
}

impl AlertRateLimiter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_fired_at: None,
        }
    }

    /// Commits `now` as the last alert time when the gate is open. The commit stands
    /// even if the notification later fails.
    pub fn try_fire(&mut self, now: DateTime<Utc>) -> bool {
        let open = match self.last_fired_at {
            None => true,
            Some(last) => now.signed_duration_since(last) >= self.cooldown,
        };

        if open {
            self.last_fired_at = Some(now);
        }
        open
    }

    pub fn last_fired_at(&self) -> Option<DateTime<Utc>> {
        self.last_fired_at
    }
}

impl Default for AlertRateLimiter {
    fn default() -> Self {
        Self::new(default_cooldown())
    }
}
