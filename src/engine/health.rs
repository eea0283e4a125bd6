use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::store::StateSnapshot;

/// Liveness view of the position manager
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub last_tick_at: Option<DateTime<Utc>>,
    pub tick_count: u64,
    pub tracked_positions: usize,
    /// Symbols currently failing, with their consecutive failure count
    pub failing: Vec<(String, u32)>,
}

impl HealthStatus {
    /// Rebuild from the persisted heartbeat, for out-of-process checks
    pub fn from_snapshot(snapshot: &StateSnapshot) -> Self {
        Self {
            last_tick_at: snapshot.last_tick_at,
            tick_count: snapshot.tick_count,
            tracked_positions: snapshot.active_positions.len(),
            failing: Vec::new(),
        }
    }

    /// No tick within `max_age` of `now`, or never ticked at all
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match self.last_tick_at {
            Some(at) => now - at > max_age,
            None => true,
        }
    }

    pub fn is_healthy(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        !self.is_stale(now, max_age) && self.failing.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staleness() {
        let now = Utc::now();
        let mut status = HealthStatus {
            last_tick_at: None,
            tick_count: 0,
            tracked_positions: 0,
            failing: Vec::new(),
        };
        assert!(status.is_stale(now, Duration::seconds(90)));

        status.last_tick_at = Some(now - Duration::seconds(30));
        assert!(status.is_healthy(now, Duration::seconds(90)));

        status.last_tick_at = Some(now - Duration::seconds(120));
        assert!(status.is_stale(now, Duration::seconds(90)));
    }

    #[test]
    fn test_failing_symbols_are_unhealthy() {
        let now = Utc::now();
        let status = HealthStatus {
            last_tick_at: Some(now),
            tick_count: 3,
            tracked_positions: 1,
            failing: vec![("BTCUSDT:LONG".into(), 2)],
        };
        assert!(!status.is_healthy(now, Duration::seconds(90)));
    }
}
