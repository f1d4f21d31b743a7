use crate::domain::types::{CalendarEvent, ImpactLevel};
use chrono::{DateTime, Duration, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct NewsBlackoutConfig {
    /// Half-width of the blackout window around each high-impact event.
    pub buffer: Duration,
}

impl Default for NewsBlackoutConfig {
    fn default() -> Self {
        Self {
            buffer: Duration::minutes(30),
        }
    }
}

struct NewsState {
    events: Vec<CalendarEvent>,
    /// Last observed blockage, kept so entering/leaving the window is logged
    /// once per edge rather than on every poll.
    blocked_by: Option<String>,
}

/// Time-window filter over externally supplied calendar events.
///
/// The calendar collaborator controls fetch cadence; [`NewsBlackoutGuard::refresh`]
/// is the only ingestion point and replaces the whole batch atomically.
pub struct NewsBlackoutGuard {
    config: NewsBlackoutConfig,
    state: Mutex<NewsState>,
}

impl NewsBlackoutGuard {
    pub fn new(config: NewsBlackoutConfig) -> Self {
        Self {
            config,
            state: Mutex::new(NewsState {
                events: Vec::new(),
                blocked_by: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, NewsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the current event batch. No partial merge.
    pub fn refresh(&self, events: Vec<CalendarEvent>) {
        let mut state = self.lock();
        debug!("NewsBlackout: calendar refreshed ({} events)", events.len());
        state.events = events;
    }

    /// Name of the high-impact event whose window covers `now`, if any.
    pub fn blocking_event(&self, now: DateTime<Utc>) -> Option<String> {
        let mut state = self.lock();
        let blocking = state
            .events
            .iter()
            .find(|e| {
                e.impact == ImpactLevel::High
                    && now >= e.time - self.config.buffer
                    && now <= e.time + self.config.buffer
            })
            .map(|e| e.name.clone());

        match (&state.blocked_by, &blocking) {
            (None, Some(name)) => {
                warn!("NewsBlackout: entered blackout window for '{}'", name);
            }
            (Some(prev), None) => {
                info!("NewsBlackout: left blackout window for '{}'", prev);
            }
            _ => {}
        }
        state.blocked_by = blocking.clone();
        blocking
    }

    pub fn is_blocked(&self, now: DateTime<Utc>) -> bool {
        self.blocking_event(now).is_some()
    }

    /// Upcoming high-impact events, soonest first.
    pub fn upcoming(&self, now: DateTime<Utc>, limit: usize) -> Vec<CalendarEvent> {
        let state = self.lock();
        let mut pending: Vec<CalendarEvent> = state
            .events
            .iter()
            .filter(|e| e.impact == ImpactLevel::High && e.time > now)
            .cloned()
            .collect();
        pending.sort_by_key(|e| e.time);
        pending.truncate(limit);
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str, impact: ImpactLevel, time: DateTime<Utc>) -> CalendarEvent {
        CalendarEvent {
            name: name.to_string(),
            impact,
            time,
        }
    }

    #[test]
    fn blocks_inside_high_impact_window() {
        let guard = NewsBlackoutGuard::new(NewsBlackoutConfig::default());
        let now = Utc::now();
        guard.refresh(vec![event("NFP Report", ImpactLevel::High, now + Duration::minutes(15))]);

        assert_eq!(guard.blocking_event(now), Some("NFP Report".to_string()));
        assert!(guard.is_blocked(now + Duration::minutes(45)));
        assert!(!guard.is_blocked(now + Duration::minutes(46)));
        assert!(!guard.is_blocked(now - Duration::minutes(16)));
    }

    #[test]
    fn medium_impact_does_not_block() {
        let guard = NewsBlackoutGuard::new(NewsBlackoutConfig::default());
        let now = Utc::now();
        guard.refresh(vec![event("PMI Manufacturing", ImpactLevel::Medium, now)]);
        assert!(!guard.is_blocked(now));
    }

    #[test]
    fn refresh_replaces_batch_entirely() {
        let guard = NewsBlackoutGuard::new(NewsBlackoutConfig::default());
        let now = Utc::now();
        guard.refresh(vec![event("FOMC Rate Decision", ImpactLevel::High, now)]);
        assert!(guard.is_blocked(now));

        guard.refresh(vec![]);
        assert!(!guard.is_blocked(now));
    }

    #[test]
    fn upcoming_sorted_and_high_impact_only() {
        let guard = NewsBlackoutGuard::new(NewsBlackoutConfig::default());
        let now = Utc::now();
        guard.refresh(vec![
            event("CPI Data", ImpactLevel::High, now + Duration::hours(4)),
            event("PMI Services", ImpactLevel::Low, now + Duration::hours(1)),
            event("NFP Report", ImpactLevel::High, now + Duration::hours(2)),
        ]);

        let upcoming = guard.upcoming(now, 5);
        assert_eq!(upcoming.len(), 2);
        assert_eq!(upcoming[0].name, "NFP Report");
        assert_eq!(upcoming[1].name, "CPI Data");
    }
}
