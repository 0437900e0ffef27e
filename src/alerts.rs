/// Recent warnings and errors surfaced to the operator
///
/// Every alert lands in the transient list, which is emptied a few seconds
/// after the latest alert. Persistent alerts (link failures) are also kept in
/// a second list that survives until the link recovers or the operator
/// clears it while connected. Both lists keep only the newest `MAX_ALERTS`.
use log::{error, warn};
use std::collections::VecDeque;
use tokio::time::{Duration, Instant};

pub const MAX_ALERTS: usize = 5;
/// How long transient alerts stay visible after the latest one
pub const ALERT_DISPLAY_TIME: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Transient,
    Persistent,
}

#[derive(Debug, Default)]
pub struct Alerts {
    transient: VecDeque<String>,
    persistent: VecDeque<String>,
    last_alert: Option<Instant>,
}

impl Alerts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>, severity: Severity, now: Instant) {
        let message = message.into();
        match severity {
            Severity::Transient => warn!("{}", message),
            Severity::Persistent => {
                error!("{}", message);
                push_bounded(&mut self.persistent, message.clone());
            }
        }
        push_bounded(&mut self.transient, message);
        self.last_alert = Some(now);
    }

    pub fn transient(&self) -> impl Iterator<Item = &str> + '_ {
        self.transient.iter().map(String::as_str)
    }

    pub fn persistent(&self) -> impl Iterator<Item = &str> + '_ {
        self.persistent.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.transient.is_empty() && self.persistent.is_empty()
    }

    /// Drop transient alerts once `ALERT_DISPLAY_TIME` has passed since the last one
    pub fn expire(&mut self, now: Instant) {
        let stale = self
            .last_alert
            .is_some_and(|last| now.saturating_duration_since(last) > ALERT_DISPLAY_TIME);
        if stale {
            self.transient.clear();
        }
    }

    /// Operator request; persistent alerts only go away while connected
    pub fn clear(&mut self, connected: bool) {
        self.transient.clear();
        if connected {
            self.persistent.clear();
        }
    }

    /// Everything, used when the link recovers
    pub fn clear_all(&mut self) {
        self.transient.clear();
        self.persistent.clear();
    }
}

fn push_bounded(list: &mut VecDeque<String>, message: String) {
    if list.len() >= MAX_ALERTS {
        list.pop_front();
    }
    list.push_back(message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_newest_alerts() {
        let mut alerts = Alerts::new();
        let now = Instant::now();
        for i in 0..7 {
            alerts.push(format!("warning {i}"), Severity::Transient, now);
        }
        let kept: Vec<_> = alerts.transient().collect();
        assert_eq!(kept, ["warning 2", "warning 3", "warning 4", "warning 5", "warning 6"]);
        assert_eq!(alerts.persistent().count(), 0);
    }

    #[test]
    fn transient_alerts_expire_persistent_ones_stay() {
        let mut alerts = Alerts::new();
        let now = Instant::now();
        alerts.push("No serial port available", Severity::Persistent, now);
        alerts.push("Invalid pressure: 5", Severity::Transient, now);

        alerts.expire(now + Duration::from_secs(5));
        assert_eq!(alerts.transient().count(), 2);
        alerts.expire(now + Duration::from_secs(6));
        assert_eq!(alerts.transient().count(), 0);
        assert_eq!(alerts.persistent().collect::<Vec<_>>(), ["No serial port available"]);
    }

    #[test]
    fn clearing_while_disconnected_keeps_persistent() {
        let mut alerts = Alerts::new();
        alerts.push("No serial port available", Severity::Persistent, Instant::now());

        alerts.clear(false);
        assert_eq!(alerts.persistent().count(), 1);
        alerts.clear(true);
        assert!(alerts.is_empty());
    }
}
