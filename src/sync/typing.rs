use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::api::events::OutgoingEvent;
use crate::sync::timer::QuietPeriod;

/// Remote identities currently typing, per conversation.
///
/// Set semantics: a repeated start refreshes the entry's last-seen time but
/// never counts twice. Entries leave on a stop signal or after `expiry`
/// without a refresh.
#[derive(Debug, Clone)]
pub struct TypingPresence {
    expiry: Duration,
    entries: HashMap<String, HashMap<String, Instant>>,
}

impl TypingPresence {
    pub fn new(expiry: Duration) -> Self {
        Self {
            expiry,
            entries: HashMap::new(),
        }
    }

    /// True when the identity was not already typing.
    pub fn start(&mut self, conversation_id: &str, user_id: &str, now: Instant) -> bool {
        self.entries
            .entry(conversation_id.to_string())
            .or_default()
            .insert(user_id.to_string(), now)
            .is_none()
    }

    pub fn stop(&mut self, conversation_id: &str, user_id: &str) -> bool {
        let Some(users) = self.entries.get_mut(conversation_id) else {
            return false;
        };
        let removed = users.remove(user_id).is_some();
        if users.is_empty() {
            self.entries.remove(conversation_id);
        }
        removed
    }

    /// Evicts entries whose last signal is older than the expiry window.
    /// Returns the evicted `(conversation, user)` pairs.
    pub fn expire(&mut self, now: Instant) -> Vec<(String, String)> {
        let expiry = self.expiry;
        let mut evicted = Vec::new();
        self.entries.retain(|conversation_id, users| {
            users.retain(|user_id, seen| {
                let alive = now.saturating_duration_since(*seen) < expiry;
                if !alive {
                    evicted.push((conversation_id.clone(), user_id.clone()));
                }
                alive
            });
            !users.is_empty()
        });
        evicted
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries
            .values()
            .flat_map(|users| users.values())
            .min()
            .map(|seen| *seen + self.expiry)
    }

    /// Sorted for a stable display order.
    pub fn typing_in(&self, conversation_id: &str) -> Vec<&str> {
        let mut users: Vec<&str> = self
            .entries
            .get(conversation_id)
            .map(|users| users.keys().map(String::as_str).collect())
            .unwrap_or_default();
        users.sort_unstable();
        users
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Outbound typing signals for the local user.
///
/// One `typing_start` per burst of keystrokes and one `typing_stop` once the
/// quiet period passes without another keystroke.
#[derive(Debug, Clone)]
pub struct TypingSignal {
    stop_timer: QuietPeriod,
    burst: Option<String>,
}

impl TypingSignal {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            stop_timer: QuietPeriod::new(quiet_period),
            burst: None,
        }
    }

    pub fn keystroke(&mut self, conversation_id: &str, now: Instant) -> Vec<OutgoingEvent> {
        let mut out = Vec::new();
        if self.burst.as_deref() != Some(conversation_id) {
            out.extend(self.flush());
            self.burst = Some(conversation_id.to_string());
            out.push(OutgoingEvent::TypingStart {
                conversation_id: conversation_id.to_string(),
            });
        }
        self.stop_timer.restart(now);
        out
    }

    pub fn poll(&mut self, now: Instant) -> Option<OutgoingEvent> {
        if !self.stop_timer.fire(now) {
            return None;
        }
        self.burst
            .take()
            .map(|conversation_id| OutgoingEvent::TypingStop { conversation_id })
    }

    /// Ends the current burst right away (message sent, conversation switched).
    pub fn flush(&mut self) -> Option<OutgoingEvent> {
        self.stop_timer.cancel();
        self.burst
            .take()
            .map(|conversation_id| OutgoingEvent::TypingStop { conversation_id })
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.stop_timer.deadline()
    }

    pub fn is_active(&self) -> bool {
        self.burst.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: Duration = Duration::from_secs(2);

    #[test]
    fn start_is_set_semantics() {
        let t0 = Instant::now();
        let mut presence = TypingPresence::new(Duration::from_secs(5));
        assert!(presence.start("c1", "bob", t0));
        assert!(!presence.start("c1", "bob", t0));
        assert_eq!(presence.typing_in("c1"), vec!["bob"]);
        assert!(presence.stop("c1", "bob"));
        assert!(presence.typing_in("c1").is_empty());
        assert!(!presence.stop("c1", "bob"));
    }

    #[test]
    fn idle_typists_expire() {
        let t0 = Instant::now();
        let mut presence = TypingPresence::new(Duration::from_secs(5));
        presence.start("c1", "bob", t0);
        presence.start("c1", "carol", t0 + Duration::from_secs(3));
        assert_eq!(presence.next_deadline(), Some(t0 + Duration::from_secs(5)));

        let evicted = presence.expire(t0 + Duration::from_secs(5));
        assert_eq!(evicted, vec![("c1".to_string(), "bob".to_string())]);
        assert_eq!(presence.typing_in("c1"), vec!["carol"]);
    }

    #[test]
    fn refresh_extends_expiry() {
        let t0 = Instant::now();
        let mut presence = TypingPresence::new(Duration::from_secs(5));
        presence.start("c1", "bob", t0);
        presence.start("c1", "bob", t0 + Duration::from_secs(4));
        assert!(presence.expire(t0 + Duration::from_secs(6)).is_empty());
    }

    #[test]
    fn keystroke_burst_emits_one_start_and_one_stop() {
        let t0 = Instant::now();
        let mut signal = TypingSignal::new(QUIET);
        let mut emitted = Vec::new();
        for i in 0..25u64 {
            let now = t0 + Duration::from_millis(i * 100);
            emitted.extend(signal.keystroke("c1", now));
            emitted.extend(signal.poll(now));
        }
        let last = t0 + Duration::from_millis(2400);
        assert!(signal.poll(last + QUIET - Duration::from_millis(1)).is_none());
        emitted.extend(signal.poll(last + QUIET));
        emitted.extend(signal.poll(last + QUIET * 3));

        assert_eq!(
            emitted,
            vec![
                OutgoingEvent::TypingStart {
                    conversation_id: "c1".into()
                },
                OutgoingEvent::TypingStop {
                    conversation_id: "c1".into()
                },
            ]
        );
    }

    #[test]
    fn switching_conversation_closes_previous_burst() {
        let t0 = Instant::now();
        let mut signal = TypingSignal::new(QUIET);
        signal.keystroke("c1", t0);
        let out = signal.keystroke("c2", t0);
        assert_eq!(
            out,
            vec![
                OutgoingEvent::TypingStop {
                    conversation_id: "c1".into()
                },
                OutgoingEvent::TypingStart {
                    conversation_id: "c2".into()
                },
            ]
        );
    }

    #[test]
    fn flush_stops_immediately_and_cancels_timer() {
        let t0 = Instant::now();
        let mut signal = TypingSignal::new(QUIET);
        signal.keystroke("c1", t0);
        assert!(signal.flush().is_some());
        assert!(signal.deadline().is_none());
        assert!(signal.poll(t0 + QUIET).is_none());
        assert!(signal.flush().is_none());
    }
}
