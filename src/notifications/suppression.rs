//! Notification suppression.
//!
//! Two layers decide whether a notification may go out. The in-memory
//! cache is coarse (per domain and kind, any channel) and cheap; it exists
//! so many channels reacting to the same observation within one process
//! cannot flood. The persisted history is per channel and survives
//! restarts; it is the authoritative layer. Both must clear for a send.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::db::entities::prelude::{ChannelConfigModel, DomainModel};
use crate::db::enums::{NotificationKind, Region};
use crate::db::store::{HistoryStore, StoreError};

/// Floor for any suppression window. Transitions re-alert faster than
/// routine status pings but never faster than this, which bounds the
/// worst-case alert volume per domain.
const MIN_WINDOW_MINUTES: i64 = 2;

/// Suppression window for a domain's notifications of the given kind:
/// the poll interval, halved for up/down transitions, clamped to the floor.
pub fn suppression_window(interval_minutes: i32, kind: NotificationKind) -> Duration {
    let mut minutes = i64::from(interval_minutes);
    if kind.is_transition() {
        minutes /= 2;
    }
    Duration::minutes(minutes.max(MIN_WINDOW_MINUTES))
}

/// Process-local last-sent timestamps, keyed (domain, kind) across all
/// channels. One mutex guards both lookups and the opportunistic eviction
/// performed at the start of each dispatch; lock holds are all sub-await.
pub struct SuppressionCache {
    entries: Mutex<HashMap<(i32, NotificationKind), DateTime<Utc>>>,
    retention: Duration,
}

impl SuppressionCache {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            retention,
        }
    }

    /// Drops entries older than the retention bound. Called at the start of
    /// every dispatch rather than from a sweeper task.
    pub fn evict_expired(&self, now: DateTime<Utc>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let retention = self.retention;
        entries.retain(|_, sent_at| now - *sent_at <= retention);
    }

    pub fn last_sent(&self, domain_id: i32, kind: NotificationKind) -> Option<DateTime<Utc>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(&(domain_id, kind)).copied()
    }

    /// Recorded only after a dispatch physically delivered something; a
    /// dispatch where every send failed must leave the cache untouched so
    /// the next attempt is not artificially suppressed.
    pub fn record(&self, domain_id: i32, kind: NotificationKind, sent_at: DateTime<Utc>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert((domain_id, kind), sent_at);
    }
}

/// Per-channel send/suppress decision.
pub struct SuppressionPolicy {
    cache: Arc<SuppressionCache>,
    history: Arc<dyn HistoryStore>,
}

impl SuppressionPolicy {
    pub fn new(cache: Arc<SuppressionCache>, history: Arc<dyn HistoryStore>) -> Self {
        Self { cache, history }
    }

    pub async fn should_send(
        &self,
        domain: &DomainModel,
        kind: NotificationKind,
        channel: &ChannelConfigModel,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if !channel.is_active {
            return Ok(false);
        }
        match kind {
            NotificationKind::Down if !channel.notify_on_down => return Ok(false),
            NotificationKind::Up if !channel.notify_on_up => return Ok(false),
            _ => {}
        }
        if !channel.accepts_region(Region::parse_lossy(&domain.region)) {
            return Ok(false);
        }

        let window = suppression_window(domain.interval_minutes, kind);
        if let Some(last) = self.cache.last_sent(domain.id, kind) {
            if now - last < window {
                return Ok(false);
            }
        }
        if let Some(last) = self
            .history
            .last_notified_at(domain.id, channel.id, kind)
            .await?
        {
            if now - last < window {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{channel_config, domain_model, MockHistoryStore};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 3, 12, 0, 0).unwrap()
    }

    fn policy_with(
        history: Arc<MockHistoryStore>,
    ) -> (Arc<SuppressionCache>, SuppressionPolicy) {
        let cache = Arc::new(SuppressionCache::new(Duration::hours(24)));
        let policy = SuppressionPolicy::new(Arc::clone(&cache), history);
        (cache, policy)
    }

    #[test]
    fn transitions_halve_the_window_with_a_floor() {
        assert_eq!(
            suppression_window(20, NotificationKind::Down),
            Duration::minutes(10)
        );
        assert_eq!(
            suppression_window(20, NotificationKind::Status),
            Duration::minutes(20)
        );
        // 10 / 2 = 5 stays above the floor; 2 / 2 = 1 clamps to it.
        assert_eq!(
            suppression_window(10, NotificationKind::Up),
            Duration::minutes(5)
        );
        assert_eq!(
            suppression_window(2, NotificationKind::Down),
            Duration::minutes(2)
        );
    }

    #[tokio::test]
    async fn inactive_channels_never_send() {
        let (_, policy) = policy_with(Arc::new(MockHistoryStore::new()));
        let mut channel = channel_config(1);
        channel.is_active = false;
        let domain = domain_model(1, 20, "US");
        assert!(!policy
            .should_send(&domain, NotificationKind::Down, &channel, now())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn kind_flags_gate_their_kind_only() {
        let (_, policy) = policy_with(Arc::new(MockHistoryStore::new()));
        let mut channel = channel_config(1);
        channel.notify_on_up = false;
        let domain = domain_model(1, 20, "US");
        assert!(!policy
            .should_send(&domain, NotificationKind::Up, &channel, now())
            .await
            .unwrap());
        assert!(policy
            .should_send(&domain, NotificationKind::Down, &channel, now())
            .await
            .unwrap());
        assert!(policy
            .should_send(&domain, NotificationKind::Status, &channel, now())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn region_filter_excludes_non_members() {
        let (_, policy) = policy_with(Arc::new(MockHistoryStore::new()));
        let mut channel = channel_config(1);
        channel.regions = serde_json::json!(["SG", "TH"]);
        assert!(!policy
            .should_send(
                &domain_model(1, 20, "US"),
                NotificationKind::Down,
                &channel,
                now()
            )
            .await
            .unwrap());
        assert!(policy
            .should_send(
                &domain_model(1, 20, "TH"),
                NotificationKind::Down,
                &channel,
                now()
            )
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn cache_hit_within_the_window_suppresses_any_channel() {
        let (cache, policy) = policy_with(Arc::new(MockHistoryStore::new()));
        let domain = domain_model(1, 20, "US");
        let channel = channel_config(1);

        cache.record(domain.id, NotificationKind::Down, now());
        assert!(!policy
            .should_send(
                &domain,
                NotificationKind::Down,
                &channel,
                now() + Duration::minutes(5)
            )
            .await
            .unwrap());
        // 11 minutes later the 10-minute transition window has passed.
        assert!(policy
            .should_send(
                &domain,
                NotificationKind::Down,
                &channel,
                now() + Duration::minutes(11)
            )
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn history_hit_within_the_window_suppresses_that_channel() {
        let history = Arc::new(MockHistoryStore::new());
        let (_, policy) = policy_with(Arc::clone(&history));
        let domain = domain_model(1, 20, "US");
        let channel = channel_config(7);

        history.set_last(domain.id, channel.id, NotificationKind::Down, now());
        assert!(!policy
            .should_send(
                &domain,
                NotificationKind::Down,
                &channel,
                now() + Duration::minutes(9)
            )
            .await
            .unwrap());
        assert!(policy
            .should_send(
                &domain,
                NotificationKind::Down,
                &channel,
                now() + Duration::minutes(11)
            )
            .await
            .unwrap());

        // A different channel has no history and is only held back by the
        // (empty) cache.
        let other = channel_config(8);
        assert!(policy
            .should_send(&domain, NotificationKind::Down, &other, now())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn kinds_are_suppressed_independently() {
        let (cache, policy) = policy_with(Arc::new(MockHistoryStore::new()));
        let domain = domain_model(1, 20, "US");
        let channel = channel_config(1);

        cache.record(domain.id, NotificationKind::Down, now());
        assert!(policy
            .should_send(
                &domain,
                NotificationKind::Status,
                &channel,
                now() + Duration::minutes(1)
            )
            .await
            .unwrap());
    }

    #[test]
    fn eviction_drops_only_stale_entries() {
        let cache = SuppressionCache::new(Duration::hours(1));
        cache.record(1, NotificationKind::Down, now() - Duration::hours(2));
        cache.record(2, NotificationKind::Down, now() - Duration::minutes(5));

        cache.evict_expired(now());
        assert!(cache.last_sent(1, NotificationKind::Down).is_none());
        assert!(cache.last_sent(2, NotificationKind::Down).is_some());
    }
}
