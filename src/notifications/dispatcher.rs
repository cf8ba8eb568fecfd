//! Fan-out of one domain status observation to all of its owner's
//! notification channels.
//!
//! The reconciler hands a freshly persisted domain plus a transition flag
//! to [`NotificationDispatcher::dispatch`]. Everything past the policy
//! check is best-effort: a channel that fails to send is logged and skipped
//! and leaves no suppression trace, so the next observation tries it again.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::db::entities::prelude::{ChannelConfigModel, DomainModel};
use crate::db::enums::NotificationKind;
use crate::db::store::{ChannelStore, HistoryRecord, HistoryStore};
use crate::notifications::encryption::{EncryptionError, EncryptionService};
use crate::notifications::message;
use crate::notifications::models::ChannelPayload;
use crate::notifications::senders::{NotificationSender, SenderError};
use crate::notifications::suppression::{SuppressionCache, SuppressionPolicy};

/// Cache entries older than this are evicted at the start of a dispatch.
/// Covers the longest possible window (120 min interval) with margin.
const CACHE_RETENTION_HOURS: i64 = 24;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("unsupported channel type: {0}")]
    UnsupportedChannel(String),
    #[error("payload decryption failed: {0}")]
    Encryption(#[from] EncryptionError),
    #[error("payload deserialization failed: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("message rendering failed: {0}")]
    Template(#[from] tera::Error),
    #[error(transparent)]
    Sender(#[from] SenderError),
}

pub struct NotificationDispatcher {
    channels: Arc<dyn ChannelStore>,
    history: Arc<dyn HistoryStore>,
    cache: Arc<SuppressionCache>,
    policy: SuppressionPolicy,
    encryption: Arc<EncryptionService>,
    senders: HashMap<&'static str, Arc<dyn NotificationSender>>,
}

impl NotificationDispatcher {
    pub fn new(
        channels: Arc<dyn ChannelStore>,
        history: Arc<dyn HistoryStore>,
        encryption: Arc<EncryptionService>,
        senders: HashMap<&'static str, Arc<dyn NotificationSender>>,
    ) -> Self {
        let cache = Arc::new(SuppressionCache::new(Duration::hours(
            CACHE_RETENTION_HOURS,
        )));
        let policy = SuppressionPolicy::new(Arc::clone(&cache), Arc::clone(&history));
        Self {
            channels,
            history,
            cache,
            policy,
            encryption,
            senders,
        }
    }

    pub async fn dispatch(&self, domain: &DomainModel, transitioned: bool) {
        self.dispatch_at(domain, transitioned, Utc::now()).await;
    }

    pub(crate) async fn dispatch_at(
        &self,
        domain: &DomainModel,
        transitioned: bool,
        now: DateTime<Utc>,
    ) {
        self.cache.evict_expired(now);

        if !domain.is_active {
            return;
        }
        let kind = NotificationKind::derive(domain.is_available(), transitioned);

        let configs = match self.channels.channels_for_user(domain.user_id).await {
            Ok(configs) => configs,
            Err(e) => {
                error!(domain_id = domain.id, error = %e, "failed to load channel configs");
                return;
            }
        };

        // The cache is written once, after the loop: the first channel's
        // send must not suppress the remaining channels reacting to the
        // same observation.
        let mut any_sent = false;
        for config in &configs {
            match self.policy.should_send(domain, kind, config, now).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        domain_id = domain.id,
                        channel_id = config.id,
                        kind = %kind,
                        "notification suppressed"
                    );
                    continue;
                }
                Err(e) => {
                    error!(
                        domain_id = domain.id,
                        channel_id = config.id,
                        error = %e,
                        "suppression check failed"
                    );
                    continue;
                }
            }

            match self.send_to(domain, kind, config).await {
                Ok(()) => {
                    any_sent = true;
                    let record = HistoryRecord {
                        domain_id: domain.id,
                        channel_id: config.id,
                        kind,
                        status_code: domain.last_status_code,
                        error_description: domain.last_error_description.clone(),
                        notified_at: now,
                    };
                    if let Err(e) = self.history.append(record).await {
                        error!(
                            domain_id = domain.id,
                            channel_id = config.id,
                            error = %e,
                            "failed to record notification history"
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        domain_id = domain.id,
                        channel_id = config.id,
                        channel_type = %config.channel_type,
                        error = %e,
                        "notification send failed"
                    );
                }
            }
        }

        if any_sent {
            self.cache.record(domain.id, kind, now);
        }
    }

    async fn send_to(
        &self,
        domain: &DomainModel,
        kind: NotificationKind,
        config: &ChannelConfigModel,
    ) -> Result<(), DispatchError> {
        let sender = self
            .senders
            .get(config.channel_type.as_str())
            .ok_or_else(|| DispatchError::UnsupportedChannel(config.channel_type.clone()))?;

        let payload_bytes = self.encryption.decrypt(&config.payload)?;
        let payload: ChannelPayload = serde_json::from_slice(&payload_bytes)?;

        let subject = message::render_subject(domain, kind);
        let body = message::render_body(domain, kind)?;
        sender.send(&payload, &subject, &body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::models::CHANNEL_TELEGRAM;
    use crate::test_utils::{
        channel_config, domain_model, sealed_telegram_payload, test_encryption,
        MockChannelStore, MockHistoryStore, RecordingSender,
    };
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 3, 12, 0, 0).unwrap()
    }

    struct Fixture {
        dispatcher: NotificationDispatcher,
        channels: Arc<MockChannelStore>,
        history: Arc<MockHistoryStore>,
        sender: Arc<RecordingSender>,
    }

    fn fixture() -> Fixture {
        let channels = Arc::new(MockChannelStore::new());
        let history = Arc::new(MockHistoryStore::new());
        let sender = Arc::new(RecordingSender::new());
        let mut senders: HashMap<&'static str, Arc<dyn NotificationSender>> = HashMap::new();
        senders.insert(CHANNEL_TELEGRAM, Arc::clone(&sender) as _);
        let dispatcher = NotificationDispatcher::new(
            Arc::clone(&channels) as _,
            Arc::clone(&history) as _,
            test_encryption(),
            senders,
        );
        Fixture {
            dispatcher,
            channels,
            history,
            sender,
        }
    }

    /// A domain that is down: checked, last status 503.
    fn down_domain() -> DomainModel {
        let mut domain = domain_model(1, 20, "US");
        domain.last_status_code = Some(503);
        domain.last_checked_at = Some(now());
        domain
    }

    #[tokio::test]
    async fn down_is_sent_then_suppressed_then_sent_again() {
        let fx = fixture();
        let mut channel = channel_config(1);
        channel.payload = sealed_telegram_payload();
        fx.channels.put(1, vec![channel]);
        let domain = down_domain();

        // t=0: first down goes out.
        fx.dispatcher.dispatch_at(&domain, true, now()).await;
        assert_eq!(fx.sender.sent_count(), 1);

        // t=5min: inside the 10-minute window for interval=20.
        fx.dispatcher
            .dispatch_at(&domain, false, now() + Duration::minutes(5))
            .await;
        assert_eq!(fx.sender.sent_count(), 1);

        // t=11min: window elapsed, re-alert.
        fx.dispatcher
            .dispatch_at(&domain, false, now() + Duration::minutes(11))
            .await;
        assert_eq!(fx.sender.sent_count(), 2);
        assert_eq!(fx.history.appended_count(), 2);
    }

    #[tokio::test]
    async fn up_is_never_sent_to_a_channel_with_up_disabled() {
        let fx = fixture();
        let mut channel = channel_config(1);
        channel.payload = sealed_telegram_payload();
        channel.notify_on_up = false;
        fx.channels.put(1, vec![channel]);

        let mut domain = domain_model(1, 20, "US");
        domain.last_status_code = Some(200);
        domain.last_checked_at = Some(now());

        fx.dispatcher.dispatch_at(&domain, true, now()).await;
        assert_eq!(fx.sender.sent_count(), 0);
        assert_eq!(fx.history.appended_count(), 0);
    }

    #[tokio::test]
    async fn all_channels_of_one_observation_are_served() {
        let fx = fixture();
        let mut first = channel_config(1);
        first.payload = sealed_telegram_payload();
        let mut second = channel_config(2);
        second.payload = sealed_telegram_payload();
        fx.channels.put(1, vec![first, second]);

        fx.dispatcher.dispatch_at(&down_domain(), true, now()).await;
        // The coarse per-domain cache must not cut off the second channel
        // of the same dispatch.
        assert_eq!(fx.sender.sent_count(), 2);
        assert_eq!(fx.history.appended_count(), 2);
    }

    #[tokio::test]
    async fn a_failing_send_leaves_no_suppression_trace() {
        let fx = fixture();
        let mut channel = channel_config(1);
        channel.payload = sealed_telegram_payload();
        fx.channels.put(1, vec![channel]);
        fx.sender.fail_next(1);
        let domain = down_domain();

        fx.dispatcher.dispatch_at(&domain, true, now()).await;
        assert_eq!(fx.history.appended_count(), 0);

        // One minute later the retry is not artificially suppressed.
        fx.dispatcher
            .dispatch_at(&domain, false, now() + Duration::minutes(1))
            .await;
        assert_eq!(fx.sender.sent_count(), 1);
        assert_eq!(fx.history.appended_count(), 1);
    }

    #[tokio::test]
    async fn one_channels_failure_does_not_block_the_next() {
        let fx = fixture();
        let mut first = channel_config(1);
        first.payload = sealed_telegram_payload();
        let mut second = channel_config(2);
        second.payload = sealed_telegram_payload();
        fx.channels.put(1, vec![first, second]);
        fx.sender.fail_next(1);

        fx.dispatcher.dispatch_at(&down_domain(), true, now()).await;
        assert_eq!(fx.sender.sent_count(), 1);
        assert_eq!(fx.history.appended_count(), 1);
    }

    #[tokio::test]
    async fn inactive_domains_are_never_alerted() {
        let fx = fixture();
        let mut channel = channel_config(1);
        channel.payload = sealed_telegram_payload();
        fx.channels.put(1, vec![channel]);

        let mut domain = down_domain();
        domain.is_active = false;
        fx.dispatcher.dispatch_at(&domain, true, now()).await;
        assert_eq!(fx.sender.sent_count(), 0);
    }

    #[tokio::test]
    async fn region_filtered_channel_sees_no_foreign_region_traffic() {
        let fx = fixture();
        let mut channel = channel_config(1);
        channel.payload = sealed_telegram_payload();
        channel.regions = serde_json::json!(["TH"]);
        fx.channels.put(1, vec![channel]);

        fx.dispatcher.dispatch_at(&down_domain(), true, now()).await;
        assert_eq!(fx.sender.sent_count(), 0);
    }
}
