//! Notification message rendering.
//!
//! One embedded Tera template per notification kind, rendered with the
//! domain's latest status fields. Channel senders decide how the rendered
//! body is wrapped (Telegram escaping, email subject line).

use tera::{Context, Tera};

use crate::db::entities::prelude::DomainModel;
use crate::db::enums::NotificationKind;

const DOWN_TEMPLATE: &str = "⚠️ {{ url }} is DOWN{% if status_code %} (HTTP {{ status_code }}){% endif %}{% if error %} — {{ error }}{% endif %}";
const UP_TEMPLATE: &str =
    "✅ {{ url }} is back up{% if response_ms %} ({{ response_ms }} ms){% endif %}";
const STATUS_TEMPLATE: &str =
    "{{ url }}: HTTP {{ status }}{% if response_ms %}, {{ response_ms }} ms{% endif %}";

fn template_for(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::Down => DOWN_TEMPLATE,
        NotificationKind::Up => UP_TEMPLATE,
        NotificationKind::Status => STATUS_TEMPLATE,
    }
}

pub fn render_body(domain: &DomainModel, kind: NotificationKind) -> Result<String, tera::Error> {
    let mut context = Context::new();
    context.insert("url", &domain.url);
    context.insert("region", &domain.region);
    context.insert("status_code", &domain.last_status_code);
    let status = domain
        .last_status_code
        .map(|code| code.to_string())
        .unwrap_or_else(|| "?".to_string());
    context.insert("status", &status);
    context.insert("response_ms", &domain.last_total_time_ms);
    let error = domain
        .last_error_description
        .as_deref()
        .filter(|description| !description.is_empty());
    context.insert("error", &error);
    Tera::one_off(template_for(kind), &context, false)
}

pub fn render_subject(domain: &DomainModel, kind: NotificationKind) -> String {
    match kind {
        NotificationKind::Down => format!("[domainpulse] DOWN: {}", domain.url),
        NotificationKind::Up => format!("[domainpulse] UP: {}", domain.url),
        NotificationKind::Status => format!("[domainpulse] status: {}", domain.url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn domain(status: Option<i32>, error: Option<&str>) -> DomainModel {
        DomainModel {
            id: 1,
            user_id: 1,
            url: "https://example.com".to_string(),
            region: "US".to_string(),
            interval_minutes: 20,
            is_active: true,
            last_status_code: status,
            last_error_code: None,
            last_error_description: error.map(str::to_string),
            last_total_time_ms: Some(345),
            last_checked_at: Some(Utc::now()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn down_body_includes_status_and_reason() {
        let body = render_body(
            &domain(Some(503), Some("service unavailable")),
            NotificationKind::Down,
        )
        .unwrap();
        assert_eq!(
            body,
            "⚠️ https://example.com is DOWN (HTTP 503) — service unavailable"
        );
    }

    #[test]
    fn down_body_without_a_status_omits_the_parenthetical() {
        let body = render_body(&domain(None, None), NotificationKind::Down).unwrap();
        assert_eq!(body, "⚠️ https://example.com is DOWN");
    }

    #[test]
    fn up_body_carries_the_response_time() {
        let body = render_body(&domain(Some(200), None), NotificationKind::Up).unwrap();
        assert_eq!(body, "✅ https://example.com is back up (345 ms)");
    }

    #[test]
    fn status_body_is_terse() {
        let body = render_body(&domain(Some(200), None), NotificationKind::Status).unwrap();
        assert_eq!(body, "https://example.com: HTTP 200, 345 ms");
    }
}
