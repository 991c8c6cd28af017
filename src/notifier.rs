use std::time::Duration;

use async_trait::async_trait;
use indoc::formatdoc;
use serde::Serialize;
use time::{
    format_description::{well_known::Rfc3339, FormatItem},
    macros::format_description,
    OffsetDateTime,
};
use tracing::info;

use crate::models::{Notification, NotificationKind};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);
const DUE_DATE_FORMAT: &[FormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute] UTC");

/// Delivers outbox messages to the people they are addressed to.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), anyhow::Error>;
}

/// Posts `{ to, type, data }` to an email-sending endpoint.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    to: &'a str,
    #[serde(rename = "type")]
    kind: String,
    data: &'a serde_json::Value,
}

impl<'a> From<&'a Notification> for WebhookMessage<'a> {
    fn from(notification: &'a Notification) -> Self {
        WebhookMessage {
            to: &notification.recipient,
            kind: notification.kind.to_string(),
            data: &notification.payload,
        }
    }
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<WebhookNotifier, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;

        Ok(WebhookNotifier {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), anyhow::Error> {
        self.client
            .post(&self.url)
            .json(&WebhookMessage::from(notification))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

/// Writes messages to the log instead of sending them. Used when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), anyhow::Error> {
        info!(
            "Notification {:?} for {}:\n{}",
            notification.id,
            notification.recipient,
            render_message(notification)
        );
        Ok(())
    }
}

pub fn render_message(notification: &Notification) -> String {
    match notification.kind {
        NotificationKind::ReviewAssigned => {
            let payload = &notification.payload;

            let name = payload["extension_name"].as_str().unwrap_or("An extension");
            let number = payload["assignment_number"]
                .as_u64()
                .map(|n| format!(" (assignment #{n})"))
                .unwrap_or_default();
            let due = payload["due_date"]
                .as_str()
                .and_then(|due| OffsetDateTime::parse(due, &Rfc3339).ok())
                .and_then(|due| due.format(DUE_DATE_FORMAT).ok())
                .unwrap_or_else(|| "the deadline".to_string());

            formatdoc! {
                r#"
                    # You have a new extension to review!

                    **{name}**{number} is waiting for you.

                    Please submit your review before {due}.
                "#,
                name = name,
                number = number,
                due = due,
            }
        }
    }
}
