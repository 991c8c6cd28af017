use std::{sync::Arc, time::Duration};

use tokio::{select, sync::Notify, task::JoinHandle};
use tracing::{error, info, info_span, warn, Instrument};

use crate::{
    models::types::UtcDateTime,
    notifier::Notifier,
    repository::{AttemptOutcome, NotificationRepository},
};

const POLL_INTERVAL: Duration = Duration::from_secs(30);
const DELIVERY_BATCH_SIZE: u32 = 32;

/// Background delivery of the notification outbox.
pub struct NotificationService {
    notifier: Arc<dyn Notifier>,
    notification_repository: Arc<NotificationRepository>,
    max_attempts: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub will_retry: usize,
    pub given_up: usize,
}

impl NotificationService {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        notification_repository: Arc<NotificationRepository>,
        max_attempts: u32,
    ) -> NotificationService {
        NotificationService {
            notifier,
            notification_repository,
            max_attempts,
        }
    }

    /// Runs delivery passes until `shutdown` is notified. A pass runs at startup, whenever
    /// `wakeup` is notified, and every [`POLL_INTERVAL`] otherwise.
    pub fn start(self, shutdown: Arc<Notify>, wakeup: Arc<Notify>) -> JoinHandle<()> {
        tokio::spawn(
            async move {
                loop {
                    match self.deliver_pending().await {
                        Ok(report) if report != DeliveryReport::default() => {
                            info!("Delivery pass finished: {report:?}")
                        }
                        Ok(_) => {}
                        Err(err) => error!("Could not deliver notifications: {err:#}"),
                    }

                    select! {
                        _ = shutdown.notified() => {
                            info!("Shutdown requested, stopping notification delivery");
                            break;
                        }
                        _ = wakeup.notified() => {}
                        _ = tokio::time::sleep(POLL_INTERVAL) => {}
                    }
                }
            }
            .instrument(info_span!("notification_dispatcher")),
        )
    }

    #[tracing::instrument(skip(self))]
    pub async fn deliver_pending(&self) -> Result<DeliveryReport, anyhow::Error> {
        let pending = self
            .notification_repository
            .get_pending_notifications(DELIVERY_BATCH_SIZE)
            .await?;

        let mut report = DeliveryReport::default();

        for notification in pending {
            match self.notifier.send(&notification).await {
                Ok(()) => {
                    self.notification_repository
                        .mark_delivered(notification.id, UtcDateTime::now())
                        .await?;
                    report.delivered += 1;
                }

                Err(err) => {
                    let error = format!("{err:#}");
                    let outcome = self
                        .notification_repository
                        .record_failed_attempt(
                            notification.id,
                            &error,
                            UtcDateTime::now(),
                            self.max_attempts,
                        )
                        .await?;

                    match outcome {
                        AttemptOutcome::WillRetry => {
                            warn!(
                                "Could not deliver notification {:?} to {} (attempt {}): {error}",
                                notification.id,
                                notification.recipient,
                                notification.attempts + 1
                            );
                            report.will_retry += 1;
                        }
                        AttemptOutcome::GaveUp => {
                            error!(
                                "Giving up on notification {:?} to {} after {} attempts: {error}",
                                notification.id,
                                notification.recipient,
                                notification.attempts + 1
                            );
                            report.given_up += 1;
                        }
                    }
                }
            }
        }

        Ok(report)
    }
}
