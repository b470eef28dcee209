//! Post-commit notification dispatch.
//!
//! ```text
//!  ledger op ──commit──▶ dispatch(Notification) ──mpsc──▶ worker ──▶ Notifier
//!                                                           │
//!                                                    retry with backoff
//! ```
//!
//! Jobs are handed off only after the business transaction committed.
//! `dispatch` never blocks and never fails the caller; delivery failures are
//! retried per [`RetryPolicy`] and then logged and dropped.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use boxoffice_types::{Participant, Payment, Reservation, Result, RetryPolicy, Ticket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Outbound e-mail collaborator.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_payment_confirmation(
        &self,
        reservation: &Reservation,
        payment: &Payment,
        all_payments: &[Payment],
    ) -> Result<()>;

    async fn send_ticket_delivery(
        &self,
        reservation: &Reservation,
        ticket: &Ticket,
        participants: &[Participant],
        pdf: Option<&[u8]>,
    ) -> Result<()>;
}

/// One queued delivery job.
#[derive(Debug, Clone)]
pub enum Notification {
    PaymentConfirmation {
        reservation: Reservation,
        payment: Payment,
        all_payments: Vec<Payment>,
    },
    TicketDelivery {
        reservation: Reservation,
        ticket: Ticket,
        participants: Vec<Participant>,
        pdf: Option<Vec<u8>>,
    },
}

impl Notification {
    fn kind(&self) -> &'static str {
        match self {
            Self::PaymentConfirmation { .. } => "payment_confirmation",
            Self::TicketDelivery { .. } => "ticket_delivery",
        }
    }

    fn reservation(&self) -> &Reservation {
        match self {
            Self::PaymentConfirmation { reservation, .. }
            | Self::TicketDelivery { reservation, .. } => reservation,
        }
    }

    async fn deliver(&self, notifier: &dyn Notifier) -> Result<()> {
        match self {
            Self::PaymentConfirmation {
                reservation,
                payment,
                all_payments,
            } => {
                notifier
                    .send_payment_confirmation(reservation, payment, all_payments)
                    .await
            }
            Self::TicketDelivery {
                reservation,
                ticket,
                participants,
                pdf,
            } => {
                notifier
                    .send_ticket_delivery(reservation, ticket, participants, pdf.as_deref())
                    .await
            }
        }
    }
}

/// Background queue in front of a [`Notifier`].
///
/// Must be created inside a Tokio runtime.
#[derive(Debug)]
pub struct NotificationDispatcher {
    sender: Mutex<Option<mpsc::UnboundedSender<Notification>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl NotificationDispatcher {
    /// Start the worker task.
    pub fn spawn(notifier: Arc<dyn Notifier>, policy: RetryPolicy) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(receiver, notifier, policy));
        Self {
            sender: Mutex::new(Some(sender)),
            worker: tokio::sync::Mutex::new(Some(worker)),
        }
    }

    /// Queue a job. Never blocks, never fails; a closed queue is logged.
    pub fn dispatch(&self, notification: Notification) {
        let reservation_id = notification.reservation().id;
        let kind = notification.kind();
        let sent = match self.sender.lock() {
            Ok(guard) => guard
                .as_ref()
                .is_some_and(|sender| sender.send(notification).is_ok()),
            Err(_) => false,
        };
        if sent {
            tracing::debug!(%reservation_id, kind, "notification queued");
        } else {
            tracing::error!(%reservation_id, kind, "notification queue closed, job dropped");
        }
    }

    /// Close the queue and wait for queued jobs to finish.
    pub async fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "notification worker panicked");
            }
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<Notification>,
    notifier: Arc<dyn Notifier>,
    policy: RetryPolicy,
) {
    while let Some(job) = receiver.recv().await {
        deliver_with_retry(&job, notifier.as_ref(), policy).await;
    }
    tracing::debug!("notification worker stopped");
}

async fn deliver_with_retry(job: &Notification, notifier: &dyn Notifier, policy: RetryPolicy) {
    let reservation_id = job.reservation().id;
    let kind = job.kind();
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match job.deliver(notifier).await {
            Ok(()) => {
                tracing::info!(%reservation_id, kind, attempt, "notification delivered");
                return;
            }
            Err(e) if attempt < max_attempts => {
                let delay = policy.backoff_for(attempt);
                tracing::warn!(
                    %reservation_id,
                    kind,
                    attempt,
                    error = %e,
                    retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "notification failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(
                    %reservation_id,
                    kind,
                    attempts = attempt,
                    error = %e,
                    "notification failed, giving up"
                );
            }
        }
    }
}
