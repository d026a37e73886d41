use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use ulid::Ulid;

use crate::limits::MAIL_QUEUE_CAPACITY;
use crate::model::{Event, PropertyState};
use crate::observability;

/// Which mail template a transition triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MailKind {
    /// Owner: a guest requested a reservation.
    NewRequest,
    /// Guest: the owner accepted.
    Accepted,
    /// Guest: the owner refused.
    Refused,
    /// Owner: the guest canceled.
    Canceled,
}

impl MailKind {
    pub fn subject(&self) -> &'static str {
        match self {
            MailKind::NewRequest => "You have a new reservation request",
            MailKind::Accepted => "Your reservation request was accepted",
            MailKind::Refused => "Your reservation request was refused",
            MailKind::Canceled => "A reservation request was canceled",
        }
    }
}

/// Everything a transport needs to render and address one notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailRequest {
    pub kind: MailKind,
    pub property_id: Ulid,
    pub reservation_id: Ulid,
    pub recipient: Ulid,
}

/// Map a committed event to the mail it triggers, per the transition table.
/// Events outside the table (finish, evaluation, wishlist, listings) send
/// nothing. Call only after the event has been applied to `rs`.
pub fn mail_for_event(rs: &PropertyState, event: &Event) -> Option<MailRequest> {
    match event {
        Event::ReservationRequested { id, property_id, .. } => Some(MailRequest {
            kind: MailKind::NewRequest,
            property_id: *property_id,
            reservation_id: *id,
            recipient: rs.owner_id,
        }),
        Event::ReservationAccepted { id, property_id }
        | Event::ReservationRefused { id, property_id } => {
            let kind = if matches!(event, Event::ReservationAccepted { .. }) {
                MailKind::Accepted
            } else {
                MailKind::Refused
            };
            Some(MailRequest {
                kind,
                property_id: *property_id,
                reservation_id: *id,
                recipient: rs.reservation(id)?.guest_id,
            })
        }
        Event::ReservationCanceled { id, property_id } => Some(MailRequest {
            kind: MailKind::Canceled,
            property_id: *property_id,
            reservation_id: *id,
            recipient: rs.owner_id,
        }),
        _ => None,
    }
}

#[derive(Debug)]
pub struct MailError(pub String);

impl std::fmt::Display for MailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mail transport error: {}", self.0)
    }
}

impl std::error::Error for MailError {}

/// Outbound delivery seam. Implementations talk to SMTP or a provider API;
/// the engine only ever enqueues.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, mail: &MailRequest) -> Result<(), MailError>;
}

/// Default transport: structured log line per mail. Useful until a real
/// delivery backend is wired in, and in development.
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn deliver(&self, mail: &MailRequest) -> Result<(), MailError> {
        let payload = serde_json::to_string(mail).map_err(|e| MailError(e.to_string()))?;
        tracing::info!(
            target: "pousada::mail",
            subject = mail.kind.subject(),
            %payload,
            "mail delivered"
        );
        Ok(())
    }
}

/// Handle for enqueueing mail. Fire-and-forget: a full queue drops the
/// request, a failing transport is logged, and neither reaches the caller.
pub struct Mailer {
    tx: mpsc::Sender<MailRequest>,
}

impl Mailer {
    /// Spawn the delivery task and return the enqueue handle.
    pub fn spawn(transport: Arc<dyn MailTransport>) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(MAIL_QUEUE_CAPACITY);
        tokio::spawn(mailer_loop(transport, rx));
        Arc::new(Self { tx })
    }

    /// Queue one mail. Never blocks and never fails the caller — the state
    /// transition that triggered this has already committed.
    pub fn send(&self, mail: MailRequest) {
        metrics::counter!(observability::MAIL_ENQUEUED_TOTAL).increment(1);
        if self.tx.try_send(mail).is_err() {
            metrics::counter!(observability::MAIL_DROPPED_TOTAL).increment(1);
            tracing::warn!("mail queue full or closed, dropping notification");
        }
    }
}

async fn mailer_loop(transport: Arc<dyn MailTransport>, mut rx: mpsc::Receiver<MailRequest>) {
    while let Some(mail) = rx.recv().await {
        if let Err(e) = transport.deliver(&mail).await {
            metrics::counter!(observability::MAIL_FAILED_TOTAL).increment(1);
            tracing::warn!(
                reservation = %mail.reservation_id,
                recipient = %mail.recipient,
                "mail delivery failed: {e}"
            );
        }
    }
}
