use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery status of an alert record, derived from its `is_sent`/`failed` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Pending => write!(f, "pending"),
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Failed => write!(f, "failed"),
        }
    }
}

/// An application event that may give rise to alerts (e.g. "user_created").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Identity of the event. Replaying the same event must not duplicate records.
    pub id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl TriggerEvent {
    /// Build a fresh event with a random id, stamped now.
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            payload,
            occurred_at: Utc::now(),
        }
    }
}

/// Someone who can receive alerts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: Uuid,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl Recipient {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            email: None,
            display_name: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Title and body rendered for one recipient on one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedContent {
    pub title: String,
    pub body: String,
}

impl RenderedContent {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// One persisted unit of notification work: (alert type, backend, recipient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AlertRecord {
    pub id: Uuid,
    pub event_id: Uuid,
    pub alert_type_id: String,
    pub backend_id: String,
    pub recipient_id: Uuid,
    pub recipient_email: Option<String>,
    pub title: String,
    pub body: String,
    pub is_sent: bool,
    pub failed: bool,
    pub attempts: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub lock_owner: Option<Uuid>,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AlertRecord {
    /// Materialize a fresh, never-attempted record.
    pub fn from_new(new: NewAlertRecord, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id: new.event_id,
            alert_type_id: new.alert_type_id,
            backend_id: new.backend_id,
            recipient_id: new.recipient_id,
            recipient_email: new.recipient_email,
            title: new.title,
            body: new.body,
            is_sent: false,
            failed: false,
            attempts: 0,
            last_attempt_at: None,
            last_error: None,
            lock_owner: None,
            locked_until: None,
            created_at,
        }
    }

    pub fn status(&self) -> DeliveryStatus {
        if self.is_sent {
            DeliveryStatus::Sent
        } else if self.failed {
            DeliveryStatus::Failed
        } else {
            DeliveryStatus::Pending
        }
    }

    /// Failed records stay pending; only a successful delivery leaves the set.
    pub fn is_pending(&self) -> bool {
        !self.is_sent
    }

    /// Whether a live lease is held on this record at `now`.
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.locked_until, Some(until) if until > now)
    }

    /// Take the lease for `owner` and stamp the attempt time.
    pub fn begin_attempt(&mut self, owner: Uuid, now: DateTime<Utc>, until: DateTime<Utc>) {
        self.lock_owner = Some(owner);
        self.locked_until = Some(until);
        self.last_attempt_at = Some(now);
    }

    /// Record the outcome of the attempt and drop the lease. Success is sticky.
    pub fn finish_attempt(&mut self, outcome: &DeliveryOutcome) {
        self.attempts += 1;
        match outcome {
            DeliveryOutcome::Delivered => {
                self.is_sent = true;
                self.failed = false;
                self.last_error = None;
            }
            DeliveryOutcome::Failed(reason) => {
                self.failed = true;
                self.last_error = Some(reason.clone());
            }
        }
        self.release_claim();
    }

    pub fn release_claim(&mut self) {
        self.lock_owner = None;
        self.locked_until = None;
    }

    /// Natural key used to keep creation replay-safe.
    pub fn natural_key(&self) -> (Uuid, &str, &str, Uuid) {
        (
            self.event_id,
            &self.alert_type_id,
            &self.backend_id,
            self.recipient_id,
        )
    }
}

/// Creation payload for an alert record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAlertRecord {
    pub event_id: Uuid,
    pub alert_type_id: String,
    pub backend_id: String,
    pub recipient_id: Uuid,
    pub recipient_email: Option<String>,
    pub title: String,
    pub body: String,
}

impl NewAlertRecord {
    pub fn natural_key(&self) -> (Uuid, &str, &str, Uuid) {
        (
            self.event_id,
            &self.alert_type_id,
            &self.backend_id,
            self.recipient_id,
        )
    }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            DeliveryOutcome::Delivered => None,
            DeliveryOutcome::Failed(reason) => Some(reason),
        }
    }
}
