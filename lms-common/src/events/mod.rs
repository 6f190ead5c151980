//! Event types for the LMS event system
//!
//! Provides shared event definitions and the EventBus used to fan domain
//! events out to SSE subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// LMS event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LmsEvent {
    /// Tenant finished provisioning and is active
    TenantProvisioned {
        tenant_slug: String,
        timestamp: DateTime<Utc>,
    },

    /// Tenant and its database were removed
    TenantDeleted {
        tenant_slug: String,
        timestamp: DateTime<Utc>,
    },

    /// A notification was stored for a user
    NotificationCreated {
        tenant_slug: String,
        user_id: Uuid,
        notification_id: Uuid,
        title: String,
        kind: String,
        timestamp: DateTime<Utc>,
    },

    /// A learner completed every module of a course
    CourseCompleted {
        tenant_slug: String,
        user_id: Uuid,
        course_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl LmsEvent {
    /// Event type name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            LmsEvent::TenantProvisioned { .. } => "TenantProvisioned",
            LmsEvent::TenantDeleted { .. } => "TenantDeleted",
            LmsEvent::NotificationCreated { .. } => "NotificationCreated",
            LmsEvent::CourseCompleted { .. } => "CourseCompleted",
        }
    }

    /// Tenant the event belongs to
    pub fn tenant_slug(&self) -> &str {
        match self {
            LmsEvent::TenantProvisioned { tenant_slug, .. }
            | LmsEvent::TenantDeleted { tenant_slug, .. }
            | LmsEvent::NotificationCreated { tenant_slug, .. }
            | LmsEvent::CourseCompleted { tenant_slug, .. } => tenant_slug,
        }
    }

    /// User the event is addressed to, if any
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            LmsEvent::NotificationCreated { user_id, .. }
            | LmsEvent::CourseCompleted { user_id, .. } => Some(*user_id),
            _ => None,
        }
    }
}

/// Central event distribution bus
///
/// Thin wrapper over `tokio::sync::broadcast`. Slow subscribers lose the
/// oldest events once `capacity` is exceeded.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LmsEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use lms_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(256);
    /// assert_eq!(event_bus.capacity(), 256);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<LmsEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: LmsEvent) -> Result<usize, broadcast::error::SendError<LmsEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: LmsEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
