//! Client-scoped lifecycle events.
//!
//! Each client owns one [`EventBus`]. Handlers run synchronously on the task
//! that emits, in registration order. A panicking handler is logged and
//! skipped; later handlers still run and the request continues.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::error::FailureClass;
use crate::rate_limit::RateLimitSnapshot;
use crate::request::RequestMethod;

/// Event discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Error,
    AuthFailure,
    RequestStart,
    RequestComplete,
    RateLimit,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Error,
        EventKind::AuthFailure,
        EventKind::RequestStart,
        EventKind::RequestComplete,
        EventKind::RateLimit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Error => "error",
            EventKind::AuthFailure => "auth-failure",
            EventKind::RequestStart => "request-start",
            EventKind::RequestComplete => "request-complete",
            EventKind::RateLimit => "rate-limit",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle notification.
#[derive(Debug, Clone)]
pub enum Event {
    Error(ErrorEvent),
    AuthFailure(AuthFailureEvent),
    RequestStart(RequestStartEvent),
    RequestComplete(RequestCompleteEvent),
    RateLimit(RateLimitEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Error(_) => EventKind::Error,
            Event::AuthFailure(_) => EventKind::AuthFailure,
            Event::RequestStart(_) => EventKind::RequestStart,
            Event::RequestComplete(_) => EventKind::RequestComplete,
            Event::RateLimit(_) => EventKind::RateLimit,
        }
    }
}

/// A request gave up: fatal failure or retries exhausted.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub request_id: Uuid,
    pub method: RequestMethod,
    pub endpoint: String,
    pub status: Option<u16>,
    pub class: Option<FailureClass>,
    pub message: String,
    /// Attempts made, including the first.
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

/// Credentials were rejected and could not be recovered.
#[derive(Debug, Clone)]
pub struct AuthFailureEvent {
    pub request_id: Uuid,
    pub endpoint: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// An attempt is about to be sent.
#[derive(Debug, Clone)]
pub struct RequestStartEvent {
    pub request_id: Uuid,
    pub method: RequestMethod,
    pub endpoint: String,
    /// 1 for the first attempt.
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
}

/// A response was received.
#[derive(Debug, Clone)]
pub struct RequestCompleteEvent {
    pub request_id: Uuid,
    pub method: RequestMethod,
    pub endpoint: String,
    pub status: u16,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
}

/// A 429 was received.
#[derive(Debug, Clone)]
pub struct RateLimitEvent {
    pub request_id: Uuid,
    pub endpoint: String,
    pub snapshot: RateLimitSnapshot,
    pub retry_after: Option<Duration>,
    pub timestamp: DateTime<Utc>,
}

/// Handle returned by [`EventBus::on`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Typed publish/subscribe hub owned by one client.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<HashMap<EventKind, Vec<(ListenerId, EventHandler)>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: Vec<(EventKind, usize)> = EventKind::ALL
            .iter()
            .map(|kind| (*kind, self.listener_count(*kind)))
            .filter(|(_, n)| *n > 0)
            .collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.on_handler(kind, Arc::new(handler))
    }

    /// Register an already shared handler.
    pub fn on_handler(&self, kind: EventKind, handler: EventHandler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(kind)
            .or_default()
            .push((id, handler));
        id
    }

    /// Unregister a handler. Returns false if it was not registered for `kind`.
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(handlers) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            listeners.remove(&kind);
        }
        removed
    }

    /// Deliver an event to every handler registered for its kind.
    pub fn emit(&self, event: &Event) {
        let kind = event.kind();
        // Snapshot so handlers may call on/off without deadlocking.
        let handlers: Vec<EventHandler> = match self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&kind)
        {
            Some(handlers) => handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return,
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!(event = %kind, "Event handler panicked");
            }
        }
    }

    /// Remove all handlers for `kind`, or for every kind when `None`.
    pub fn remove_all_listeners(&self, kind: Option<EventKind>) {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match kind {
            Some(kind) => {
                listeners.remove(&kind);
            }
            None => listeners.clear(),
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Kinds that currently have at least one handler.
    pub fn event_types(&self) -> Vec<EventKind> {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        EventKind::ALL
            .into_iter()
            .filter(|kind| listeners.get(kind).is_some_and(|h| !h.is_empty()))
            .collect()
    }

    pub fn on_error<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        self.on(EventKind::Error, typed_handler::<ErrorEvent, _>(EventKind::Error, handler))
    }

    pub fn on_auth_failure<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&AuthFailureEvent) + Send + Sync + 'static,
    {
        self.on(
            EventKind::AuthFailure,
            typed_handler::<AuthFailureEvent, _>(EventKind::AuthFailure, handler),
        )
    }

    pub fn on_request_start<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&RequestStartEvent) + Send + Sync + 'static,
    {
        self.on(
            EventKind::RequestStart,
            typed_handler::<RequestStartEvent, _>(EventKind::RequestStart, handler),
        )
    }

    pub fn on_request_complete<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&RequestCompleteEvent) + Send + Sync + 'static,
    {
        self.on(
            EventKind::RequestComplete,
            typed_handler::<RequestCompleteEvent, _>(EventKind::RequestComplete, handler),
        )
    }

    pub fn on_rate_limit<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&RateLimitEvent) + Send + Sync + 'static,
    {
        self.on(
            EventKind::RateLimit,
            typed_handler::<RateLimitEvent, _>(EventKind::RateLimit, handler),
        )
    }
}

/// Payload types that can be pulled out of an [`Event`].
pub trait EventPayload {
    fn from_event(event: &Event) -> Option<&Self>;
}

macro_rules! event_payload {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl EventPayload for $ty {
                fn from_event(event: &Event) -> Option<&Self> {
                    match event {
                        Event::$variant(payload) => Some(payload),
                        _ => None,
                    }
                }
            }
        )*
    };
}

event_payload! {
    Error => ErrorEvent,
    AuthFailure => AuthFailureEvent,
    RequestStart => RequestStartEvent,
    RequestComplete => RequestCompleteEvent,
    RateLimit => RateLimitEvent,
}

pub(crate) fn typed_handler<P, F>(
    kind: EventKind,
    handler: F,
) -> impl Fn(&Event) + Send + Sync + 'static
where
    P: EventPayload + 'static,
    F: Fn(&P) + Send + Sync + 'static,
{
    move |event: &Event| {
        debug_assert_eq!(event.kind(), kind);
        if let Some(payload) = P::from_event(event) {
            handler(payload);
        }
    }
}
