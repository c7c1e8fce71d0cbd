//! Mutation rate limiting and the orders-counter watcher.
//!
//! Two scheduling policies guard the reconciliation entry point:
//! `Debounce` (trailing edge: run only after a quiet period following the
//! last mutation) and `Throttle` (leading edge: at most one run per window).
//! Both are plain state machines over caller-supplied instants.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::logging::{log, obj, v_str, Domain, Level};

#[derive(Debug, Clone)]
pub struct Debounce {
    quiet: Duration,
    last_event: Option<Instant>,
}

impl Debounce {
    pub fn new(quiet: Duration) -> Self {
        Self { quiet, last_event: None }
    }

    /// Record a mutation; restarts the quiet period.
    pub fn note(&mut self, now: Instant) {
        self.last_event = Some(now);
    }

    pub fn pending(&self) -> bool {
        self.last_event.is_some()
    }

    /// A pending burst has been quiet for the full period.
    pub fn ready(&self, now: Instant) -> bool {
        match self.last_event {
            Some(last) => now.saturating_duration_since(last) >= self.quiet,
            None => false,
        }
    }

    /// Mark the pending burst as handled.
    pub fn clear(&mut self) {
        self.last_event = None;
    }
}

#[derive(Debug, Clone)]
pub struct Throttle {
    window: Duration,
    last_run: Option<Instant>,
}

impl Throttle {
    pub fn new(window: Duration) -> Self {
        Self { window, last_run: None }
    }

    /// Admit a run if none was admitted within the window.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        match self.last_run {
            Some(last) if now.saturating_duration_since(last) < self.window => false,
            _ => {
                self.last_run = Some(now);
                true
            }
        }
    }
}

/// Change notification for the display surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub action: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

pub const ORDERS_COUNT: &str = "orders_count";

impl Notification {
    pub fn orders_count(value: &str) -> Self {
        Self {
            action: "notify".to_string(),
            kind: ORDERS_COUNT.to_string(),
            value: value.to_string(),
        }
    }

    pub fn title(&self) -> &'static str {
        if self.kind == ORDERS_COUNT {
            "Zerodha order status changed"
        } else {
            "Value Changed"
        }
    }

    pub fn message(&self) -> String {
        format!("New value: {}", self.value)
    }
}

/// Watches the text of the host's open-orders counter.
#[derive(Debug, Clone, Default)]
pub struct CounterWatch {
    last: Option<String>,
}

impl CounterWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the current counter text. The first observation only primes the
    /// watcher; later changes yield a notification.
    pub fn observe(&mut self, text: &str) -> Option<Notification> {
        let text = text.trim();
        match self.last.replace(text.to_string()) {
            Some(prev) if prev != text => Some(Notification::orders_count(text)),
            _ => None,
        }
    }
}

/// The display surface that consumes change notifications.
pub trait Notifier {
    fn notify(&mut self, notification: &Notification);
}

/// Shows notifications through the structured log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&mut self, n: &Notification) {
        log(
            Level::Info,
            Domain::Watch,
            "notify",
            obj(&[
                ("title", v_str(n.title())),
                ("msg", v_str(&n.message())),
                ("type", v_str(&n.kind)),
            ]),
        );
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub seen: Vec<Notification>,
}

impl Notifier for RecordingNotifier {
    fn notify(&mut self, n: &Notification) {
        self.seen.push(n.clone());
    }
}

/// Lets a caller keep a handle on a notifier owned by the engine.
impl<N: Notifier> Notifier for Rc<RefCell<N>> {
    fn notify(&mut self, notification: &Notification) {
        self.borrow_mut().notify(notification);
    }
}
