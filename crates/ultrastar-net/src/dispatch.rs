//! Inbound event parsing and subscriber fan-out.
//!
//! An inbound line has the form `<event-name>:<payload>`. The line is split
//! at the first colon and the payload is trimmed. Every handler registered
//! for the event name is awaited in registration order.
//!
//! Dispatch never holds the connection's transport lock: handlers are free to
//! call back into the connection, for example to send a follow-up command.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

/// Boxed future returned by an [`EventHandler`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A subscriber callback, invoked with the event payload.
pub type EventHandler = Arc<dyn Fn(String) -> HandlerFuture + Send + Sync>;

/// A parsed inbound event, borrowing from the raw line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event<'a> {
    /// Text before the first colon.
    pub name: &'a str,
    /// Text after the first colon, with surrounding whitespace removed.
    pub payload: &'a str,
}

/// Why an inbound line could not be turned into an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedMessage {
    /// The line was empty or whitespace only.
    #[error("empty message")]
    Empty,
    /// The line has no `:` separator.
    #[error("missing ':' separator in {0:?}")]
    MissingSeparator(String),
}

/// Split a raw line into an event name and payload.
pub fn parse_event(line: &str) -> Result<Event<'_>, MalformedMessage> {
    let line = line.trim();
    if line.is_empty() {
        return Err(MalformedMessage::Empty);
    }
    let (name, payload) = line
        .split_once(':')
        .ok_or_else(|| MalformedMessage::MissingSeparator(line.to_string()))?;
    Ok(Event {
        name,
        payload: payload.trim(),
    })
}

/// What happened to a dispatched line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The event was delivered to this many handlers.
    Delivered(usize),
    /// No handler is registered for the event name.
    Unhandled,
    /// The line was not a valid event.
    Malformed,
}

/// Event subscription table.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
}

impl EventDispatcher {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the list for `event`.
    pub fn register(&self, event: impl Into<String>, handler: EventHandler) {
        let event = event.into();
        tracing::info!("Registered listener for event '{event}'");
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(event)
            .or_default()
            .push(handler);
    }

    /// Number of handlers registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Parse `line` and run every matching handler, one after another.
    ///
    /// Malformed and unhandled lines are logged and dropped. A handler that
    /// panics is logged; the remaining handlers still run.
    pub async fn dispatch(&self, line: &str) -> DispatchOutcome {
        let event = match parse_event(line) {
            Ok(event) => event,
            Err(MalformedMessage::Empty) => {
                tracing::debug!("Ignoring empty message");
                return DispatchOutcome::Malformed;
            }
            Err(e) => {
                tracing::warn!("Unexpected event format, ignoring: {e}");
                return DispatchOutcome::Malformed;
            }
        };
        tracing::debug!(event = event.name, payload = event.payload, "Processing event");

        // Snapshot so handlers may register further listeners without deadlocking.
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(event.name)
            .cloned();

        match handlers {
            Some(handlers) if !handlers.is_empty() => {
                for handler in &handlers {
                    // Own task so a panicking handler cannot take the listener down.
                    if let Err(e) = tokio::spawn(handler(event.payload.to_string())).await {
                        tracing::error!("Listener for event '{}' failed: {e}", event.name);
                    }
                }
                DispatchOutcome::Delivered(handlers.len())
            }
            _ => {
                tracing::warn!(
                    "No listener for event '{}' with data '{}'",
                    event.name,
                    event.payload
                );
                DispatchOutcome::Unhandled
            }
        }
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<_> = handlers.keys().collect();
        names.sort();
        f.debug_struct("EventDispatcher")
            .field("events", &names)
            .finish()
    }
}

/// Box an async closure into an [`EventHandler`].
pub fn handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |payload| Box::pin(f(payload)) as HandlerFuture)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Handler that appends `(tag, payload)` to a shared log.
    fn recorder(log: &Arc<Mutex<Vec<(String, String)>>>, tag: &str) -> EventHandler {
        let log = Arc::clone(log);
        let tag = tag.to_string();
        handler(move |payload| {
            let log = Arc::clone(&log);
            let tag = tag.clone();
            async move {
                log.lock().unwrap().push((tag, payload));
            }
        })
    }

    #[test]
    fn test_parse_simple_event() {
        let event = parse_event("get_state:playing").unwrap();
        assert_eq!(event.name, "get_state");
        assert_eq!(event.payload, "playing");
    }

    #[test]
    fn test_parse_splits_at_first_colon() {
        let event = parse_event("lyric_line:Time: 3:15").unwrap();
        assert_eq!(event.name, "lyric_line");
        assert_eq!(event.payload, "Time: 3:15");
    }

    #[test]
    fn test_parse_trims_payload() {
        let event = parse_event("current_song:  Artist - Song Title \t").unwrap();
        assert_eq!(event.payload, "Artist - Song Title");
    }

    #[test]
    fn test_parse_empty_payload() {
        let event = parse_event("rating:").unwrap();
        assert_eq!(event.name, "rating");
        assert_eq!(event.payload, "");
    }

    #[test]
    fn test_parse_rejects_missing_colon() {
        assert_eq!(
            parse_event("hello world"),
            Err(MalformedMessage::MissingSeparator("hello world".into()))
        );
    }

    #[test]
    fn test_parse_rejects_empty_line() {
        assert_eq!(parse_event(""), Err(MalformedMessage::Empty));
        assert_eq!(parse_event("   "), Err(MalformedMessage::Empty));
    }

    #[tokio::test]
    async fn test_get_state_handler_called_once() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.register("get_state", recorder(&log, "state"));

        let outcome = dispatcher.dispatch("get_state:playing").await;

        assert_eq!(outcome, DispatchOutcome::Delivered(1));
        assert_eq!(
            *log.lock().unwrap(),
            vec![("state".to_string(), "playing".to_string())]
        );
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.register("points", recorder(&log, "first"));
        dispatcher.register("points", recorder(&log, "second"));
        dispatcher.register("points", recorder(&log, "third"));
        dispatcher.register("rating", recorder(&log, "other"));

        dispatcher.dispatch("points:1200").await;

        let tags: Vec<_> = log.lock().unwrap().iter().map(|(t, _)| t.clone()).collect();
        assert_eq!(tags, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_handlers_are_awaited_sequentially() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let slow_log = Arc::clone(&log);
        dispatcher.register(
            "get_version",
            handler(move |_| {
                let log = Arc::clone(&slow_log);
                async move {
                    tokio::task::yield_now().await;
                    log.lock().unwrap().push(("slow".to_string(), String::new()));
                }
            }),
        );
        dispatcher.register("get_version", recorder(&log, "fast"));

        dispatcher.dispatch("get_version:2025.1").await;

        let tags: Vec<_> = log.lock().unwrap().iter().map(|(t, _)| t.clone()).collect();
        assert_eq!(tags, vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn test_unknown_event_is_dropped() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.register("get_state", recorder(&log, "state"));

        let outcome = dispatcher.dispatch("volume:80").await;

        assert_eq!(outcome, DispatchOutcome::Unhandled);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_lines_invoke_nothing() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.register("get_state", recorder(&log, "state"));

        assert_eq!(dispatcher.dispatch("get_state").await, DispatchOutcome::Malformed);
        assert_eq!(dispatcher.dispatch("").await, DispatchOutcome::Malformed);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_stop_others() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.register(
            "rating",
            handler(|payload| async move { panic!("bad rating {payload}") }),
        );
        dispatcher.register("rating", recorder(&log, "after"));

        let outcome = dispatcher.dispatch("rating:Superstar").await;

        assert_eq!(outcome, DispatchOutcome::Delivered(2));
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_handler_may_register_during_dispatch() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let inner = Arc::clone(&dispatcher);
        dispatcher.register(
            "home",
            handler(move |_| {
                let inner = Arc::clone(&inner);
                async move {
                    inner.register("home", handler(|_| async {}));
                }
            }),
        );

        dispatcher.dispatch("home:").await;
        assert_eq!(dispatcher.handler_count("home"), 2);
    }
}
