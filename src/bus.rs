//! Synchronous event fan-out to subscribers
//!
//! Handlers are registered per [`EventName`] and invoked in registration
//! order on the thread that publishes. A handler that returns an error or
//! panics is logged and skipped; the remaining handlers still run.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{trace, warn};

use crate::ClientError;
use crate::types::{CameraHealth, ControlMessage, ServerStats, StatusReport};

/// Result returned by a subscriber
pub type HandlerResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

type Handler = Arc<dyn Fn(&Event) -> HandlerResult + Send + Sync>;

/// Channel-level connectivity signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// Transport open and registration sent
    Connected,
    /// Transport closed, locally or remotely
    Disconnected,
    /// First frame received while the camera was considered offline
    CameraOnline,
}

/// Events published on the bus
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Status(StatusReport),
    CameraHealth(CameraHealth),
    ServerStats(ServerStats),
    Connectivity(Connectivity),
}

/// Subscription key for [`Event`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    Status,
    CameraHealth,
    ServerStats,
    Connectivity,
}

impl EventName {
    pub fn as_str(self) -> &'static str {
        match self {
            EventName::Status => "status",
            EventName::CameraHealth => "camera_health",
            EventName::ServerStats => "server_stats",
            EventName::Connectivity => "connectivity",
        }
    }
}

impl Event {
    pub fn name(&self) -> EventName {
        match self {
            Event::Status(_) => EventName::Status,
            Event::CameraHealth(_) => EventName::CameraHealth,
            Event::ServerStats(_) => EventName::ServerStats,
            Event::Connectivity(_) => EventName::Connectivity,
        }
    }

    /// Map a control message onto its event; unknown kinds have none.
    pub fn from_control(message: ControlMessage) -> Option<Self> {
        match message {
            ControlMessage::Status(report) => Some(Event::Status(report)),
            ControlMessage::CameraHealth(health) => Some(Event::CameraHealth(health)),
            ControlMessage::ServerStats(stats) => Some(Event::ServerStats(stats)),
            ControlMessage::Unknown { .. } => None,
        }
    }
}

/// Outcome of a single publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers called
    pub invoked: usize,
    /// Handlers that returned an error or panicked
    pub failed: usize,
}

/// Mapping from event name to an ordered list of handlers
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<EventName, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `name`.
    ///
    /// There is no de-duplication: registering the same closure twice makes
    /// it run twice per publish.
    pub fn subscribe<F>(&self, name: EventName, handler: F)
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Number of handlers registered for `name`
    pub fn subscriber_count(&self, name: EventName) -> usize {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).get(&name).map_or(0, Vec::len)
    }

    /// Invoke every current handler for the event's name, in order.
    pub fn publish(&self, event: &Event) -> DispatchReport {
        let name = event.name();

        // Snapshot so handlers may subscribe while being dispatched
        let handlers: Vec<Handler> = match self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
        {
            Some(list) => list.clone(),
            None => return DispatchReport::default(),
        };

        let mut report = DispatchReport::default();
        for handler in handlers {
            report.invoked += 1;
            let failure = match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(ClientError::handler(name.as_str(), e.to_string())),
                Err(panic) => Some(ClientError::handler(name.as_str(), panic_message(&*panic))),
            };

            if let Some(error) = failure {
                report.failed += 1;
                warn!("{}", error);
            }
        }

        trace!("Dispatched '{}' to {} handlers ({} failed)", name.as_str(), report.invoked, report.failed);
        report
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<_, _> = handlers.iter().map(|(name, list)| (name.as_str(), list.len())).collect();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    fn status(camera_connected: bool) -> Event {
        Event::Status(StatusReport { camera_connected: Some(camera_connected), ..Default::default() })
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for label in ["A", "B", "C"] {
            let calls = Arc::clone(&calls);
            bus.subscribe(EventName::Status, move |_| {
                calls.lock().unwrap().push(label);
                Ok(())
            });
        }

        let report = bus.publish(&status(true));
        assert_eq!(report, DispatchReport { invoked: 3, failed: 0 });
        assert_eq!(*calls.lock().unwrap(), vec!["A", "B", "C"]);
    }

    #[test]
    fn failing_handler_does_not_stop_the_rest() {
        let bus = EventBus::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(EventName::Status, |_| Err("handler A failed".into()));
        let recorder = Arc::clone(&calls);
        bus.subscribe(EventName::Status, move |_| {
            recorder.lock().unwrap().push("B");
            Ok(())
        });

        let report = bus.publish(&status(false));
        assert_eq!(report, DispatchReport { invoked: 2, failed: 1 });
        assert_eq!(*calls.lock().unwrap(), vec!["B"]);
    }

    #[test]
    fn panicking_handler_is_isolated() {
        let bus = EventBus::new();
        let reached = Arc::new(Mutex::new(false));

        bus.subscribe(EventName::Status, |_| panic!("handler A exploded"));
        let flag = Arc::clone(&reached);
        bus.subscribe(EventName::Status, move |_| {
            *flag.lock().unwrap() = true;
            Ok(())
        });

        let report = bus.publish(&status(true));
        assert_eq!(report.failed, 1);
        assert!(*reached.lock().unwrap());
    }

    #[test]
    fn duplicate_subscriptions_run_twice() {
        let bus = EventBus::new();
        let count = Arc::new(Mutex::new(0));

        let handler = {
            let count = Arc::clone(&count);
            move |_: &Event| -> HandlerResult {
                *count.lock().unwrap() += 1;
                Ok(())
            }
        };
        bus.subscribe(EventName::Connectivity, handler.clone());
        bus.subscribe(EventName::Connectivity, handler);

        bus.publish(&Event::Connectivity(Connectivity::Connected));
        assert_eq!(*count.lock().unwrap(), 2);
        assert_eq!(bus.subscriber_count(EventName::Connectivity), 2);
    }

    #[test]
    fn events_only_reach_their_own_name() {
        let bus = EventBus::new();
        bus.subscribe(EventName::ServerStats, |_| Err("should not run".into()));

        let report = bus.publish(&Event::CameraHealth(CameraHealth::default()));
        assert_eq!(report, DispatchReport::default());
    }

    #[test]
    fn handler_may_subscribe_during_dispatch() {
        let bus = Arc::new(EventBus::new());
        let inner = Arc::clone(&bus);
        bus.subscribe(EventName::Status, move |_| {
            inner.subscribe(EventName::Status, |_| Ok(()));
            Ok(())
        });

        assert_eq!(bus.publish(&status(true)).invoked, 1);
        assert_eq!(bus.subscriber_count(EventName::Status), 2);
    }

    #[test]
    fn unknown_control_messages_have_no_event() {
        assert_eq!(Event::from_control(ControlMessage::Unknown { kind: "img_ack".into() }), None);
        assert_eq!(
            Event::from_control(ControlMessage::ServerStats(ServerStats::default())).map(|e| e.name()),
            Some(EventName::ServerStats)
        );
    }

    proptest! {
        #[test]
        fn every_handler_runs_once_in_order_regardless_of_failures(
            failures in prop::collection::vec(any::<bool>(), 1..16)
        ) {
            let bus = EventBus::new();
            let calls = Arc::new(Mutex::new(Vec::new()));

            for (index, fails) in failures.iter().copied().enumerate() {
                let calls = Arc::clone(&calls);
                bus.subscribe(EventName::Status, move |_| {
                    calls.lock().unwrap().push(index);
                    if fails { Err("scripted failure".into()) } else { Ok(()) }
                });
            }

            let report = bus.publish(&status(true));
            let expected: Vec<usize> = (0..failures.len()).collect();
            prop_assert_eq!(calls.lock().unwrap().clone(), expected);
            prop_assert_eq!(report.invoked, failures.len());
            prop_assert_eq!(report.failed, failures.iter().filter(|f| **f).count());
        }
    }
}
