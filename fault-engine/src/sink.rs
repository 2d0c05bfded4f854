//! Event delivery to a subscriber.

use fault_types::FaultEvent;
use tokio::sync::mpsc;

/// Where an execution delivers its events.
///
/// Delivery never blocks the execution. A `false` return means the
/// subscriber is gone; the execution keeps going (cleanup still has to run)
/// but stops delivering.
pub trait EventSink: Send {
    /// Hand one event to the subscriber.
    fn deliver(&mut self, event: FaultEvent) -> bool;
}

impl EventSink for Vec<FaultEvent> {
    fn deliver(&mut self, event: FaultEvent) -> bool {
        self.push(event);
        true
    }
}

impl EventSink for mpsc::UnboundedSender<FaultEvent> {
    fn deliver(&mut self, event: FaultEvent) -> bool {
        self.send(event).is_ok()
    }
}
