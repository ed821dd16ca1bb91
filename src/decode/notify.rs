//! Consumer notifications for decode progress
//!
//! Consumers subscribe and receive [`DecodeEvent`]s over an unbounded
//! channel, so emitting never blocks the decode thread. Subscribers that
//! dropped their receiver are pruned on the next emit.

use std::sync::Mutex;

use crossbeam_channel::{Receiver, Sender, unbounded};

/// Progress events delivered to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeEvent {
    /// A decode run started (or restarted)
    Started,
    /// More annotations are available to query
    NewAnnotations,
    /// The decode run ended; query `error_message()` to tell success from
    /// failure
    Finished,
}

/// Broadcast hub fanning events out to every live subscriber
#[derive(Default)]
pub(crate) struct EventHub {
    subscribers: Mutex<Vec<Sender<DecodeEvent>>>,
}

impl EventHub {
    pub(crate) fn subscribe(&self) -> Receiver<DecodeEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    pub(crate) fn emit(&self, event: DecodeEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_subscribers_receive_events() {
        let hub = EventHub::default();
        let a = hub.subscribe();
        let b = hub.subscribe();

        hub.emit(DecodeEvent::Started);
        hub.emit(DecodeEvent::NewAnnotations);

        for rx in [&a, &b] {
            assert_eq!(rx.try_recv(), Ok(DecodeEvent::Started));
            assert_eq!(rx.try_recv(), Ok(DecodeEvent::NewAnnotations));
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let hub = EventHub::default();
        let a = hub.subscribe();
        let b = hub.subscribe();
        drop(a);

        hub.emit(DecodeEvent::Finished);
        assert_eq!(hub.subscribers.lock().unwrap().len(), 1);
        assert_eq!(b.try_recv(), Ok(DecodeEvent::Finished));
    }

    #[test]
    fn test_emit_without_subscribers_is_harmless() {
        let hub = EventHub::default();
        hub.emit(DecodeEvent::Started);
    }
}
