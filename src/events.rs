use crossbeam_channel::{Receiver, Sender, unbounded};

/// Attach-only broadcast: every subscriber gets its own unbounded channel
/// and every emitted event is cloned to each of them. Subscribers that drop
/// their receiver are pruned on the next emit; there is no detach call.
pub struct EventHub<T> {
    senders: Vec<Sender<T>>,
}

impl<T: Clone> EventHub<T> {
    pub fn new() -> Self {
        Self {
            senders: Vec::new(),
        }
    }

    pub fn subscribe(&mut self) -> Receiver<T> {
        let (tx, rx) = unbounded();
        self.senders.push(tx);
        rx
    }

    pub fn emit(&mut self, event: T) {
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.senders.len()
    }
}

impl<T: Clone> Default for EventHub<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_sees_every_event() {
        let mut hub = EventHub::new();
        let a = hub.subscribe();
        let b = hub.subscribe();

        hub.emit(1u32);
        hub.emit(2u32);

        assert_eq!(a.try_iter().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(b.try_iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut hub = EventHub::new();
        let a = hub.subscribe();
        {
            let _dropped = hub.subscribe();
        }
        assert_eq!(hub.subscriber_count(), 2);

        hub.emit(7u32);
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(a.try_iter().collect::<Vec<_>>(), vec![7]);
    }

    #[test]
    fn emit_with_no_subscribers_is_fine() {
        let mut hub: EventHub<u32> = EventHub::new();
        hub.emit(42);
    }
}
