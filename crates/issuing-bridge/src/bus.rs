//! Proof Bus
//!
//! Process-wide broadcast of acquired registration proofs. Subscribers only see
//! events published after they subscribed; there is no replay.

use ethers::types::Address;
use issuing_types::ProofEvent;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};

use crate::config::DEFAULT_BUS_CAPACITY;

#[derive(Clone)]
pub struct ProofBus {
    sender: broadcast::Sender<ProofEvent>,
}

impl ProofBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Deliver `event` to every live subscriber, returning how many were reached
    pub fn publish(&self, event: ProofEvent) -> usize {
        let token = event.token;
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!(?token, "proof published with no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> ProofStream {
        ProofStream {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ProofBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

/// One subscriber's view of the bus; dropping it unsubscribes
pub struct ProofStream {
    receiver: broadcast::Receiver<ProofEvent>,
}

impl ProofStream {
    /// Next event, or `None` once the bus is gone
    pub async fn next(&mut self) -> Option<ProofEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "proof stream lagged"),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next event for `token`, skipping the others
    pub async fn next_for(&mut self, token: Address) -> Option<ProofEvent> {
        loop {
            let event = self.next().await?;
            if event.token == token {
                return Some(event);
            }
        }
    }

    /// Already-published event if one is waiting
    pub fn try_next(&mut self) -> Option<ProofEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => warn!(skipped, "proof stream lagged"),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::proof_event;

    #[tokio::test]
    async fn test_delivers_to_subscribers_attached_before_publish() {
        let bus = ProofBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let event = proof_event(Address::repeat_byte(1));
        assert_eq!(bus.publish(event.clone()), 2);

        let mut late = bus.subscribe();

        assert_eq!(first.next().await, Some(event.clone()));
        assert_eq!(second.next().await, Some(event));
        assert_eq!(late.try_next(), None);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = ProofBus::default();
        assert_eq!(bus.publish(proof_event(Address::repeat_byte(1))), 0);

        let mut stream = bus.subscribe();
        assert_eq!(stream.try_next(), None);
    }

    #[tokio::test]
    async fn test_next_for_filters_by_token() {
        let bus = ProofBus::new(8);
        let mut stream = bus.subscribe();
        let wanted = Address::repeat_byte(2);

        bus.publish(proof_event(Address::repeat_byte(1)));
        bus.publish(proof_event(wanted));

        let event = stream.next_for(wanted).await.unwrap();
        assert_eq!(event.token, wanted);
    }

    #[tokio::test]
    async fn test_lagged_stream_skips_ahead() {
        let bus = ProofBus::new(1);
        let mut stream = bus.subscribe();

        bus.publish(proof_event(Address::repeat_byte(1)));
        bus.publish(proof_event(Address::repeat_byte(2)));

        let event = stream.next().await.unwrap();
        assert_eq!(event.token, Address::repeat_byte(2));
    }

    #[tokio::test]
    async fn test_stream_ends_with_bus() {
        let bus = ProofBus::new(4);
        let mut stream = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        drop(bus);
        assert_eq!(stream.next().await, None);
    }
}
