//! Real-time publisher - fans events out to every live subscription of a user.
//!
//! Delivery is best-effort and at most once per subscriber. Publishing happens
//! only after a settlement transaction has committed, so a lost event leaves a
//! stale screen, never an inconsistent ledger.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::{RwLock, broadcast};
use tracing::trace;

/// Buffered events per user before slow subscribers start lagging
const CHANNEL_CAPACITY: usize = 64;

/// Events pushed to connected clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Earnings were moved into the yield wallet
    Settlement {
        /// Total earnings credited
        amount: Decimal,
        /// Number of slots settled
        slot_count: usize,
        /// Yield wallet balance after the credit
        new_balance: Decimal,
    },
    /// A slot was purchased
    Purchase {
        /// New slot
        slot_id: i64,
        /// Amount invested
        principal: Decimal,
    },
    /// A fresh state snapshot was computed
    EarningsDelta {
        /// Live earnings across all active slots
        total_current_earnings: Decimal,
    },
}

/// Per-user broadcast channels.
#[derive(Debug, Default)]
pub struct Publisher {
    channels: RwLock<HashMap<i64, broadcast::Sender<EngineEvent>>>,
}

impl Publisher {
    /// Creates a publisher with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a subscription to a user's events.
    pub async fn subscribe(&self, user_id: i64) -> broadcast::Receiver<EngineEvent> {
        let mut channels = self.channels.write().await;
        channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Sends an event to all of the user's live subscriptions.
    ///
    /// Returns how many subscriptions received it. A user with no subscribers
    /// simply drops the event; their channel is released.
    pub async fn publish(&self, user_id: i64, event: EngineEvent) -> usize {
        let delivered = {
            let channels = self.channels.read().await;
            match channels.get(&user_id) {
                Some(sender) => sender.send(event).unwrap_or(0),
                None => return 0,
            }
        };

        if delivered == 0 {
            let mut channels = self.channels.write().await;
            if channels
                .get(&user_id)
                .is_some_and(|sender| sender.receiver_count() == 0)
            {
                channels.remove(&user_id);
            }
        }
        trace!("Published event to {} subscribers of user {}", delivered, user_id);
        delivered
    }

}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use rust_decimal_macros::dec;

    fn settlement() -> EngineEvent {
        EngineEvent::Settlement {
            amount: dec!(30),
            slot_count: 1,
            new_balance: dec!(30),
        }
    }

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let publisher = Publisher::new();
        let mut phone = publisher.subscribe(1).await;
        let mut browser = publisher.subscribe(1).await;
        let mut other_user = publisher.subscribe(2).await;

        assert_eq!(publisher.publish(1, settlement()).await, 2);
        assert_eq!(phone.recv().await.unwrap(), settlement());
        assert_eq!(browser.recv().await.unwrap(), settlement());
        assert!(other_user.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let publisher = Publisher::new();
        assert_eq!(publisher.publish(9, settlement()).await, 0);

        let receiver = publisher.subscribe(9).await;
        assert_eq!(publisher.publish(9, settlement()).await, 1);
        drop(receiver);
        assert_eq!(publisher.publish(9, settlement()).await, 0);

        // The released channel is recreated for the next subscription
        let mut again = publisher.subscribe(9).await;
        assert_eq!(publisher.publish(9, settlement()).await, 1);
        assert_eq!(again.recv().await.unwrap(), settlement());
    }
}
