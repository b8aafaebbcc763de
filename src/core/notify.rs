//! Post-settlement notification dispatch.
//!
//! Notifications go out after the settlement transaction has committed. Every call
//! is bounded by a timeout, and failures are logged and swallowed.

use crate::errors::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{info, warn};

/// Outbound channel for "your slot has paid out" messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Tells the user that `slot_id` paid out `amount`.
    async fn slot_settled(&self, user_id: i64, slot_id: i64, amount: Decimal) -> Result<()>;
}

/// Notifier that only writes a log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn slot_settled(&self, user_id: i64, slot_id: i64, amount: Decimal) -> Result<()> {
        info!("Slot {} of user {} paid out {}", slot_id, user_id, amount);
        Ok(())
    }
}

/// Calls the notifier with a deadline. Returns whether the notification went out.
pub async fn dispatch(
    notifier: &dyn Notifier,
    timeout: Duration,
    user_id: i64,
    slot_id: i64,
    amount: Decimal,
) -> bool {
    match tokio::time::timeout(timeout, notifier.slot_settled(user_id, slot_id, amount)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(
                "Notification for slot {} (user {}) failed: {}",
                slot_id, user_id, e
            );
            false
        }
        Err(_) => {
            warn!(
                "Notification for slot {} (user {}) timed out after {:?}",
                slot_id, user_id, timeout
            );
            false
        }
    }
}
