//! Settlement engine - the explicitly constructed bundle of ledger connection,
//! cache, publisher and notifier that the sweeper, the claim path and the chat
//! surface share.
//!
//! Cloning is cheap: everything inside is reference counted.

use crate::{
    config::EngineConfig,
    core::{
        cache::{InMemoryCache, InvalidationEpochs, SnapshotCache, state_key},
        notify::{self, LogNotifier, Notifier},
        publisher::{EngineEvent, Publisher},
        retry::RetryPolicy,
        settlement::{SettlementOutcome, SettlementRule, settle_user_slots},
        slot::{self, PurchaseOutcome},
        wallet,
    },
    entities::activity_log,
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared handle to the settlement engine.
#[derive(Clone)]
pub struct SettlementEngine {
    pub(crate) db: DatabaseConnection,
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) cache: Arc<dyn SnapshotCache>,
    pub(crate) epochs: Arc<InvalidationEpochs>,
    pub(crate) publisher: Arc<Publisher>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) retry: RetryPolicy,
}

impl std::fmt::Debug for SettlementEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementEngine")
            .field("config", &self.config)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl SettlementEngine {
    /// Builds an engine with an in-process cache, a fresh publisher and a log-only notifier.
    #[must_use]
    pub fn new(db: DatabaseConnection, config: EngineConfig) -> Self {
        Self::with_components(
            db,
            config,
            Arc::new(InMemoryCache::new()),
            Arc::new(Publisher::new()),
            Arc::new(LogNotifier),
        )
    }

    /// Builds an engine from explicit components.
    #[must_use]
    pub fn with_components(
        db: DatabaseConnection,
        config: EngineConfig,
        cache: Arc<dyn SnapshotCache>,
        publisher: Arc<Publisher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let retry = RetryPolicy::fixed(
            config.sweeper.retry_attempts,
            config.sweeper.retry_delay(),
        );
        Self {
            db,
            config: Arc::new(config),
            cache,
            epochs: Arc::new(InvalidationEpochs::default()),
            publisher,
            notifier,
            retry,
        }
    }

    /// Ledger connection.
    #[must_use]
    pub const fn database(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Publisher clients subscribe to for live updates.
    #[must_use]
    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    /// Drops the user's cached snapshot. Cache errors are logged only.
    ///
    /// The epoch is bumped first so a snapshot computed before this call is not
    /// written back afterwards.
    pub async fn invalidate_user(&self, user_id: i64) {
        self.epochs.bump(user_id);
        if let Err(e) = self.cache.invalidate(&state_key(user_id)).await {
            warn!("Failed to invalidate cached state for user {}: {}", user_id, e);
        }
    }

    /// Drops expired snapshots from the cache and returns how many went.
    /// Cache errors are logged and count as nothing purged.
    pub async fn purge_expired_snapshots(&self) -> usize {
        match self.cache.purge_expired().await {
            Ok(purged) => {
                if purged > 0 {
                    debug!("Purged {} expired state snapshots", purged);
                }
                purged
            }
            Err(e) => {
                warn!("Failed to purge expired state snapshots: {}", e);
                0
            }
        }
    }

    /// Runs one user's settlement with the shared retry policy.
    pub(crate) async fn settle_with_retry(
        &self,
        user_id: i64,
        slot_ids: &[i64],
        now: DateTime<Utc>,
        rule: SettlementRule,
    ) -> Result<SettlementOutcome> {
        self.retry
            .retry_async(
                |attempt| {
                    if attempt > 0 {
                        debug!("Retrying settlement for user {} (attempt {})", user_id, attempt + 1);
                    }
                    settle_user_slots(&self.db, user_id, slot_ids, now, rule)
                },
                Error::is_transient,
            )
            .await
    }

    /// Side effects that follow a committed settlement: cache invalidation, a live
    /// event and one notification per slot. Never fails.
    pub(crate) async fn after_settlement(&self, outcome: &SettlementOutcome) {
        if outcome.is_empty() {
            return;
        }
        self.invalidate_user(outcome.user_id).await;

        self.publisher
            .publish(
                outcome.user_id,
                EngineEvent::Settlement {
                    amount: outcome.total_earnings,
                    slot_count: outcome.settled.len(),
                    new_balance: outcome.yield_balance,
                },
            )
            .await;

        let timeout = self.config.sweeper.notify_timeout();
        for settled in &outcome.settled {
            notify::dispatch(
                self.notifier.as_ref(),
                timeout,
                outcome.user_id,
                settled.slot_id,
                settled.earnings,
            )
            .await;
        }
    }

    /// Buys a slot at the configured terms and refreshes the buyer's live view.
    pub async fn purchase(
        &self,
        user_id: i64,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<PurchaseOutcome> {
        let outcome = slot::purchase_slot(&self.db, &self.config.mining, user_id, amount, now).await?;

        self.invalidate_user(user_id).await;
        if let Some((referrer_id, _)) = outcome.referral {
            self.invalidate_user(referrer_id).await;
        }
        self.publisher
            .publish(
                user_id,
                EngineEvent::Purchase {
                    slot_id: outcome.slot.id,
                    principal: outcome.slot.principal(),
                },
            )
            .await;
        Ok(outcome)
    }

    /// Credits incoming funds to the principal wallet.
    pub async fn deposit(
        &self,
        user_id: i64,
        amount: Decimal,
        description: &str,
    ) -> Result<activity_log::Model> {
        let (_, entry) = wallet::deposit(&self.db, user_id, amount, description).await?;
        self.invalidate_user(user_id).await;
        Ok(entry)
    }
}
