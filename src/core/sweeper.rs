//! Settlement sweeper - periodic batch settlement of every due slot.
//!
//! A sweep pages through due slots oldest expiry first, groups each page by owner
//! and settles the groups on a bounded worker pool. A group that still fails after
//! its retries is reported and left due for the next sweep; other groups are not
//! affected. No new page is started once the configured duration cap is reached.

use crate::{
    core::{
        engine::SettlementEngine,
        settlement::{SettlementOutcome, SettlementRule},
        slot::{self, DueCursor},
        system_state,
    },
    errors::Result,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::{collections::BTreeMap, fmt, sync::Arc};
use tokio::{
    sync::{Semaphore, watch},
    task::{JoinHandle, JoinSet},
    time::{Instant, MissedTickBehavior, interval, sleep},
};
use tracing::{debug, error, info, instrument, warn};

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Due slots read across all batches
    pub scanned: usize,
    /// Slots settled
    pub settled: usize,
    /// Users whose group was settled
    pub settled_users: usize,
    /// Users whose group failed after retries
    pub failed_users: Vec<i64>,
    /// Total earnings credited
    pub credited: Decimal,
    /// Batches started
    pub batches: usize,
    /// Whether the duration cap stopped the sweep early
    pub capped: bool,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scanned={} settled={} users={} failed={} credited={} batches={} capped={} duration_ms={}",
            self.scanned,
            self.settled,
            self.settled_users,
            self.failed_users.len(),
            self.credited,
            self.batches,
            self.capped,
            self.duration_ms
        )
    }
}

impl SweepReport {
    fn absorb(&mut self, user_id: i64, result: Result<SettlementOutcome>) {
        match result {
            Ok(outcome) if outcome.is_empty() => {}
            Ok(outcome) => {
                self.settled += outcome.settled.len();
                self.settled_users += 1;
                self.credited += outcome.total_earnings;
            }
            Err(e) => {
                error!("Settlement for user {} failed: {}", user_id, e);
                self.failed_users.push(user_id);
            }
        }
    }
}

impl SettlementEngine {
    /// Settles every slot due at `now`.
    ///
    /// Only errors reading the due set fail the sweep; per-user failures are
    /// collected in the report.
    #[instrument(skip(self))]
    pub async fn run_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let started = Instant::now();
        let settings = &self.config.sweeper;
        let mut report = SweepReport::default();

        let due = slot::count_due_slots(&self.db, now).await?;
        if due == 0 {
            debug!("No slots due at {}", now);
        } else {
            info!("Sweeping {} due slots", due);
            let mut cursor: Option<DueCursor> = None;
            loop {
                if started.elapsed() >= settings.max_sweep_duration() {
                    warn!(
                        "Sweep reached its {:?} cap after {} batches; remaining slots wait for the next sweep",
                        settings.max_sweep_duration(),
                        report.batches
                    );
                    report.capped = true;
                    break;
                }

                let batch = slot::fetch_due_batch(&self.db, now, cursor, settings.batch_size).await?;
                let Some(last) = batch.last() else {
                    break;
                };
                cursor = Some(DueCursor::from(last));
                report.batches += 1;
                report.scanned += batch.len();

                let mut groups: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
                for due_slot in &batch {
                    groups.entry(due_slot.user_id).or_default().push(due_slot.id);
                }
                for (user_id, result) in self.settle_groups(groups, now).await {
                    report.absorb(user_id, result);
                }

                if (batch.len() as u64) < settings.batch_size {
                    break;
                }
                sleep(settings.batch_pause()).await;
            }
        }

        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!("Sweep finished: {}", report);
        if let Err(e) = system_state::record_sweep(&self.db, now, &report.to_string()).await {
            warn!("Failed to record sweep summary: {}", e);
        }
        Ok(report)
    }

    async fn settle_groups(
        &self,
        groups: BTreeMap<i64, Vec<i64>>,
        now: DateTime<Utc>,
    ) -> Vec<(i64, Result<SettlementOutcome>)> {
        let permits = Arc::new(Semaphore::new(self.config.sweeper.worker_concurrency.max(1)));
        let rule = SettlementRule::sweep(self.config.mining.return_principal);
        let mut workers = JoinSet::new();

        for (user_id, slot_ids) in groups {
            let engine = self.clone();
            let permits = Arc::clone(&permits);
            workers.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let result = engine.settle_with_retry(user_id, &slot_ids, now, rule).await;
                if let Ok(outcome) = &result {
                    engine.after_settlement(outcome).await;
                }
                (user_id, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(pair) => results.push(pair),
                Err(e) => error!("Settlement worker aborted: {}", e),
            }
        }
        results
    }
}

/// Runs [`SettlementEngine::run_sweep`] on the configured interval until `shutdown`
/// turns true or its sender is dropped.
///
/// Sweeps run inline on the ticker task, so a slow sweep delays the next tick
/// instead of overlapping it; missed ticks are skipped. Each tick also purges
/// expired state snapshots.
pub fn spawn_sweeper(engine: SettlementEngine, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(engine.config().sweeper.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "Settlement sweeper started (every {:?})",
            engine.config().sweeper.interval()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = engine.run_sweep(Utc::now()).await {
                        error!("Sweep failed: {}", e);
                    }
                    engine.purge_expired_snapshots().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Settlement sweeper stopping");
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        config::EngineConfig,
        core::{activity, wallet},
        entities::{ActivityKind, Currency},
        test_utils::*,
    };
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_sweep_settles_expired_slot() -> Result<()> {
        let db = setup_test_db().await?;
        let engine = test_engine(db.clone());
        let user = create_test_user(&db, "miner").await?;
        let now = test_now();
        let slot = insert_test_slot(&db, user.id, dec!(100), now - Duration::days(7)).await?;

        let report = engine.run_sweep(now).await?;
        assert_eq!(report.settled, 1);
        assert_eq!(report.credited, dec!(30));
        assert!(report.failed_users.is_empty());

        assert_eq!(
            wallet::get_balance(&db, user.id, Currency::Yield).await?,
            dec!(30)
        );
        assert!(!slot::get_slot_by_id(&db, slot.id).await?.unwrap().is_active);
        let log = activity::activity_for_slot(&db, slot.id).await?;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, ActivityKind::Settlement);
        assert_eq!(log[0].amount(), dec!(30));
        Ok(())
    }

    #[tokio::test]
    async fn test_second_sweep_settles_nothing() -> Result<()> {
        let db = setup_test_db().await?;
        let engine = test_engine(db.clone());
        let user = create_test_user(&db, "again").await?;
        let now = test_now();
        insert_test_slot(&db, user.id, dec!(100), now - Duration::days(7)).await?;

        engine.run_sweep(now).await?;
        let second = engine.run_sweep(now + Duration::minutes(1)).await?;
        assert_eq!(second.scanned, 0);
        assert_eq!(second.settled, 0);
        assert_eq!(
            wallet::get_balance(&db, user.id, Currency::Yield).await?,
            dec!(30)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_sweep_groups_users_across_batches() -> Result<()> {
        let db = setup_test_db().await?;
        let mut config = EngineConfig::default();
        config.sweeper.batch_size = 2;
        config.sweeper.batch_pause_ms = 0;
        let engine = test_engine_with(db.clone(), config);
        let now = test_now();

        let alice = create_test_user(&db, "alice").await?;
        let bob = create_test_user(&db, "bob").await?;
        insert_test_slot(&db, alice.id, dec!(100), now - Duration::days(10)).await?;
        insert_test_slot(&db, bob.id, dec!(50), now - Duration::days(9)).await?;
        insert_test_slot(&db, alice.id, dec!(20), now - Duration::days(8)).await?;
        insert_test_slot(&db, bob.id, dec!(10), now - Duration::days(1)).await?;

        let report = engine.run_sweep(now).await?;
        assert_eq!(report.batches, 2);
        assert_eq!(report.scanned, 3);
        assert_eq!(report.settled, 3);
        assert_eq!(report.credited, dec!(51));

        assert_eq!(
            wallet::get_balance(&db, alice.id, Currency::Yield).await?,
            dec!(36)
        );
        assert_eq!(
            wallet::get_balance(&db, bob.id, Currency::Yield).await?,
            dec!(15)
        );
        for user in [&alice, &bob] {
            assert!(
                activity::reconcile_wallet(&db, user.id, Currency::Yield)
                    .await?
                    .is_balanced()
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_failing_user_does_not_block_others() -> Result<()> {
        let db = setup_test_db().await?;
        let engine = test_engine(db.clone());
        let now = test_now();

        let healthy = create_test_user(&db, "healthy").await?;
        let broken = create_test_user(&db, "broken").await?;
        let good = insert_test_slot(&db, healthy.id, dec!(100), now - Duration::days(7)).await?;
        let corrupt = insert_test_slot(&db, broken.id, dec!(-100), now - Duration::days(8)).await?;

        let report = engine.run_sweep(now).await?;
        assert_eq!(report.settled, 1);
        assert_eq!(report.failed_users, vec![broken.id]);

        assert!(!slot::get_slot_by_id(&db, good.id).await?.unwrap().is_active);
        assert!(slot::get_slot_by_id(&db, corrupt.id).await?.unwrap().is_active);
        assert!(activity::activity_for_slot(&db, corrupt.id).await?.is_empty());
        assert_eq!(
            wallet::get_balance(&db, healthy.id, Currency::Yield).await?,
            dec!(30)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_sweep_stops_at_duration_cap() -> Result<()> {
        let db = setup_test_db().await?;
        let mut config = EngineConfig::default();
        config.sweeper.max_sweep_duration_secs = 0;
        let engine = test_engine_with(db.clone(), config);
        let user = create_test_user(&db, "capped").await?;
        let now = test_now();
        let slot = insert_test_slot(&db, user.id, dec!(100), now - Duration::days(7)).await?;

        let report = engine.run_sweep(now).await?;
        assert!(report.capped);
        assert_eq!(report.batches, 0);
        assert!(slot::get_slot_by_id(&db, slot.id).await?.unwrap().is_active);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_claim_and_sweep_credit_once() -> Result<()> {
        let db = setup_test_db().await?;
        let engine = test_engine(db.clone());
        let user = create_test_user(&db, "racer").await?;
        let now = test_now();
        let slot = insert_test_slot(&db, user.id, dec!(100), now - Duration::days(7)).await?;

        let (claimed, swept) = tokio::join!(engine.claim(user.id, None, now), engine.run_sweep(now));
        let claimed = claimed?;
        let swept = swept?;
        assert_eq!(
            claimed.claimed_slot_count + swept.settled,
            1,
            "exactly one path settles the slot"
        );

        assert_eq!(
            wallet::get_balance(&db, user.id, Currency::Yield).await?,
            dec!(30)
        );
        assert_eq!(activity::activity_for_slot(&db, slot.id).await?.len(), 1);
        assert!(
            activity::reconcile_wallet(&db, user.id, Currency::Yield)
                .await?
                .is_balanced()
        );
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_claims_race_sweep_over_separate_connections() -> Result<()> {
        let shared = setup_shared_test_db("race").await?;
        let db = shared.db.clone();
        let mut config = EngineConfig::default();
        config.sweeper.worker_concurrency = 2;
        config.sweeper.retry_attempts = 20;
        config.sweeper.retry_delay_ms = 20;
        let engine = SettlementEngine::new(db.clone(), config);
        let now = test_now();

        let mut users = Vec::new();
        for name in ["ada", "bo", "cy", "di"] {
            let user = create_test_user(&db, name).await?;
            for days in [7, 8, 9] {
                insert_test_slot(&db, user.id, dec!(100), now - Duration::days(days)).await?;
            }
            users.push(user.id);
        }

        let mut claims = JoinSet::new();
        for &user_id in &users {
            let engine = engine.clone();
            claims.spawn(async move { engine.claim(user_id, None, now).await });
        }
        let sweep = engine.run_sweep(now).await?;

        let mut claimed_slots = 0;
        while let Some(joined) = claims.join_next().await {
            claimed_slots += joined.unwrap()?.claimed_slot_count;
        }
        assert!(sweep.failed_users.is_empty());
        assert_eq!(claimed_slots + sweep.settled, 12, "every slot settles exactly once");

        for &user_id in &users {
            assert_eq!(
                wallet::get_balance(&db, user_id, Currency::Yield).await?,
                dec!(90)
            );
            let check = activity::reconcile_wallet(&db, user_id, Currency::Yield).await?;
            assert!(check.is_balanced());
            assert_eq!(activity::recent_activity(&db, user_id, 10).await?.len(), 3);
        }
        assert_eq!(slot::count_due_slots(&db, now).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_snapshots_are_purged() -> Result<()> {
        let db = setup_test_db().await?;
        let mut config = EngineConfig::default();
        config.cache.ttl_secs = 0;
        let engine = test_engine_with(db.clone(), config);
        for name in ["idle-1", "idle-2"] {
            let user = create_test_user(&db, name).await?;
            engine.current_state(user.id, test_now()).await?;
        }

        assert_eq!(engine.purge_expired_snapshots().await, 2);
        assert_eq!(engine.purge_expired_snapshots().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_sweep_records_summary() -> Result<()> {
        let db = setup_test_db().await?;
        let engine = test_engine(db.clone());
        let now = test_now();

        engine.run_sweep(now).await?;
        let last = system_state::last_sweep(&db).await?.unwrap();
        assert_eq!(last.at, now);
        assert!(last.summary.starts_with("scanned=0 settled=0"));
        Ok(())
    }

    #[tokio::test]
    async fn test_sweeper_task_stops_on_shutdown() -> Result<()> {
        let db = setup_test_db().await?;
        let engine = test_engine(db);
        let (tx, rx) = watch::channel(false);

        let handle = spawn_sweeper(engine, rx);
        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        Ok(())
    }
}
