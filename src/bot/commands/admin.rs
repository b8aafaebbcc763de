//! Owner-only Discord commands - manual deposits, on-demand sweeps, slot locks
//! and ledger reconciliation.
//!
//! Only the application owners configured in Discord can run these.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::BotData,
        core::{activity, slot, system_state, user},
        errors::{Error, Result},
    };
    use chrono::Utc;
    use poise::serenity_prelude as serenity;
    use rust_decimal::Decimal;
    use std::fmt::Write as _;

    /// Credits a user's principal wallet, e.g. after a manual bank transfer.
    #[poise::command(slash_command, owners_only)]
    pub async fn deposit(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "User to credit"] member: serenity::User,
        #[description = "Amount to deposit"] amount: f64,
        #[description = "Optional reference for the ledger"] reference: Option<String>,
    ) -> Result<()> {
        let Ok(amount) = Decimal::try_from(amount) else {
            ctx.say("❌ Invalid amount: must be a valid number").await?;
            return Ok(());
        };

        let engine = &ctx.data().engine;
        let target = user::resolve_user(engine.database(), &member.id.to_string()).await?;
        let description = reference.unwrap_or_else(|| format!("Manual deposit by {}", ctx.author().name));
        let entry = engine.deposit(target.id, amount, &description).await?;

        ctx.say(format!(
            "✅ Deposited {} to {} (ledger entry #{})",
            entry.amount(), member.name, entry.id
        ))
        .await?;
        Ok(())
    }

    /// Runs a settlement sweep now and reports what it did.
    #[poise::command(slash_command, owners_only)]
    pub async fn sweep(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        ctx.defer().await?;
        let engine = &ctx.data().engine;

        let previous = system_state::last_sweep(engine.database()).await?;
        let report = engine.run_sweep(Utc::now()).await?;

        let mut response = format!(
            "🧹 Sweep done: settled {} slot(s) for {} user(s), credited {}.",
            report.settled, report.settled_users, report.credited
        );
        if !report.failed_users.is_empty() {
            response.push_str(&format!(
                "\n⚠️ {} user(s) failed and stay due for the next sweep.",
                report.failed_users.len()
            ));
        }
        if report.capped {
            response.push_str("\n⏱️ Stopped at the duration cap; remaining slots wait for the next sweep.");
        }
        if let Some(last) = previous {
            response.push_str(&format!(
                "\nPrevious sweep at {}: {}",
                last.at.format("%Y-%m-%d %H:%M:%S"),
                last.summary
            ));
        }

        ctx.say(response).await?;
        Ok(())
    }

    /// Locks a slot so its owner cannot claim it; the sweep still settles it.
    #[poise::command(slash_command, owners_only)]
    pub async fn lock(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Slot to lock or release"] slot_id: i64,
        #[description = "Set false to release the lock"] locked: Option<bool>,
    ) -> Result<()> {
        let locked = locked.unwrap_or(true);
        slot::set_slot_locked(ctx.data().engine.database(), slot_id, locked).await?;

        let verb = if locked { "Locked" } else { "Released" };
        ctx.say(format!("🔒 {verb} slot #{slot_id}")).await?;
        Ok(())
    }

    /// Replays a user's activity log against their wallet balances.
    #[poise::command(slash_command, owners_only)]
    pub async fn reconcile(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "User to check"] member: serenity::User,
    ) -> Result<()> {
        let db = ctx.data().engine.database();
        let Some(target) = user::get_user_by_external_id(db, &member.id.to_string()).await? else {
            ctx.say(format!("{} has never used the bot.", member.name)).await?;
            return Ok(());
        };
        let checks = activity::reconcile_user(db, target.id).await?;

        if checks.is_empty() {
            ctx.say(format!("{} has no wallets yet.", member.name)).await?;
            return Ok(());
        }

        let mut response = format!("🧾 **Reconciliation for {}**\n", member.name);
        for check in &checks {
            let status = if check.is_balanced() { "✅" } else { "❌ mismatch" };
            let _ = writeln!(
                response,
                "• {:?}: wallet {} | ledger {} | {}",
                check.currency, check.wallet_balance, check.ledger_total, status
            );
        }
        ctx.say(response).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
