//! Mining Discord commands - `mining`, `buy`, `claim` and `history`.
//!
//! Each command resolves the author to an internal user (registering them on
//! first contact) and then goes through the settlement engine.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{BotData, handlers::autocomplete},
        core::{activity, user, wallet},
        entities::Currency,
        errors::{Error, Result},
    };
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::fmt::Write as _;

    const HISTORY_LIMIT: u64 = 10;

    /// Shows your active slots, live earnings and yield balance.
    #[poise::command(slash_command, prefix_command)]
    pub async fn mining(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let engine = &ctx.data().engine;
        let owner = user::resolve_user(engine.database(), &ctx.author().id.to_string()).await?;
        let state = engine.current_state(owner.id, Utc::now()).await?;

        let mut response = String::from("⛏️ **Your Mining Slots**\n");
        if state.per_slot.is_empty() {
            response.push_str("No active slots. Use `/buy <amount>` to start mining.\n");
        }
        for slot in &state.per_slot {
            let status = if slot.is_due { "✅ ready to claim" } else { "⏳ mining" };
            let _ = writeln!(
                response,
                "• Slot #{}: principal {} | earned {} | {}% | {}",
                slot.slot_id,
                slot.principal,
                slot.current_earnings.round_dp(2),
                slot.progress_percent,
                status
            );
        }
        let _ = write!(
            response,
            "\nLive earnings: {}\nYield balance: {}\n**Total: {}**",
            state.total_current_earnings.round_dp(2),
            state.yield_balance.round_dp(2),
            state.total_current_balance.round_dp(2)
        );

        ctx.say(response).await?;
        Ok(())
    }

    /// Buys a mining slot with funds from your principal wallet.
    #[poise::command(slash_command, prefix_command)]
    pub async fn buy(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Amount to invest"] amount: f64,
    ) -> Result<()> {
        let Ok(amount) = Decimal::try_from(amount) else {
            ctx.say("❌ Invalid amount: must be a valid number").await?;
            return Ok(());
        };

        let engine = &ctx.data().engine;
        let owner = user::resolve_user(engine.database(), &ctx.author().id.to_string()).await?;
        let outcome = engine.purchase(owner.id, amount, Utc::now()).await?;

        ctx.say(format!(
            "✅ Bought slot #{} with {} principal. It matures <t:{}:R>.\nRemaining principal balance: {}",
            outcome.slot.id,
            outcome.slot.principal(),
            outcome.slot.expires_at.timestamp(),
            outcome.principal_balance
        ))
        .await?;
        Ok(())
    }

    /// Collects earnings of finished slots now instead of waiting for the sweep.
    #[poise::command(slash_command, prefix_command)]
    pub async fn claim(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Only claim this slot"]
        #[autocomplete = "autocomplete::autocomplete_claimable_slot"]
        slot_id: Option<String>,
    ) -> Result<()> {
        let requested = match slot_id.as_deref().map(|raw| raw.trim_start_matches('#').parse::<i64>()) {
            None => None,
            Some(Ok(id)) => Some(id),
            Some(Err(_)) => {
                ctx.say("❌ Invalid slot id").await?;
                return Ok(());
            }
        };

        let engine = &ctx.data().engine;
        let owner = user::resolve_user(engine.database(), &ctx.author().id.to_string()).await?;
        let ids = requested.map(|id| [id]);
        let result = engine
            .claim(owner.id, ids.as_ref().map(|one| &one[..]), Utc::now())
            .await?;

        if result.claimed_slot_count == 0 {
            ctx.say("Nothing to claim yet. Slots can be claimed once their term is over.")
                .await?;
            return Ok(());
        }
        let balance = wallet::get_balance(engine.database(), owner.id, Currency::Yield).await?;
        ctx.say(format!(
            "💰 Claimed {} from {} slot(s). Yield balance: {}",
            result.claimed_amount, result.claimed_slot_count, balance
        ))
        .await?;
        Ok(())
    }

    /// Shows your most recent ledger activity.
    #[poise::command(slash_command, prefix_command)]
    pub async fn history(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let db = ctx.data().engine.database();
        let owner = user::resolve_user(db, &ctx.author().id.to_string()).await?;
        let entries = activity::recent_activity(db, owner.id, HISTORY_LIMIT).await?;

        if entries.is_empty() {
            ctx.say("No activity yet.").await?;
            return Ok(());
        }

        let mut response = String::from("📜 **Recent Activity**\n");
        for entry in &entries {
            let _ = writeln!(
                response,
                "• {} | {:?} | {} {:?} | {}",
                entry.created_at.format("%Y-%m-%d %H:%M"),
                entry.kind,
                entry.amount(),
                entry.currency,
                entry.description
            );
        }
        ctx.say(response).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
