//! General Discord commands - ping and help.
//! These commands don't touch the ledger.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::BotData,
        errors::{Error, Result},
    };

    /// Responds with "Pong!" to test bot connectivity.
    #[poise::command(slash_command, prefix_command)]
    pub async fn ping(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        ctx.say("Pong!").await?;
        Ok(())
    }

    /// Displays help information about available commands.
    #[poise::command(slash_command, prefix_command)]
    pub async fn help(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let mining = &ctx.data().engine.config().mining;
        let help_text = format!(
            "**SlotMiner Help**\n\
            Buy a mining slot, watch it earn, and collect the yield when the term is over.\n\
            Each slot earns {rate}% of its principal over {days} days (minimum {minimum}).\n\n\
            **Mining Commands**\n\
            • `/mining` - Shows your active slots, live earnings and yield balance.\n\
            • `/buy <amount>` - Buys a slot with funds from your principal wallet.\n\
            • `/claim [slot_id]` - Collects earnings of finished slots right away.\n\
            • `/history` - Shows your recent ledger activity.\n\n\
            **Utility Commands**\n\
            • `/ping` - Checks if the bot is responsive.\n\
            • `/help` - Shows this help message.\n\n\
            Finished slots are also settled automatically every few minutes.",
            rate = mining.weekly_rate * rust_decimal::Decimal::ONE_HUNDRED,
            days = mining.term_days,
            minimum = mining.minimum_investment,
        );

        ctx.say(help_text).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
