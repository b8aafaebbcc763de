//! Autocomplete handlers for Discord slash command parameters.

use crate::{
    bot::BotData,
    core::{slot, user},
    errors::Error,
};
use chrono::Utc;

/// Suggests the author's claimable slot ids.
///
/// Returns nothing for unknown users instead of registering them, so typing a
/// command never creates an account.
pub async fn autocomplete_claimable_slot(
    ctx: poise::Context<'_, BotData, Error>,
    partial: &str,
) -> Vec<String> {
    let db = ctx.data().engine.database();
    let external_id = ctx.author().id.to_string();

    let Ok(Some(owner)) = user::get_user_by_external_id(db, &external_id).await else {
        return Vec::new();
    };
    let Ok(slots) = slot::get_claimable_slots(db, owner.id, None, Utc::now()).await else {
        return Vec::new();
    };

    slots
        .into_iter()
        .map(|s| s.id.to_string())
        .filter(|id| id.starts_with(partial.trim_start_matches('#')))
        .take(25) // Discord autocomplete limit
        .collect()
}
