//! Event handling

use super::github;
use super::help_forum;
use super::moderation;
use crate::serenity;
use crate::Data;
use crate::PythonistaError;
use serenity::FullEvent;

/// Convenient type alias for the context [poise] hands to event handlers.
pub type FrameworkContext<'a> = poise::FrameworkContext<'a, Data, PythonistaError>;

/// Route gateway events to the features listening for them.
pub async fn handle_event(
    ctx: &serenity::Context,
    event: &FullEvent,
    _fw: FrameworkContext<'_>,
    data: &Data,
) -> Result<(), PythonistaError> {
    match event {
        FullEvent::Ready { data_about_bot } => {
            tracing::info!("Connected as {}.", data_about_bot.user.name);
        }
        FullEvent::ReactionAdd { add_reaction } => {
            if let Some(starboard) = &data.starboard {
                starboard.handle_star(ctx, add_reaction).await?;
            }
        }
        FullEvent::ReactionRemove { removed_reaction } => {
            if let Some(starboard) = &data.starboard {
                starboard.handle_unstar(ctx, removed_reaction).await?;
            }
        }
        FullEvent::MessageDelete {
            deleted_message_id,
            ..
        } => {
            if let Some(starboard) = &data.starboard {
                starboard.handle_delete(ctx, *deleted_message_id).await?;
            }
        }
        FullEvent::Message { new_message } => {
            // A failed gist upload shouldn't stop link handling.
            if let Err(e) = moderation::scan_for_tokens(ctx, &data.github, new_message).await {
                tracing::error!("Failed to handle tokens in message {}: {e}", new_message.id);
            }
            github::on_message(ctx, &data.github, &data.config.guild, new_message).await?;
        }
        FullEvent::ThreadCreate { thread } => {
            help_forum::forum_post_created(ctx, &data.config.guild, &data.config.prefix, thread)
                .await?;
        }
        _ => {}
    }
    Ok(())
}
