//! Implements the `solved` command.
//!
//! Closes a help forum post: the post is locked, archived and tagged as solved.

use serenity::EditThread;
use serenity::ReactionType;
use tracing::instrument;

use crate::data::GetData;
use crate::error::UserError;
use crate::lib::help_forum;
use crate::serenity;
use crate::Context;
use crate::PythonistaError;

/// Marks a forum post as solved.
///
/// You must be a moderator or the post's owner.
#[instrument(skip(ctx))]
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn solved(ctx: Context<'_>) -> Result<(), PythonistaError> {
    let guild = &ctx.data().config.guild;
    let thread = ctx
        .guild_channel()
        .await
        .filter(|channel| guild.help_forum.is_some() && channel.parent_id == guild.help_forum)
        .ok_or(UserError::NotHelpForum)?;

    let author = ctx.author();
    let is_owner = thread.owner_id == Some(author.id);
    if !help_forum::can_solve(ctx.author_is_mod(), is_owner) {
        return Err(UserError::NotThreadOwner.into());
    }

    match ctx {
        poise::Context::Prefix(prefix) => {
            if let Some(emoji) = guild.solved_emoji {
                let reaction = ReactionType::Custom {
                    animated: false,
                    id: emoji,
                    name: None,
                };
                if let Err(e) = prefix.msg.react(ctx, reaction).await {
                    tracing::debug!("Couldn't react with the solved emoji: {e}");
                }
            }
        }
        poise::Context::Application(_) => {
            ctx.say("Marked as solved.").await?;
        }
    }

    let tags = help_forum::with_solved_tag(&thread.applied_tags, guild.solved_tag);
    let reason = format!("Marked as solved by {}", author.name);
    let edit = EditThread::new()
        .locked(true)
        .archived(true)
        .applied_tags(tags)
        .audit_log_reason(&reason);
    thread.id.edit_thread(ctx, edit).await?;

    tracing::info!("{} marked thread {} as solved.", author.name, thread.id);
    help_forum::forum_log(
        ctx,
        guild,
        help_forum::solved_log(&author.name, author.id, &thread),
    )
    .await
}
