//! The help forum workflow: greeting new posts and closing solved ones.

use crate::error::PythonistaError;
use crate::serenity;
use crate::setup::GuildConfig;
use serenity::ForumTagId;
use serenity::GuildChannel;

/// Discord allows at most this many tags on a post.
const MAX_APPLIED_TAGS: usize = 5;

/// Sent into every new help forum post.
pub fn forum_blurb(prefix: &str) -> String {
    format!(
        "Welcome to the help forum!\n\
         Please provide as much information as possible about your problem, and then wait for someone to help you.\n\
         \n\
         A good question should include:\n\
         - your problem\n\
         - your code\n\
         - your traceback (if applicable)\n\
         - what you've tried so far\n\
         \n\
         Once your issue has been solved type `{prefix}solved` to close the thread."
    )
}

/// Posts can be closed by their owner or a moderator.
pub fn can_solve(is_mod: bool, is_owner: bool) -> bool {
    is_mod || is_owner
}

/// Tags of a post after adding the solved tag.
pub fn with_solved_tag(applied: &[ForumTagId], solved: Option<ForumTagId>) -> Vec<ForumTagId> {
    let mut tags = applied.to_vec();
    if let Some(solved) = solved {
        if !tags.contains(&solved) {
            if tags.len() >= MAX_APPLIED_TAGS {
                tags.pop();
            }
            tags.push(solved);
        }
    }
    tags
}

pub fn created_log(owner: &str, owner_id: impl std::fmt::Display, thread: &GuildChannel) -> String {
    format!(
        "{owner} ({owner_id}) created thread '{}' ({}).",
        thread.name, thread.id
    )
}

pub fn solved_log(author: &str, author_id: impl std::fmt::Display, thread: &GuildChannel) -> String {
    format!(
        "{author} ({author_id}) marked thread '{}' ({}) as solved.",
        thread.name, thread.id
    )
}

/// Send a message to the forum log channel, if there is one.
pub async fn forum_log(
    ctx: impl serenity::CacheHttp,
    guild: &GuildConfig,
    content: String,
) -> Result<(), PythonistaError> {
    let Some(channel) = guild.forum_logs else {
        return Ok(());
    };
    channel.say(ctx.http(), content).await?;
    Ok(())
}

/// Greet a new help forum post and note it in the forum log.
pub async fn forum_post_created(
    ctx: &serenity::Context,
    guild: &GuildConfig,
    prefix: &str,
    thread: &GuildChannel,
) -> Result<(), PythonistaError> {
    if guild.help_forum.is_none() || thread.parent_id != guild.help_forum {
        return Ok(());
    }

    let (owner, owner_id) = match thread.owner_id {
        Some(id) => {
            let name = id
                .to_user(ctx)
                .await
                .map_or_else(|_| "Unknown".to_string(), |user| user.name);
            (name, id.to_string())
        }
        None => ("Unknown".to_string(), "None".to_string()),
    };

    forum_log(ctx, guild, created_log(&owner, owner_id, thread)).await?;
    thread.id.say(ctx, forum_blurb(prefix)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::ChannelId;

    #[test]
    fn blurb_uses_prefix() {
        let blurb = forum_blurb("?");
        assert!(blurb.starts_with("Welcome to the help forum!"));
        assert!(blurb.ends_with("type `?solved` to close the thread."));
    }

    #[test]
    fn owners_and_mods_can_solve() {
        assert!(can_solve(true, false));
        assert!(can_solve(false, true));
        assert!(can_solve(true, true));
        assert!(!can_solve(false, false));
    }

    #[test]
    fn solved_tag_is_added_once() {
        let solved = ForumTagId::new(9);
        let tags = [ForumTagId::new(1)];

        assert_eq!(
            with_solved_tag(&tags, Some(solved)),
            vec![ForumTagId::new(1), solved]
        );
        assert_eq!(with_solved_tag(&[solved], Some(solved)), vec![solved]);
        assert_eq!(with_solved_tag(&tags, None), tags.to_vec());
    }

    #[test]
    fn solved_tag_fits_the_limit() {
        let full = (1..=5).map(ForumTagId::new).collect::<Vec<_>>();
        let tags = with_solved_tag(&full, Some(ForumTagId::new(9)));
        assert_eq!(tags.len(), 5);
        assert_eq!(tags.last(), Some(&ForumTagId::new(9)));
    }

    #[test]
    fn log_lines() {
        let mut thread = GuildChannel::default();
        thread.id = ChannelId::new(55);
        thread.name = "help pls".to_string();

        assert_eq!(
            created_log("danny", 7, &thread),
            "danny (7) created thread 'help pls' (55)."
        );
        assert_eq!(
            solved_log("danny", 7, &thread),
            "danny (7) marked thread 'help pls' (55) as solved."
        );
    }
}
