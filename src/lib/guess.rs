//! Guesses which library a channel is about.
//!
//! Help forum posts are tagged by library, and a few channels are dedicated to one library.

use crate::serenity;
use crate::setup::GuildConfig;
use serenity::ChannelId;
use serenity::ForumTagId;
use serenity::GuildId;

/// Libraries that have their own channel or forum tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    TwitchIO,
    Wavelink,
    DiscordPy,
    Python,
}

/// Where a message was sent, reduced to what's needed for a guess.
#[derive(Debug, Clone)]
pub struct ChannelHints {
    pub channel_id: ChannelId,
    /// The forum or channel a thread belongs to.
    pub parent_id: Option<ChannelId>,
    /// Tags applied to a forum post.
    pub tag_ids: Vec<ForumTagId>,
    /// Names of the tags in `tag_ids`.
    pub tag_names: Vec<String>,
}

impl ChannelHints {
    /// Hints for a channel that isn't a thread.
    pub fn new(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            parent_id: None,
            tag_ids: Vec::new(),
            tag_names: Vec::new(),
        }
    }

    /// Collect hints about `channel_id`, looking at the guild cache for threads and forum tags.
    pub fn from_cache(
        cache: &serenity::Cache,
        guild_id: Option<GuildId>,
        channel_id: ChannelId,
    ) -> Self {
        let mut hints = Self::new(channel_id);
        let Some(guild) = guild_id.and_then(|id| cache.guild(id)) else {
            return hints;
        };

        let channel = guild
            .channels
            .get(&channel_id)
            .or_else(|| guild.threads.iter().find(|t| t.id == channel_id));
        let Some(channel) = channel else {
            return hints;
        };
        hints.parent_id = channel.parent_id;
        hints.tag_ids = channel.applied_tags.clone();

        if let Some(forum) = channel.parent_id.and_then(|id| guild.channels.get(&id)) {
            hints.tag_names = forum
                .available_tags
                .iter()
                .filter(|tag| channel.applied_tags.contains(&tag.id))
                .map(|tag| tag.name.clone())
                .collect();
        }
        hints
    }

    /// Whether this is a post in the help forum.
    pub fn in_forum(&self, guild: &GuildConfig) -> bool {
        guild.help_forum.is_some() && self.parent_id == guild.help_forum
    }
}

/// Guess the [Topic] of a channel.
///
/// `include_python` controls whether the `python-help` tag counts, GitHub links have no
/// repository to map it to.
pub fn guess_topic(hints: &ChannelHints, guild: &GuildConfig, include_python: bool) -> Option<Topic> {
    // There's not much hope in the general help channel.
    if guild.help_channel == Some(hints.channel_id) {
        return None;
    }

    if hints.in_forum(guild) {
        let has = |tag: &str| hints.tag_names.iter().any(|t| t == tag);
        return if has("twitchio-help") {
            Some(Topic::TwitchIO)
        } else if has("wavelink-help") {
            Some(Topic::Wavelink)
        } else if has("discord.py-help") {
            Some(Topic::DiscordPy)
        } else if include_python && has("python-help") {
            Some(Topic::Python)
        } else {
            None
        };
    }

    if guild.wavelink_dev == Some(hints.channel_id) {
        Some(Topic::Wavelink)
    } else if guild.twitchio_dev == Some(hints.channel_id) {
        Some(Topic::TwitchIO)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guild() -> GuildConfig {
        GuildConfig {
            help_forum: Some(ChannelId::new(10)),
            help_channel: Some(ChannelId::new(11)),
            wavelink_dev: Some(ChannelId::new(12)),
            twitchio_dev: Some(ChannelId::new(13)),
            ..GuildConfig::default()
        }
    }

    fn forum_post(tags: &[&str]) -> ChannelHints {
        ChannelHints {
            channel_id: ChannelId::new(100),
            parent_id: Some(ChannelId::new(10)),
            tag_ids: Vec::new(),
            tag_names: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn forum_tags_pick_the_library() {
        let guild = guild();
        assert_eq!(
            guess_topic(&forum_post(&["wavelink-help"]), &guild, true),
            Some(Topic::Wavelink)
        );
        assert_eq!(
            guess_topic(&forum_post(&["other", "discord.py-help"]), &guild, true),
            Some(Topic::DiscordPy)
        );
        assert_eq!(guess_topic(&forum_post(&["other"]), &guild, true), None);
    }

    #[test]
    fn python_tag_is_optional() {
        let guild = guild();
        let post = forum_post(&["python-help"]);
        assert_eq!(guess_topic(&post, &guild, true), Some(Topic::Python));
        assert_eq!(guess_topic(&post, &guild, false), None);
    }

    #[test]
    fn dev_channels_have_a_library() {
        let guild = guild();
        let hints = |id| ChannelHints::new(ChannelId::new(id));
        assert_eq!(guess_topic(&hints(12), &guild, true), Some(Topic::Wavelink));
        assert_eq!(guess_topic(&hints(13), &guild, true), Some(Topic::TwitchIO));
        assert_eq!(guess_topic(&hints(11), &guild, true), None);
        assert_eq!(guess_topic(&hints(99), &guild, true), None);
    }
}
