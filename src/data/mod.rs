//! This module contains everything relating to [Data].

mod moderator_cache;

use std::collections::HashSet;
use std::sync::Arc;

use reqwest::Client;
use serenity::RoleId;
use serenity::UserId;

use crate::lib::github::GithubClient;
use crate::lib::manuals::MemberCooldown;
use crate::lib::starboard::Starboard;
use crate::serenity;
use crate::setup::Config;
use crate::Context;
pub use moderator_cache::ModeratorCache;

/// The data kept between shards
#[derive(Debug)]
pub struct Data {
    /// List of users to send bug notifications
    pub notify_list: HashSet<UserId>,
    /// Members of these roles count as bot owners.
    pub owner_roles: HashSet<RoleId>,
    /// The config the bot was started with.
    pub config: Config,
    /// Shared http client for third party APIs, uses an [Arc] internally.
    pub http: Client,
    /// Rate limited GitHub API access.
    pub github: Arc<GithubClient>,
    /// `None` when no starboard channel or database is configured.
    pub starboard: Option<Starboard>,
    /// Users who showed up as moderators in the discord.py mod log.
    pub moderators: ModeratorCache,
    /// Cooldowns of `rtfm` and `rtfs`, which moderators skip.
    pub rtfm_cooldown: MemberCooldown,
    pub rtfs_cooldown: MemberCooldown,
}

/// Convenient accessors on [Context].
pub trait GetData {
    /// Returns a [Client].
    fn http_client(&self) -> Client;
    /// Whether the author has the moderator role of the home guild.
    fn author_is_mod(&self) -> bool;
    /// Whether the author is a configured owner, directly or through a role.
    fn author_is_owner(&self) -> bool;
}

impl GetData for Context<'_> {
    fn http_client(&self) -> Client {
        // Client internally uses an Arc, so this is cheap to clone
        self.data().http.clone()
    }

    fn author_is_mod(&self) -> bool {
        let Some(mod_role) = self.data().config.guild.moderator_role else {
            return false;
        };
        author_roles(self).contains(&mod_role)
    }

    fn author_is_owner(&self) -> bool {
        if self.framework().options().owners.contains(&self.author().id) {
            return true;
        }
        let owner_roles = &self.data().owner_roles;
        author_roles(self).iter().any(|role| owner_roles.contains(role))
    }
}

/// Roles of the invoking member, empty outside of guilds.
fn author_roles(ctx: &Context<'_>) -> Vec<RoleId> {
    let roles = match ctx {
        poise::Context::Application(app) => app.interaction.member.as_ref().map(|m| m.roles.clone()),
        poise::Context::Prefix(prefix) => prefix.msg.member.as_ref().map(|m| m.roles.clone()),
    };
    roles.unwrap_or_default()
}
