//! Implements the `information` command.

use poise::CreateReply;
use serenity::ChannelId;
use serenity::CreateEmbed;
use serenity::Guild;
use serenity::GuildId;
use serenity::Member;
use serenity::Permissions;
use serenity::RoleId;
use serenity::UserId;
use tracing::instrument;

use crate::error::UserError;
use crate::lib::info;
use crate::lib::info::Mention;
use crate::serenity;
use crate::Context;
use crate::PythonistaError;

/// The member's roles, highest first, without `@everyone`.
fn sorted_roles(guild: &Guild, member: &Member) -> Vec<RoleId> {
    let mut roles = member
        .roles
        .iter()
        .filter(|&&id| id.get() != guild.id.get())
        .filter_map(|id| guild.roles.get(id))
        .collect::<Vec<_>>();
    roles.sort_by(|a, b| b.cmp(a));
    roles.into_iter().map(|role| role.id).collect()
}

fn role_info(guild: &Guild, id: RoleId) -> Option<CreateEmbed> {
    let role = guild.roles.get(&id)?;
    let members = guild
        .members
        .values()
        .filter(|member| member.roles.contains(&id))
        .count();
    Some(info::role_embed(role, members))
}

fn channel_info(guild: &Guild, id: ChannelId) -> Option<Result<CreateEmbed, UserError>> {
    let channel = guild.channels.get(&id)?;
    let everyone = RoleId::new(guild.id.get());
    let base = guild
        .roles
        .get(&everyone)
        .map_or(Permissions::empty(), |role| role.permissions);
    let perms = info::everyone_permissions(base, &channel.permission_overwrites, everyone);
    Some(info::channel_embed(channel, perms))
}

fn guild_info(guild: &Guild) -> CreateEmbed {
    info::guild_embed(&guild.name, guild.id, guild.icon_url())
}

async fn member_info(
    ctx: &Context<'_>,
    guild_id: GuildId,
    id: UserId,
) -> Option<CreateEmbed> {
    let member = guild_id.member(ctx, id).await.ok()?;
    let roles = {
        let guild = ctx.guild()?;
        sorted_roles(&guild, &member)
    };
    let colour = member.colour(ctx.cache());
    Some(info::member_embed(&member, &roles, colour))
}

/// Info on whatever is mentioned, looking at members, roles, channels and users in that order.
async fn entity_info(
    ctx: &Context<'_>,
    guild_id: GuildId,
    mention: Mention,
) -> Result<Option<CreateEmbed>, UserError> {
    let user = |id: u64| UserId::new(id);

    if let Mention::User(id) | Mention::Id(id) = mention {
        if let Some(embed) = member_info(ctx, guild_id, user(id)).await {
            return Ok(Some(embed));
        }
    }

    {
        let Some(guild) = ctx.guild() else {
            return Err(UserError::GuildOnly);
        };
        if let Mention::Role(id) | Mention::Id(id) = mention {
            if let Some(embed) = role_info(&guild, RoleId::new(id)) {
                return Ok(Some(embed));
            }
        }
        if let Mention::Channel(id) | Mention::Id(id) = mention {
            if let Some(embed) = channel_info(&guild, ChannelId::new(id)) {
                return embed.map(Some);
            }
        }
    }

    if let Mention::Channel(id) | Mention::Id(id) = mention {
        // Channels of other guilds are off limits.
        if let Ok(serenity::Channel::Guild(channel)) = ChannelId::new(id).to_channel(ctx).await {
            if channel.guild_id != guild_id {
                return Err(UserError::NoPermissions);
            }
        }
    }

    if let Mention::User(id) | Mention::Id(id) = mention {
        if let Ok(found) = user(id).to_user(ctx).await {
            return Ok(Some(info::user_embed(&found)));
        }
    }
    Ok(None)
}

/// Get information on a member, user, role or channel. Defaults to the guild.
#[instrument(skip(ctx))]
#[poise::command(prefix_command, slash_command, guild_only, aliases("i", "info"))]
pub async fn information(
    ctx: Context<'_>,
    #[description = "A mention or id of a user, role or channel"] entity: Option<String>,
) -> Result<(), PythonistaError> {
    let guild_id = ctx.guild_id().ok_or(UserError::GuildOnly)?;
    let home = ctx.data().config.guild.guild_id;

    let embed = match entity {
        None => {
            if home.is_some_and(|home| home != guild_id) {
                return Err(UserError::NoPermissions.into());
            }
            let guild = ctx.guild().ok_or(UserError::GuildOnly)?;
            guild_info(&guild)
        }
        Some(query) => {
            let mention = Mention::parse(&query).ok_or_else(|| UserError::NotFound {
                query: query.clone(),
            })?;
            entity_info(&ctx, guild_id, mention)
                .await?
                .ok_or(UserError::NotFound { query })?
        }
    };

    let reply = CreateReply::default()
        .embed(embed)
        .reply(true)
        .allowed_mentions(serenity::CreateAllowedMentions::new().replied_user(false));
    ctx.send(reply).await?;
    Ok(())
}
