//! Embeds describing users, members, roles, channels and the home guild.

use crate::error::UserError;
use crate::lib::format_dt;
use crate::serenity;
use serenity::CreateEmbed;
use serenity::CreateEmbedAuthor;
use serenity::GuildChannel;
use serenity::Member;
use serenity::Mentionable;
use serenity::PermissionOverwrite;
use serenity::PermissionOverwriteType;
use serenity::Permissions;
use serenity::Role;
use serenity::RoleId;
use serenity::Timestamp;
use serenity::User;

/// What an `information` argument points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mention {
    User(u64),
    Role(u64),
    Channel(u64),
    /// A bare id, could be anything.
    Id(u64),
}

impl Mention {
    /// Parse `<@id>`, `<@!id>`, `<@&id>`, `<#id>` or a bare id.
    pub fn parse(arg: &str) -> Option<Self> {
        let arg = arg.trim();
        let id = |s: &str| s.parse::<u64>().ok().filter(|&id| id != 0);

        let Some(inner) = arg.strip_prefix('<').and_then(|s| s.strip_suffix('>')) else {
            return id(arg).map(Mention::Id);
        };

        if let Some(rest) = inner.strip_prefix("@&") {
            id(rest).map(Mention::Role)
        } else if let Some(rest) = inner.strip_prefix("@!") {
            id(rest).map(Mention::User)
        } else if let Some(rest) = inner.strip_prefix('@') {
            id(rest).map(Mention::User)
        } else if let Some(rest) = inner.strip_prefix('#') {
            id(rest).map(Mention::Channel)
        } else {
            None
        }
    }
}

/// What `@everyone` may do in a channel, given the role's guild wide permissions.
pub fn everyone_permissions(
    base: Permissions,
    overwrites: &[PermissionOverwrite],
    everyone: RoleId,
) -> Permissions {
    if base.administrator() {
        return Permissions::all();
    }
    overwrites
        .iter()
        .filter(|o| o.kind == PermissionOverwriteType::Role(everyone))
        .fold(base, |perms, o| (perms & !o.deny) | o.allow)
}

fn random_colour() -> serenity::Colour {
    serenity::Colour::new(rand::random::<u32>() & 0xFF_FFFF)
}

/// Discord timestamps in long and relative form.
fn long_and_relative(ts: &Timestamp) -> String {
    format!("{}\n({})", format_dt(ts, 'F'), format_dt(ts, 'R'))
}

fn base_embed(name: &str, id: impl std::fmt::Display) -> CreateEmbed {
    CreateEmbed::new()
        .title(format!("Info on {name}!"))
        .colour(random_colour())
        .field("ID:", id.to_string(), true)
        .timestamp(Timestamp::now())
}

pub fn user_embed(user: &User) -> CreateEmbed {
    base_embed(user.display_name(), user.id)
        .author(CreateEmbedAuthor::new(&user.name))
        .image(user.face())
        .field(
            "Account was created on:",
            long_and_relative(&user.id.created_at()),
            true,
        )
}

/// Mentions of the first five roles. Discord refuses empty field values.
fn top_roles(roles: &[RoleId]) -> String {
    if roles.is_empty() {
        return "None".to_string();
    }
    roles
        .iter()
        .take(5)
        .map(|role| role.mention().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// `roles` should be the member's roles, highest first, without `@everyone`.
pub fn member_embed(member: &Member, roles: &[RoleId], colour: Option<serenity::Colour>) -> CreateEmbed {
    let mut embed = user_embed(&member.user);
    if let Some(joined_at) = &member.joined_at {
        embed = embed.field("Member joined the guild on:", long_and_relative(joined_at), true);
    }

    embed = embed.field("Member's top 5 roles:-", top_roles(roles), false);

    match colour {
        Some(colour) => embed.colour(colour),
        None => embed,
    }
}

pub fn role_embed(role: &Role, member_count: usize) -> CreateEmbed {
    let mut embed = base_embed(&role.name, role.id)
        .field("Mentionable?", role.mentionable.to_string(), true)
        .field("Hoisted?", role.hoist.to_string(), true)
        .field("Member count:", member_count.to_string(), true)
        .field("Created on:", format_dt(&role.id.created_at(), 'F'), true);
    if role.colour.0 != 0 {
        embed = embed.colour(role.colour);
    }
    embed
}

/// Whether a channel is private, refusing the ones hidden from `@everyone`.
///
/// Since hidden channels are refused, a shown channel is never private.
fn channel_privacy(everyone: Permissions) -> Result<bool, UserError> {
    let is_private = !everyone.view_channel();
    if is_private {
        return Err(UserError::NoPermissions);
    }
    Ok(is_private)
}

/// Info on a channel. Channels hidden from `@everyone` are refused.
pub fn channel_embed(
    channel: &GuildChannel,
    everyone: Permissions,
) -> Result<CreateEmbed, UserError> {
    let is_private = channel_privacy(everyone)?;
    Ok(base_embed(&channel.name, channel.id)
        .url(format!(
            "https://discord.com/channels/{}/{}",
            channel.guild_id, channel.id
        ))
        .field("Channel type:", channel.kind.name(), false)
        .field("Created on:", format_dt(&channel.id.created_at(), 'F'), false)
        .field("Private Channel?", is_private.to_string(), true))
}

pub fn guild_embed(
    name: &str,
    id: serenity::GuildId,
    icon_url: Option<String>,
) -> CreateEmbed {
    let embed = base_embed(name, id).field("Created on:", format_dt(&id.created_at(), 'F'), true);
    match icon_url {
        Some(url) => embed.thumbnail(url),
        None => embed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::UserId;

    #[test]
    fn mentions() {
        assert_eq!(Mention::parse("<@123>"), Some(Mention::User(123)));
        assert_eq!(Mention::parse("<@!123>"), Some(Mention::User(123)));
        assert_eq!(Mention::parse("<@&5>"), Some(Mention::Role(5)));
        assert_eq!(Mention::parse("<#9>"), Some(Mention::Channel(9)));
        assert_eq!(Mention::parse(" 42 "), Some(Mention::Id(42)));
        assert_eq!(Mention::parse("<:emoji:42>"), None);
        assert_eq!(Mention::parse("0"), None);
        assert_eq!(Mention::parse("danny"), None);
    }

    fn overwrite(kind: PermissionOverwriteType, allow: Permissions, deny: Permissions) -> PermissionOverwrite {
        PermissionOverwrite { allow, deny, kind }
    }

    #[test]
    fn everyone_overwrites_apply() {
        let everyone = RoleId::new(1);
        let base = Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES;

        let hidden = [overwrite(
            PermissionOverwriteType::Role(everyone),
            Permissions::empty(),
            Permissions::VIEW_CHANNEL,
        )];
        assert!(!everyone_permissions(base, &hidden, everyone).view_channel());

        // Other roles and members don't matter.
        let unrelated = [
            overwrite(
                PermissionOverwriteType::Role(RoleId::new(2)),
                Permissions::empty(),
                Permissions::VIEW_CHANNEL,
            ),
            overwrite(
                PermissionOverwriteType::Member(UserId::new(3)),
                Permissions::empty(),
                Permissions::VIEW_CHANNEL,
            ),
        ];
        assert!(everyone_permissions(base, &unrelated, everyone).view_channel());

        let opened = [overwrite(
            PermissionOverwriteType::Role(everyone),
            Permissions::VIEW_CHANNEL,
            Permissions::empty(),
        )];
        assert!(everyone_permissions(Permissions::empty(), &opened, everyone).view_channel());
    }

    #[test]
    fn top_roles_are_never_empty() {
        assert_eq!(top_roles(&[]), "None");
        let roles = (1..=7).map(RoleId::new).collect::<Vec<_>>();
        assert_eq!(top_roles(&roles), "<@&1>\n<@&2>\n<@&3>\n<@&4>\n<@&5>");
    }

    #[test]
    fn hidden_channels_are_refused() {
        assert!(matches!(
            channel_privacy(Permissions::SEND_MESSAGES),
            Err(UserError::NoPermissions)
        ));
        assert!(matches!(channel_privacy(Permissions::VIEW_CHANNEL), Ok(false)));
    }

    #[test]
    fn role_embed_fields() {
        let mut role = Role::default();
        role.id = RoleId::new(578255729295884308);
        role.name = "Moderator".to_string();
        role.mentionable = true;

        let json = serde_json::to_value(role_embed(&role, 4)).unwrap();
        assert_eq!(json["title"], "Info on Moderator!");
        assert_eq!(json["fields"][0]["value"], "578255729295884308");
        assert_eq!(json["fields"][1]["value"], "true");
        assert_eq!(json["fields"][2]["value"], "false");
        assert_eq!(json["fields"][3]["value"], "4");
    }
}
