//! Moderation helpers: the discord.py mod log relay and the leaked token scanner.

use std::sync::LazyLock;
use std::time::Duration;

use base64::alphabet;
use base64::engine::DecodePaddingMode;
use base64::engine::GeneralPurpose;
use base64::engine::GeneralPurposeConfig;
use base64::Engine;
use futures::StreamExt;
use regex::Regex;
use tokio::sync::mpsc;
use tracing::instrument;

use super::papi::ModLogEnvelope;
use super::papi::ModerationEvent;
use super::papi::PapiEvent;
use super::random_pastel_colour;
use super::shorten;
use crate::data::ModeratorCache;
use crate::error::PythonistaError;
use crate::lib::github::GithubClient;
use crate::serenity;
use serenity::ChannelId;
use serenity::ComponentInteraction;
use serenity::ComponentInteractionCollector;
use serenity::CreateActionRow;
use serenity::CreateButton;
use serenity::CreateEmbed;
use serenity::CreateEmbedAuthor;
use serenity::CreateEmbedFooter;
use serenity::CreateInteractionResponse;
use serenity::CreateInteractionResponseFollowup;
use serenity::CreateInteractionResponseMessage;
use serenity::CreateMessage;
use serenity::EditMessage;
use serenity::Mentionable;
use serenity::Message;
use serenity::MessageId;
use serenity::User;
use serenity::UserId;

/// Something that looks like a Discord bot token.
static TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-zA-Z0-9_-]{23,28}\.[a-zA-Z0-9_-]{6,7}\.[a-zA-Z0-9_-]{27}").expect("valid regex")
});

/// Standard base64 that doesn't care whether the padding is there.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// How long the ban button stays usable.
const BAN_BUTTON_TIMEOUT: Duration = Duration::from_secs(900);
const BAN_BUTTON_ID: &str = "dpy-modlog-ban";

/// A token is real when its first segment is a base64 encoded user id.
pub fn validate_token(token: &str) -> bool {
    let mut parts = token.split('.');
    let (Some(user_id), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    LENIENT_BASE64
        .decode(user_id)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .is_some_and(|id| id.parse::<u64>().is_ok())
}

/// All valid tokens in a message.
pub fn find_tokens(content: &str) -> Vec<&str> {
    TOKEN_REGEX
        .find_iter(content)
        .map(|m| m.as_str())
        .filter(|token| validate_token(token))
        .collect()
}

/// Upload tokens found in `message` to a public gist, which gets them invalidated.
pub async fn scan_for_tokens(
    ctx: &serenity::Context,
    github: &GithubClient,
    message: &Message,
) -> Result<(), PythonistaError> {
    let tokens = find_tokens(&message.content);
    if tokens.is_empty() {
        return Ok(());
    }

    let Some(url) = github
        .create_gist(
            &tokens.join("\n"),
            Some("Tokens found within the Pythonista guild."),
            Some("tokens.txt"),
            true,
        )
        .await?
    else {
        return Ok(());
    };

    tracing::info!(
        "Uploaded {} token(s) posted by {} ({}).",
        tokens.len(),
        message.author.name,
        message.author.id
    );
    let reply = format!(
        "Hey {}, I found one or more Discord Bot tokens in your message \
         and I've sent them off to be invalidated for you.\n\
         You can find the token(s) [here]({url}).",
        message.author.mention()
    );
    message.reply(ctx, reply).await?;
    Ok(())
}

/// Reason given to discord when banning from the mod log.
fn ban_reason(reason: &str) -> String {
    shorten(
        &format!("Banned due to grievances in discord.py: {reason:?}"),
        128,
        "...",
    )
}

/// The embed posted for a moderation event.
pub fn modlog_embed(
    event: ModerationEvent,
    envelope: &ModLogEnvelope,
    moderator: Option<&User>,
    target: Option<&User>,
) -> CreateEmbed {
    let payload = &envelope.payload;
    let mut embed = CreateEmbed::new()
        .title(format!("Discord.py Moderation Event: {}", event.title()))
        .colour(random_pastel_colour());

    let moderator_format = match moderator {
        Some(moderator) => {
            embed = embed
                .author(CreateEmbedAuthor::new(&moderator.name).icon_url(moderator.face()));
            format!("{} {}", moderator.name, event.prose())
        }
        None => {
            embed = embed.author(CreateEmbedAuthor::new("Unknown Moderator."));
            format!(
                "Unknown Moderator with ID: {} {}",
                payload.author_id,
                event.prose()
            )
        }
    };

    let target_format = match target {
        Some(target) => {
            embed = embed.footer(
                CreateEmbedFooter::new(format!("{} | {}", target.name, payload.target_id))
                    .icon_url(target.face()),
            );
            target.name.clone()
        }
        None => {
            embed = embed.footer(CreateEmbedFooter::new(format!(
                "Not Found | {}",
                payload.target_id
            )));
            format!("An unknown user with ID {}", payload.target_id)
        }
    };

    let reason = if payload.reason.is_empty() {
        "No reason given."
    } else {
        payload.reason.as_str()
    };
    embed = embed
        .field("Reason", reason, false)
        .description(format!("{moderator_format} {target_format}"));

    match serenity::Timestamp::parse(&payload.event_time) {
        Ok(when) => embed.timestamp(when),
        Err(e) => {
            tracing::debug!("Bad event_time '{}': {e}", payload.event_time);
            embed
        }
    }
}

fn ban_button(disabled: bool) -> CreateActionRow {
    CreateActionRow::Buttons(vec![CreateButton::new(BAN_BUTTON_ID)
        .label("Ban")
        .emoji('🔨')
        .style(serenity::ButtonStyle::Danger)
        .disabled(disabled)])
}

/// Snowflakes from the API may be zero, which serenity ids can't hold.
fn user_id(id: u64) -> Option<UserId> {
    (id != 0).then(|| UserId::new(id))
}

/// Posts moderation events from the discord.py guild into the mod log channel.
pub struct ModLogRelay {
    ctx: serenity::Context,
    channel: ChannelId,
    moderators: ModeratorCache,
}

impl ModLogRelay {
    pub fn new(ctx: serenity::Context, channel: ChannelId, moderators: ModeratorCache) -> Self {
        Self {
            ctx,
            channel,
            moderators,
        }
    }

    /// Relay events until every sender is gone.
    #[instrument(name = "modlog", skip_all)]
    pub async fn run(self, mut events: mpsc::Receiver<PapiEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                PapiEvent::DpyModlog(envelope) => {
                    if let Err(e) = self.post(&envelope).await {
                        tracing::error!("Couldn't relay a discord.py moderation event: {e}");
                    }
                }
                PapiEvent::Other { subscription, .. } => {
                    tracing::debug!("Ignoring Pythonista API event for `{subscription}`.")
                }
            }
        }
        tracing::debug!("Moderation event senders are gone, stopping the relay.");
    }

    async fn post(&self, envelope: &ModLogEnvelope) -> Result<(), PythonistaError> {
        let payload = &envelope.payload;
        let event = payload.event()?;

        let target = match user_id(payload.target_id) {
            Some(id) => id.to_user(&self.ctx).await.ok(),
            None => None,
        };
        let moderator = match user_id(payload.author_id) {
            Some(id) => self.moderators.get_or_fetch(&self.ctx, id).await,
            None => None,
        };

        let embed = modlog_embed(event, envelope, moderator.as_ref(), target.as_ref());
        let message = self
            .channel
            .send_message(
                &self.ctx,
                CreateMessage::new()
                    .embed(embed)
                    .components(vec![ban_button(false)]),
            )
            .await?;

        if let Some(target) = user_id(payload.target_id) {
            let ctx = self.ctx.clone();
            let channel = self.channel;
            let reason = payload.reason.clone();
            tokio::spawn(async move {
                if let Err(e) = await_ban_presses(&ctx, channel, message.id, target, &reason).await {
                    tracing::error!("Ban button failed: {e}");
                }
            });
        }
        Ok(())
    }
}

/// Ban `target` whenever someone allowed to presses the button, then disable it on timeout.
async fn await_ban_presses(
    ctx: &serenity::Context,
    channel: ChannelId,
    message: MessageId,
    target: UserId,
    reason: &str,
) -> Result<(), PythonistaError> {
    let mut presses = ComponentInteractionCollector::new(&ctx.shard)
        .message_id(message)
        .custom_ids(vec![BAN_BUTTON_ID.to_string()])
        .timeout(BAN_BUTTON_TIMEOUT)
        .stream();

    while let Some(press) = presses.next().await {
        if let Err(e) = ban_pressed(ctx, &press, target, reason).await {
            tracing::error!("Couldn't ban {target}: {e}");
        }
    }

    channel
        .edit_message(ctx, message, EditMessage::new().components(vec![ban_button(true)]))
        .await?;
    Ok(())
}

async fn ban_pressed(
    ctx: &serenity::Context,
    press: &ComponentInteraction,
    target: UserId,
    reason: &str,
) -> Result<(), PythonistaError> {
    let allowed = press
        .member
        .as_ref()
        .and_then(|member| member.permissions)
        .is_some_and(|perms| perms.ban_members());
    let Some(guild) = press.guild_id.filter(|_| allowed) else {
        let response = CreateInteractionResponseMessage::new()
            .content("You need the Ban Members permission to do that.")
            .ephemeral(true);
        press
            .create_response(ctx, CreateInteractionResponse::Message(response))
            .await?;
        return Ok(());
    };

    press.defer(ctx).await?;
    guild
        .ban_with_reason(ctx, target, 0, &ban_reason(reason))
        .await?;
    tracing::info!("{} banned {target} from the mod log.", press.user.name);
    press
        .create_followup(ctx, CreateInteractionResponseFollowup::new().content("Banned."))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib::papi::ModLogPayload;

    const TOKEN: &str =
        "ODAwODg1MTY2MTYyNjk4MjQ.GhJk3a.abcdefghijklmnopqrstuvwxyz0";

    #[test]
    fn real_tokens_are_found() {
        let content = format!("my bot won't start, token is {TOKEN} pls help");
        assert_eq!(find_tokens(&content), vec![TOKEN]);
    }

    #[test]
    fn token_lookalikes_are_ignored() {
        // First segment decodes to "hello world!xyzhel".
        let fake = "aGVsbG8gd29ybGQheHl6aGVs.GhJk3a.abcdefghijklmnopqrstuvwxyz0";
        assert!(!validate_token(fake));
        assert!(find_tokens(fake).is_empty());
        assert!(!validate_token("not.a.token.at_all"));
        assert!(find_tokens("nothing to see here").is_empty());
    }

    #[test]
    fn padding_is_optional() {
        assert!(validate_token("MTIzNDU2Nzg5MDEyMzQ1Njc4.aaaaaa.b"));
        assert!(validate_token("ODAwODg1MTY2MTYyNjk4MjQ=.aaaaaa.b"));
    }

    #[test]
    fn ban_reason_is_shortened() {
        assert_eq!(
            ban_reason("spam"),
            r#"Banned due to grievances in discord.py: "spam""#
        );
        let long = ban_reason(&"very bad ".repeat(30));
        assert!(long.chars().count() <= 128);
        assert!(long.ends_with("..."));
    }

    fn envelope(reason: &str) -> ModLogEnvelope {
        ModLogEnvelope {
            subscription: "dpy_modlog".to_string(),
            application: None,
            application_name: None,
            user_id: None,
            payload: ModLogPayload {
                moderation_event_type: 1,
                guild_id: 336642139381301249,
                target_id: 42,
                author_id: 7,
                reason: reason.to_string(),
                event_time: "2023-03-01T12:00:00+00:00".to_string(),
            },
        }
    }

    #[test]
    fn embed_for_known_users() {
        let mut moderator = User::default();
        moderator.name = "danny".to_string();
        let mut target = User::default();
        target.name = "spammer".to_string();

        let embed = modlog_embed(
            ModerationEvent::Ban,
            &envelope("spam"),
            Some(&moderator),
            Some(&target),
        );
        let json = serde_json::to_value(&embed).unwrap();

        assert_eq!(json["title"], "Discord.py Moderation Event: Ban");
        assert_eq!(json["description"], "danny banned spammer");
        assert_eq!(json["author"]["name"], "danny");
        assert_eq!(json["footer"]["text"], "spammer | 42");
        assert_eq!(json["fields"][0]["value"], "spam");
    }

    #[test]
    fn embed_for_unknown_users() {
        let embed = modlog_embed(ModerationEvent::Mute, &envelope(""), None, None);
        let json = serde_json::to_value(&embed).unwrap();

        assert_eq!(
            json["description"],
            "Unknown Moderator with ID: 7 muted An unknown user with ID 42"
        );
        assert_eq!(json["author"]["name"], "Unknown Moderator.");
        assert_eq!(json["footer"]["text"], "Not Found | 42");
        assert_eq!(json["fields"][0]["value"], "No reason given.");
    }

    #[test]
    fn zero_ids_are_unknown() {
        assert_eq!(user_id(0), None);
        assert_eq!(user_id(5), Some(UserId::new(5)));
    }
}
