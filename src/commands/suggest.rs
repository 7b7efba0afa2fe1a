//! Implements the `suggest` command.

use serenity::CreateEmbed;
use serenity::CreateEmbedAuthor;
use serenity::ExecuteWebhook;
use serenity::Timestamp;
use serenity::Webhook;
use tracing::instrument;

use crate::serenity;
use crate::Context;
use crate::PythonistaError;

/// What a suggestion is about.
#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum SuggestionTarget {
    #[name = "guild"]
    Guild,
    #[name = "pythonistabot"]
    PythonistaBot,
    #[name = "twitchio"]
    TwitchIO,
    #[name = "wavelink"]
    Wavelink,
}

impl SuggestionTarget {
    fn name(self) -> &'static str {
        match self {
            SuggestionTarget::Guild => "guild",
            SuggestionTarget::PythonistaBot => "pythonistabot",
            SuggestionTarget::TwitchIO => "twitchio",
            SuggestionTarget::Wavelink => "wavelink",
        }
    }
}

fn suggestion_embed(target: SuggestionTarget, suggestion: &str, author: &serenity::User) -> CreateEmbed {
    CreateEmbed::new()
        .title(format!("Suggestion for {}", target.name()))
        .description(suggestion)
        .timestamp(Timestamp::now())
        .author(CreateEmbedAuthor::new(&author.name).icon_url(author.face()))
}

/// Suggestions are disabled without a webhook to send them to.
async fn has_webhook(ctx: Context<'_>) -> Result<bool, PythonistaError> {
    Ok(ctx.data().config.suggestions.webhook_url().is_some())
}

/// Send a suggestion for the server, or a library.
#[instrument(skip(ctx))]
#[poise::command(prefix_command, slash_command, check = "has_webhook")]
pub async fn suggest(
    ctx: Context<'_>,
    #[description = "What the suggestion is for"] target: SuggestionTarget,
    #[description = "Your suggestion"]
    #[rest]
    suggestion: String,
) -> Result<(), PythonistaError> {
    let Some(url) = ctx.data().config.suggestions.webhook_url() else {
        return Ok(());
    };
    let author = ctx.author();

    let webhook = Webhook::from_url(ctx, url).await?;
    let message = ExecuteWebhook::new()
        .embed(suggestion_embed(target, &suggestion, author))
        .username(&author.name)
        .avatar_url(author.face());
    webhook.execute(ctx, false, message).await?;

    tracing::info!("{} suggested something for {}.", author.name, target.name());
    ctx.say("Thanks for the suggestion!").await?;
    Ok(())
}
