//! Implements the `rtfm` and `rtfs` commands.
//!
//! Both search a library through idevision. The library is either named as the first word of
//! the query, or guessed from the channel the command was used in.

use poise::CreateReply;
use reqwest::Response;
use serenity::CreateEmbed;
use serenity::CreateEmbedAuthor;
use serenity::CreateEmbedFooter;
use tracing::instrument;
use url::Url;

use crate::data::GetData;
use crate::error::UserError;
use crate::lib::guess::guess_topic;
use crate::lib::guess::ChannelHints;
use crate::lib::manuals;
use crate::lib::manuals::IdevisionResponse;
use crate::lib::manuals::Library;
use crate::lib::manuals::Lookup;
use crate::lib::paginator::text_pages;
use crate::lib::paginator::EntryPages;
use crate::lib::paginator::Pager;
use crate::serenity;
use crate::Context;
use crate::PythonistaError;

const NOTHING_FOUND: &str = "Could not find anything. Sorry.";
/// Results shown on each `rtfm` page.
const RTFM_PER_PAGE: usize = 8;

/// Moderators aren't held back by the cooldown.
async fn check_cooldown(ctx: &Context<'_>, rtfs: bool) -> Result<(), PythonistaError> {
    if ctx.author_is_mod() {
        return Ok(());
    }
    let data = ctx.data();
    let cooldown = if rtfs {
        &data.rtfs_cooldown
    } else {
        &data.rtfm_cooldown
    };
    cooldown.hit(ctx.guild_id(), ctx.author().id)?;
    Ok(())
}

fn channel_hints(ctx: &Context<'_>) -> ChannelHints {
    ChannelHints::from_cache(ctx.cache(), ctx.guild_id(), ctx.channel_id())
}

/// Reply that points at the message the invocation replied to, like the invocation itself.
fn referencing(ctx: &Context<'_>, reply: CreateReply) -> CreateReply {
    match ctx {
        poise::Context::Prefix(prefix) => match &prefix.msg.referenced_message {
            Some(replied) => reply.reference_message(replied.as_ref()),
            None => reply,
        },
        poise::Context::Application(_) => reply,
    }
}

/// Figure out the library for `query`. `Ok(None)` means the docs url has been sent instead.
async fn lookup(ctx: &Context<'_>, query: &str) -> Result<Option<Lookup>, PythonistaError> {
    let hints = channel_hints(ctx);
    let guild = &ctx.data().config.guild;

    if query.trim().is_empty() {
        let library = guess_topic(&hints, guild, true)
            .map(Library::from_topic)
            .ok_or(UserError::NoDefaultLibrary)?;
        send_docs_url(ctx, library, "").await?;
        return Ok(None);
    }

    let lookup = manuals::resolve(query, &hints, guild)?;
    if lookup.query.is_empty() {
        send_docs_url(ctx, lookup.library, &lookup.tip).await?;
        return Ok(None);
    }
    Ok(Some(lookup))
}

async fn send_docs_url(ctx: &Context<'_>, library: Library, tip: &str) -> Result<(), PythonistaError> {
    let url = library.docs_url().ok_or(UserError::UnknownLibrary)?;
    let reply = CreateReply::default().content(format!("{url}{tip}"));
    ctx.send(referencing(ctx, reply)).await?;
    Ok(())
}

/// Ask idevision. `Ok(None)` means the user has already been told why there's nothing to show.
async fn query_idevision(
    ctx: &Context<'_>,
    url: Url,
) -> Result<Option<IdevisionResponse>, PythonistaError> {
    let mut request = ctx
        .http_client()
        .get(url)
        .header("User-Agent", format!("PythonistaBot discord bot (via {})", ctx.author().name));
    if let Some(token) = ctx.data().config.tokens.idevision() {
        request = request.header("Authorization", token);
    }

    let response: Response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!("idevision answered with {status}: {body}");
        ctx.say(format!(
            "The api returned an irregular status ({}) ({body})",
            status.as_u16()
        ))
        .await?;
        return Ok(None);
    }

    let matches: IdevisionResponse = response.json().await?;
    if matches.nodes.is_empty() {
        ctx.say(NOTHING_FOUND).await?;
        return Ok(None);
    }
    Ok(Some(matches))
}

/// Searches relevant documentation.
///
/// Prefix the query with a library to pick one: wavelink (wl), twitchio (tio), python (py),
/// discordpy (dpy). Flags: `--labels` includes labels, `--clear` prefixes them with `label:`.
#[instrument(skip(ctx))]
#[poise::command(prefix_command, slash_command, aliases("docs", "rtfd"))]
pub async fn rtfm(
    ctx: Context<'_>,
    #[description = "[library] query [--labels] [--clear]"]
    #[rest]
    query: Option<String>,
) -> Result<(), PythonistaError> {
    check_cooldown(&ctx, false).await?;

    let mut query = query.unwrap_or_default();
    let mut labels = manuals::take_flag(&mut query, "--labels");
    let clear_labels = manuals::take_flag(&mut query, "--clear");
    labels |= clear_labels;

    let Some(lookup) = lookup(&ctx, &query).await? else {
        return Ok(());
    };
    let url = manuals::rtfm_url(lookup.library, &lookup.query, labels, clear_labels)?;
    let Some(matches) = query_idevision(&ctx, url).await? else {
        return Ok(());
    };

    let pages = EntryPages::builder()
        .entries(manuals::node_links(&matches, true))
        .per_page(RTFM_PER_PAGE)
        .nocount(true)
        .show_entry_count(false)
        .title(format!("{}: {}", lookup.library.title(), lookup.query))
        .colour(lookup.library.colour())
        .author(CreateEmbedAuthor::new(format!(
            "Query Time: {:.2}",
            matches.query_time()
        )))
        .build()
        .into_pages();

    Pager::builder()
        .ctx(ctx)
        .pages(pages)
        .maybe_content((!lookup.tip.is_empty()).then_some(lookup.tip))
        .build()
        .paginate()
        .await
}

/// Searches relevant library source code.
///
/// Prefix the query with a library to pick one: wavelink (wl), twitchio (tio), discordpy (dpy),
/// aiohttp. The `--source` flag sends the code instead of links to it.
#[instrument(skip(ctx))]
#[poise::command(prefix_command, slash_command, aliases("source"))]
pub async fn rtfs(
    ctx: Context<'_>,
    #[description = "[library] query [--source]"]
    #[rest]
    query: Option<String>,
) -> Result<(), PythonistaError> {
    check_cooldown(&ctx, true).await?;

    let mut query = query.unwrap_or_default();
    let source = manuals::take_flag(&mut query, "--source");

    let Some(lookup) = lookup(&ctx, &query).await? else {
        return Ok(());
    };
    let url = manuals::rtfs_url(lookup.library, &lookup.query, source)?;
    let Some(matches) = query_idevision(&ctx, url).await? else {
        return Ok(());
    };

    if !source {
        let mut embed = CreateEmbed::new()
            .colour(lookup.library.colour())
            .title(format!("{}: {}", lookup.library.title(), lookup.query))
            .description(manuals::node_links(&matches, false).join("\n"))
            .author(CreateEmbedAuthor::new(format!(
                "query Time: {:.3} • commit {}",
                matches.query_time(),
                matches.short_commit()
            )));
        if !lookup.tip.is_empty() {
            embed = embed.footer(CreateEmbedFooter::new(lookup.tip));
        }
        ctx.send(CreateReply::default().embed(embed)).await?;
        return Ok(());
    }

    let Some((name, code)) = matches.nodes().next() else {
        ctx.say(NOTHING_FOUND).await?;
        return Ok(());
    };
    let intro = format!(
        "Showing source for `{name}`\nCommit: {}{}",
        matches.short_commit(),
        lookup.tip
    );
    ctx.send(referencing(&ctx, CreateReply::default().content(intro)))
        .await?;

    Pager::builder()
        .ctx(ctx)
        .pages(text_pages(code, "```py", "```", 2000))
        .reply_author_takes_paginator(true)
        .build()
        .paginate()
        .await
}
