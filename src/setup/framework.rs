//! Setup for [poise::Framework]

use std::collections::HashSet;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::mpsc;
use tokio::sync::watch;

use crate::commands;
use crate::data::ModeratorCache;
use crate::lib::github::GithubClient;
use crate::lib::manuals::MemberCooldown;
use crate::lib::moderation::ModLogRelay;
use crate::lib::papi::PapiClient;
use crate::lib::papi::PapiEvent;
use crate::lib::server;
use crate::lib::starboard::PgStarStore;
use crate::lib::starboard::Starboard;
use crate::serenity;
use crate::Config;
use crate::Data;
use crate::PythonistaError;
use serenity::RoleId;
use serenity::UserId;

/// Convenient type alias, only this [poise::Framework] type is used.
type Framework = poise::Framework<Data, PythonistaError>;

/// Moderation events waiting to be relayed.
const EVENT_BUFFER: usize = 64;

/// Construct a [poise::Framework]
pub(super) fn framework(config: Config, shutdown: Arc<watch::Sender<bool>>) -> Framework {
    poise::Framework::builder()
        .options(framework_options(&config))
        .setup(|ctx, rdy, fw| framework_setup(ctx, rdy, fw, config, shutdown))
        .build()
}

/// Configure options for the [Framework]
fn framework_options(config: &Config) -> poise::FrameworkOptions<Data, PythonistaError> {
    poise::FrameworkOptions {
        // Add commands to the framework
        commands: crate::commands::list(),
        prefix_options: poise::PrefixFrameworkOptions {
            prefix: Some(config.prefix.clone()),
            mention_as_prefix: true,
            case_insensitive_commands: true,
            ..Default::default()
        },
        // Owner ids that turn out to be roles are picked up during setup.
        owners: config.owner_ids.iter().map(|&id| UserId::new(id)).collect(),
        // Handle framework errors
        on_error: |e| crate::log::handle_framework_error(e),
        // Route gateway events
        event_handler: |ctx, event, fw, data| {
            Box::pin(crate::lib::events::handle_event(ctx, event, fw, data))
        },
        // Log when commands start
        pre_command: |ctx| {
            Box::pin(async move {
                let cmd_name = &ctx.command().name;
                let user = &ctx.author().name;
                tracing::info!("Started '{cmd_name}' command from {user}.")
            })
        },
        // Log when finishing commands
        post_command: |ctx| {
            Box::pin(async move {
                let cmd_name = &ctx.command().name;
                let user = &ctx.author().name;
                tracing::info!("Finished '{cmd_name}' command from {user}.")
            })
        },
        ..Default::default()
    }
}

/// Owner ids that are roles of the home guild.
async fn owner_roles(
    ctx: &serenity::Context,
    config: &Config,
) -> Result<HashSet<RoleId>, PythonistaError> {
    let Some(guild_id) = config.guild.guild_id else {
        return Ok(HashSet::new());
    };
    if config.owner_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let roles = guild_id.roles(ctx).await?;
    let owner_roles = config
        .owner_ids
        .iter()
        .map(|&id| RoleId::new(id))
        .filter(|id| roles.contains_key(id))
        .collect::<HashSet<_>>();
    for role in &owner_roles {
        tracing::info!("Members of role {role} are owners.");
    }
    Ok(owner_roles)
}

/// The starboard, if a channel and a database are configured.
async fn starboard(config: &Config) -> Result<Option<Starboard>, PythonistaError> {
    if config.starboard.channel.is_none() {
        tracing::info!("No starboard channel configured, starboard disabled.");
        return Ok(None);
    }
    let Some(dsn) = config.database.dsn() else {
        tracing::warn!("No database configured, starboard disabled.");
        return Ok(None);
    };

    let pool = PgPoolOptions::new().max_connections(5).connect(dsn).await?;
    sqlx::migrate!().run(&pool).await?;
    tracing::info!("Connected to the starboard database.");

    Ok(Starboard::new(
        Arc::new(PgStarStore::new(pool)),
        &config.starboard,
    ))
}

/// Start the mod log relay and whatever feeds it.
fn spawn_modlog(
    ctx: &serenity::Context,
    config: &Config,
    moderators: &ModeratorCache,
    shutdown: &watch::Sender<bool>,
) {
    let (events_tx, events_rx) = mpsc::channel::<PapiEvent>(EVENT_BUFFER);

    match config.guild.dpy_mod_logs {
        Some(channel) => {
            let relay = ModLogRelay::new(ctx.clone(), channel, moderators.clone());
            tokio::spawn(relay.run(events_rx));
        }
        None => tracing::warn!("No discord.py mod log channel configured, moderation events are dropped."),
    }

    let token = config.tokens.pythonista();
    match token {
        Some(token) => {
            let client = PapiClient::new(token.to_string(), events_tx.clone(), shutdown.subscribe());
            tokio::spawn(client.run());
        }
        None => tracing::warn!("No Pythonista API token configured, not connecting to the websocket."),
    }

    if config.webserver.enabled {
        let host = config.webserver.host.clone();
        let port = config.webserver.port;
        let state = server::ServerState::new(token, events_tx);
        let shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = server::run_server(&host, port, state, shutdown).await {
                tracing::error!("Webserver stopped: {e}");
            }
        });
    }
}

/// Construct future that runs on startup
fn framework_setup<'a>(
    ctx: &'a serenity::Context,
    rdy: &'a serenity::Ready,
    fw: &'a Framework,
    config: Config,
    shutdown: Arc<watch::Sender<bool>>,
) -> poise::BoxFuture<'a, Result<Data, PythonistaError>> {
    Box::pin(async move {
        // Register the commands
        let commands = &commands::list();
        let app_commands = poise::builtins::create_application_commands(commands);

        serenity::Command::set_global_commands(&ctx, app_commands.clone()).await?;
        if let Some(dev_guild) = config.dev_guild() {
            // This is faster than global registers, useful for development.
            tracing::info!("Registering commands on dev guild.");
            dev_guild.set_commands(ctx, app_commands).await?;
        }

        let owner_roles = owner_roles(ctx, &config).await?;
        // Role ids can't receive direct messages.
        let mut notify_list = config.notify_list(fw);
        notify_list.retain(|user| !owner_roles.contains(&RoleId::new(user.get())));

        let http = reqwest::Client::new();
        let github = Arc::new(GithubClient::new(
            http.clone(),
            config.tokens.github_bot().map(str::to_owned),
        ));
        let starboard = starboard(&config).await?;

        let moderators = ModeratorCache::default();
        spawn_modlog(ctx, &config, &moderators, &shutdown);

        // Simple message that logs when the bot has initialized
        let bot_name = &rdy.user.name;
        tracing::info!("{bot_name} is ready!");

        let data = Data {
            notify_list,
            owner_roles,
            config,
            http,
            github,
            starboard,
            moderators,
            rtfm_cooldown: MemberCooldown::default(),
            rtfs_cooldown: MemberCooldown::default(),
        };

        Ok(data)
    })
}
