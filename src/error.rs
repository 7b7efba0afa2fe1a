//! Error types used throughout the bot.

use std::time::Duration;

use thiserror::Error;

use crate::serenity;

/// The error type handed to [poise]. Everything a command or event handler can fail with.
#[derive(Debug, Error)]
pub enum PythonistaError {
    #[error(transparent)]
    UserError(#[from] UserError),
    #[error(transparent)]
    ConfigError(#[from] ConfigError),
    #[error(transparent)]
    Github(#[from] GithubError),
    #[error(transparent)]
    Papi(#[from] PapiError),
    #[error("Discord error: {0}")]
    Serenity(#[from] serenity::Error),
    #[error("Http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("A command check failed: {}", reason.as_deref().unwrap_or("no reason given"))]
    CheckFailed { reason: Option<String> },
    #[error("Command panicked: {}", payload.as_deref().unwrap_or("<no payload>"))]
    Panic { payload: Option<String> },
    #[error("Command structure mismatch: {description}")]
    CommandStructureMismatch { description: String },
}

/// Errors caused by user input. The [Display](std::fmt::Display) text is shown to the user.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("Missing subcommand, try one of: {subcmds}")]
    MissingSubcommand { subcmds: String },
    #[error("Couldn't understand the arguments: `{}`", input.as_deref().unwrap_or_default())]
    BadArgs { input: Option<String> },
    #[error("On cooldown, try again in {:.1}s.", remaining_cooldown.as_secs_f32())]
    OnCooldown { remaining_cooldown: Duration },
    #[error("I'm missing these permissions: {missing_permissions}")]
    MissingBotPermissions {
        missing_permissions: serenity::Permissions,
    },
    #[error("You're missing these permissions: {}", missing_permissions.map(|p| p.to_string()).unwrap_or_default())]
    MissingUserPermissions {
        missing_permissions: Option<serenity::Permissions>,
    },
    #[error("Only bot owners can use this command.")]
    NotOwner,
    #[error("This command only works in a server.")]
    GuildOnly,
    #[error("This command only works in DMs.")]
    DmOnly,
    #[error("This command only works in NSFW channels.")]
    NsfwOnly,
    #[error("This doesn't seem to be the help forum...")]
    NotHelpForum,
    #[error("You can only mark your own posts as solved")]
    NotThreadOwner,
    #[error("Sorry, you don't have permissions to view details on this object.")]
    NoPermissions,
    #[error("Sorry, I couldn't apply a default library to this channel. Try again with a library?")]
    NoDefaultLibrary,
    #[error("Sorry, I couldn't find a library that matched. Try again with a different library?")]
    UnknownLibrary,
    #[error("{status} - There was an issue running this eval command.")]
    InvalidEval { status: u16 },
    #[error("I couldn't find anything called `{query}`.")]
    NotFound { query: String },
}

/// Errors from reading `config.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config: {reason}")]
    InvalidConfig { reason: String },
    #[error("Missing config file. {action_msg}")]
    MissingConfig { action_msg: String },
    #[error("Config IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// An error message returned by the GitHub API.
#[derive(Debug, Error)]
#[error("GitHub: {message}")]
pub struct GithubError {
    pub message: String,
}

/// Errors from the Pythonista API websocket.
#[derive(Debug, Error)]
pub enum PapiError {
    #[error("Websocket error: {0}")]
    Websocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Pythonista API rejected our token.")]
    Forbidden,
    #[error("The Pythonista API token isn't a valid header value, check `tokens.pythonista`: {0}")]
    InvalidToken(#[from] tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue),
    #[error("Malformed frame: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Unknown moderation event type {0}")]
    UnknownEventType(u8),
}
