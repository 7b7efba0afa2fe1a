//! Defines and implements custom bot functionality.

mod config;
mod framework;

use std::sync::Arc;

use tokio::sync::watch;

use crate::serenity;
use crate::PythonistaError;

pub use config::Config;
pub use config::GuildConfig;
pub use config::StarboardConfig;

/// Constructs a [serenity::Client] running the [poise::Framework].
///
/// Background tasks started during setup stop once `true` is sent on `shutdown`.
pub(super) async fn client(
    config: Config,
    shutdown: Arc<watch::Sender<bool>>,
) -> Result<serenity::Client, PythonistaError> {
    // Get discord token from config file
    let token = config.token()?.clone();

    // Intents we wish to use
    // See https://discord.com/developers/docs/topics/gateway#gateway-intents
    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let client = serenity::ClientBuilder::new(token, intents)
        .framework(framework::framework(config, shutdown))
        .await?;

    Ok(client)
}
