//! A community bot for the Pythonista discord guild.

mod commands;
mod data;
mod error;
mod lib;
mod log;
mod setup;

use std::sync::Arc;

use tokio::sync::watch;

pub use data::Data;
pub use error::PythonistaError;
pub use poise::serenity_prelude as serenity;
pub use setup::Config;

/// Context handed to every command.
pub type Context<'a> = poise::Context<'a, Data, PythonistaError>;

#[tokio::main]
async fn main() -> Result<(), PythonistaError> {
    let config = Config::read()?;

    // Keep the guard alive so buffered file logs are written on exit.
    let _guard = log::install_tracing(&config);

    let (shutdown, _) = watch::channel(false);
    let shutdown = Arc::new(shutdown);

    let mut client = setup::client(config, shutdown.clone()).await?;

    // Stop cleanly on ctrl-c.
    let shard_manager = client.shard_manager.clone();
    let stop = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Couldn't listen for ctrl-c: {e}");
            return;
        }
        tracing::info!("Shutting down.");
        // Nobody listening just means nothing needs stopping.
        let _ = stop.send(true);
        shard_manager.shutdown_all().await;
    });

    client.start().await?;
    Ok(())
}
