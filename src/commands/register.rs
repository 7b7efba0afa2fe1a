//! Implements the `register` command.

use tracing::instrument;

use super::is_owner;
use crate::Context;
use crate::PythonistaError;

/// Register or unregister slash commands, here or globally.
#[instrument(skip(ctx))]
#[poise::command(prefix_command, hide_in_help, check = "is_owner")]
pub async fn register(ctx: Context<'_>) -> Result<(), PythonistaError> {
    poise::builtins::register_application_commands_buttons(ctx).await?;
    Ok(())
}
