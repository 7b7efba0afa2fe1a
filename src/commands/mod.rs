//! Bot commands.

mod eval;
mod information;
mod manuals;
mod register;
mod solved;
mod suggest;

use crate::data::GetData;
use crate::Context;
use crate::{Data, PythonistaError};

/// Convenient type alias for [poise::Command].
pub type Command = poise::Command<Data, PythonistaError>;

/// Lists all the implemented commands
pub fn list() -> Vec<Command> {
    vec![
        eval::eval(),
        manuals::rtfm(),
        manuals::rtfs(),
        suggest::suggest(),
        solved::solved(),
        information::information(),
        register::register(),
    ]
}

/// Check for commands only owners may use.
async fn is_owner(ctx: Context<'_>) -> Result<bool, PythonistaError> {
    Ok(ctx.author_is_owner())
}
