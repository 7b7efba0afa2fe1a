//! Implements the `eval` command.
//!
//! Code is run in a snekbox sandbox and its output is sent back.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::data::GetData;
use crate::error::UserError;
use crate::lib::codeblock::Codeblock;
use crate::lib::paginator::text_pages;
use crate::lib::paginator::Pager;
use crate::lib::to_codeblock;
use crate::Context;
use crate::PythonistaError;

/// Longest output sent as a single message.
const MAX_MESSAGE_SIZE: usize = 2000;

#[derive(Debug, Deserialize)]
struct EvalResponse {
    #[serde(default)]
    stdout: String,
}

/// Evaluates your code in a sandbox.
#[instrument(skip(ctx))]
#[poise::command(prefix_command, slash_command)]
pub async fn eval(
    ctx: Context<'_>,
    #[description = "Python code, optionally in a code block"]
    #[rest]
    code: String,
) -> Result<(), PythonistaError> {
    let code = Codeblock::parse(&code);
    ctx.defer_or_broadcast().await?;

    let response = ctx
        .http_client()
        .post(&ctx.data().config.snekbox.url)
        .json(&json!({ "input": code.content }))
        .send()
        .await?;
    let status = response.status();
    if status != StatusCode::OK {
        tracing::warn!("Eval sandbox answered with {status}.");
        return Err(UserError::InvalidEval {
            status: status.as_u16(),
        }
        .into());
    }
    let output: EvalResponse = response.json().await?;

    let block = to_codeblock(&output.stdout, "py", false);
    if block.chars().count() <= MAX_MESSAGE_SIZE {
        ctx.say(block).await?;
        return Ok(());
    }

    let stdout = output.stdout.replace("```", "'''");
    Pager::builder()
        .ctx(ctx)
        .pages(text_pages(&stdout, "```py", "```", MAX_MESSAGE_SIZE))
        .build()
        .paginate()
        .await
}
