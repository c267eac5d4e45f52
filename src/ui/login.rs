use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, Lines};

use crate::api::models::SenderRole;
use crate::app::ChatConfig;
use crate::error::ChatError;
use crate::utils::normalize_url;

async fn ask<R, W>(question: &str, input: &mut Lines<R>, out: &mut W) -> Result<String, ChatError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    out.write_all(question.as_bytes()).await?;
    out.flush().await?;
    let answer = input
        .next_line()
        .await?
        .ok_or_else(|| ChatError::Config("input closed before setup finished".into()))?;
    Ok(answer.trim().to_string())
}

/// Fill in whatever the stored config is missing by asking on the terminal.
pub async fn complete_config<R, W>(mut config: ChatConfig, input: &mut Lines<R>, out: &mut W) -> Result<ChatConfig, ChatError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    while config.base_url.is_empty() {
        let url = ask("Shop server URL (e.g. http://localhost:8000): ", input, out).await?;
        config.base_url = normalize_url(&url);
    }
    while config.token.as_deref().is_none_or(str::is_empty) {
        let token = ask("Access token: ", input, out).await?;
        config.token = Some(token).filter(|t| !t.is_empty());
    }
    if config.role == SenderRole::User && config.display_name.is_empty() {
        config.display_name = ask("Your name: ", input, out).await?;
    }
    Ok(config)
}
